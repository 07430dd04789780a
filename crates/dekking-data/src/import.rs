//! CSV import of long-format observation files.
//!
//! Market and coverage-ratio files share the `date,name,value` layout of the
//! `marketdata` and `dekkingsgraad` tables. Coverage ratios are stored as
//! fractions (`1.052` for 105.2%) and converted to percent on import.
//! Name files use `short_name,long_name`.

use crate::dates::parse_date;
use crate::error::Result;
use crate::market::MarketObservation;
use crate::names::InstrumentNames;
use crate::ratios::CoverageRatioObservation;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct LongRow {
    date: String,
    name: String,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NameRow {
    short_name: String,
    long_name: String,
}

fn read_long_rows<R: Read>(reader: R) -> Result<Vec<(chrono::NaiveDate, String, f64)>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        let row: LongRow = record?;
        // Empty cells are gaps, not errors
        let Some(value) = row.value else {
            continue;
        };
        rows.push((parse_date(&row.date)?, row.name, value));
    }
    Ok(rows)
}

/// Read market observations from CSV.
pub fn read_market_csv<R: Read>(reader: R) -> Result<Vec<MarketObservation>> {
    Ok(read_long_rows(reader)?
        .into_iter()
        .map(|(date, name, value)| MarketObservation::new(date, name, value))
        .collect())
}

/// Read coverage-ratio observations (fractions) from CSV, returned in percent.
pub fn read_ratio_csv<R: Read>(reader: R) -> Result<Vec<CoverageRatioObservation>> {
    Ok(read_long_rows(reader)?
        .into_iter()
        .map(|(date, name, value)| CoverageRatioObservation::new(date, name.as_str(), value * 100.0))
        .collect())
}

/// Read instrument display names from CSV.
pub fn read_names_csv<R: Read>(reader: R) -> Result<InstrumentNames> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut names = InstrumentNames::new();
    for record in rdr.deserialize() {
        let row: NameRow = record?;
        names.insert(row.short_name, row.long_name);
    }
    Ok(names)
}

/// Read market observations from a CSV file.
pub fn read_market_file(path: &Path) -> Result<Vec<MarketObservation>> {
    read_market_csv(std::fs::File::open(path)?)
}

/// Read coverage-ratio observations from a CSV file.
pub fn read_ratio_file(path: &Path) -> Result<Vec<CoverageRatioObservation>> {
    read_ratio_csv(std::fs::File::open(path)?)
}

/// Read instrument display names from a CSV file.
pub fn read_names_file(path: &Path) -> Result<InstrumentNames> {
    read_names_csv(std::fs::File::open(path)?)
}
