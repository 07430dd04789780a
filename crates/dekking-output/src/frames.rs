//! Polars tables of run outputs for charting and further analysis.

use crate::export::ExportError;
use chrono::{DateTime, NaiveDate, Utc};
use dekking_data::dates::to_epoch_days;
use dekking_data::{ContributionRecord, ForecastPoint, FundId};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

fn date_column(name: &str, dates: impl Iterator<Item = NaiveDate>) -> PolarsResult<Column> {
    let days: Vec<i32> = dates.map(to_epoch_days).collect();
    Column::new(name.into(), days).cast(&DataType::Date)
}

fn timestamp_column(
    name: &str,
    timestamps: impl Iterator<Item = DateTime<Utc>>,
) -> PolarsResult<Column> {
    let micros: Vec<i64> = timestamps.map(|ts| ts.timestamp_micros()).collect();
    Column::new(name.into(), micros).cast(&DataType::Datetime(TimeUnit::Microseconds, None))
}

/// Forecast table with columns `date`, `fund`, `predicted_ratio` and
/// `run_timestamp`.
pub fn forecast_frame(points: &[ForecastPoint]) -> Result<DataFrame, ExportError> {
    Ok(DataFrame::new(vec![
        date_column("date", points.iter().map(|p| p.date))?,
        Column::new(
            "fund".into(),
            points.iter().map(|p| p.fund.to_string()).collect::<Vec<_>>(),
        ),
        Column::new(
            "predicted_ratio".into(),
            points.iter().map(|p| p.predicted_ratio).collect::<Vec<_>>(),
        ),
        timestamp_column("run_timestamp", points.iter().map(|p| p.run_timestamp))?,
    ])?)
}

/// Contribution table with columns `date`, `fund`, `factor`,
/// `contribution` and `run_timestamp`.
pub fn contribution_frame(records: &[ContributionRecord]) -> Result<DataFrame, ExportError> {
    Ok(DataFrame::new(vec![
        date_column("date", records.iter().map(|r| r.date))?,
        Column::new(
            "fund".into(),
            records.iter().map(|r| r.fund.to_string()).collect::<Vec<_>>(),
        ),
        Column::new(
            "factor".into(),
            records.iter().map(|r| r.factor.clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            "contribution".into(),
            records.iter().map(|r| r.contribution).collect::<Vec<_>>(),
        ),
        timestamp_column("run_timestamp", records.iter().map(|r| r.run_timestamp))?,
    ])?)
}

/// One fund's contributions pivoted to a `date` column plus one column per
/// factor, as used for stacked bar charts.
///
/// Missing (date, factor) cells are 0.
pub fn contribution_pivot(
    records: &[ContributionRecord],
    fund: &FundId,
) -> Result<DataFrame, ExportError> {
    let fund_records: Vec<&ContributionRecord> =
        records.iter().filter(|r| &r.fund == fund).collect();

    let dates: Vec<NaiveDate> = fund_records
        .iter()
        .map(|r| r.date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let factors: BTreeSet<&str> = fund_records.iter().map(|r| r.factor.as_str()).collect();

    let row_of: BTreeMap<NaiveDate, usize> =
        dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
    let mut cells: BTreeMap<&str, Vec<f64>> = factors
        .iter()
        .map(|f| (*f, vec![0.0; dates.len()]))
        .collect();
    for record in &fund_records {
        if let Some(column) = cells.get_mut(record.factor.as_str()) {
            column[row_of[&record.date]] += record.contribution;
        }
    }

    let mut columns = vec![date_column("date", dates.iter().copied())?];
    for (factor, values) in cells {
        columns.push(Column::new(factor.into(), values));
    }
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    fn records() -> Vec<ContributionRecord> {
        let mut out = Vec::new();
        for (d, swap, equity) in [(1, 0.0, 0.0), (2, 0.2, -0.1), (5, -0.05, 0.3)] {
            for (factor, value) in [("EUSA30", swap), ("IWDA.AS", equity)] {
                out.push(ContributionRecord::new(
                    date(d),
                    FundId::from("ABP"),
                    factor.to_string(),
                    value,
                    run(),
                ));
            }
        }
        out.push(ContributionRecord::new(
            date(2),
            FundId::from("PMT"),
            "GSG".to_string(),
            1.0,
            run(),
        ));
        out
    }

    #[test]
    fn test_forecast_frame() {
        let points = vec![
            ForecastPoint::new(date(1), FundId::from("ABP"), 110.0, run()),
            ForecastPoint::new(date(2), FundId::from("ABP"), 110.4, run()),
        ];
        let df = forecast_frame(&points).unwrap();

        assert_eq!(df.height(), 2);
        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["date", "fund", "predicted_ratio", "run_timestamp"]);
        assert_eq!(df.column("date").unwrap().dtype(), &DataType::Date);
        assert_eq!(
            df.column("predicted_ratio").unwrap().f64().unwrap().get(1),
            Some(110.4)
        );
    }

    #[test]
    fn test_contribution_frame() {
        let df = contribution_frame(&records()).unwrap();
        assert_eq!(df.height(), 7);
        assert_eq!(df.width(), 5);
    }

    #[test]
    fn test_contribution_pivot() {
        let df = contribution_pivot(&records(), &FundId::from("ABP")).unwrap();

        assert_eq!(df.height(), 3);
        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["date", "EUSA30", "IWDA.AS"]);
        let equity = df.column("IWDA.AS").unwrap().f64().unwrap();
        assert_eq!(equity.get(2), Some(0.3));
    }

    #[test]
    fn test_empty_pivot() {
        let df = contribution_pivot(&records(), &FundId::from("BPFBOUW")).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 1);
    }
}
