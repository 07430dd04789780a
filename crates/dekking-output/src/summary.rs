//! Per-fund summary cards of a run.

use crate::export::{ExportError, ExportFormat, Exporter, records_to_csv};
use chrono::NaiveDate;
use dekking_data::{
    ContributionRecord, CoverageRatios, ForecastPoint, FundId, InstrumentNames,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Total contribution of one factor over the forecast horizon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactorContribution {
    /// Instrument code.
    pub factor: String,

    /// Display name from the instrument lookup (falls back to the code).
    pub display_name: String,

    /// Summed contribution in percentage points.
    pub contribution: f64,
}

/// Summary of one fund's latest estimate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundSummary {
    /// Fund.
    pub fund: FundId,

    /// Date of the last official publication.
    pub last_official_date: NaiveDate,

    /// Last official coverage ratio (%).
    pub last_official_ratio: f64,

    /// Date of the latest forecast.
    pub forecast_date: NaiveDate,

    /// Latest forecast coverage ratio (%).
    pub forecast_ratio: f64,

    /// Factor contributions over the horizon, largest absolute first.
    pub contributions: Vec<FactorContribution>,
}

impl FundSummary {
    /// Build the summary of one fund.
    ///
    /// Returns `None` when the fund has no official ratio or no forecast.
    pub fn build(
        fund: &FundId,
        ratios: &CoverageRatios,
        forecasts: &[ForecastPoint],
        contributions: &[ContributionRecord],
        names: &InstrumentNames,
    ) -> Option<Self> {
        let (last_official_date, last_official_ratio) = ratios.last_official(fund)?;
        let latest = forecasts
            .iter()
            .filter(|p| &p.fund == fund)
            .max_by_key(|p| p.date)?;

        let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
        for record in contributions.iter().filter(|r| &r.fund == fund) {
            *totals.entry(record.factor.as_str()).or_insert(0.0) += record.contribution;
        }

        let mut factor_contributions: Vec<FactorContribution> = totals
            .into_iter()
            .map(|(factor, contribution)| FactorContribution {
                factor: factor.to_string(),
                display_name: names.display(factor).to_string(),
                contribution,
            })
            .collect();
        factor_contributions.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));

        Some(Self {
            fund: fund.clone(),
            last_official_date,
            last_official_ratio,
            forecast_date: latest.date,
            forecast_ratio: latest.predicted_ratio,
            contributions: factor_contributions,
        })
    }

    /// Forecast change since the last official publication (pp).
    pub fn change(&self) -> f64 {
        self.forecast_ratio - self.last_official_ratio
    }

    /// Sum of all factor contributions (pp).
    pub fn explained(&self) -> f64 {
        self.contributions.iter().map(|c| c.contribution).sum()
    }

    /// Part of the change not covered by factor movements over the horizon.
    ///
    /// This is the jump between the last official value and the model's
    /// estimate on the first forecast date.
    pub fn unexplained(&self) -> f64 {
        self.change() - self.explained()
    }

    /// Format as ASCII table for terminal display.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("\nCoverage Ratio Estimate: {}\n", self.fund));
        output.push_str(&"=".repeat(72));
        output.push('\n');
        output.push_str(&format!(
            "  Last official ({}):      {:>8.2}%\n",
            self.last_official_date, self.last_official_ratio
        ));
        output.push_str(&format!(
            "  Estimate ({}):           {:>8.2}%\n",
            self.forecast_date, self.forecast_ratio
        ));
        output.push_str(&format!(
            "  Change:                           {:>+8.2} pp\n",
            self.change()
        ));

        if !self.contributions.is_empty() {
            output.push_str("\nFactor Contributions:\n");
            output.push_str(&"-".repeat(72));
            output.push('\n');
            output.push_str(&format!(
                "{:<12} {:<40} {:>14}\n",
                "Factor", "Name", "Contr. (pp)"
            ));
            output.push_str(&"-".repeat(72));
            output.push('\n');
            for c in &self.contributions {
                output.push_str(&format!(
                    "{:<12} {:<40} {:>+14.3}\n",
                    c.factor, c.display_name, c.contribution
                ));
            }
            output.push_str(&format!(
                "{:<12} {:<40} {:>+14.3}\n",
                "", "Start of horizon", self.unexplained()
            ));
        }

        output.push_str(&"=".repeat(72));
        output.push('\n');
        output
    }

    /// Format as Markdown for documentation.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("# Coverage Ratio Estimate: {}\n\n", self.fund));
        output.push_str(&format!(
            "- **Last official ({}):** {:.2}%\n",
            self.last_official_date, self.last_official_ratio
        ));
        output.push_str(&format!(
            "- **Estimate ({}):** {:.2}%\n",
            self.forecast_date, self.forecast_ratio
        ));
        output.push_str(&format!("- **Change:** {:+.2} pp\n\n", self.change()));

        if !self.contributions.is_empty() {
            output.push_str("## Factor Contributions\n\n");
            output.push_str("| Factor | Name | Contribution (pp) |\n");
            output.push_str("|--------|------|-------------------|\n");
            for c in &self.contributions {
                output.push_str(&format!(
                    "| {} | {} | {:+.3} |\n",
                    c.factor, c.display_name, c.contribution
                ));
            }
        }

        output
    }
}

impl fmt::Display for FundSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {:.2}% on {} (official {:.2}% on {}, {:+.2} pp)",
            self.fund,
            self.forecast_ratio,
            self.forecast_date,
            self.last_official_ratio,
            self.last_official_date,
            self.change()
        )?;
        for c in &self.contributions {
            writeln!(f, "  {}: {:+.3} pp", c.display_name, c.contribution)?;
        }
        Ok(())
    }
}

/// Summaries of every fund with a forecast, ordered by fund.
pub fn summarize_run(
    ratios: &CoverageRatios,
    forecasts: &[ForecastPoint],
    contributions: &[ContributionRecord],
    names: &InstrumentNames,
) -> Vec<FundSummary> {
    let mut funds: Vec<&FundId> = forecasts.iter().map(|p| &p.fund).collect();
    funds.sort();
    funds.dedup();

    funds
        .into_iter()
        .filter_map(|fund| FundSummary::build(fund, ratios, forecasts, contributions, names))
        .collect()
}

/// Flattened summary row for CSV export.
#[derive(Debug, Serialize)]
struct FundSummaryFlat<'a> {
    fund: &'a str,
    last_official_date: NaiveDate,
    last_official_ratio: f64,
    forecast_date: NaiveDate,
    forecast_ratio: f64,
    change: f64,
}

impl<'a> From<&'a FundSummary> for FundSummaryFlat<'a> {
    fn from(s: &'a FundSummary) -> Self {
        Self {
            fund: s.fund.as_str(),
            last_official_date: s.last_official_date,
            last_official_ratio: s.last_official_ratio,
            forecast_date: s.forecast_date,
            forecast_ratio: s.forecast_ratio,
            change: s.change(),
        }
    }
}

impl Exporter for FundSummary {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => records_to_csv(&[FundSummaryFlat::from(self)]),
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

impl Exporter for Vec<FundSummary> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let flat: Vec<FundSummaryFlat<'_>> = self.iter().map(FundSummaryFlat::from).collect();
                records_to_csv(&flat)
            }
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{DateTime, TimeZone, Utc};
    use dekking_data::CoverageRatioObservation;

    fn run() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap()
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn summary() -> FundSummary {
        let fund = FundId::from("ABP");
        let ratios = CoverageRatios::from_observations([
            CoverageRatioObservation::new(date(1, 31), "ABP", 110.0),
        ]);
        let forecasts = vec![
            ForecastPoint::new(date(2, 1), fund.clone(), 110.3, run()),
            ForecastPoint::new(date(2, 2), fund.clone(), 111.0, run()),
        ];
        let contributions = vec![
            ContributionRecord::new(date(2, 1), fund.clone(), "EUSA30".to_string(), 0.0, run()),
            ContributionRecord::new(date(2, 1), fund.clone(), "IWDA.AS".to_string(), 0.0, run()),
            ContributionRecord::new(date(2, 2), fund.clone(), "EUSA30".to_string(), 0.9, run()),
            ContributionRecord::new(date(2, 2), fund.clone(), "IWDA.AS".to_string(), -0.2, run()),
        ];
        let mut names = InstrumentNames::new();
        names.insert("IWDA.AS", "MSCI World");

        FundSummary::build(&fund, &ratios, &forecasts, &contributions, &names).unwrap()
    }

    #[test]
    fn test_build_summary() {
        let s = summary();
        assert_eq!(s.forecast_date, date(2, 2));
        assert_relative_eq!(s.change(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.explained(), 0.7, epsilon = 1e-12);
        assert_relative_eq!(s.unexplained(), 0.3, epsilon = 1e-12);

        assert_eq!(s.contributions[0].factor, "EUSA30");
        assert_eq!(s.contributions[0].display_name, "EUSA30");
        assert_eq!(s.contributions[1].display_name, "MSCI World");
    }

    #[test]
    fn test_summary_requires_forecast() {
        let ratios = CoverageRatios::from_observations([
            CoverageRatioObservation::new(date(1, 31), "PMT", 100.0),
        ]);
        let result = FundSummary::build(
            &FundId::from("PMT"),
            &ratios,
            &[],
            &[],
            &InstrumentNames::new(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_renderings() {
        let s = summary();

        let ascii = s.to_ascii_table();
        assert!(ascii.contains("Coverage Ratio Estimate: ABP"));
        assert!(ascii.contains("MSCI World"));
        assert!(ascii.contains("+1.00 pp"));

        let markdown = s.to_markdown();
        assert!(markdown.contains("# Coverage Ratio Estimate: ABP"));
        assert!(markdown.contains("| Factor | Name |"));

        let display = s.to_string();
        assert!(display.starts_with("ABP: 111.00% on 2024-02-02"));
    }

    #[test]
    fn test_summary_export() {
        let csv = vec![summary()].export_to_string(ExportFormat::Csv).unwrap();
        assert!(csv.starts_with("fund,last_official_date,last_official_ratio"));
        assert!(csv.contains("ABP,2024-01-31,110.0,2024-02-02,111.0"));

        let json = summary().export_to_string(ExportFormat::Json).unwrap();
        assert!(json.contains("\"contributions\""));
    }
}
