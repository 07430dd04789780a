//! End-to-end properties of training, forecasting and attribution.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc};
use dekking_data::{CoverageRatioObservation, CoverageRatios, FundId, MarketSeries};
use dekking_model::{
    AttributionEngine, ForecastConfig, ForecastEngine, FundModel, ModelError, forecast_horizon,
    verify_additivity,
};
use ndarray::{Array2, array};
use std::collections::BTreeSet;

fn day(n: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .checked_add_days(Days::new(n - 1))
        .unwrap()
}

fn run() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 7, 30, 0).unwrap()
}

/// Ten consecutive daily rows of two factors.
fn ten_day_market() -> MarketSeries {
    let dates: Vec<NaiveDate> = (1..=10).map(day).collect();
    let values = Array2::from_shape_fn((10, 2), |(i, j)| {
        let t = i as f64;
        if j == 0 { 2.5 + 0.03 * t } else { 80.0 + (t * 1.3).sin() }
    });
    MarketSeries::new(dates, vec!["EUSA30".to_string(), "IWDA.AS".to_string()], values).unwrap()
}

/// Five months of weekday market data for three factors.
fn weekday_market() -> MarketSeries {
    let mut dates = Vec::new();
    let mut cells = Vec::new();
    for n in 1..=150 {
        let date = day(n);
        if date.weekday().number_from_monday() > 5 {
            continue;
        }
        let t = n as f64;
        dates.push(date);
        cells.push(2.4 + 0.2 * (t / 17.0).sin());
        cells.push(15.0 + 0.8 * (t / 9.0).cos());
        cells.push(78.0 + 0.05 * t + (t / 5.0).sin());
    }
    let values = Array2::from_shape_vec((dates.len(), 3), cells).unwrap();
    MarketSeries::new(
        dates,
        vec!["EUSA30".to_string(), "GSG".to_string(), "IWDA.AS".to_string()],
        values,
    )
    .unwrap()
}

/// Month-end ratios driven by the market with a small deterministic error.
fn month_end_ratios(market: &MarketSeries) -> CoverageRatios {
    let dense = market.reindex_daily().unwrap();
    let month_ends = [
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
    ];

    let mut observations = Vec::new();
    for (i, date) in month_ends.iter().enumerate() {
        let swap = dense.value_on(*date, "EUSA30").unwrap();
        let gsg = dense.value_on(*date, "GSG").unwrap();
        let equity = dense.value_on(*date, "IWDA.AS").unwrap();
        let noise = 0.1 * ((i as f64) * 2.1).sin();

        observations.push(CoverageRatioObservation::new(
            *date,
            "ABP",
            30.0 + 9.0 * swap + 0.7 * equity + noise,
        ));
        observations.push(CoverageRatioObservation::new(
            *date,
            "PFZW",
            45.0 + 7.0 * swap + 0.4 * gsg + 0.5 * equity - noise,
        ));
    }
    // One publication only: cannot be trained with the default minimum
    observations.push(CoverageRatioObservation::new(month_ends[3], "PMT", 104.0));

    CoverageRatios::from_observations(observations)
}

#[test]
fn test_round_trip_single_observation() {
    let market = ten_day_market();
    let ratios = CoverageRatios::from_observations([CoverageRatioObservation::new(
        day(3),
        "ABP",
        95.0,
    )]);

    let engine = ForecastEngine::new(ForecastConfig {
        min_observations: 1,
        ..ForecastConfig::default()
    });
    let trained = engine.train(&market, &ratios).unwrap();
    let outcome = engine.predict(&trained.models, &market, &ratios, run());

    assert_eq!(outcome.points.len(), 7);
    let dates: Vec<NaiveDate> = outcome.points.iter().map(|p| p.date).collect();
    assert_eq!(dates, (4..=10).map(day).collect::<Vec<_>>());
    // A single training row pins the forecast to the official value
    assert!(outcome.points.iter().all(|p| (p.predicted_ratio - 95.0).abs() < 1e-9));

    let contributions =
        AttributionEngine::new().decompose_all(&trained.models, &market, &ratios, run());
    assert!(contributions.failures.is_empty());
    for factor in ["EUSA30", "IWDA.AS"] {
        assert_eq!(
            contributions.records.iter().filter(|r| r.factor == factor).count(),
            7
        );
    }
    assert!(verify_additivity(&outcome.points, &contributions.records).holds(1e-9));
}

#[test]
fn test_round_trip_with_constant_factor() {
    // The swap rate does not move after day 3: its contributions must vanish
    let dates: Vec<NaiveDate> = (1..=10).map(day).collect();
    let values = Array2::from_shape_fn((10, 2), |(i, j)| {
        if j == 0 { 2.5 } else { 80.0 + i as f64 * 0.5 }
    });
    let market =
        MarketSeries::new(dates, vec!["EUSA30".to_string(), "IWDA.AS".to_string()], values)
            .unwrap();
    let ratios = CoverageRatios::from_observations([CoverageRatioObservation::new(
        day(3),
        "ABP",
        95.0,
    )]);
    let model = FundModel::new(
        "ABP",
        vec!["EUSA30".to_string(), "IWDA.AS".to_string()],
        array![4.0, 0.2],
        69.0,
    )
    .unwrap();

    let points = ForecastEngine::default()
        .predict_fund(&model, &market, &ratios, run())
        .unwrap();
    assert_eq!(points.len(), 7);

    let subset = forecast_horizon(&market, &ratios, &FundId::from("ABP")).unwrap();
    let records = AttributionEngine::new().decompose(&model, &subset, run()).unwrap();

    let swap: Vec<f64> = records
        .iter()
        .filter(|r| r.factor == "EUSA30")
        .map(|r| r.contribution)
        .collect();
    let equity: Vec<f64> = records
        .iter()
        .filter(|r| r.factor == "IWDA.AS")
        .map(|r| r.contribution)
        .collect();
    assert_eq!(swap, vec![0.0; 7]);
    assert_eq!(equity.len(), 7);
    assert_eq!(equity[0], 0.0);
    for delta in &equity[1..] {
        assert!((delta - 0.1).abs() < 1e-9);
    }

    let report = verify_additivity(&points, &records);
    assert_eq!(report.checked, 7);
    assert!(report.holds(1e-9));
}

#[test]
fn test_full_run_properties() {
    let market = weekday_market();
    let ratios = month_end_ratios(&market);

    let forecast = ForecastEngine::default();
    let trained = forecast.train(&market, &ratios).unwrap();

    // Fund isolation: PMT fails, the others train
    assert_eq!(trained.models.len(), 2);
    assert!(matches!(
        trained.failures.get(&FundId::from("PMT")),
        Some(ModelError::DataInsufficient { .. })
    ));

    let outcome = forecast.predict(&trained.models, &market, &ratios, run());
    assert!(outcome.failures.is_empty());

    // Forecast domain: exactly the market dates after the last official date
    let latest = market.latest_date().unwrap();
    for fund in ["ABP", "PFZW"] {
        let fund = FundId::from(fund);
        let last_official = ratios.last_official_date(&fund).unwrap();
        let expected: BTreeSet<NaiveDate> = market
            .dates()
            .iter()
            .copied()
            .filter(|d| *d > last_official && *d <= latest)
            .collect();
        let actual: Vec<NaiveDate> = outcome
            .points
            .iter()
            .filter(|p| p.fund == fund)
            .map(|p| p.date)
            .collect();
        assert!(actual.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(actual.into_iter().collect::<BTreeSet<_>>(), expected);
    }

    // Determinism of prediction
    let again = forecast.predict(&trained.models, &market, &ratios, run());
    assert_eq!(outcome.points, again.points);

    // Additivity and first-day zero
    let attribution =
        AttributionEngine::new().decompose_all(&trained.models, &market, &ratios, run());
    assert!(attribution.failures.is_empty());
    let report = verify_additivity(&outcome.points, &attribution.records);
    assert_eq!(report.checked, outcome.points.len());
    assert!(report.holds(1e-9), "max deviation {}", report.max_rel_deviation);

    for fund in trained.models.keys() {
        let first = outcome
            .points
            .iter()
            .filter(|p| &p.fund == fund)
            .map(|p| p.date)
            .min()
            .unwrap();
        assert!(attribution
            .records
            .iter()
            .filter(|r| &r.fund == fund && r.date == first)
            .all(|r| r.contribution == 0.0));
    }
}

#[test]
fn test_training_is_reproducible_with_seed() {
    let market = weekday_market();
    let ratios = month_end_ratios(&market);
    let engine = ForecastEngine::default();

    let first = engine.train(&market, &ratios).unwrap();
    let second = engine.train(&market, &ratios).unwrap();
    assert_eq!(first.models, second.models);
}

#[test]
fn test_empty_market_is_fatal() {
    let market = ten_day_market().after(day(10));
    let ratios = CoverageRatios::from_observations([CoverageRatioObservation::new(
        day(3),
        "ABP",
        95.0,
    )]);
    let result = ForecastEngine::default().train(&market, &ratios);
    assert!(matches!(result, Err(ModelError::Data(_))));
}
