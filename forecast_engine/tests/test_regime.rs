use approx::assert_relative_eq;
use chrono::{Days, NaiveDate};
use forecast_engine::config::RegimeConfig;
use forecast_engine::data::TimeSeries;
use forecast_engine::error::ForecastError;
use forecast_engine::regime::{Regime, RegimeDetector, RegimeSignals};
use rstest::rstest;

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 30).unwrap()
}

fn detector() -> RegimeDetector {
    RegimeDetector::new(RegimeConfig::default()).unwrap()
}

/// Prices whose daily returns alternate between +a and -a, with a larger
/// amplitude over the last `turbulent` days
fn alternating_prices(n: usize, calm: f64, turbulent_days: usize, turbulent: f64) -> Vec<f64> {
    let mut prices = vec![4000.0];
    for i in 1..n {
        let amplitude = if i >= n - turbulent_days { turbulent } else { calm };
        let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
        let last = *prices.last().unwrap();
        prices.push(last * (1.0 + sign * amplitude));
    }
    prices
}

fn series_ending(name: &str, values: Vec<f64>, end: NaiveDate) -> TimeSeries {
    let start = end.checked_sub_days(Days::new(values.len() as u64 - 1)).unwrap();
    TimeSeries::daily(name, start, values).unwrap()
}

#[test]
fn test_low_z_score_is_normal() {
    let report = detector().classify(&RegimeSignals::from_vol_z(as_of(), 0.5));
    assert_eq!(report.regime, Regime::Normal);
    assert_eq!(report.volatility_multiplier, 1.0);
    assert!(report.recommendation.starts_with("[NORMAL]"));
}

#[test]
fn test_high_z_score_multiplier_is_capped() {
    let report = detector().classify(&RegimeSignals::from_vol_z(as_of(), 3.5));
    assert_eq!(report.regime, Regime::HighVolatility);
    assert_relative_eq!(report.volatility_multiplier, 1.9);
}

#[rstest]
#[case(2.0, 1.2)]
#[case(2.5, 1.55)]
#[case(2.9, 1.83)]
#[case(10.0, 1.9)]
fn test_high_volatility_multiplier_interpolates(#[case] z: f64, #[case] expected: f64) {
    let report = detector().classify(&RegimeSignals::from_vol_z(as_of(), z));
    assert_eq!(report.regime, Regime::HighVolatility);
    assert_relative_eq!(report.volatility_multiplier, expected, epsilon = 1e-9);
}

#[test]
fn test_policy_event_takes_priority() {
    let mut signals = RegimeSignals::from_vol_z(as_of(), 3.5);
    signals.driver_change_pct = Some(-6.0);
    signals.correlation_break = true;
    signals.days_to_event = Some(-1);

    let report = detector().classify(&signals);
    assert_eq!(report.regime, Regime::PolicyIntervention);
    assert_eq!(report.volatility_multiplier, 2.0);

    signals.days_to_event = Some(10);
    let report = detector().classify(&signals);
    assert_eq!(report.regime, Regime::ExternalShock);
    assert_eq!(report.volatility_multiplier, 1.5);
}

#[test]
fn test_shock_requires_correlation_break() {
    let mut signals = RegimeSignals::from_vol_z(as_of(), 0.2);
    signals.driver_change_pct = Some(4.0);
    assert_eq!(detector().classify(&signals).regime, Regime::Normal);

    signals.correlation_break = true;
    assert_eq!(detector().classify(&signals).regime, Regime::ExternalShock);

    signals.driver_change_pct = Some(1.0);
    assert_eq!(detector().classify(&signals).regime, Regime::Normal);
}

#[test]
fn test_confidence_is_a_percentage() {
    for z in [-1.0, 0.0, 1.0, 2.5, 6.0] {
        let report = detector().classify(&RegimeSignals::from_vol_z(as_of(), z));
        assert!((0.0..=100.0).contains(&report.confidence_pct));
    }
}

#[test]
fn test_turbulent_tail_is_high_volatility() {
    let prices = alternating_prices(300, 0.002, 15, 0.02);
    let series = series_ending("usd_cop", prices, as_of());

    let signals = detector().compute_signals(&series, None, as_of()).unwrap();
    assert!(signals.vol_z_score > 2.0, "z = {}", signals.vol_z_score);
    assert_eq!(signals.vol_percentile, 100.0);
    assert!(signals.driver_change_pct.is_none());
    assert!(!signals.correlation_break);

    let report = detector().classify(&signals);
    assert_eq!(report.regime, Regime::HighVolatility);
    assert!(report.volatility_multiplier >= 1.2 && report.volatility_multiplier <= 1.9);
}

#[test]
fn test_signals_ignore_data_after_as_of() {
    let prices = alternating_prices(300, 0.002, 15, 0.02);
    let series = series_ending("usd_cop", prices, as_of());
    let earlier = as_of().checked_sub_days(Days::new(30)).unwrap();

    // Before the turbulence every volatility window is identical
    let report = detector().detect(&series, None, earlier).unwrap();
    assert_eq!(report.signals.as_of, earlier);
    assert_eq!(report.regime, Regime::Normal);
}

#[test]
fn test_driver_change_and_scheduled_event() {
    let prices = alternating_prices(120, 0.002, 0, 0.0);
    let series = series_ending("usd_cop", prices, as_of());

    let mut driver_values = vec![80.0; 115];
    driver_values.extend((1..=5).map(|k| 80.0 * (1.0 - 0.01 * k as f64)));
    let driver = series_ending("brent", driver_values, as_of());

    let config = RegimeConfig {
        scheduled_events: vec![
            NaiveDate::from_ymd_opt(2024, 12, 18).unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 2).unwrap(),
        ],
        ..RegimeConfig::default()
    };
    let detector = RegimeDetector::new(config).unwrap();
    let signals = detector.compute_signals(&series, Some(&driver), as_of()).unwrap();

    assert_relative_eq!(signals.driver_change_pct.unwrap(), -5.0, epsilon = 1e-9);
    assert_eq!(signals.days_to_event, Some(2));
    assert_eq!(detector.classify(&signals).regime, Regime::PolicyIntervention);
}

#[test]
fn test_short_series_is_insufficient() {
    let series = series_ending("usd_cop", vec![4000.0; 10], as_of());
    assert!(matches!(
        detector().compute_signals(&series, None, as_of()),
        Err(ForecastError::DataInsufficient(_))
    ));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = RegimeConfig {
        high_vol_multiplier_min: 2.0,
        high_vol_multiplier_max: 1.5,
        ..RegimeConfig::default()
    };
    assert!(RegimeDetector::new(config).is_err());
}
