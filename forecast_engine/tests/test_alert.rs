use chrono::{NaiveDate, TimeZone, Utc};
use forecast_engine::config::{DriftTrendConfig, Horizon, RegimeConfig};
use forecast_engine::drift::{DataDriftDetector, DriftReport, DriftSeverity};
use forecast_engine::drift_trend::{DriftHistoryEntry, DriftTrend};
use forecast_engine::regime::{RegimeDetector, RegimeReport, RegimeSignals};
use forecast_engine::validator::{MetricSummary, ValidationMode, ValidationReport};
use forecast_engine::{should_alert, AlertEvent};

fn quiet_drift() -> DriftReport {
    DataDriftDetector::with_windows(20, 10, 0.05)
        .unwrap()
        .detect_values(&[1.0, 2.0, 3.0])
}

fn high_drift() -> DriftReport {
    let mut report = quiet_drift();
    report.severity = DriftSeverity::High;
    report.drift_detected = true;
    report.recommendation = "[HIGH] Retrain models".to_string();
    report
}

fn trend(severities: &[DriftSeverity]) -> DriftTrend {
    let entries: Vec<DriftHistoryEntry> = severities
        .iter()
        .enumerate()
        .map(|(i, s)| DriftHistoryEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 5, i as u32 + 1, 0, 0, 0).unwrap(),
            horizon: Horizon::Days15,
            drift_score: s.score(),
            severity: *s,
            drift_detected: s.is_drift(),
        })
        .collect();
    DriftTrend::from_entries(
        &entries,
        Horizon::Days15,
        &DriftTrendConfig::default(),
        Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

fn regime(vol_z: f64) -> RegimeReport {
    RegimeDetector::new(RegimeConfig::default())
        .unwrap()
        .classify(&RegimeSignals::from_vol_z(
            NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
            vol_z,
        ))
}

fn validation(mape: f64, coverage: f64, acceptable: bool) -> ValidationReport {
    let summary = |mean: f64| MetricSummary { mean, std: 0.0 };
    ValidationReport {
        timestamp: Utc::now(),
        horizon: Horizon::Days30,
        mode: ValidationMode::Expanding,
        folds: Vec::new(),
        rmse: summary(12.0),
        mae: summary(9.0),
        mape: summary(mape),
        ci95_coverage: summary(coverage),
        bias: summary(0.0),
        best_fold: 0,
        worst_fold: 0,
        acceptable,
    }
}

#[test]
fn test_no_events_no_alert() {
    let decision = should_alert(&[]);
    assert!(!decision.alert);
    assert_eq!(decision.reason, "No alert conditions met");
}

#[test]
fn test_healthy_checks_do_not_alert() {
    use DriftSeverity::{High, Low, None as Clean};
    let decision = should_alert(&[
        AlertEvent::Drift(quiet_drift()),
        AlertEvent::DriftTrend(trend(&[Clean, Low, High, High])),
        AlertEvent::Regime(regime(0.5)),
        AlertEvent::Validation(validation(3.1, 0.94, true)),
    ]);
    assert!(!decision.alert);
}

#[test]
fn test_each_trigger_alerts() {
    use DriftSeverity::High;

    let drift = should_alert(&[AlertEvent::Drift(high_drift())]);
    assert!(drift.alert);
    assert!(drift.reason.contains("HIGH"));

    let sustained = should_alert(&[AlertEvent::DriftTrend(trend(&[High, High, High]))]);
    assert!(sustained.alert);
    assert!(sustained.reason.contains("3 consecutive HIGH"));

    let volatile = should_alert(&[AlertEvent::Regime(regime(3.5))]);
    assert!(volatile.alert);
    assert!(volatile.reason.contains("HIGH_VOLATILITY"));

    let backtest = should_alert(&[AlertEvent::Validation(validation(7.5, 0.82, false))]);
    assert!(backtest.alert);
    assert!(backtest.reason.contains("30d backtest unacceptable"));
}

#[test]
fn test_reasons_are_joined() {
    let decision = should_alert(&[
        AlertEvent::Drift(high_drift()),
        AlertEvent::Regime(regime(0.0)),
        AlertEvent::Regime(regime(3.0)),
    ]);
    assert!(decision.alert);
    assert_eq!(decision.reason.split("; ").count(), 2);
    assert!(decision.reason.starts_with("Drift severity HIGH"));
}
