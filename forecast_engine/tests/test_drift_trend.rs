use approx::assert_relative_eq;
use chrono::{DateTime, TimeZone, Utc};
use forecast_engine::config::{DriftTrendConfig, Horizon};
use forecast_engine::drift::{DataDriftDetector, DriftSeverity};
use forecast_engine::drift_trend::{DriftHistoryEntry, DriftTrend, DriftTrendAnalyzer, TrendDirection};
use forecast_engine::store::{MemoryStore, RecordStore};
use pretty_assertions::assert_eq;
use DriftSeverity::{High, Low, Medium, None as Clean};

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 6, 0, 0).unwrap()
}

fn entry(day: u32, horizon: Horizon, severity: DriftSeverity) -> DriftHistoryEntry {
    DriftHistoryEntry {
        timestamp: at(day),
        horizon,
        drift_score: severity.score(),
        severity,
        drift_detected: severity.is_drift(),
    }
}

fn history(severities: &[DriftSeverity]) -> Vec<DriftHistoryEntry> {
    severities
        .iter()
        .enumerate()
        .map(|(i, s)| entry(i as u32 + 1, Horizon::Days30, *s))
        .collect()
}

#[test]
fn test_escalating_history_requires_action() {
    let entries = history(&[Clean, Low, Medium, High, High, High]);
    let trend =
        DriftTrend::from_entries(&entries, Horizon::Days30, &DriftTrendConfig::default(), at(10))
            .unwrap();

    assert_eq!(trend.window_entries, 6);
    assert_eq!(trend.direction, TrendDirection::Worsening);
    assert!(trend.slope > 0.0);
    assert!(trend.r_squared > 0.8);
    assert_eq!(trend.consecutive_high, 3);
    assert!(trend.requires_action());
    assert_eq!(trend.latest_severity, Some(High));
    // The LOW entry on day 2 is the latest without drift
    assert_eq!(trend.days_since_last_stable, Some(8));
}

#[test]
fn test_two_high_entries_do_not_exceed_threshold() {
    let entries = history(&[Clean, High, High]);
    let trend =
        DriftTrend::from_entries(&entries, Horizon::Days30, &DriftTrendConfig::default(), at(5))
            .unwrap();
    assert_eq!(trend.consecutive_high, 2);
    assert!(!trend.requires_action());
}

#[test]
fn test_recovering_history_improves() {
    let entries = history(&[High, High, Medium, Low, Clean]);
    let trend =
        DriftTrend::from_entries(&entries, Horizon::Days30, &DriftTrendConfig::default(), at(5))
            .unwrap();
    assert_eq!(trend.direction, TrendDirection::Improving);
    assert_eq!(trend.consecutive_high, 0);
    assert_eq!(trend.days_since_last_stable, Some(0));
}

#[test]
fn test_noisy_history_is_stable() {
    let entries = history(&[Clean, Low, Clean, Low, Clean, Low, Clean, Low]);
    let trend =
        DriftTrend::from_entries(&entries, Horizon::Days30, &DriftTrendConfig::default(), at(9))
            .unwrap();
    assert_eq!(trend.direction, TrendDirection::Stable);
}

#[test]
fn test_trend_uses_only_the_window() {
    let config = DriftTrendConfig {
        window: 3,
        ..DriftTrendConfig::default()
    };
    let entries = history(&[High, High, High, Clean, Clean, Clean]);
    let trend = DriftTrend::from_entries(&entries, Horizon::Days30, &config, at(7)).unwrap();
    assert_eq!(trend.window_entries, 3);
    assert_relative_eq!(trend.slope, 0.0);
    assert_eq!(trend.direction, TrendDirection::Stable);
}

#[test]
fn test_short_histories() {
    let config = DriftTrendConfig::default();

    let empty = DriftTrend::from_entries(&[], Horizon::Days7, &config, at(1)).unwrap();
    assert_eq!(empty.window_entries, 0);
    assert_eq!(empty.latest_severity, None);
    assert_eq!(empty.days_since_last_stable, None);
    assert!(!empty.requires_action());

    let single = DriftTrend::from_entries(&history(&[High]), Horizon::Days30, &config, at(2))
        .unwrap();
    assert_eq!(single.direction, TrendDirection::Stable);
    assert_eq!(single.days_since_last_stable, None);
}

#[test]
fn test_analyzer_filters_and_orders_by_horizon() {
    let store = MemoryStore::new("drift_history");
    store
        .append(vec![
            entry(3, Horizon::Days7, High),
            entry(1, Horizon::Days7, Clean),
            entry(2, Horizon::Days90, High),
            entry(2, Horizon::Days7, Medium),
        ])
        .unwrap();
    let analyzer = DriftTrendAnalyzer::new(DriftTrendConfig::default(), store).unwrap();

    let seven = analyzer.history(Horizon::Days7).unwrap();
    let days: Vec<DateTime<Utc>> = seven.iter().map(|e| e.timestamp).collect();
    assert_eq!(days, vec![at(1), at(2), at(3)]);
    assert!(analyzer.history(Horizon::Days15).unwrap().is_empty());

    let trend = analyzer.analyze(Horizon::Days90, at(4)).unwrap();
    assert_eq!(trend.window_entries, 1);
    assert_eq!(trend.consecutive_high, 1);
}

#[test]
fn test_analyzer_records_reports() {
    let detector = DataDriftDetector::with_windows(20, 10, 0.05).unwrap();
    let analyzer =
        DriftTrendAnalyzer::new(DriftTrendConfig::default(), MemoryStore::new("drift_history"))
            .unwrap();

    let report = detector.detect_values_at(&[1.0, 2.0, 3.0], at(1));
    let recorded = analyzer.record(&report, Horizon::Days15).unwrap();
    assert_eq!(recorded.severity, Clean);
    assert!(!recorded.drift_detected);
    assert_eq!(recorded.timestamp, at(1));

    assert_eq!(analyzer.store().load().unwrap(), vec![recorded]);
    let trend = analyzer.analyze(Horizon::Days15, at(3)).unwrap();
    assert_eq!(trend.days_since_last_stable, Some(2));
}

#[test]
fn test_window_must_hold_two_entries() {
    let config = DriftTrendConfig {
        window: 1,
        ..DriftTrendConfig::default()
    };
    assert!(DriftTrendAnalyzer::new(config, MemoryStore::<DriftHistoryEntry>::new("h")).is_err());
}
