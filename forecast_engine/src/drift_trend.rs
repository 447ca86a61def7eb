//! Longitudinal view over successive drift reports

use crate::config::{DriftTrendConfig, Horizon};
use crate::drift::{DriftReport, DriftSeverity};
use crate::error::{ForecastError, Result};
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stat_math::regression::LinearRegression;
use tracing::{debug, info};

/// Trend fits with a lower R² are reported as stable
pub const MIN_TREND_R_SQUARED: f64 = 0.25;

/// Persisted summary of one drift report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub horizon: Horizon,
    pub drift_score: f64,
    pub severity: DriftSeverity,
    pub drift_detected: bool,
}

impl DriftHistoryEntry {
    pub fn from_report(report: &DriftReport, horizon: Horizon) -> Self {
        Self {
            timestamp: report.timestamp,
            horizon,
            drift_score: report.drift_score(),
            severity: report.severity,
            drift_detected: report.drift_detected,
        }
    }
}

/// Direction of the drift score over the trend window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Improving,
    Stable,
    Worsening,
}

/// Trend over the recent drift history of one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftTrend {
    pub horizon: Horizon,
    /// Entries in the trend window
    pub window_entries: usize,
    /// Score change per entry
    pub slope: f64,
    pub r_squared: f64,
    pub direction: TrendDirection,
    /// HIGH entries at the end of the history with no lower severity between
    pub consecutive_high: usize,
    /// Whole days from the latest drift-free entry to the analysis time
    pub days_since_last_stable: Option<i64>,
    pub latest_severity: Option<DriftSeverity>,
    action_threshold: usize,
}

impl DriftTrend {
    /// Whether consecutive HIGH entries exceed the configured threshold
    pub fn requires_action(&self) -> bool {
        self.consecutive_high > self.action_threshold
    }

    /// Summarize a history (oldest first) at time `as_of`
    pub fn from_entries(
        entries: &[DriftHistoryEntry],
        horizon: Horizon,
        config: &DriftTrendConfig,
        as_of: DateTime<Utc>,
    ) -> Result<Self> {
        let window = &entries[entries.len().saturating_sub(config.window)..];
        let scores: Vec<f64> = window.iter().map(|e| e.drift_score).collect();

        let (slope, r_squared) = if scores.len() >= 2 {
            let fit = LinearRegression::fit_trailing(&scores, config.window.max(2))?;
            (fit.slope()?, fit.r_squared()?)
        } else {
            (0.0, 0.0)
        };

        let direction = if r_squared < MIN_TREND_R_SQUARED || slope.abs() <= config.flat_slope_tolerance
        {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Worsening
        } else {
            TrendDirection::Improving
        };

        let consecutive_high = entries
            .iter()
            .rev()
            .take_while(|e| e.severity == DriftSeverity::High)
            .count();

        let days_since_last_stable = entries
            .iter()
            .rev()
            .find(|e| !e.drift_detected)
            .map(|e| (as_of - e.timestamp).num_days());

        Ok(Self {
            horizon,
            window_entries: window.len(),
            slope,
            r_squared,
            direction,
            consecutive_high,
            days_since_last_stable,
            latest_severity: entries.last().map(|e| e.severity),
            action_threshold: config.consecutive_high_threshold,
        })
    }
}

/// Records drift reports and analyzes their trend per horizon
pub struct DriftTrendAnalyzer<S> {
    config: DriftTrendConfig,
    store: S,
}

impl<S: RecordStore<DriftHistoryEntry>> DriftTrendAnalyzer<S> {
    pub fn new(config: DriftTrendConfig, store: S) -> Result<Self> {
        if config.window < 2 {
            return Err(ForecastError::InvalidParameter(
                "Drift trend window must be at least 2".to_string(),
            ));
        }
        Ok(Self { config, store })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist the summary of a report
    pub fn record(&self, report: &DriftReport, horizon: Horizon) -> Result<DriftHistoryEntry> {
        let entry = DriftHistoryEntry::from_report(report, horizon);
        self.store.append(vec![entry.clone()])?;
        debug!(
            "Recorded drift score {} for {}",
            entry.drift_score, horizon
        );
        Ok(entry)
    }

    /// History of one horizon, oldest first
    pub fn history(&self, horizon: Horizon) -> Result<Vec<DriftHistoryEntry>> {
        let mut entries: Vec<DriftHistoryEntry> = self
            .store
            .load()?
            .into_iter()
            .filter(|e| e.horizon == horizon)
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    /// Trend of one horizon at time `as_of`
    pub fn analyze(&self, horizon: Horizon, as_of: DateTime<Utc>) -> Result<DriftTrend> {
        let entries = self.history(horizon)?;
        let trend = DriftTrend::from_entries(&entries, horizon, &self.config, as_of)?;
        if trend.requires_action() {
            info!(
                consecutive_high = trend.consecutive_high,
                "Drift on {} requires action", horizon
            );
        }
        Ok(trend)
    }
}
