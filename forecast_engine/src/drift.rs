//! Distributional drift detection
//!
//! The trailing `baseline_size + test_size` observations are split into an
//! older baseline window and the newer test window that immediately follows
//! it. Four independent tests run on the pair:
//!
//! - Kolmogorov-Smirnov two-sample test (any change in distribution)
//! - Welch's t-test (level change)
//! - Brown-Forsythe test (volatility change)
//! - Ljung-Box test on the test window (serial correlation)
//!
//! A test that cannot be computed counts as not significant.

use crate::config::DriftConfig;
use crate::data::TimeSeries;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stat_math::descriptive::{mean, std_dev};
use stat_math::hypothesis::{
    brown_forsythe_test, default_ljung_box_lags, ks_two_sample, ljung_box, welch_t_test,
};
use stat_math::TestOutcome;
use std::fmt;
use tracing::{debug, info, warn};

pub const KS_TEST: &str = "kolmogorov_smirnov";
pub const MEAN_SHIFT_TEST: &str = "welch_t";
pub const VARIANCE_TEST: &str = "brown_forsythe";
pub const SERIAL_CORRELATION_TEST: &str = "ljung_box";

/// Drift severity, ordered from benign to severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftSeverity {
    None,
    Low,
    Medium,
    High,
}

impl DriftSeverity {
    /// Numeric drift score on a 0-100 scale
    pub fn score(&self) -> f64 {
        match self {
            DriftSeverity::None => 0.0,
            DriftSeverity::Low => 25.0,
            DriftSeverity::Medium => 60.0,
            DriftSeverity::High => 100.0,
        }
    }

    /// Severity from the number of failed tests, escalated to HIGH when the
    /// mean-shift test failed with a shift larger than `effect_threshold`
    /// baseline standard deviations
    pub fn classify(
        failed: usize,
        mean_shift_failed: bool,
        effect_size: Option<f64>,
        effect_threshold: f64,
    ) -> Self {
        let large_shift = mean_shift_failed
            && effect_size.map(|e| e.abs() > effect_threshold).unwrap_or(false);

        match failed {
            _ if large_shift => DriftSeverity::High,
            0 => DriftSeverity::None,
            1 => DriftSeverity::Low,
            2 => DriftSeverity::Medium,
            _ => DriftSeverity::High,
        }
    }

    /// Whether this severity is reported as drift
    pub fn is_drift(&self) -> bool {
        *self >= DriftSeverity::Medium
    }
}

impl fmt::Display for DriftSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DriftSeverity::None => "NONE",
            DriftSeverity::Low => "LOW",
            DriftSeverity::Medium => "MEDIUM",
            DriftSeverity::High => "HIGH",
        };
        write!(f, "{}", label)
    }
}

/// Outcome of one drift test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftTestResult {
    pub test_name: String,
    pub statistic: f64,
    pub p_value: f64,
    /// Whether the test rejected at the configured alpha
    pub drift_detected: bool,
    pub description: String,
}

impl DriftTestResult {
    fn from_outcome(
        name: &str,
        outcome: std::result::Result<TestOutcome, stat_math::MathError>,
        alpha: f64,
        what: &str,
    ) -> Self {
        match outcome {
            Ok(outcome) => {
                let detected = outcome.is_significant(alpha);
                let description = if detected {
                    format!("{} (p={:.4} < {})", what, outcome.p_value, alpha)
                } else {
                    format!("No {} (p={:.4})", what.to_lowercase(), outcome.p_value)
                };
                Self {
                    test_name: name.to_string(),
                    statistic: outcome.statistic,
                    p_value: outcome.p_value,
                    drift_detected: detected,
                    description,
                }
            }
            Err(e) => {
                warn!("Drift test {} could not run: {}", name, e);
                Self {
                    test_name: name.to_string(),
                    statistic: 0.0,
                    p_value: 1.0,
                    drift_detected: false,
                    description: format!("Test not run, treated as not significant: {}", e),
                }
            }
        }
    }
}

/// Result of one drift check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub tests: Vec<DriftTestResult>,
    pub severity: DriftSeverity,
    pub drift_detected: bool,
    pub baseline_mean: f64,
    pub baseline_std: f64,
    pub recent_mean: f64,
    pub recent_std: f64,
    pub baseline_size: usize,
    pub recent_size: usize,
    /// Mean shift in baseline standard deviations
    pub mean_shift_sigma: Option<f64>,
    /// Severity-tagged operator guidance
    pub recommendation: String,
    pub timestamp: DateTime<Utc>,
}

impl DriftReport {
    /// Tests that rejected their null hypothesis
    pub fn failed_tests(&self) -> Vec<&DriftTestResult> {
        self.tests.iter().filter(|t| t.drift_detected).collect()
    }

    /// Numeric drift score derived from the severity
    pub fn drift_score(&self) -> f64 {
        self.severity.score()
    }

    /// Result of a named test
    pub fn test(&self, name: &str) -> Option<&DriftTestResult> {
        self.tests.iter().find(|t| t.test_name == name)
    }

    /// Whether the report was produced without enough data to run the tests
    pub fn is_insufficient(&self) -> bool {
        self.tests.is_empty()
    }
}

fn recommendation(severity: DriftSeverity) -> String {
    let text = match severity {
        DriftSeverity::None => "No significant drift; continue routine monitoring",
        DriftSeverity::Low => "Minor drift in one test; monitor closely",
        DriftSeverity::Medium => "Moderate drift; review recent accuracy and consider retraining",
        DriftSeverity::High => "Severe drift; retrain models and treat forecasts with caution",
    };
    format!("[{}] {}", severity, text)
}

fn summary(values: &[f64]) -> (f64, f64) {
    (
        mean(values).unwrap_or(0.0),
        std_dev(values).unwrap_or(0.0),
    )
}

/// Hypothesis-test battery over a baseline and a test window
#[derive(Debug, Clone)]
pub struct DataDriftDetector {
    config: DriftConfig,
}

impl DataDriftDetector {
    pub fn new(config: DriftConfig) -> Result<Self> {
        if config.baseline_size < 2 || config.test_size < 2 {
            return Err(ForecastError::InvalidParameter(
                "Drift windows need at least two observations each".to_string(),
            ));
        }
        if !(config.alpha > 0.0 && config.alpha < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Alpha {} must lie in (0, 1)",
                config.alpha
            )));
        }
        if config.ljung_box_lags == Some(0) {
            return Err(ForecastError::InvalidParameter(
                "Ljung-Box lags must be positive".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Detector with explicit window sizes and alpha, other settings default
    pub fn with_windows(baseline_size: usize, test_size: usize, alpha: f64) -> Result<Self> {
        Self::new(DriftConfig {
            baseline_size,
            test_size,
            alpha,
            ..DriftConfig::default()
        })
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Check the trailing windows of a series
    pub fn detect(&self, series: &TimeSeries) -> DriftReport {
        let snapshot = series.tail(self.config.baseline_size + self.config.test_size);
        debug!(
            "Running drift battery on '{}' ({} observations)",
            series.name(),
            snapshot.len()
        );
        self.detect_values(&snapshot.values())
    }

    /// Check the trailing windows of raw values
    pub fn detect_values(&self, values: &[f64]) -> DriftReport {
        self.detect_values_at(values, Utc::now())
    }

    /// Check the trailing windows of raw values with an explicit timestamp
    pub fn detect_values_at(&self, values: &[f64], timestamp: DateTime<Utc>) -> DriftReport {
        let b = self.config.baseline_size;
        let t = self.config.test_size;

        if values.len() < b + t {
            let recent = &values[values.len().saturating_sub(t)..];
            let baseline = &values[..values.len() - recent.len()];
            let (baseline_mean, baseline_std) = summary(baseline);
            let (recent_mean, recent_std) = summary(recent);
            info!(
                "Drift check skipped: {} observations, {} required",
                values.len(),
                b + t
            );
            return DriftReport {
                tests: Vec::new(),
                severity: DriftSeverity::None,
                drift_detected: false,
                baseline_mean,
                baseline_std,
                recent_mean,
                recent_std,
                baseline_size: baseline.len(),
                recent_size: recent.len(),
                mean_shift_sigma: None,
                recommendation: format!(
                    "[{}] Insufficient data: need {} observations, have {}",
                    DriftSeverity::None,
                    b + t,
                    values.len()
                ),
                timestamp,
            };
        }

        let window = &values[values.len() - (b + t)..];
        let (baseline, recent) = window.split_at(b);
        let alpha = self.config.alpha;
        let lags = self
            .config
            .ljung_box_lags
            .unwrap_or_else(|| default_ljung_box_lags(recent.len()));

        let tests = vec![
            DriftTestResult::from_outcome(
                KS_TEST,
                ks_two_sample(baseline, recent),
                alpha,
                "Distribution change",
            ),
            DriftTestResult::from_outcome(
                MEAN_SHIFT_TEST,
                welch_t_test(baseline, recent),
                alpha,
                "Mean shift",
            ),
            DriftTestResult::from_outcome(
                VARIANCE_TEST,
                brown_forsythe_test(baseline, recent),
                alpha,
                "Variance change",
            ),
            DriftTestResult::from_outcome(
                SERIAL_CORRELATION_TEST,
                ljung_box(recent, lags),
                alpha,
                "Serial correlation",
            ),
        ];

        let (baseline_mean, baseline_std) = summary(baseline);
        let (recent_mean, recent_std) = summary(recent);
        let mean_shift_sigma =
            (baseline_std > 1e-12).then(|| (recent_mean - baseline_mean) / baseline_std);

        let failed = tests.iter().filter(|t| t.drift_detected).count();
        let mean_shift_failed = tests
            .iter()
            .any(|t| t.test_name == MEAN_SHIFT_TEST && t.drift_detected);
        let severity = DriftSeverity::classify(
            failed,
            mean_shift_failed,
            mean_shift_sigma,
            self.config.effect_size_threshold,
        );

        info!(
            severity = %severity,
            failed_tests = failed,
            "Drift battery complete"
        );

        DriftReport {
            tests,
            severity,
            drift_detected: severity.is_drift(),
            baseline_mean,
            baseline_std,
            recent_mean,
            recent_std,
            baseline_size: baseline.len(),
            recent_size: recent.len(),
            mean_shift_sigma,
            recommendation: recommendation(severity),
            timestamp,
        }
    }
}
