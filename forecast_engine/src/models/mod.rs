//! Forecaster contract and reference forecasters
//!
//! The ensemble depends only on the [`Forecaster`] trait. Production model
//! families (seasonal statistical, vector autoregression, tree ensembles,
//! foundation models) plug in by implementing it; the reference
//! implementations in this module cover the first two families.

use crate::data::TimeSeries;
use crate::error::{ForecastError, Result};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Debug};

pub mod autoregressive;
pub mod garch;
pub mod holt_garch;

pub use autoregressive::AutoregressiveForecaster;
pub use garch::GarchVolatility;
pub use holt_garch::HoltGarchForecaster;

/// Model family of a forecaster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecasterKind {
    /// Seasonal statistical mean model paired with a volatility model
    SeasonalStatistical,
    /// Vector autoregression over the primary and driver series
    VectorAutoregression,
    /// Gradient-boosted or bagged tree regressor
    TreeEnsemble,
    /// Pretrained foundation time-series model
    Foundation,
}

impl ForecasterKind {
    /// All families in a stable order
    pub const ALL: [ForecasterKind; 4] = [
        ForecasterKind::SeasonalStatistical,
        ForecasterKind::VectorAutoregression,
        ForecasterKind::TreeEnsemble,
        ForecasterKind::Foundation,
    ];
}

impl fmt::Display for ForecasterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ForecasterKind::SeasonalStatistical => "seasonal_statistical",
            ForecasterKind::VectorAutoregression => "vector_autoregression",
            ForecasterKind::TreeEnsemble => "tree_ensemble",
            ForecasterKind::Foundation => "foundation",
        };
        write!(f, "{}", label)
    }
}

/// Per-step prediction of one forecaster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepForecast {
    /// Point forecast
    pub mean: f64,
    /// Model-reported standard deviation, when the model has one
    pub std_dev: Option<f64>,
}

impl StepForecast {
    /// Point forecast without an uncertainty estimate
    pub fn point(mean: f64) -> Self {
        Self {
            mean,
            std_dev: None,
        }
    }

    /// Point forecast with a standard deviation
    pub fn with_std(mean: f64, std_dev: f64) -> Self {
        Self {
            mean,
            std_dev: Some(std_dev),
        }
    }
}

/// Read-only input handed to every forecaster
///
/// Holds the primary values, aligned driver series, and any steps already
/// projected by the constrained iterative walk. Projected steps extend the
/// primary values only; drivers stay at their observed length.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    values: Vec<f64>,
    drivers: BTreeMap<String, Vec<f64>>,
    last_observed_date: NaiveDate,
    observed_len: usize,
}

impl ContextWindow {
    /// Build a context from the trailing `length` observations of `primary`
    ///
    /// Driver series are forward-filled onto the primary dates; a driver with
    /// no observation at or before the first primary date is skipped.
    pub fn from_series(primary: &TimeSeries, drivers: &[TimeSeries], length: usize) -> Result<Self> {
        let window = primary.tail(length.max(1));
        let last = window.last().ok_or_else(|| {
            ForecastError::DataInsufficient(format!("Series '{}' is empty", primary.name()))
        })?;

        let mut aligned = BTreeMap::new();
        for driver in drivers {
            let values: Option<Vec<f64>> = window
                .observations()
                .iter()
                .map(|o| driver.at_or_before(o.date).map(|d| d.value))
                .collect();
            if let Some(values) = values {
                aligned.insert(driver.name().to_string(), values);
            }
        }

        Ok(Self {
            values: window.values(),
            drivers: aligned,
            last_observed_date: last.date,
            observed_len: window.len(),
        })
    }

    /// Context over raw values, mainly for model unit tests
    pub fn from_values(values: Vec<f64>, last_observed_date: NaiveDate) -> Self {
        let observed_len = values.len();
        Self {
            values,
            drivers: BTreeMap::new(),
            last_observed_date,
            observed_len,
        }
    }

    /// Primary values, observed followed by projected
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Latest value (projected if any steps were appended)
    pub fn last_value(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Latest observed (not projected) value
    pub fn last_observed_value(&self) -> Option<f64> {
        self.values[..self.observed_len].last().copied()
    }

    /// Observed values of a driver series, aligned to the observed primary values
    pub fn driver(&self, name: &str) -> Option<&[f64]> {
        self.drivers.get(name).map(|v| v.as_slice())
    }

    /// Names of the aligned driver series
    pub fn driver_names(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(|k| k.as_str())
    }

    /// Date of the latest observed value
    pub fn last_observed_date(&self) -> NaiveDate {
        self.last_observed_date
    }

    /// Number of observed values
    pub fn observed_len(&self) -> usize {
        self.observed_len
    }

    /// Number of projected values appended so far
    pub fn projected_len(&self) -> usize {
        self.values.len() - self.observed_len
    }

    /// Date of the step `step` days after the last observation (1-based)
    pub fn step_date(&self, step: usize) -> Option<NaiveDate> {
        self.last_observed_date.checked_add_days(Days::new(step as u64))
    }

    /// Append a projected value for the closed feedback loop
    pub(crate) fn push_projection(&mut self, value: f64) {
        self.values.push(value);
    }
}

/// Common interface for pluggable forecasters
///
/// Implementations must be deterministic for identical input and must report
/// failures as `ForecastError::ForecasterUnavailable` rather than panicking.
pub trait Forecaster: Debug + Send + Sync {
    /// Name of the forecaster (used as the prediction-log source label)
    fn name(&self) -> &str;

    /// Model family, which selects the ensemble weight
    fn kind(&self) -> ForecasterKind;

    /// Whether the model predicts one step at a time and must be walked forward
    fn is_single_step(&self) -> bool {
        false
    }

    /// Predict `steps` values following the context
    ///
    /// Single-step forecasters are only ever called with `steps == 1`.
    fn predict(&self, context: &ContextWindow, steps: usize) -> Result<Vec<StepForecast>>;
}

/// Shorthand for building the typed unavailability error
pub(crate) fn unavailable(name: &str, reason: impl Into<String>) -> ForecastError {
    ForecastError::ForecasterUnavailable {
        forecaster: name.to_string(),
        reason: reason.into(),
    }
}
