//! # Forecast Engine
//!
//! Calibrated multi-horizon ensemble forecasting for a financial time series,
//! with guards against model decay.
//!
//! ## Features
//!
//! - Pluggable forecasters behind one contract, combined with static or
//!   inverse-error weights
//! - Realism caps on multi-step projections (daily and per-horizon)
//! - 80% and 95% prediction intervals widened per horizon and market regime
//! - Drift detection with a four-test battery and a longitudinal drift trend
//! - Regime classification (normal, high volatility, external shock, policy)
//! - Expanding and rolling walk-forward backtests
//! - Append-only prediction log with trailing accuracy metrics
//!
//! ## Quick Start
//!
//! ```no_run
//! use forecast_engine::config::{EngineConfig, Horizon};
//! use forecast_engine::data::DataLoader;
//! use forecast_engine::drift::DataDriftDetector;
//! use forecast_engine::pipeline::ForecastPipeline;
//!
//! # fn main() -> forecast_engine::Result<()> {
//! let config = EngineConfig::from_env();
//! let series = DataLoader::from_csv("prices.csv")?;
//!
//! // Calibrated 30-day forecast
//! let pipeline = ForecastPipeline::from_config(&config)?;
//! let package = pipeline.forecast(&series, Horizon::Days30)?;
//! for point in package.points() {
//!     println!("{} {:.2} [{:.2}, {:.2}]", point.date, point.mean, point.ci95_low, point.ci95_high);
//! }
//!
//! // Drift check on the trailing windows
//! let report = DataDriftDetector::new(config.drift.clone())?.detect(&series);
//! println!("{}", report.recommendation);
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod cache;
pub mod calibrator;
pub mod config;
pub mod data;
pub mod drift;
pub mod drift_trend;
pub mod ensemble;
pub mod error;
pub mod forecast;
pub mod models;
pub mod pipeline;
pub mod regime;
pub mod store;
pub mod telemetry;
pub mod tracker;
pub mod validator;

// Re-export commonly used types
pub use crate::alert::{should_alert, AlertDecision, AlertEvent};
pub use crate::calibrator::ConfidenceCalibrator;
pub use crate::config::{EngineConfig, Horizon, HorizonProfile, HorizonRegistry};
pub use crate::data::{DataLoader, TimeSeries};
pub use crate::drift::{DataDriftDetector, DriftReport, DriftSeverity};
pub use crate::drift_trend::{DriftTrend, DriftTrendAnalyzer};
pub use crate::ensemble::EnsembleCombiner;
pub use crate::error::{ForecastError, Result};
pub use crate::forecast::{ForecastPackage, ForecastPoint};
pub use crate::models::{ContextWindow, Forecaster, ForecasterKind, StepForecast};
pub use crate::pipeline::ForecastPipeline;
pub use crate::regime::{Regime, RegimeDetector, RegimeReport, RegimeSignals};
pub use crate::store::{JsonlStore, MemoryStore, RecordStore};
pub use crate::tracker::{PerformanceSummary, PredictionRecord, PredictionTracker};
pub use crate::validator::{ValidationMode, ValidationReport, WalkForwardValidator};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
