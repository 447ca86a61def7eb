//! # Stat Math
//!
//! Statistical primitives used by the forecasting engine.
//! This crate provides descriptive statistics, rolling-window estimators,
//! normal quantiles, the two-sample hypothesis tests behind drift detection,
//! Holt smoothing and a rolling linear regression.

use thiserror::Error;

pub mod descriptive;
pub mod distributions;
pub mod hypothesis;
pub mod regression;
pub mod rolling;
pub mod smoothing;

pub use crate::hypothesis::TestOutcome;

/// Errors that can occur in statistical calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for statistical operations
pub type Result<T> = std::result::Result<T, MathError>;

impl From<statrs::StatsError> for MathError {
    fn from(err: statrs::StatsError) -> Self {
        MathError::CalculationError(err.to_string())
    }
}
