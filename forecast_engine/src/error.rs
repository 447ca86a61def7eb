//! Error types for the forecast_engine crate

use thiserror::Error;

/// Custom error types for the forecast_engine crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// A window or series is shorter than the operation requires
    #[error("Insufficient data: {0}")]
    DataInsufficient(String),

    /// A single forecaster could not produce a prediction; the ensemble drops it
    #[error("Forecaster '{forecaster}' unavailable: {reason}")]
    ForecasterUnavailable { forecaster: String, reason: String },

    /// Every ensemble member failed
    #[error("Ensemble exhausted: {0}")]
    EnsembleExhausted(String),

    /// An exclusive store lock could not be acquired in time
    #[error("Timed out after {waited_ms} ms waiting for lock on {resource}")]
    LockTimeout { resource: String, waited_ms: u64 },

    /// Walk-forward fold parameters are invalid
    #[error("Validation config error: {0}")]
    ValidationConfig(String),

    /// Malformed boundary input (ordering, duplicates, non-finite values)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A record with the same identity already exists in an append-only log
    #[error("Duplicate record: {0}")]
    DuplicateRecord(String),

    /// A long-running operation was cancelled between units of work
    #[error("Cancelled after {completed_folds} completed folds")]
    Cancelled { completed_folds: usize },

    /// Error from statistical primitives
    #[error("Math error: {0}")]
    Math(#[from] stat_math::MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from CSV parsing
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error from JSON (de)serialization of persisted records
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error from parsing a TOML configuration file
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<toml::de::Error> for ForecastError {
    fn from(err: toml::de::Error) -> Self {
        ForecastError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ForecastError {
    fn from(err: toml::ser::Error) -> Self {
        ForecastError::Config(err.to_string())
    }
}

impl ForecastError {
    /// Whether the failure is local to one component and can be recovered from
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ForecastError::ForecasterUnavailable { .. })
    }
}
