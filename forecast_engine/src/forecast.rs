//! Calibrated forecast output

use crate::config::Horizon;
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One calibrated forecast step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Target date of the step
    pub date: NaiveDate,
    /// Point forecast
    pub mean: f64,
    /// Lower bound of the 80% interval
    pub ci80_low: f64,
    /// Upper bound of the 80% interval
    pub ci80_high: f64,
    /// Lower bound of the 95% interval
    pub ci95_low: f64,
    /// Upper bound of the 95% interval
    pub ci95_high: f64,
    /// Standard deviation the intervals were derived from
    pub std_dev: f64,
}

impl ForecastPoint {
    /// Whether the interval bounds nest around the mean
    pub fn is_ordered(&self) -> bool {
        self.ci95_low <= self.ci80_low
            && self.ci80_low <= self.mean
            && self.mean <= self.ci80_high
            && self.ci80_high <= self.ci95_high
    }

    /// Whether `value` lies inside the 95% interval
    pub fn ci95_contains(&self, value: f64) -> bool {
        value >= self.ci95_low && value <= self.ci95_high
    }

    /// Whether `value` lies inside the 80% interval
    pub fn ci80_contains(&self, value: f64) -> bool {
        value >= self.ci80_low && value <= self.ci80_high
    }
}

/// Complete multi-step forecast for one horizon
///
/// Immutable once built; clones share the point buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPackage {
    horizon: Horizon,
    points: Arc<[ForecastPoint]>,
    methodology: String,
    error_metrics: BTreeMap<String, f64>,
    residual_vol: f64,
}

impl ForecastPackage {
    /// Build a package, checking length and interval ordering
    pub fn new(
        horizon: Horizon,
        points: Vec<ForecastPoint>,
        methodology: impl Into<String>,
        error_metrics: BTreeMap<String, f64>,
        residual_vol: f64,
    ) -> Result<Self> {
        if points.len() != horizon.days() {
            return Err(ForecastError::InvalidData(format!(
                "{} forecast needs {} points, got {}",
                horizon,
                horizon.days(),
                points.len()
            )));
        }
        if let Some(bad) = points.iter().find(|p| !p.is_ordered()) {
            return Err(ForecastError::InvalidData(format!(
                "Interval bounds out of order on {}",
                bad.date
            )));
        }
        if points.windows(2).any(|w| w[1].date <= w[0].date) {
            return Err(ForecastError::InvalidData(
                "Forecast dates must be strictly ascending".to_string(),
            ));
        }

        Ok(Self {
            horizon,
            points: points.into(),
            methodology: methodology.into(),
            error_metrics,
            residual_vol,
        })
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn methodology(&self) -> &str {
        &self.methodology
    }

    pub fn error_metrics(&self) -> &BTreeMap<String, f64> {
        &self.error_metrics
    }

    pub fn residual_vol(&self) -> f64 {
        self.residual_vol
    }

    /// Point for a target date
    pub fn point_on(&self, date: NaiveDate) -> Option<&ForecastPoint> {
        self.points
            .binary_search_by(|p| p.date.cmp(&date))
            .ok()
            .map(|i| &self.points[i])
    }

    /// Point forecasts in step order
    pub fn means(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.mean).collect()
    }

    /// Last step of the forecast
    pub fn final_point(&self) -> Option<&ForecastPoint> {
        self.points.last()
    }
}
