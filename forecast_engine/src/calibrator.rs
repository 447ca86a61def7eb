//! Prediction interval calibration
//!
//! Interval half-widths come from the model-reported standard deviation, or
//! from residual volatility when a step only has a point estimate. Both are
//! scaled by the normal quantile of the interval level, then widened by the
//! horizon and regime multipliers and re-centred on the point forecast.

use crate::config::{CalibrationConfig, HorizonProfile};
use crate::data::TimeSeries;
use crate::ensemble::CombinedStep;
use crate::error::{ForecastError, Result};
use crate::forecast::{ForecastPackage, ForecastPoint};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use stat_math::descriptive::{simple_returns, std_dev};
use stat_math::distributions::two_sided_z;

fn scaled_half_width(
    std_dev: f64,
    z: f64,
    horizon_multiplier: f64,
    regime_multiplier: f64,
) -> Result<f64> {
    if !std_dev.is_finite() || std_dev < 0.0 {
        return Err(ForecastError::InvalidParameter(format!(
            "Standard deviation must be finite and non-negative, got {}",
            std_dev
        )));
    }
    Ok(std_dev * z * horizon_multiplier * regime_multiplier)
}

/// Fraction of realized values inside a package's intervals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Steps with a realized value
    pub matched: usize,
    pub ci80: f64,
    pub ci95: f64,
}

/// Derives and widens prediction intervals
#[derive(Debug, Clone)]
pub struct ConfidenceCalibrator {
    config: CalibrationConfig,
    z_inner: f64,
    z_outer: f64,
}

impl ConfidenceCalibrator {
    pub fn new(config: CalibrationConfig) -> Result<Self> {
        if !(config.inner_level > 0.0
            && config.inner_level < config.outer_level
            && config.outer_level < 1.0)
        {
            return Err(ForecastError::InvalidParameter(format!(
                "Interval levels {} and {} must satisfy 0 < inner < outer < 1",
                config.inner_level, config.outer_level
            )));
        }
        if config.residual_window < 2 {
            return Err(ForecastError::InvalidParameter(
                "Residual window must be at least 2".to_string(),
            ));
        }

        Ok(Self {
            z_inner: two_sided_z(config.inner_level)?,
            z_outer: two_sided_z(config.outer_level)?,
            config,
        })
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Standard deviation of the trailing simple returns
    pub fn residual_volatility(&self, values: &[f64]) -> Result<f64> {
        let start = values.len().saturating_sub(self.config.residual_window + 1);
        let returns = simple_returns(&values[start..]);
        if returns.len() < 2 {
            return Err(ForecastError::DataInsufficient(format!(
                "Residual volatility needs at least 3 values, got {}",
                values.len()
            )));
        }
        Ok(std_dev(&returns)?)
    }

    /// Half-width of a two-sided interval at `level`
    pub fn half_width(
        &self,
        std_dev: f64,
        level: f64,
        horizon_multiplier: f64,
        regime_multiplier: f64,
    ) -> Result<f64> {
        scaled_half_width(std_dev, two_sided_z(level)?, horizon_multiplier, regime_multiplier)
    }

    /// Calibrated point for one step
    pub fn calibrate_point(
        &self,
        date: NaiveDate,
        mean: f64,
        std_dev: f64,
        horizon_multiplier: f64,
        regime_multiplier: f64,
    ) -> Result<ForecastPoint> {
        let inner = scaled_half_width(std_dev, self.z_inner, horizon_multiplier, regime_multiplier)?;
        let outer = scaled_half_width(std_dev, self.z_outer, horizon_multiplier, regime_multiplier)?;

        Ok(ForecastPoint {
            date,
            mean,
            ci80_low: mean - inner,
            ci80_high: mean + inner,
            ci95_low: mean - outer,
            ci95_high: mean + outer,
            std_dev,
        })
    }

    /// Calibrate a combined path
    ///
    /// Steps without a model standard deviation use `residual_vol * |mean|`
    /// grown by `sqrt(step)`. Dates are consecutive calendar days after
    /// `last_date`.
    pub fn calibrate(
        &self,
        steps: &[CombinedStep],
        last_date: NaiveDate,
        profile: &HorizonProfile,
        residual_vol: f64,
        regime_multiplier: f64,
    ) -> Result<Vec<ForecastPoint>> {
        if regime_multiplier < 1.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "Regime multiplier {} is below 1",
                regime_multiplier
            )));
        }

        steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let n = i + 1;
                let date = last_date
                    .checked_add_days(chrono::Days::new(n as u64))
                    .ok_or_else(|| {
                        ForecastError::InvalidData(format!("Date overflow after {}", last_date))
                    })?;
                let std = step
                    .std_dev
                    .unwrap_or_else(|| residual_vol * step.mean.abs() * (n as f64).sqrt());
                self.calibrate_point(
                    date,
                    step.mean,
                    std,
                    profile.confidence_multiplier,
                    regime_multiplier,
                )
            })
            .collect()
    }

    /// Share of realized values that fell inside the package's intervals
    pub fn empirical_coverage(
        package: &ForecastPackage,
        actuals: &TimeSeries,
    ) -> Result<CoverageReport> {
        let pairs: Vec<(&ForecastPoint, f64)> = package
            .points()
            .iter()
            .filter_map(|p| actuals.value_on(p.date).map(|a| (p, a)))
            .collect();

        if pairs.is_empty() {
            return Err(ForecastError::DataInsufficient(
                "No realized values overlap the forecast dates".to_string(),
            ));
        }

        let n = pairs.len() as f64;
        let ci80 = pairs.iter().filter(|(p, a)| p.ci80_contains(*a)).count() as f64 / n;
        let ci95 = pairs.iter().filter(|(p, a)| p.ci95_contains(*a)).count() as f64 / n;

        Ok(CoverageReport {
            matched: pairs.len(),
            ci80,
            ci95,
        })
    }
}
