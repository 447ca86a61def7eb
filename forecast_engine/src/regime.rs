//! Market regime classification
//!
//! Signals are computed from the primary series and an optional correlated
//! driver series, then classified with a fixed priority: policy
//! intervention, external shock, high volatility, normal. Each regime maps to
//! a multiplier that widens forecast intervals.

use crate::config::RegimeConfig;
use crate::data::TimeSeries;
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use stat_math::descriptive::{mean, percentile_rank, simple_returns, std_dev, z_score};
use stat_math::rolling::{rolling_correlation, rolling_std};
use std::fmt;
use tracing::{debug, info};

/// Market regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Normal,
    HighVolatility,
    ExternalShock,
    PolicyIntervention,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Regime::Normal => "NORMAL",
            Regime::HighVolatility => "HIGH_VOLATILITY",
            Regime::ExternalShock => "EXTERNAL_SHOCK",
            Regime::PolicyIntervention => "POLICY_INTERVENTION",
        };
        write!(f, "{}", label)
    }
}

/// Raw inputs to regime classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSignals {
    /// Date the signals describe
    pub as_of: NaiveDate,
    /// Z-score of the current realized volatility against its lookback history
    pub vol_z_score: f64,
    /// Percentile (0-100) of the current realized volatility
    pub vol_percentile: f64,
    /// Current realized volatility of daily returns
    pub current_vol: f64,
    /// Short-window change of the primary series in percent
    pub primary_change_pct: f64,
    /// Short-window change of the driver series in percent
    pub driver_change_pct: Option<f64>,
    /// Rolling correlation left its historical band
    pub correlation_break: bool,
    /// Signed days from `as_of` to the nearest scheduled event (negative = past)
    pub days_to_event: Option<i64>,
}

impl RegimeSignals {
    /// Signals with only a volatility z-score set
    pub fn from_vol_z(as_of: NaiveDate, vol_z_score: f64) -> Self {
        Self {
            as_of,
            vol_z_score,
            vol_percentile: 50.0,
            current_vol: 0.0,
            primary_change_pct: 0.0,
            driver_change_pct: None,
            correlation_break: false,
            days_to_event: None,
        }
    }
}

/// Classified regime with its interval multiplier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeReport {
    pub signals: RegimeSignals,
    pub regime: Regime,
    /// Diagnostic confidence in the classification (0-100)
    pub confidence_pct: f64,
    /// Factor applied to forecast interval half-widths
    pub volatility_multiplier: f64,
    /// Regime-tagged operator guidance
    pub recommendation: String,
}

#[derive(Debug, Clone)]
pub struct RegimeDetector {
    config: RegimeConfig,
}

impl RegimeDetector {
    pub fn new(config: RegimeConfig) -> Result<Self> {
        if config.vol_window < 2 {
            return Err(ForecastError::InvalidParameter(
                "Volatility window must be at least 2".to_string(),
            ));
        }
        if config.lookback_days <= config.vol_window + 1 {
            return Err(ForecastError::InvalidParameter(format!(
                "Lookback {} must exceed the volatility window {}",
                config.lookback_days, config.vol_window
            )));
        }
        if config.shock_window_days == 0 || config.correlation_window < 3 {
            return Err(ForecastError::InvalidParameter(
                "Shock window must be positive and correlation window at least 3".to_string(),
            ));
        }
        if config.vol_z_span <= 0.0
            || config.vol_z_threshold <= 0.0
            || config.high_vol_multiplier_min < 1.0
            || config.high_vol_multiplier_max < config.high_vol_multiplier_min
        {
            return Err(ForecastError::InvalidParameter(
                "High-volatility multiplier ramp is invalid".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Compute and classify in one step
    pub fn detect(
        &self,
        primary: &TimeSeries,
        driver: Option<&TimeSeries>,
        as_of: NaiveDate,
    ) -> Result<RegimeReport> {
        let signals = self.compute_signals(primary, driver, as_of)?;
        Ok(self.classify(&signals))
    }

    /// Compute regime signals from data observed on or before `as_of`
    pub fn compute_signals(
        &self,
        primary: &TimeSeries,
        driver: Option<&TimeSeries>,
        as_of: NaiveDate,
    ) -> Result<RegimeSignals> {
        let cfg = &self.config;
        let snapshot = primary.until(as_of).tail(cfg.lookback_days);
        let needed = cfg.vol_window + 2;
        if snapshot.len() < needed.max(cfg.shock_window_days + 1) {
            return Err(ForecastError::DataInsufficient(format!(
                "Regime signals need {} observations of '{}', have {}",
                needed.max(cfg.shock_window_days + 1),
                primary.name(),
                snapshot.len()
            )));
        }

        let values = snapshot.values();
        let returns = simple_returns(&values);
        let vols = rolling_std(&returns, cfg.vol_window)?;
        let current_vol = vols.last().copied().unwrap_or(0.0);
        let vol_z_score = if vols.len() >= 2 {
            z_score(&vols, current_vol).unwrap_or(0.0)
        } else {
            0.0
        };
        let vol_percentile = percentile_rank(&vols, current_vol)?;
        let primary_change_pct = window_change_pct(&values, cfg.shock_window_days);

        let (driver_change_pct, correlation_break) = match driver {
            Some(driver) => {
                let aligned: Option<Vec<f64>> = snapshot
                    .observations()
                    .iter()
                    .map(|o| driver.at_or_before(o.date).map(|d| d.value))
                    .collect();
                match aligned {
                    Some(aligned) => (
                        Some(window_change_pct(&aligned, cfg.shock_window_days)),
                        self.correlation_break(&returns, &simple_returns(&aligned))?,
                    ),
                    None => {
                        debug!(
                            "Driver '{}' does not cover the primary window, ignoring it",
                            driver.name()
                        );
                        (None, false)
                    }
                }
            }
            None => (None, false),
        };

        let days_to_event = cfg
            .scheduled_events
            .iter()
            .map(|event| (*event - as_of).num_days())
            .min_by_key(|d| d.abs());

        Ok(RegimeSignals {
            as_of,
            vol_z_score,
            vol_percentile,
            current_vol,
            primary_change_pct,
            driver_change_pct,
            correlation_break,
            days_to_event,
        })
    }

    /// Whether the latest rolling correlation is outside the band of the
    /// earlier ones
    fn correlation_break(&self, primary_returns: &[f64], driver_returns: &[f64]) -> Result<bool> {
        let correlations =
            rolling_correlation(primary_returns, driver_returns, self.config.correlation_window)?;
        let Some((current, history)) = correlations.split_last() else {
            return Ok(false);
        };
        if history.len() < 3 {
            return Ok(false);
        }

        let centre = mean(history)?;
        let spread = std_dev(history)?;
        let band = self.config.correlation_band_sigma * spread;
        Ok((current - centre).abs() > band.max(1e-9))
    }

    /// Multiplier for a HIGH_VOLATILITY z-score
    pub fn high_vol_multiplier(&self, vol_z_score: f64) -> f64 {
        let cfg = &self.config;
        let excess = ((vol_z_score - cfg.vol_z_threshold) / cfg.vol_z_span).max(0.0);
        let range = cfg.high_vol_multiplier_max - cfg.high_vol_multiplier_min;
        (cfg.high_vol_multiplier_min + range * excess).min(cfg.high_vol_multiplier_max)
    }

    /// Classify signals; the first matching regime wins
    pub fn classify(&self, signals: &RegimeSignals) -> RegimeReport {
        let cfg = &self.config;

        let policy = signals
            .days_to_event
            .filter(|d| d.abs() <= cfg.policy_window_days);
        let shock = signals
            .driver_change_pct
            .filter(|c| c.abs() >= cfg.shock_threshold_pct && signals.correlation_break);

        let (regime, multiplier, confidence) = if let Some(days) = policy {
            let closeness = 1.0 - days.abs() as f64 / (cfg.policy_window_days + 1) as f64;
            (Regime::PolicyIntervention, cfg.policy_multiplier, 100.0 * closeness)
        } else if let Some(change) = shock {
            let excess = change.abs() / cfg.shock_threshold_pct - 1.0;
            (
                Regime::ExternalShock,
                cfg.external_shock_multiplier,
                (50.0 + 50.0 * excess).min(100.0),
            )
        } else if signals.vol_z_score >= cfg.vol_z_threshold {
            (
                Regime::HighVolatility,
                self.high_vol_multiplier(signals.vol_z_score),
                signals.vol_percentile,
            )
        } else {
            let calm = 1.0 - signals.vol_z_score.max(0.0) / cfg.vol_z_threshold;
            (Regime::Normal, 1.0, 100.0 * calm)
        };

        let recommendation = match regime {
            Regime::Normal => format!("[{}] Standard intervals apply", regime),
            _ => format!(
                "[{}] Widen forecast intervals by {:.2}x",
                regime, multiplier
            ),
        };

        info!(
            regime = %regime,
            multiplier,
            vol_z = signals.vol_z_score,
            "Regime classified"
        );

        RegimeReport {
            signals: signals.clone(),
            regime,
            confidence_pct: confidence.clamp(0.0, 100.0),
            volatility_multiplier: multiplier,
            recommendation,
        }
    }
}

fn window_change_pct(values: &[f64], window: usize) -> f64 {
    match (values.len().checked_sub(window + 1).map(|i| values[i]), values.last()) {
        (Some(start), Some(end)) if start.abs() > 1e-12 => (end / start - 1.0) * 100.0,
        _ => 0.0,
    }
}
