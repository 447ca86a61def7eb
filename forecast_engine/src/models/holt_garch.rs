//! Holt trend model with GARCH uncertainty

use crate::config::ForecasterParams;
use crate::error::Result;
use crate::models::garch::GarchVolatility;
use crate::models::{unavailable, ContextWindow, Forecaster, ForecasterKind, StepForecast};
use stat_math::smoothing::DoubleExponentialSmoothing;

/// Minimum context length for a stable level/trend and volatility fit
const MIN_CONTEXT: usize = 10;

/// Holt linear-trend mean with a GARCH(1,1) standard deviation per step
///
/// The trend is damped so long horizons do not extrapolate a short-lived
/// drift indefinitely.
#[derive(Debug, Clone)]
pub struct HoltGarchForecaster {
    /// Name of the model
    name: String,
    /// Level smoothing weight
    alpha: f64,
    /// Trend smoothing weight
    beta: f64,
    /// Trend damping factor per step
    damping: f64,
}

impl HoltGarchForecaster {
    /// Create a new Holt/GARCH forecaster
    pub fn new(alpha: f64, beta: f64, damping: f64) -> Result<Self> {
        // Validate smoothing weights up front
        DoubleExponentialSmoothing::new(alpha, beta)?;
        if !(0.0..=1.0).contains(&damping) {
            return Err(crate::error::ForecastError::InvalidParameter(
                "Damping must be between 0 and 1".to_string(),
            ));
        }

        Ok(Self {
            name: format!("holt_garch(alpha={},beta={},phi={})", alpha, beta, damping),
            alpha,
            beta,
            damping,
        })
    }

    /// Create from horizon-profile parameters
    pub fn from_params(params: &ForecasterParams) -> Result<Self> {
        Self::new(params.smoothing_alpha, params.smoothing_beta, params.trend_damping)
    }
}

impl Forecaster for HoltGarchForecaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ForecasterKind {
        ForecasterKind::SeasonalStatistical
    }

    fn predict(&self, context: &ContextWindow, steps: usize) -> Result<Vec<StepForecast>> {
        let values = context.values();
        if values.len() < MIN_CONTEXT {
            return Err(unavailable(
                &self.name,
                format!("needs {} context values, have {}", MIN_CONTEXT, values.len()),
            ));
        }

        let mut smoother = DoubleExponentialSmoothing::new(self.alpha, self.beta)?;
        for &v in values {
            smoother.update(v)?;
        }
        let level = smoother.level()?;
        let trend = smoother.trend()?;

        let garch =
            GarchVolatility::fit(values).map_err(|e| unavailable(&self.name, e.to_string()))?;
        let cumulative_std = garch.cumulative_std_path(steps);

        let mut forecasts = Vec::with_capacity(steps);
        let mut damped_sum = 0.0;
        let mut phi_power = 1.0;
        for std in cumulative_std {
            phi_power *= self.damping;
            damped_sum += phi_power;
            let mean = level + damped_sum * trend;
            forecasts.push(StepForecast::with_std(mean, mean.abs() * std));
        }

        Ok(forecasts)
    }
}
