//! Autoregression on returns with lagged driver-series returns

use crate::config::ForecasterParams;
use crate::error::{ForecastError, Result};
use crate::models::{unavailable, ContextWindow, Forecaster, ForecasterKind, StepForecast};
use nalgebra::{DMatrix, DVector};
use stat_math::descriptive::simple_returns;

/// Ridge term keeping the normal equations well conditioned
const RIDGE: f64 = 1e-8;

/// Extra rows required beyond the number of coefficients
const MIN_DEGREES_OF_FREEDOM: usize = 5;

/// One-step AR(p) model on simple returns, extended with each driver's
/// lag-1 return (a single-equation slice of a vector autoregression)
///
/// The model predicts one step only; the ensemble walks it forward through
/// the constrained projection. Beyond the observed data, driver returns are
/// taken as zero.
#[derive(Debug, Clone)]
pub struct AutoregressiveForecaster {
    /// Name of the model
    name: String,
    /// Number of own-return lags
    lags: usize,
    /// Whether aligned driver series enter the regression
    use_drivers: bool,
}

/// Fitted coefficients for one prediction
struct Fit {
    coefficients: DVector<f64>,
    residual_std: f64,
    drivers: Vec<String>,
}

impl AutoregressiveForecaster {
    /// Create a new autoregressive forecaster
    pub fn new(lags: usize, use_drivers: bool) -> Result<Self> {
        if lags == 0 {
            return Err(ForecastError::InvalidParameter(
                "Autoregression needs at least one lag".to_string(),
            ));
        }

        Ok(Self {
            name: format!("var(p={},drivers={})", lags, use_drivers),
            lags,
            use_drivers,
        })
    }

    /// Create from horizon-profile parameters
    pub fn from_params(params: &ForecasterParams) -> Result<Self> {
        Self::new(params.ar_lags, true)
    }

    fn fit(&self, context: &ContextWindow) -> Result<Fit> {
        let observed = &context.values()[..context.observed_len()];
        let returns = simple_returns(observed);
        let drivers: Vec<String> = if self.use_drivers {
            context.driver_names().map(str::to_string).collect()
        } else {
            Vec::new()
        };
        let driver_returns: Vec<Vec<f64>> = drivers
            .iter()
            .filter_map(|name| context.driver(name))
            .map(simple_returns)
            .collect();

        let k = 1 + self.lags + driver_returns.len();
        if returns.len() < self.lags + k + MIN_DEGREES_OF_FREEDOM {
            return Err(unavailable(
                &self.name,
                format!(
                    "needs {} returns for {} coefficients, have {}",
                    self.lags + k + MIN_DEGREES_OF_FREEDOM,
                    k,
                    returns.len()
                ),
            ));
        }

        let rows = returns.len() - self.lags;
        let mut design = Vec::with_capacity(rows * k);
        let mut target = Vec::with_capacity(rows);
        for t in self.lags..returns.len() {
            design.push(1.0);
            for lag in 1..=self.lags {
                design.push(returns[t - lag]);
            }
            for dr in &driver_returns {
                design.push(dr[t - 1]);
            }
            target.push(returns[t]);
        }

        let x = DMatrix::from_row_slice(rows, k, &design);
        let y = DVector::from_vec(target);
        let xt = x.transpose();
        let mut xtx = &xt * &x;
        for i in 0..k {
            xtx[(i, i)] += RIDGE;
        }
        let xty = &xt * &y;
        let coefficients = xtx
            .lu()
            .solve(&xty)
            .ok_or_else(|| unavailable(&self.name, "singular design matrix"))?;

        let residuals = &y - &x * &coefficients;
        let dof = (rows.saturating_sub(k)).max(1) as f64;
        let residual_std = (residuals.iter().map(|r| r * r).sum::<f64>() / dof).sqrt();

        Ok(Fit {
            coefficients,
            residual_std,
            drivers,
        })
    }
}

impl Forecaster for AutoregressiveForecaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ForecasterKind {
        ForecasterKind::VectorAutoregression
    }

    fn is_single_step(&self) -> bool {
        true
    }

    fn predict(&self, context: &ContextWindow, steps: usize) -> Result<Vec<StepForecast>> {
        if steps != 1 {
            return Err(unavailable(
                &self.name,
                format!("single-step model asked for {} steps", steps),
            ));
        }

        let fit = self.fit(context)?;
        let values = context.values();
        let returns = simple_returns(values);
        let last = context
            .last_value()
            .ok_or_else(|| unavailable(&self.name, "empty context"))?;

        let mut features = Vec::with_capacity(fit.coefficients.len());
        features.push(1.0);
        for lag in 1..=self.lags {
            features.push(returns[returns.len() - lag]);
        }
        for name in &fit.drivers {
            // Driver returns are only known up to the last observation
            let latest = match context.driver(name) {
                Some(d) if context.projected_len() == 0 && d.len() >= 2 => {
                    d[d.len() - 1] / d[d.len() - 2] - 1.0
                }
                _ => 0.0,
            };
            features.push(latest);
        }

        let predicted_return: f64 = features
            .iter()
            .zip(fit.coefficients.iter())
            .map(|(f, c)| f * c)
            .sum();
        if !predicted_return.is_finite() {
            return Err(unavailable(&self.name, "non-finite prediction"));
        }

        Ok(vec![StepForecast::with_std(
            last * (1.0 + predicted_return),
            last.abs() * fit.residual_std,
        )])
    }
}
