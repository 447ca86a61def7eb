//! GARCH(1,1) volatility for per-step forecast uncertainty

use crate::error::{ForecastError, Result};
use stat_math::descriptive::simple_returns;

/// GARCH(1,1) variance model on simple returns
///
/// Parameters follow the usual equity-style calibration (alpha + beta = 0.95)
/// with omega chosen so the long-run variance equals the sample variance.
#[derive(Debug, Clone)]
pub struct GarchVolatility {
    /// ARCH weight
    alpha: f64,
    /// GARCH weight
    beta: f64,
    /// Constant term
    omega: f64,
    /// Conditional variance after the last observed return
    last_variance: f64,
    /// Squared last return, feeding the first forecast step
    last_squared_return: f64,
}

impl GarchVolatility {
    /// Fit on a price series
    pub fn fit(prices: &[f64]) -> Result<Self> {
        Self::fit_with(prices, 0.10, 0.85)
    }

    /// Fit on a price series with explicit ARCH and GARCH weights
    pub fn fit_with(prices: &[f64], alpha: f64, beta: f64) -> Result<Self> {
        if alpha < 0.0 || beta < 0.0 || alpha + beta >= 1.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "GARCH weights must be non-negative with alpha + beta < 1 (got {} + {})",
                alpha, beta
            )));
        }

        let returns = simple_returns(prices);
        if returns.len() < 3 {
            return Err(ForecastError::DataInsufficient(format!(
                "GARCH(1,1) needs at least 4 prices, have {}",
                prices.len()
            )));
        }

        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let sample_var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() - 1) as f64;
        let omega = sample_var * (1.0 - alpha - beta);

        // Run the filter from the unconditional variance
        let mut variance = sample_var;
        for r in &returns {
            variance = omega + alpha * (r - mean).powi(2) + beta * variance;
        }
        let last_return = returns[returns.len() - 1] - mean;

        Ok(Self {
            alpha,
            beta,
            omega,
            last_variance: variance,
            last_squared_return: last_return.powi(2),
        })
    }

    /// Long-run (unconditional) return variance
    pub fn long_run_variance(&self) -> f64 {
        self.omega / (1.0 - self.alpha - self.beta)
    }

    /// Per-step conditional return variances for the next `horizon` steps
    pub fn variance_path(&self, horizon: usize) -> Vec<f64> {
        let persistence = self.alpha + self.beta;
        let long_run = self.long_run_variance();
        let mut path = Vec::with_capacity(horizon);

        if horizon == 0 {
            return path;
        }

        let mut next =
            self.omega + self.alpha * self.last_squared_return + self.beta * self.last_variance;
        path.push(next);
        for _ in 1..horizon {
            // Mean reversion towards the long-run variance
            next = long_run + persistence * (next - long_run);
            path.push(next);
        }

        path
    }

    /// Standard deviation of the cumulative return from now to each step
    pub fn cumulative_std_path(&self, horizon: usize) -> Vec<f64> {
        let mut total = 0.0;
        self.variance_path(horizon)
            .into_iter()
            .map(|v| {
                total += v;
                total.sqrt()
            })
            .collect()
    }
}
