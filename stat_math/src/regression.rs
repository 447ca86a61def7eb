//! Rolling least-squares trend line
//!
//! Observations are indexed 0, 1, 2, ... in arrival order, so the slope is
//! the change per observation.

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Fitted line over the current window
#[derive(Debug, Clone, Copy, PartialEq)]
struct Fit {
    slope: f64,
    intercept: f64,
    r_squared: f64,
}

impl Fit {
    /// Closed-form fit against x = 0..n
    fn over(ys: &VecDeque<f64>) -> Option<Self> {
        let n = ys.len();
        if n < 2 {
            return None;
        }
        let nf = n as f64;
        let sum_x = nf * (nf - 1.0) / 2.0;
        let sum_xx = (nf - 1.0) * nf * (2.0 * nf - 1.0) / 6.0;
        let (sum_y, sum_xy) = ys
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(sy, sxy), (i, &y)| (sy + y, sxy + i as f64 * y));

        let slope = (nf * sum_xy - sum_x * sum_y) / (nf * sum_xx - sum_x * sum_x);
        let intercept = (sum_y - slope * sum_x) / nf;

        let y_bar = sum_y / nf;
        let (ss_tot, ss_res) = ys.iter().enumerate().fold((0.0, 0.0), |(t, r), (i, &y)| {
            let resid = y - (intercept + slope * i as f64);
            (t + (y - y_bar).powi(2), r + resid * resid)
        });
        // Flat window: nothing to explain
        let r_squared = if ss_tot < 1e-10 {
            0.0
        } else {
            (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
        };

        Some(Self {
            slope,
            intercept,
            r_squared,
        })
    }
}

/// Linear regression over the most recent `period` observations
#[derive(Debug, Clone)]
pub struct LinearRegression {
    period: usize,
    window: VecDeque<f64>,
    fit: Option<Fit>,
}

impl LinearRegression {
    pub fn new(period: usize) -> Result<Self> {
        if period < 2 {
            return Err(MathError::InvalidInput(format!(
                "Regression window of {} cannot define a line",
                period
            )));
        }
        Ok(Self {
            period,
            window: VecDeque::with_capacity(period),
            fit: None,
        })
    }

    /// Regression over the trailing `period` entries of `values`
    pub fn fit_trailing(values: &[f64], period: usize) -> Result<Self> {
        let mut lr = Self::new(period)?;
        values[values.len().saturating_sub(period)..]
            .iter()
            .try_for_each(|&v| lr.update(v))?;
        Ok(lr)
    }

    /// Push one observation, evicting the oldest once the window is full
    pub fn update(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "Cannot regress on non-finite value {}",
                value
            )));
        }
        if self.window.len() == self.period {
            self.window.pop_front();
        }
        self.window.push_back(value);
        self.fit = Fit::over(&self.window);
        Ok(())
    }

    fn current(&self) -> Result<Fit> {
        self.fit.ok_or_else(|| {
            MathError::InsufficientData(format!(
                "Regression needs two observations, has {}",
                self.window.len()
            ))
        })
    }

    /// Value predicted `periods_ahead` steps past the latest observation
    pub fn forecast(&self, periods_ahead: usize) -> Result<f64> {
        let fit = self.current()?;
        let x = (self.window.len() - 1 + periods_ahead) as f64;
        Ok(fit.intercept + fit.slope * x)
    }

    pub fn slope(&self) -> Result<f64> {
        self.current().map(|f| f.slope)
    }

    pub fn intercept(&self) -> Result<f64> {
        self.current().map(|f| f.intercept)
    }

    /// Coefficient of determination, 0.0 for a perfectly flat window
    pub fn r_squared(&self) -> Result<f64> {
        self.current().map(|f| f.r_squared)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.fit = None;
    }
}
