//! Holt linear-trend smoothing

use crate::{MathError, Result};

/// Smoothed level and per-step trend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoltState {
    pub level: f64,
    pub trend: f64,
}

impl HoltState {
    /// Point reached `h` steps ahead on the undamped trend line
    pub fn project(&self, h: usize) -> f64 {
        self.level + h as f64 * self.trend
    }
}

/// Double exponential smoothing with level weight `alpha` and trend weight `beta`
#[derive(Debug, Clone)]
pub struct DoubleExponentialSmoothing {
    alpha: f64,
    beta: f64,
    state: Option<HoltState>,
    values_seen: usize,
}

fn open_unit(name: &str, w: f64) -> Result<f64> {
    if w > 0.0 && w < 1.0 {
        Ok(w)
    } else {
        Err(MathError::InvalidInput(format!(
            "{} = {} lies outside (0, 1)",
            name, w
        )))
    }
}

impl DoubleExponentialSmoothing {
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        Ok(Self {
            alpha: open_unit("alpha", alpha)?,
            beta: open_unit("beta", beta)?,
            state: None,
            values_seen: 0,
        })
    }

    /// Absorb one observation; the first seeds the level with a zero trend
    pub fn update(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "Cannot smooth non-finite value {}",
                value
            )));
        }
        let next = match self.state {
            None => HoltState {
                level: value,
                trend: 0.0,
            },
            Some(prev) => {
                let level = self.alpha * value + (1.0 - self.alpha) * prev.project(1);
                HoltState {
                    level,
                    trend: self.beta * (level - prev.level) + (1.0 - self.beta) * prev.trend,
                }
            }
        };
        self.state = Some(next);
        self.values_seen += 1;
        Ok(())
    }

    pub fn state(&self) -> Result<HoltState> {
        self.state.ok_or_else(|| {
            MathError::InsufficientData("Smoother has not seen any values".to_string())
        })
    }

    pub fn forecast(&self, h: usize) -> Result<f64> {
        self.state().map(|s| s.project(h))
    }

    pub fn level(&self) -> Result<f64> {
        self.state().map(|s| s.level)
    }

    pub fn trend(&self) -> Result<f64> {
        self.state().map(|s| s.trend)
    }

    pub fn values_seen(&self) -> usize {
        self.values_seen
    }

    pub fn reset(&mut self) {
        self.state = None;
        self.values_seen = 0;
    }
}
