//! Rolling-window estimators
//!
//! Each function returns one value per complete window, so the output has
//! `len - window + 1` entries (empty when the input is shorter than the window).

use crate::descriptive::{pearson_correlation, std_dev};
use crate::{MathError, Result};

fn check_window(window: usize) -> Result<()> {
    if window < 2 {
        return Err(MathError::InvalidInput(
            "Rolling window must span at least two observations".to_string(),
        ));
    }
    Ok(())
}

/// Rolling sample standard deviation
pub fn rolling_std(values: &[f64], window: usize) -> Result<Vec<f64>> {
    check_window(window)?;
    if values.len() < window {
        return Ok(Vec::new());
    }

    values.windows(window).map(std_dev).collect()
}

/// Rolling Pearson correlation between two aligned series
///
/// Windows where either side is constant are skipped rather than failing the
/// whole computation.
pub fn rolling_correlation(a: &[f64], b: &[f64], window: usize) -> Result<Vec<f64>> {
    check_window(window)?;
    if a.len() != b.len() {
        return Err(MathError::InvalidInput(format!(
            "Series have different lengths ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    if a.len() < window {
        return Ok(Vec::new());
    }

    Ok(a
        .windows(window)
        .zip(b.windows(window))
        .filter_map(|(wa, wb)| pearson_correlation(wa, wb).ok())
        .collect())
}
