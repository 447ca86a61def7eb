//! Descriptive statistics over plain `f64` slices
//!
//! All dispersion measures use the sample (n - 1) denominator.

use crate::{MathError, Result};
use statrs::statistics::Statistics;

fn ensure_len(values: &[f64], min: usize, what: &str) -> Result<()> {
    if values.len() < min {
        return Err(MathError::InsufficientData(format!(
            "{} needs at least {} values, have {}",
            what,
            min,
            values.len()
        )));
    }
    Ok(())
}

/// Arithmetic mean
pub fn mean(values: &[f64]) -> Result<f64> {
    ensure_len(values, 1, "mean")?;
    Ok(values.iter().mean())
}

/// Sample variance
pub fn variance(values: &[f64]) -> Result<f64> {
    ensure_len(values, 2, "variance")?;
    Ok(values.iter().variance())
}

/// Sample standard deviation
pub fn std_dev(values: &[f64]) -> Result<f64> {
    Ok(variance(values)?.sqrt())
}

/// Median (average of the two middle values for even lengths)
pub fn median(values: &[f64]) -> Result<f64> {
    ensure_len(values, 1, "median")?;
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Ok((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Ok(sorted[mid])
    }
}

/// Percentage (0-100) of `history` values that are less than or equal to `value`
pub fn percentile_rank(history: &[f64], value: f64) -> Result<f64> {
    ensure_len(history, 1, "percentile rank")?;
    let below = history.iter().filter(|&&h| h <= value).count();
    Ok(below as f64 / history.len() as f64 * 100.0)
}

/// Standard score of `value` against the mean and sample deviation of `history`
pub fn z_score(history: &[f64], value: f64) -> Result<f64> {
    let mu = mean(history)?;
    let sigma = std_dev(history)?;
    if sigma < 1e-12 {
        return Err(MathError::CalculationError(
            "Cannot compute z-score: history has zero dispersion".to_string(),
        ));
    }
    Ok((value - mu) / sigma)
}

/// Pearson correlation coefficient between two equally long samples
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(MathError::InvalidInput(format!(
            "Samples have different lengths ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    ensure_len(a, 2, "correlation")?;

    let mean_a = mean(a)?;
    let mean_b = mean(b)?;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }

    let denom = (var_a * var_b).sqrt();
    if denom < 1e-12 {
        return Err(MathError::CalculationError(
            "Cannot compute correlation: a sample has zero variance".to_string(),
        ));
    }
    Ok(cov / denom)
}

/// Lag-`lag` autocorrelation of a demeaned series
pub fn autocorrelation(values: &[f64], lag: usize) -> Result<f64> {
    ensure_len(values, lag + 2, "autocorrelation")?;
    let mu = mean(values)?;
    let denom: f64 = values.iter().map(|v| (v - mu).powi(2)).sum();
    if denom < 1e-12 {
        return Err(MathError::CalculationError(
            "Cannot compute autocorrelation of a constant series".to_string(),
        ));
    }
    let numer: f64 = values
        .windows(lag + 1)
        .map(|w| (w[0] - mu) * (w[lag] - mu))
        .sum();
    Ok(numer / denom)
}

/// Simple returns `p[t] / p[t-1] - 1`
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    if prices.len() < 2 {
        return Vec::new();
    }

    prices.windows(2).map(|w| (w[1] / w[0]) - 1.0).collect()
}
