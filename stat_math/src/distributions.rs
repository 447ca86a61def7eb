//! Normal-distribution quantiles for interval construction

use crate::{MathError, Result};
use statrs::distribution::{ContinuousCDF, Normal};

/// Quantile of the standard normal distribution at probability `p`
pub fn normal_quantile(p: f64) -> Result<f64> {
    if !(p > 0.0 && p < 1.0) {
        return Err(MathError::InvalidInput(format!(
            "Probability must be strictly between 0 and 1, got {}",
            p
        )));
    }

    let standard = Normal::new(0.0, 1.0)?;
    Ok(standard.inverse_cdf(p))
}

/// Two-sided critical value for a central interval with the given coverage
///
/// `two_sided_z(0.95)` is the familiar 1.96.
pub fn two_sided_z(confidence_level: f64) -> Result<f64> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(MathError::InvalidInput(format!(
            "Confidence level must be strictly between 0 and 1, got {}",
            confidence_level
        )));
    }
    normal_quantile(0.5 + confidence_level / 2.0)
}
