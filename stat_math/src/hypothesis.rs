//! Two-sample and serial-correlation hypothesis tests
//!
//! Each test returns a [`TestOutcome`] holding the test statistic and its
//! p-value. Callers decide significance against their own alpha.
//!
//! - Kolmogorov-Smirnov two-sample test (any distributional change)
//! - Welch's t-test (location change, unequal variances)
//! - Brown-Forsythe test (median-centred Levene, scale change)
//! - Ljung-Box portmanteau test (serial correlation)

use crate::descriptive::{autocorrelation, mean, median, variance};
use crate::{MathError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, StudentsT};

/// Statistic and p-value of a hypothesis test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Test statistic
    pub statistic: f64,
    /// Probability of a statistic at least this extreme under the null
    pub p_value: f64,
}

impl TestOutcome {
    fn new(statistic: f64, p_value: f64) -> Self {
        Self {
            statistic,
            p_value: p_value.clamp(0.0, 1.0),
        }
    }

    /// Whether the null hypothesis is rejected at level `alpha`
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

fn ensure_sample(values: &[f64], min: usize, test: &str) -> Result<()> {
    if values.len() < min {
        return Err(MathError::InsufficientData(format!(
            "{} needs at least {} observations per sample, have {}",
            test,
            min,
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(MathError::InvalidInput(format!(
            "{} received a non-finite observation",
            test
        )));
    }
    Ok(())
}

/// Kolmogorov-Smirnov two-sample test
///
/// The p-value uses the asymptotic Kolmogorov distribution with Stephens'
/// small-sample correction of the effective sample size.
pub fn ks_two_sample(a: &[f64], b: &[f64]) -> Result<TestOutcome> {
    ensure_sample(a, 1, "KS test")?;
    ensure_sample(b, 1, "KS test")?;

    let mut xs = a.to_vec();
    let mut ys = b.to_vec();
    xs.sort_by(|p, q| p.total_cmp(q));
    ys.sort_by(|p, q| p.total_cmp(q));

    let n1 = xs.len() as f64;
    let n2 = ys.len() as f64;
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;

    while i < xs.len() && j < ys.len() {
        let x = xs[i];
        let y = ys[j];
        if x <= y {
            while i < xs.len() && xs[i] == x {
                i += 1;
            }
        }
        if y <= x {
            while j < ys.len() && ys[j] == y {
                j += 1;
            }
        }
        d = d.max((i as f64 / n1 - j as f64 / n2).abs());
    }

    let en = (n1 * n2 / (n1 + n2)).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * d;
    Ok(TestOutcome::new(d, kolmogorov_survival(lambda)))
}

/// Survival function of the Kolmogorov distribution
fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda < 1e-6 {
        return 1.0;
    }

    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut previous_term: f64 = 0.0;

    for j in 1..=100 {
        let jf = j as f64;
        let term = fac * (a2 * jf * jf).exp();
        sum += term;
        if term.abs() <= 0.001 * previous_term || term.abs() <= 1e-8 * sum {
            return sum;
        }
        fac = -fac;
        previous_term = term.abs();
    }

    // Series failed to converge, which only happens for tiny lambda
    1.0
}

/// Welch's unequal-variance t-test on the difference of means
///
/// The statistic is positive when `b` has the larger mean.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Result<TestOutcome> {
    ensure_sample(a, 2, "Welch t-test")?;
    ensure_sample(b, 2, "Welch t-test")?;

    let n1 = a.len() as f64;
    let n2 = b.len() as f64;
    let se1 = variance(a)? / n1;
    let se2 = variance(b)? / n2;
    let se = (se1 + se2).sqrt();
    let diff = mean(b)? - mean(a)?;

    if se < 1e-12 {
        return Err(MathError::CalculationError(
            "Welch t-test is undefined when both samples are constant".to_string(),
        ));
    }

    let t = diff / se;
    let df = (se1 + se2).powi(2) / (se1.powi(2) / (n1 - 1.0) + se2.powi(2) / (n2 - 1.0));
    let dist = StudentsT::new(0.0, 1.0, df)?;
    let p = 2.0 * (1.0 - dist.cdf(t.abs()));
    Ok(TestOutcome::new(t, p))
}

/// Brown-Forsythe test for equality of variances
///
/// This is Levene's test centred on the group medians, which keeps its size
/// under the heavy tails typical of price data.
pub fn brown_forsythe_test(a: &[f64], b: &[f64]) -> Result<TestOutcome> {
    ensure_sample(a, 2, "Brown-Forsythe test")?;
    ensure_sample(b, 2, "Brown-Forsythe test")?;

    let med_a = median(a)?;
    let med_b = median(b)?;
    let za: Vec<f64> = a.iter().map(|x| (x - med_a).abs()).collect();
    let zb: Vec<f64> = b.iter().map(|x| (x - med_b).abs()).collect();

    let n1 = za.len() as f64;
    let n2 = zb.len() as f64;
    let total = n1 + n2;
    let mean_a = mean(&za)?;
    let mean_b = mean(&zb)?;
    let grand = (mean_a * n1 + mean_b * n2) / total;

    let between = n1 * (mean_a - grand).powi(2) + n2 * (mean_b - grand).powi(2);
    let within: f64 = za.iter().map(|z| (z - mean_a).powi(2)).sum::<f64>()
        + zb.iter().map(|z| (z - mean_b).powi(2)).sum::<f64>();

    if within < 1e-12 {
        return Err(MathError::CalculationError(
            "Brown-Forsythe test is undefined for zero within-group dispersion".to_string(),
        ));
    }

    // k = 2 groups: between has 1 degree of freedom, within has N - 2
    let w = (total - 2.0) * between / within;
    let dist = FisherSnedecor::new(1.0, total - 2.0)?;
    let p = 1.0 - dist.cdf(w);
    Ok(TestOutcome::new(w, p))
}

/// Default Ljung-Box lag count for a sample of length `n`
pub fn default_ljung_box_lags(n: usize) -> usize {
    (n / 5).clamp(1, 10)
}

/// Ljung-Box test for autocorrelation up to `lags`
pub fn ljung_box(values: &[f64], lags: usize) -> Result<TestOutcome> {
    if lags == 0 {
        return Err(MathError::InvalidInput(
            "Ljung-Box needs at least one lag".to_string(),
        ));
    }
    ensure_sample(values, lags + 2, "Ljung-Box test")?;

    let n = values.len() as f64;
    let mut q = 0.0;
    for k in 1..=lags {
        let rho = autocorrelation(values, k)?;
        q += rho * rho / (n - k as f64);
    }
    q *= n * (n + 2.0);

    let dist = ChiSquared::new(lags as f64)?;
    let p = 1.0 - dist.cdf(q);
    Ok(TestOutcome::new(q, p))
}
