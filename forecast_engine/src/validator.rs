//! Walk-forward backtesting
//!
//! Folds are generated in index space over one snapshot of the series. Each
//! training window ends on the observation immediately before its test
//! window, test windows never overlap, and the forecaster only ever sees the
//! training slice.

use crate::config::{Horizon, HorizonProfile, ValidatorConfig};
use crate::data::TimeSeries;
use crate::error::{ForecastError, Result};
use crate::forecast::ForecastPackage;
use crate::store::RecordStore;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use stat_math::descriptive::{mean, std_dev};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// How training windows evolve across folds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationMode {
    /// Fixed training start, growing training end
    Expanding,
    /// Fixed training length sliding forward
    Rolling,
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Expanding => write!(f, "EXPANDING"),
            ValidationMode::Rolling => write!(f, "ROLLING"),
        }
    }
}

/// Produces a forecast package from a training slice
pub trait PackageForecaster: Send + Sync {
    fn forecast_package(&self, train: &TimeSeries, horizon: Horizon) -> Result<ForecastPackage>;
}

impl<F> PackageForecaster for F
where
    F: Fn(&TimeSeries, Horizon) -> Result<ForecastPackage> + Send + Sync,
{
    fn forecast_package(&self, train: &TimeSeries, horizon: Horizon) -> Result<ForecastPackage> {
        self(train, horizon)
    }
}

/// Index ranges of one fold, end-exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

impl Fold {
    pub fn train_len(&self) -> usize {
        self.train_end - self.train_start
    }

    pub fn test_len(&self) -> usize {
        self.test_end - self.test_start
    }
}

/// Accuracy of one fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub fold: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    /// Forecast steps matched to realized values
    pub evaluated_points: usize,
    pub rmse: f64,
    pub mae: f64,
    /// Mean absolute percentage error in percent
    pub mape: f64,
    /// Fraction of actuals inside the 95% interval
    pub ci95_coverage: f64,
    /// Mean of predicted minus actual
    pub bias: f64,
}

/// Mean and sample standard deviation of a metric across folds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
}

impl MetricSummary {
    fn from_values(values: &[f64]) -> Result<Self> {
        Ok(Self {
            mean: mean(values)?,
            std: if values.len() > 1 { std_dev(values)? } else { 0.0 },
        })
    }
}

/// Aggregated walk-forward result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub timestamp: DateTime<Utc>,
    pub horizon: Horizon,
    pub mode: ValidationMode,
    pub folds: Vec<FoldMetrics>,
    pub rmse: MetricSummary,
    pub mae: MetricSummary,
    pub mape: MetricSummary,
    pub ci95_coverage: MetricSummary,
    pub bias: MetricSummary,
    /// Fold number with the lowest RMSE
    pub best_fold: usize,
    /// Fold number with the highest RMSE
    pub worst_fold: usize,
    pub acceptable: bool,
}

impl ValidationReport {
    pub fn is_acceptable(&self) -> bool {
        self.acceptable
    }
}

#[derive(Debug, Clone)]
pub struct WalkForwardValidator {
    config: ValidatorConfig,
    profile: HorizonProfile,
}

impl WalkForwardValidator {
    /// Validator for one horizon; invalid fold parameters fail here
    pub fn new(config: ValidatorConfig, profile: HorizonProfile) -> Result<Self> {
        let fail = |msg: String| Err(ForecastError::ValidationConfig(msg));

        if config.train_days < 2 {
            return fail(format!("train_days must be at least 2, got {}", config.train_days));
        }
        if config.test_days == 0 {
            return fail("test_days must be positive".to_string());
        }
        if config.step_days < config.test_days {
            return fail(format!(
                "step_days {} is shorter than test_days {}, test windows would overlap",
                config.step_days, config.test_days
            ));
        }
        if config.max_folds == 0 {
            return fail("max_folds must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&config.min_ci95_coverage)
            || !(0.0..=1.0).contains(&config.max_ci95_coverage)
            || config.min_ci95_coverage > config.max_ci95_coverage
        {
            return fail("CI95 coverage bounds must satisfy 0 <= min <= max <= 1".to_string());
        }

        Ok(Self { config, profile })
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn horizon(&self) -> Horizon {
        self.profile.horizon
    }

    /// Folds that fit into `n_obs` observations
    pub fn generate_folds(&self, n_obs: usize) -> Vec<Fold> {
        let cfg = &self.config;
        (0..cfg.max_folds)
            .map(|k| {
                let test_start = cfg.train_days + k * cfg.step_days;
                let train_start = match cfg.mode {
                    ValidationMode::Expanding => 0,
                    ValidationMode::Rolling => test_start - cfg.train_days,
                };
                Fold {
                    index: k,
                    train_start,
                    train_end: test_start,
                    test_start,
                    test_end: test_start + cfg.test_days,
                }
            })
            .take_while(|f| f.test_end <= n_obs)
            .collect()
    }

    /// Run every fold
    pub fn run(
        &self,
        series: &TimeSeries,
        forecaster: &dyn PackageForecaster,
    ) -> Result<ValidationReport> {
        self.run_with_cancel(series, forecaster, &AtomicBool::new(false))
    }

    /// Run every fold, checking `cancel` before each one
    pub fn run_with_cancel(
        &self,
        series: &TimeSeries,
        forecaster: &dyn PackageForecaster,
        cancel: &AtomicBool,
    ) -> Result<ValidationReport> {
        let snapshot = series.clone();
        let folds = self.generate_folds(snapshot.len());
        if folds.is_empty() {
            return Err(ForecastError::DataInsufficient(format!(
                "Series of {} observations is too short for one fold of {} + {} days",
                snapshot.len(),
                self.config.train_days,
                self.config.test_days
            )));
        }

        let mut metrics = Vec::with_capacity(folds.len());
        for fold in &folds {
            if cancel.load(Ordering::SeqCst) {
                info!(
                    "Walk-forward validation cancelled after {} folds",
                    metrics.len()
                );
                return Err(ForecastError::Cancelled {
                    completed_folds: metrics.len(),
                });
            }

            let train = snapshot.slice(fold.train_start, fold.train_end)?;
            let test = snapshot.slice(fold.test_start, fold.test_end)?;
            let package = forecaster.forecast_package(&train, self.profile.horizon)?;
            let fold_metrics = evaluate_fold(fold, &train, &test, &package)?;
            debug!(
                "Fold {}: rmse={:.4} mape={:.2}% coverage={:.2}",
                fold.index, fold_metrics.rmse, fold_metrics.mape, fold_metrics.ci95_coverage
            );
            metrics.push(fold_metrics);
        }

        let report = self.aggregate(metrics)?;
        info!(
            horizon = %report.horizon,
            mode = %report.mode,
            folds = report.folds.len(),
            acceptable = report.acceptable,
            "Walk-forward validation complete"
        );
        Ok(report)
    }

    /// Run, then append the finished report to `store`
    ///
    /// Nothing is written when the run fails or is cancelled.
    pub fn run_and_persist(
        &self,
        series: &TimeSeries,
        forecaster: &dyn PackageForecaster,
        store: &dyn RecordStore<ValidationReport>,
        cancel: &AtomicBool,
    ) -> Result<ValidationReport> {
        let report = self.run_with_cancel(series, forecaster, cancel)?;
        store.append(vec![report.clone()])?;
        Ok(report)
    }

    fn aggregate(&self, folds: Vec<FoldMetrics>) -> Result<ValidationReport> {
        let column = |f: fn(&FoldMetrics) -> f64| -> Vec<f64> { folds.iter().map(f).collect() };

        let rmse = MetricSummary::from_values(&column(|m| m.rmse))?;
        let mae = MetricSummary::from_values(&column(|m| m.mae))?;
        let mape = MetricSummary::from_values(&column(|m| m.mape))?;
        let ci95_coverage = MetricSummary::from_values(&column(|m| m.ci95_coverage))?;
        let bias = MetricSummary::from_values(&column(|m| m.bias))?;

        let by_rmse = |a: &&FoldMetrics, b: &&FoldMetrics| a.rmse.total_cmp(&b.rmse);
        let best_fold = folds.iter().min_by(by_rmse).map(|m| m.fold).unwrap_or(0);
        let worst_fold = folds.iter().max_by(by_rmse).map(|m| m.fold).unwrap_or(0);

        let acceptable = ci95_coverage.mean >= self.config.min_ci95_coverage
            && ci95_coverage.mean <= self.config.max_ci95_coverage
            && mape.mean < self.profile.mape_ceiling_pct;

        Ok(ValidationReport {
            timestamp: Utc::now(),
            horizon: self.profile.horizon,
            mode: self.config.mode,
            folds,
            rmse,
            mae,
            mape,
            ci95_coverage,
            bias,
            best_fold,
            worst_fold,
            acceptable,
        })
    }
}

fn evaluate_fold(
    fold: &Fold,
    train: &TimeSeries,
    test: &TimeSeries,
    package: &ForecastPackage,
) -> Result<FoldMetrics> {
    let pairs: Vec<(f64, f64, bool)> = package
        .points()
        .iter()
        .filter_map(|p| {
            test.value_on(p.date)
                .map(|actual| (p.mean, actual, p.ci95_contains(actual)))
        })
        .collect();

    if pairs.is_empty() {
        return Err(ForecastError::DataInsufficient(format!(
            "Fold {}: no forecast dates fall inside the test window",
            fold.index
        )));
    }

    let n = pairs.len() as f64;
    let errors: Vec<f64> = pairs.iter().map(|(p, a, _)| p - a).collect();
    let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt();
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let bias = errors.iter().sum::<f64>() / n;

    let pct: Vec<f64> = pairs
        .iter()
        .filter(|(_, a, _)| a.abs() > 1e-12)
        .map(|(p, a, _)| ((p - a) / a).abs() * 100.0)
        .collect();
    let mape = if pct.is_empty() {
        0.0
    } else {
        pct.iter().sum::<f64>() / pct.len() as f64
    };
    let ci95_coverage = pairs.iter().filter(|(_, _, inside)| *inside).count() as f64 / n;

    let date = |s: &TimeSeries, last: bool| -> Result<NaiveDate> {
        let obs = if last { s.last() } else { s.first() };
        obs.map(|o| o.date).ok_or_else(|| {
            ForecastError::DataInsufficient(format!("Fold {} has an empty window", fold.index))
        })
    };

    Ok(FoldMetrics {
        fold: fold.index,
        train_start: date(train, false)?,
        train_end: date(train, true)?,
        test_start: date(test, false)?,
        test_end: date(test, true)?,
        evaluated_points: pairs.len(),
        rmse,
        mae,
        mape,
        ci95_coverage,
        bias,
    })
}
