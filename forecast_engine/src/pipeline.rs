//! End-to-end forecast production
//!
//! Builds the context window, runs the horizon's ensemble, sizes intervals
//! with the calibrator and the current regime, and packages the result.

use crate::cache::TtlCache;
use crate::calibrator::ConfidenceCalibrator;
use crate::config::{EngineConfig, Horizon, HorizonProfile, HorizonRegistry};
use crate::data::TimeSeries;
use crate::ensemble::EnsembleCombiner;
use crate::error::{ForecastError, Result};
use crate::forecast::ForecastPackage;
use crate::models::{AutoregressiveForecaster, ContextWindow, Forecaster, HoltGarchForecaster};
use crate::regime::RegimeDetector;
use crate::validator::PackageForecaster;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Cache key of a package: series name, last observed date, length, horizon
pub type PackageKey = (String, NaiveDate, usize, Horizon);

#[derive(Debug, Clone)]
pub struct ForecastPipeline {
    registry: HorizonRegistry,
    calibrator: ConfidenceCalibrator,
    members: Vec<Arc<dyn Forecaster>>,
    reference_members: bool,
    drivers: Vec<TimeSeries>,
    regime: Option<RegimeDetector>,
    error_history: BTreeMap<Horizon, BTreeMap<String, f64>>,
}

impl ForecastPipeline {
    pub fn new(registry: HorizonRegistry, calibrator: ConfidenceCalibrator) -> Self {
        Self {
            registry,
            calibrator,
            members: Vec::new(),
            reference_members: false,
            drivers: Vec::new(),
            regime: None,
            error_history: BTreeMap::new(),
        }
    }

    /// Pipeline from an engine config with the reference forecasters and
    /// regime detection enabled
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            config.horizons.clone(),
            ConfidenceCalibrator::new(config.calibration.clone())?,
        )
        .with_reference_members()
        .with_regime_detector(RegimeDetector::new(config.regime.clone())?))
    }

    /// Add a forecaster used for every horizon
    pub fn with_member(mut self, forecaster: Arc<dyn Forecaster>) -> Self {
        self.members.push(forecaster);
        self
    }

    /// Add the Holt/GARCH and autoregressive forecasters, parameterized per horizon
    pub fn with_reference_members(mut self) -> Self {
        self.reference_members = true;
        self
    }

    /// Correlated series handed to forecasters and the regime detector
    pub fn with_driver(mut self, driver: TimeSeries) -> Self {
        self.drivers.push(driver);
        self
    }

    /// Scale intervals by the regime detected at the last observation
    pub fn with_regime_detector(mut self, detector: RegimeDetector) -> Self {
        self.regime = Some(detector);
        self
    }

    /// Inverse-error weighting input for one horizon
    pub fn with_error_history(mut self, horizon: Horizon, rmse_by_source: BTreeMap<String, f64>) -> Self {
        self.error_history.insert(horizon, rmse_by_source);
        self
    }

    pub fn registry(&self) -> &HorizonRegistry {
        &self.registry
    }

    fn combiner(&self, profile: &HorizonProfile) -> Result<EnsembleCombiner> {
        let mut combiner = EnsembleCombiner::new(profile.clone());
        if self.reference_members {
            combiner = combiner
                .with_member(Arc::new(HoltGarchForecaster::from_params(&profile.params)?))
                .with_member(Arc::new(AutoregressiveForecaster::from_params(&profile.params)?));
        }
        for member in &self.members {
            combiner = combiner.with_member(Arc::clone(member));
        }
        if let Some(history) = self.error_history.get(&profile.horizon) {
            combiner = combiner.with_error_history(history.clone());
        }
        Ok(combiner)
    }

    fn regime_multiplier(&self, series: &TimeSeries, as_of: NaiveDate) -> f64 {
        let Some(detector) = &self.regime else {
            return 1.0;
        };
        match detector.detect(series, self.drivers.first(), as_of) {
            Ok(report) => report.volatility_multiplier,
            Err(e) => {
                debug!("Regime detection skipped, using multiplier 1.0: {}", e);
                1.0
            }
        }
    }

    /// Forecast `horizon` days past the end of `series`
    pub fn forecast(&self, series: &TimeSeries, horizon: Horizon) -> Result<ForecastPackage> {
        let snapshot = series.clone();
        let profile = self.registry.get(horizon)?;
        let context =
            ContextWindow::from_series(&snapshot, &self.drivers, profile.params.context_length)?;
        if context.observed_len() < 3 {
            return Err(ForecastError::DataInsufficient(format!(
                "Series '{}' has {} observations, at least 3 required",
                snapshot.name(),
                context.observed_len()
            )));
        }

        let ensemble = self.combiner(profile)?.forecast(&context, horizon.days())?;
        let residual_vol = self.calibrator.residual_volatility(context.values())?;
        let regime_multiplier = self.regime_multiplier(&snapshot, context.last_observed_date());

        let points = self.calibrator.calibrate(
            &ensemble.steps,
            context.last_observed_date(),
            profile,
            residual_vol,
            regime_multiplier,
        )?;

        let weights: Vec<String> = ensemble
            .members
            .iter()
            .filter(|m| m.failure.is_none())
            .map(|m| format!("{}={:.3}", m.name, m.weight))
            .collect();
        let methodology = format!("weighted_ensemble[{}]", weights.join(", "));

        let mut metrics = BTreeMap::new();
        metrics.insert("residual_vol".to_string(), residual_vol);
        metrics.insert("regime_multiplier".to_string(), regime_multiplier);
        metrics.insert(
            "confidence_multiplier".to_string(),
            profile.confidence_multiplier,
        );
        metrics.insert(
            "members_dropped".to_string(),
            ensemble.dropped().len() as f64,
        );

        ForecastPackage::new(horizon, points, methodology, metrics, residual_vol)
    }

    /// [`Self::forecast`] memoized in a caller-owned cache
    pub fn forecast_cached(
        &self,
        series: &TimeSeries,
        horizon: Horizon,
        cache: &mut TtlCache<PackageKey, ForecastPackage>,
    ) -> Result<ForecastPackage> {
        let last = series.last().ok_or_else(|| {
            ForecastError::DataInsufficient(format!("Series '{}' is empty", series.name()))
        })?;
        let key = (series.name().to_string(), last.date, series.len(), horizon);
        cache.get_or_try_insert_with(key, || self.forecast(series, horizon))
    }
}

impl PackageForecaster for ForecastPipeline {
    fn forecast_package(&self, train: &TimeSeries, horizon: Horizon) -> Result<ForecastPackage> {
        self.forecast(train, horizon)
    }
}
