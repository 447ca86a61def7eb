use approx::assert_relative_eq;
use chrono::NaiveDate;
use forecast_engine::cache::TtlCache;
use forecast_engine::calibrator::ConfidenceCalibrator;
use forecast_engine::config::{
    CalibrationConfig, EngineConfig, Horizon, HorizonRegistry, ValidatorConfig,
};
use forecast_engine::data::TimeSeries;
use forecast_engine::error::{ForecastError, Result};
use forecast_engine::models::{ContextWindow, Forecaster, ForecasterKind, StepForecast};
use forecast_engine::pipeline::{ForecastPipeline, PackageKey};
use forecast_engine::validator::{ValidationMode, WalkForwardValidator};
use forecast_engine::ForecastPackage;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
}

/// Mildly trending, oscillating exchange-rate-like series
fn synthetic(n: usize) -> TimeSeries {
    let values = (0..n)
        .map(|i| {
            let t = i as f64;
            let wiggle = if i % 2 == 0 { 2.0 } else { -2.0 };
            4000.0 * (1.0 + 0.01 * (t * 0.3).sin() + 0.0001 * t) + wiggle
        })
        .collect();
    TimeSeries::daily("usd_cop", start(), values).unwrap()
}

#[derive(Debug)]
struct Flat;

impl Forecaster for Flat {
    fn name(&self) -> &str {
        "flat"
    }

    fn kind(&self) -> ForecasterKind {
        ForecasterKind::Foundation
    }

    fn predict(&self, context: &ContextWindow, steps: usize) -> Result<Vec<StepForecast>> {
        let last = context.last_value().unwrap_or(0.0);
        Ok(vec![StepForecast::point(last); steps])
    }
}

#[derive(Debug)]
struct Broken;

impl Forecaster for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn kind(&self) -> ForecasterKind {
        ForecasterKind::TreeEnsemble
    }

    fn predict(&self, _context: &ContextWindow, _steps: usize) -> Result<Vec<StepForecast>> {
        Err(ForecastError::ForecasterUnavailable {
            forecaster: "broken".to_string(),
            reason: "model server offline".to_string(),
        })
    }
}

/// Sound means with a fixed, possibly unusable, spread
#[derive(Debug)]
struct Spread(f64);

impl Forecaster for Spread {
    fn name(&self) -> &str {
        "spread"
    }

    fn kind(&self) -> ForecasterKind {
        ForecasterKind::TreeEnsemble
    }

    fn predict(&self, context: &ContextWindow, steps: usize) -> Result<Vec<StepForecast>> {
        let last = context.last_value().unwrap_or(0.0);
        Ok(vec![StepForecast::with_std(last, self.0); steps])
    }
}

#[derive(Debug, Default)]
struct Counting {
    calls: Arc<AtomicUsize>,
}

impl Forecaster for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn kind(&self) -> ForecasterKind {
        ForecasterKind::SeasonalStatistical
    }

    fn predict(&self, context: &ContextWindow, steps: usize) -> Result<Vec<StepForecast>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last = context.last_value().unwrap_or(0.0);
        Ok(vec![StepForecast::with_std(last, 1.0); steps])
    }
}

fn bare_pipeline() -> ForecastPipeline {
    ForecastPipeline::new(
        HorizonRegistry::default(),
        ConfidenceCalibrator::new(CalibrationConfig::default()).unwrap(),
    )
}

fn assert_within_caps(package: &ForecastPackage, last_value: f64, daily: f64, horizon: f64) {
    let mut previous = last_value;
    for point in package.points() {
        assert!(point.is_ordered(), "unordered point {:?}", point);
        assert!((point.mean / last_value - 1.0).abs() <= horizon + 1e-9);
        assert!((point.mean / previous - 1.0).abs() <= daily + 1e-9);
        previous = point.mean;
    }
}

#[test]
fn test_reference_ensemble_package() {
    forecast_engine::telemetry::init_tracing("forecast_engine=debug");
    let series = synthetic(300);
    let last = *series.last().unwrap();
    let pipeline = ForecastPipeline::from_config(&EngineConfig::default()).unwrap();

    for horizon in [Horizon::Days7, Horizon::Days90] {
        let package = pipeline.forecast(&series, horizon).unwrap();
        let profile = pipeline.registry().get(horizon).unwrap();

        assert_eq!(package.horizon(), horizon);
        assert_eq!(package.points().len(), horizon.days());
        for (i, point) in package.points().iter().enumerate() {
            assert_eq!(point.date, last.date + chrono::Days::new(i as u64 + 1));
        }
        assert_within_caps(
            &package,
            last.value,
            profile.daily_change_cap,
            profile.horizon_change_cap,
        );

        assert!(package.methodology().starts_with("weighted_ensemble["));
        assert!(package.methodology().contains("holt_garch"));
        let metrics = package.error_metrics();
        assert!(metrics["regime_multiplier"] >= 1.0);
        assert_relative_eq!(metrics["confidence_multiplier"], profile.confidence_multiplier);
        assert!(package.residual_vol() > 0.0);
    }
}

#[test]
fn test_failed_member_is_dropped() {
    let series = synthetic(60);
    let last = series.last().unwrap().value;
    let pipeline = bare_pipeline()
        .with_member(Arc::new(Flat))
        .with_member(Arc::new(Broken));

    let package = pipeline.forecast(&series, Horizon::Days15).unwrap();
    assert_relative_eq!(package.error_metrics()["members_dropped"], 1.0);
    assert_eq!(package.methodology(), "weighted_ensemble[flat=1.000]");
    for point in package.points() {
        assert_relative_eq!(point.mean, last);
        assert!(point.ci95_low < point.ci80_low && point.ci80_high < point.ci95_high);
    }
}

#[test]
fn test_member_with_unusable_spread_is_dropped() {
    let series = synthetic(60);
    for bad in [f64::NAN, f64::INFINITY, -1.0] {
        let pipeline = bare_pipeline()
            .with_member(Arc::new(Flat))
            .with_member(Arc::new(Spread(bad)));

        let package = pipeline.forecast(&series, Horizon::Days7).unwrap();
        assert_relative_eq!(package.error_metrics()["members_dropped"], 1.0);
        assert_eq!(package.methodology(), "weighted_ensemble[flat=1.000]");
        for point in package.points() {
            assert!(point.ci95_low.is_finite() && point.ci95_high.is_finite());
            assert!(point.ci95_low < point.mean && point.mean < point.ci95_high);
        }
    }

    let healthy = bare_pipeline()
        .with_member(Arc::new(Flat))
        .with_member(Arc::new(Spread(5.0)))
        .forecast(&series, Horizon::Days7)
        .unwrap();
    assert_relative_eq!(healthy.error_metrics()["members_dropped"], 0.0);
}

#[test]
fn test_all_members_failing() {
    let pipeline = bare_pipeline().with_member(Arc::new(Broken));
    assert!(matches!(
        pipeline.forecast(&synthetic(60), Horizon::Days7),
        Err(ForecastError::EnsembleExhausted(_))
    ));
    assert!(matches!(
        bare_pipeline().forecast(&synthetic(60), Horizon::Days7),
        Err(ForecastError::EnsembleExhausted(_))
    ));
}

#[test]
fn test_short_series_is_rejected() {
    let pipeline = bare_pipeline().with_member(Arc::new(Flat));
    assert!(matches!(
        pipeline.forecast(&synthetic(2), Horizon::Days7),
        Err(ForecastError::DataInsufficient(_))
    ));
}

#[test]
fn test_forecast_cached_reuses_packages() {
    let member = Counting::default();
    let calls = Arc::clone(&member.calls);
    let pipeline = bare_pipeline().with_member(Arc::new(member));
    let mut cache: TtlCache<PackageKey, ForecastPackage> = TtlCache::new(Duration::from_secs(600));

    let series = synthetic(40);
    let first = pipeline
        .forecast_cached(&series, Horizon::Days7, &mut cache)
        .unwrap();
    let second = pipeline
        .forecast_cached(&series, Horizon::Days7, &mut cache)
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A new observation or another horizon is a different key
    pipeline
        .forecast_cached(&synthetic(41), Horizon::Days7, &mut cache)
        .unwrap();
    pipeline
        .forecast_cached(&series, Horizon::Days15, &mut cache)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(cache.len(), 3);
}

#[test]
fn test_pipeline_backtests_through_validator() {
    let config = ValidatorConfig {
        mode: ValidationMode::Rolling,
        train_days: 150,
        test_days: 7,
        step_days: 7,
        max_folds: 3,
        ..ValidatorConfig::default()
    };
    let registry = HorizonRegistry::default();
    let validator =
        WalkForwardValidator::new(config, registry.get(Horizon::Days7).unwrap().clone()).unwrap();
    let pipeline = ForecastPipeline::from_config(&EngineConfig::default()).unwrap();

    let report = validator.run(&synthetic(300), &pipeline).unwrap();
    assert_eq!(report.folds.len(), 3);
    for fold in &report.folds {
        assert_eq!(fold.evaluated_points, 7);
        assert!(fold.rmse.is_finite());
        assert!((0.0..=1.0).contains(&fold.ci95_coverage));
    }
}

#[test]
fn test_ttl_cache_expiry() {
    let mut cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(10));
    let t0 = Instant::now();
    cache.insert_at("usd_cop", 1, t0);

    assert_eq!(cache.get_at(&"usd_cop", t0 + Duration::from_secs(9)), Some(1));
    assert_eq!(cache.get_at(&"usd_cop", t0 + Duration::from_secs(10)), None);
    assert_eq!(cache.get_at(&"brent", t0), None);

    assert_eq!(cache.invalidate(&"usd_cop"), Some(1));
    assert!(cache.is_empty());
}

#[test]
fn test_ttl_cache_does_not_store_errors() {
    let mut cache: TtlCache<u8, u32> = TtlCache::new(Duration::from_secs(10));
    let failed: std::result::Result<u32, &str> =
        cache.get_or_try_insert_with(1, || Err("upstream down"));
    assert!(failed.is_err());
    assert!(cache.is_empty());

    let value: std::result::Result<u32, &str> = cache.get_or_try_insert_with(1, || Ok(7));
    assert_eq!(value, Ok(7));
    let cached: std::result::Result<u32, &str> = cache.get_or_try_insert_with(1, || Ok(8));
    assert_eq!(cached, Ok(7));
}

#[test]
fn test_ttl_cache_purge() {
    let mut cache: TtlCache<u8, u32> = TtlCache::new(Duration::ZERO);
    cache.insert(1, 1);
    cache.insert(2, 2);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&1), None);
    assert_eq!(cache.purge_expired(), 2);

    let mut cache: TtlCache<u8, u32> = TtlCache::new(Duration::from_secs(60));
    cache.insert(1, 1);
    assert_eq!(cache.purge_expired(), 0);
    cache.invalidate_all();
    assert!(cache.is_empty());
}
