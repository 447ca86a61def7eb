//! Engine configuration
//!
//! Every section has defaults, and a TOML file overrides any subset of them.
//! The horizon registry holds the static per-horizon profiles.

use crate::error::{ForecastError, Result};
use crate::models::ForecasterKind;
use crate::validator::ValidationMode;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "FORECAST_ENGINE_CONFIG";

/// Tolerance for the weight-sum invariant of a horizon profile
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-2;

/// Forecast lookahead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Horizon {
    #[serde(rename = "7d")]
    Days7,
    #[serde(rename = "15d")]
    Days15,
    #[serde(rename = "30d")]
    Days30,
    #[serde(rename = "90d")]
    Days90,
}

impl Horizon {
    /// All supported horizons, shortest first
    pub const ALL: [Horizon; 4] = [
        Horizon::Days7,
        Horizon::Days15,
        Horizon::Days30,
        Horizon::Days90,
    ];

    /// Number of daily steps in the horizon
    pub fn days(&self) -> usize {
        match self {
            Horizon::Days7 => 7,
            Horizon::Days15 => 15,
            Horizon::Days30 => 30,
            Horizon::Days90 => 90,
        }
    }

    /// Horizon with exactly `days` steps
    pub fn from_days(days: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.days() == days)
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.days())
    }
}

impl FromStr for Horizon {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_end_matches(['d', 'D']);
        trimmed
            .parse::<usize>()
            .ok()
            .and_then(Horizon::from_days)
            .ok_or_else(|| ForecastError::InvalidParameter(format!("Unsupported horizon: {}", s)))
    }
}

/// Static ensemble weight per forecaster family
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecasterWeights {
    pub seasonal_statistical: f64,
    pub vector_autoregression: f64,
    pub tree_ensemble: f64,
    pub foundation: f64,
}

impl ForecasterWeights {
    /// Weight for a family
    pub fn get(&self, kind: ForecasterKind) -> f64 {
        match kind {
            ForecasterKind::SeasonalStatistical => self.seasonal_statistical,
            ForecasterKind::VectorAutoregression => self.vector_autoregression,
            ForecasterKind::TreeEnsemble => self.tree_ensemble,
            ForecasterKind::Foundation => self.foundation,
        }
    }

    /// Sum of all family weights
    pub fn sum(&self) -> f64 {
        ForecasterKind::ALL.iter().map(|k| self.get(*k)).sum()
    }
}

/// Hyperparameters handed to the reference forecasters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecasterParams {
    /// Number of trailing observations in the context window
    pub context_length: usize,
    /// Holt level smoothing weight
    pub smoothing_alpha: f64,
    /// Holt trend smoothing weight
    pub smoothing_beta: f64,
    /// Holt trend damping per step
    pub trend_damping: f64,
    /// Own-return lags of the autoregression
    pub ar_lags: usize,
}

/// Static configuration of one forecast horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonProfile {
    /// Horizon this profile applies to
    pub horizon: Horizon,
    /// Static ensemble weights
    pub weights: ForecasterWeights,
    /// Reference-forecaster hyperparameters
    pub params: ForecasterParams,
    /// Interval widening factor for this horizon (>= 1)
    pub confidence_multiplier: f64,
    /// Maximum relative change between consecutive projected steps
    pub daily_change_cap: f64,
    /// Maximum relative change from the current value over the whole horizon
    pub horizon_change_cap: f64,
    /// MAPE ceiling (percent) for an acceptable backtest
    pub mape_ceiling_pct: f64,
}

impl HorizonProfile {
    /// Built-in profile for a horizon
    pub fn default_for(horizon: Horizon) -> Self {
        let (weights, context_length, alpha, multiplier, cap, mape) = match horizon {
            Horizon::Days7 => ([0.30, 0.20, 0.30, 0.20], 120, 0.5, 1.0, 0.05, 2.0),
            Horizon::Days15 => ([0.30, 0.25, 0.25, 0.20], 180, 0.4, 1.15, 0.08, 3.0),
            Horizon::Days30 => ([0.35, 0.25, 0.20, 0.20], 250, 0.3, 1.35, 0.12, 5.0),
            Horizon::Days90 => ([0.40, 0.30, 0.10, 0.20], 500, 0.2, 1.75, 0.20, 8.0),
        };

        Self {
            horizon,
            weights: ForecasterWeights {
                seasonal_statistical: weights[0],
                vector_autoregression: weights[1],
                tree_ensemble: weights[2],
                foundation: weights[3],
            },
            params: ForecasterParams {
                context_length,
                smoothing_alpha: alpha,
                smoothing_beta: 0.1,
                trend_damping: 0.95,
                ar_lags: 5,
            },
            confidence_multiplier: multiplier,
            daily_change_cap: 0.02,
            horizon_change_cap: cap,
            mape_ceiling_pct: mape,
        }
    }

    /// Check the profile invariants
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(ForecastError::InvalidParameter(format!("{}: {}", self.horizon, msg)));

        if ForecasterKind::ALL.iter().any(|k| self.weights.get(*k) < 0.0) {
            return fail("weights must be non-negative".to_string());
        }
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return fail(format!("weights sum to {:.4}, expected 1", sum));
        }
        if self.confidence_multiplier < 1.0 {
            return fail(format!(
                "confidence multiplier {} is below 1",
                self.confidence_multiplier
            ));
        }
        for (label, cap) in [
            ("daily change cap", self.daily_change_cap),
            ("horizon change cap", self.horizon_change_cap),
        ] {
            if !(cap > 0.0 && cap < 1.0) {
                return fail(format!("{} {} must lie in (0, 1)", label, cap));
            }
        }
        if self.daily_change_cap > self.horizon_change_cap {
            return fail("daily change cap exceeds horizon change cap".to_string());
        }
        if self.mape_ceiling_pct <= 0.0 {
            return fail("MAPE ceiling must be positive".to_string());
        }
        if self.params.context_length < 2 {
            return fail("context length must be at least 2".to_string());
        }
        Ok(())
    }
}

/// Per-horizon profiles
///
/// A deserialized registry starts from the defaults, so a file only needs
/// the horizons it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RegistryOverrides")]
pub struct HorizonRegistry {
    profiles: Vec<HorizonProfile>,
}

/// On-disk form of the registry
#[derive(Deserialize)]
struct RegistryOverrides {
    #[serde(default)]
    profiles: Vec<HorizonProfile>,
}

impl TryFrom<RegistryOverrides> for HorizonRegistry {
    type Error = ForecastError;

    fn try_from(overrides: RegistryOverrides) -> Result<Self> {
        let mut seen = Vec::with_capacity(overrides.profiles.len());
        for profile in &overrides.profiles {
            if seen.contains(&profile.horizon) {
                return Err(ForecastError::InvalidParameter(format!(
                    "Horizon {} is configured more than once",
                    profile.horizon
                )));
            }
            seen.push(profile.horizon);
        }
        Self::from_profiles(overrides.profiles)
    }
}

impl Default for HorizonRegistry {
    fn default() -> Self {
        Self {
            profiles: Horizon::ALL
                .iter()
                .map(|h| HorizonProfile::default_for(*h))
                .collect(),
        }
    }
}

impl HorizonRegistry {
    /// Registry from explicit profiles; later entries replace earlier ones
    pub fn from_profiles(profiles: Vec<HorizonProfile>) -> Result<Self> {
        let mut registry = Self::default();
        for profile in profiles {
            registry.insert(profile)?;
        }
        Ok(registry)
    }

    /// Insert or replace a profile after validating it
    pub fn insert(&mut self, profile: HorizonProfile) -> Result<()> {
        profile.validate()?;
        match self.profiles.iter_mut().find(|p| p.horizon == profile.horizon) {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
        Ok(())
    }

    /// Profile for a horizon
    pub fn get(&self, horizon: Horizon) -> Result<&HorizonProfile> {
        self.profiles
            .iter()
            .find(|p| p.horizon == horizon)
            .ok_or_else(|| {
                ForecastError::InvalidParameter(format!("No profile registered for {}", horizon))
            })
    }

    /// All profiles
    pub fn profiles(&self) -> &[HorizonProfile] {
        &self.profiles
    }

    /// Validate every profile
    pub fn validate(&self) -> Result<()> {
        self.profiles.iter().try_for_each(HorizonProfile::validate)
    }
}

/// Drift detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Length of the older baseline window
    pub baseline_size: usize,
    /// Length of the newer test window
    pub test_size: usize,
    /// Significance level of each test
    pub alpha: f64,
    /// Mean shift, in baseline standard deviations, that escalates to HIGH
    pub effect_size_threshold: f64,
    /// Ljung-Box lags (defaults to a size-based choice)
    pub ljung_box_lags: Option<usize>,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            baseline_size: 90,
            test_size: 30,
            alpha: 0.05,
            effect_size_threshold: 1.0,
            ljung_box_lags: None,
        }
    }
}

/// Drift trend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftTrendConfig {
    /// Number of most recent history entries in the trend fit
    pub window: usize,
    /// Action is required once consecutive HIGH entries exceed this count
    pub consecutive_high_threshold: usize,
    /// Slope (score points per entry) below which the trend counts as flat
    pub flat_slope_tolerance: f64,
}

impl Default for DriftTrendConfig {
    fn default() -> Self {
        Self {
            window: 10,
            consecutive_high_threshold: 2,
            flat_slope_tolerance: 1.0,
        }
    }
}

/// Regime detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Window (returns) of each realized-volatility estimate
    pub vol_window: usize,
    /// History (observations) used for the volatility z-score and percentile
    pub lookback_days: usize,
    /// Volatility z-score at which HIGH_VOLATILITY starts
    pub vol_z_threshold: f64,
    /// Z-score distance above the threshold over which the multiplier ramps
    pub vol_z_span: f64,
    /// Multiplier at the HIGH_VOLATILITY threshold
    pub high_vol_multiplier_min: f64,
    /// Multiplier cap for HIGH_VOLATILITY
    pub high_vol_multiplier_max: f64,
    /// Observations in the short-window return
    pub shock_window_days: usize,
    /// Driver move (percent) that counts as a shock
    pub shock_threshold_pct: f64,
    /// Window of the rolling primary/driver return correlation
    pub correlation_window: usize,
    /// Width of the historical correlation band in standard deviations
    pub correlation_band_sigma: f64,
    /// Days around a scheduled event treated as policy intervention
    pub policy_window_days: i64,
    /// Multiplier for EXTERNAL_SHOCK
    pub external_shock_multiplier: f64,
    /// Multiplier for POLICY_INTERVENTION
    pub policy_multiplier: f64,
    /// Known scheduled policy events (quoted `YYYY-MM-DD` strings in TOML)
    pub scheduled_events: Vec<NaiveDate>,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            vol_window: 20,
            lookback_days: 252,
            vol_z_threshold: 2.0,
            vol_z_span: 1.0,
            high_vol_multiplier_min: 1.2,
            high_vol_multiplier_max: 1.9,
            shock_window_days: 5,
            shock_threshold_pct: 2.0,
            correlation_window: 30,
            correlation_band_sigma: 2.0,
            policy_window_days: 3,
            external_shock_multiplier: 1.5,
            policy_multiplier: 2.0,
            scheduled_events: Vec::new(),
        }
    }
}

/// Walk-forward validation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Expanding or rolling training windows
    pub mode: ValidationMode,
    /// Initial (expanding) or fixed (rolling) training length in days
    pub train_days: usize,
    /// Test window length in days
    pub test_days: usize,
    /// Advance between consecutive test windows in days
    pub step_days: usize,
    /// Upper bound on the number of folds
    pub max_folds: usize,
    /// Lowest acceptable mean CI95 coverage
    pub min_ci95_coverage: f64,
    /// Highest acceptable mean CI95 coverage
    pub max_ci95_coverage: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Expanding,
            train_days: 252,
            test_days: 30,
            step_days: 30,
            max_folds: 12,
            min_ci95_coverage: 0.90,
            max_ci95_coverage: 0.97,
        }
    }
}

/// Interval calibration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Trailing returns used for the residual volatility fallback
    pub residual_window: usize,
    /// Coverage of the inner interval
    pub inner_level: f64,
    /// Coverage of the outer interval
    pub outer_level: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            residual_window: 60,
            inner_level: 0.80,
            outer_level: 0.95,
        }
    }
}

/// Persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Bounded wait for the exclusive append lock
    pub lock_timeout_ms: u64,
    /// Prediction log (JSON lines)
    pub prediction_log_path: PathBuf,
    /// Drift history (JSON lines)
    pub drift_history_path: PathBuf,
    /// Validation reports (JSON lines)
    pub validation_report_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            prediction_log_path: PathBuf::from("data/prediction_log.jsonl"),
            drift_history_path: PathBuf::from("data/drift_history.jsonl"),
            validation_report_path: PathBuf::from("data/validation_reports.jsonl"),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub horizons: HorizonRegistry,
    pub drift: DriftConfig,
    pub drift_trend: DriftTrendConfig,
    pub regime: RegimeConfig,
    pub validator: ValidatorConfig,
    pub calibration: CalibrationConfig,
    pub store: StoreConfig,
}

impl EngineConfig {
    /// Load from a TOML file and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the path in `FORECAST_ENGINE_CONFIG`, or fall back to defaults
    pub fn from_env() -> Self {
        let path = std::env::var(CONFIG_PATH_ENV)
            .unwrap_or_else(|_| "forecast_engine.toml".to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default engine config ({}): {}", path, e);
            Self::default()
        })
    }

    /// Save to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check cross-field invariants of every section
    pub fn validate(&self) -> Result<()> {
        self.horizons.validate()?;

        if self.drift.baseline_size < 2 || self.drift.test_size < 2 {
            return Err(ForecastError::InvalidParameter(
                "Drift windows need at least two observations each".to_string(),
            ));
        }
        if !(self.drift.alpha > 0.0 && self.drift.alpha < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Drift alpha {} must lie in (0, 1)",
                self.drift.alpha
            )));
        }
        if self.regime.high_vol_multiplier_min > self.regime.high_vol_multiplier_max
            || self.regime.high_vol_multiplier_min < 1.0
        {
            return Err(ForecastError::InvalidParameter(
                "High-volatility multiplier range must satisfy 1 <= min <= max".to_string(),
            ));
        }
        if self.regime.vol_z_span <= 0.0 {
            return Err(ForecastError::InvalidParameter(
                "Volatility z-score span must be positive".to_string(),
            ));
        }
        if !(self.calibration.inner_level < self.calibration.outer_level
            && self.calibration.inner_level > 0.0
            && self.calibration.outer_level < 1.0)
        {
            return Err(ForecastError::InvalidParameter(
                "Calibration levels must satisfy 0 < inner < outer < 1".to_string(),
            ));
        }
        if self.drift_trend.window < 2 {
            return Err(ForecastError::InvalidParameter(
                "Drift trend window must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}
