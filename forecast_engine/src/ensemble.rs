//! Weighted ensemble of pluggable forecasters
//!
//! Members run in parallel against one shared, read-only context. A member
//! that fails is dropped and the remaining weights are renormalized; only the
//! failure of every member is fatal. Members that forecast one step at a time
//! are walked forward through [`constrain_step`], feeding each clipped value
//! back into their context before the next step.

use crate::config::HorizonProfile;
use crate::error::{ForecastError, Result};
use crate::models::{ContextWindow, Forecaster, ForecasterKind, StepForecast};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Realism caps for a multi-step path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeCaps {
    /// Maximum relative change between consecutive steps
    pub daily: f64,
    /// Maximum relative change from the current value
    pub horizon: f64,
}

impl ChangeCaps {
    pub fn from_profile(profile: &HorizonProfile) -> Self {
        Self {
            daily: profile.daily_change_cap,
            horizon: profile.horizon_change_cap,
        }
    }
}

fn clamp_around(value: f64, anchor: f64, cap: f64) -> f64 {
    let a = anchor * (1.0 - cap);
    let b = anchor * (1.0 + cap);
    value.clamp(a.min(b), a.max(b))
}

/// Clip a candidate step to the daily cap around `previous`, then to the
/// horizon cap around `current`
pub fn constrain_step(candidate: f64, previous: f64, current: f64, caps: ChangeCaps) -> f64 {
    let daily = clamp_around(candidate, previous, caps.daily);
    clamp_around(daily, current, caps.horizon)
}

/// Apply [`constrain_step`] along a whole path starting from `current`
pub fn constrain_path(path: &[f64], current: f64, caps: ChangeCaps) -> Vec<f64> {
    let mut previous = current;
    path.iter()
        .map(|&candidate| {
            previous = constrain_step(candidate, previous, current, caps);
            previous
        })
        .collect()
}

/// Resolve member weights
///
/// Members with a defined error share their combined static weight in
/// proportion to `1 / rmse`; members without one keep their static weight.
/// The result is normalized to sum to one. All-zero input falls back to
/// equal weights.
pub fn resolve_weights(static_weights: &[f64], rmse: &[Option<f64>]) -> Vec<f64> {
    let defined: Vec<Option<f64>> = rmse
        .iter()
        .map(|e| e.filter(|v| v.is_finite() && *v > 0.0))
        .collect();

    let error_mass: f64 = static_weights
        .iter()
        .zip(&defined)
        .filter(|(_, e)| e.is_some())
        .map(|(w, _)| *w)
        .sum();
    let inverse_total: f64 = defined.iter().flatten().map(|e| 1.0 / e).sum();

    let raw: Vec<f64> = static_weights
        .iter()
        .zip(&defined)
        .map(|(w, e)| match e {
            Some(e) if inverse_total > 0.0 => error_mass * (1.0 / e) / inverse_total,
            _ => *w,
        })
        .collect();

    let total: f64 = raw.iter().sum();
    if total > 0.0 {
        raw.iter().map(|w| w / total).collect()
    } else if raw.is_empty() {
        raw
    } else {
        vec![1.0 / raw.len() as f64; raw.len()]
    }
}

/// Per-member outcome of an ensemble run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberReport {
    pub name: String,
    pub kind: ForecasterKind,
    /// Final weight (zero for dropped members)
    pub weight: f64,
    /// Failure reason for dropped members
    pub failure: Option<String>,
}

/// One combined step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinedStep {
    pub mean: f64,
    /// Mixture standard deviation, when any surviving member reports one
    pub std_dev: Option<f64>,
}

/// Combined forecast across surviving members
#[derive(Debug, Clone)]
pub struct EnsembleForecast {
    pub steps: Vec<CombinedStep>,
    pub members: Vec<MemberReport>,
}

impl EnsembleForecast {
    /// Combined point forecasts
    pub fn means(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.mean).collect()
    }

    /// Names of members that contributed
    pub fn contributors(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| m.failure.is_none())
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Names of members that were dropped
    pub fn dropped(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| m.failure.is_some())
            .map(|m| m.name.as_str())
            .collect()
    }
}

/// Ensemble of forecasters for one horizon
#[derive(Debug, Clone)]
pub struct EnsembleCombiner {
    profile: HorizonProfile,
    members: Vec<Arc<dyn Forecaster>>,
    error_history: BTreeMap<String, f64>,
}

impl EnsembleCombiner {
    pub fn new(profile: HorizonProfile) -> Self {
        Self {
            profile,
            members: Vec::new(),
            error_history: BTreeMap::new(),
        }
    }

    /// Add a member
    pub fn with_member(mut self, forecaster: Arc<dyn Forecaster>) -> Self {
        self.members.push(forecaster);
        self
    }

    /// Use trailing RMSE per source for inverse-error weighting
    pub fn with_error_history(mut self, rmse_by_source: BTreeMap<String, f64>) -> Self {
        self.error_history = rmse_by_source;
        self
    }

    pub fn profile(&self) -> &HorizonProfile {
        &self.profile
    }

    pub fn members(&self) -> &[Arc<dyn Forecaster>] {
        &self.members
    }

    /// Static weight of every member; a family weight is split evenly between
    /// members of that family
    pub fn static_weights(&self) -> Vec<f64> {
        let mut family_counts: BTreeMap<ForecasterKind, usize> = BTreeMap::new();
        for member in &self.members {
            *family_counts.entry(member.kind()).or_insert(0) += 1;
        }
        self.members
            .iter()
            .map(|m| {
                let count = family_counts.get(&m.kind()).copied().unwrap_or(1).max(1);
                self.profile.weights.get(m.kind()) / count as f64
            })
            .collect()
    }

    /// Combine `steps` predictions from every member
    pub fn forecast(&self, context: &ContextWindow, steps: usize) -> Result<EnsembleForecast> {
        if self.members.is_empty() {
            return Err(ForecastError::EnsembleExhausted(
                "No forecasters registered".to_string(),
            ));
        }
        if steps == 0 {
            return Err(ForecastError::InvalidParameter(
                "Forecast needs at least one step".to_string(),
            ));
        }
        let current = context.last_observed_value().ok_or_else(|| {
            ForecastError::DataInsufficient("Context window is empty".to_string())
        })?;
        let caps = ChangeCaps::from_profile(&self.profile);

        let outcomes: Vec<Result<Vec<StepForecast>>> = self
            .members
            .par_iter()
            .map(|member| run_member(member.as_ref(), context, steps, caps))
            .collect();

        let static_weights = self.static_weights();
        let mut survivors: Vec<(usize, Vec<StepForecast>)> = Vec::new();
        let mut failures: BTreeMap<usize, String> = BTreeMap::new();

        for (i, outcome) in outcomes.into_iter().enumerate() {
            let name = self.members[i].name();
            match outcome {
                Ok(path) => survivors.push((i, path)),
                Err(e) => {
                    warn!(
                        recoverable = e.is_recoverable(),
                        "Dropping forecaster {} from ensemble: {}", name, e
                    );
                    failures.insert(i, e.to_string());
                }
            }
        }

        if survivors.is_empty() {
            let reasons: Vec<String> = failures.values().cloned().collect();
            return Err(ForecastError::EnsembleExhausted(reasons.join("; ")));
        }

        let surviving_static: Vec<f64> = survivors.iter().map(|(i, _)| static_weights[*i]).collect();
        let surviving_rmse: Vec<Option<f64>> = survivors
            .iter()
            .map(|(i, _)| self.error_history.get(self.members[*i].name()).copied())
            .collect();
        let weights = resolve_weights(&surviving_static, &surviving_rmse);
        debug!(
            "Resolved ensemble weights for {}: {:?}",
            self.profile.horizon, weights
        );

        let combined: Vec<CombinedStep> = (0..steps)
            .map(|t| combine_step(&survivors, &weights, t))
            .collect();

        let capped = constrain_path(
            &combined.iter().map(|s| s.mean).collect::<Vec<_>>(),
            current,
            caps,
        );
        let steps_out = combined
            .iter()
            .zip(capped)
            .map(|(s, mean)| CombinedStep {
                mean,
                std_dev: s.std_dev,
            })
            .collect();

        let members = self
            .members
            .iter()
            .enumerate()
            .map(|(i, m)| MemberReport {
                name: m.name().to_string(),
                kind: m.kind(),
                weight: survivors
                    .iter()
                    .position(|(j, _)| *j == i)
                    .map(|pos| weights[pos])
                    .unwrap_or(0.0),
                failure: failures.get(&i).cloned(),
            })
            .collect();

        Ok(EnsembleForecast {
            steps: steps_out,
            members,
        })
    }
}

fn run_member(
    member: &dyn Forecaster,
    context: &ContextWindow,
    steps: usize,
    caps: ChangeCaps,
) -> Result<Vec<StepForecast>> {
    let path = if member.is_single_step() {
        walk_forward(member, context, steps, caps)?
    } else {
        member.predict(context, steps)?
    };

    if path.len() != steps {
        return Err(ForecastError::ForecasterUnavailable {
            forecaster: member.name().to_string(),
            reason: format!("returned {} steps, expected {}", path.len(), steps),
        });
    }
    if path.iter().any(|s| !s.mean.is_finite()) {
        return Err(ForecastError::ForecasterUnavailable {
            forecaster: member.name().to_string(),
            reason: "returned a non-finite forecast".to_string(),
        });
    }
    if path
        .iter()
        .filter_map(|s| s.std_dev)
        .any(|sd| !sd.is_finite() || sd < 0.0)
    {
        return Err(ForecastError::ForecasterUnavailable {
            forecaster: member.name().to_string(),
            reason: "returned an invalid standard deviation".to_string(),
        });
    }
    Ok(path)
}

/// Iterative projection with the closed feedback loop
///
/// One-step standard deviations are widened by `sqrt(step)`.
fn walk_forward(
    member: &dyn Forecaster,
    context: &ContextWindow,
    steps: usize,
    caps: ChangeCaps,
) -> Result<Vec<StepForecast>> {
    let mut context = context.clone();
    let current = context.last_observed_value().ok_or_else(|| {
        ForecastError::DataInsufficient("Context window is empty".to_string())
    })?;

    let mut path = Vec::with_capacity(steps);
    for step in 1..=steps {
        let previous = context.last_value().unwrap_or(current);
        let next = member
            .predict(&context, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| ForecastError::ForecasterUnavailable {
                forecaster: member.name().to_string(),
                reason: "returned no prediction".to_string(),
            })?;

        let clipped = constrain_step(next.mean, previous, current, caps);
        context.push_projection(clipped);
        path.push(StepForecast {
            mean: clipped,
            std_dev: next.std_dev.map(|s| s * (step as f64).sqrt()),
        });
    }
    Ok(path)
}

fn combine_step(survivors: &[(usize, Vec<StepForecast>)], weights: &[f64], t: usize) -> CombinedStep {
    let mean: f64 = survivors
        .iter()
        .zip(weights)
        .map(|((_, path), w)| w * path[t].mean)
        .sum();

    let spread: f64 = survivors
        .iter()
        .zip(weights)
        .map(|((_, path), w)| w * (path[t].mean - mean).powi(2))
        .sum();

    let (var_sum, var_weight) = survivors
        .iter()
        .zip(weights)
        .filter_map(|((_, path), w)| path[t].std_dev.map(|s| (w * s * s, *w)))
        .fold((0.0, 0.0), |(vs, ws), (v, w)| (vs + v, ws + w));

    let std_dev = if var_weight > 0.0 {
        Some((var_sum / var_weight + spread).sqrt())
    } else {
        None
    };

    CombinedStep { mean, std_dev }
}
