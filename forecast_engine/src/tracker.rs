//! Prediction log and trailing accuracy
//!
//! The log is an append-only stream of events. A prediction is written once
//! as [`PredictionEvent::Logged`]; its realized value is written later, at
//! most once, as [`PredictionEvent::ActualRecorded`]. Replaying the stream
//! yields the current records.

use crate::config::Horizon;
use crate::data::TimeSeries;
use crate::error::{ForecastError, Result};
use crate::forecast::ForecastPackage;
use crate::store::RecordStore;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Natural identity of a prediction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub forecast_date: NaiveDate,
    pub horizon: Horizon,
    pub target_date: NaiveDate,
    pub source: String,
}

/// One logged prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub forecast_date: NaiveDate,
    pub horizon: Horizon,
    pub target_date: NaiveDate,
    /// Producer of the prediction (ensemble or member name)
    pub source: String,
    /// Value observed when the forecast was made
    pub base_value: f64,
    pub predicted_mean: f64,
    pub ci95_low: f64,
    pub ci95_high: f64,
    pub actual_value: Option<f64>,
}

impl PredictionRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            forecast_date: self.forecast_date,
            horizon: self.horizon,
            target_date: self.target_date,
            source: self.source.clone(),
        }
    }

    /// Signed error, once the actual is known
    pub fn error(&self) -> Option<f64> {
        self.actual_value.map(|a| self.predicted_mean - a)
    }
}

/// Entry of the prediction log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PredictionEvent {
    Logged(PredictionRecord),
    ActualRecorded {
        key: RecordKey,
        actual_value: f64,
        recorded_at: DateTime<Utc>,
    },
}

/// Replay events into records, in logging order
pub fn replay(events: &[PredictionEvent]) -> Vec<PredictionRecord> {
    let mut records: Vec<PredictionRecord> = Vec::new();
    let mut index: BTreeMap<RecordKey, usize> = BTreeMap::new();

    for event in events {
        match event {
            PredictionEvent::Logged(record) => {
                if !index.contains_key(&record.key()) {
                    index.insert(record.key(), records.len());
                    records.push(record.clone());
                }
            }
            PredictionEvent::ActualRecorded {
                key, actual_value, ..
            } => {
                if let Some(&i) = index.get(key) {
                    if records[i].actual_value.is_none() {
                        records[i].actual_value = Some(*actual_value);
                    }
                }
            }
        }
    }
    records
}

/// Three-way sign of a change; zero is its own direction
fn direction(change: f64) -> Ordering {
    change.partial_cmp(&0.0).unwrap_or(Ordering::Equal)
}

/// Accuracy over matured predictions in a trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub horizon: Horizon,
    pub window_days: u64,
    pub sample_size: usize,
    pub rmse: f64,
    pub mae: f64,
    /// Mean absolute percentage error in percent
    pub mape: f64,
    /// Fraction of actuals inside the 95% interval
    pub ci95_coverage: f64,
    /// Fraction of predictions whose direction from the base value was right;
    /// a flat prediction is right only when the actual is also flat
    pub directional_accuracy: f64,
    /// Mean of predicted minus actual
    pub bias: f64,
}

impl PerformanceSummary {
    fn from_records(horizon: Horizon, window_days: u64, records: &[&PredictionRecord]) -> Option<Self> {
        let pairs: Vec<(&PredictionRecord, f64)> = records
            .iter()
            .filter_map(|r| r.actual_value.map(|a| (*r, a)))
            .collect();
        if pairs.is_empty() {
            return None;
        }

        let n = pairs.len() as f64;
        let errors: Vec<f64> = pairs.iter().map(|(r, a)| r.predicted_mean - a).collect();
        let pct: Vec<f64> = pairs
            .iter()
            .filter(|(_, a)| a.abs() > 1e-12)
            .map(|(r, a)| ((r.predicted_mean - a) / a).abs() * 100.0)
            .collect();

        let covered = pairs
            .iter()
            .filter(|(r, a)| *a >= r.ci95_low && *a <= r.ci95_high)
            .count();
        let direction_hits = pairs
            .iter()
            .filter(|(r, a)| {
                direction(r.predicted_mean - r.base_value) == direction(a - r.base_value)
            })
            .count();

        Some(Self {
            horizon,
            window_days,
            sample_size: pairs.len(),
            rmse: (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt(),
            mae: errors.iter().map(|e| e.abs()).sum::<f64>() / n,
            mape: if pct.is_empty() {
                0.0
            } else {
                pct.iter().sum::<f64>() / pct.len() as f64
            },
            ci95_coverage: covered as f64 / n,
            directional_accuracy: direction_hits as f64 / n,
            bias: errors.iter().sum::<f64>() / n,
        })
    }
}

/// Append-only prediction log with trailing accuracy metrics
pub struct PredictionTracker<S> {
    store: S,
}

impl<S: RecordStore<PredictionEvent>> PredictionTracker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current state of every logged prediction
    pub fn records(&self) -> Result<Vec<PredictionRecord>> {
        Ok(replay(&self.store.load()?))
    }

    /// Append a new prediction; its actual value must still be unknown
    pub fn log_prediction(&self, record: PredictionRecord) -> Result<()> {
        self.log_predictions(vec![record]).map(|_| ())
    }

    /// Append several predictions in one transaction
    ///
    /// Fails without writing anything if any record already exists.
    pub fn log_predictions(&self, records: Vec<PredictionRecord>) -> Result<usize> {
        if let Some(r) = records.iter().find(|r| r.actual_value.is_some()) {
            return Err(ForecastError::InvalidData(format!(
                "Prediction for {} logged with an actual value",
                r.target_date
            )));
        }

        let mut pending = Some(records);
        let appended = self.store.transact(&mut |events| {
            let records = pending.take().unwrap_or_default();
            let mut seen: BTreeSet<RecordKey> = events
                .iter()
                .filter_map(|e| match e {
                    PredictionEvent::Logged(r) => Some(r.key()),
                    _ => None,
                })
                .collect();
            for r in &records {
                if !seen.insert(r.key()) {
                    return Err(ForecastError::DuplicateRecord(format!(
                        "{} {} -> {} from {}",
                        r.horizon, r.forecast_date, r.target_date, r.source
                    )));
                }
            }
            Ok(records.into_iter().map(PredictionEvent::Logged).collect())
        })?;
        debug!("Logged {} predictions", appended.len());
        Ok(appended.len())
    }

    /// Log every point of a package
    pub fn log_package(
        &self,
        package: &ForecastPackage,
        source: &str,
        forecast_date: NaiveDate,
        base_value: f64,
    ) -> Result<usize> {
        let records = package
            .points()
            .iter()
            .map(|p| PredictionRecord {
                forecast_date,
                horizon: package.horizon(),
                target_date: p.date,
                source: source.to_string(),
                base_value,
                predicted_mean: p.mean,
                ci95_low: p.ci95_low,
                ci95_high: p.ci95_high,
                actual_value: None,
            })
            .collect();
        self.log_predictions(records)
    }

    /// Fill actual values of matured predictions whose target date lies in
    /// the `lookback_days` before `as_of`
    ///
    /// Only predictions without an actual are touched, so repeated calls are
    /// idempotent. Returns the number of actuals recorded.
    pub fn update_actuals(
        &self,
        lookback_days: u64,
        as_of: NaiveDate,
        actuals: &TimeSeries,
    ) -> Result<usize> {
        let window_start = as_of
            .checked_sub_days(Days::new(lookback_days))
            .unwrap_or(NaiveDate::MIN);
        let covered_until = actuals.last().map(|o| o.date);
        let now = Utc::now();

        let appended = self.store.transact(&mut |events| {
            let updates: Vec<PredictionEvent> = replay(events)
                .into_iter()
                .filter(|r| r.actual_value.is_none())
                .filter(|r| r.target_date <= as_of && r.target_date >= window_start)
                .filter(|r| covered_until.map(|d| d >= r.target_date).unwrap_or(false))
                .filter_map(|r| {
                    actuals
                        .at_or_before(r.target_date)
                        .filter(|o| o.date > r.forecast_date)
                        .map(|o| PredictionEvent::ActualRecorded {
                            key: r.key(),
                            actual_value: o.value,
                            recorded_at: now,
                        })
                })
                .collect();
            Ok(updates)
        })?;

        info!("Recorded {} matured actuals", appended.len());
        Ok(appended.len())
    }

    /// Matured predictions for `horizon` with target dates in the `days`
    /// before `as_of`
    fn matured(&self, horizon: Horizon, days: u64, as_of: NaiveDate) -> Result<Vec<PredictionRecord>> {
        let window_start = as_of
            .checked_sub_days(Days::new(days))
            .unwrap_or(NaiveDate::MIN);
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.horizon == horizon && r.actual_value.is_some())
            .filter(|r| r.target_date > window_start && r.target_date <= as_of)
            .collect())
    }

    /// Trailing accuracy; `None` when nothing has matured in the window
    pub fn get_recent_performance(
        &self,
        horizon: Horizon,
        days: u64,
        as_of: NaiveDate,
    ) -> Result<Option<PerformanceSummary>> {
        let records = self.matured(horizon, days, as_of)?;
        let refs: Vec<&PredictionRecord> = records.iter().collect();
        Ok(PerformanceSummary::from_records(horizon, days, &refs))
    }

    /// Trailing RMSE per prediction source, for inverse-error weighting
    pub fn rmse_by_source(
        &self,
        horizon: Horizon,
        days: u64,
        as_of: NaiveDate,
    ) -> Result<BTreeMap<String, f64>> {
        let records = self.matured(horizon, days, as_of)?;
        let mut by_source: BTreeMap<&str, Vec<&PredictionRecord>> = BTreeMap::new();
        for r in &records {
            by_source.entry(r.source.as_str()).or_default().push(r);
        }

        Ok(by_source
            .into_iter()
            .filter_map(|(source, rs)| {
                PerformanceSummary::from_records(horizon, days, &rs)
                    .map(|s| (source.to_string(), s.rmse))
            })
            .collect())
    }
}
