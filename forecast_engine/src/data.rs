//! Time series data handling for forecasting
//!
//! A [`TimeSeries`] is validated once at construction (strictly ascending,
//! unique dates and finite values) and is immutable afterwards. Clones share
//! the underlying buffer, so a clone taken at the start of a windowed
//! operation is a stable snapshot for its whole duration.

use crate::error::{ForecastError, Result};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// One dated observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Observation date
    pub date: NaiveDate,
    /// Observed value
    pub value: f64,
}

/// Ordered scalar time series with strictly ascending, unique dates
#[derive(Debug, Clone)]
pub struct TimeSeries {
    /// Name of the series (used for logging and driver lookup)
    name: String,
    /// Observations in ascending date order
    points: Arc<[Observation]>,
}

impl TimeSeries {
    /// Create a validated series from observations
    pub fn new(name: impl Into<String>, points: Vec<Observation>) -> Result<Self> {
        let name = name.into();
        for (i, obs) in points.iter().enumerate() {
            if !obs.value.is_finite() {
                return Err(ForecastError::InvalidData(format!(
                    "Series '{}' has a non-finite value on {}",
                    name, obs.date
                )));
            }
            if i > 0 && points[i - 1].date >= obs.date {
                let kind = if points[i - 1].date == obs.date {
                    "duplicate"
                } else {
                    "non-monotonic"
                };
                return Err(ForecastError::InvalidData(format!(
                    "Series '{}' has a {} timestamp at {} (previous {})",
                    name,
                    kind,
                    obs.date,
                    points[i - 1].date
                )));
            }
        }

        Ok(Self {
            name,
            points: points.into(),
        })
    }

    /// Create a series from (date, value) pairs
    pub fn from_pairs(name: impl Into<String>, pairs: Vec<(NaiveDate, f64)>) -> Result<Self> {
        let points = pairs
            .into_iter()
            .map(|(date, value)| Observation { date, value })
            .collect();
        Self::new(name, points)
    }

    /// Create a daily series starting at `start` with one value per calendar day
    pub fn daily(name: impl Into<String>, start: NaiveDate, values: Vec<f64>) -> Result<Self> {
        let mut points = Vec::with_capacity(values.len());
        for (i, value) in values.into_iter().enumerate() {
            let date = start.checked_add_days(Days::new(i as u64)).ok_or_else(|| {
                ForecastError::InvalidData(format!("Date overflow {} days after {}", i, start))
            })?;
            points.push(Observation { date, value });
        }
        Self::new(name, points)
    }

    /// Name of the series
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the length of the time series
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the time series is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All observations in order
    pub fn observations(&self) -> &[Observation] {
        &self.points
    }

    /// Values as a vector
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|o| o.value).collect()
    }

    /// Dates as a vector
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|o| o.date).collect()
    }

    /// First observation
    pub fn first(&self) -> Option<&Observation> {
        self.points.first()
    }

    /// Latest observation
    pub fn last(&self) -> Option<&Observation> {
        self.points.last()
    }

    /// Index-range slice `[start, end)` as a new series
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        if start > end || end > self.points.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "Slice [{}, {}) out of bounds for series of length {}",
                start,
                end,
                self.points.len()
            )));
        }
        Ok(Self {
            name: self.name.clone(),
            points: self.points[start..end].into(),
        })
    }

    /// Trailing `n` observations (the whole series if shorter)
    pub fn tail(&self, n: usize) -> Self {
        let start = self.points.len().saturating_sub(n);
        Self {
            name: self.name.clone(),
            points: self.points[start..].into(),
        }
    }

    /// Observations dated on or before `date`
    pub fn until(&self, date: NaiveDate) -> Self {
        let end = self.points.partition_point(|o| o.date <= date);
        Self {
            name: self.name.clone(),
            points: self.points[..end].into(),
        }
    }

    /// Value observed exactly on `date`
    pub fn value_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by(|o| o.date.cmp(&date))
            .ok()
            .map(|i| self.points[i].value)
    }

    /// Most recent observation on or before `date`
    pub fn at_or_before(&self, date: NaiveDate) -> Option<Observation> {
        let end = self.points.partition_point(|o| o.date <= date);
        if end == 0 {
            None
        } else {
            Some(self.points[end - 1])
        }
    }

    /// Mean of the values
    pub fn mean(&self) -> Result<f64> {
        Ok(stat_math::descriptive::mean(&self.values())?)
    }

    /// Sample standard deviation of the values
    pub fn std_dev(&self) -> Result<f64> {
        Ok(stat_math::descriptive::std_dev(&self.values())?)
    }
}

/// Data loader for time series data
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load a series from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<TimeSeries> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("series")
            .to_string();
        let file = File::open(path)?;
        Self::from_reader(name, file)
    }

    /// Load a series from any CSV source with a header row
    pub fn from_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<TimeSeries> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let date_idx = Self::detect_time_column(&headers)?;
        let value_idx = Self::detect_value_column(&headers)?;

        let mut points = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            let raw_date = record.get(date_idx).unwrap_or_default();
            let raw_value = record.get(value_idx).unwrap_or_default();

            let date = Self::parse_date(raw_date).ok_or_else(|| {
                ForecastError::InvalidData(format!(
                    "Row {}: cannot parse date '{}'",
                    line + 1,
                    raw_date
                ))
            })?;
            let value = raw_value.parse::<f64>().map_err(|_| {
                ForecastError::InvalidData(format!(
                    "Row {}: non-numeric value '{}'",
                    line + 1,
                    raw_value
                ))
            })?;
            points.push(Observation { date, value });
        }

        TimeSeries::new(name, points)
    }

    /// Detect the time column in a header row
    fn detect_time_column(headers: &csv::StringRecord) -> Result<usize> {
        headers
            .iter()
            .position(|h| {
                let lower = h.to_lowercase();
                lower.contains("date") || lower.contains("time")
            })
            .ok_or_else(|| ForecastError::InvalidData("No time column found in data".to_string()))
    }

    /// Detect the value column in a header row
    fn detect_value_column(headers: &csv::StringRecord) -> Result<usize> {
        for wanted in ["value", "close", "price"] {
            if let Some(idx) = headers.iter().position(|h| h.to_lowercase().contains(wanted)) {
                return Ok(idx);
            }
        }
        Err(ForecastError::InvalidData(
            "No value column found in data".to_string(),
        ))
    }

    fn parse_date(raw: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
    }
}
