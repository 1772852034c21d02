//! Core data types shared across the forecasting pipeline

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ForecastError, Result};

/// Columns every raw series must provide (matched case-insensitively)
pub const REQUIRED_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Single OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Date-indexed price/volume history for one symbol.
///
/// Stored column-wise so that callers can hand over whatever columns their
/// data source produced; required-column checks happen in the feature
/// engineer, after case normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    symbol: String,
    dates: Vec<NaiveDate>,
    columns: Vec<(String, Vec<f64>)>,
}

impl RawSeries {
    /// Build a series from named columns. Dates must be strictly increasing
    /// and every column must match the date index in length.
    pub fn new(
        symbol: impl Into<String>,
        dates: Vec<NaiveDate>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self> {
        if let Some(w) = dates.windows(2).find(|w| w[1] <= w[0]) {
            return Err(ForecastError::Validation(format!(
                "dates must be strictly increasing: {} followed by {}",
                w[0], w[1]
            )));
        }
        for (name, values) in &columns {
            if values.len() != dates.len() {
                return Err(ForecastError::Validation(format!(
                    "column '{}' has {} values, expected {}",
                    name,
                    values.len(),
                    dates.len()
                )));
            }
        }

        Ok(Self {
            symbol: symbol.into(),
            dates,
            columns,
        })
    }

    pub fn from_bars(symbol: impl Into<String>, bars: &[Bar]) -> Result<Self> {
        let dates = bars.iter().map(|b| b.date).collect();
        let columns = vec![
            ("open".to_string(), bars.iter().map(|b| b.open).collect()),
            ("high".to_string(), bars.iter().map(|b| b.high).collect()),
            ("low".to_string(), bars.iter().map(|b| b.low).collect()),
            ("close".to_string(), bars.iter().map(|b| b.close).collect()),
            ("volume".to_string(), bars.iter().map(|b| b.volume).collect()),
        ];
        Self::new(symbol, dates, columns)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// Case-insensitive column lookup
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Copy of this series with one column removed (case-insensitive)
    pub fn without_column(&self, name: &str) -> Self {
        Self {
            symbol: self.symbol.clone(),
            dates: self.dates.clone(),
            columns: self
                .columns
                .iter()
                .filter(|(n, _)| !n.eq_ignore_ascii_case(name))
                .cloned()
                .collect(),
        }
    }

    /// Copy of the trailing `n` rows
    pub fn tail(&self, n: usize) -> Self {
        let start = self.len().saturating_sub(n);
        Self {
            symbol: self.symbol.clone(),
            dates: self.dates[start..].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(name, v)| (name.clone(), v[start..].to_vec()))
                .collect(),
        }
    }
}

/// How the caller wants the forecast produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSelector {
    /// One named learner
    Single(String),
    /// Performance-weighted blend of several learners
    Ensemble(Vec<String>),
}

impl ModelSelector {
    /// Parse a CLI-style selector: `ensemble`, `ensemble:a,b,c` or a model name
    pub fn parse(s: &str, default_ensemble: &[String]) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case("ensemble") {
            return Self::Ensemble(default_ensemble.to_vec());
        }
        if let Some(list) = s.strip_prefix("ensemble:") {
            return Self::Ensemble(
                list.split(',')
                    .map(|m| m.trim().to_lowercase())
                    .filter(|m| !m.is_empty())
                    .collect(),
            );
        }
        Self::Single(s.to_lowercase())
    }

    /// Name reported in result metadata
    pub fn label(&self) -> &str {
        match self {
            Self::Single(name) => name,
            Self::Ensemble(_) => "ensemble",
        }
    }

    pub fn model_types(&self) -> Vec<String> {
        match self {
            Self::Single(name) => vec![name.clone()],
            Self::Ensemble(names) => names.clone(),
        }
    }
}

/// One forecast step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_upper: Option<f64>,
    pub probability_up: f64,
}

/// Realized accuracy of a forecast window.
///
/// Non-finite values (MAPE against a zero close) serialize as `null` and
/// read back as `NaN`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(with = "nullable_f64")]
    pub mae: f64,
    /// Percentage
    #[serde(with = "nullable_f64")]
    pub mape: f64,
    #[serde(with = "nullable_f64")]
    pub rmse: f64,
    /// Percentage of steps whose direction of change matched
    #[serde(with = "nullable_f64")]
    pub directional_accuracy: f64,
}

/// JSON has no NaN or infinity; map them to `null` and back to `NaN`
mod nullable_f64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

impl PerformanceMetrics {
    /// Compare predictions against the trailing actual values of matching
    /// length. Whichever slice is longer is truncated.
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Self {
        let n = actual.len().min(predicted.len());
        if n == 0 {
            return Self::default();
        }
        let actual = &actual[actual.len() - n..];
        let predicted = &predicted[..n];
        let nf = n as f64;

        let mae = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (p - a).abs())
            .sum::<f64>()
            / nf;
        let mape = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| ((p - a) / a).abs())
            .sum::<f64>()
            / nf
            * 100.0;
        let rmse = (actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (p - a).powi(2))
            .sum::<f64>()
            / nf)
            .sqrt();

        let directional_accuracy = if n < 2 {
            0.0
        } else {
            let matches = actual
                .windows(2)
                .zip(predicted.windows(2))
                .filter(|(a, p)| (a[1] - a[0] > 0.0) == (p[1] - p[0] > 0.0))
                .count();
            matches as f64 / (n - 1) as f64 * 100.0
        };

        Self {
            mae,
            mape,
            rmse,
            directional_accuracy,
        }
    }
}

/// Aggregated importance of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScore {
    pub feature: String,
    pub importance: f64,
}

/// Descriptive header of a forecast result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetadata {
    pub symbol: String,
    pub forecast_date: DateTime<Utc>,
    pub model_used: String,
    pub horizon: usize,
    pub data_points_used: usize,
    pub confidence: f64,
    #[serde(default)]
    pub models_used: Vec<String>,
    /// Wall time spent in the forecast call, for the metrics layer
    #[serde(default)]
    pub duration_ms: u64,
}

/// Terminal output of one forecast call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub metadata: ForecastMetadata,
    pub predictions: Vec<ForecastPoint>,
    pub performance_metrics: PerformanceMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_importance: Option<Vec<FeatureScore>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_weights: Option<BTreeMap<String, f64>>,
}
