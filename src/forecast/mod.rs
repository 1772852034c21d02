//! Forecast orchestration
//!
//! Entry point tying the pipeline together: input checks, feature
//! engineering, target construction, ensemble or single-model prediction,
//! realized metrics and result assembly. Every call is synchronous and
//! builds its own engine; results are returned, never persisted here.


use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::ensemble::{EnsembleConfig, EnsembleEngine};
use crate::error::{ForecastError, Result};
use crate::features::{FeatureEngineer, FeatureMatrix, TrainingSet};
use crate::learners::{BaseLearner, LearnerHandle, LearnerRegistry};
use crate::storage::ModelStore;
use crate::types::{
    FeatureScore, ForecastMetadata, ForecastPoint, ForecastResult, ModelSelector,
    PerformanceMetrics, RawSeries,
};

/// Parameters of one forecast call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub symbol: String,
    pub horizon: usize,
    pub selector: ModelSelector,
    #[serde(default = "default_true")]
    pub include_confidence: bool,
    #[serde(default)]
    pub include_features: bool,
}

fn default_true() -> bool {
    true
}

impl ForecastRequest {
    pub fn new(symbol: impl Into<String>, horizon: usize, selector: ModelSelector) -> Self {
        Self {
            symbol: symbol.into(),
            horizon,
            selector,
            include_confidence: true,
            include_features: false,
        }
    }

    pub fn with_features(mut self, include: bool) -> Self {
        self.include_features = include;
        self
    }

    pub fn with_confidence(mut self, include: bool) -> Self {
        self.include_confidence = include;
        self
    }
}

/// Holdout evaluation of one trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub symbol: String,
    pub model_type: String,
    pub version: String,
    pub performance: PerformanceMetrics,
    pub training_date: DateTime<Utc>,
    pub test_size: f64,
    /// Raw rows supplied
    pub data_points: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub duration_ms: u64,
}

/// Outcome for one symbol of a batch run
#[derive(Debug)]
pub struct BatchOutcome {
    pub symbol: String,
    pub result: Result<ForecastResult>,
}

#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
    pub succeeded: usize,
}

/// Model predictions for the horizon, before dates are attached
struct StepValues {
    values: Vec<f64>,
    intervals: Vec<Option<(f64, f64)>>,
    /// Standard deviation used for `probability_up`
    spreads: Vec<Option<f64>>,
    confidence: f64,
    models_used: Vec<String>,
    weights: Option<BTreeMap<String, f64>>,
    feature_importance: Option<Vec<FeatureScore>>,
}

/// Runs forecasts and training against a learner registry and model store
pub struct ForecastOrchestrator {
    config: Config,
    registry: Arc<LearnerRegistry>,
    store: Option<Arc<dyn ModelStore>>,
}

impl ForecastOrchestrator {
    pub fn new(config: Config, registry: LearnerRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            store: None,
        }
    }

    /// Orchestrator with every shipped learner registered
    pub fn from_config(config: Config) -> Self {
        let registry = LearnerRegistry::from_config(&config.models);
        Self::new(config, registry)
    }

    pub fn with_store(mut self, store: Arc<dyn ModelStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &LearnerRegistry {
        &self.registry
    }

    pub fn engineer_features(&self, raw: &RawSeries) -> Result<FeatureMatrix> {
        FeatureEngineer::new(self.config.features.clone()).engineer(raw)
    }

    /// Forecast the next `request.horizon` closes of `raw`
    pub fn forecast(&self, raw: &RawSeries, request: &ForecastRequest) -> Result<ForecastResult> {
        let started = Instant::now();
        let horizon = request.horizon;
        tracing::info!(
            "Starting forecast for {} with {} (horizon {})",
            request.symbol,
            request.selector.label(),
            horizon
        );

        self.config.forecast.check_horizon(horizon)?;
        let required = self.config.forecast.min_historical_data_days;
        if raw.len() < required {
            return Err(ForecastError::InsufficientData {
                required,
                actual: raw.len(),
            });
        }

        let matrix = self.engineer_features(raw)?;
        let training = TrainingSet::from_features(&matrix, horizon)?;
        if training.is_empty() {
            return Err(ForecastError::InsufficientData {
                required: horizon + 1,
                actual: matrix.len(),
            });
        }

        let steps = match &request.selector {
            ModelSelector::Ensemble(models) => {
                self.ensemble_steps(models, &matrix, &training, request)?
            }
            ModelSelector::Single(model) => {
                self.single_steps(model, &matrix, &training, request)?
            }
        };

        let (anchor_date, anchor_close) = anchor(&matrix)?;
        let predictions = build_points(&steps, anchor_date, anchor_close);
        let performance_metrics = PerformanceMetrics::evaluate(&training.targets, &steps.values);
        let duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            "Forecast for {} completed in {} ms (mape {:.3}, confidence {:.3})",
            request.symbol,
            duration_ms,
            performance_metrics.mape,
            steps.confidence
        );

        Ok(ForecastResult {
            metadata: ForecastMetadata {
                symbol: request.symbol.clone(),
                forecast_date: Utc::now(),
                model_used: request.selector.label().to_string(),
                horizon,
                data_points_used: raw.len(),
                confidence: steps.confidence,
                models_used: steps.models_used,
                duration_ms,
            },
            predictions,
            performance_metrics,
            feature_importance: steps.feature_importance,
            model_weights: steps.weights,
        })
    }

    fn ensemble_steps(
        &self,
        models: &[String],
        matrix: &FeatureMatrix,
        training: &TrainingSet,
        request: &ForecastRequest,
    ) -> Result<StepValues> {
        let learners = self.registry.resolve(models)?;
        let mut engine = EnsembleEngine::new(learners, EnsembleConfig::from(&self.config.forecast));
        let result = engine.train_and_forecast(
            matrix,
            &training.targets,
            request.horizon,
            request.include_confidence,
            request.include_features,
        )?;

        Ok(StepValues {
            values: result.predictions.iter().map(|p| p.value).collect(),
            intervals: result
                .predictions
                .iter()
                .map(|p| p.lower.zip(p.upper))
                .collect(),
            spreads: result.predictions.iter().map(|p| p.spread).collect(),
            confidence: result.confidence,
            models_used: result.models_used,
            weights: Some(result.weights),
            feature_importance: result.feature_importance,
        })
    }

    fn single_steps(
        &self,
        model_type: &str,
        matrix: &FeatureMatrix,
        training: &TrainingSet,
        request: &ForecastRequest,
    ) -> Result<StepValues> {
        let learner = self.resolve_one(model_type)?;
        let rows = matrix.tail(request.horizon);
        let key = store_key(&request.symbol, request.horizon);

        let cached = self
            .store
            .as_ref()
            .and_then(|store| store.load(model_type, &key));
        let (handle, values) = match cached {
            Some(handle) => match handle.predict(&rows) {
                Ok(values) => (handle, values),
                Err(e) => {
                    tracing::warn!(
                        "Cached {} model for {} is unusable ({}), retraining",
                        model_type,
                        request.symbol,
                        e
                    );
                    let handle = self.train_and_store(&learner, training, &key)?;
                    let values = handle.predict(&rows)?;
                    (handle, values)
                }
            },
            None => {
                let handle = self.train_and_store(&learner, training, &key)?;
                let values = handle.predict(&rows)?;
                (handle, values)
            }
        };

        let cfg = &self.config.forecast;
        let band_std = population_std(&values) * cfg.single_model_band_fraction;
        let half_width = cfg.confidence_z * band_std;
        let intervals = values
            .iter()
            .map(|&v| {
                request
                    .include_confidence
                    .then(|| ((v - half_width).max(0.0).min(v + half_width), v + half_width))
            })
            .collect();

        let feature_importance = request
            .include_features
            .then(|| sorted_scores(handle.feature_importance(matrix.feature_names())));

        Ok(StepValues {
            spreads: vec![Some(band_std); values.len()],
            intervals,
            values,
            confidence: cfg.single_model_confidence,
            models_used: vec![model_type.to_string()],
            weights: None,
            feature_importance,
        })
    }

    fn resolve_one(&self, model_type: &str) -> Result<Arc<dyn BaseLearner>> {
        let mut learners = self.registry.resolve(&[model_type.to_string()])?;
        learners.pop().ok_or_else(|| {
            ForecastError::Validation(format!("unknown model type '{}'", model_type))
        })
    }

    fn train_and_store(
        &self,
        learner: &Arc<dyn BaseLearner>,
        training: &TrainingSet,
        key: &str,
    ) -> Result<LearnerHandle> {
        let handle = learner.train(&training.features, &training.targets)?;
        if let Some(store) = &self.store {
            store.save(handle.clone(), learner.name(), key, &version_stamp());
        }
        Ok(handle)
    }

    /// Train one model on next-bar targets and evaluate it on a
    /// chronological holdout. The fitted model goes to the model store.
    pub fn train_model(
        &self,
        raw: &RawSeries,
        symbol: &str,
        model_type: &str,
        test_size: f64,
    ) -> Result<TrainingReport> {
        let started = Instant::now();
        tracing::info!("Starting {} training for {}", model_type, symbol);

        self.config.forecast.check_test_size(test_size)?;
        let learner = self.resolve_one(model_type)?;
        let matrix = self.engineer_features(raw)?;
        let training = TrainingSet::from_features(&matrix, 1)?;
        let (train, test) = training.split(test_size);
        if test.is_empty() {
            return Err(ForecastError::InsufficientData {
                required: 2,
                actual: training.len(),
            });
        }

        let handle = learner.train(&train.features, &train.targets)?;
        let predictions = handle.predict(&test.features)?;
        let performance = PerformanceMetrics::evaluate(&test.targets, &predictions);

        let version = version_stamp();
        if let Some(store) = &self.store {
            store.save(handle, model_type, &store_key(symbol, 1), &version);
        }

        tracing::info!(
            "Trained {} for {} (version {}, holdout mape {:.3})",
            model_type,
            symbol,
            version,
            performance.mape
        );

        Ok(TrainingReport {
            symbol: symbol.to_string(),
            model_type: model_type.to_string(),
            version,
            performance,
            training_date: Utc::now(),
            test_size,
            data_points: raw.len(),
            train_rows: train.len(),
            test_rows: test.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Forecast many series in parallel on the blocking pool. A failure for
    /// one symbol never affects the others.
    pub async fn forecast_batch(
        self: Arc<Self>,
        jobs: Vec<(RawSeries, ForecastRequest)>,
    ) -> BatchReport {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|(raw, request)| {
                let orchestrator = Arc::clone(&self);
                let symbol = request.symbol.clone();
                let task =
                    tokio::task::spawn_blocking(move || orchestrator.forecast(&raw, &request));
                (symbol, task)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (symbol, task) in handles {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(ForecastError::prediction(
                    "batch",
                    format!("forecast task for {} aborted: {}", symbol, e),
                )),
            };
            if let Err(e) = &result {
                tracing::warn!("Batch forecast for {} failed: {}", symbol, e);
            }
            outcomes.push(BatchOutcome { symbol, result });
        }

        let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
        tracing::info!("Batch finished: {} of {} succeeded", succeeded, outcomes.len());
        BatchReport {
            outcomes,
            succeeded,
        }
    }
}

/// Models are stored per target horizon: a model fitted on closes `h` bars
/// ahead only answers `h`-step requests.
pub fn store_key(symbol: &str, horizon: usize) -> String {
    format!("{}@h{}", symbol, horizon)
}

/// Date and close of the newest engineered row. Predictions start from this
/// row, which can be older than the last raw bar when trailing rows were
/// dropped as undefined.
fn anchor(matrix: &FeatureMatrix) -> Result<(NaiveDate, f64)> {
    let date = matrix
        .last_date()
        .ok_or_else(|| ForecastError::Validation("empty feature matrix".to_string()))?;
    let close = matrix
        .column_index("close")
        .and_then(|j| matrix.rows().last().map(|row| row[j]))
        .ok_or_else(|| {
            ForecastError::Validation("feature matrix has no close column".to_string())
        })?;
    Ok((date, close))
}

fn build_points(steps: &StepValues, anchor_date: NaiveDate, anchor_close: f64) -> Vec<ForecastPoint> {
    steps
        .values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let interval = steps.intervals.get(i).copied().flatten();
            let spread = steps.spreads.get(i).copied().flatten();
            ForecastPoint {
                date: anchor_date + Duration::days(i as i64 + 1),
                predicted_price: value,
                confidence_lower: interval.map(|(lower, _)| lower),
                confidence_upper: interval.map(|(_, upper)| upper),
                probability_up: probability_up(value, anchor_close, spread),
            }
        })
        .collect()
}

/// Probability that the realized close ends above `anchor`, treating the
/// prediction as normal with standard deviation `spread`. Without a usable
/// spread this is 1, 0 or 0.5 by the sign of the predicted move.
pub fn probability_up(predicted: f64, anchor: f64, spread: Option<f64>) -> f64 {
    match spread {
        Some(s) if s > 0.0 && s.is_finite() => normal_cdf((predicted - anchor) / s),
        _ => {
            if predicted > anchor {
                1.0
            } else if predicted < anchor {
                0.0
            } else {
                0.5
            }
        }
    }
}

/// Standard normal CDF (Abramowitz-Stegun 7.1.26)
fn normal_cdf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs() / std::f64::consts::SQRT_2;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    0.5 * (1.0 + sign * y)
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn sorted_scores(importance: std::collections::HashMap<String, f64>) -> Vec<FeatureScore> {
    let mut scores: Vec<FeatureScore> = importance
        .into_iter()
        .map(|(feature, importance)| FeatureScore {
            feature,
            importance,
        })
        .collect();
    scores.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    scores
}

/// Model version label, e.g. `20240131_154500`
fn version_stamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
