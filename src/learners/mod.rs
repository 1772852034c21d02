//! Base learners
//!
//! Every regression algorithm sits behind the same train/predict/importance
//! contract so the ensemble never knows which concrete model it is blending.
//! Learners are looked up by model-type name through a [`LearnerRegistry`]
//! built from configuration at startup.

mod boosted;
mod ridge;

pub use boosted::{BoostedTrees, BoostingParams};
pub use ridge::{Ridge, RidgeParams};

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use crate::config::ModelsConfig;
use crate::error::{ForecastError, Result};
use crate::features::FeatureMatrix;

/// A fitted model, shared behind a [`LearnerHandle`]
pub trait TrainedModel: Send + Sync + Debug {
    /// Model type that produced this fit
    fn model_type(&self) -> &str;

    /// One prediction per row, in row order
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;

    /// Importance per feature, labelled with `names`. Empty when the model
    /// has no native signal or `names` does not match the training width.
    fn feature_importance(&self, names: &[String]) -> HashMap<String, f64>;
}

pub type LearnerHandle = Arc<dyn TrainedModel>;

/// Trait for trainable regression algorithms
pub trait BaseLearner: Send + Sync {
    /// Model type name for logging and weights
    fn name(&self) -> &str;

    fn train(&self, features: &FeatureMatrix, targets: &[f64]) -> Result<LearnerHandle>;
}

/// The closed set of shipped algorithms
#[derive(Debug, Clone, PartialEq)]
pub enum LearnerKind {
    BoostedTrees(BoostingParams),
    Ridge(RidgeParams),
}

/// A [`LearnerKind`] bound to a model-type name and a training floor
#[derive(Debug, Clone)]
pub struct ConfiguredLearner {
    name: String,
    kind: LearnerKind,
    min_rows: usize,
}

impl ConfiguredLearner {
    pub fn new(name: impl Into<String>, kind: LearnerKind, min_rows: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            min_rows,
        }
    }

    pub fn kind(&self) -> &LearnerKind {
        &self.kind
    }
}

impl BaseLearner for ConfiguredLearner {
    fn name(&self) -> &str {
        &self.name
    }

    fn train(&self, features: &FeatureMatrix, targets: &[f64]) -> Result<LearnerHandle> {
        check_training_inputs(&self.name, features, targets, self.min_rows)?;

        let handle: LearnerHandle = match &self.kind {
            LearnerKind::BoostedTrees(params) => {
                Arc::new(BoostedTrees::fit(&self.name, params, features, targets)?)
            }
            LearnerKind::Ridge(params) => {
                Arc::new(Ridge::fit(&self.name, params, features, targets)?)
            }
        };

        tracing::debug!(
            "Trained {} on {} rows x {} features",
            self.name,
            features.len(),
            features.num_features()
        );
        Ok(handle)
    }
}

/// Name-keyed set of available learners
#[derive(Clone, Default)]
pub struct LearnerRegistry {
    learners: BTreeMap<String, Arc<dyn BaseLearner>>,
}

impl LearnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every shipped profile: `xgboost`, `lightgbm`,
    /// `catboost` and `ridge`
    pub fn from_config(config: &ModelsConfig) -> Self {
        let min_rows = config.min_training_rows;
        let mut registry = Self::new();
        for (name, kind) in [
            ("xgboost", LearnerKind::BoostedTrees(config.xgboost.clone())),
            ("lightgbm", LearnerKind::BoostedTrees(config.lightgbm.clone())),
            ("catboost", LearnerKind::BoostedTrees(config.catboost.clone())),
            ("ridge", LearnerKind::Ridge(config.ridge.clone())),
        ] {
            registry.register(Arc::new(ConfiguredLearner::new(name, kind, min_rows)));
        }
        registry
    }

    /// Add or replace a learner under its own name
    pub fn register(&mut self, learner: Arc<dyn BaseLearner>) {
        self.learners.insert(learner.name().to_string(), learner);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BaseLearner>> {
        self.learners.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.learners.keys().cloned().collect()
    }

    /// Look up every name, failing on the first unknown one
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn BaseLearner>>> {
        if names.is_empty() {
            return Err(ForecastError::Validation(
                "at least one model type is required".to_string(),
            ));
        }
        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| {
                    ForecastError::Validation(format!(
                        "unknown model type '{}' (available: {})",
                        name,
                        self.names().join(", ")
                    ))
                })
            })
            .collect()
    }
}

impl Debug for LearnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearnerRegistry")
            .field("learners", &self.names())
            .finish()
    }
}

/// Shared pre-training checks: row floor, matching lengths, finite inputs
pub fn check_training_inputs(
    model: &str,
    features: &FeatureMatrix,
    targets: &[f64],
    min_rows: usize,
) -> Result<()> {
    if features.len() != targets.len() {
        return Err(ForecastError::training(
            model,
            format!(
                "{} feature rows but {} targets",
                features.len(),
                targets.len()
            ),
        ));
    }
    let floor = min_rows.max(2);
    if targets.len() < floor {
        return Err(ForecastError::training(
            model,
            format!("need at least {} rows, got {}", floor, targets.len()),
        ));
    }
    if features.num_features() == 0 {
        return Err(ForecastError::training(model, "feature matrix has no columns"));
    }
    if targets.iter().any(|t| !t.is_finite())
        || features.rows().iter().flatten().any(|v| !v.is_finite())
    {
        return Err(ForecastError::training(model, "non-finite training input"));
    }
    Ok(())
}

/// Prediction-time check that the matrix matches the training columns
pub(crate) fn check_feature_names(
    model: &str,
    expected: &[String],
    features: &FeatureMatrix,
) -> Result<()> {
    if features.feature_names() != expected {
        return Err(ForecastError::prediction(
            model,
            format!(
                "feature mismatch: trained on {} columns, got {}",
                expected.len(),
                features.num_features()
            ),
        ));
    }
    Ok(())
}

/// Label per-column scores with `names`, normalized to sum to 1
pub(crate) fn label_importance(scores: &[f64], names: &[String]) -> HashMap<String, f64> {
    if scores.len() != names.len() {
        return HashMap::new();
    }
    let total: f64 = scores.iter().sum();
    names
        .iter()
        .zip(scores)
        .map(|(name, &score)| {
            let value = if total > 0.0 { score / total } else { 0.0 };
            (name.clone(), value)
        })
        .collect()
}
