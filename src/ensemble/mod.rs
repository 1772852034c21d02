//! Performance-weighted ensemble of base learners
//!
//! Every configured learner is trained on the same matrix. Each model's
//! weight is the inverse of its error, normalized over the models that
//! trained, and step forecasts are the weighted mean of the models that
//! produced a finite value at that step.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::features::FeatureMatrix;
use crate::learners::{BaseLearner, LearnerHandle};
use crate::types::{FeatureScore, PerformanceMetrics};

/// Weighting and interval settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleConfig {
    /// Added to each error before inversion
    pub weight_epsilon: f64,
    /// Interval half-width in weighted standard deviations
    pub confidence_z: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            weight_epsilon: 1e-8,
            confidence_z: 1.96,
        }
    }
}

impl From<&ForecastConfig> for EnsembleConfig {
    fn from(config: &ForecastConfig) -> Self {
        Self {
            weight_epsilon: config.weight_epsilon,
            confidence_z: config.confidence_z,
        }
    }
}

/// Blended value for one horizon step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepForecast {
    pub value: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    /// Weighted standard deviation across contributing models
    pub spread: Option<f64>,
    pub contributors: usize,
}

/// Output of [`EnsembleEngine::train_and_forecast`]
#[derive(Debug, Clone)]
pub struct EnsembleResult {
    pub predictions: Vec<StepForecast>,
    pub confidence: f64,
    pub feature_importance: Option<Vec<FeatureScore>>,
    pub models_used: Vec<String>,
    pub weights: BTreeMap<String, f64>,
    /// Model type -> training error, for models that were skipped
    pub failures: BTreeMap<String, String>,
}

/// In-sample error of one model alongside its current weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    pub mae: f64,
    pub mape: f64,
    pub rmse: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleInfo {
    pub models: Vec<String>,
    pub weights: BTreeMap<String, f64>,
    pub total_models: usize,
    pub confidence: f64,
}

/// Trains, weights and blends a set of learners
pub struct EnsembleEngine {
    learners: Vec<Arc<dyn BaseLearner>>,
    config: EnsembleConfig,
    models: BTreeMap<String, LearnerHandle>,
    weights: BTreeMap<String, f64>,
}

impl EnsembleEngine {
    pub fn new(learners: Vec<Arc<dyn BaseLearner>>, config: EnsembleConfig) -> Self {
        Self {
            learners,
            config,
            models: BTreeMap::new(),
            weights: BTreeMap::new(),
        }
    }

    /// Train every learner and derive in-sample MSE weights.
    ///
    /// Only the leading `targets.len()` rows of `features` are used.
    /// Returns the training failures of the learners that were skipped.
    pub fn train(
        &mut self,
        features: &FeatureMatrix,
        targets: &[f64],
    ) -> Result<BTreeMap<String, String>> {
        let labelled = labelled_rows(features, targets)?;
        self.models.clear();
        self.weights.clear();

        let mut failures = BTreeMap::new();
        for learner in &self.learners {
            let name = learner.name().to_string();
            match learner.train(&labelled, targets) {
                Ok(handle) => {
                    self.models.insert(name, handle);
                }
                Err(e) => {
                    tracing::warn!("Model {} failed to train: {}", name, e);
                    failures.insert(name, e.to_string());
                }
            }
        }

        let raw = self.inverse_errors(&labelled, targets, mse);
        self.models.retain(|name, _| raw.contains_key(name));
        if self.models.is_empty() {
            return Err(ForecastError::NoModelsTrained {
                attempted: self.learners.iter().map(|l| l.name().to_string()).collect(),
            });
        }
        self.weights = normalize_weights(raw);

        tracing::info!(
            "Ensemble trained {} of {} models, confidence {:.3}",
            self.models.len(),
            self.learners.len(),
            self.confidence()
        );
        Ok(failures)
    }

    /// Train on the labelled head of `features`, then blend predictions
    /// over its tail `horizon` rows
    pub fn train_and_forecast(
        &mut self,
        features: &FeatureMatrix,
        targets: &[f64],
        horizon: usize,
        include_confidence: bool,
        include_features: bool,
    ) -> Result<EnsembleResult> {
        let failures = self.train(features, targets)?;
        let predictions = self.forecast(&features.tail(horizon), include_confidence)?;
        let feature_importance =
            include_features.then(|| self.feature_importance(features.feature_names()));

        Ok(EnsembleResult {
            predictions,
            confidence: self.confidence(),
            feature_importance,
            models_used: self.models.keys().cloned().collect(),
            weights: self.weights.clone(),
            failures,
        })
    }

    /// Blend the trained models over `rows`, one step per row
    pub fn forecast(
        &self,
        rows: &FeatureMatrix,
        include_confidence: bool,
    ) -> Result<Vec<StepForecast>> {
        let mut outputs: Vec<(f64, Vec<f64>)> = Vec::with_capacity(self.models.len());
        for (name, model) in &self.models {
            match model.predict(rows) {
                Ok(values) if values.len() == rows.len() => {
                    let weight = self.weights.get(name).copied().unwrap_or(0.0);
                    outputs.push((weight, values));
                }
                Ok(values) => {
                    tracing::warn!(
                        "Model {} returned {} predictions for {} rows",
                        name,
                        values.len(),
                        rows.len()
                    );
                }
                Err(e) => tracing::warn!("Model {} failed to predict: {}", name, e),
            }
        }
        if outputs.is_empty() {
            return Err(ForecastError::prediction(
                "ensemble",
                "no trained model produced predictions",
            ));
        }

        (0..rows.len())
            .map(|step| {
                let samples: Vec<(f64, f64)> = outputs
                    .iter()
                    .map(|(w, values)| (*w, values[step]))
                    .filter(|(_, v)| v.is_finite())
                    .collect();
                blend_step(&samples, include_confidence, self.config.confidence_z).ok_or_else(
                    || {
                        ForecastError::prediction(
                            "ensemble",
                            format!("no finite prediction at step {}", step + 1),
                        )
                    },
                )
            })
            .collect()
    }

    /// Re-weight with out-of-sample RMSE. Models that cannot predict the
    /// validation rows are dropped.
    pub fn update_weights(&mut self, features: &FeatureMatrix, targets: &[f64]) -> Result<()> {
        let labelled = labelled_rows(features, targets)?;
        let raw = self.inverse_errors(&labelled, targets, rmse);
        if raw.is_empty() {
            return Err(ForecastError::NoModelsTrained {
                attempted: self.models.keys().cloned().collect(),
            });
        }
        self.models.retain(|name, _| raw.contains_key(name));
        self.weights = normalize_weights(raw);
        tracing::info!("Ensemble weights updated: {:?}", self.weights);
        Ok(())
    }

    /// Per-model error on `features`/`targets` with the current weights
    pub fn model_performance(
        &self,
        features: &FeatureMatrix,
        targets: &[f64],
    ) -> Result<BTreeMap<String, ModelReport>> {
        let labelled = labelled_rows(features, targets)?;
        let mut reports = BTreeMap::new();
        for (name, model) in &self.models {
            match model.predict(&labelled) {
                Ok(predictions) => {
                    let metrics = PerformanceMetrics::evaluate(targets, &predictions);
                    reports.insert(
                        name.clone(),
                        ModelReport {
                            mae: metrics.mae,
                            mape: metrics.mape,
                            rmse: metrics.rmse,
                            weight: self.weights.get(name).copied().unwrap_or(0.0),
                        },
                    );
                }
                Err(e) => tracing::warn!("Model {} failed to predict: {}", name, e),
            }
        }
        Ok(reports)
    }

    /// Weighted sum of native importances, highest first
    pub fn feature_importance(&self, names: &[String]) -> Vec<FeatureScore> {
        let mut totals: HashMap<String, f64> = HashMap::new();
        for (name, model) in &self.models {
            let weight = self.weights.get(name).copied().unwrap_or(0.0);
            for (feature, importance) in model.feature_importance(names) {
                *totals.entry(feature).or_insert(0.0) += importance * weight;
            }
        }

        let mut scores: Vec<FeatureScore> = totals
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

    pub fn confidence(&self) -> f64 {
        weight_entropy_confidence(self.weights.values().copied())
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    pub fn model(&self, name: &str) -> Option<&LearnerHandle> {
        self.models.get(name)
    }

    pub fn info(&self) -> EnsembleInfo {
        EnsembleInfo {
            models: self.models.keys().cloned().collect(),
            weights: self.weights.clone(),
            total_models: self.models.len(),
            confidence: self.confidence(),
        }
    }

    /// `1 / (error + ε)` per model; models that fail to predict are left out
    fn inverse_errors(
        &self,
        features: &FeatureMatrix,
        targets: &[f64],
        error: fn(&[f64], &[f64]) -> f64,
    ) -> BTreeMap<String, f64> {
        let mut raw = BTreeMap::new();
        for (name, model) in &self.models {
            match model.predict(features) {
                Ok(predictions) if predictions.len() == targets.len() => {
                    let e = error(targets, &predictions);
                    raw.insert(name.clone(), 1.0 / (e + self.config.weight_epsilon));
                }
                Ok(_) => tracing::warn!("Model {} returned a short prediction", name),
                Err(e) => tracing::warn!("Model {} dropped while scoring: {}", name, e),
            }
        }
        raw
    }
}

/// Leading rows of `features` that have a target
fn labelled_rows(features: &FeatureMatrix, targets: &[f64]) -> Result<FeatureMatrix> {
    if targets.len() > features.len() {
        return Err(ForecastError::Validation(format!(
            "{} targets for {} feature rows",
            targets.len(),
            features.len()
        )));
    }
    Ok(features.head(targets.len()))
}

fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64
}

fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    mse(actual, predicted).sqrt()
}

/// Scale to sum 1; a zero or non-finite total falls back to equal weights
pub fn normalize_weights(raw: BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let total: f64 = raw.values().sum();
    if total > 0.0 && total.is_finite() {
        raw.into_iter().map(|(k, w)| (k, w / total)).collect()
    } else {
        let equal = 1.0 / raw.len() as f64;
        raw.into_keys().map(|k| (k, equal)).collect()
    }
}

/// `1 - H(w) / ln(n)` clamped to [0, 1]; 1.0 for zero or one weight
pub fn weight_entropy_confidence(weights: impl IntoIterator<Item = f64>) -> f64 {
    let weights: Vec<f64> = weights.into_iter().collect();
    if weights.len() <= 1 {
        return 1.0;
    }
    let entropy: f64 = weights
        .iter()
        .filter(|&&w| w > 0.0)
        .map(|w| -w * w.ln())
        .sum();
    let normalized = entropy / (weights.len() as f64).ln();
    (1.0 - normalized).clamp(0.0, 1.0)
}

/// Weighted mean of `(weight, value)` samples with an optional interval.
/// Weights are renormalized over the samples; all-zero weights count equally.
fn blend_step(samples: &[(f64, f64)], include_interval: bool, z: f64) -> Option<StepForecast> {
    if samples.is_empty() {
        return None;
    }
    let total: f64 = samples.iter().map(|(w, _)| w).sum();
    let weight = |w: f64| {
        if total > 0.0 {
            w / total
        } else {
            1.0 / samples.len() as f64
        }
    };

    let value: f64 = samples.iter().map(|&(w, v)| weight(w) * v).sum();
    if samples.len() < 2 {
        return Some(StepForecast {
            value,
            lower: None,
            upper: None,
            spread: None,
            contributors: samples.len(),
        });
    }

    let variance: f64 = samples
        .iter()
        .map(|&(w, v)| weight(w) * (v - value).powi(2))
        .sum();
    let spread = variance.sqrt();
    let (lower, upper) = if include_interval {
        let upper = value + z * spread;
        (Some((value - z * spread).max(0.0).min(upper)), Some(upper))
    } else {
        (None, None)
    };

    Some(StepForecast {
        value,
        lower,
        upper,
        spread: Some(spread),
        contributors: samples.len(),
    })
}
