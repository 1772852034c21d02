//! Unit tests for the ensemble engine

use super::*;
use crate::learners::{ConfiguredLearner, LearnerKind, RidgeParams, TrainedModel};
use chrono::NaiveDate;

/// Predicts `x + offset`
#[derive(Debug, Default)]
struct OffsetModel {
    offset: f64,
    /// First prediction is NaN when asked for exactly this many rows
    nan_first_for_len: Option<usize>,
    fail_predict: bool,
    importance: HashMap<String, f64>,
}

impl TrainedModel for OffsetModel {
    fn model_type(&self) -> &str {
        "offset"
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        if self.fail_predict {
            return Err(ForecastError::prediction("offset", "broken"));
        }
        let mut values: Vec<f64> = features.rows().iter().map(|r| r[0] + self.offset).collect();
        if self.nan_first_for_len == Some(features.len()) {
            values[0] = f64::NAN;
        }
        Ok(values)
    }

    fn feature_importance(&self, _names: &[String]) -> HashMap<String, f64> {
        self.importance.clone()
    }
}

struct FakeLearner {
    name: String,
    model: Option<Arc<OffsetModel>>,
}

impl FakeLearner {
    fn ok(name: &str, model: OffsetModel) -> Arc<dyn BaseLearner> {
        Arc::new(Self {
            name: name.to_string(),
            model: Some(Arc::new(model)),
        })
    }

    fn failing(name: &str) -> Arc<dyn BaseLearner> {
        Arc::new(Self {
            name: name.to_string(),
            model: None,
        })
    }
}

impl BaseLearner for FakeLearner {
    fn name(&self) -> &str {
        &self.name
    }

    fn train(&self, _features: &FeatureMatrix, _targets: &[f64]) -> Result<LearnerHandle> {
        match &self.model {
            Some(model) => Ok(model.clone() as LearnerHandle),
            None => Err(ForecastError::training(&self.name, "diverged")),
        }
    }
}

fn offset(offset: f64) -> OffsetModel {
    OffsetModel {
        offset,
        ..OffsetModel::default()
    }
}

fn data(n: usize) -> (FeatureMatrix, Vec<f64>) {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let dates = (0..n)
        .map(|i| start + chrono::Duration::days(i as i64))
        .collect();
    let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![100.0 + i as f64]).collect();
    let targets = rows.iter().map(|r| r[0]).collect();
    let matrix = FeatureMatrix::new(dates, vec!["x".to_string()], rows).unwrap();
    (matrix, targets)
}

fn ridge() -> Arc<dyn BaseLearner> {
    Arc::new(ConfiguredLearner::new(
        "ridge",
        LearnerKind::Ridge(RidgeParams::default()),
        10,
    ))
}

#[test]
fn test_two_failures_leave_single_weight() {
    let (features, targets) = data(30);
    let mut engine = EnsembleEngine::new(
        vec![FakeLearner::failing("xgboost"), FakeLearner::failing("lightgbm"), ridge()],
        EnsembleConfig::default(),
    );
    let result = engine
        .train_and_forecast(&features, &targets, 5, true, false)
        .unwrap();

    assert_eq!(result.weights.len(), 1);
    assert_eq!(result.weights["ridge"], 1.0);
    assert_eq!(result.models_used, vec!["ridge".to_string()]);
    assert_eq!(result.failures.len(), 2);
    assert!(result.failures.contains_key("xgboost"));
    assert_eq!(result.confidence, 1.0);
    assert_eq!(result.predictions.len(), 5);
    // a single contributor never gets an interval
    assert!(result.predictions.iter().all(|p| p.lower.is_none()));
}

#[test]
fn test_all_failures_is_fatal() {
    let (features, targets) = data(30);
    let mut engine = EnsembleEngine::new(
        vec![FakeLearner::failing("a"), FakeLearner::failing("b")],
        EnsembleConfig::default(),
    );
    match engine.train_and_forecast(&features, &targets, 5, true, true) {
        Err(ForecastError::NoModelsTrained { attempted }) => {
            assert_eq!(attempted, vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("expected NoModelsTrained, got {:?}", other.map(|r| r.weights)),
    }
}

#[test]
fn test_inverse_mse_weights() {
    let (features, targets) = data(20);
    let mut engine = EnsembleEngine::new(
        vec![FakeLearner::ok("near", offset(1.0)), FakeLearner::ok("far", offset(2.0))],
        EnsembleConfig::default(),
    );
    engine.train(&features, &targets).unwrap();

    let weights = engine.weights();
    assert!((weights["near"] - 0.8).abs() < 1e-6);
    assert!((weights["far"] - 0.2).abs() < 1e-6);
    assert!((weights.values().sum::<f64>() - 1.0).abs() < 1e-6);

    let confidence = engine.confidence();
    assert!((0.0..=1.0).contains(&confidence));
}

#[test]
fn test_blended_step_and_interval() {
    let (features, targets) = data(20);
    let mut engine = EnsembleEngine::new(
        vec![FakeLearner::ok("near", offset(1.0)), FakeLearner::ok("far", offset(2.0))],
        EnsembleConfig::default(),
    );
    let result = engine
        .train_and_forecast(&features, &targets, 3, true, false)
        .unwrap();

    // tail rows are x = 117, 118, 119
    let step = result.predictions[0];
    assert!((step.value - 118.2).abs() < 1e-6);
    assert_eq!(step.contributors, 2);
    let spread = step.spread.unwrap();
    assert!((spread - 0.4).abs() < 1e-6);
    assert!((step.lower.unwrap() - (118.2 - 1.96 * 0.4)).abs() < 1e-6);
    assert!((step.upper.unwrap() - (118.2 + 1.96 * 0.4)).abs() < 1e-6);
    for p in &result.predictions {
        assert!(p.lower.unwrap() <= p.upper.unwrap());
    }
}

#[test]
fn test_interval_only_when_requested() {
    let (features, targets) = data(20);
    let mut engine = EnsembleEngine::new(
        vec![FakeLearner::ok("near", offset(1.0)), FakeLearner::ok("far", offset(2.0))],
        EnsembleConfig::default(),
    );
    let result = engine
        .train_and_forecast(&features, &targets, 3, false, false)
        .unwrap();
    assert!(result.predictions.iter().all(|p| p.lower.is_none()));
    assert!(result.predictions.iter().all(|p| p.spread.is_some()));
}

#[test]
fn test_undefined_step_value_is_skipped() {
    let (features, targets) = data(20);
    let flaky = OffsetModel {
        offset: 2.0,
        nan_first_for_len: Some(3),
        ..OffsetModel::default()
    };
    let mut engine = EnsembleEngine::new(
        vec![FakeLearner::ok("near", offset(1.0)), FakeLearner::ok("flaky", flaky)],
        EnsembleConfig::default(),
    );
    let result = engine
        .train_and_forecast(&features, &targets, 3, true, false)
        .unwrap();

    let first = result.predictions[0];
    assert_eq!(first.contributors, 1);
    assert!((first.value - 118.0).abs() < 1e-9);
    assert!(first.lower.is_none());
    assert_eq!(result.predictions[1].contributors, 2);
}

#[test]
fn test_model_failing_to_score_is_dropped() {
    let (features, targets) = data(20);
    let broken = OffsetModel {
        fail_predict: true,
        ..OffsetModel::default()
    };
    let mut engine = EnsembleEngine::new(
        vec![FakeLearner::ok("near", offset(1.0)), FakeLearner::ok("broken", broken)],
        EnsembleConfig::default(),
    );
    let result = engine
        .train_and_forecast(&features, &targets, 3, true, false)
        .unwrap();
    assert_eq!(result.models_used, vec!["near".to_string()]);
    assert_eq!(result.weights["near"], 1.0);
}

#[test]
fn test_trains_on_labelled_head_only() {
    let (features, targets) = data(20);
    let mut engine = EnsembleEngine::new(vec![ridge()], EnsembleConfig::default());
    let result = engine
        .train_and_forecast(&features, &targets[..17], 3, false, false)
        .unwrap();
    assert_eq!(result.predictions.len(), 3);

    let too_many = vec![1.0; 21];
    assert!(matches!(
        engine.train(&features, &too_many),
        Err(ForecastError::Validation(_))
    ));
}

#[test]
fn test_update_weights_is_idempotent() {
    let (features, targets) = data(20);
    let mut engine = EnsembleEngine::new(
        vec![FakeLearner::ok("near", offset(1.0)), FakeLearner::ok("far", offset(3.0))],
        EnsembleConfig::default(),
    );
    engine.train(&features, &targets).unwrap();

    let (validation, actual) = data(10);
    engine.update_weights(&validation, &actual).unwrap();
    let first = engine.weights().clone();
    engine.update_weights(&validation, &actual).unwrap();
    assert_eq!(&first, engine.weights());

    // 1/RMSE: 1 and 1/3
    assert!((first["near"] - 0.75).abs() < 1e-6);
    assert!((first["far"] - 0.25).abs() < 1e-6);
}

#[test]
fn test_model_performance_report() {
    let (features, targets) = data(20);
    let mut engine = EnsembleEngine::new(
        vec![FakeLearner::ok("near", offset(1.0)), FakeLearner::ok("far", offset(2.0))],
        EnsembleConfig::default(),
    );
    engine.train(&features, &targets).unwrap();

    let report = engine.model_performance(&features, &targets).unwrap();
    assert!((report["near"].mae - 1.0).abs() < 1e-9);
    assert!((report["far"].rmse - 2.0).abs() < 1e-9);
    assert!((report["near"].weight - 0.8).abs() < 1e-6);

    let info = engine.info();
    assert_eq!(info.total_models, 2);
    assert_eq!(info.models, vec!["far".to_string(), "near".to_string()]);
}

#[test]
fn test_weighted_feature_importance() {
    let (features, targets) = data(20);
    let a = OffsetModel {
        offset: 1.0,
        importance: HashMap::from([("x".to_string(), 1.0)]),
        ..OffsetModel::default()
    };
    let b = OffsetModel {
        offset: 2.0,
        importance: HashMap::from([("y".to_string(), 0.5), ("z".to_string(), 0.5)]),
        ..OffsetModel::default()
    };
    let mut engine = EnsembleEngine::new(
        vec![FakeLearner::ok("a", a), FakeLearner::ok("b", b)],
        EnsembleConfig::default(),
    );
    let result = engine
        .train_and_forecast(&features, &targets, 2, false, true)
        .unwrap();

    let scores = result.feature_importance.unwrap();
    assert_eq!(scores[0].feature, "x");
    assert!((scores[0].importance - 0.8).abs() < 1e-6);
    // equal scores are ordered by name
    assert_eq!(scores[1].feature, "y");
    assert_eq!(scores[2].feature, "z");
}

#[test]
fn test_normalize_weights_fallback() {
    let raw = BTreeMap::from([("a".to_string(), 0.0), ("b".to_string(), 0.0)]);
    let weights = normalize_weights(raw);
    assert_eq!(weights["a"], 0.5);

    let raw = BTreeMap::from([("a".to_string(), f64::NAN), ("b".to_string(), 1.0)]);
    let weights = normalize_weights(raw);
    assert_eq!(weights["b"], 0.5);
}

#[test]
fn test_entropy_confidence() {
    assert_eq!(weight_entropy_confidence(Vec::<f64>::new()), 1.0);
    assert_eq!(weight_entropy_confidence(vec![1.0]), 1.0);
    assert!(weight_entropy_confidence(vec![0.5, 0.5]).abs() < 1e-12);
    assert!((weight_entropy_confidence(vec![1.0, 0.0, 0.0]) - 1.0).abs() < 1e-12);

    let mixed = weight_entropy_confidence(vec![0.7, 0.2, 0.1]);
    assert!(mixed > 0.0 && mixed < 1.0);
}
