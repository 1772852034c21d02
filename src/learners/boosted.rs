//! Gradient-boosted regression trees
//!
//! Least-squares boosting: every round fits a depth-limited regression tree
//! to the current residuals and adds it with shrinkage. Row and column
//! subsampling draw from a seeded RNG, so a fit is reproducible for a given
//! seed. Split search walks per-feature presorted row lists, which are
//! computed once per fit and stably partitioned down the tree.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{check_feature_names, label_importance, TrainedModel};
use crate::error::{ForecastError, Result};
use crate::features::FeatureMatrix;

/// Boosting hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    /// Minimum rows in a leaf
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn per tree
    pub subsample: f64,
    /// Fraction of columns drawn per tree
    pub colsample: f64,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self::xgboost()
    }
}

impl BoostingParams {
    /// Depth-wise trees with row and column sampling
    pub fn xgboost() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 6,
            learning_rate: 0.1,
            min_samples_leaf: 1,
            subsample: 0.8,
            colsample: 0.8,
            seed: 42,
        }
    }

    /// Larger leaves, same sampling
    pub fn lightgbm() -> Self {
        Self {
            min_samples_leaf: 20,
            ..Self::xgboost()
        }
    }

    /// No sampling
    pub fn catboost() -> Self {
        Self {
            subsample: 1.0,
            colsample: 1.0,
            ..Self::xgboost()
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.n_estimators == 0 {
            return Err("n_estimators must be at least 1".to_string());
        }
        if self.max_depth == 0 {
            return Err("max_depth must be at least 1".to_string());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(format!("learning_rate {} outside (0, 1]", self.learning_rate));
        }
        if self.min_samples_leaf == 0 {
            return Err("min_samples_leaf must be at least 1".to_string());
        }
        for (name, value) in [("subsample", self.subsample), ("colsample", self.colsample)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(format!("{} {} outside (0, 1]", name, value));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

struct BestSplit {
    position: usize,
    threshold: f64,
    gain: f64,
}

/// Grows one tree over column-major data
struct TreeBuilder<'a> {
    columns: &'a [Vec<f64>],
    residuals: &'a [f64],
    /// Column indices drawn for this tree
    features: &'a [usize],
    max_depth: usize,
    min_leaf: usize,
    gains: &'a mut [f64],
}

impl TreeBuilder<'_> {
    /// `lists[p]` holds the node's rows sorted by `features[p]`
    fn build(&mut self, lists: Vec<Vec<usize>>, depth: usize) -> Node {
        let count = lists[0].len();
        let sum: f64 = lists[0].iter().map(|&i| self.residuals[i]).sum();
        let leaf = Node::Leaf(sum / count as f64);

        if depth >= self.max_depth || count < 2 * self.min_leaf {
            return leaf;
        }
        let Some(best) = self.best_split(&lists, sum) else {
            return leaf;
        };

        let feature = self.features[best.position];
        self.gains[feature] += best.gain;

        let column = &self.columns[feature];
        let (left, right): (Vec<Vec<usize>>, Vec<Vec<usize>>) = lists
            .into_iter()
            .map(|list| {
                list.into_iter()
                    .partition::<Vec<usize>, _>(|&i| column[i] <= best.threshold)
            })
            .unzip();

        Node::Split {
            feature,
            threshold: best.threshold,
            left: Box::new(self.build(left, depth + 1)),
            right: Box::new(self.build(right, depth + 1)),
        }
    }

    fn best_split(&self, lists: &[Vec<usize>], sum: f64) -> Option<BestSplit> {
        let count = lists[0].len();
        let parent = sum * sum / count as f64;
        let mut best: Option<BestSplit> = None;

        for (position, list) in lists.iter().enumerate() {
            let column = &self.columns[self.features[position]];
            let mut left_sum = 0.0;

            for k in 0..count - 1 {
                left_sum += self.residuals[list[k]];
                let n_left = k + 1;
                let n_right = count - n_left;
                if n_right < self.min_leaf {
                    break;
                }
                if n_left < self.min_leaf {
                    continue;
                }
                let (value, next) = (column[list[k]], column[list[k + 1]]);
                if next <= value {
                    continue;
                }

                let right_sum = sum - left_sum;
                let gain = left_sum * left_sum / n_left as f64
                    + right_sum * right_sum / n_right as f64
                    - parent;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        position,
                        // rows `<= value` go left, so `next` always goes right
                        threshold: value,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Fitted boosted-tree ensemble
#[derive(Debug, Clone)]
pub struct BoostedTrees {
    model_type: String,
    feature_names: Vec<String>,
    base_score: f64,
    learning_rate: f64,
    trees: Vec<Node>,
    /// Summed split gain per training column
    gains: Vec<f64>,
}

impl BoostedTrees {
    /// Fit on validated inputs (see [`super::check_training_inputs`])
    pub fn fit(
        model_type: &str,
        params: &BoostingParams,
        features: &FeatureMatrix,
        targets: &[f64],
    ) -> Result<Self> {
        params
            .validate()
            .map_err(|e| ForecastError::training(model_type, e))?;

        let rows = features.rows();
        let n = rows.len();
        let m = features.num_features();
        if n == 0 || m == 0 {
            return Err(ForecastError::training(model_type, "empty training matrix"));
        }

        let columns: Vec<Vec<f64>> = (0..m)
            .map(|j| rows.iter().map(|r| r[j]).collect())
            .collect();
        let sorted: Vec<Vec<usize>> = columns
            .iter()
            .map(|column| {
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));
                order
            })
            .collect();

        let base_score = targets.iter().sum::<f64>() / n as f64;
        let mut predictions = vec![base_score; n];
        let mut gains = vec![0.0; m];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut rng = StdRng::seed_from_u64(params.seed);

        let row_draw = ((n as f64 * params.subsample).round() as usize).clamp(1, n);
        let col_draw = ((m as f64 * params.colsample).round() as usize).clamp(1, m);

        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> = targets
                .iter()
                .zip(&predictions)
                .map(|(y, p)| y - p)
                .collect();

            let mut in_sample = vec![row_draw == n; n];
            if row_draw < n {
                for i in index::sample(&mut rng, n, row_draw) {
                    in_sample[i] = true;
                }
            }
            let mut drawn: Vec<usize> = if col_draw < m {
                index::sample(&mut rng, m, col_draw).into_vec()
            } else {
                (0..m).collect()
            };
            drawn.sort_unstable();

            let lists: Vec<Vec<usize>> = drawn
                .iter()
                .map(|&j| sorted[j].iter().copied().filter(|&i| in_sample[i]).collect())
                .collect();

            let tree = TreeBuilder {
                columns: &columns,
                residuals: &residuals,
                features: &drawn,
                max_depth: params.max_depth,
                min_leaf: params.min_samples_leaf,
                gains: &mut gains,
            }
            .build(lists, 0);

            for (prediction, row) in predictions.iter_mut().zip(rows) {
                *prediction += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            model_type: model_type.to_string(),
            feature_names: features.feature_names().to_vec(),
            base_score,
            learning_rate: params.learning_rate,
            trees,
            gains,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.base_score
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

impl TrainedModel for BoostedTrees {
    fn model_type(&self) -> &str {
        &self.model_type
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        check_feature_names(&self.model_type, &self.feature_names, features)?;
        Ok(features.rows().iter().map(|r| self.predict_row(r)).collect())
    }

    fn feature_importance(&self, names: &[String]) -> HashMap<String, f64> {
        label_importance(&self.gains, names)
    }
}
