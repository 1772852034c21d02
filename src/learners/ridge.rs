//! Ridge regression baseline
//!
//! Columns are standardized before fitting and near-constant columns are
//! left out. The penalized normal equations are solved by Cholesky.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{check_feature_names, label_importance, TrainedModel};
use crate::error::{ForecastError, Result};
use crate::features::FeatureMatrix;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeParams {
    /// L2 penalty on standardized coefficients
    pub alpha: f64,
}

impl Default for RidgeParams {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

/// Fitted ridge model
#[derive(Debug, Clone)]
pub struct Ridge {
    model_type: String,
    feature_names: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
    /// Per standardized column; zero for excluded columns
    coefficients: Vec<f64>,
    intercept: f64,
}

impl Ridge {
    pub fn fit(
        model_type: &str,
        params: &RidgeParams,
        features: &FeatureMatrix,
        targets: &[f64],
    ) -> Result<Self> {
        if !(params.alpha > 0.0 && params.alpha.is_finite()) {
            return Err(ForecastError::training(model_type, "alpha must be positive"));
        }
        let rows = features.rows();
        let n = rows.len();
        let m = features.num_features();
        if n == 0 {
            return Err(ForecastError::training(model_type, "empty training matrix"));
        }
        let nf = n as f64;

        let means: Vec<f64> = (0..m)
            .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / nf)
            .collect();
        let scales: Vec<f64> = (0..m)
            .map(|j| {
                let var = rows.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / nf;
                var.sqrt()
            })
            .collect();
        let active: Vec<usize> = (0..m)
            .filter(|&j| scales[j] > 1e-9 * (means[j].abs() + 1.0))
            .collect();

        let intercept = targets.iter().sum::<f64>() / nf;
        let mut coefficients = vec![0.0; m];

        if !active.is_empty() {
            let k = active.len();
            let standardized: Vec<Vec<f64>> = rows
                .iter()
                .map(|r| {
                    active
                        .iter()
                        .map(|&j| (r[j] - means[j]) / scales[j])
                        .collect()
                })
                .collect();

            // (XᵀX + αI) b = Xᵀy
            let mut gram = vec![vec![0.0; k]; k];
            let mut rhs = vec![0.0; k];
            for (x, y) in standardized.iter().zip(targets) {
                let yc = y - intercept;
                for a in 0..k {
                    rhs[a] += x[a] * yc;
                    for b in 0..=a {
                        gram[a][b] += x[a] * x[b];
                    }
                }
            }
            for a in 0..k {
                gram[a][a] += params.alpha;
                for b in 0..a {
                    gram[b][a] = gram[a][b];
                }
            }

            let solution = solve_cholesky(gram, rhs)
                .ok_or_else(|| ForecastError::training(model_type, "normal equations are singular"))?;
            for (&j, beta) in active.iter().zip(solution) {
                coefficients[j] = beta;
            }
        }

        Ok(Self {
            model_type: model_type.to_string(),
            feature_names: features.feature_names().to_vec(),
            means,
            scales,
            coefficients,
            intercept,
        })
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .enumerate()
            .filter(|(_, beta)| **beta != 0.0)
            .map(|(j, beta)| beta * (row[j] - self.means[j]) / self.scales[j])
            .sum::<f64>()
            + self.intercept
    }
}

impl TrainedModel for Ridge {
    fn model_type(&self) -> &str {
        &self.model_type
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        check_feature_names(&self.model_type, &self.feature_names, features)?;
        Ok(features.rows().iter().map(|r| self.predict_row(r)).collect())
    }

    fn feature_importance(&self, names: &[String]) -> HashMap<String, f64> {
        let magnitudes: Vec<f64> = self.coefficients.iter().map(|b| b.abs()).collect();
        label_importance(&magnitudes, names)
    }
}

/// Solve `A x = b` for symmetric positive-definite `A`
fn solve_cholesky(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let k = b.len();

    // In-place lower factor
    for j in 0..k {
        let mut diag = a[j][j];
        for p in 0..j {
            diag -= a[j][p] * a[j][p];
        }
        if !(diag > 0.0 && diag.is_finite()) {
            return None;
        }
        let diag = diag.sqrt();
        a[j][j] = diag;
        for i in j + 1..k {
            let mut value = a[i][j];
            for p in 0..j {
                value -= a[i][p] * a[j][p];
            }
            a[i][j] = value / diag;
        }
    }

    // L y = b
    for i in 0..k {
        for p in 0..i {
            b[i] -= a[i][p] * b[p];
        }
        b[i] /= a[i][i];
    }
    // Lᵀ x = y
    for i in (0..k).rev() {
        for p in i + 1..k {
            b[i] -= a[p][i] * b[p];
        }
        b[i] /= a[i][i];
    }
    Some(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_cholesky() {
        let a = vec![vec![4.0, 2.0], vec![2.0, 3.0]];
        let x = solve_cholesky(a, vec![2.0, 1.0]).unwrap();
        // 4x + 2y = 2, 2x + 3y = 1
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);
    }

    #[test]
    fn test_solve_cholesky_rejects_indefinite() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        assert!(solve_cholesky(a, vec![1.0, 1.0]).is_none());
    }
}
