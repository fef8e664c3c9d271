//! Batch gradient descent over standardized features.
//!
//! Shared by the logistic classifier and the quantity regressor. Inputs are standardized per
//! column with statistics captured at fit time; the bias term is never regularized.

use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::features::FeatureMatrix;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientParams {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2_penalty: f64,
}

impl Default for GradientParams {
    fn default() -> Self {
        Self { epochs: 1000, learning_rate: 0.1, l2_penalty: 0.01 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Link {
    Identity,
    Logistic,
}

impl Link {
    fn apply(self, z: f64) -> f64 {
        match self {
            Self::Identity => z,
            Self::Logistic => sigmoid(z),
        }
    }
}

/// 1 / (1 + e^(-z)), clamped to avoid overflow.
pub(crate) fn sigmoid(z: f64) -> f64 {
    let z = z.clamp(-500.0, 500.0);
    1.0 / (1.0 + (-z).exp())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl Standardizer {
    pub fn fit(rows: &[Vec<f64>], width: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; width];
        for row in rows {
            for (mean, value) in means.iter_mut().zip(row) {
                *mean += value / n;
            }
        }

        let mut variances = vec![0.0; width];
        for row in rows {
            for ((variance, mean), value) in variances.iter_mut().zip(&means).zip(row) {
                *variance += (value - mean).powi(2) / n;
            }
        }
        let scales = variances
            .into_iter()
            .map(|variance| {
                let scale = variance.sqrt();
                if scale.is_finite() && scale > 1e-12 {
                    scale
                } else {
                    1.0
                }
            })
            .collect();

        Self { means, scales }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(value, (mean, scale))| (value - mean) / scale)
            .collect()
    }
}

/// Fitted coefficients tied to the schema they were trained against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearWeights {
    pub schema_checksum: String,
    pub standardizer: Standardizer,
    pub weights: Vec<f64>,
    pub bias: f64,
    pub training_samples: usize,
}

impl LinearWeights {
    pub(crate) fn check_schema(&self, matrix: &FeatureMatrix) -> Result<(), ModelError> {
        if matrix.schema_checksum != self.schema_checksum || matrix.width != self.weights.len() {
            return Err(ModelError::SchemaMismatch {
                expected: self.schema_checksum.clone(),
                actual: matrix.schema_checksum.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn linear(&self, row: &[f64]) -> f64 {
        let x = self.standardizer.transform(row);
        self.bias + self.weights.iter().zip(&x).map(|(w, xi)| w * xi).sum::<f64>()
    }
}

pub(crate) fn fit_weights(
    matrix: &FeatureMatrix,
    targets: &[f64],
    params: &GradientParams,
    link: Link,
    initial_bias: f64,
) -> Result<LinearWeights, ModelError> {
    if matrix.len() != targets.len() {
        return Err(ModelError::LengthMismatch { expected: matrix.len(), actual: targets.len() });
    }
    if matrix.is_empty() {
        return Err(ModelError::EmptyTrainingSet("feature matrix has no rows".to_owned()));
    }

    let width = matrix.width;
    let standardizer = Standardizer::fit(&matrix.rows, width);
    let x: Vec<Vec<f64>> = matrix.rows.iter().map(|row| standardizer.transform(row)).collect();
    let n = x.len() as f64;

    let mut weights = vec![0.0; width];
    let mut bias = initial_bias;
    for _ in 0..params.epochs {
        let mut gradients = vec![0.0; width];
        let mut bias_gradient = 0.0;

        for (row, target) in x.iter().zip(targets) {
            let z = bias + weights.iter().zip(row).map(|(w, xi)| w * xi).sum::<f64>();
            let error = link.apply(z) - target;
            bias_gradient += error;
            for (gradient, xi) in gradients.iter_mut().zip(row) {
                *gradient += error * xi;
            }
        }

        bias -= params.learning_rate * bias_gradient / n;
        for (weight, gradient) in weights.iter_mut().zip(&gradients) {
            let regularized = gradient / n + params.l2_penalty * *weight;
            *weight -= params.learning_rate * regularized;
        }
    }

    if !bias.is_finite() || weights.iter().any(|weight| !weight.is_finite()) {
        return Err(ModelError::EmptyTrainingSet(
            "gradient descent diverged; lower the learning rate".to_owned(),
        ));
    }

    Ok(LinearWeights {
        schema_checksum: matrix.schema_checksum.clone(),
        standardizer,
        weights,
        bias,
        training_samples: matrix.len(),
    })
}
