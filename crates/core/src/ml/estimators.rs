use serde::{Deserialize, Serialize};

use super::linear::{fit_weights, sigmoid, GradientParams, Link, LinearWeights};
use super::{ProbabilityModel, QuantityModel};
use crate::errors::ModelError;
use crate::features::FeatureMatrix;

/// L2-regularized logistic regression.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogisticClassifier {
    pub params: GradientParams,
    fitted: Option<LinearWeights>,
}

impl LogisticClassifier {
    pub fn new(params: GradientParams) -> Self {
        Self { params, fitted: None }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn weights(&self) -> Option<&LinearWeights> {
        self.fitted.as_ref()
    }
}

impl ProbabilityModel for LogisticClassifier {
    fn fit(&mut self, matrix: &FeatureMatrix, labels: &[bool]) -> Result<(), ModelError> {
        let targets: Vec<f64> = labels.iter().map(|label| if *label { 1.0 } else { 0.0 }).collect();
        let base_rate = if targets.is_empty() {
            0.5
        } else {
            (targets.iter().sum::<f64>() / targets.len() as f64).clamp(1e-3, 1.0 - 1e-3)
        };
        let initial_bias = (base_rate / (1.0 - base_rate)).ln();

        let weights = fit_weights(matrix, &targets, &self.params, Link::Logistic, initial_bias)?;
        self.fitted = Some(weights);
        Ok(())
    }

    fn predict_probability(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted("logistic_classifier"))?;
        fitted.check_schema(matrix)?;
        Ok(matrix.rows.iter().map(|row| sigmoid(fitted.linear(row))).collect())
    }
}

/// Least-squares linear regression on purchase quantity. Predictions never go below zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearQuantityRegressor {
    pub params: GradientParams,
    fitted: Option<LinearWeights>,
}

impl LinearQuantityRegressor {
    pub fn new(params: GradientParams) -> Self {
        Self { params, fitted: None }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

impl QuantityModel for LinearQuantityRegressor {
    fn fit(&mut self, matrix: &FeatureMatrix, targets: &[f64]) -> Result<(), ModelError> {
        let mean = if targets.is_empty() {
            0.0
        } else {
            targets.iter().sum::<f64>() / targets.len() as f64
        };
        self.fitted = Some(fit_weights(matrix, targets, &self.params, Link::Identity, mean)?);
        Ok(())
    }

    fn predict_quantity(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted("quantity_regressor"))?;
        fitted.check_schema(matrix)?;
        Ok(matrix
            .rows
            .iter()
            .map(|row| {
                let value = fitted.linear(row);
                if value.is_finite() {
                    value.max(0.0)
                } else {
                    0.0
                }
            })
            .collect())
    }
}
