//! Repeat-purchase model contract and baseline estimators.
//!
//! The pipeline only talks to [`ModelAdapter`]. [`ModelBundle`] is the shipped implementation:
//! one logistic classifier per horizon plus a single quantity regressor shared by both. All
//! predictions are deterministic for a given bundle and input matrix.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod estimators;
pub mod linear;
pub mod metrics;

pub use estimators::{LinearQuantityRegressor, LogisticClassifier};
pub use linear::GradientParams;
pub use metrics::{mean_absolute_error, roc_auc, train_test_split, Split};

use crate::errors::{ApplicationError, DomainError, ModelError};
use crate::features::{FeatureMatrix, FeatureSchema};

pub const MODEL_FORMAT_VERSION: &str = "harvest-model/1";

/// Forward windows the models are trained for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Horizon {
    SevenDays,
    FourteenDays,
}

impl Horizon {
    pub const ALL: [Horizon; 2] = [Horizon::SevenDays, Horizon::FourteenDays];

    pub fn days(self) -> u32 {
        match self {
            Self::SevenDays => 7,
            Self::FourteenDays => 14,
        }
    }
}

impl TryFrom<i64> for Horizon {
    type Error = DomainError;

    fn try_from(window_days: i64) -> Result<Self, Self::Error> {
        match window_days {
            7 => Ok(Self::SevenDays),
            14 => Ok(Self::FourteenDays),
            _ => Err(DomainError::UnsupportedHorizon { window_days }),
        }
    }
}

impl std::fmt::Display for Horizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}d", self.days())
    }
}

pub trait ProbabilityModel: Send + Sync {
    fn fit(&mut self, matrix: &FeatureMatrix, labels: &[bool]) -> Result<(), ModelError>;

    /// One value in `[0, 1]` per row.
    fn predict_probability(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, ModelError>;
}

pub trait QuantityModel: Send + Sync {
    fn fit(&mut self, matrix: &FeatureMatrix, targets: &[f64]) -> Result<(), ModelError>;

    /// One non-negative value per row.
    fn predict_quantity(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, ModelError>;
}

/// Per-row outputs for one horizon, aligned with the input matrix.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonPrediction {
    pub probabilities: Vec<f64>,
    pub quantities: Vec<f64>,
}

impl HorizonPrediction {
    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }
}

pub trait ModelAdapter: Send + Sync {
    fn predict(
        &self,
        horizon: Horizon,
        matrix: &FeatureMatrix,
    ) -> Result<HorizonPrediction, ModelError>;

    /// Like [`ModelAdapter::predict`] for a raw window length; anything but 7 or 14 is rejected.
    fn predict_window(
        &self,
        window_days: i64,
        matrix: &FeatureMatrix,
    ) -> Result<HorizonPrediction, ApplicationError> {
        let horizon = Horizon::try_from(window_days)?;
        Ok(self.predict(horizon, matrix)?)
    }
}

/// Trained models plus the metadata needed to reload them safely.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub schema_checksum: String,
    pub feature_names: Vec<String>,
    pub classifier_7d: LogisticClassifier,
    pub classifier_14d: LogisticClassifier,
    pub regressor: LinearQuantityRegressor,
}

impl ModelBundle {
    pub fn new(
        schema: &FeatureSchema,
        classifier_7d: LogisticClassifier,
        classifier_14d: LogisticClassifier,
        regressor: LinearQuantityRegressor,
    ) -> Self {
        Self {
            version: MODEL_FORMAT_VERSION.to_owned(),
            trained_at: Utc::now(),
            schema_checksum: schema.checksum(),
            feature_names: schema.column_names().into_iter().map(str::to_owned).collect(),
            classifier_7d,
            classifier_14d,
            regressor,
        }
    }

    pub fn classifier(&self, horizon: Horizon) -> &LogisticClassifier {
        match horizon {
            Horizon::SevenDays => &self.classifier_7d,
            Horizon::FourteenDays => &self.classifier_14d,
        }
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        serde_json::to_string_pretty(self).map_err(|error| {
            ModelError::Persistence(format!("failed to serialize bundle: {error}"))
        })
    }

    /// Parse a bundle and check it against the running feature schema.
    pub fn from_json(json: &str, schema: &FeatureSchema) -> Result<Self, ModelError> {
        let bundle: Self = serde_json::from_str(json).map_err(|error| {
            ModelError::Persistence(format!("failed to deserialize bundle: {error}"))
        })?;
        if bundle.version != MODEL_FORMAT_VERSION {
            return Err(ModelError::Persistence(format!(
                "unsupported model format `{}` (expected `{MODEL_FORMAT_VERSION}`)",
                bundle.version
            )));
        }
        let expected = schema.checksum();
        if bundle.schema_checksum != expected {
            return Err(ModelError::SchemaMismatch {
                expected,
                actual: bundle.schema_checksum,
            });
        }
        Ok(bundle)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| {
                ModelError::Persistence(format!("failed to create `{}`: {error}", parent.display()))
            })?;
        }
        fs::write(path, self.to_json()?).map_err(|error| {
            ModelError::Persistence(format!("failed to write `{}`: {error}", path.display()))
        })?;

        tracing::info!(
            event_name = "ml.bundle.saved",
            path = %path.display(),
            schema_checksum = %self.schema_checksum,
            "model bundle saved"
        );
        Ok(())
    }

    pub fn load(path: &Path, schema: &FeatureSchema) -> Result<Self, ModelError> {
        let json = fs::read_to_string(path).map_err(|error| {
            ModelError::Persistence(format!("failed to read `{}`: {error}", path.display()))
        })?;
        let bundle = Self::from_json(&json, schema)?;

        tracing::info!(
            event_name = "ml.bundle.loaded",
            path = %path.display(),
            trained_at = %bundle.trained_at,
            "model bundle loaded"
        );
        Ok(bundle)
    }
}

impl ModelAdapter for ModelBundle {
    fn predict(
        &self,
        horizon: Horizon,
        matrix: &FeatureMatrix,
    ) -> Result<HorizonPrediction, ModelError> {
        if matrix.schema_checksum != self.schema_checksum {
            return Err(ModelError::SchemaMismatch {
                expected: self.schema_checksum.clone(),
                actual: matrix.schema_checksum.clone(),
            });
        }
        if matrix.is_empty() {
            return Ok(HorizonPrediction::default());
        }

        let probabilities = self.classifier(horizon).predict_probability(matrix)?;
        let quantities = self.regressor.predict_quantity(matrix)?;
        if probabilities.len() != matrix.len() || quantities.len() != matrix.len() {
            return Err(ModelError::LengthMismatch {
                expected: matrix.len(),
                actual: probabilities.len().min(quantities.len()),
            });
        }
        Ok(HorizonPrediction { probabilities, quantities })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted_bundle(schema: &FeatureSchema) -> ModelBundle {
        let width = schema.width();
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| (0..width).map(|j| f64::from(i) + j as f64).collect())
            .collect();
        let matrix = FeatureMatrix { schema_checksum: schema.checksum(), width, rows };
        let labels: Vec<bool> = (0..20).map(|i| i >= 10).collect();
        let targets: Vec<f64> = (0..20).map(|i| f64::from(i % 4)).collect();

        let params = GradientParams { epochs: 200, ..GradientParams::default() };
        let mut classifier_7d = LogisticClassifier::new(params);
        let mut classifier_14d = LogisticClassifier::new(params);
        let mut regressor = LinearQuantityRegressor::new(params);
        classifier_7d.fit(&matrix, &labels).expect("fit 7d");
        classifier_14d.fit(&matrix, &labels).expect("fit 14d");
        regressor.fit(&matrix, &targets).expect("fit regressor");

        ModelBundle::new(schema, classifier_7d, classifier_14d, regressor)
    }

    #[test]
    fn horizon_accepts_only_seven_and_fourteen() {
        assert_eq!(Horizon::try_from(7_i64), Ok(Horizon::SevenDays));
        assert_eq!(Horizon::try_from(14_i64), Ok(Horizon::FourteenDays));
        assert_eq!(
            Horizon::try_from(30_i64),
            Err(DomainError::UnsupportedHorizon { window_days: 30 })
        );
        assert_eq!(Horizon::FourteenDays.to_string(), "14d");
    }

    #[test]
    fn predict_window_rejects_unsupported_horizons() {
        let schema = FeatureSchema::standard();
        let bundle = fitted_bundle(&schema);
        let matrix = schema.matrix(std::iter::empty());

        let error = bundle.predict_window(30, &matrix).expect_err("30 days");
        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::UnsupportedHorizon { window_days: 30 })
        );
        assert_eq!(bundle.predict_window(7, &matrix), Ok(HorizonPrediction::default()));
    }

    #[test]
    fn predictions_are_aligned_and_bounded() {
        let schema = FeatureSchema::standard();
        let bundle = fitted_bundle(&schema);
        let matrix = FeatureMatrix {
            schema_checksum: schema.checksum(),
            width: schema.width(),
            rows: vec![vec![1.0; schema.width()], vec![15.0; schema.width()]],
        };

        for horizon in Horizon::ALL {
            let prediction = bundle.predict(horizon, &matrix).expect("predict");
            assert_eq!(prediction.len(), 2);
            assert!(prediction.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
            assert!(prediction.quantities.iter().all(|q| *q >= 0.0));
        }
    }

    #[test]
    fn bundle_round_trips_through_disk() {
        let schema = FeatureSchema::standard();
        let bundle = fitted_bundle(&schema);
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("models").join("bundle.json");

        bundle.save(&path).expect("save");
        let loaded = ModelBundle::load(&path, &schema).expect("load");
        assert_eq!(loaded.schema_checksum, bundle.schema_checksum);
        assert_eq!(loaded.feature_names.len(), 14);
        assert!(loaded.classifier_7d.is_fitted());
        assert!(loaded.regressor.is_fitted());
    }

    #[test]
    fn load_rejects_a_bundle_built_for_another_schema() {
        let schema = FeatureSchema::standard();
        let json = fitted_bundle(&schema).to_json().expect("serialize");
        let mut columns = schema.columns().to_vec();
        columns.pop();
        let narrower = FeatureSchema::with_columns(columns);

        let error = ModelBundle::from_json(&json, &narrower).expect_err("schema differs");
        assert!(matches!(error, ModelError::SchemaMismatch { .. }));
    }

    #[test]
    fn load_reports_missing_files_as_persistence_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = ModelBundle::load(&dir.path().join("absent.json"), &FeatureSchema::standard())
            .expect_err("missing file");
        assert!(matches!(error, ModelError::Persistence(_)));
    }
}
