//! Pipeline entry points plus the training and recommendation workflows built on them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::candidates::{Candidate, CandidateGenerator};
use crate::domain::CustomerId;
use crate::errors::{ApplicationError, DomainError, ModelError};
use crate::features::{FeatureEngineer, FeatureMatrix, FeatureSchema, FeatureVector};
use crate::labels::{LabelBuilder, TrainingExample};
use crate::ml::{
    mean_absolute_error, roc_auc, train_test_split, GradientParams, Horizon,
    LinearQuantityRegressor, LogisticClassifier, ModelAdapter, ModelBundle, ProbabilityModel,
    QuantityModel,
};
use crate::ranking::{CandidatePredictions, RankedCandidate, Recommendation, ScoreRanker};
use crate::snapshot::TransactionSnapshot;

/// Feature vectors built at `cutoff`, each joined with its `window_days` forward label.
pub fn build_training_set(
    snapshot: &TransactionSnapshot,
    cutoff: NaiveDate,
    window_days: u32,
) -> Result<Vec<TrainingExample>, DomainError> {
    let features = FeatureEngineer::new().build(snapshot, cutoff);
    LabelBuilder::new().build(snapshot, features, cutoff, window_days)
}

pub fn build_candidates(
    snapshot: &TransactionSnapshot,
    customer_id: &CustomerId,
    prediction_date: NaiveDate,
) -> Vec<Candidate> {
    CandidateGenerator::new().build(snapshot, customer_id, prediction_date)
}

pub fn rank(
    candidates: &[Candidate],
    predictions: &CandidatePredictions,
    top_n: usize,
) -> Result<Vec<RankedCandidate>, DomainError> {
    ScoreRanker::new().rank(candidates, predictions, top_n)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingOptions {
    pub seed: u64,
    pub test_fraction: f64,
    pub params: GradientParams,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self { seed: 42, test_fraction: 0.2, params: GradientParams::default() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HorizonReport {
    pub horizon: Horizon,
    pub examples: usize,
    pub positives: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    /// `None` when the test split holds a single class.
    pub auc: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub cutoff: NaiveDate,
    pub schema_checksum: String,
    pub feature_vectors: usize,
    pub horizons: Vec<HorizonReport>,
    pub quantity_train_rows: usize,
    pub quantity_test_rows: usize,
    pub quantity_mae: Option<f64>,
}

/// Fits one classifier per horizon and a quantity regressor on the pooled positive rows.
#[derive(Clone, Debug, Default)]
pub struct TrainingPipeline {
    schema: FeatureSchema,
    options: TrainingOptions,
}

impl TrainingPipeline {
    pub fn new(options: TrainingOptions) -> Self {
        Self { schema: FeatureSchema::standard(), options }
    }

    pub fn with_schema(mut self, schema: FeatureSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn train(
        &self,
        snapshot: &TransactionSnapshot,
        cutoff: NaiveDate,
    ) -> Result<(ModelBundle, TrainingReport), ApplicationError> {
        let features = FeatureEngineer::new().build(snapshot, cutoff);
        if features.is_empty() {
            return Err(ModelError::EmptyTrainingSet(format!(
                "no purchase history at or before {cutoff}"
            ))
            .into());
        }

        let labels = LabelBuilder::new();
        let mut classifiers = Vec::with_capacity(Horizon::ALL.len());
        let mut horizon_reports = Vec::with_capacity(Horizon::ALL.len());
        let mut quantity_rows: Vec<&FeatureVector> = Vec::new();
        let mut quantity_targets = Vec::new();

        let mut labelled = Vec::with_capacity(Horizon::ALL.len());
        for horizon in Horizon::ALL {
            labelled.push((
                horizon,
                labels.build(snapshot, features.clone(), cutoff, horizon.days())?,
            ));
        }

        for (horizon, examples) in &labelled {
            let (classifier, report) = self.fit_classifier(*horizon, examples)?;
            classifiers.push(classifier);
            horizon_reports.push(report);

            for example in examples.iter().filter(|example| example.label.will_buy) {
                quantity_rows.push(&example.features);
                quantity_targets.push(example.label.future_quantity as f64);
            }
        }

        let quantity_matrix = self.schema.matrix(quantity_rows);
        let (regressor, quantity_train_rows, quantity_test_rows, quantity_mae) =
            self.fit_regressor(&quantity_matrix, &quantity_targets)?;

        let mut classifiers = classifiers.into_iter();
        let (Some(classifier_7d), Some(classifier_14d)) = (classifiers.next(), classifiers.next())
        else {
            return Err(DomainError::InvariantViolation(
                "expected one classifier per horizon".to_owned(),
            )
            .into());
        };

        let bundle = ModelBundle::new(&self.schema, classifier_7d, classifier_14d, regressor);
        let report = TrainingReport {
            cutoff,
            schema_checksum: bundle.schema_checksum.clone(),
            feature_vectors: features.len(),
            horizons: horizon_reports,
            quantity_train_rows,
            quantity_test_rows,
            quantity_mae,
        };

        tracing::info!(
            event_name = "ml.training.completed",
            cutoff = %cutoff,
            feature_vectors = report.feature_vectors,
            auc_7d = ?report.horizons.first().and_then(|h| h.auc),
            auc_14d = ?report.horizons.get(1).and_then(|h| h.auc),
            quantity_mae = ?report.quantity_mae,
            "model training completed"
        );
        Ok((bundle, report))
    }

    fn fit_classifier(
        &self,
        horizon: Horizon,
        examples: &[TrainingExample],
    ) -> Result<(LogisticClassifier, HorizonReport), ModelError> {
        let matrix = self.schema.matrix(examples.iter().map(|example| &example.features));
        let targets: Vec<bool> = examples.iter().map(|example| example.label.will_buy).collect();
        let positives = targets.iter().filter(|label| **label).count();
        if positives == 0 {
            return Err(ModelError::EmptyTrainingSet(format!(
                "no repeat purchases inside the {horizon} window"
            )));
        }

        let split = train_test_split(matrix.len(), self.options.test_fraction, self.options.seed);
        let train_labels: Vec<bool> = split.train.iter().map(|i| targets[*i]).collect();
        let test_labels: Vec<bool> = split.test.iter().map(|i| targets[*i]).collect();

        let mut classifier = LogisticClassifier::new(self.options.params);
        classifier.fit(&matrix.select(&split.train), &train_labels)?;

        let auc = if split.test.is_empty() {
            None
        } else {
            let scores = classifier.predict_probability(&matrix.select(&split.test))?;
            roc_auc(&scores, &test_labels)
        };

        tracing::info!(
            event_name = "ml.classifier.fitted",
            horizon = %horizon,
            examples = matrix.len(),
            positives,
            auc = ?auc,
            "purchase classifier fitted"
        );

        Ok((
            classifier,
            HorizonReport {
                horizon,
                examples: matrix.len(),
                positives,
                train_rows: split.train.len(),
                test_rows: split.test.len(),
                auc,
            },
        ))
    }

    fn fit_regressor(
        &self,
        matrix: &FeatureMatrix,
        targets: &[f64],
    ) -> Result<(LinearQuantityRegressor, usize, usize, Option<f64>), ModelError> {
        if matrix.is_empty() {
            return Err(ModelError::EmptyTrainingSet(
                "no positive rows to fit the quantity regressor".to_owned(),
            ));
        }

        let split = train_test_split(matrix.len(), self.options.test_fraction, self.options.seed);
        let train_targets: Vec<f64> = split.train.iter().map(|i| targets[*i]).collect();
        let test_targets: Vec<f64> = split.test.iter().map(|i| targets[*i]).collect();

        let mut regressor = LinearQuantityRegressor::new(self.options.params);
        regressor.fit(&matrix.select(&split.train), &train_targets)?;

        let mae = if split.test.is_empty() {
            None
        } else {
            let predictions = regressor.predict_quantity(&matrix.select(&split.test))?;
            mean_absolute_error(&predictions, &test_targets)
        };

        tracing::info!(
            event_name = "ml.regressor.fitted",
            rows = matrix.len(),
            mae = ?mae,
            "quantity regressor fitted"
        );
        Ok((regressor, split.train.len(), split.test.len(), mae))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub customer_id: CustomerId,
    pub prediction_date: NaiveDate,
    pub candidate_count: usize,
    pub ranked: Vec<RankedCandidate>,
    pub recommendations: Vec<Recommendation>,
}

/// Candidates, both horizon predictions, and ranking for one customer.
#[derive(Clone, Debug)]
pub struct Recommender<M> {
    model: M,
    schema: FeatureSchema,
    ranker: ScoreRanker,
}

impl<M: ModelAdapter> Recommender<M> {
    pub fn new(model: M) -> Self {
        Self { model, schema: FeatureSchema::standard(), ranker: ScoreRanker::new() }
    }

    pub fn with_schema(mut self, schema: FeatureSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn recommend(
        &self,
        snapshot: &TransactionSnapshot,
        customer_id: &CustomerId,
        prediction_date: NaiveDate,
        top_n: usize,
    ) -> Result<RecommendationSet, ApplicationError> {
        let candidates = build_candidates(snapshot, customer_id, prediction_date);
        let matrix = self.schema.matrix(candidates.iter());

        let predictions = if candidates.is_empty() {
            CandidatePredictions::default()
        } else {
            let seven = self.model.predict(Horizon::SevenDays, &matrix)?;
            let fourteen = self.model.predict(Horizon::FourteenDays, &matrix)?;
            CandidatePredictions::from_horizons(seven, fourteen)
        };

        let ranked = self.ranker.rank(&candidates, &predictions, top_n)?;
        let recommendations = ranked.iter().map(Recommendation::from).collect();

        tracing::info!(
            event_name = "pipeline.recommendations.ranked",
            customer_id = %customer_id,
            prediction_date = %prediction_date,
            candidates = candidates.len(),
            returned = ranked.len(),
            top_n,
            "recommendations ranked"
        );

        Ok(RecommendationSet {
            customer_id: customer_id.clone(),
            prediction_date,
            candidate_count: candidates.len(),
            ranked,
            recommendations,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::TransactionRecord;
    use crate::ml::HorizonPrediction;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    /// Twelve weeks of weekly purchases for frequent buyers, one purchase for occasional ones.
    fn snapshot() -> TransactionSnapshot {
        let mut records = Vec::new();
        let start = date(2024, 8, 1);
        for customer in 0..8 {
            for product in 0..3 {
                let customer_id = format!("C{customer}");
                let product_id = format!("P{product}");
                let price = Decimal::new(200 + i64::from(product) * 50, 2);
                let frequent = (customer + product) % 2 == 0;
                let purchases = if frequent { 14 } else { 1 };
                for week in 0..purchases {
                    let on = start + chrono::Duration::days(7 * week + i64::from(customer));
                    let qty = 1 + (customer % 3) as u32;
                    let surplus = product == 2 && week % 3 == 0;
                    records.push(TransactionRecord::new(
                        customer_id.as_str(),
                        product_id.as_str(),
                        on,
                        qty,
                        price,
                        surplus,
                    ));
                }
            }
        }
        TransactionSnapshot::from_records(records).expect("valid records")
    }

    struct FixedAdapter;

    impl ModelAdapter for FixedAdapter {
        fn predict(
            &self,
            horizon: Horizon,
            matrix: &FeatureMatrix,
        ) -> Result<HorizonPrediction, ModelError> {
            let base = match horizon {
                Horizon::SevenDays => 0.4,
                Horizon::FourteenDays => 0.6,
            };
            Ok(HorizonPrediction {
                probabilities: (0..matrix.len()).map(|i| base + 0.1 * i as f64).collect(),
                quantities: vec![2.0; matrix.len()],
            })
        }
    }

    #[test]
    fn training_set_has_one_example_per_history_pair() {
        let cutoff = date(2024, 10, 1);
        let examples = build_training_set(&snapshot(), cutoff, 7).expect("training set");

        assert_eq!(examples.len(), 24);
        assert!(examples.iter().any(|example| example.label.will_buy));
        assert!(examples.iter().any(|example| !example.label.will_buy));
    }

    #[test]
    fn training_produces_a_bundle_and_report() {
        let options = TrainingOptions {
            params: GradientParams { epochs: 300, ..GradientParams::default() },
            ..TrainingOptions::default()
        };
        let (bundle, report) =
            TrainingPipeline::new(options).train(&snapshot(), date(2024, 10, 1)).expect("train");

        assert_eq!(report.horizons.len(), 2);
        assert_eq!(report.horizons[0].horizon, Horizon::SevenDays);
        assert_eq!(report.horizons[0].train_rows + report.horizons[0].test_rows, 24);
        assert_eq!(report.schema_checksum, FeatureSchema::standard().checksum());
        assert!(report.quantity_train_rows > 0);
        assert!(bundle.classifier_7d.is_fitted());
        assert!(bundle.regressor.is_fitted());
    }

    #[test]
    fn training_without_history_is_an_empty_training_set() {
        let error = TrainingPipeline::default()
            .train(&snapshot(), date(2023, 1, 1))
            .expect_err("nothing before cutoff");
        assert!(matches!(error, ApplicationError::Model(ModelError::EmptyTrainingSet(_))));
    }

    #[test]
    fn training_without_positive_labels_is_rejected() {
        let error = TrainingPipeline::default()
            .train(&snapshot(), date(2025, 1, 1))
            .expect_err("no future purchases");
        assert!(matches!(error, ApplicationError::Model(ModelError::EmptyTrainingSet(_))));
    }

    #[test]
    fn recommender_ranks_candidates_with_the_adapter() {
        let recommender = Recommender::new(FixedAdapter);
        let set = recommender
            .recommend(&snapshot(), &CustomerId::new("C0"), date(2024, 11, 1), 2)
            .expect("recommend");

        assert_eq!(set.candidate_count, 3);
        assert_eq!(set.recommendations.len(), 2);
        assert_eq!(set.recommendations[0].product_id.as_str(), "P2");
        assert_eq!(set.recommendations[0].recommended_quantity, 2.0);
        assert!(set.ranked[0].score >= set.ranked[1].score);
    }

    #[test]
    fn recommender_returns_empty_set_for_unknown_customer() {
        let set = Recommender::new(FixedAdapter)
            .recommend(&snapshot(), &CustomerId::new("nobody"), date(2024, 11, 1), 5)
            .expect("recommend");

        assert_eq!(set.candidate_count, 0);
        assert!(set.recommendations.is_empty());
    }

    #[test]
    fn trained_bundle_drives_recommendations_end_to_end() {
        let options = TrainingOptions {
            params: GradientParams { epochs: 200, ..GradientParams::default() },
            ..TrainingOptions::default()
        };
        let (bundle, _) =
            TrainingPipeline::new(options).train(&snapshot(), date(2024, 10, 1)).expect("train");

        let set = Recommender::new(bundle)
            .recommend(&snapshot(), &CustomerId::new("C1"), date(2024, 11, 1), 5)
            .expect("recommend");
        assert_eq!(set.recommendations.len(), 3);
        for recommendation in &set.recommendations {
            assert!((0.0..=1.0).contains(&recommendation.purchase_probability_7d));
            assert!(recommendation.recommended_quantity >= 0.0);
        }
    }
}
