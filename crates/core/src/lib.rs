pub mod candidates;
pub mod config;
pub mod domain;
pub mod errors;
pub mod features;
pub mod labels;
pub mod ml;
pub mod pipeline;
pub mod ranking;
pub mod snapshot;

pub use candidates::{Candidate, CandidateGenerator};
pub use domain::{CustomerId, PairKey, ProductId, TransactionRecord};
pub use errors::{ApplicationError, DomainError, ModelError, SchemaError};
pub use features::{
    CustomerAggregate, FeatureColumn, FeatureEngineer, FeatureMatrix, FeatureSchema,
    FeatureVector, InteractionAggregate, ProductAggregate,
};
pub use labels::{Label, LabelBuilder, TrainingExample};
pub use ml::{
    Horizon, HorizonPrediction, ModelAdapter, ModelBundle, ProbabilityModel, QuantityModel,
};
pub use pipeline::{
    build_candidates, build_training_set, rank, RecommendationSet, Recommender,
    TrainingOptions, TrainingPipeline, TrainingReport,
};
pub use ranking::{CandidatePredictions, RankedCandidate, Recommendation, ScoreRanker};
pub use snapshot::{load_csv, load_csv_path, TransactionSnapshot};
