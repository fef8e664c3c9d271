//! Point-in-time feature construction.

pub mod aggregate;
pub mod engineer;
pub mod schema;

pub use aggregate::{CustomerAggregate, HistoryWindow, InteractionAggregate, ProductAggregate};
pub use engineer::{FeatureEngineer, FeatureVector};
pub use schema::{FeatureColumn, FeatureMatrix, FeatureSchema};
