use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::aggregate::{CustomerAggregate, HistoryWindow, InteractionAggregate, ProductAggregate};
use crate::domain::{CustomerId, PairKey, ProductId};
use crate::snapshot::TransactionSnapshot;

/// Interaction aggregate left-joined with its customer and product aggregates.
///
/// A `None` side means the join found no match; numeric consumers go through
/// [`FeatureColumn::missing_default`](super::schema::FeatureColumn::missing_default) instead of
/// reading these fields directly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub interaction: InteractionAggregate,
    pub customer: Option<CustomerAggregate>,
    pub product: Option<ProductAggregate>,
}

impl FeatureVector {
    pub fn key(&self) -> &PairKey {
        &self.interaction.key
    }

    pub fn customer_id(&self) -> &CustomerId {
        &self.interaction.key.customer_id
    }

    pub fn product_id(&self) -> &ProductId {
        &self.interaction.key.product_id
    }

    pub fn surplus_ratio(&self) -> f64 {
        self.product.as_ref().map(|product| product.surplus_ratio).unwrap_or(0.0)
    }

    pub fn latest_surplus_flag(&self) -> bool {
        self.product.as_ref().map(|product| product.latest_surplus_flag).unwrap_or(false)
    }
}

/// Builds one [`FeatureVector`] per (customer, product) pair observed at or before a cutoff.
#[derive(Clone, Copy, Debug, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Output is sorted by customer id, then product id.
    pub fn build(&self, snapshot: &TransactionSnapshot, cutoff: NaiveDate) -> Vec<FeatureVector> {
        let window = HistoryWindow::new(snapshot, cutoff);

        let customers: BTreeMap<CustomerId, CustomerAggregate> = window
            .by_customer()
            .into_iter()
            .filter_map(|(id, records)| {
                CustomerAggregate::reduce(id.clone(), &records, cutoff).map(|agg| (id, agg))
            })
            .collect();
        let products: BTreeMap<ProductId, ProductAggregate> = window
            .by_product()
            .into_iter()
            .filter_map(|(id, records)| {
                ProductAggregate::reduce(id.clone(), &records).map(|agg| (id, agg))
            })
            .collect();
        let interactions = window
            .by_pair()
            .into_iter()
            .filter_map(|(key, records)| InteractionAggregate::reduce(key, &records, cutoff));

        let features = join_aggregates(interactions, &customers, &products);

        tracing::info!(
            event_name = "pipeline.features.built",
            cutoff = %cutoff,
            history_records = window.len(),
            customers = customers.len(),
            products = products.len(),
            feature_vectors = features.len(),
            "feature vectors built"
        );

        features
    }
}

/// Left join of interactions onto customer and product aggregates.
pub(crate) fn join_aggregates(
    interactions: impl Iterator<Item = InteractionAggregate>,
    customers: &BTreeMap<CustomerId, CustomerAggregate>,
    products: &BTreeMap<ProductId, ProductAggregate>,
) -> Vec<FeatureVector> {
    interactions
        .map(|interaction| {
            let customer = customers.get(&interaction.key.customer_id).cloned();
            let product = products.get(&interaction.key.product_id).cloned();
            FeatureVector { interaction, customer, product }
        })
        .collect()
}
