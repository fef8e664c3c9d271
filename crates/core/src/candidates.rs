use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::{CustomerId, PairKey};
use crate::features::aggregate::{
    CustomerAggregate, HistoryWindow, InteractionAggregate, ProductAggregate,
};
use crate::features::engineer::join_aggregates;
use crate::features::FeatureVector;
use crate::snapshot::TransactionSnapshot;

/// Inference-time feature vector for one (customer, product) pair. Never carries a label.
pub type Candidate = FeatureVector;

/// Builds the candidate set for a single customer at a prediction date.
///
/// Only products the customer already bought at or before the date are candidates. Product
/// aggregates still span every customer's history, so each candidate matches the vector
/// [`FeatureEngineer`](crate::features::FeatureEngineer) would produce for the same pair.
#[derive(Clone, Copy, Debug, Default)]
pub struct CandidateGenerator;

impl CandidateGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Candidates ordered by product id; empty when the customer has no history.
    pub fn build(
        &self,
        snapshot: &TransactionSnapshot,
        customer_id: &CustomerId,
        prediction_date: NaiveDate,
    ) -> Vec<Candidate> {
        let window = HistoryWindow::new(snapshot, prediction_date);
        let customer_records = window.for_customer(customer_id);

        let Some(customer) =
            CustomerAggregate::reduce(customer_id.clone(), &customer_records, prediction_date)
        else {
            tracing::info!(
                event_name = "pipeline.candidates.no_history",
                customer_id = %customer_id,
                prediction_date = %prediction_date,
                "customer has no purchase history before the prediction date"
            );
            return Vec::new();
        };

        let mut by_product: BTreeMap<_, Vec<_>> = BTreeMap::new();
        for record in customer_records {
            by_product.entry(record.product_id.clone()).or_default().push(record);
        }

        let products: BTreeMap<_, _> = by_product
            .keys()
            .filter_map(|product_id| {
                let records = window.for_product(product_id);
                ProductAggregate::reduce(product_id.clone(), &records)
                    .map(|aggregate| (product_id.clone(), aggregate))
            })
            .collect();
        let customers = BTreeMap::from([(customer_id.clone(), customer)]);

        let interactions = by_product.into_iter().filter_map(|(product_id, records)| {
            let key = PairKey::new(customer_id.clone(), product_id);
            InteractionAggregate::reduce(key, &records, prediction_date)
        });
        let candidates = join_aggregates(interactions, &customers, &products);

        tracing::info!(
            event_name = "pipeline.candidates.built",
            customer_id = %customer_id,
            prediction_date = %prediction_date,
            candidates = candidates.len(),
            "candidate set built"
        );
        candidates
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::TransactionRecord;
    use crate::features::FeatureEngineer;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn snapshot() -> TransactionSnapshot {
        let cheap = Decimal::new(150, 2);
        let dear = Decimal::new(420, 2);
        TransactionSnapshot::from_records(vec![
            TransactionRecord::new("C1", "P3", date(2024, 3, 1), 2, cheap, false),
            TransactionRecord::new("C1", "P1", date(2024, 3, 2), 1, dear, true),
            TransactionRecord::new("C1", "P1", date(2024, 3, 9), 4, dear, false),
            TransactionRecord::new("C2", "P1", date(2024, 3, 5), 6, dear, true),
            TransactionRecord::new("C2", "P2", date(2024, 3, 6), 1, cheap, false),
            TransactionRecord::new("C1", "P2", date(2024, 3, 20), 3, cheap, false),
        ])
        .expect("valid records")
    }

    #[test]
    fn candidates_are_previously_purchased_products_in_id_order() {
        let candidates =
            CandidateGenerator::new().build(&snapshot(), &CustomerId::new("C1"), date(2024, 3, 10));

        let products: Vec<&str> =
            candidates.iter().map(|candidate| candidate.product_id().as_str()).collect();
        assert_eq!(products, vec!["P1", "P3"]);
    }

    #[test]
    fn matches_feature_engineer_for_the_same_pairs() {
        let cutoff = date(2024, 3, 10);
        let customer = CustomerId::new("C1");
        let candidates = CandidateGenerator::new().build(&snapshot(), &customer, cutoff);
        let features: Vec<FeatureVector> = FeatureEngineer::new()
            .build(&snapshot(), cutoff)
            .into_iter()
            .filter(|vector| vector.customer_id() == &customer)
            .collect();

        assert_eq!(candidates, features);
    }

    #[test]
    fn product_aggregates_span_all_customers() {
        let candidates =
            CandidateGenerator::new().build(&snapshot(), &CustomerId::new("C1"), date(2024, 3, 10));
        let p1 = candidates[0].product.as_ref().expect("product joined");

        assert_eq!(p1.total_sales, 11);
        assert!((p1.surplus_ratio - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn customer_without_history_has_no_candidates() {
        let generator = CandidateGenerator::new();
        assert!(generator.build(&snapshot(), &CustomerId::new("C9"), date(2024, 3, 10)).is_empty());
        assert!(generator.build(&snapshot(), &CustomerId::new("C1"), date(2024, 2, 28)).is_empty());
    }
}
