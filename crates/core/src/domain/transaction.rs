use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::customer::CustomerId;
use super::product::ProductId;

/// A single purchase line as recorded by the transaction store.
///
/// Records are never mutated after ingestion; every aggregate in the pipeline is a
/// reduction over a borrowed slice of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub purchase_date: NaiveDate,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub surplus_flag: bool,
}

impl TransactionRecord {
    pub fn new(
        customer_id: impl Into<String>,
        product_id: impl Into<String>,
        purchase_date: NaiveDate,
        quantity: u32,
        unit_price: Decimal,
        surplus_flag: bool,
    ) -> Self {
        Self {
            customer_id: CustomerId::new(customer_id),
            product_id: ProductId::new(product_id),
            purchase_date,
            quantity,
            unit_price,
            surplus_flag,
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.customer_id.clone(), self.product_id.clone())
    }

    pub fn is_on_or_before(&self, cutoff: NaiveDate) -> bool {
        self.purchase_date <= cutoff
    }

    /// True when the record falls in the half-open forward window `(cutoff, cutoff + window_days]`.
    pub fn is_within_window(&self, cutoff: NaiveDate, window_end: NaiveDate) -> bool {
        self.purchase_date > cutoff && self.purchase_date <= window_end
    }
}

/// Join key shared by interaction aggregates, feature vectors, and labels.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub customer_id: CustomerId,
    pub product_id: ProductId,
}

impl PairKey {
    pub fn new(customer_id: CustomerId, product_id: ProductId) -> Self {
        Self { customer_id, product_id }
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.customer_id, self.product_id)
    }
}
