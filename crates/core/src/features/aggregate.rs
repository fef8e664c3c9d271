//! Point-in-time reductions shared by training features and inference candidates.
//!
//! Every aggregate is computed from a [`HistoryWindow`], which only ever holds records with
//! `purchase_date <= cutoff`. Training and inference both go through these reducers so the
//! feature values they produce are identical for the same snapshot and cutoff.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{CustomerId, PairKey, ProductId, TransactionRecord};
use crate::snapshot::TransactionSnapshot;

/// The slice of history visible at a cutoff date.
#[derive(Clone, Debug)]
pub struct HistoryWindow<'a> {
    cutoff: NaiveDate,
    records: Vec<&'a TransactionRecord>,
}

impl<'a> HistoryWindow<'a> {
    pub fn new(snapshot: &'a TransactionSnapshot, cutoff: NaiveDate) -> Self {
        Self { cutoff, records: snapshot.history_until(cutoff).collect() }
    }

    pub fn cutoff(&self) -> NaiveDate {
        self.cutoff
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn by_customer(&self) -> BTreeMap<CustomerId, Vec<&'a TransactionRecord>> {
        group_by(self.records.iter().copied(), |record| record.customer_id.clone())
    }

    pub fn by_product(&self) -> BTreeMap<ProductId, Vec<&'a TransactionRecord>> {
        group_by(self.records.iter().copied(), |record| record.product_id.clone())
    }

    pub fn by_pair(&self) -> BTreeMap<PairKey, Vec<&'a TransactionRecord>> {
        group_by(self.records.iter().copied(), TransactionRecord::key)
    }

    pub fn for_customer(&self, customer_id: &CustomerId) -> Vec<&'a TransactionRecord> {
        self.records.iter().copied().filter(|record| &record.customer_id == customer_id).collect()
    }

    pub fn for_product(&self, product_id: &ProductId) -> Vec<&'a TransactionRecord> {
        self.records.iter().copied().filter(|record| &record.product_id == product_id).collect()
    }
}

/// Group records by an ordered key. Ordered maps keep every downstream output reproducible.
pub fn group_by<'a, K, F>(
    records: impl Iterator<Item = &'a TransactionRecord>,
    key: F,
) -> BTreeMap<K, Vec<&'a TransactionRecord>>
where
    K: Ord,
    F: Fn(&TransactionRecord) -> K,
{
    let mut groups: BTreeMap<K, Vec<&'a TransactionRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(key(record)).or_default().push(record);
    }
    groups
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerAggregate {
    pub customer_id: CustomerId,
    /// Sum of purchased quantity.
    pub total_purchases: u64,
    pub avg_quantity: f64,
    pub distinct_product_count: usize,
    pub last_purchase_date: NaiveDate,
    pub recency_days: i64,
}

impl CustomerAggregate {
    /// Returns `None` for an empty group.
    pub fn reduce(
        customer_id: CustomerId,
        records: &[&TransactionRecord],
        cutoff: NaiveDate,
    ) -> Option<Self> {
        let last_purchase_date = records.iter().map(|record| record.purchase_date).max()?;
        let total_purchases = total_quantity(records);
        let distinct_product_count =
            records.iter().map(|record| &record.product_id).collect::<BTreeSet<_>>().len();

        Some(Self {
            customer_id,
            total_purchases,
            avg_quantity: total_purchases as f64 / records.len() as f64,
            distinct_product_count,
            last_purchase_date,
            recency_days: (cutoff - last_purchase_date).num_days(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductAggregate {
    pub product_id: ProductId,
    pub total_sales: u64,
    pub avg_price: Decimal,
    /// Fraction of the product's transactions flagged as surplus, in `[0, 1]`.
    pub surplus_ratio: f64,
    /// Surplus state on the product's most recent purchase date. Not a model feature.
    pub latest_surplus_flag: bool,
}

impl ProductAggregate {
    pub fn reduce(product_id: ProductId, records: &[&TransactionRecord]) -> Option<Self> {
        let last_date = records.iter().map(|record| record.purchase_date).max()?;
        let count = records.len();
        let price_sum: Decimal = records.iter().map(|record| record.unit_price).sum();
        let surplus_count = records.iter().filter(|record| record.surplus_flag).count();
        // Same-day records are unordered; any surplus record on the last date counts.
        let latest_surplus_flag = records
            .iter()
            .filter(|record| record.purchase_date == last_date)
            .any(|record| record.surplus_flag);

        Some(Self {
            product_id,
            total_sales: total_quantity(records),
            avg_price: price_sum / Decimal::from(count as u64),
            surplus_ratio: surplus_count as f64 / count as f64,
            latest_surplus_flag,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionAggregate {
    pub key: PairKey,
    pub total_purchases: u64,
    pub avg_quantity: f64,
    pub purchase_count: usize,
    pub last_purchase_date: NaiveDate,
    pub recency_days: i64,
    pub days_since_first_purchase: i64,
    pub avg_inter_purchase_interval_days: f64,
    pub last_purchase_month: u32,
}

impl InteractionAggregate {
    pub fn reduce(key: PairKey, records: &[&TransactionRecord], cutoff: NaiveDate) -> Option<Self> {
        let mut dates: Vec<NaiveDate> = records.iter().map(|record| record.purchase_date).collect();
        dates.sort_unstable();
        let first = *dates.first()?;
        let last = *dates.last()?;

        let purchase_count = records.len();
        let total_purchases = total_quantity(records);
        let (days_since_first_purchase, avg_inter_purchase_interval_days) = if purchase_count > 1
        {
            ((last - first).num_days(), mean_gap_days(&dates))
        } else {
            (0, 0.0)
        };

        Some(Self {
            key,
            total_purchases,
            avg_quantity: total_purchases as f64 / purchase_count as f64,
            purchase_count,
            last_purchase_date: last,
            recency_days: (cutoff - last).num_days(),
            days_since_first_purchase,
            avg_inter_purchase_interval_days,
            last_purchase_month: last.month(),
        })
    }
}

fn total_quantity(records: &[&TransactionRecord]) -> u64 {
    records.iter().map(|record| u64::from(record.quantity)).sum()
}

/// Mean of successive differences between sorted dates; 0 for fewer than two dates.
fn mean_gap_days(sorted_dates: &[NaiveDate]) -> f64 {
    if sorted_dates.len() < 2 {
        return 0.0;
    }
    let gaps: i64 = sorted_dates.windows(2).map(|pair| (pair[1] - pair[0]).num_days()).sum();
    gaps as f64 / (sorted_dates.len() - 1) as f64
}
