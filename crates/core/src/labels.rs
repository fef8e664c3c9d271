//! Forward-window labels for training.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::{PairKey, TransactionRecord};
use crate::errors::DomainError;
use crate::features::aggregate::group_by;
use crate::features::FeatureVector;
use crate::snapshot::TransactionSnapshot;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub future_quantity: u64,
    pub future_purchase_count: usize,
    /// Count-based: a logged zero-quantity record still counts as a purchase.
    pub will_buy: bool,
}

impl Label {
    pub fn from_records(records: &[&TransactionRecord]) -> Self {
        let future_quantity = records.iter().map(|record| u64::from(record.quantity)).sum();
        let future_purchase_count = records.len();
        Self { future_quantity, future_purchase_count, will_buy: future_purchase_count > 0 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub features: FeatureVector,
    pub label: Label,
    pub cutoff: NaiveDate,
    pub window_days: u32,
}

/// Labels for every pair with activity inside `(cutoff, cutoff + window_days]`.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelTable {
    pub cutoff: NaiveDate,
    pub window_days: u32,
    labels: BTreeMap<PairKey, Label>,
}

impl LabelTable {
    pub fn new(cutoff: NaiveDate, window_days: u32, labels: BTreeMap<PairKey, Label>) -> Self {
        Self { cutoff, window_days, labels }
    }

    pub fn get(&self, key: &PairKey) -> Option<&Label> {
        self.labels.get(key)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PairKey> {
        self.labels.keys()
    }

    /// Drop labels for pairs outside `keys`; returns how many were dropped.
    pub fn retain_keys(&mut self, keys: &BTreeSet<&PairKey>) -> usize {
        let before = self.labels.len();
        self.labels.retain(|key, _| keys.contains(key));
        before - self.labels.len()
    }
}

pub fn validate_window(window_days: u32) -> Result<(), DomainError> {
    if window_days == 0 {
        return Err(DomainError::InvalidWindow { window_days: 0 });
    }
    Ok(())
}

pub fn window_end(cutoff: NaiveDate, window_days: u32) -> Result<NaiveDate, DomainError> {
    validate_window(window_days)?;
    cutoff.checked_add_days(Days::new(u64::from(window_days))).ok_or_else(|| {
        DomainError::InvariantViolation(format!(
            "window of {window_days} days after {cutoff} is outside the calendar range"
        ))
    })
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LabelBuilder;

impl LabelBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate the forward window without looking at the feature set.
    pub fn future_labels(
        &self,
        snapshot: &TransactionSnapshot,
        cutoff: NaiveDate,
        window_days: u32,
    ) -> Result<LabelTable, DomainError> {
        let end = window_end(cutoff, window_days)?;
        let labels = group_by(snapshot.window_after(cutoff, end), TransactionRecord::key)
            .into_iter()
            .map(|(key, records)| (key, Label::from_records(&records)))
            .collect();
        Ok(LabelTable::new(cutoff, window_days, labels))
    }

    /// Strict left join of `table` onto `features`.
    ///
    /// Unmatched feature vectors get an all-zero label. A label whose key has no feature vector,
    /// or a feature key that appears twice, fails the whole batch.
    pub fn join(
        &self,
        features: Vec<FeatureVector>,
        table: &LabelTable,
    ) -> Result<Vec<TrainingExample>, DomainError> {
        let mut seen = BTreeSet::new();
        for vector in &features {
            if !seen.insert(vector.key()) {
                return Err(DomainError::DuplicateFeatureKey(vector.key().clone()));
            }
        }
        if let Some(orphan) = table.keys().find(|key| !seen.contains(key)) {
            return Err(DomainError::JoinMismatch(orphan.clone()));
        }

        Ok(features
            .into_iter()
            .map(|features| {
                let label = table.get(features.key()).copied().unwrap_or_default();
                TrainingExample {
                    features,
                    label,
                    cutoff: table.cutoff,
                    window_days: table.window_days,
                }
            })
            .collect())
    }

    /// Label a feature set built at `cutoff`.
    ///
    /// Future activity on pairs with no history at the cutoff has no feature vector to attach
    /// to; those cold-start labels are counted and dropped before the strict join.
    pub fn build(
        &self,
        snapshot: &TransactionSnapshot,
        features: Vec<FeatureVector>,
        cutoff: NaiveDate,
        window_days: u32,
    ) -> Result<Vec<TrainingExample>, DomainError> {
        let mut table = self.future_labels(snapshot, cutoff, window_days)?;
        let cold_start = {
            let keys: BTreeSet<&PairKey> = features.iter().map(FeatureVector::key).collect();
            table.retain_keys(&keys)
        };

        let examples = self.join(features, &table)?;
        let positives = examples.iter().filter(|example| example.label.will_buy).count();

        if cold_start > 0 {
            tracing::warn!(
                event_name = "pipeline.labels.cold_start_dropped",
                cutoff = %cutoff,
                window_days,
                dropped = cold_start,
                "future purchases without history excluded from labels"
            );
        }
        tracing::info!(
            event_name = "pipeline.labels.joined",
            cutoff = %cutoff,
            window_days,
            examples = examples.len(),
            positives,
            "labels joined onto feature vectors"
        );

        Ok(examples)
    }
}
