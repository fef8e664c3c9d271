//! Numeric feature schema consumed by the estimators.
//!
//! Identifier and date columns are never model inputs. Every column carries an explicit
//! missing-value default; today all defaults are `0.0`, which treats a customer or product with
//! no joined history as having zero activity. That biases cold-start rows towards "no repeat
//! purchase" and is the intended policy.

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::engineer::FeatureVector;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureColumn {
    CpTotalPurchases,
    CpAvgQuantity,
    CpPurchaseCount,
    CpRecencyDays,
    CpDaysSinceFirst,
    CpAvgInterval,
    CpLastMonth,
    TotalPurchases,
    AvgQuantity,
    NumUniqueProducts,
    RecencyDays,
    ProductTotalSales,
    ProductAvgPrice,
    ProductSurplusRatio,
}

impl FeatureColumn {
    pub const ALL: [FeatureColumn; 14] = [
        FeatureColumn::CpTotalPurchases,
        FeatureColumn::CpAvgQuantity,
        FeatureColumn::CpPurchaseCount,
        FeatureColumn::CpRecencyDays,
        FeatureColumn::CpDaysSinceFirst,
        FeatureColumn::CpAvgInterval,
        FeatureColumn::CpLastMonth,
        FeatureColumn::TotalPurchases,
        FeatureColumn::AvgQuantity,
        FeatureColumn::NumUniqueProducts,
        FeatureColumn::RecencyDays,
        FeatureColumn::ProductTotalSales,
        FeatureColumn::ProductAvgPrice,
        FeatureColumn::ProductSurplusRatio,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::CpTotalPurchases => "cp_total_purchases",
            Self::CpAvgQuantity => "cp_avg_quantity",
            Self::CpPurchaseCount => "cp_purchase_count",
            Self::CpRecencyDays => "cp_recency_days",
            Self::CpDaysSinceFirst => "cp_days_since_first",
            Self::CpAvgInterval => "cp_avg_interval",
            Self::CpLastMonth => "cp_last_month",
            Self::TotalPurchases => "total_purchases",
            Self::AvgQuantity => "avg_quantity",
            Self::NumUniqueProducts => "num_unique_products",
            Self::RecencyDays => "recency_days",
            Self::ProductTotalSales => "product_total_sales",
            Self::ProductAvgPrice => "product_avg_price",
            Self::ProductSurplusRatio => "product_surplus_ratio",
        }
    }

    /// Value used when the join left this column without a source aggregate.
    pub fn missing_default(&self) -> f64 {
        0.0
    }

    /// Raw value, `None` when the owning aggregate is absent.
    pub fn extract(&self, vector: &FeatureVector) -> Option<f64> {
        let cp = &vector.interaction;
        match self {
            Self::CpTotalPurchases => Some(cp.total_purchases as f64),
            Self::CpAvgQuantity => Some(cp.avg_quantity),
            Self::CpPurchaseCount => Some(cp.purchase_count as f64),
            Self::CpRecencyDays => Some(cp.recency_days as f64),
            Self::CpDaysSinceFirst => Some(cp.days_since_first_purchase as f64),
            Self::CpAvgInterval => Some(cp.avg_inter_purchase_interval_days),
            Self::CpLastMonth => Some(f64::from(cp.last_purchase_month)),
            Self::TotalPurchases => vector.customer.as_ref().map(|c| c.total_purchases as f64),
            Self::AvgQuantity => vector.customer.as_ref().map(|c| c.avg_quantity),
            Self::NumUniqueProducts => {
                vector.customer.as_ref().map(|c| c.distinct_product_count as f64)
            }
            Self::RecencyDays => vector.customer.as_ref().map(|c| c.recency_days as f64),
            Self::ProductTotalSales => vector.product.as_ref().map(|p| p.total_sales as f64),
            Self::ProductAvgPrice => vector.product.as_ref().and_then(|p| p.avg_price.to_f64()),
            Self::ProductSurplusRatio => vector.product.as_ref().map(|p| p.surplus_ratio),
        }
    }

    pub fn value(&self, vector: &FeatureVector) -> f64 {
        self.extract(vector).filter(|value| value.is_finite()).unwrap_or(self.missing_default())
    }
}

/// Ordered set of columns plus a checksum identifying it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    columns: Vec<FeatureColumn>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::standard()
    }
}

impl FeatureSchema {
    pub fn standard() -> Self {
        Self { columns: FeatureColumn::ALL.to_vec() }
    }

    pub fn with_columns(columns: Vec<FeatureColumn>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(FeatureColumn::name).collect()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.column_names().join(",").as_bytes());
        format!("sha256:{:x}", hasher.finalize())
    }

    pub fn row(&self, vector: &FeatureVector) -> Vec<f64> {
        self.columns.iter().map(|column| column.value(vector)).collect()
    }

    pub fn matrix<'a>(
        &self,
        vectors: impl IntoIterator<Item = &'a FeatureVector>,
    ) -> FeatureMatrix {
        FeatureMatrix {
            schema_checksum: self.checksum(),
            width: self.width(),
            rows: vectors.into_iter().map(|vector| self.row(vector)).collect(),
        }
    }
}

/// Dense model input: label columns are never part of it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub schema_checksum: String,
    pub width: usize,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows at the given indices, same schema.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            schema_checksum: self.schema_checksum.clone(),
            width: self.width,
            rows: indices.iter().filter_map(|index| self.rows.get(*index).cloned()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::{CustomerId, PairKey, ProductId};
    use crate::features::aggregate::{CustomerAggregate, InteractionAggregate, ProductAggregate};

    fn vector(with_joins: bool) -> FeatureVector {
        let last = NaiveDate::from_ymd_opt(2024, 5, 2).expect("valid date");
        let interaction = InteractionAggregate {
            key: PairKey::new(CustomerId::new("C1"), ProductId::new("P1")),
            total_purchases: 6,
            avg_quantity: 2.0,
            purchase_count: 3,
            last_purchase_date: last,
            recency_days: 4,
            days_since_first_purchase: 19,
            avg_inter_purchase_interval_days: 9.5,
            last_purchase_month: 5,
        };
        let customer = CustomerAggregate {
            customer_id: CustomerId::new("C1"),
            total_purchases: 10,
            avg_quantity: 2.5,
            distinct_product_count: 2,
            last_purchase_date: last,
            recency_days: 4,
        };
        let product = ProductAggregate {
            product_id: ProductId::new("P1"),
            total_sales: 40,
            avg_price: Decimal::new(325, 2),
            surplus_ratio: 0.2,
            latest_surplus_flag: true,
        };
        if with_joins {
            FeatureVector { interaction, customer: Some(customer), product: Some(product) }
        } else {
            FeatureVector { interaction, customer: None, product: None }
        }
    }

    #[test]
    fn standard_schema_has_fourteen_named_columns() {
        let schema = FeatureSchema::standard();
        assert_eq!(schema.width(), 14);
        assert_eq!(schema.column_names()[0], "cp_total_purchases");
        assert_eq!(schema.column_names()[13], "product_surplus_ratio");
    }

    #[test]
    fn row_reads_every_column_in_order() {
        let row = FeatureSchema::standard().row(&vector(true));
        assert_eq!(
            row,
            vec![6.0, 2.0, 3.0, 4.0, 19.0, 9.5, 5.0, 10.0, 2.5, 2.0, 4.0, 40.0, 3.25, 0.2]
        );
    }

    #[test]
    fn missing_aggregates_fill_with_column_defaults() {
        let schema = FeatureSchema::standard();
        let row = schema.row(&vector(false));

        for (column, value) in schema.columns().iter().zip(row.iter()).skip(7) {
            assert_eq!(column.extract(&vector(false)), None);
            assert_eq!(*value, column.missing_default());
        }
        assert_eq!(&row[..7], &[6.0, 2.0, 3.0, 4.0, 19.0, 9.5, 5.0]);
    }

    #[test]
    fn checksum_depends_on_column_order() {
        let standard = FeatureSchema::standard();
        let mut reversed = FeatureColumn::ALL.to_vec();
        reversed.reverse();

        assert!(standard.checksum().starts_with("sha256:"));
        assert_eq!(standard.checksum(), FeatureSchema::standard().checksum());
        assert_ne!(standard.checksum(), FeatureSchema::with_columns(reversed).checksum());
    }

    #[test]
    fn matrix_select_keeps_schema() {
        let schema = FeatureSchema::standard();
        let vectors = [vector(true), vector(false)];
        let matrix = schema.matrix(vectors.iter());

        let selected = matrix.select(&[1]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected.schema_checksum, matrix.schema_checksum);
        assert_eq!(selected.rows[0][7], 0.0);
    }
}
