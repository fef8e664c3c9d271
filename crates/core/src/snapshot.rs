//! Transaction snapshot ingestion.
//!
//! Parses transaction CSV exports into an immutable [`TransactionSnapshot`]. Expected columns:
//!   customer_id, product_id, purchase_date, quantity, price, surplus_flag
//! Any other column (`product_category`, `month`, ...) is ignored.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{CustomerId, ProductId, TransactionRecord};
use crate::errors::SchemaError;

/// Largest accepted unit price. Keeps per-product price sums far from `Decimal` overflow.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Read-only view over the transaction history for one pipeline run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactionSnapshot {
    records: Vec<TransactionRecord>,
}

impl TransactionSnapshot {
    /// Validate and freeze a set of records.
    pub fn from_records(records: Vec<TransactionRecord>) -> Result<Self, SchemaError> {
        for (index, record) in records.iter().enumerate() {
            let line = index + 1;
            if record.customer_id.as_str().trim().is_empty() {
                return Err(SchemaError::MissingField { line, field: "customer_id" });
            }
            if record.product_id.as_str().trim().is_empty() {
                return Err(SchemaError::MissingField { line, field: "product_id" });
            }
            if record.unit_price.is_sign_negative() && !record.unit_price.is_zero() {
                return Err(SchemaError::NegativePrice {
                    line,
                    value: record.unit_price.to_string(),
                });
            }
            if record.unit_price > MAX_UNIT_PRICE {
                return Err(price_out_of_range(line, record.unit_price.to_string()));
            }
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records with `purchase_date <= cutoff`.
    pub fn history_until(&self, cutoff: NaiveDate) -> impl Iterator<Item = &TransactionRecord> {
        self.records.iter().filter(move |record| record.is_on_or_before(cutoff))
    }

    /// Records with `cutoff < purchase_date <= window_end`.
    pub fn window_after(
        &self,
        cutoff: NaiveDate,
        window_end: NaiveDate,
    ) -> impl Iterator<Item = &TransactionRecord> {
        self.records.iter().filter(move |record| record.is_within_window(cutoff, window_end))
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.records.iter().map(|record| record.purchase_date).min()?;
        let last = self.records.iter().map(|record| record.purchase_date).max()?;
        Some((first, last))
    }
}

#[derive(Debug, Deserialize)]
struct RawTransactionRow {
    customer_id: Option<String>,
    product_id: Option<String>,
    purchase_date: Option<String>,
    quantity: Option<String>,
    price: Option<String>,
    surplus_flag: Option<String>,
}

/// Load a snapshot from any CSV reader.
pub fn load_csv<R: Read>(reader: R) -> Result<TransactionSnapshot, SchemaError> {
    let mut csv_reader =
        csv::ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(reader);

    let mut records = Vec::new();
    for (index, result) in csv_reader.deserialize::<RawTransactionRow>().enumerate() {
        let line = index + 1;
        let row =
            result.map_err(|error| SchemaError::Read(format!("line {line}: {error}")))?;
        records.push(parse_row(line, row)?);
    }

    let snapshot = TransactionSnapshot::from_records(records)?;
    tracing::info!(
        event_name = "snapshot.loaded",
        records = snapshot.len(),
        first_date = ?snapshot.date_range().map(|(first, _)| first),
        last_date = ?snapshot.date_range().map(|(_, last)| last),
        "transaction snapshot loaded"
    );
    Ok(snapshot)
}

/// Load a snapshot from a CSV file path.
pub fn load_csv_path(path: &Path) -> Result<TransactionSnapshot, SchemaError> {
    let file = File::open(path).map_err(|error| {
        SchemaError::Read(format!("failed to open `{}`: {error}", path.display()))
    })?;
    load_csv(file)
}

fn parse_row(line: usize, row: RawTransactionRow) -> Result<TransactionRecord, SchemaError> {
    let customer_id = required(line, "customer_id", row.customer_id)?;
    let product_id = required(line, "product_id", row.product_id)?;
    let purchase_date = parse_date(line, &required(line, "purchase_date", row.purchase_date)?)?;
    let quantity = parse_quantity(line, &required(line, "quantity", row.quantity)?)?;
    let unit_price = parse_price(line, &required(line, "price", row.price)?)?;
    let surplus_flag = parse_flag(line, &required(line, "surplus_flag", row.surplus_flag)?)?;

    Ok(TransactionRecord {
        customer_id: CustomerId::new(customer_id),
        product_id: ProductId::new(product_id),
        purchase_date,
        quantity,
        unit_price,
        surplus_flag,
    })
}

fn required(
    line: usize,
    field: &'static str,
    value: Option<String>,
) -> Result<String, SchemaError> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or(SchemaError::MissingField { line, field })
}

fn parse_date(line: usize, value: &str) -> Result<NaiveDate, SchemaError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .map_err(|_| SchemaError::InvalidValue {
            line,
            field: "purchase_date",
            value: value.to_owned(),
        })
}

fn parse_quantity(line: usize, value: &str) -> Result<u32, SchemaError> {
    let parsed = value.parse::<i64>().map_err(|_| SchemaError::InvalidValue {
        line,
        field: "quantity",
        value: value.to_owned(),
    })?;
    if parsed < 0 {
        return Err(SchemaError::NegativeQuantity { line, value: value.to_owned() });
    }
    u32::try_from(parsed).map_err(|_| SchemaError::InvalidValue {
        line,
        field: "quantity",
        value: value.to_owned(),
    })
}

fn parse_price(line: usize, value: &str) -> Result<Decimal, SchemaError> {
    let parsed = Decimal::from_str(value).or_else(|_| Decimal::from_scientific(value)).map_err(
        |_| SchemaError::InvalidValue { line, field: "price", value: value.to_owned() },
    )?;
    if parsed.is_sign_negative() && !parsed.is_zero() {
        return Err(SchemaError::NegativePrice { line, value: value.to_owned() });
    }
    if parsed > MAX_UNIT_PRICE {
        return Err(price_out_of_range(line, value.to_owned()));
    }
    Ok(parsed)
}

fn price_out_of_range(line: usize, value: String) -> SchemaError {
    SchemaError::PriceOutOfRange { line, value, max: MAX_UNIT_PRICE }
}

fn parse_flag(line: usize, value: &str) -> Result<bool, SchemaError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(SchemaError::InvalidValue {
            line,
            field: "surplus_flag",
            value: value.to_owned(),
        }),
    }
}
