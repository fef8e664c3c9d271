pub mod customer;
pub mod product;
pub mod transaction;

pub use customer::CustomerId;
pub use product::ProductId;
pub use transaction::{PairKey, TransactionRecord};
