//! Types for the score ranker

use serde::{Deserialize, Serialize};

use crate::domain::{CustomerId, ProductId};
use crate::errors::DomainError;
use crate::ml::HorizonPrediction;

/// Model outputs aligned by position with a candidate list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidatePredictions {
    pub prob_7d: Vec<f64>,
    pub prob_14d: Vec<f64>,
    pub qty_7d: Vec<f64>,
    pub qty_14d: Vec<f64>,
}

impl CandidatePredictions {
    pub fn from_horizons(seven: HorizonPrediction, fourteen: HorizonPrediction) -> Self {
        Self {
            prob_7d: seven.probabilities,
            prob_14d: fourteen.probabilities,
            qty_7d: seven.quantities,
            qty_14d: fourteen.quantities,
        }
    }

    /// Fails unless every column has exactly `expected` entries.
    pub fn check_len(&self, expected: usize) -> Result<(), DomainError> {
        for column in [&self.prob_7d, &self.prob_14d, &self.qty_7d, &self.qty_14d] {
            if column.len() != expected {
                return Err(DomainError::PredictionLengthMismatch {
                    expected,
                    actual: column.len(),
                });
            }
        }
        Ok(())
    }
}

/// One scored candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub score: f64,
    pub prob_7d: f64,
    pub prob_14d: f64,
    pub qty_7d: f64,
    pub qty_14d: f64,
    /// Surplus flag of the product's latest transaction before the prediction date.
    pub surplus_flag: bool,
}

impl RankedCandidate {
    pub fn recommended_quantity(&self) -> f64 {
        (self.qty_7d + self.qty_14d) / 2.0
    }
}

/// Customer-facing recommendation record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product_id: ProductId,
    pub purchase_probability_7d: f64,
    pub purchase_probability_14d: f64,
    pub recommended_quantity: f64,
    pub surplus_flag: bool,
}

impl From<&RankedCandidate> for Recommendation {
    fn from(ranked: &RankedCandidate) -> Self {
        Self {
            product_id: ranked.product_id.clone(),
            purchase_probability_7d: ranked.prob_7d,
            purchase_probability_14d: ranked.prob_14d,
            recommended_quantity: ranked.recommended_quantity(),
            surplus_flag: ranked.surplus_flag,
        }
    }
}
