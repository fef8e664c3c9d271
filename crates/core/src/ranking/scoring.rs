//! Fused score and ordering

use std::cmp::Ordering;

use super::types::{CandidatePredictions, RankedCandidate};
use crate::candidates::Candidate;
use crate::errors::DomainError;

/// Horizon blend used by the fused score. Fixed policy, not learned.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScoreWeights {
    prob_7d: f64,
    prob_14d: f64,
}

const DEFAULT_WEIGHTS: ScoreWeights = ScoreWeights { prob_7d: 0.6, prob_14d: 0.4 };

#[derive(Debug, Clone)]
pub struct ScoreRanker {
    weights: ScoreWeights,
}

impl Default for ScoreRanker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreRanker {
    pub fn new() -> Self {
        Self { weights: DEFAULT_WEIGHTS }
    }

    /// `(w7·prob_7d + w14·prob_14d) · mean(qty_7d, qty_14d) · (1 + surplus_ratio)`
    pub fn score(
        &self,
        prob_7d: f64,
        prob_14d: f64,
        qty_7d: f64,
        qty_14d: f64,
        surplus_ratio: f64,
    ) -> f64 {
        let probability = self.weights.prob_7d * prob_7d + self.weights.prob_14d * prob_14d;
        let score = probability * ((qty_7d + qty_14d) / 2.0) * (1.0 + surplus_ratio);
        // `total_cmp` orders -0.0 below 0.0; equal scores must tie.
        if score == 0.0 {
            0.0
        } else {
            score
        }
    }

    /// Score, order, and truncate. `predictions` is aligned with `candidates` by position.
    pub fn rank(
        &self,
        candidates: &[Candidate],
        predictions: &CandidatePredictions,
        top_n: usize,
    ) -> Result<Vec<RankedCandidate>, DomainError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        predictions.check_len(candidates.len())?;

        let mut ranked: Vec<RankedCandidate> = candidates
            .iter()
            .enumerate()
            .map(|(i, candidate)| {
                let (prob_7d, prob_14d) = (predictions.prob_7d[i], predictions.prob_14d[i]);
                let (qty_7d, qty_14d) = (predictions.qty_7d[i], predictions.qty_14d[i]);
                RankedCandidate {
                    customer_id: candidate.customer_id().clone(),
                    product_id: candidate.product_id().clone(),
                    score: self.score(
                        prob_7d,
                        prob_14d,
                        qty_7d,
                        qty_14d,
                        candidate.surplus_ratio(),
                    ),
                    prob_7d,
                    prob_14d,
                    qty_7d,
                    qty_14d,
                    surplus_flag: candidate.latest_surplus_flag(),
                }
            })
            .collect();

        ranked.sort_by(compare_ranked);
        ranked.truncate(top_n);
        Ok(ranked)
    }
}

/// Score descending, then product id, then customer id.
fn compare_ranked(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.product_id.cmp(&b.product_id))
        .then_with(|| a.customer_id.cmp(&b.customer_id))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::{CustomerId, PairKey, ProductId};
    use crate::features::aggregate::{InteractionAggregate, ProductAggregate};
    use crate::features::FeatureVector;

    fn candidate(product: &str, surplus_ratio: f64) -> Candidate {
        let last = NaiveDate::from_ymd_opt(2024, 10, 1).expect("valid date");
        FeatureVector {
            interaction: InteractionAggregate {
                key: PairKey::new(CustomerId::new("C1"), ProductId::new(product)),
                total_purchases: 1,
                avg_quantity: 1.0,
                purchase_count: 1,
                last_purchase_date: last,
                recency_days: 0,
                days_since_first_purchase: 0,
                avg_inter_purchase_interval_days: 0.0,
                last_purchase_month: 10,
            },
            customer: None,
            product: Some(ProductAggregate {
                product_id: ProductId::new(product),
                total_sales: 1,
                avg_price: Decimal::ONE,
                surplus_ratio,
                latest_surplus_flag: surplus_ratio > 0.0,
            }),
        }
    }

    fn uniform(n: usize, prob: f64, qty: f64) -> CandidatePredictions {
        CandidatePredictions {
            prob_7d: vec![prob; n],
            prob_14d: vec![prob; n],
            qty_7d: vec![qty; n],
            qty_14d: vec![qty; n],
        }
    }

    #[test]
    fn fused_score_matches_worked_example() {
        let score = ScoreRanker::new().score(0.8, 0.5, 3.0, 2.0, 0.2);
        assert!((score - 2.04).abs() < 1e-9);
    }

    #[test]
    fn ranks_worked_example_candidate() {
        let predictions = CandidatePredictions {
            prob_7d: vec![0.8],
            prob_14d: vec![0.5],
            qty_7d: vec![3.0],
            qty_14d: vec![2.0],
        };
        let ranked =
            ScoreRanker::new().rank(&[candidate("P1", 0.2)], &predictions, 5).expect("rank");

        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].score - 2.04).abs() < 1e-9);
        assert_eq!(ranked[0].recommended_quantity(), 2.5);
        assert!(ranked[0].surplus_flag);
    }

    #[test]
    fn twelve_candidates_truncate_to_top_five_in_descending_order() {
        let candidates: Vec<Candidate> =
            (0..12).map(|i| candidate(&format!("P{i:02}"), 0.0)).collect();
        let mut predictions = uniform(12, 0.5, 1.0);
        predictions.prob_7d = (0..12).map(|i| f64::from(i) / 12.0).collect();

        let ranked = ScoreRanker::new().rank(&candidates, &predictions, 5).expect("rank");

        assert_eq!(ranked.len(), 5);
        assert!(ranked.windows(2).all(|pair| pair[0].score >= pair[1].score));
        assert_eq!(ranked[0].product_id.as_str(), "P11");
    }

    #[test]
    fn equal_scores_break_ties_by_product_id() {
        let candidates = vec![candidate("P3", 0.0), candidate("P1", 0.0), candidate("P2", 0.0)];
        let ranked =
            ScoreRanker::new().rank(&candidates, &uniform(3, 0.5, 2.0), 10).expect("rank");

        let order: Vec<&str> = ranked.iter().map(|r| r.product_id.as_str()).collect();
        assert_eq!(order, vec!["P1", "P2", "P3"]);
    }

    #[test]
    fn negative_zero_scores_tie_with_zero_and_fall_back_to_product_id() {
        let candidates = vec![candidate("P1", 0.0), candidate("P2", 0.0)];
        let predictions = CandidatePredictions {
            prob_7d: vec![0.5, 0.0],
            prob_14d: vec![0.5, 0.0],
            qty_7d: vec![-0.0, 1.0],
            qty_14d: vec![-0.0, 1.0],
        };

        let ranked = ScoreRanker::new().rank(&candidates, &predictions, 5).expect("rank");

        let order: Vec<&str> = ranked.iter().map(|r| r.product_id.as_str()).collect();
        assert_eq!(order, vec!["P1", "P2"]);
        assert!(ranked.iter().all(|r| r.score == 0.0 && r.score.is_sign_positive()));
    }

    #[test]
    fn empty_candidates_rank_to_empty_for_any_top_n() {
        let ranker = ScoreRanker::new();
        for top_n in [0, 1, 5, 100] {
            let ranked = ranker.rank(&[], &CandidatePredictions::default(), top_n).expect("rank");
            assert!(ranked.is_empty());
        }
    }

    #[test]
    fn misaligned_predictions_are_rejected() {
        let candidates = vec![candidate("P1", 0.0), candidate("P2", 0.0)];
        let mut predictions = uniform(2, 0.5, 1.0);
        predictions.qty_14d.pop();

        let error = ScoreRanker::new().rank(&candidates, &predictions, 5).expect_err("mismatch");
        assert_eq!(error, DomainError::PredictionLengthMismatch { expected: 2, actual: 1 });
    }

    proptest! {
        #[test]
        fn ranking_is_a_total_order(
            rows in prop::collection::vec(
                (0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..10.0, 0.0f64..=1.0),
                0..30,
            ),
            top_n in 0usize..40,
        ) {
            let candidates: Vec<Candidate> = rows
                .iter()
                .enumerate()
                .map(|(i, (_, _, _, surplus))| candidate(&format!("P{i:03}"), *surplus))
                .collect();
            let predictions = CandidatePredictions {
                prob_7d: rows.iter().map(|row| row.0).collect(),
                prob_14d: rows.iter().map(|row| row.1).collect(),
                qty_7d: rows.iter().map(|row| row.2).collect(),
                qty_14d: rows.iter().map(|row| row.2).collect(),
            };

            let ranked = ScoreRanker::new().rank(&candidates, &predictions, top_n).expect("rank");

            prop_assert_eq!(ranked.len(), rows.len().min(top_n));
            for pair in ranked.windows(2) {
                prop_assert!(
                    pair[0].score > pair[1].score
                        || (pair[0].score == pair[1].score
                            && pair[0].product_id < pair[1].product_id)
                );
            }
        }
    }
}
