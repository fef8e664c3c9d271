//! Hold-out evaluation helpers.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Row indices of a shuffled train/test partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Deterministic shuffled split; the test side gets `ceil(n * test_fraction)` rows but never all
/// of them.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Split {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let fraction = test_fraction.clamp(0.0, 1.0);
    let test_len = ((n as f64) * fraction).ceil() as usize;
    let test_len = test_len.min(n.saturating_sub(1));
    let train = indices.split_off(test_len);
    Split { train, test: indices }
}

/// Area under the ROC curve via the rank-sum statistic, ties sharing their average rank.
///
/// `None` when either class is absent.
pub fn roc_auc(scores: &[f64], labels: &[bool]) -> Option<f64> {
    if scores.len() != labels.len() {
        return None;
    }
    let positives = labels.iter().filter(|label| **label).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        let average_rank = (start + end + 1) as f64 / 2.0;
        for index in &order[start..end] {
            ranks[*index] = average_rank;
        }
        start = end;
    }

    let positive_rank_sum: f64 =
        ranks.iter().zip(labels).filter(|(_, label)| **label).map(|(rank, _)| rank).sum();
    let p = positives as f64;
    let q = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * q))
}

/// Mean absolute error; `None` for empty or misaligned input.
pub fn mean_absolute_error(predictions: &[f64], actual: &[f64]) -> Option<f64> {
    if predictions.is_empty() || predictions.len() != actual.len() {
        return None;
    }
    let total: f64 = predictions.iter().zip(actual).map(|(p, a)| (p - a).abs()).sum();
    Some(total / predictions.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_deterministic_and_partitions_rows() {
        let first = train_test_split(10, 0.2, 42);
        let second = train_test_split(10, 0.2, 42);
        assert_eq!(first, second);
        assert_eq!(first.test.len(), 2);
        assert_eq!(first.train.len(), 8);

        let mut all: Vec<usize> = first.train.iter().chain(&first.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn split_never_empties_the_train_side() {
        let split = train_test_split(1, 0.2, 42);
        assert_eq!(split.train, vec![0]);
        assert!(split.test.is_empty());
        assert_eq!(train_test_split(0, 0.2, 42), Split { train: vec![], test: vec![] });
    }

    #[test]
    fn auc_handles_perfect_inverse_and_tied_scores() {
        let labels = [false, false, true, true];
        assert_eq!(roc_auc(&[0.1, 0.2, 0.8, 0.9], &labels), Some(1.0));
        assert_eq!(roc_auc(&[0.9, 0.8, 0.2, 0.1], &labels), Some(0.0));
        assert_eq!(roc_auc(&[0.5, 0.5, 0.5, 0.5], &labels), Some(0.5));
        assert_eq!(roc_auc(&[0.1, 0.4, 0.35, 0.8], &labels), Some(0.75));
    }

    #[test]
    fn auc_is_undefined_for_a_single_class() {
        assert_eq!(roc_auc(&[0.1, 0.9], &[true, true]), None);
        assert_eq!(roc_auc(&[], &[]), None);
    }

    #[test]
    fn mae_averages_absolute_errors() {
        assert_eq!(mean_absolute_error(&[1.0, 3.0], &[2.0, 1.0]), Some(1.5));
        assert_eq!(mean_absolute_error(&[], &[]), None);
    }
}
