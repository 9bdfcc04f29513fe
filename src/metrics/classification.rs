//! Binary classification metrics.
//!
//! Precision, recall and F1 refer to the positive class and are 0 when their
//! denominator is 0.

use serde::Serialize;

/// Confusion matrix for binary classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut cm = Self {
            tp: 0,
            tn: 0,
            fp: 0,
            fn_: 0,
        };
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == 1, p == 1) {
                (true, true) => cm.tp += 1,
                (false, false) => cm.tn += 1,
                (false, true) => cm.fp += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationMetrics {
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// `None` when the labels contain a single class.
    pub roc_auc: Option<f64>,
}

impl ClassificationMetrics {
    /// Evaluate probabilities against labels, predicting positive at `proba >= threshold`.
    pub fn evaluate(y_true: &[u8], proba: &[f64], threshold: f64) -> Self {
        let y_pred: Vec<u8> = proba.iter().map(|&p| u8::from(p >= threshold)).collect();
        let confusion = ConfusionMatrix::from_predictions(y_true, &y_pred);

        let accuracy = ratio(confusion.tp + confusion.tn, confusion.total());
        let precision = ratio(confusion.tp, confusion.tp + confusion.fp);
        let recall = ratio(confusion.tp, confusion.tp + confusion.fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            confusion,
            accuracy,
            precision,
            recall,
            f1,
            roc_auc: roc_auc(y_true, proba),
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// ROC AUC via the Mann-Whitney U statistic with average ranks for ties.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> Option<f64> {
    let n_pos = y_true.iter().filter(|&&y| y == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 || scores.len() != y_true.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based; tied block i..=j shares the average rank
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if y_true[idx] == 1 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let (p, q) = (n_pos as f64, n_neg as f64);
    Some((rank_sum_pos - p * (p + 1.0) / 2.0) / (p * q))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confusion_and_rates() {
        let y = [1, 1, 0, 0, 1, 0];
        let p = [0.9, 0.4, 0.6, 0.1, 0.8, 0.2];
        let m = ClassificationMetrics::evaluate(&y, &p, 0.5);
        assert_eq!(m.confusion, ConfusionMatrix { tp: 2, tn: 2, fp: 1, fn_: 1 });
        assert!((m.accuracy - 4.0 / 6.0).abs() < 1e-12);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn no_positive_predictions_gives_zero_precision() {
        let m = ClassificationMetrics::evaluate(&[1, 0], &[0.1, 0.2], 0.5);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
    }

    #[test]
    fn auc_perfect_and_inverted() {
        let y = [0, 0, 1, 1];
        assert_eq!(roc_auc(&y, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&y, &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
    }

    #[test]
    fn auc_counts_ties_as_half() {
        // one positive tied with one negative, the other pair ordered correctly
        let y = [0, 1, 0, 1];
        let s = [0.5, 0.5, 0.1, 0.9];
        // pairs (pos, neg): (0.5,0.5)=0.5, (0.5,0.1)=1, (0.9,0.5)=1, (0.9,0.1)=1 -> 3.5/4
        assert_eq!(roc_auc(&y, &s), Some(0.875));
    }

    #[test]
    fn auc_undefined_for_single_class() {
        assert_eq!(roc_auc(&[1, 1], &[0.2, 0.3]), None);
    }
}
