//! Binary classification metric kernels.
//!
//! Every function here takes already-binarised truth (`true` = positive class) and
//! either hard predictions or the positive-class probability. Undefined quantities
//! are reported as `NaN` so the caller decides how to surface them; nothing here
//! logs or fails.

use std::cmp::Ordering;

/// Counts of the 2x2 confusion matrix with the positive class as reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfusionCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionCounts {
    pub fn from_labels(y_true: &[bool], y_pred: &[bool]) -> Self {
        let mut counts = Self::default();
        for (&truth, &pred) in y_true.iter().zip(y_pred) {
            match (truth, pred) {
                (true, true) => counts.true_positives += 1,
                (false, true) => counts.false_positives += 1,
                (false, false) => counts.true_negatives += 1,
                (true, false) => counts.false_negatives += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        (self.true_positives + self.true_negatives) as f64 / self.total() as f64
    }

    /// Zero predicted positives yields 0, not an error.
    pub fn precision(&self) -> f64 {
        ratio_or_zero(
            self.true_positives as f64,
            (self.true_positives + self.false_positives) as f64,
        )
    }

    /// Zero actual positives yields 0, not an error.
    pub fn recall(&self) -> f64 {
        ratio_or_zero(
            self.true_positives as f64,
            (self.true_positives + self.false_negatives) as f64,
        )
    }

    /// F-beta computed from counts: `(1+b²)tp / ((1+b²)tp + b²fn + fp)`.
    pub fn f_beta(&self, beta: f64) -> f64 {
        let beta_sq = beta * beta;
        let weighted_tp = (1.0 + beta_sq) * self.true_positives as f64;
        ratio_or_zero(
            weighted_tp,
            weighted_tp + beta_sq * self.false_negatives as f64 + self.false_positives as f64,
        )
    }

    /// Matthews correlation coefficient, 0 when any marginal is empty.
    pub fn mcc(&self) -> f64 {
        let tp = self.true_positives as f64;
        let fp = self.false_positives as f64;
        let tn = self.true_negatives as f64;
        let fn_count = self.false_negatives as f64;
        let denom_sq = (tp + fp) * (tp + fn_count) * (tn + fp) * (tn + fn_count);
        if denom_sq <= 0.0 {
            return 0.0;
        }
        (tp * tn - fp * fn_count) / denom_sq.sqrt()
    }
}

fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// `(score, is_positive)` pairs sorted by descending score, grouped into runs of equal
/// score. Each yielded item is the cumulative `(tp, fp)` after consuming one run.
fn cumulative_counts_by_threshold(y_true: &[bool], scores: &[f64]) -> Vec<(usize, usize)> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut points = Vec::new();
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < order.len() {
        let current = scores[order[i]];
        while i < order.len() && scores[order[i]].total_cmp(&current) == Ordering::Equal {
            if y_true[order[i]] {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        points.push((tp, fp));
    }
    points
}

/// Area under the ROC curve by the trapezoidal rule over distinct thresholds.
/// `NaN` when only one class is present in `y_true`.
pub fn roc_auc(y_true: &[bool], scores: &[f64]) -> f64 {
    let positives = y_true.iter().filter(|&&y| y).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return f64::NAN;
    }
    let (p, n) = (positives as f64, negatives as f64);

    let mut area = 0.0;
    let (mut prev_fpr, mut prev_tpr) = (0.0, 0.0);
    for (tp, fp) in cumulative_counts_by_threshold(y_true, scores) {
        let fpr = fp as f64 / n;
        let tpr = tp as f64 / p;
        area += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
        prev_fpr = fpr;
        prev_tpr = tpr;
    }
    area
}

/// Trapezoidal area under the precision-recall curve.
///
/// The curve is anchored at `(recall 0, precision 1)` and evaluated at every distinct
/// score. With no positives in `y_true` the recall is taken as 1 at every threshold.
pub fn pr_auc(y_true: &[bool], scores: &[f64]) -> f64 {
    let positives = y_true.iter().filter(|&&y| y).count();

    let mut area = 0.0;
    let (mut prev_recall, mut prev_precision) = (0.0, 1.0);
    for (tp, fp) in cumulative_counts_by_threshold(y_true, scores) {
        let precision = ratio_or_zero(tp as f64, (tp + fp) as f64);
        let recall = if positives == 0 {
            1.0
        } else {
            tp as f64 / positives as f64
        };
        area += (recall - prev_recall) * (precision + prev_precision) / 2.0;
        prev_recall = recall;
        prev_precision = precision;
    }
    area
}

/// Mean binary cross-entropy with probabilities clipped to `[eps, 1 - eps]`.
pub fn log_loss(y_true: &[bool], probabilities: &[f64]) -> f64 {
    let eps = f64::EPSILON;
    let total: f64 = y_true
        .iter()
        .zip(probabilities)
        .map(|(&y, &p)| {
            let p = p.clamp(eps, 1.0 - eps);
            if y { -p.ln() } else { -(1.0 - p).ln() }
        })
        .sum();
    total / y_true.len() as f64
}

/// Mean squared difference between the positive-class probability and the outcome.
pub fn brier_score(y_true: &[bool], probabilities: &[f64]) -> f64 {
    let total: f64 = y_true
        .iter()
        .zip(probabilities)
        .map(|(&y, &p)| {
            let outcome = if y { 1.0 } else { 0.0 };
            (p - outcome) * (p - outcome)
        })
        .sum();
    total / y_true.len() as f64
}

/// Rounds half-to-even at `decimals` places. `NaN` stays `NaN`.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round_ties_even() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn bools(values: &[u8]) -> Vec<bool> {
        values.iter().map(|&v| v == 1).collect()
    }

    #[test]
    fn confusion_counts_match_hand_tally() {
        let counts =
            ConfusionCounts::from_labels(&bools(&[1, 1, 0, 0, 1, 0]), &bools(&[1, 0, 0, 1, 1, 0]));
        assert_eq!(counts.true_positives, 2);
        assert_eq!(counts.false_positives, 1);
        assert_eq!(counts.true_negatives, 2);
        assert_eq!(counts.false_negatives, 1);
        assert_abs_diff_eq!(counts.accuracy(), 4.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(counts.precision(), 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(counts.recall(), 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(counts.f_beta(1.0), 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(counts.mcc(), 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn f2_weights_recall_over_precision() {
        // tp=1, fp=0, fn=3: precision 1, recall 0.25
        let counts = ConfusionCounts {
            true_positives: 1,
            false_positives: 0,
            true_negatives: 4,
            false_negatives: 3,
        };
        assert_abs_diff_eq!(counts.f_beta(2.0), 5.0 / 17.0, epsilon = 1e-12);
        assert!(counts.f_beta(2.0) < counts.f_beta(1.0));
    }

    #[test]
    fn zero_division_yields_zero() {
        let counts = ConfusionCounts::from_labels(&bools(&[1, 0, 0]), &bools(&[0, 0, 0]));
        assert_eq!(counts.precision(), 0.0);
        assert_eq!(counts.recall(), 0.0);
        assert_eq!(counts.f_beta(1.0), 0.0);
        assert_eq!(counts.mcc(), 0.0);
    }

    #[test]
    fn roc_auc_matches_reference_example() {
        let y = bools(&[0, 0, 1, 1]);
        assert_abs_diff_eq!(roc_auc(&y, &[0.1, 0.4, 0.35, 0.8]), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn roc_auc_counts_ties_as_half() {
        assert_abs_diff_eq!(roc_auc(&bools(&[0, 1]), &[0.5, 0.5]), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn roc_auc_is_nan_with_single_class() {
        assert!(roc_auc(&bools(&[1, 1, 1]), &[0.2, 0.4, 0.9]).is_nan());
    }

    #[test]
    fn pr_auc_matches_trapezoidal_reference() {
        let y = bools(&[0, 0, 1, 1]);
        let expected = 0.5 + 0.5 * (0.5 + 2.0 / 3.0) / 2.0;
        assert_abs_diff_eq!(pr_auc(&y, &[0.1, 0.4, 0.35, 0.8]), expected, epsilon = 1e-12);
    }

    #[test]
    fn pr_auc_is_one_for_perfect_ranking() {
        let y = bools(&[0, 1, 0, 1]);
        assert_abs_diff_eq!(pr_auc(&y, &[0.1, 0.9, 0.2, 0.8]), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn log_loss_and_brier_match_closed_form() {
        let y = bools(&[1, 0]);
        let p = [0.8, 0.4];
        let expected = (-(0.8f64).ln() - (0.6f64).ln()) / 2.0;
        assert_abs_diff_eq!(log_loss(&y, &p), expected, epsilon = 1e-12);
        assert_abs_diff_eq!(brier_score(&y, &p), (0.04 + 0.16) / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn log_loss_stays_finite_for_hard_probabilities() {
        let loss = log_loss(&bools(&[1, 0]), &[0.0, 1.0]);
        assert!(loss.is_finite());
        assert!(loss > 30.0);
    }

    #[test]
    fn round_to_uses_half_even() {
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.375, 2), 0.38);
        assert_eq!(round_to(0.123_449, 4), 0.1234);
        assert!(round_to(f64::NAN, 4).is_nan());
    }
}
