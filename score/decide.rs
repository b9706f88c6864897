use crate::types::{DatasetSchema, PredictionSet};

/// Header of the optional per-row threshold column in a prediction file.
pub const DECISION_THRESHOLD_COLUMN: &str = "decision_threshold";

/// How probabilities are turned into class labels for one prediction set.
///
/// The variant is chosen once when the prediction set is opened and then applied to
/// every row; class indices refer to positions in `DatasetSchema::target_classes`.
#[derive(Debug)]
pub enum DecisionPolicy<'a> {
    /// Positive whenever `p(positive) >= threshold` of the same row, else the negative class.
    Threshold {
        positive: &'a [f64],
        thresholds: &'a [f64],
    },
    /// The class with the highest probability. Ties go to the class listed first.
    Argmax { columns: Vec<&'a [f64]> },
}

impl<'a> DecisionPolicy<'a> {
    /// Selects the policy for `predictions`. `class_columns` must be the probability
    /// columns in schema order, already checked for presence by the caller.
    pub fn select(predictions: &'a PredictionSet, class_columns: Vec<&'a [f64]>) -> Self {
        match predictions.decision_threshold.as_deref() {
            Some(thresholds) => DecisionPolicy::Threshold {
                positive: class_columns[1],
                thresholds,
            },
            None => DecisionPolicy::Argmax {
                columns: class_columns,
            },
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            DecisionPolicy::Threshold { .. } => "per-row decision threshold",
            DecisionPolicy::Argmax { .. } => "argmax over class probabilities",
        }
    }

    /// Predicted class index for `row`.
    pub fn decide(&self, row: usize) -> usize {
        match self {
            DecisionPolicy::Threshold {
                positive,
                thresholds,
            } => {
                if positive[row] >= thresholds[row] {
                    1
                } else {
                    0
                }
            }
            DecisionPolicy::Argmax { columns } => {
                let mut best = 0;
                for (class_idx, column) in columns.iter().enumerate().skip(1) {
                    if column[row] > columns[best][row] {
                        best = class_idx;
                    }
                }
                best
            }
        }
    }
}

/// Looks up each schema class column in `predictions`, in schema order.
/// Returns the first missing class name on failure.
pub fn class_columns_in_schema_order<'a>(
    schema: &DatasetSchema,
    predictions: &'a PredictionSet,
) -> Result<Vec<&'a [f64]>, String> {
    schema
        .target_classes()
        .iter()
        .map(|class| predictions.column(class).ok_or_else(|| class.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> DatasetSchema {
        DatasetSchema::new("id", "label", vec!["neg".into(), "pos".into()]).unwrap()
    }

    fn predictions(neg: Vec<f64>, pos: Vec<f64>, thresholds: Option<Vec<f64>>) -> PredictionSet {
        PredictionSet {
            ids: (0..neg.len()).map(|i| i.to_string()).collect(),
            class_columns: vec![("pos".into(), pos), ("neg".into(), neg)],
            decision_threshold: thresholds,
        }
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let preds = predictions(vec![0.5, 0.6], vec![0.5, 0.4], Some(vec![0.5, 0.5]));
        let columns = class_columns_in_schema_order(&schema(), &preds).unwrap();
        let policy = DecisionPolicy::select(&preds, columns);
        assert!(matches!(policy, DecisionPolicy::Threshold { .. }));
        assert_eq!(policy.decide(0), 1);
        assert_eq!(policy.decide(1), 0);
    }

    #[test]
    fn threshold_is_applied_per_row() {
        let preds = predictions(vec![0.7, 0.7], vec![0.3, 0.3], Some(vec![0.2, 0.9]));
        let columns = class_columns_in_schema_order(&schema(), &preds).unwrap();
        let policy = DecisionPolicy::select(&preds, columns);
        assert_eq!(policy.decide(0), 1);
        assert_eq!(policy.decide(1), 0);
    }

    #[test]
    fn argmax_picks_the_larger_probability() {
        let preds = predictions(vec![0.3], vec![0.7], None);
        let columns = class_columns_in_schema_order(&schema(), &preds).unwrap();
        let policy = DecisionPolicy::select(&preds, columns);
        assert!(matches!(policy, DecisionPolicy::Argmax { .. }));
        assert_eq!(policy.decide(0), 1);
    }

    #[test]
    fn argmax_ties_resolve_to_first_schema_class() {
        let preds = predictions(vec![0.5], vec![0.5], None);
        let columns = class_columns_in_schema_order(&schema(), &preds).unwrap();
        assert_eq!(DecisionPolicy::select(&preds, columns).decide(0), 0);
    }

    #[test]
    fn repeated_decisions_are_stable() {
        let preds = predictions(vec![0.45, 0.1], vec![0.55, 0.9], Some(vec![0.55, 0.95]));
        let columns = class_columns_in_schema_order(&schema(), &preds).unwrap();
        let policy = DecisionPolicy::select(&preds, columns);
        let first: Vec<usize> = (0..2).map(|row| policy.decide(row)).collect();
        for _ in 0..10 {
            let again: Vec<usize> = (0..2).map(|row| policy.decide(row)).collect();
            assert_eq!(first, again);
        }
        assert_eq!(first, vec![1, 0]);
    }

    #[test]
    fn missing_class_column_is_reported_by_name() {
        let preds = PredictionSet {
            ids: vec!["1".into()],
            class_columns: vec![("neg".into(), vec![1.0])],
            decision_threshold: None,
        };
        assert_eq!(
            class_columns_in_schema_order(&schema(), &preds).unwrap_err(),
            "pos"
        );
    }
}
