//! # Schema-Driven Scorer
//!
//! Turns one prediction set into the fixed metric vector of a single experiment cell.
//!
//! The prediction rows are joined to the test key on the schema's id field (inner
//! join), labels are decided once per prediction set by a `DecisionPolicy`, both truth
//! and prediction are binarised against the schema's positive class, and every metric
//! is rounded to `decimals` places before it leaves this module.

use crate::decide::{DecisionPolicy, class_columns_in_schema_order};
use crate::metrics::{self, ConfusionCounts};
use crate::types::{DatasetSchema, Metric, MetricValues, PredictionSet, TestKey};
use ahash::{AHashMap, AHashSet};
use log::{debug, info, warn};
use std::fmt;
use thiserror::Error;

/// Identifies the experiment cell being scored in every log line.
#[derive(Debug, Clone, Copy)]
pub struct CellContext<'a> {
    pub dataset: &'a str,
    pub scenario: &'a str,
    pub model: &'a str,
}

impl fmt::Display for CellContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[dataset={} scenario={} model={}]",
            self.dataset, self.scenario, self.model
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoreError {
    #[error(
        "The prediction set has no probability column for the declared target class '{column}'."
    )]
    SchemaMismatch { column: String },
    #[error(
        "Joining {predictions} predictions against {test_key} test-key rows on the id field left {matched} matched rows ({unmatched_predictions} prediction ids and {unmatched_test_key} test-key ids unmatched)."
    )]
    JoinMismatch {
        predictions: usize,
        test_key: usize,
        matched: usize,
        unmatched_predictions: usize,
        unmatched_test_key: usize,
    },
}

/// Knobs of the scorer that come from the study configuration.
#[derive(Debug, Clone, Copy)]
pub struct ScoreOptions {
    /// Decimal places kept in every stored metric.
    pub decimals: u32,
    /// Fail instead of dropping ids that appear on only one side of the join.
    pub strict_join: bool,
}

impl Default for ScoreOptions {
    fn default() -> Self {
        Self {
            decimals: 4,
            strict_join: false,
        }
    }
}

/// The joined, binarised view of one prediction set.
struct JoinedRows {
    y_true: Vec<bool>,
    y_pred: Vec<bool>,
    positive_probability: Vec<f64>,
    predicted_classes: AHashSet<usize>,
}

/// Scores one experiment cell.
pub fn score(
    schema: &DatasetSchema,
    test_key: &TestKey,
    predictions: &PredictionSet,
    context: CellContext<'_>,
    options: ScoreOptions,
) -> Result<MetricValues, ScoreError> {
    info!("{context} Starting metric calculation.");

    let class_columns = class_columns_in_schema_order(schema, predictions)
        .map_err(|column| ScoreError::SchemaMismatch { column })?;
    let positive_probability = class_columns[1];
    let policy = DecisionPolicy::select(predictions, class_columns);
    debug!("{context} Applying {}.", policy.describe());

    let joined = join_with_test_key(
        schema,
        test_key,
        predictions,
        &policy,
        positive_probability,
        context,
        options,
    )?;

    if joined.predicted_classes.len() == 1 {
        let only = joined.predicted_classes.iter().next().copied().unwrap_or(0);
        warn!(
            "{context} All predictions are of a single class: {}",
            schema.target_classes()[only]
        );
    }

    debug!("{context} Calculating metrics.");
    let values = compute_metrics(&joined, options.decimals);
    if values.get(Metric::Auc).is_nan() {
        warn!("{context} AUC is undefined: the joined test key holds a single class.");
    }

    info!("{context} Metric calculation complete.");
    Ok(values)
}

fn join_with_test_key(
    schema: &DatasetSchema,
    test_key: &TestKey,
    predictions: &PredictionSet,
    policy: &DecisionPolicy<'_>,
    positive_probability: &[f64],
    context: CellContext<'_>,
    options: ScoreOptions,
) -> Result<JoinedRows, ScoreError> {
    let positive = schema.positive_class();

    let mut truth_by_id: AHashMap<&str, &str> = AHashMap::with_capacity(test_key.ids.len());
    let mut duplicate_ids = 0usize;
    for (id, label) in test_key.ids.iter().zip(&test_key.labels) {
        if truth_by_id.contains_key(id.as_str()) {
            duplicate_ids += 1;
        } else {
            truth_by_id.insert(id, label);
        }
    }
    if duplicate_ids > 0 {
        warn!("{context} Test key repeats {duplicate_ids} ids; the first occurrence is used.");
    }

    let mut joined = JoinedRows {
        y_true: Vec::with_capacity(predictions.len()),
        y_pred: Vec::with_capacity(predictions.len()),
        positive_probability: Vec::with_capacity(predictions.len()),
        predicted_classes: AHashSet::new(),
    };
    let mut matched_ids: AHashSet<&str> = AHashSet::with_capacity(predictions.len());
    let mut unmatched_predictions = 0usize;

    for (row, id) in predictions.ids.iter().enumerate() {
        let Some(label) = truth_by_id.get(id.as_str()) else {
            unmatched_predictions += 1;
            continue;
        };
        matched_ids.insert(id);
        let predicted = policy.decide(row);
        joined.predicted_classes.insert(predicted);
        joined.y_true.push(*label == positive);
        joined.y_pred.push(predicted == 1);
        joined.positive_probability.push(positive_probability[row]);
    }

    let unmatched_test_key = truth_by_id.len() - matched_ids.len();
    let mismatch = || ScoreError::JoinMismatch {
        predictions: predictions.len(),
        test_key: test_key.ids.len(),
        matched: joined.y_true.len(),
        unmatched_predictions,
        unmatched_test_key,
    };

    if joined.y_true.is_empty() {
        return Err(mismatch());
    }
    if unmatched_predictions > 0 || unmatched_test_key > 0 {
        if options.strict_join {
            return Err(mismatch());
        }
        warn!(
            "{context} Dropped {unmatched_predictions} prediction ids and {unmatched_test_key} test-key ids without a match."
        );
    }

    Ok(joined)
}

fn compute_metrics(joined: &JoinedRows, decimals: u32) -> MetricValues {
    let counts = ConfusionCounts::from_labels(&joined.y_true, &joined.y_pred);
    let probs = &joined.positive_probability;

    let mut values = MetricValues::filled(f64::NAN);
    let raw = [
        (Metric::Accuracy, counts.accuracy()),
        (Metric::Precision, counts.precision()),
        (Metric::Recall, counts.recall()),
        (Metric::F1, counts.f_beta(1.0)),
        (Metric::F2, counts.f_beta(2.0)),
        (Metric::Auc, metrics::roc_auc(&joined.y_true, probs)),
        (Metric::PrAuc, metrics::pr_auc(&joined.y_true, probs)),
        (Metric::LogLoss, metrics::log_loss(&joined.y_true, probs)),
        (Metric::Brier, metrics::brier_score(&joined.y_true, probs)),
        (Metric::Mcc, counts.mcc()),
    ];
    for (metric, value) in raw {
        values.set(metric, metrics::round_to(value, decimals));
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const CONTEXT: CellContext<'static> = CellContext {
        dataset: "toy_fold_1",
        scenario: "baseline",
        model: "logreg",
    };

    fn schema() -> DatasetSchema {
        DatasetSchema::new("id", "label", vec!["0".into(), "1".into()]).unwrap()
    }

    fn test_key(labels: &[&str]) -> TestKey {
        TestKey {
            ids: (1..=labels.len()).map(|i| format!("r{i}")).collect(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn predictions(ids: &[&str], pos: &[f64], threshold: Option<Vec<f64>>) -> PredictionSet {
        PredictionSet {
            ids: ids.iter().map(|s| s.to_string()).collect(),
            class_columns: vec![
                ("0".into(), pos.iter().map(|p| 1.0 - p).collect()),
                ("1".into(), pos.to_vec()),
            ],
            decision_threshold: threshold,
        }
    }

    #[test]
    fn scores_a_simple_argmax_cell() {
        let key = test_key(&["1", "0", "1", "0"]);
        let preds = predictions(&["r1", "r2", "r3", "r4"], &[0.9, 0.2, 0.4, 0.6], None);
        let values = score(&schema(), &key, &preds, CONTEXT, ScoreOptions::default()).unwrap();

        assert_abs_diff_eq!(values.get(Metric::Accuracy), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(values.get(Metric::Precision), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(values.get(Metric::Recall), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(values.get(Metric::Auc), 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(values.get(Metric::Mcc), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values.get(Metric::Brier), 0.1925, epsilon = 1e-12);
    }

    #[test]
    fn join_follows_ids_not_row_positions() {
        let key = test_key(&["1", "0", "1", "0"]);
        // Same predictions as a perfect classifier, but shuffled.
        let preds = predictions(&["r4", "r1", "r2", "r3"], &[0.1, 0.9, 0.2, 0.8], None);
        let values = score(&schema(), &key, &preds, CONTEXT, ScoreOptions::default()).unwrap();
        assert_eq!(values.get(Metric::Accuracy), 1.0);
        assert_eq!(values.get(Metric::Auc), 1.0);
    }

    #[test]
    fn threshold_column_overrides_argmax() {
        let key = test_key(&["1", "0"]);
        let preds = predictions(&["r1", "r2"], &[0.3, 0.1], Some(vec![0.3, 0.3]));
        let values = score(&schema(), &key, &preds, CONTEXT, ScoreOptions::default()).unwrap();
        assert_eq!(values.get(Metric::Accuracy), 1.0);
        assert_eq!(values.get(Metric::Recall), 1.0);
    }

    #[test]
    fn metrics_are_rounded_to_four_decimals() {
        let key = test_key(&["1", "0", "0"]);
        let preds = predictions(&["r1", "r2", "r3"], &[0.9, 0.8, 0.1], None);
        let values = score(&schema(), &key, &preds, CONTEXT, ScoreOptions::default()).unwrap();
        assert_eq!(values.get(Metric::Accuracy), 0.6667);
        assert_eq!(values.get(Metric::Precision), 0.5);
        for (metric, value) in values.iter() {
            let (low, high) = metric.bounds();
            assert!(value >= low && value <= high, "{metric} = {value}");
        }
    }

    #[test]
    fn unmatched_ids_are_dropped_by_default() {
        let key = test_key(&["1", "0", "1"]);
        let preds = predictions(&["r1", "r2", "ghost"], &[0.9, 0.1, 0.9], None);
        let values = score(&schema(), &key, &preds, CONTEXT, ScoreOptions::default()).unwrap();
        assert_eq!(values.get(Metric::Accuracy), 1.0);
    }

    #[test]
    fn strict_join_rejects_unmatched_ids() {
        let key = test_key(&["1", "0", "1"]);
        let preds = predictions(&["r1", "r2"], &[0.9, 0.1], None);
        let options = ScoreOptions {
            strict_join: true,
            ..ScoreOptions::default()
        };
        let err = score(&schema(), &key, &preds, CONTEXT, options).unwrap_err();
        assert_eq!(
            err,
            ScoreError::JoinMismatch {
                predictions: 2,
                test_key: 3,
                matched: 2,
                unmatched_predictions: 0,
                unmatched_test_key: 1,
            }
        );
    }

    #[test]
    fn empty_join_is_an_error() {
        let key = test_key(&["1", "0"]);
        let preds = predictions(&["x", "y"], &[0.9, 0.1], None);
        let err = score(&schema(), &key, &preds, CONTEXT, ScoreOptions::default()).unwrap_err();
        assert!(matches!(err, ScoreError::JoinMismatch { matched: 0, .. }));
    }

    #[test]
    fn missing_class_column_is_a_schema_mismatch() {
        let key = test_key(&["1"]);
        let preds = PredictionSet {
            ids: vec!["r1".into()],
            class_columns: vec![("0".into(), vec![0.4])],
            decision_threshold: None,
        };
        let err = score(&schema(), &key, &preds, CONTEXT, ScoreOptions::default()).unwrap_err();
        assert_eq!(
            err,
            ScoreError::SchemaMismatch {
                column: "1".into()
            }
        );
    }

    #[test]
    fn single_true_class_propagates_nan_auc() {
        let key = test_key(&["1", "1"]);
        let preds = predictions(&["r1", "r2"], &[0.9, 0.4], None);
        let values = score(&schema(), &key, &preds, CONTEXT, ScoreOptions::default()).unwrap();
        assert!(values.get(Metric::Auc).is_nan());
        assert_eq!(values.get(Metric::Recall), 0.5);
    }

    #[test]
    fn extra_classes_are_binarised_one_vs_rest() {
        let schema =
            DatasetSchema::new("id", "label", vec!["a".into(), "b".into(), "c".into()]).unwrap();
        let key = TestKey {
            ids: vec!["1".into(), "2".into(), "3".into()],
            labels: vec!["b".into(), "c".into(), "a".into()],
        };
        let preds = PredictionSet {
            ids: vec!["1".into(), "2".into(), "3".into()],
            class_columns: vec![
                ("a".into(), vec![0.1, 0.1, 0.2]),
                ("b".into(), vec![0.8, 0.2, 0.1]),
                ("c".into(), vec![0.1, 0.7, 0.7]),
            ],
            decision_threshold: None,
        };
        let values = score(&schema, &key, &preds, CONTEXT, ScoreOptions::default()).unwrap();
        // Predicted b, c, c against truth b, c, a: rows 2 and 3 are both negatives.
        assert_eq!(values.get(Metric::Accuracy), 1.0);
        assert_eq!(values.get(Metric::Precision), 1.0);
    }
}
