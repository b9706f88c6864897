//! # Two-Stage Fold Aggregation
//!
//! Rolls raw per-cell metric rows up into `mean ± std` summaries without letting
//! unequal group sizes leak into the spread:
//!
//! 1. Within each fold, average every metric over the rows of a group
//!    (`scenario, fold, [model], [dataset family]`).
//! 2. Across folds, take the mean and the sample standard deviation (ddof = 1) of
//!    those fold means, per `scenario, [model], [dataset family]`.
//!
//! The std therefore measures fold-to-fold variability of a group mean, never the
//! spread of individual rows.

use crate::shared::config::StudyConfig;
use crate::types::{Metric, MetricRecord};
use log::warn;
use natord::compare;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// The four summary levels of the study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Overall,
    ByDataset,
    ByModel,
    ByModelAndDataset,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Overall,
        Granularity::ByDataset,
        Granularity::ByModel,
        Granularity::ByModelAndDataset,
    ];

    /// File-name stem of the summaries written at this level.
    pub fn name(self) -> &'static str {
        match self {
            Granularity::Overall => "overall",
            Granularity::ByDataset => "by_dataset",
            Granularity::ByModel => "by_model",
            Granularity::ByModelAndDataset => "by_model_dataset",
        }
    }

    pub fn has_model(self) -> bool {
        matches!(self, Granularity::ByModel | Granularity::ByModelAndDataset)
    }

    pub fn has_dataset(self) -> bool {
        matches!(self, Granularity::ByDataset | Granularity::ByModelAndDataset)
    }
}

/// Grouping keys beyond scenario and metric. `None` means "not grouped by this key".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GroupKey {
    pub model: Option<String>,
    pub dataset: Option<String>,
}

impl GroupKey {
    fn for_record(record: &MetricRecord, granularity: Granularity) -> Self {
        Self {
            model: granularity.has_model().then(|| record.model.clone()),
            dataset: granularity.has_dataset().then(|| record.family().to_string()),
        }
    }
}

/// One summarised group.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRecord {
    pub scenario: String,
    pub metric: Metric,
    pub key: GroupKey,
    pub mean: f64,
    pub std: f64,
    /// Fold means that contributed a finite value.
    pub folds: usize,
    /// `"{mean} ± {std}"` at the configured precision.
    pub display: String,
}

pub fn format_mean_std(mean: f64, std: f64, precision: usize) -> String {
    format!("{mean:.precision$} ± {std:.precision$}")
}

/// Mean of the finite values in input order, `NaN` when there are none.
pub(crate) fn finite_mean(values: impl Iterator<Item = f64>) -> (f64, usize) {
    let (sum, count) = values
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        (f64::NAN, 0)
    } else {
        (sum / count as f64, count)
    }
}

/// Sample mean and standard deviation (ddof = 1) of the finite values.
pub fn mean_and_sample_std(values: &[f64]) -> (f64, f64, usize) {
    let (mean, count) = finite_mean(values.iter().copied());
    if count < 2 {
        return (mean, f64::NAN, count);
    }
    let sum_sq: f64 = values
        .iter()
        .filter(|v| !v.is_nan())
        .map(|v| (v - mean) * (v - mean))
        .sum();
    (mean, (sum_sq / (count - 1) as f64).sqrt(), count)
}

/// Summarises `records` at `granularity`, for the metrics in the configured
/// presentation order, in canonical output order.
pub fn aggregate(
    records: &[MetricRecord],
    granularity: Granularity,
    config: &StudyConfig,
) -> Vec<AggregatedRecord> {
    let metrics: Vec<Metric> = config.metric_order().collect();

    // Stage 1: mean per (group, metric, fold). Values are kept in input order so the
    // summation order is that of the raw table.
    let mut per_fold: BTreeMap<(String, GroupKey, Metric, u32), Vec<f64>> = BTreeMap::new();
    for record in records {
        let key = GroupKey::for_record(record, granularity);
        for &metric in &metrics {
            per_fold
                .entry((record.scenario.clone(), key.clone(), metric, record.fold))
                .or_default()
                .push(record.values.get(metric));
        }
    }

    // Stage 2: fold means per (group, metric), folds ascending.
    let mut per_group: BTreeMap<(String, GroupKey, Metric), Vec<f64>> = BTreeMap::new();
    for ((scenario, key, metric, _), values) in per_fold {
        let (fold_mean, _) = finite_mean(values.into_iter());
        per_group
            .entry((scenario, key, metric))
            .or_default()
            .push(fold_mean);
    }

    let precision = config.summary_precision;
    let mut underpowered = 0usize;
    let mut aggregated: Vec<AggregatedRecord> = per_group
        .into_iter()
        .map(|((scenario, key, metric), fold_means)| {
            let (mean, std, folds) = mean_and_sample_std(&fold_means);
            if folds < 2 {
                underpowered += 1;
            }
            AggregatedRecord {
                scenario,
                metric,
                key,
                mean,
                std,
                folds,
                display: format_mean_std(mean, std, precision),
            }
        })
        .collect();

    if underpowered > 0 {
        warn!(
            "{} {} groups have fewer than two contributing folds; their std is undefined.",
            underpowered,
            granularity.name()
        );
    }

    aggregated.sort_by(|a, b| canonical_order(config, a, b));
    aggregated
}

fn rank_then_name(rank_a: Option<usize>, rank_b: Option<usize>, a: &str, b: &str) -> Ordering {
    // Unknown entries sort after every known one.
    let rank_a = rank_a.unwrap_or(usize::MAX);
    let rank_b = rank_b.unwrap_or(usize::MAX);
    rank_a.cmp(&rank_b).then_with(|| compare(a, b))
}

/// Canonical order of grouping keys: model rank, then natural dataset order.
pub fn compare_keys(config: &StudyConfig, a: &GroupKey, b: &GroupKey) -> Ordering {
    let by_model = match (&a.model, &b.model) {
        (Some(ma), Some(mb)) => rank_then_name(config.model_rank(ma), config.model_rank(mb), ma, mb),
        (ma, mb) => ma.cmp(mb),
    };
    by_model.then_with(|| match (&a.dataset, &b.dataset) {
        (Some(da), Some(db)) => compare(da, db),
        (da, db) => da.cmp(db),
    })
}

fn canonical_order(config: &StudyConfig, a: &AggregatedRecord, b: &AggregatedRecord) -> Ordering {
    rank_then_name(
        config.scenario_rank(&a.scenario),
        config.scenario_rank(&b.scenario),
        &a.scenario,
        &b.scenario,
    )
    .then_with(|| config.metric_rank(a.metric).cmp(&config.metric_rank(b.metric)))
    .then_with(|| compare_keys(config, &a.key, &b.key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricValues;
    use approx::assert_abs_diff_eq;

    fn record(scenario: &str, dataset: &str, fold: u32, model: &str, accuracy: f64) -> MetricRecord {
        let mut values = MetricValues::filled(0.5);
        values.set(Metric::Accuracy, accuracy);
        MetricRecord {
            scenario: scenario.into(),
            dataset: format!("{dataset}_fold_{fold}"),
            fold,
            model: model.into(),
            values,
        }
    }

    fn accuracy_rows(aggregated: &[AggregatedRecord]) -> Vec<&AggregatedRecord> {
        aggregated
            .iter()
            .filter(|r| r.metric == Metric::Accuracy)
            .collect()
    }

    #[test]
    fn fold_means_feed_the_cross_fold_std() {
        let config = StudyConfig::default();
        // Fold 1 has one row, fold 2 has three: a flat mean would be 0.65.
        let records = vec![
            record("Baseline", "bank", 1, "SVM", 0.8),
            record("Baseline", "bank", 2, "SVM", 0.6),
            record("Baseline", "churn", 2, "SVM", 0.6),
            record("Baseline", "adult", 2, "XGBoost", 0.6),
        ];
        let aggregated = aggregate(&records, Granularity::Overall, &config);
        let acc = accuracy_rows(&aggregated);
        assert_eq!(acc.len(), 1);
        assert_abs_diff_eq!(acc[0].mean, 0.7, epsilon = 1e-12);
        assert_abs_diff_eq!(acc[0].std, 0.141_421_356_237_309_5, epsilon = 1e-12);
        assert_eq!(acc[0].folds, 2);
        assert_eq!(acc[0].display, "0.700 ± 0.141");

        let flat: f64 = records.iter().map(|r| r.values.get(Metric::Accuracy)).sum::<f64>() / 4.0;
        assert!((flat - acc[0].mean).abs() > 0.01);
    }

    #[test]
    fn dataset_granularity_strips_the_fold_suffix() {
        let config = StudyConfig::default();
        let records = vec![
            record("SMOTE", "bank", 1, "SVM", 0.9),
            record("SMOTE", "bank", 2, "SVM", 0.7),
            record("SMOTE", "adult", 1, "SVM", 0.4),
            record("SMOTE", "adult", 2, "SVM", 0.6),
        ];
        let aggregated = aggregate(&records, Granularity::ByDataset, &config);
        let acc = accuracy_rows(&aggregated);
        let datasets: Vec<_> = acc.iter().map(|r| r.key.dataset.as_deref().unwrap()).collect();
        assert_eq!(datasets, vec!["adult", "bank"]);
        assert_abs_diff_eq!(acc[1].mean, 0.8, epsilon = 1e-12);
        assert!(acc.iter().all(|r| r.key.model.is_none()));
    }

    #[test]
    fn single_fold_leaves_std_undefined() {
        let config = StudyConfig::default();
        let records = vec![record("Baseline", "bank", 1, "SVM", 0.8)];
        let aggregated = aggregate(&records, Granularity::ByModel, &config);
        let acc = accuracy_rows(&aggregated);
        assert_abs_diff_eq!(acc[0].mean, 0.8, epsilon = 1e-12);
        assert!(acc[0].std.is_nan());
        assert_eq!(acc[0].display, "0.800 ± NaN");
    }

    #[test]
    fn nan_values_are_skipped_within_a_fold() {
        let config = StudyConfig::default();
        let records = vec![
            record("Baseline", "bank", 1, "SVM", f64::NAN),
            record("Baseline", "adult", 1, "SVM", 0.6),
            record("Baseline", "bank", 2, "SVM", 0.8),
        ];
        let aggregated = aggregate(&records, Granularity::Overall, &config);
        let acc = accuracy_rows(&aggregated);
        assert_abs_diff_eq!(acc[0].mean, 0.7, epsilon = 1e-12);
        assert_eq!(acc[0].folds, 2);
    }

    #[test]
    fn output_follows_canonical_orders_regardless_of_input_order() {
        let config = StudyConfig::default();
        let records = vec![
            record("SMOTE", "bank", 1, "XGBoost", 0.5),
            record("Baseline", "bank", 1, "XGBoost", 0.5),
            record("SMOTE", "bank", 1, "AdaBoost", 0.5),
            record("Class Weights", "bank", 1, "AdaBoost", 0.5),
        ];
        let aggregated = aggregate(&records, Granularity::ByModel, &config);
        let order: Vec<(String, Metric, String)> = aggregated
            .iter()
            .filter(|r| r.metric == Metric::Accuracy || r.metric == Metric::Auc)
            .map(|r| (r.scenario.clone(), r.metric, r.key.model.clone().unwrap()))
            .collect();
        let expected = [
            ("Baseline", Metric::Accuracy, "XGBoost"),
            ("Baseline", Metric::Auc, "XGBoost"),
            ("Class Weights", Metric::Accuracy, "AdaBoost"),
            ("Class Weights", Metric::Auc, "AdaBoost"),
            ("SMOTE", Metric::Accuracy, "AdaBoost"),
            ("SMOTE", Metric::Accuracy, "XGBoost"),
            ("SMOTE", Metric::Auc, "AdaBoost"),
            ("SMOTE", Metric::Auc, "XGBoost"),
        ];
        let expected: Vec<(String, Metric, String)> = expected
            .iter()
            .map(|(s, m, model)| (s.to_string(), *m, model.to_string()))
            .collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        let (mean, std, n) = mean_and_sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(n, 8);
        assert_abs_diff_eq!(mean, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(std, (32.0f64 / 7.0).sqrt(), epsilon = 1e-12);
    }
}
