//! Collapses the raw table into one balanced subjects × scenarios matrix per metric.
//!
//! Values are averaged over folds per (scenario, dataset family, model), then over
//! models per (scenario, dataset family). Dataset families are the subjects of the
//! repeated-measures design and scenarios are the within-subject groups.

use super::StatsError;
use crate::shared::config::StudyConfig;
use crate::summarize::aggregate::finite_mean;
use crate::types::{Metric, MetricRecord};
use log::warn;
use natord::compare;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioMatrix {
    pub metric: Metric,
    /// Dataset families, natural order.
    pub subjects: Vec<String>,
    /// Scenarios present in the data, canonical order.
    pub groups: Vec<String>,
    /// `values[subject][group]`.
    pub values: Vec<Vec<f64>>,
}

impl ScenarioMatrix {
    /// Values of one group across all subjects.
    pub fn column(&self, group: usize) -> Vec<f64> {
        self.values.iter().map(|row| row[group]).collect()
    }
}

// NaN cells are skipped the same way the summary tables skip them.
fn mean_of(values: &[f64]) -> f64 {
    finite_mean(values.iter().copied()).0
}

/// One matrix per metric of the presentation order.
///
/// Fails with `Unbalanced` when a dataset family lacks one of the scenarios seen
/// elsewhere in the table.
pub fn scenario_matrices(
    records: &[MetricRecord],
    config: &StudyConfig,
) -> Result<Vec<ScenarioMatrix>, StatsError> {
    let mut groups: Vec<&str> = Vec::new();
    let mut skipped = 0usize;
    for record in records {
        if config.scenario_rank(&record.scenario).is_none() {
            skipped += 1;
        } else if !groups.contains(&record.scenario.as_str()) {
            groups.push(&record.scenario);
        }
    }
    if skipped > 0 {
        warn!("{skipped} metric rows of unconfigured scenarios are left out of the statistical tests.");
    }
    groups.sort_by_key(|name| config.scenario_rank(name));

    config
        .metric_order()
        .map(|metric| matrix_for(records, metric, &groups, config))
        .collect()
}

fn matrix_for(
    records: &[MetricRecord],
    metric: Metric,
    groups: &[&str],
    config: &StudyConfig,
) -> Result<ScenarioMatrix, StatsError> {
    // (scenario, family, model) -> fold values
    let mut per_model: BTreeMap<(&str, &str, &str), Vec<f64>> = BTreeMap::new();
    for record in records {
        if config.scenario_rank(&record.scenario).is_none() {
            continue;
        }
        per_model
            .entry((record.scenario.as_str(), record.family(), record.model.as_str()))
            .or_default()
            .push(record.values.get(metric));
    }

    // (family, scenario) -> model means
    let mut per_subject: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
    for ((scenario, family, _), folds) in &per_model {
        per_subject
            .entry((*family, *scenario))
            .or_default()
            .push(mean_of(folds));
    }

    let mut subjects: Vec<&str> = per_subject.keys().map(|&(family, _)| family).collect();
    subjects.dedup();
    subjects.sort_by(|a, b| compare(a, b));

    let mut values = Vec::with_capacity(subjects.len());
    for &subject in &subjects {
        let mut row = Vec::with_capacity(groups.len());
        for &group in groups {
            let means = per_subject
                .get(&(subject, group))
                .ok_or_else(|| StatsError::Unbalanced {
                    metric,
                    subject: subject.to_string(),
                    scenario: group.to_string(),
                })?;
            row.push(mean_of(means));
        }
        values.push(row);
    }

    Ok(ScenarioMatrix {
        metric,
        subjects: subjects.into_iter().map(str::to_string).collect(),
        groups: groups.iter().map(|g| g.to_string()).collect(),
        values,
    })
}
