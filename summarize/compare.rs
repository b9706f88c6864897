//! Which scenario wins, and how often.
//!
//! `best_candidates` is the pure winner rule shared by every comparison in the crate.
//! The win-share tables count, for each metric, how often each scenario is the single
//! best one (or how often several tie for best) across (model, dataset) cells.

use crate::shared::config::StudyConfig;
use crate::summarize::aggregate::compare_keys;
use crate::summarize::aggregate::GroupKey;
use crate::types::{Direction, Metric, MetricRecord};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Outcome label used when several scenarios share the best value.
pub const TIE: &str = "Tie";

/// Names achieving the best value, in input order. `NaN` never wins; an input with no
/// finite candidate has no winner.
pub fn best_candidates<'a>(candidates: &[(&'a str, f64)], direction: Direction) -> Vec<&'a str> {
    let best = candidates
        .iter()
        .map(|&(_, value)| value)
        .filter(|value| !value.is_nan())
        .reduce(|a, b| match direction {
            Direction::HigherIsBetter => a.max(b),
            Direction::LowerIsBetter => a.min(b),
        });
    match best {
        Some(best) => candidates
            .iter()
            .filter(|&&(_, value)| value == best)
            .map(|&(name, _)| name)
            .collect(),
        None => Vec::new(),
    }
}

/// The single winner's name, `TIE` for a shared best value, `None` without a winner.
pub fn outcome<'a>(candidates: &[(&'a str, f64)], direction: Direction) -> Option<&'a str> {
    match best_candidates(candidates, direction).as_slice() {
        [] => None,
        [single] => Some(single),
        _ => Some(TIE),
    }
}

/// The grouping of a win-share table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareView {
    /// Every (model, dataset variant) cell, one share table per metric.
    Overall,
    /// Fold-averaged (model, dataset family) cells, grouped by model.
    ByModel,
    /// Fold-averaged (model, dataset family) cells, grouped by dataset family.
    ByDataset,
}

impl ShareView {
    pub const ALL: [ShareView; 3] = [ShareView::Overall, ShareView::ByModel, ShareView::ByDataset];

    pub fn name(self) -> &'static str {
        match self {
            ShareView::Overall => "overall",
            ShareView::ByModel => "by_model",
            ShareView::ByDataset => "by_dataset",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WinShare {
    pub metric: Metric,
    /// Model or dataset family for the grouped views.
    pub group: Option<String>,
    /// A scenario name or `TIE`.
    pub outcome: String,
    pub count: usize,
    pub total: usize,
    pub share: f64,
}

/// Win shares of every scenario (and of ties) per metric and group.
///
/// Every configured scenario and `TIE` appear for every (metric, group), with a zero
/// count when they never win. Rows follow the presentation metric order, then the
/// canonical model order or natural dataset order, then scenario order with `TIE` last.
pub fn win_shares(records: &[MetricRecord], view: ShareView, config: &StudyConfig) -> Vec<WinShare> {
    let scenarios: Vec<&str> = config.scenario_names().collect();
    let unknown = records
        .iter()
        .filter(|r| config.scenario_rank(&r.scenario).is_none())
        .count();
    if unknown > 0 {
        warn!("{unknown} metric rows belong to scenarios outside the configuration and are not compared.");
    }

    let metrics: Vec<Metric> = config.metric_order().collect();
    let cells = comparison_cells(records, view, &metrics, config);

    let mut counts: BTreeMap<(usize, GroupKey), Vec<usize>> = BTreeMap::new();
    let mut undecided = 0usize;
    for ((metric_rank, model, dataset), values) in &cells {
        let candidates: Vec<(&str, f64)> = scenarios
            .iter()
            .zip(values)
            .filter_map(|(&name, value)| value.map(|v| (name, v)))
            .collect();
        let direction = config.direction(metrics[*metric_rank]);
        let Some(winner) = outcome(&candidates, direction) else {
            undecided += 1;
            continue;
        };
        let slot = scenarios
            .iter()
            .position(|&s| s == winner)
            .unwrap_or(scenarios.len());

        let group = match view {
            ShareView::Overall => GroupKey::default(),
            ShareView::ByModel => GroupKey {
                model: Some(model.clone()),
                dataset: None,
            },
            ShareView::ByDataset => GroupKey {
                model: None,
                dataset: Some(dataset.clone()),
            },
        };
        counts
            .entry((*metric_rank, group))
            .or_insert_with(|| vec![0; scenarios.len() + 1])[slot] += 1;
    }
    if undecided > 0 {
        debug!("{undecided} {} comparisons had no finite value and were skipped.", view.name());
    }

    let mut grouped: Vec<((usize, GroupKey), Vec<usize>)> = counts.into_iter().collect();
    grouped.sort_by(|((rank_a, a), _), ((rank_b, b), _)| {
        rank_a.cmp(rank_b).then_with(|| compare_keys(config, a, b))
    });

    let mut shares = Vec::new();
    for ((metric_rank, key), slots) in grouped {
        let total: usize = slots.iter().sum();
        let group = key.model.or(key.dataset);
        let outcomes = scenarios.iter().copied().chain(std::iter::once(TIE));
        for (name, count) in outcomes.zip(slots) {
            shares.push(WinShare {
                metric: metrics[metric_rank],
                group: group.clone(),
                outcome: name.to_string(),
                count,
                total,
                share: count as f64 / total as f64,
            });
        }
    }
    shares
}

type CellKey = (usize, String, String);

/// Per (metric rank, model, dataset) the value of each configured scenario, `None`
/// when that scenario has no row for the cell.
fn comparison_cells(
    records: &[MetricRecord],
    view: ShareView,
    metrics: &[Metric],
    config: &StudyConfig,
) -> BTreeMap<CellKey, Vec<Option<f64>>> {
    let scenario_count = config.scenarios.len();
    let mut sums: BTreeMap<CellKey, Vec<(f64, usize)>> = BTreeMap::new();

    for record in records {
        let Some(column) = config.scenario_rank(&record.scenario) else {
            continue;
        };
        let dataset = match view {
            ShareView::Overall => record.dataset.clone(),
            ShareView::ByModel | ShareView::ByDataset => record.family().to_string(),
        };
        for (rank, &metric) in metrics.iter().enumerate() {
            let value = record.values.get(metric);
            let slots = sums
                .entry((rank, record.model.clone(), dataset.clone()))
                .or_insert_with(|| vec![(0.0, 0); scenario_count]);
            if !value.is_nan() {
                slots[column].0 += value;
                slots[column].1 += 1;
            } else if slots[column].1 == 0 {
                // Keep the scenario present but undecidable.
                slots[column].0 = f64::NAN;
            }
        }
    }

    sums.into_iter()
        .map(|(key, slots)| {
            let values = slots
                .into_iter()
                .map(|(sum, n)| {
                    if n > 0 {
                        Some(sum / n as f64)
                    } else if sum.is_nan() {
                        Some(f64::NAN)
                    } else {
                        None
                    }
                })
                .collect();
            (key, values)
        })
        .collect()
}
