//! Long-form summaries to scenario-as-columns tables, and back.

use crate::summarize::aggregate::{AggregatedRecord, GroupKey, compare_keys};
use crate::shared::config::StudyConfig;
use crate::types::Metric;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PivotError {
    #[error("The {key} grouping key is required but missing from a '{scenario}' / '{metric}' row.")]
    MissingKey {
        key: KeyColumn,
        scenario: String,
        metric: Metric,
    },
    #[error("Scenario '{0}' is not part of the canonical scenario order.")]
    UnknownScenario(String),
    #[error("Metric '{0}' is not part of the presentation metric order.")]
    UnknownMetric(Metric),
    #[error("Two rows share the cell ({metric}, {key:?}, '{scenario}').")]
    DuplicateCell {
        scenario: String,
        metric: Metric,
        key: GroupKey,
    },
}

/// A grouping key that becomes an index column of a pivoted table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyColumn {
    Model,
    Dataset,
}

impl KeyColumn {
    pub fn header(self) -> &'static str {
        match self {
            KeyColumn::Model => "Model",
            KeyColumn::Dataset => "Dataset",
        }
    }
}

impl std::fmt::Display for KeyColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.header())
    }
}

/// One long-form cell: the value of a scenario for a (metric, keys) row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongCell {
    pub scenario: String,
    pub metric: Metric,
    pub key: GroupKey,
    pub value: String,
}

impl From<&AggregatedRecord> for LongCell {
    fn from(record: &AggregatedRecord) -> Self {
        Self {
            scenario: record.scenario.clone(),
            metric: record.metric,
            key: record.key.clone(),
            value: record.display.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotRow {
    pub metric: Metric,
    pub key: GroupKey,
    /// One cell per scenario column. An empty string marks a missing combination.
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotedTable {
    pub keys: Vec<KeyColumn>,
    pub scenarios: Vec<String>,
    pub rows: Vec<PivotRow>,
}

impl PivotedTable {
    /// Index columns followed by scenario columns.
    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["Metric".to_string()];
        header.extend(self.keys.iter().map(|k| k.header().to_string()));
        header.extend(self.scenarios.iter().cloned());
        header
    }

    /// Index values of a row, in header order.
    pub fn index_values(&self, row: &PivotRow) -> Vec<String> {
        let mut values = vec![row.metric.name().to_string()];
        for key in &self.keys {
            let value = match key {
                KeyColumn::Model => row.key.model.clone(),
                KeyColumn::Dataset => row.key.dataset.clone(),
            };
            values.push(value.unwrap_or_default());
        }
        values
    }
}

fn project_key(cell: &LongCell, keys: &[KeyColumn]) -> Result<GroupKey, PivotError> {
    let mut projected = GroupKey::default();
    for &key in keys {
        let value = match key {
            KeyColumn::Model => &cell.key.model,
            KeyColumn::Dataset => &cell.key.dataset,
        };
        let value = value.clone().ok_or_else(|| PivotError::MissingKey {
            key,
            scenario: cell.scenario.clone(),
            metric: cell.metric,
        })?;
        match key {
            KeyColumn::Model => projected.model = Some(value),
            KeyColumn::Dataset => projected.dataset = Some(value),
        }
    }
    Ok(projected)
}

/// Pivots long-form cells into one row per `(metric, keys)` and one column per
/// configured scenario.
///
/// Rows follow the presentation metric order, then the canonical model order (unknown
/// models last), then natural dataset order. Columns follow the canonical scenario
/// order.
pub fn pivot(
    cells: &[LongCell],
    keys: &[KeyColumn],
    config: &StudyConfig,
) -> Result<PivotedTable, PivotError> {
    let scenarios: Vec<String> = config.scenario_names().map(str::to_string).collect();

    let mut rows: BTreeMap<(usize, GroupKey), (Metric, Vec<String>)> = BTreeMap::new();
    for cell in cells {
        let column = config
            .scenario_rank(&cell.scenario)
            .ok_or_else(|| PivotError::UnknownScenario(cell.scenario.clone()))?;
        let metric_rank = config
            .metric_rank(cell.metric)
            .ok_or(PivotError::UnknownMetric(cell.metric))?;
        let key = project_key(cell, keys)?;

        let (_, row_cells) = rows
            .entry((metric_rank, key.clone()))
            .or_insert_with(|| (cell.metric, vec![String::new(); scenarios.len()]));
        if !row_cells[column].is_empty() {
            return Err(PivotError::DuplicateCell {
                scenario: cell.scenario.clone(),
                metric: cell.metric,
                key,
            });
        }
        row_cells[column] = cell.value.clone();
    }

    let mut rows: Vec<(usize, PivotRow)> = rows
        .into_iter()
        .map(|((metric_rank, key), (metric, cells))| (metric_rank, PivotRow { metric, key, cells }))
        .collect();
    rows.sort_by(|(rank_a, a), (rank_b, b)| {
        rank_a
            .cmp(rank_b)
            .then_with(|| compare_keys(config, &a.key, &b.key))
    });

    Ok(PivotedTable {
        keys: keys.to_vec(),
        scenarios,
        rows: rows.into_iter().map(|(_, row)| row).collect(),
    })
}

/// Converts a pivoted table back into long form, skipping empty cells. Cells come out
/// row by row, scenarios in column order.
pub fn melt(table: &PivotedTable) -> Vec<LongCell> {
    let mut cells = Vec::new();
    for row in &table.rows {
        for (scenario, value) in table.scenarios.iter().zip(&row.cells) {
            if value.is_empty() {
                continue;
            }
            cells.push(LongCell {
                scenario: scenario.clone(),
                metric: row.metric,
                key: row.key.clone(),
                value: value.clone(),
            });
        }
    }
    cells
}
