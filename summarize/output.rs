//! CSV and markdown encoders for the summary stage. Each table is encoded into a
//! `StagedFile`. `write_files` lands a stage's files together or not at all.

use crate::io::format_value;
use crate::shared::config::StudyConfig;
use crate::shared::files::{StagedFile, write_all_atomically};
use crate::summarize::aggregate::{AggregatedRecord, Granularity};
use crate::summarize::compare::WinShare;
use crate::summarize::extreme::ExtremeError;
use crate::summarize::markdown::render_markdown;
use crate::summarize::pivot::{KeyColumn, PivotError, PivotedTable};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error(transparent)]
    Pivot(#[from] PivotError),
    #[error(transparent)]
    Extreme(#[from] ExtremeError),
}

/// Index columns of the pivoted table at `granularity`.
pub fn pivot_keys(granularity: Granularity) -> Vec<KeyColumn> {
    let mut keys = Vec::new();
    if granularity.has_model() {
        keys.push(KeyColumn::Model);
    }
    if granularity.has_dataset() {
        keys.push(KeyColumn::Dataset);
    }
    keys
}

fn encode_rows<I, R>(path: &Path, header: Vec<String>, rows: I) -> Result<StagedFile, OutputError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    let csv_error = |source| OutputError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header).map_err(csv_error)?;
    for row in rows {
        let row: Vec<String> = row.into_iter().collect();
        writer.write_record(&row).map_err(csv_error)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv_error(csv::Error::from(e.into_error())))?;
    Ok(StagedFile::new(path, bytes))
}

/// Writes every staged file of a stage. On failure none of them is left on disk.
pub fn write_files(files: &[StagedFile]) -> Result<(), OutputError> {
    write_all_atomically(files).map_err(|(path, source)| OutputError::Io { path, source })
}

/// Long-form summary: `Scenario, Metric, [Model], [Dataset], Mean, Std, Mean ± Std Dev`.
pub fn summary_file(
    path: &Path,
    records: &[AggregatedRecord],
    granularity: Granularity,
) -> Result<StagedFile, OutputError> {
    let mut header = vec!["Scenario".to_string(), "Metric".to_string()];
    header.extend(pivot_keys(granularity).iter().map(|k| k.header().to_string()));
    header.extend(["Mean", "Std", "Mean ± Std Dev"].map(String::from));

    let rows = records.iter().map(|record| {
        let mut row = vec![record.scenario.clone(), record.metric.name().to_string()];
        if granularity.has_model() {
            row.push(record.key.model.clone().unwrap_or_default());
        }
        if granularity.has_dataset() {
            row.push(record.key.dataset.clone().unwrap_or_default());
        }
        row.push(format_value(record.mean));
        row.push(format_value(record.std));
        row.push(record.display.clone());
        row
    });
    encode_rows(path, header, rows)
}

pub fn pivoted_file(path: &Path, table: &PivotedTable) -> Result<StagedFile, OutputError> {
    let rows = table.rows.iter().map(|row| {
        let mut cells = table.index_values(row);
        cells.extend(row.cells.iter().cloned());
        cells
    });
    encode_rows(path, table.header(), rows)
}

pub fn markdown_file(
    path: &Path,
    table: &PivotedTable,
    config: &StudyConfig,
) -> Result<StagedFile, OutputError> {
    Ok(StagedFile::new(path, render_markdown(table, config)?))
}

/// `Metric, [group], Outcome, Count, Total, Share`. `group_header` names the grouping
/// column of the by-model and by-dataset views.
pub fn win_shares_file(
    path: &Path,
    shares: &[WinShare],
    group_header: Option<&str>,
) -> Result<StagedFile, OutputError> {
    let mut header = vec!["Metric".to_string()];
    header.extend(group_header.map(str::to_string));
    header.extend(["Outcome", "Count", "Total", "Share"].map(String::from));

    let rows = shares.iter().map(|share| {
        let mut row = vec![share.metric.name().to_string()];
        if group_header.is_some() {
            row.push(share.group.clone().unwrap_or_default());
        }
        row.push(share.outcome.clone());
        row.push(share.count.to_string());
        row.push(share.total.to_string());
        row.push(format_value(share.share));
        row
    });
    encode_rows(path, header, rows)
}
