//! Summary and report stages over the raw metrics table.

pub mod aggregate;
pub mod compare;
pub mod extreme;
pub mod markdown;
pub mod output;
pub mod pivot;

use crate::shared::config::StudyConfig;
use crate::shared::files::StudyPaths;
use crate::types::MetricRecord;
use aggregate::{AggregatedRecord, Granularity, aggregate};
use compare::{ShareView, win_shares};
use log::info;
use output::{OutputError, pivot_keys};
use pivot::{LongCell, PivotedTable, pivot};

fn pivot_summary(
    summary: &[AggregatedRecord],
    granularity: Granularity,
    config: &StudyConfig,
) -> Result<PivotedTable, OutputError> {
    let cells: Vec<LongCell> = summary.iter().map(LongCell::from).collect();
    Ok(pivot(&cells, &pivot_keys(granularity), config)?)
}

/// Writes the long and pivoted summaries at every granularity.
///
/// All eight tables are built before the first file is written.
pub fn summarize(
    config: &StudyConfig,
    paths: &StudyPaths,
    records: &[MetricRecord],
) -> Result<(), OutputError> {
    let mut files = Vec::with_capacity(2 * Granularity::ALL.len());
    for granularity in Granularity::ALL {
        let summary = aggregate(records, granularity, config);
        let table = pivot_summary(&summary, granularity, config)?;
        files.push(output::summary_file(
            &paths.summary_path(granularity.name()),
            &summary,
            granularity,
        )?);
        files.push(output::pivoted_file(
            &paths.pivoted_summary_path(granularity.name()),
            &table,
        )?);
        info!(
            "Summarised {} groups at the {} level.",
            summary.len(),
            granularity.name()
        );
    }
    output::write_files(&files)?;
    info!(
        "Wrote {} summary tables under '{}'.",
        files.len(),
        paths.metrics_dir().display()
    );
    Ok(())
}

/// Writes the overall markdown comparison table and the win-share tables, all or none.
pub fn report(
    config: &StudyConfig,
    paths: &StudyPaths,
    records: &[MetricRecord],
) -> Result<(), OutputError> {
    let overall = aggregate(records, Granularity::Overall, config);
    let table = pivot_summary(&overall, Granularity::Overall, config)?;
    let mut files = vec![output::markdown_file(&paths.markdown_path(), &table, config)?];

    for view in ShareView::ALL {
        let shares = win_shares(records, view, config);
        let group_header = match view {
            ShareView::Overall => None,
            ShareView::ByModel => Some("Model"),
            ShareView::ByDataset => Some("Dataset"),
        };
        files.push(output::win_shares_file(
            &paths.win_shares_path(view.name()),
            &shares,
            group_header,
        )?);
    }
    output::write_files(&files)?;
    info!(
        "Wrote the overall comparison table to '{}' and win shares for {} views.",
        paths.markdown_path().display(),
        ShareView::ALL.len()
    );
    Ok(())
}
