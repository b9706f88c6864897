//! Significance tests of the scenario effect, per metric.

pub mod anova;
pub mod reshape;
pub mod ttest;

use crate::io::format_value;
use crate::shared::config::StudyConfig;
use crate::shared::files::{StagedFile, StudyPaths, write_all_atomically};
use crate::types::{Metric, MetricRecord};
use log::info;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error(
        "Unbalanced design for {metric}: dataset '{subject}' has no '{scenario}' results. Every dataset must be scored under every scenario."
    )]
    Unbalanced {
        metric: Metric,
        subject: String,
        scenario: String,
    },
    #[error(
        "A repeated-measures ANOVA of {metric} needs at least two datasets and two scenarios, found {subjects} and {groups}."
    )]
    TooSmall {
        metric: Metric,
        subjects: usize,
        groups: usize,
    },
    #[error("A paired t-test needs at least two pairs, found {0}.")]
    TooFewPairs(usize),
    #[error("Invalid test distribution: {0}")]
    Distribution(String),
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
}

fn encode_table(
    path: &Path,
    header: &[String],
    rows: &[Vec<String>],
) -> Result<StagedFile, StatsError> {
    let csv_error = |source| StatsError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header).map_err(csv_error)?;
    for row in rows {
        writer.write_record(row).map_err(csv_error)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv_error(csv::Error::from(e.into_error())))?;
    Ok(StagedFile::new(path, bytes))
}

/// Runs the ANOVA and the pairwise t-tests for every presentation metric and writes
/// `stats/anova.csv` plus `stats/ttest/<metric>/{t_stat,p_value}.csv`.
///
/// Every test is computed before the first file is written, and a failed write leaves
/// none of the stage's files behind.
pub fn run(
    config: &StudyConfig,
    paths: &StudyPaths,
    records: &[MetricRecord],
) -> Result<(), StatsError> {
    let matrices = reshape::scenario_matrices(records, config)?;

    let mut anova_rows = Vec::with_capacity(matrices.len());
    let mut pairwise = Vec::with_capacity(matrices.len());
    for matrix in &matrices {
        let result = anova::repeated_measures_anova(matrix)?;
        info!(
            "{}: F({}, {}) = {:.4}, p = {:.4}",
            matrix.metric, result.df_groups, result.df_error, result.f_value, result.p_value
        );
        anova_rows.push(vec![
            matrix.metric.name().to_string(),
            format_value(result.p_value),
        ]);
        pairwise.push((matrix.metric, ttest::pairwise_tests(matrix)?));
    }

    let anova_header = ["metric", "P-Value"].map(String::from);
    let mut files = vec![encode_table(&paths.anova_path(), &anova_header, &anova_rows)?];
    for (metric, table) in &pairwise {
        let (header, rows) = table.render(|t| t.t_stat);
        files.push(encode_table(&paths.ttest_path(metric.name(), "t_stat.csv"), &header, &rows)?);
        let (header, rows) = table.render(|t| t.p_value);
        files.push(encode_table(&paths.ttest_path(metric.name(), "p_value.csv"), &header, &rows)?);
    }
    write_all_atomically(&files).map_err(|(path, source)| StatsError::Io { path, source })?;
    info!(
        "Wrote statistical tests for {} metrics under '{}'.",
        pairwise.len(),
        paths.stats_dir().display()
    );
    Ok(())
}
