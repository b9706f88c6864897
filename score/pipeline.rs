use crate::io::{self, DataError};
use crate::scorer::{CellContext, ScoreError, ScoreOptions, score};
use crate::shared::config::{NamedEntry, StudyConfig};
use crate::shared::files::StudyPaths;
use crate::types::{DatasetSchema, DatasetVariant, MetricRecord, TestKey};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use std::io::IsTerminal;
use std::path::PathBuf;
use thiserror::Error;

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    let style = ProgressStyle::with_template(
        "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .map(|style| style.progress_chars("█▉▊▋▌▍▎▏  "))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());

    pb
}

// ========================================================================================
//                          Public API, context & error handling
// ========================================================================================

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("{context} {source}")]
    Score {
        context: String,
        #[source]
        source: ScoreError,
    },
    #[error(
        "No test key was found for dataset variant '{variant}'. Expected '{path}' or its .gz sibling."
    )]
    MissingTestKey { variant: String, path: PathBuf },
    #[error(
        "No predictions were found for {context}. Expected '{path}' or its .gz sibling."
    )]
    MissingPredictions { context: String, path: PathBuf },
    #[error("Failed to list dataset variants under '{path}': {source}")]
    Discover {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No dataset variants were found to score.")]
    NoDatasets,
    #[error("Failed to build the scoring thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// The dataset variants of the study in driver order: each configured family expanded
/// over folds `1..=folds`, or every variant directory on disk when no family is listed.
pub fn dataset_variants(
    config: &StudyConfig,
    paths: &StudyPaths,
) -> Result<Vec<DatasetVariant>, PipelineError> {
    let variants = if config.datasets.families.is_empty() {
        let found = paths
            .discover_variants()
            .map_err(|source| PipelineError::Discover {
                path: paths.datasets_dir(),
                source,
            })?;
        found
            .into_iter()
            .map(|id| DatasetVariant::parse(&id).ok_or(DataError::InvalidVariant(id)))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        config
            .datasets
            .families
            .iter()
            .flat_map(|family| {
                (1..=config.datasets.folds).map(move |fold| DatasetVariant::new(family, fold))
            })
            .collect()
    };

    if variants.is_empty() {
        return Err(PipelineError::NoDatasets);
    }
    Ok(variants)
}

/// Scores every (dataset variant, scenario, model) cell of the study.
///
/// Records come back in nested order: dataset variant (outer), then scenario, then
/// model, regardless of `workers`. The first failing cell aborts the whole run.
pub fn run(config: &StudyConfig, paths: &StudyPaths) -> Result<Vec<MetricRecord>, PipelineError> {
    let variants = dataset_variants(config, paths)?;
    let total_cells = variants.len() * config.scenarios.len() * config.models.len();
    info!(
        "Scoring {} cells from '{}': {} dataset variants x {} scenarios x {} models.",
        total_cells,
        paths.data_dir().display(),
        variants.len(),
        config.scenarios.len(),
        config.models.len()
    );

    let pb = create_progress_bar(total_cells as u64, "Calculating metrics...");
    let options = config.score_options();
    let workers = config.worker_count();

    let per_variant: Vec<Vec<MetricRecord>> = if workers <= 1 {
        variants
            .iter()
            .map(|variant| score_variant(config, paths, variant, options, &pb))
            .collect::<Result<_, _>>()?
    } else {
        info!("Scoring on {workers} threads.");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()?;
        pool.install(|| {
            variants
                .par_iter()
                .map(|variant| score_variant(config, paths, variant, options, &pb))
                .collect::<Result<_, _>>()
        })?
    };

    pb.finish_with_message("Metric calculation complete.");
    Ok(per_variant.into_iter().flatten().collect())
}

/// Runs the driver and persists the raw metrics table. The table is only written once
/// every cell has been scored.
pub fn run_and_persist(
    config: &StudyConfig,
    paths: &StudyPaths,
) -> Result<Vec<MetricRecord>, PipelineError> {
    let records = run(config, paths)?;
    let path = paths.raw_metrics_path();
    io::write_raw_metrics(&path, &records)?;
    info!("Wrote {} metric rows to '{}'.", records.len(), path.display());
    Ok(records)
}

/// Scores all cells of one dataset variant. The schema and test key are loaded once
/// and shared by every (scenario, model) pair.
fn score_variant(
    config: &StudyConfig,
    paths: &StudyPaths,
    variant: &DatasetVariant,
    options: ScoreOptions,
    pb: &ProgressBar,
) -> Result<Vec<MetricRecord>, PipelineError> {
    let schema = io::load_schema(&paths.schema_path(&variant.id))?;
    let key_path =
        paths
            .test_key_path(&variant.id)
            .ok_or_else(|| PipelineError::MissingTestKey {
                variant: variant.id.clone(),
                path: paths.expected_test_key_path(&variant.id),
            })?;
    let test_key = io::load_test_key(&key_path, &schema)?;
    if test_key.ids.is_empty() {
        warn!("Test key for '{}' has no rows.", variant.id);
    }

    let mut records = Vec::with_capacity(config.scenarios.len() * config.models.len());
    for scenario in &config.scenarios {
        for model in &config.models {
            records.push(score_cell(
                paths, variant, scenario, model, &schema, &test_key, options,
            )?);
            pb.inc(1);
        }
    }
    Ok(records)
}

fn score_cell(
    paths: &StudyPaths,
    variant: &DatasetVariant,
    scenario: &NamedEntry,
    model: &NamedEntry,
    schema: &DatasetSchema,
    test_key: &TestKey,
    options: ScoreOptions,
) -> Result<MetricRecord, PipelineError> {
    let context = CellContext {
        dataset: &variant.id,
        scenario: &scenario.id,
        model: &model.id,
    };

    let predictions_path = paths
        .predictions_path(&scenario.id, &model.id, &variant.id)
        .ok_or_else(|| PipelineError::MissingPredictions {
            context: context.to_string(),
            path: paths.expected_predictions_path(&scenario.id, &model.id, &variant.id),
        })?;
    let predictions = io::load_predictions(&predictions_path, schema)?;

    let values = score(schema, test_key, &predictions, context, options).map_err(|source| {
        PipelineError::Score {
            context: context.to_string(),
            source,
        }
    })?;

    Ok(MetricRecord {
        scenario: scenario.name.clone(),
        dataset: variant.id.clone(),
        fold: variant.fold,
        model: model.name.clone(),
        values,
    })
}
