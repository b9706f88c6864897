#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use balancebench::io::read_raw_metrics;
use balancebench::pipeline;
use balancebench::shared::config::StudyConfig;
use balancebench::shared::files::StudyPaths;
use balancebench::stats;
use balancebench::summarize;
use balancebench::types::MetricRecord;
use clap::{Args, CommandFactory, Parser, Subcommand};
use log::info;
use std::fs::{self, File};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "balancebench",
    about = "Evaluation pipeline for class-imbalance benchmarking experiments",
    long_about = "Scores model predictions against held-out test keys, summarises the metrics \
                  across folds, compares imbalance-handling scenarios and tests them for \
                  significance."
)]
struct Cli {
    #[command(flatten)]
    study: StudyArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct StudyArgs {
    /// TOML study configuration. The built-in study definition is used when omitted
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding datasets/ and predictions/ (overrides the configuration)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Directory receiving metrics/, stats/ and logs/ (overrides the configuration)
    #[arg(long, global = true, value_name = "DIR")]
    results_dir: Option<PathBuf>,

    /// Also log to a file; without a value, logs/metrics_calculation.log under the results
    #[arg(long, global = true, value_name = "PATH", num_args = 0..=1)]
    log_file: Option<Option<PathBuf>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every (scenario, model, dataset variant) cell into metrics/all_metrics.csv
    #[command(about = "Compute the raw metrics table")]
    Metrics,

    /// Aggregate the raw metrics table at every granularity
    #[command(about = "Write mean ± std summaries and their pivoted tables")]
    Summarize,

    /// Render the markdown comparison table and the win shares
    #[command(about = "Write the overall markdown table and scenario win shares")]
    Report,

    /// Run the repeated-measures ANOVA and the paired t-tests
    #[command(about = "Test the scenario effect for significance")]
    Stats,

    /// Run every stage in order
    #[command(about = "Run metrics, summarize, report and stats")]
    All,
}

fn main() {
    let Cli { study, command } = Cli::parse();

    let Some(command) = command else {
        if Cli::command().print_help().is_err() {
            process::exit(1);
        }
        println!();
        return;
    };

    if let Err(e) = run(study, command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(study: StudyArgs, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &study.config {
        Some(path) => StudyConfig::from_toml_file(path)?,
        None => StudyConfig::default(),
    };
    if let Some(dir) = study.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = study.results_dir {
        config.results_dir = dir;
    }
    let paths = StudyPaths::new(config.data_dir.clone(), config.results_dir.clone());

    let log_file = study
        .log_file
        .map(|path| path.unwrap_or_else(|| paths.log_path()));
    init_logging(log_file)?;

    match command {
        Commands::Metrics => {
            pipeline::run_and_persist(&config, &paths)?;
        }
        Commands::Summarize => {
            let records = load_raw(&paths)?;
            summarize::summarize(&config, &paths, &records)?;
        }
        Commands::Report => {
            let records = load_raw(&paths)?;
            summarize::report(&config, &paths, &records)?;
        }
        Commands::Stats => {
            let records = load_raw(&paths)?;
            stats::run(&config, &paths, &records)?;
        }
        Commands::All => {
            let records = pipeline::run_and_persist(&config, &paths)?;
            summarize::summarize(&config, &paths, &records)?;
            summarize::report(&config, &paths, &records)?;
            stats::run(&config, &paths, &records)?;
        }
    }
    info!("Done. Results are under '{}'.", paths.results_dir().display());
    Ok(())
}

fn load_raw(paths: &StudyPaths) -> Result<Vec<MetricRecord>, Box<dyn std::error::Error>> {
    let path = paths.raw_metrics_path();
    let records = read_raw_metrics(&path)?;
    info!("Loaded {} metric rows from '{}'.", records.len(), path.display());
    Ok(records)
}

/// Logs to stderr, or to `log_file` when one is given. The level comes from `RUST_LOG`
/// and defaults to `info`.
fn init_logging(log_file: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::options().create(true).append(true).open(&path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}
