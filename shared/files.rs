//! On-disk layout of a study: where inputs are found and where every table is written.

use flate2::read::MultiGzDecoder;
use log::debug;
use natord::compare;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const SCHEMA_SUFFIX: &str = "_schema.json";
pub const TEST_KEY_SUFFIX: &str = "_test_key.csv";
pub const PREDICTIONS_FILE: &str = "predictions.csv";
pub const RAW_METRICS_FILE: &str = "all_metrics.csv";
pub const LOG_FILE: &str = "metrics_calculation.log";

/// Resolves every input and output path of a study from its two root directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyPaths {
    data_dir: PathBuf,
    results_dir: PathBuf,
}

impl StudyPaths {
    pub fn new(data_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            results_dir: results_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    // ------------------------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------------------------

    pub fn datasets_dir(&self) -> PathBuf {
        self.data_dir.join("datasets")
    }

    pub fn variant_dir(&self, variant: &str) -> PathBuf {
        self.datasets_dir().join(variant)
    }

    pub fn schema_path(&self, variant: &str) -> PathBuf {
        self.variant_dir(variant)
            .join(format!("{variant}{SCHEMA_SUFFIX}"))
    }

    /// The compressed test key when present, else the plain one. `None` when neither exists.
    pub fn test_key_path(&self, variant: &str) -> Option<PathBuf> {
        prefer_gzip(
            self.variant_dir(variant)
                .join(format!("{variant}{TEST_KEY_SUFFIX}")),
        )
    }

    /// The path the test key is expected at, for error messages.
    pub fn expected_test_key_path(&self, variant: &str) -> PathBuf {
        self.variant_dir(variant)
            .join(format!("{variant}{TEST_KEY_SUFFIX}"))
    }

    pub fn predictions_dir(&self, scenario_id: &str, model_id: &str, variant: &str) -> PathBuf {
        self.data_dir
            .join("predictions")
            .join(scenario_id)
            .join(model_id)
            .join(variant)
    }

    /// `predictions.csv.gz` when present, else `predictions.csv`.
    pub fn predictions_path(
        &self,
        scenario_id: &str,
        model_id: &str,
        variant: &str,
    ) -> Option<PathBuf> {
        prefer_gzip(self.expected_predictions_path(scenario_id, model_id, variant))
    }

    pub fn expected_predictions_path(
        &self,
        scenario_id: &str,
        model_id: &str,
        variant: &str,
    ) -> PathBuf {
        self.predictions_dir(scenario_id, model_id, variant)
            .join(PREDICTIONS_FILE)
    }

    /// Every dataset variant directory under `datasets/`, in natural order.
    pub fn discover_variants(&self) -> io::Result<Vec<String>> {
        let mut variants = Vec::new();
        for entry in fs::read_dir(self.datasets_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    variants.push(name.to_string());
                }
            }
        }
        variants.sort_by(|a, b| compare(a, b));
        Ok(variants)
    }

    // ------------------------------------------------------------------------------------
    // Outputs
    // ------------------------------------------------------------------------------------

    pub fn metrics_dir(&self) -> PathBuf {
        self.results_dir.join("metrics")
    }

    pub fn stats_dir(&self) -> PathBuf {
        self.results_dir.join("stats")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.results_dir.join("logs")
    }

    pub fn raw_metrics_path(&self) -> PathBuf {
        self.metrics_dir().join(RAW_METRICS_FILE)
    }

    pub fn summary_path(&self, granularity: &str) -> PathBuf {
        self.metrics_dir()
            .join(format!("{granularity}_metrics_summary.csv"))
    }

    pub fn pivoted_summary_path(&self, granularity: &str) -> PathBuf {
        self.metrics_dir()
            .join(format!("{granularity}_metrics_summary_pivoted.csv"))
    }

    pub fn markdown_path(&self) -> PathBuf {
        self.metrics_dir().join("overall_metrics.md")
    }

    pub fn win_shares_path(&self, view: &str) -> PathBuf {
        self.metrics_dir().join(format!("{view}_win_shares.csv"))
    }

    pub fn anova_path(&self) -> PathBuf {
        self.stats_dir().join("anova.csv")
    }

    pub fn ttest_path(&self, metric: &str, file: &str) -> PathBuf {
        self.stats_dir().join("ttest").join(metric).join(file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE)
    }
}

fn gzip_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

fn prefer_gzip(plain: PathBuf) -> Option<PathBuf> {
    let gz = gzip_sibling(&plain);
    if gz.is_file() {
        Some(gz)
    } else if plain.is_file() {
        Some(plain)
    } else {
        None
    }
}

pub fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Reads a whole input file, transparently decompressing `.gz`.
pub fn read_maybe_gzip(path: &Path) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut bytes = Vec::new();
    if is_gzip(path) {
        MultiGzDecoder::new(file).read_to_end(&mut bytes)?;
    } else {
        io::BufReader::new(file).read_to_end(&mut bytes)?;
    }
    debug!("Read {} bytes from '{}'", bytes.len(), path.display());
    Ok(bytes)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".partial");
    PathBuf::from(tmp_name)
}

fn write_partial(path: &Path, contents: &[u8]) -> io::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = partial_path(path);
    let result = (|| {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(contents)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(tmp_path)
}

/// Writes `contents` to a sibling temporary file and renames it over `path`, creating
/// parent directories as needed. A failed write leaves `path` untouched.
pub fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp_path = write_partial(path, contents)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    debug!("Wrote '{}'", path.display());
    Ok(())
}

/// One output file, fully encoded and waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl StagedFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Writes a set of files so that either all of them land or none of the batch is left
/// on disk.
///
/// Every file is first written to its temporary sibling. Only then are they renamed
/// into place. When a step fails, the temporary files and the targets already renamed
/// by this batch are removed. The error names the file that failed.
pub fn write_all_atomically(files: &[StagedFile]) -> Result<(), (PathBuf, io::Error)> {
    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(files.len());
    for file in files {
        match write_partial(&file.path, &file.contents) {
            Ok(tmp_path) => staged.push((tmp_path, file.path.as_path())),
            Err(e) => {
                for (tmp_path, _) in &staged {
                    let _ = fs::remove_file(tmp_path);
                }
                return Err((file.path.clone(), e));
            }
        }
    }

    for (done, (tmp_path, target)) in staged.iter().enumerate() {
        if let Err(e) = fs::rename(tmp_path, target) {
            for (_, committed) in &staged[..done] {
                let _ = fs::remove_file(committed);
            }
            for (pending, _) in &staged[done..] {
                let _ = fs::remove_file(pending);
            }
            return Err((target.to_path_buf(), e));
        }
    }
    debug!("Wrote {} files", files.len());
    Ok(())
}
