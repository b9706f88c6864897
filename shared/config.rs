//! # Study Configuration
//!
//! The single, immutable description of a benchmarking study: which scenarios and
//! models were run, which dataset variants exist, how metrics are presented, and where
//! inputs and outputs live. Every stage receives a `&StudyConfig` explicitly; nothing
//! reads configuration from globals.
//!
//! The canonical orders (scenarios, models, metrics) are the order of the lists here.
//! Aggregation, pivoting, win shares and the statistical tests all consume them through
//! the rank lookups below, so a table can never disagree with another about ordering.

use crate::scorer::ScoreOptions;
use crate::types::{Direction, FOLD_SEPARATOR, Metric};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("The configuration lists no {0}; at least one is required.")]
    Empty(&'static str),
    #[error("The {kind} '{value}' appears more than once in the configuration.")]
    Duplicate { kind: &'static str, value: String },
    #[error("The fold count must be at least 1.")]
    NoFolds,
    #[error(
        "Dataset family '{0}' already carries a fold suffix; list families without the '_fold_<n>' suffix."
    )]
    FamilyWithFold(String),
    #[error("Summary precision {0} is out of range; use 0 to 12 decimal places.")]
    Precision(usize),
}

/// An item with a file-system id and a display name used in every produced table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedEntry {
    pub id: String,
    pub name: String,
}

impl NamedEntry {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

/// Dataset families and the fold count each one was split into.
///
/// An empty family list means "every variant directory found under the data
/// directory", in natural order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetPlan {
    pub families: Vec<String>,
    pub folds: u32,
}

impl Default for DatasetPlan {
    fn default() -> Self {
        Self {
            families: Vec::new(),
            folds: 5,
        }
    }
}

/// One entry of the presentation metric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricPresentation {
    pub metric: Metric,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StudyConfig {
    pub scenarios: Vec<NamedEntry>,
    pub models: Vec<NamedEntry>,
    pub datasets: DatasetPlan,
    /// Presentation order of the metrics in every summary. Metrics left out are still
    /// scored and kept in the raw table.
    pub metrics: Vec<MetricPresentation>,
    /// Decimal places in the `mean ± std` presentation strings.
    pub summary_precision: usize,
    /// Treat any id without a partner on the other side of the join as an error.
    pub strict_join: bool,
    /// Scoring threads. `1` runs sequentially, `0` uses one thread per CPU.
    pub workers: usize,
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
}

impl Default for StudyConfig {
    fn default() -> Self {
        let scenarios = [
            ("baseline", "Baseline"),
            ("class_weights", "Class Weights"),
            ("decision_threshold", "Decision Threshold"),
            ("smote", "SMOTE"),
        ];
        let models = [
            ("rt_bin_class_adaboost_sklearn", "AdaBoost"),
            ("rt_bin_class_bagging_sklearn", "Bagging Classifier"),
            ("rt_bin_class_decision_tree_sklearn", "Decision Tree"),
            ("rt_bin_class_extra_trees_sklearn", "Extra Trees"),
            ("rt_bin_class_gradient_boosting_sklearn", "Gradient Boosting"),
            ("rt_bin_class_lightgbm", "LightGBM"),
            ("rt_bin_class_logistic_regression_sklearn", "Logistic Regression"),
            ("rt_bin_class_rf_hyperopt", "Random Forest"),
            ("rt_bin_class_simple_ann_pt_gpu", "Simple ANN"),
            ("rt_bin_class_svc_sklearn", "SVM"),
            ("rt_bin_class_xgboost", "XGBoost"),
        ];
        let metrics = [
            Metric::Accuracy,
            Metric::Auc,
            Metric::PrAuc,
            Metric::Precision,
            Metric::Recall,
            Metric::F1,
            Metric::F2,
            Metric::Mcc,
            Metric::LogLoss,
            Metric::Brier,
        ];

        Self {
            scenarios: scenarios
                .iter()
                .map(|(id, name)| NamedEntry::new(id, name))
                .collect(),
            models: models
                .iter()
                .map(|(id, name)| NamedEntry::new(id, name))
                .collect(),
            datasets: DatasetPlan::default(),
            metrics: metrics
                .into_iter()
                .map(|metric| MetricPresentation {
                    metric,
                    direction: metric.default_direction(),
                })
                .collect(),
            summary_precision: 3,
            strict_join: false,
            workers: 1,
            data_dir: PathBuf::from("inputs"),
            results_dir: PathBuf::from("results"),
        }
    }
}

impl StudyConfig {
    /// Loads a configuration file. Fields absent from the file keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: StudyConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scenarios.is_empty() {
            return Err(ConfigError::Empty("scenarios"));
        }
        if self.models.is_empty() {
            return Err(ConfigError::Empty("models"));
        }
        if self.metrics.is_empty() {
            return Err(ConfigError::Empty("metrics"));
        }
        if self.datasets.folds == 0 {
            return Err(ConfigError::NoFolds);
        }
        if self.summary_precision > 12 {
            return Err(ConfigError::Precision(self.summary_precision));
        }

        check_unique("scenario id", self.scenarios.iter().map(|s| s.id.as_str()))?;
        check_unique("scenario name", self.scenarios.iter().map(|s| s.name.as_str()))?;
        check_unique("model id", self.models.iter().map(|m| m.id.as_str()))?;
        check_unique("model name", self.models.iter().map(|m| m.name.as_str()))?;
        check_unique("dataset family", self.datasets.families.iter().map(String::as_str))?;
        check_unique("metric", self.metrics.iter().map(|m| m.metric.name()))?;

        if let Some(family) = self
            .datasets
            .families
            .iter()
            .find(|family| family.contains(FOLD_SEPARATOR))
        {
            return Err(ConfigError::FamilyWithFold(family.clone()));
        }
        Ok(())
    }

    /// Position of a scenario display name in the canonical scenario order.
    pub fn scenario_rank(&self, name: &str) -> Option<usize> {
        self.scenarios.iter().position(|s| s.name == name)
    }

    /// Position of a model display name in the canonical model order.
    pub fn model_rank(&self, name: &str) -> Option<usize> {
        self.models.iter().position(|m| m.name == name)
    }

    /// Position of a metric in the presentation order.
    pub fn metric_rank(&self, metric: Metric) -> Option<usize> {
        self.metrics.iter().position(|m| m.metric == metric)
    }

    pub fn scenario_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.scenarios.iter().map(|s| s.name.as_str())
    }

    pub fn metric_order(&self) -> impl Iterator<Item = Metric> + '_ {
        self.metrics.iter().map(|m| m.metric)
    }

    /// Direction configured for `metric`, falling back to its natural direction.
    pub fn direction(&self, metric: Metric) -> Direction {
        self.metrics
            .iter()
            .find(|m| m.metric == metric)
            .map_or(metric.default_direction(), |m| m.direction)
    }

    pub fn score_options(&self) -> ScoreOptions {
        ScoreOptions {
            strict_join: self.strict_join,
            ..ScoreOptions::default()
        }
    }

    /// Effective number of scoring threads.
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

fn check_unique<'a>(
    kind: &'static str,
    values: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen: Vec<&str> = Vec::new();
    for value in values {
        if seen.contains(&value) {
            return Err(ConfigError::Duplicate {
                kind,
                value: value.to_string(),
            });
        }
        seen.push(value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid_and_canonical() {
        let config = StudyConfig::default();
        config.validate().unwrap();
        let scenarios: Vec<&str> = config.scenario_names().collect();
        assert_eq!(
            scenarios,
            vec!["Baseline", "Class Weights", "Decision Threshold", "SMOTE"]
        );
        assert_eq!(config.model_rank("AdaBoost"), Some(0));
        assert_eq!(config.model_rank("XGBoost"), Some(10));
        assert_eq!(config.model_rank("Naive Bayes"), None);
        assert_eq!(config.metric_rank(Metric::Accuracy), Some(0));
        assert_eq!(config.direction(Metric::Brier), Direction::LowerIsBetter);
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_fields() {
        let config = StudyConfig::from_toml_str(
            r#"
            strict_join = true
            workers = 4

            [datasets]
            families = ["bank", "churn"]
            folds = 3
            "#,
        )
        .unwrap();
        assert!(config.strict_join);
        assert_eq!(config.worker_count(), 4);
        assert_eq!(config.datasets.folds, 3);
        assert_eq!(config.scenarios.len(), 4);
        assert_eq!(config.summary_precision, 3);
    }

    #[test]
    fn metric_directions_parse_from_short_names() {
        let config = StudyConfig::from_toml_str(
            r#"
            [[metrics]]
            metric = "Log-Loss"
            direction = "min"

            [[metrics]]
            metric = "F1-score"
            direction = "max"
            "#,
        )
        .unwrap();
        let order: Vec<Metric> = config.metric_order().collect();
        assert_eq!(order, vec![Metric::LogLoss, Metric::F1]);
        assert_eq!(config.direction(Metric::LogLoss), Direction::LowerIsBetter);
        // Not listed: natural direction.
        assert_eq!(config.direction(Metric::Auc), Direction::HigherIsBetter);
    }

    #[test]
    fn duplicates_and_fold_suffixed_families_are_rejected() {
        let err = StudyConfig::from_toml_str(
            r#"
            [[models]]
            id = "a"
            name = "Same"

            [[models]]
            id = "b"
            name = "Same"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate { kind: "model name", .. }));

        let err = StudyConfig::from_toml_str(
            r#"
            [datasets]
            families = ["bank_fold_1"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::FamilyWithFold(f) if f == "bank_fold_1"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            StudyConfig::from_toml_str("colour = \"blue\"").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}
