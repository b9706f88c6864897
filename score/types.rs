// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Separator between a dataset family and its fold number, e.g. `churn_fold_3`.
pub const FOLD_SEPARATOR: &str = "_fold_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidSchema {
    #[error("schema declares {0} target classes; at least two are required")]
    TooFewClasses(usize),
    #[error("schema declares the target class '{0}' more than once")]
    DuplicateClass(String),
}

/// The target schema of one dataset variant. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSchema {
    id_field: String,
    target_field: String,
    target_classes: Vec<String>,
}

impl DatasetSchema {
    pub fn new(
        id_field: impl Into<String>,
        target_field: impl Into<String>,
        target_classes: Vec<String>,
    ) -> Result<Self, InvalidSchema> {
        if target_classes.len() < 2 {
            return Err(InvalidSchema::TooFewClasses(target_classes.len()));
        }
        for (i, class) in target_classes.iter().enumerate() {
            if target_classes[..i].contains(class) {
                return Err(InvalidSchema::DuplicateClass(class.clone()));
            }
        }
        Ok(Self {
            id_field: id_field.into(),
            target_field: target_field.into(),
            target_classes,
        })
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn target_field(&self) -> &str {
        &self.target_field
    }

    pub fn target_classes(&self) -> &[String] {
        &self.target_classes
    }

    /// The designated positive label. Every other class is negative (one-vs-rest).
    pub fn positive_class(&self) -> &str {
        &self.target_classes[1]
    }
}

/// Ground truth for one dataset variant: one true label per test id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestKey {
    pub ids: Vec<String>,
    pub labels: Vec<String>,
}

/// Predicted class probabilities for one (scenario, dataset variant, model) triple.
///
/// `class_columns` holds only the columns whose header matched a class named in the
/// dataset schema, in the order they appeared in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSet {
    pub ids: Vec<String>,
    pub class_columns: Vec<(String, Vec<f64>)>,
    pub decision_threshold: Option<Vec<f64>>,
}

impl PredictionSet {
    pub fn column(&self, class: &str) -> Option<&[f64]> {
        self.class_columns
            .iter()
            .find(|(name, _)| name == class)
            .map(|(_, values)| values.as_slice())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Whether a larger or a smaller metric value is the better one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "max")]
    HigherIsBetter,
    #[serde(rename = "min")]
    LowerIsBetter,
}

/// The fixed metric set produced by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "Accuracy")]
    Accuracy,
    #[serde(rename = "MCC")]
    Mcc,
    #[serde(rename = "Precision")]
    Precision,
    #[serde(rename = "Recall")]
    Recall,
    #[serde(rename = "F1-score")]
    F1,
    #[serde(rename = "F2-score")]
    F2,
    #[serde(rename = "AUC")]
    Auc,
    #[serde(rename = "PR-AUC")]
    PrAuc,
    #[serde(rename = "Log-Loss")]
    LogLoss,
    #[serde(rename = "Brier-Score")]
    Brier,
}

impl Metric {
    pub const COUNT: usize = 10;

    /// Column layout of the raw metrics table. Also the storage order of `MetricValues`.
    pub const RAW_LAYOUT: [Metric; Metric::COUNT] = [
        Metric::Accuracy,
        Metric::Mcc,
        Metric::Precision,
        Metric::Recall,
        Metric::F1,
        Metric::F2,
        Metric::Auc,
        Metric::PrAuc,
        Metric::LogLoss,
        Metric::Brier,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Accuracy => "Accuracy",
            Metric::Mcc => "MCC",
            Metric::Precision => "Precision",
            Metric::Recall => "Recall",
            Metric::F1 => "F1-score",
            Metric::F2 => "F2-score",
            Metric::Auc => "AUC",
            Metric::PrAuc => "PR-AUC",
            Metric::LogLoss => "Log-Loss",
            Metric::Brier => "Brier-Score",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Metric::RAW_LAYOUT.into_iter().find(|m| m.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }

    pub fn default_direction(self) -> Direction {
        match self {
            Metric::LogLoss | Metric::Brier => Direction::LowerIsBetter,
            _ => Direction::HigherIsBetter,
        }
    }

    /// Closed value range of a well-defined metric.
    pub fn bounds(self) -> (f64, f64) {
        match self {
            Metric::Mcc => (-1.0, 1.0),
            Metric::LogLoss => (0.0, f64::INFINITY),
            _ => (0.0, 1.0),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per metric, stored in `Metric::RAW_LAYOUT` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricValues([f64; Metric::COUNT]);

impl MetricValues {
    pub fn filled(value: f64) -> Self {
        Self([value; Metric::COUNT])
    }

    pub fn get(&self, metric: Metric) -> f64 {
        self.0[metric.index()]
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        self.0[metric.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::RAW_LAYOUT.into_iter().map(|m| (m, self.get(m)))
    }
}

/// A dataset variant identifier split into its family and fold number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetVariant {
    pub id: String,
    pub family: String,
    pub fold: u32,
}

impl DatasetVariant {
    pub fn new(family: &str, fold: u32) -> Self {
        Self {
            id: format!("{family}{FOLD_SEPARATOR}{fold}"),
            family: family.to_string(),
            fold,
        }
    }

    /// Parses `<family>_fold_<n>`. Returns `None` when the suffix is absent or not a number.
    pub fn parse(id: &str) -> Option<Self> {
        let (family, fold) = id.rsplit_once(FOLD_SEPARATOR)?;
        if family.is_empty() || fold.is_empty() || !fold.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            id: id.to_string(),
            family: family.to_string(),
            fold: fold.parse().ok()?,
        })
    }
}

impl fmt::Display for DatasetVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// One row of the raw metrics table.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub scenario: String,
    pub dataset: String,
    pub fold: u32,
    pub model: String,
    pub values: MetricValues,
}

impl MetricRecord {
    /// Dataset identifier with the fold suffix stripped.
    pub fn family(&self) -> &str {
        self.dataset
            .rsplit_once(FOLD_SEPARATOR)
            .map_or(self.dataset.as_str(), |(family, _)| family)
    }
}
