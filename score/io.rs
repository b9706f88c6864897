// ========================================================================================
//
//                             Study Inputs and the Raw Table
//
// ========================================================================================
//
// ### Purpose ###
//
// Every byte the scorer consumes enters through this module: the per-variant schema
// (JSON), the per-variant test key and the per-cell prediction tables (CSV, optionally
// gzip-compressed). It also owns the codec of the raw metrics table, the one file that
// later stages read back instead of recomputing.
//
// Failures here are assumed to be problems with the study's files, so `DataError`
// always names the offending path and column.

use crate::shared::files::{read_maybe_gzip, write_atomically};
use crate::decide::DECISION_THRESHOLD_COLUMN;
use crate::types::{
    DatasetSchema, DatasetVariant, InvalidSchema, Metric, MetricRecord, MetricValues,
    PredictionSet, TestKey,
};
use log::debug;
use polars::prelude::*;
use serde::Deserialize;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Key columns of the raw metrics table, followed by `Metric::RAW_LAYOUT`.
pub const RAW_KEY_COLUMNS: [&str; 3] = ["Scenario", "Dataset_Fold", "Model"];

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to parse the dataset schema '{path}': {source}")]
    SchemaJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("The dataset schema '{path}' is invalid: {source}")]
    InvalidSchema {
        path: PathBuf,
        #[source]
        source: InvalidSchema,
    },
    #[error(
        "The dataset schema '{path}' lists the class label {value}; labels must be strings or numbers."
    )]
    ClassLabel { path: PathBuf, value: String },
    #[error("The required column '{column}' was not found in '{path}'.")]
    ColumnNotFound { path: PathBuf, column: String },
    #[error("Missing values were found in the column '{column}' of '{path}'.")]
    MissingValues { path: PathBuf, column: String },
    #[error("The column '{column}' of '{path}' could not be read as {expected}.")]
    ColumnWrongType {
        path: PathBuf,
        column: String,
        expected: &'static str,
    },
    #[error("Non-finite values (NaN or Infinity) were found in the column '{column}' of '{path}'.")]
    NonFiniteValues { path: PathBuf, column: String },
    #[error("The header of '{path}' does not match the raw metrics layout. Expected [{expected}], found [{found}].")]
    RawHeader {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("Row {row} of '{path}': '{value}' is not a valid value for '{column}'.")]
    RawValue {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },
    #[error("'{0}' is not a dataset variant identifier of the form <family>_fold_<n>.")]
    InvalidVariant(String),
}

// ========================================================================================
//                                    Dataset schema
// ========================================================================================

#[derive(Deserialize)]
struct SchemaFile {
    id: NamedField,
    target: TargetField,
}

#[derive(Deserialize)]
struct NamedField {
    name: String,
}

#[derive(Deserialize)]
struct TargetField {
    name: String,
    classes: Vec<serde_json::Value>,
}

/// Loads `<variant>_schema.json`. Numeric class labels are kept as their JSON text.
pub fn load_schema(path: &Path) -> Result<DatasetSchema, DataError> {
    let text = fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: SchemaFile =
        serde_json::from_str(&text).map_err(|source| DataError::SchemaJson {
            path: path.to_path_buf(),
            source,
        })?;

    let classes = file
        .target
        .classes
        .into_iter()
        .map(|value| match value {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            other => Err(DataError::ClassLabel {
                path: path.to_path_buf(),
                value: other.to_string(),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    DatasetSchema::new(file.id.name, file.target.name, classes).map_err(|source| {
        DataError::InvalidSchema {
            path: path.to_path_buf(),
            source,
        }
    })
}

// ========================================================================================
//                               Test keys and predictions
// ========================================================================================

/// Loads the test key, keeping only the schema's id and target columns.
pub fn load_test_key(path: &Path, schema: &DatasetSchema) -> Result<TestKey, DataError> {
    let df = read_csv_frame(path)?;
    require_columns(&df, path, &[schema.id_field(), schema.target_field()])?;
    Ok(TestKey {
        ids: extract_string_column(&df, path, schema.id_field())?,
        labels: extract_string_column(&df, path, schema.target_field())?,
    })
}

/// Loads a prediction table. Only columns named after a schema class (plus the id and
/// the optional `decision_threshold`) are read; any other column is ignored.
pub fn load_predictions(path: &Path, schema: &DatasetSchema) -> Result<PredictionSet, DataError> {
    let df = read_csv_frame(path)?;
    require_columns(&df, path, &[schema.id_field()])?;

    let headers: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mut class_columns = Vec::new();
    for header in &headers {
        if schema.target_classes().iter().any(|class| class == header) {
            let values = extract_probability_column(&df, path, header)?;
            class_columns.push((header.clone(), values));
        }
    }

    let decision_threshold = if headers.iter().any(|h| h == DECISION_THRESHOLD_COLUMN) {
        Some(extract_probability_column(
            &df,
            path,
            DECISION_THRESHOLD_COLUMN,
        )?)
    } else {
        None
    };

    debug!(
        "Loaded {} predictions with {} class columns from '{}'",
        df.height(),
        class_columns.len(),
        path.display()
    );

    Ok(PredictionSet {
        ids: extract_string_column(&df, path, schema.id_field())?,
        class_columns,
        decision_threshold,
    })
}

fn read_csv_frame(path: &Path) -> Result<DataFrame, DataError> {
    let bytes = read_maybe_gzip(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let df = CsvReader::new(Cursor::new(bytes))
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(None)
                .with_parse_options(CsvParseOptions::default().with_separator(b',')),
        )
        .finish()?;
    Ok(df)
}

fn require_columns(df: &DataFrame, path: &Path, columns: &[&str]) -> Result<(), DataError> {
    let present = df.get_column_names();
    for column in columns {
        if !present.iter().any(|name| name.as_str() == *column) {
            return Err(DataError::ColumnNotFound {
                path: path.to_path_buf(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

fn extract_string_column(
    df: &DataFrame,
    path: &Path,
    column_name: &str,
) -> Result<Vec<String>, DataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValues {
            path: path.to_path_buf(),
            column: column_name.to_string(),
        });
    }
    let casted = series
        .cast(&DataType::String)
        .map_err(|_| DataError::ColumnWrongType {
            path: path.to_path_buf(),
            column: column_name.to_string(),
            expected: "text",
        })?;
    let values = casted
        .str()?
        .into_iter()
        .map(|value| value.unwrap_or_default().to_string())
        .collect();
    Ok(values)
}

fn extract_probability_column(
    df: &DataFrame,
    path: &Path,
    column_name: &str,
) -> Result<Vec<f64>, DataError> {
    let wrong_type = || DataError::ColumnWrongType {
        path: path.to_path_buf(),
        column: column_name.to_string(),
        expected: "f64 (numeric)",
    };

    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValues {
            path: path.to_path_buf(),
            column: column_name.to_string(),
        });
    }
    let casted = series.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    // A failed string-to-float cast surfaces as nulls rather than an error.
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }

    let chunked = casted.f64()?.rechunk();
    let values: Vec<f64> = chunked.into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValues {
            path: path.to_path_buf(),
            column: column_name.to_string(),
        });
    }
    Ok(values)
}

// ========================================================================================
//                                  Raw metrics table
// ========================================================================================

pub fn raw_header() -> Vec<&'static str> {
    RAW_KEY_COLUMNS
        .into_iter()
        .chain(Metric::RAW_LAYOUT.iter().map(|m| m.name()))
        .collect()
}

/// Renders a metric value for a table cell. `NaN` becomes an empty field.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Persists the raw metrics table in the fixed column layout.
pub fn write_raw_metrics(path: &Path, records: &[MetricRecord]) -> Result<(), DataError> {
    let csv_error = |source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(raw_header()).map_err(csv_error)?;
    for record in records {
        let mut row = vec![
            record.scenario.clone(),
            record.dataset.clone(),
            record.model.clone(),
        ];
        row.extend(record.values.iter().map(|(_, value)| format_value(value)));
        writer.write_record(&row).map_err(csv_error)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv_error(csv::Error::from(e.into_error())))?;

    write_atomically(path, &bytes).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a raw metrics table written by `write_raw_metrics`.
pub fn read_raw_metrics(path: &Path) -> Result<Vec<MetricRecord>, DataError> {
    let csv_error = |source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let header: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(str::to_string)
        .collect();
    let expected = raw_header();
    if header != expected {
        return Err(DataError::RawHeader {
            path: path.to_path_buf(),
            expected: expected.join(", "),
            found: header.join(", "),
        });
    }

    let mut records = Vec::new();
    for (row_idx, row) in reader.records().enumerate() {
        let row = row.map_err(csv_error)?;
        let row_number = row_idx + 2;
        let dataset = row[1].to_string();
        let variant =
            DatasetVariant::parse(&dataset).ok_or_else(|| DataError::InvalidVariant(dataset.clone()))?;

        let mut values = MetricValues::filled(f64::NAN);
        for (offset, metric) in Metric::RAW_LAYOUT.into_iter().enumerate() {
            let cell = row[RAW_KEY_COLUMNS.len() + offset].trim();
            if cell.is_empty() {
                continue;
            }
            let value = cell.parse::<f64>().map_err(|_| DataError::RawValue {
                path: path.to_path_buf(),
                row: row_number,
                column: metric.name().to_string(),
                value: cell.to_string(),
            })?;
            values.set(metric, value);
        }

        records.push(MetricRecord {
            scenario: row[0].to_string(),
            dataset,
            fold: variant.fold,
            model: row[2].to_string(),
            values,
        });
    }
    Ok(records)
}
