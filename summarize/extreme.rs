//! Locates the best (or worst) cells of a text table, per row or per column.
//!
//! Cells may hold plain numbers or `"mean ± std"` strings; only the mean takes part in
//! the comparison. Every cell tied for the extreme value is reported.

use crate::summarize::pivot::PivotedTable;
use crate::types::Direction;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExtremeError {
    #[error("The table has no column named '{0}'.")]
    UnknownColumn(String),
    #[error("Row {row} has {found} cells but the table has {expected} columns.")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
}

/// A rectangular table of display strings with named columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, ExtremeError> {
        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != columns.len() {
                return Err(ExtremeError::RaggedRow {
                    row,
                    found: cells.len(),
                    expected: columns.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Index columns followed by scenario columns, one row per pivoted row.
    pub fn from_pivot(table: &PivotedTable) -> Self {
        let rows = table
            .rows
            .iter()
            .map(|row| {
                let mut cells = table.index_values(row);
                cells.extend(row.cells.iter().cloned());
                cells
            })
            .collect();
        Self {
            columns: table.header(),
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    pub fn cell_mut(&mut self, row: usize, column: usize) -> Option<&mut String> {
        self.rows.get_mut(row)?.get_mut(column)
    }

    fn column_index(&self, name: &str) -> Result<usize, ExtremeError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ExtremeError::UnknownColumn(name.to_string()))
    }
}

/// Whether extremes are searched along each row or down each column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellPos {
    pub row: usize,
    pub column: usize,
}

/// Numeric value of a cell: the number itself, or the mean of a `mean ± std` string.
pub fn parse_cell(text: &str) -> Option<f64> {
    let mean = text.split('±').next()?.trim();
    mean.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Extreme cells among `columns`, with one direction for the whole table.
pub fn find_extreme_cells(
    table: &TextTable,
    columns: &[&str],
    axis: Axis,
    direction: Direction,
) -> Result<Vec<CellPos>, ExtremeError> {
    find_extreme_cells_with(table, columns, axis, |_| direction)
}

/// Extreme cells among `columns`, asking `direction_of` for the direction of each row
/// (axis `Row`) or of each selected column (axis `Column`, indexed in `table.columns`).
/// Lines without a parseable value yield nothing. Positions come back sorted.
pub fn find_extreme_cells_with<F>(
    table: &TextTable,
    columns: &[&str],
    axis: Axis,
    direction_of: F,
) -> Result<Vec<CellPos>, ExtremeError>
where
    F: Fn(usize) -> Direction,
{
    let selected = columns
        .iter()
        .map(|name| table.column_index(name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut found = Vec::new();
    match axis {
        Axis::Row => {
            for row in 0..table.rows.len() {
                let line = selected.iter().map(|&column| CellPos { row, column });
                found.extend(extremes_of_line(table, line, direction_of(row)));
            }
        }
        Axis::Column => {
            for &column in &selected {
                let line = (0..table.rows.len()).map(|row| CellPos { row, column });
                found.extend(extremes_of_line(table, line, direction_of(column)));
            }
        }
    }
    found.sort();
    found.dedup();
    Ok(found)
}

fn extremes_of_line(
    table: &TextTable,
    line: impl Iterator<Item = CellPos>,
    direction: Direction,
) -> Vec<CellPos> {
    let parsed: Vec<(CellPos, f64)> = line
        .filter_map(|pos| table.cell(pos.row, pos.column).and_then(parse_cell).map(|v| (pos, v)))
        .collect();

    let best = parsed.iter().map(|&(_, v)| v).reduce(|a, b| match direction {
        Direction::HigherIsBetter => a.max(b),
        Direction::LowerIsBetter => a.min(b),
    });
    match best {
        Some(best) => parsed
            .into_iter()
            .filter(|&(_, v)| v == best)
            .map(|(pos, _)| pos)
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> TextTable {
        TextTable::new(
            vec!["Metric".into(), "A".into(), "B".into(), "C".into()],
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn ties_are_all_reported() {
        let t = table(&[&["AUC", "0.9", "0.9", "0.5"]]);
        let cells =
            find_extreme_cells(&t, &["A", "B", "C"], Axis::Row, Direction::HigherIsBetter).unwrap();
        assert_eq!(
            cells,
            vec![CellPos { row: 0, column: 1 }, CellPos { row: 0, column: 2 }]
        );
    }

    #[test]
    fn mean_std_strings_compare_by_mean() {
        let t = table(&[&["Log-Loss", "0.412 ± 0.020", "0.398 ± 0.100", "0.398 ± 0.001"]]);
        let cells =
            find_extreme_cells(&t, &["A", "B", "C"], Axis::Row, Direction::LowerIsBetter).unwrap();
        assert_eq!(
            cells,
            vec![CellPos { row: 0, column: 2 }, CellPos { row: 0, column: 3 }]
        );
    }

    #[test]
    fn unparseable_lines_are_skipped() {
        let t = table(&[&["AUC", "", "n/a", ""], &["F1-score", "0.1", "", "0.3"]]);
        let cells =
            find_extreme_cells(&t, &["A", "B", "C"], Axis::Row, Direction::HigherIsBetter).unwrap();
        assert_eq!(cells, vec![CellPos { row: 1, column: 3 }]);
    }

    #[test]
    fn column_axis_scans_down_each_column() {
        let t = table(&[&["x", "0.2", "0.7", ""], &["y", "0.4", "0.1", ""]]);
        let cells =
            find_extreme_cells(&t, &["A", "B", "C"], Axis::Column, Direction::LowerIsBetter)
                .unwrap();
        assert_eq!(
            cells,
            vec![CellPos { row: 0, column: 1 }, CellPos { row: 1, column: 2 }]
        );
    }

    #[test]
    fn per_row_directions_are_honoured() {
        let t = table(&[&["AUC", "0.9", "0.5", "0.7"], &["Brier-Score", "0.3", "0.1", "0.2"]]);
        let cells = find_extreme_cells_with(&t, &["A", "B", "C"], Axis::Row, |row| {
            if row == 1 {
                Direction::LowerIsBetter
            } else {
                Direction::HigherIsBetter
            }
        })
        .unwrap();
        assert_eq!(
            cells,
            vec![CellPos { row: 0, column: 1 }, CellPos { row: 1, column: 2 }]
        );
    }

    #[test]
    fn unknown_column_is_an_error() {
        let t = table(&[&["AUC", "0.9", "0.5", "0.7"]]);
        assert_eq!(
            find_extreme_cells(&t, &["A", "Z"], Axis::Row, Direction::HigherIsBetter).unwrap_err(),
            ExtremeError::UnknownColumn("Z".into())
        );
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = TextTable::new(
            vec!["Metric".into(), "A".into()],
            vec![vec!["AUC".into(), "0.9".into()], vec!["F1-score".into()]],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ExtremeError::RaggedRow {
                row: 1,
                found: 1,
                expected: 2
            }
        );
    }

    #[test]
    fn cell_lookup_is_bounds_checked() {
        let mut t = table(&[&["AUC", "0.9", "0.5", "0.7"]]);
        assert_eq!(t.cell(0, 1), Some("0.9"));
        assert_eq!(t.cell(0, 4), None);
        assert_eq!(t.cell(1, 0), None);
        assert!(t.cell_mut(3, 0).is_none());
        if let Some(cell) = t.cell_mut(0, 3) {
            cell.push('*');
        }
        assert_eq!(t.rows()[0][3], "0.7*");
        assert_eq!(t.columns().len(), 4);
    }

    #[test]
    fn parse_cell_reads_numbers_and_means() {
        assert_eq!(parse_cell("0.812 ± 0.004"), Some(0.812));
        assert_eq!(parse_cell(" 3 "), Some(3.0));
        assert_eq!(parse_cell("NaN ± NaN"), None);
        assert_eq!(parse_cell(""), None);
    }
}
