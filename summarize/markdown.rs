//! GitHub markdown rendering of a pivoted summary, best cell of each row in bold.

use crate::shared::config::StudyConfig;
use crate::summarize::extreme::{Axis, ExtremeError, TextTable, find_extreme_cells_with};
use crate::summarize::pivot::PivotedTable;

/// Renders `table` as a padded pipe table.
///
/// Within each row the scenario cells holding the best mean for that row's metric are
/// wrapped in `**`. Ties are all bolded.
pub fn render_markdown(table: &PivotedTable, config: &StudyConfig) -> Result<String, ExtremeError> {
    let mut text = TextTable::from_pivot(table);
    let scenario_columns: Vec<&str> = table.scenarios.iter().map(String::as_str).collect();
    let best = find_extreme_cells_with(&text, &scenario_columns, Axis::Row, |row| {
        config.direction(table.rows[row].metric)
    })?;

    for pos in best {
        if let Some(cell) = text.cell_mut(pos.row, pos.column) {
            *cell = format!("**{cell}**");
        }
    }
    Ok(pipe_table(&text))
}

fn pipe_table(table: &TextTable) -> String {
    let widths: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .map(|(c, name)| {
            table
                .rows()
                .iter()
                .filter_map(|row| row.get(c))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &mut dyn Iterator<Item = &str>| -> String {
        let padded: Vec<String> = cells
            .zip(&widths)
            .map(|(cell, &width)| {
                let pad = width - cell.chars().count();
                format!(" {cell}{} ", " ".repeat(pad))
            })
            .collect();
        format!("|{}|", padded.join("|"))
    };

    let mut out = Vec::with_capacity(table.rows().len() + 2);
    out.push(line(&mut table.columns().iter().map(String::as_str)));
    let rule: Vec<String> = widths
        .iter()
        .map(|&w| format!(":{}", "-".repeat(w + 1)))
        .collect();
    out.push(format!("|{}|", rule.join("|")));
    for row in table.rows() {
        out.push(line(&mut row.iter().map(String::as_str)));
    }
    let mut rendered = out.join("\n");
    rendered.push('\n');
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarize::pivot::PivotRow;
    use crate::summarize::aggregate::GroupKey;
    use crate::types::Metric;

    fn table() -> PivotedTable {
        PivotedTable {
            keys: vec![],
            scenarios: vec!["Baseline".into(), "SMOTE".into()],
            rows: vec![
                PivotRow {
                    metric: Metric::Auc,
                    key: GroupKey::default(),
                    cells: vec!["0.800 ± 0.010".into(), "0.850 ± 0.020".into()],
                },
                PivotRow {
                    metric: Metric::Brier,
                    key: GroupKey::default(),
                    cells: vec!["0.100 ± 0.010".into(), "0.120 ± 0.020".into()],
                },
            ],
        }
    }

    #[test]
    fn bolds_the_best_cell_by_metric_direction() {
        let rendered = render_markdown(&table(), &StudyConfig::default()).unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("| Metric "));
        assert!(lines[1].starts_with("|:"));
        assert!(lines[2].contains("**0.850 ± 0.020**"));
        assert!(!lines[2].contains("**0.800"));
        assert!(lines[3].contains("**0.100 ± 0.010**"));
        assert!(!lines[3].contains("**0.120"));
    }

    #[test]
    fn columns_are_padded_to_equal_width() {
        let rendered = render_markdown(&table(), &StudyConfig::default()).unwrap();
        let widths: Vec<usize> = rendered.lines().map(|l| l.chars().count()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]));
    }
}
