//! Paired t-tests between every pair of scenarios.

use super::StatsError;
use super::reshape::ScenarioMatrix;
use crate::summarize::aggregate::mean_and_sample_std;
use itertools::Itertools;
use statrs::distribution::{ContinuousCDF, StudentsT};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairedTest {
    pub t_stat: f64,
    pub p_value: f64,
}

/// Paired t-test of `a - b` with `n - 1` degrees of freedom, two-sided.
pub fn paired_t_test(a: &[f64], b: &[f64]) -> Result<PairedTest, StatsError> {
    let differences: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - y).collect();
    let n = differences.len();
    if n < 2 {
        return Err(StatsError::TooFewPairs(n));
    }
    let (mean, std, _) = mean_and_sample_std(&differences);
    let t_stat = mean / (std / (n as f64).sqrt());

    let p_value = if t_stat.is_nan() {
        f64::NAN
    } else if t_stat.is_infinite() {
        0.0
    } else {
        let dist = StudentsT::new(0.0, 1.0, (n - 1) as f64)
            .map_err(|e| StatsError::Distribution(e.to_string()))?;
        (2.0 * dist.cdf(-t_stat.abs())).min(1.0)
    };
    Ok(PairedTest { t_stat, p_value })
}

/// Pairwise results laid out as upper-triangular matrices over the groups.
#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseTable {
    pub groups: Vec<String>,
    /// `cells[i][j]` is set only for `i < j`.
    pub cells: Vec<Vec<Option<PairedTest>>>,
}

pub fn pairwise_tests(matrix: &ScenarioMatrix) -> Result<PairwiseTable, StatsError> {
    let k = matrix.groups.len();
    let mut cells = vec![vec![None; k]; k];
    for (i, j) in (0..k).tuple_combinations() {
        cells[i][j] = Some(paired_t_test(&matrix.column(i), &matrix.column(j))?);
    }
    Ok(PairwiseTable {
        groups: matrix.groups.clone(),
        cells,
    })
}

impl PairwiseTable {
    /// Header and rows of one statistic. Off-triangle cells are `-` and the first group's
    /// column is dropped, since it is never the second member of a pair.
    pub fn render<F>(&self, value: F) -> (Vec<String>, Vec<Vec<String>>)
    where
        F: Fn(&PairedTest) -> f64,
    {
        let mut header = vec![String::new()];
        header.extend(self.groups.iter().skip(1).cloned());

        let rows = self
            .groups
            .iter()
            .zip(&self.cells)
            .map(|(group, row)| {
                let mut line = vec![group.clone()];
                line.extend(row.iter().skip(1).map(|cell| match cell {
                    Some(test) => crate::io::format_value(value(test)),
                    None => "-".to_string(),
                }));
                line
            })
            .collect();
        (header, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metric;
    use approx::assert_abs_diff_eq;

    #[test]
    fn paired_t_matches_a_known_case() {
        // Differences 1, 2, 3: mean 2, sd 1, t = 2 * sqrt(3).
        let a = [2.0, 4.0, 6.0];
        let b = [1.0, 2.0, 3.0];
        let test = paired_t_test(&a, &b).unwrap();
        assert_abs_diff_eq!(test.t_stat, 2.0 * 3f64.sqrt(), epsilon = 1e-12);
        // t with 2 df: two-sided p = 1 - t / sqrt(t^2 + 2).
        let t = test.t_stat;
        assert_abs_diff_eq!(test.p_value, 1.0 - t / (t * t + 2.0).sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn constant_differences_are_degenerate() {
        let same = paired_t_test(&[0.5, 0.6], &[0.5, 0.6]).unwrap();
        assert!(same.t_stat.is_nan());
        assert!(same.p_value.is_nan());

        let shifted = paired_t_test(&[1.5, 2.5], &[0.5, 1.5]).unwrap();
        assert!(shifted.t_stat.is_infinite());
        assert_eq!(shifted.p_value, 0.0);
    }

    #[test]
    fn pairwise_matrix_is_upper_triangular_without_first_column() {
        let matrix = ScenarioMatrix {
            metric: Metric::Auc,
            subjects: vec!["a".into(), "b".into(), "c".into()],
            groups: vec!["Baseline".into(), "SMOTE".into(), "Class Weights".into()],
            values: vec![
                vec![0.5, 0.6, 0.7],
                vec![0.4, 0.6, 0.9],
                vec![0.6, 0.7, 0.7],
            ],
        };
        let table = pairwise_tests(&matrix).unwrap();
        let (header, rows) = table.render(|t| t.t_stat);
        assert_eq!(header, vec!["", "SMOTE", "Class Weights"]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "Baseline");
        assert_ne!(rows[0][1], "-");
        assert_ne!(rows[0][2], "-");
        assert_eq!(rows[1][1], "-");
        assert_ne!(rows[1][2], "-");
        assert_eq!(rows[2][1..], ["-", "-"]);
    }
}
