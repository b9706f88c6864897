//! One-way repeated-measures ANOVA with scenarios as the within-subject factor.

use super::StatsError;
use super::reshape::ScenarioMatrix;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

#[derive(Debug, Clone, PartialEq)]
pub struct AnovaResult {
    pub f_value: f64,
    pub df_groups: f64,
    pub df_error: f64,
    pub p_value: f64,
}

/// `F = MS_scenario / MS_error` with `df = (k - 1, (k - 1)(n - 1))` for `n` subjects
/// and `k` groups. The p-value is the upper tail of the F distribution.
pub fn repeated_measures_anova(matrix: &ScenarioMatrix) -> Result<AnovaResult, StatsError> {
    let n = matrix.subjects.len();
    let k = matrix.groups.len();
    if n < 2 || k < 2 {
        return Err(StatsError::TooSmall {
            metric: matrix.metric,
            subjects: n,
            groups: k,
        });
    }

    let nf = n as f64;
    let kf = k as f64;
    let grand = matrix.values.iter().flatten().sum::<f64>() / (nf * kf);

    let ss_total: f64 = matrix
        .values
        .iter()
        .flatten()
        .map(|v| (v - grand).powi(2))
        .sum();
    let ss_groups: f64 = (0..k)
        .map(|g| {
            let mean = matrix.values.iter().map(|row| row[g]).sum::<f64>() / nf;
            (mean - grand).powi(2)
        })
        .sum::<f64>()
        * nf;
    let ss_subjects: f64 = matrix
        .values
        .iter()
        .map(|row| (row.iter().sum::<f64>() / kf - grand).powi(2))
        .sum::<f64>()
        * kf;
    let ss_error = (ss_total - ss_groups - ss_subjects).max(0.0);

    let df_groups = kf - 1.0;
    let df_error = (kf - 1.0) * (nf - 1.0);
    let f_value = (ss_groups / df_groups) / (ss_error / df_error);

    let p_value = if f_value.is_nan() {
        f64::NAN
    } else if f_value.is_infinite() {
        0.0
    } else {
        FisherSnedecor::new(df_groups, df_error)
            .map_err(|e| StatsError::Distribution(e.to_string()))?
            .sf(f_value)
    };

    Ok(AnovaResult {
        f_value,
        df_groups,
        df_error,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metric;
    use approx::assert_abs_diff_eq;

    fn matrix(values: Vec<Vec<f64>>) -> ScenarioMatrix {
        ScenarioMatrix {
            metric: Metric::Auc,
            subjects: (0..values.len()).map(|i| format!("d{i}")).collect(),
            groups: (0..values[0].len()).map(|i| format!("g{i}")).collect(),
            values,
        }
    }

    #[test]
    fn matches_a_hand_computed_design() {
        // Row and column means are both (4, 5, 6) around a grand mean of 5, so
        // SS_groups = SS_subjects = 6 and the residual square sum is 4. F = (6 / 2) / (4 / 4).
        let m = matrix(vec![
            vec![4.0, 3.0, 5.0],
            vec![3.0, 6.0, 6.0],
            vec![5.0, 6.0, 7.0],
        ]);
        let result = repeated_measures_anova(&m).unwrap();
        assert_abs_diff_eq!(result.f_value, 3.0, epsilon = 1e-12);
        assert_eq!(result.df_groups, 2.0);
        assert_eq!(result.df_error, 4.0);
        // Upper tail of F(2, 4) at x is (1 + x / 2)^-2.
        assert_abs_diff_eq!(result.p_value, 0.16, epsilon = 1e-9);
    }

    #[test]
    fn rejects_designs_without_replication() {
        let m = matrix(vec![vec![1.0, 2.0]]);
        assert!(matches!(
            repeated_measures_anova(&m),
            Err(StatsError::TooSmall { subjects: 1, groups: 2, .. })
        ));
    }
}
