//! Feature-level change statistics shared by the noise model and both DE variants.
//!
//! All inputs are expected to be zero-substituted already, so the log ratio
//! is always finite.

use ndarray::{Array2, ArrayView1};

/// M statistic: log2 ratio of `a` over `b`.
#[inline]
pub fn log2_ratio(a: f64, b: f64) -> f64 {
    (a / b).log2()
}

/// D statistic: raw difference `a - b`.
#[inline]
pub fn difference(a: f64, b: f64) -> f64 {
    a - b
}

/// (M, D) for one pair of expression values.
#[inline]
pub fn md_pair(a: f64, b: f64) -> (f64, f64) {
    (log2_ratio(a, b), difference(a, b))
}

/// Mean of one row over the given columns.
pub fn row_mean(row: ArrayView1<'_, f64>, columns: &[usize]) -> f64 {
    if columns.is_empty() {
        return 0.0;
    }
    columns.iter().map(|&j| row[j]).sum::<f64>() / columns.len() as f64
}

/// Per-feature mean over the given columns.
pub fn condition_means(values: &Array2<f64>, columns: &[usize]) -> Vec<f64> {
    values.rows().into_iter().map(|row| row_mean(row, columns)).collect()
}

/// Ranking score combining both statistics: `-sign(M) × sqrt(M² + D²)`.
///
/// Positive when the second condition is higher.
#[inline]
pub fn ranking_score(m: f64, d: f64) -> f64 {
    let magnitude = (m * m + d * d).sqrt();
    if m > 0.0 {
        -magnitude
    } else if m < 0.0 {
        magnitude
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_md_pair() {
        let (m, d) = md_pair(8.0, 2.0);
        assert_abs_diff_eq!(m, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d, 6.0, epsilon = 1e-12);

        let (m, d) = md_pair(5.0, 5.0);
        assert_eq!(m, 0.0);
        assert_eq!(d, 0.0);
    }

    #[test]
    fn test_condition_means() {
        let values = array![[2.0, 2.2, 1.8, 8.0, 7.5, 8.5], [5.0, 5.1, 4.9, 5.0, 5.1, 4.9]];
        let a = condition_means(&values, &[0, 1, 2]);
        let b = condition_means(&values, &[3, 4, 5]);
        assert_abs_diff_eq!(a[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b[0], 8.0, epsilon = 1e-12);
        assert_abs_diff_eq!(log2_ratio(b[0], a[0]), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(log2_ratio(a[1], b[1]), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ranking_score_direction() {
        // higher in the first condition: M > 0, score negative
        assert_abs_diff_eq!(ranking_score(3.0, 4.0), -5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ranking_score(-3.0, -4.0), 5.0, epsilon = 1e-12);
        assert_eq!(ranking_score(0.0, 0.0), 0.0);
    }
}
