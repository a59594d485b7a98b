use crate::testing::utils::average_ranks;
use crate::testing::{cast, Alternative, TestResult};
use ndarray::Array2;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;
use single_utilities::traits::FloatOps;
use statrs::distribution::{ContinuousCDF, Normal};

/// Largest sample size for which the exact null distribution is enumerated.
const EXACT_LIMIT: usize = 50;

/// One-sample signed-rank test of every row of `matrix`, restricted to `columns`.
pub fn signed_rank_matrix_rows(
    matrix: &Array2<f64>,
    columns: &[usize],
    mu: f64,
    alternative: Alternative,
) -> anyhow::Result<Vec<TestResult<f64>>> {
    if columns.is_empty() {
        return Err(anyhow::anyhow!("Column indices cannot be empty"));
    }

    let results: Vec<_> = (0..matrix.nrows())
        .into_par_iter()
        .map(|row| {
            let values: Vec<f64> = columns.iter().map(|&col| matrix[[row, col]]).collect();
            wilcoxon_signed_rank(&values, mu, alternative)
        })
        .collect();

    Ok(results)
}

/// Wilcoxon signed-rank test of the null "location = `mu`".
///
/// Observations equal to `mu` are discarded. The exact distribution is used
/// for fewer than 50 remaining observations without ties, the normal
/// approximation with tie and continuity correction otherwise.
pub fn wilcoxon_signed_rank<T>(x: &[T], mu: T, alternative: Alternative) -> TestResult<T>
where
    T: FloatOps,
{
    let diffs: Vec<f64> = x
        .iter()
        .map(|&v| (v - mu).to_f64().unwrap_or(f64::NAN))
        .filter(|d| *d != 0.0)
        .collect();
    let n = diffs.len();

    if n == 0 {
        return TestResult::new(T::zero(), T::one()); // Insufficient data
    }

    let abs_diffs: Vec<f64> = diffs.iter().map(|d| d.abs()).collect();
    let ranks = average_ranks(&abs_diffs);

    let v: f64 = diffs
        .iter()
        .zip(&ranks)
        .filter(|(d, _)| **d > 0.0)
        .map(|(_, r)| *r)
        .sum();

    let has_ties = {
        let mut sorted = ranks.clone();
        crate::testing::utils::sort_ascending(&mut sorted);
        sorted.windows(2).any(|w| w[0] == w[1])
    };

    let n_f = n as f64;
    let mean_v = n_f * (n_f + 1.0) / 4.0;

    let (p_value, exact) = if n < EXACT_LIMIT && !has_ties {
        let upper = |stat: f64| signed_rank_upper_tail(n, stat.round() as usize);
        let p = match alternative {
            Alternative::Greater => upper(v),
            Alternative::Less => 1.0 - upper(v + 1.0),
            Alternative::TwoSided => {
                let p = if v > mean_v {
                    upper(v)
                } else {
                    1.0 - upper(v + 1.0)
                };
                (2.0 * p).min(1.0)
            }
        };
        (p, true)
    } else {
        let tie_term: f64 = tie_group_sizes(&ranks)
            .into_iter()
            .map(|t| t * t * t - t)
            .sum::<f64>()
            / 48.0;
        let sigma = (n_f * (n_f + 1.0) * (2.0 * n_f + 1.0) / 24.0 - tie_term).sqrt();
        if sigma <= 0.0 {
            return TestResult::new(cast::<T>(v), T::one());
        }
        let normal = Normal::standard();
        let z = v - mean_v;
        let p = match alternative {
            Alternative::Greater => normal.sf((z - 0.5) / sigma),
            Alternative::Less => normal.cdf((z + 0.5) / sigma),
            Alternative::TwoSided => {
                let correction = 0.5 * z.signum();
                2.0 * normal.sf(((z - correction) / sigma).abs())
            }
        };
        (p.min(1.0), false)
    };

    TestResult::new(cast::<T>(v), cast::<T>(p_value))
        .with_metadata("n", cast::<T>(n as f64))
        .with_metadata("exact", if exact { T::one() } else { T::zero() })
}

/// P(V >= v) for the signed-rank statistic of `n` untied observations.
fn signed_rank_upper_tail(n: usize, v: usize) -> f64 {
    let max_v = n * (n + 1) / 2;
    if v == 0 {
        return 1.0;
    }
    if v > max_v {
        return 0.0;
    }

    // counts[s] = number of subsets of {1..n} summing to s
    let mut counts = vec![0.0f64; max_v + 1];
    counts[0] = 1.0;
    for k in 1..=n {
        let reach = k * (k + 1) / 2;
        for s in (k..=reach).rev() {
            counts[s] += counts[s - k];
        }
    }

    let total = 2f64.powi(n as i32);
    counts[v..].iter().sum::<f64>() / total
}

fn tie_group_sizes(ranks: &[f64]) -> Vec<f64> {
    let mut sorted = ranks.to_vec();
    crate::testing::utils::sort_ascending(&mut sorted);
    let mut sizes = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        sizes.push((j - i) as f64);
        i = j;
    }
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_five_positive_values_exact() {
        // All five ranks positive: V = 15, P(V >= 15) = 1/32
        let result = wilcoxon_signed_rank(&[3.0, 8.0, 1.0, 12.0, 5.0], 0.0, Alternative::Greater);
        assert_relative_eq!(result.statistic, 15.0);
        assert_relative_eq!(result.p_value, 1.0 / 32.0, epsilon = 1e-12);
        assert_eq!(result.metadata["exact"], 1.0);
    }

    #[test]
    fn test_zeros_are_discarded() {
        let result = wilcoxon_signed_rank(&[0.0, 0.0, 0.0], 0.0, Alternative::Greater);
        assert_eq!(result.p_value, 1.0);

        // Two non-zero observations left: P(V >= 3) = 1/4
        let result = wilcoxon_signed_rank(&[0.0, 2.0, 4.0, 0.0], 0.0, Alternative::Greater);
        assert_relative_eq!(result.p_value, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_exact_tail_is_a_distribution() {
        // n = 4 has 16 subsets; P(V >= 0) = 1 and P(V >= 11) = 0
        assert_relative_eq!(signed_rank_upper_tail(4, 0), 1.0);
        assert_relative_eq!(signed_rank_upper_tail(4, 10), 1.0 / 16.0);
        assert_eq!(signed_rank_upper_tail(4, 11), 0.0);
    }

    #[test]
    fn test_ties_use_normal_approximation() {
        let ties = [5.0, 5.0, 5.0, 5.0, 5.0, 5.0];
        let result = wilcoxon_signed_rank(&ties, 0.0, Alternative::Greater);
        assert_eq!(result.metadata["exact"], 0.0);
        assert!(result.p_value < 0.05);
    }

    #[test]
    fn test_less_alternative_mirrors_greater() {
        let negative = [-3.0, -1.0, -2.0, -6.0, -4.0];
        let greater = wilcoxon_signed_rank(&negative, 0.0, Alternative::Greater);
        let less = wilcoxon_signed_rank(&[-3.0, -1.0, -2.0, -6.0, -4.0], 0.0, Alternative::Less);
        assert_relative_eq!(greater.p_value, 1.0);
        assert_relative_eq!(less.p_value, 1.0 / 32.0, epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_rows() {
        let m = array![[1.0, 2.0, 3.0, 4.0, 5.0, 0.0], [0.0, 0.0, 0.0, 0.0, 0.0, 9.0]];
        let results =
            signed_rank_matrix_rows(&m, &[0, 1, 2, 3, 4], 0.0, Alternative::Greater).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].p_value < 0.05);
        assert_eq!(results[1].p_value, 1.0);
        assert!(signed_rank_matrix_rows(&m, &[], 0.0, Alternative::Greater).is_err());
    }
}
