//! Upper-quartile normalization.
//!
//! Each sample is divided by the 75th percentile of its strictly positive
//! counts and multiplied by the mean of those percentiles, which keeps the
//! values on the count scale.

use log::debug;
use rayon::prelude::*;

use crate::data::{from_columns, ExpressionMatrix, FeatureAnnotation};
use crate::error::{NoiseqError, Result};
use crate::normalization::{apply_length_divisors, length_divisors, NormalizedMatrix};
use crate::testing::utils::quantile;

/// Fewest qualifying counts a sample needs for a stable upper quartile.
pub const MIN_QUARTILE_FEATURES: usize = 4;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpperQuartileConfig {
    /// Exponent for `length / 1000` correction; `None` disables it.
    pub length_exponent: Option<f64>,
    /// Counts at or below this value are left out of the percentile (zeros always are).
    pub min_count: f64,
}

pub fn upper_quartile(
    matrix: &ExpressionMatrix,
    annotation: Option<&FeatureAnnotation>,
    config: &UpperQuartileConfig,
) -> Result<NormalizedMatrix> {
    let divisors = length_divisors(matrix, annotation, config.length_exponent, "upper quartile")?;
    let scaled = apply_length_divisors(matrix.counts(), divisors.as_deref());
    let threshold = config.min_count.max(0.0);

    let quartiles = (0..matrix.n_samples())
        .into_par_iter()
        .map(|j| {
            let positive: Vec<f64> = scaled
                .column(j)
                .iter()
                .copied()
                .filter(|&v| v > threshold)
                .collect();
            if positive.len() < MIN_QUARTILE_FEATURES {
                return Err(NoiseqError::DegenerateNormalization {
                    sample: matrix.samples()[j].clone(),
                    reason: format!(
                        "{} feature(s) above {}, at least {} needed for an upper quartile",
                        positive.len(),
                        threshold,
                        MIN_QUARTILE_FEATURES
                    ),
                });
            }
            let uq = quantile(&positive, 0.75).unwrap_or(0.0);
            if !(uq > 0.0 && uq.is_finite()) {
                return Err(NoiseqError::DegenerateNormalization {
                    sample: matrix.samples()[j].clone(),
                    reason: format!("upper quartile {} is not a usable scale", uq),
                });
            }
            Ok(uq)
        })
        .collect::<Result<Vec<f64>>>()?;

    let mean_uq = quartiles.iter().sum::<f64>() / quartiles.len() as f64;
    let factors: Vec<f64> = quartiles.iter().map(|uq| uq / mean_uq).collect();
    debug!("upper quartiles {:?}, mean {}", quartiles, mean_uq);

    let columns: Vec<Vec<f64>> = (0..matrix.n_samples())
        .into_par_iter()
        .map(|j| scaled.column(j).iter().map(|v| v / factors[j]).collect())
        .collect();

    let values = from_columns(matrix.n_features(), columns);
    Ok(NormalizedMatrix::new(matrix, values, "uqua", factors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_equalizes_upper_quartiles() {
        let m = ExpressionMatrix::from_rows(
            ids("g", 5),
            ids("s", 2),
            &[
                vec![10.0, 20.0],
                vec![20.0, 40.0],
                vec![30.0, 60.0],
                vec![40.0, 80.0],
                vec![0.0, 0.0],
            ],
        )
        .unwrap();
        let n = upper_quartile(&m, None, &UpperQuartileConfig::default()).unwrap();
        // second sample is the first one doubled, so both columns coincide
        for i in 0..5 {
            assert_relative_eq!(n.get(i, 0), n.get(i, 1), epsilon = 1e-12);
        }
        assert_eq!(n.get(4, 0), 0.0);
    }

    #[test]
    fn test_too_few_nonzero_features() {
        let m = ExpressionMatrix::from_rows(
            ids("g", 5),
            ids("s", 2),
            &[
                vec![10.0, 5.0],
                vec![20.0, 0.0],
                vec![30.0, 0.0],
                vec![40.0, 7.0],
                vec![50.0, 0.0],
            ],
        )
        .unwrap();
        match upper_quartile(&m, None, &UpperQuartileConfig::default()) {
            Err(NoiseqError::DegenerateNormalization { sample, .. }) => assert_eq!(sample, "s1"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_min_count_excludes_low_values() {
        let m = ExpressionMatrix::from_rows(
            ids("g", 5),
            ids("s", 1),
            &[vec![1.0], vec![2.0], vec![100.0], vec![200.0], vec![300.0]],
        )
        .unwrap();
        let config = UpperQuartileConfig {
            min_count: 5.0,
            ..Default::default()
        };
        assert!(upper_quartile(&m, None, &config).is_err());
    }
}
