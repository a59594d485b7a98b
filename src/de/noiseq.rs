//! NOISeq scoring for technical or simulated replicates.
//!
//! A feature's change between the condition means is compared against the
//! pooled within-condition noise: its probability is the share of noise
//! points whose |M| and |D| are both smaller than its own.

use log::debug;
use ndarray::Array2;

use crate::de::ecdf::joint_exceedance;
use crate::de::FeatureScore;
use crate::error::{NoiseqError, Result};
use crate::noise::NoiseDistribution;
use crate::testing::effect::{condition_means, md_pair, ranking_score};

/// Default q threshold with technical replicates.
pub const TECHNICAL_Q: f64 = 0.8;
/// Default q threshold with simulated replicates.
pub const SIMULATED_Q: f64 = 0.9;

/// Score every feature of `values` (zero-substituted) against `noise`.
///
/// `cols_a` and `cols_b` are the columns of the two compared conditions.
pub fn noiseq_scores(
    values: &Array2<f64>,
    cols_a: &[usize],
    cols_b: &[usize],
    noise: &NoiseDistribution,
) -> Result<Vec<FeatureScore>> {
    if cols_a.is_empty() || cols_b.is_empty() {
        return Err(NoiseqError::EmptyData("a compared condition has no samples".to_string()));
    }
    if noise.is_empty() {
        return Err(NoiseqError::EmptyData("noise distribution is empty".to_string()));
    }

    let means_a = condition_means(values, cols_a);
    let means_b = condition_means(values, cols_b);
    let changes: Vec<(f64, f64)> = means_a
        .iter()
        .zip(&means_b)
        .map(|(&a, &b)| md_pair(a, b))
        .collect();

    let probabilities = joint_exceedance(noise, &changes);
    debug!(
        "scored {} features against {} noise points",
        changes.len(),
        noise.len()
    );

    Ok(means_a
        .into_iter()
        .zip(means_b)
        .zip(changes.into_iter().zip(probabilities))
        .map(|((mean_a, mean_b), ((m, d), prob))| FeatureScore {
            mean_a,
            mean_b,
            m,
            d,
            theta: None,
            prob,
            ranking: ranking_score(m, d),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_changed_feature_scores_higher() {
        // rows: stable, strongly up in a, mildly down in a
        let values = array![
            [100.0, 102.0, 98.0, 101.0, 100.0, 99.0],
            [400.0, 410.0, 395.0, 20.0, 22.0, 19.0],
            [50.0, 52.0, 49.0, 60.0, 61.0, 59.0]
        ];
        let noise = NoiseDistribution::from_replicates(&values, &[vec![0, 1, 2], vec![3, 4, 5]]);
        let scores = noiseq_scores(&values, &[0, 1, 2], &[3, 4, 5], &noise).unwrap();

        assert!(scores[1].prob > scores[0].prob);
        assert_eq!(scores[1].prob, 1.0);
        assert!(scores[1].m > 0.0);
        assert!(scores[1].ranking < 0.0);
        assert!(scores[2].ranking > 0.0);
        assert!(scores.iter().all(|s| s.theta.is_none()));
    }

    #[test]
    fn test_empty_noise_is_rejected() {
        let values = array![[1.0, 2.0]];
        assert!(noiseq_scores(&values, &[0], &[1], &NoiseDistribution::new()).is_err());
    }
}
