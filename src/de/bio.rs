//! NOISeqBIO scoring for biological replicates.
//!
//! # Algorithm
//!
//! 1. Per feature, M and D between the condition means are standardized by
//!    their replicate standard errors plus an offset `a0` (the `a0per`
//!    quantile of those standard errors), and averaged into θ
//! 2. Null θ values are computed the same way after `r` seeded random
//!    relabellings of the samples that keep both group sizes
//! 3. Densities f (observed θ) and f0 (null θ) are estimated with Gaussian
//!    kernels; `p0 = min(1, min f / f0)` bounds the share of unchanged
//!    features
//! 4. The probability of change is `1 - p0 · f0(θ) / f(θ)`, clamped to [0, 1]

use log::debug;
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;

use crate::de::density::KernelDensity;
use crate::de::FeatureScore;
use crate::error::{NoiseqError, Result};
use crate::testing::effect::{md_pair, row_mean};
use crate::testing::utils::{quantile, variance};

/// Default q threshold with biological replicates.
pub const BIOLOGICAL_Q: f64 = 0.95;
/// Fewest features a mixture can be fitted on.
pub const MIN_FEATURES: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct BioConfig {
    /// Random relabellings used to build the null θ (default: 50).
    pub r: usize,
    /// Bandwidth multiplier of both density estimates (default: 1.5).
    pub adj: f64,
    /// Quantile of the standard errors used as offset `a0` (default: 0.9).
    pub a0per: f64,
    /// Seed of the relabellings; relabelling `i` uses `seed + i`.
    pub seed: u64,
}

impl Default for BioConfig {
    fn default() -> Self {
        Self {
            r: 50,
            adj: 1.5,
            a0per: 0.9,
            seed: 12345,
        }
    }
}

impl BioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.r == 0 {
            return Err(NoiseqError::invalid("r", "at least one relabelling is needed"));
        }
        if !(self.adj > 0.0 && self.adj.is_finite()) {
            return Err(NoiseqError::invalid("adj", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.a0per) {
            return Err(NoiseqError::invalid("a0per", "must be in [0, 1]"));
        }
        Ok(())
    }
}

/// Fitted quantities reported alongside the scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BioFit {
    pub a0_m: f64,
    pub a0_d: f64,
    pub p0: f64,
}

/// Per-feature θ with the quantities it was built from.
#[derive(Debug, Clone)]
struct ThetaStatistics {
    means_a: Vec<f64>,
    means_b: Vec<f64>,
    m: Vec<f64>,
    d: Vec<f64>,
    theta: Vec<f64>,
    a0_m: f64,
    a0_d: f64,
}

/// Check both compared conditions have the replicates NOISeqBIO needs.
pub fn check_replicates(sides: [(&str, usize); 2]) -> Result<()> {
    for (condition, found) in sides {
        if found < 2 {
            return Err(NoiseqError::InsufficientReplicates {
                condition: condition.to_string(),
                found,
                required: 2,
            });
        }
    }
    Ok(())
}

/// Score every feature of `values` (zero-substituted) with NOISeqBIO.
pub fn noiseq_bio_scores(
    values: &Array2<f64>,
    cols_a: &[usize],
    cols_b: &[usize],
    config: &BioConfig,
) -> Result<(Vec<FeatureScore>, BioFit)> {
    config.validate()?;
    check_replicates([("A", cols_a.len()), ("B", cols_b.len())])?;
    if values.nrows() < MIN_FEATURES {
        return Err(NoiseqError::DegenerateMixtureFit(format!(
            "{} feature(s), at least {} needed",
            values.nrows(),
            MIN_FEATURES
        )));
    }

    let observed = theta_statistics(values, cols_a, cols_b, config.a0per)?;
    let null = null_theta(values, cols_a, cols_b, config)?;
    debug!(
        "NOISeqBIO a0_M = {}, a0_D = {}, {} null values",
        observed.a0_m,
        observed.a0_d,
        null.len()
    );

    let f = KernelDensity::fit(&observed.theta, config.adj)?;
    let f0 = KernelDensity::fit(&null, config.adj)?;

    let densities: Vec<(f64, f64)> = observed
        .theta
        .iter()
        .map(|&t| (f.evaluate(t), f0.evaluate(t)))
        .collect();
    let p0 = densities
        .iter()
        .filter(|(f, f0)| *f0 > 0.0 && *f > 0.0)
        .map(|(f, f0)| f / f0)
        .fold(1.0, f64::min);
    debug!(
        "NOISeqBIO p0 = {}, bandwidths f = {}, f0 = {}",
        p0,
        f.bandwidth(),
        f0.bandwidth()
    );

    let scores = (0..values.nrows())
        .map(|i| {
            let (fi, f0i) = densities[i];
            let prob = if fi > 0.0 {
                (1.0 - p0 * f0i / fi).clamp(0.0, 1.0)
            } else {
                0.0
            };
            FeatureScore {
                mean_a: observed.means_a[i],
                mean_b: observed.means_b[i],
                m: observed.m[i],
                d: observed.d[i],
                theta: Some(observed.theta[i]),
                prob,
                ranking: observed.theta[i],
            }
        })
        .collect();

    Ok((
        scores,
        BioFit {
            a0_m: observed.a0_m,
            a0_d: observed.a0_d,
            p0,
        },
    ))
}

fn theta_statistics(
    values: &Array2<f64>,
    cols_a: &[usize],
    cols_b: &[usize],
    a0per: f64,
) -> Result<ThetaStatistics> {
    let (n_a, n_b) = (cols_a.len() as f64, cols_b.len() as f64);
    let ln2_sq = std::f64::consts::LN_2.powi(2);

    let mut means_a = Vec::with_capacity(values.nrows());
    let mut means_b = Vec::with_capacity(values.nrows());
    let mut m = Vec::with_capacity(values.nrows());
    let mut d = Vec::with_capacity(values.nrows());
    let mut se_m = Vec::with_capacity(values.nrows());
    let mut se_d = Vec::with_capacity(values.nrows());

    for row in values.rows() {
        let a: Vec<f64> = cols_a.iter().map(|&j| row[j]).collect();
        let b: Vec<f64> = cols_b.iter().map(|&j| row[j]).collect();
        let (mean_a, mean_b) = (row_mean(row, cols_a), row_mean(row, cols_b));
        let (var_a, var_b) = (variance(&a), variance(&b));
        let (mi, di) = md_pair(mean_a, mean_b);

        means_a.push(mean_a);
        means_b.push(mean_b);
        m.push(mi);
        d.push(di);
        let rel_a = var_a / (n_a * mean_a * mean_a * ln2_sq);
        let rel_b = var_b / (n_b * mean_b * mean_b * ln2_sq);
        se_m.push((rel_a + rel_b).sqrt());
        se_d.push((var_a / n_a + var_b / n_b).sqrt());
    }

    if se_m.iter().all(|&s| s <= 0.0) || se_d.iter().all(|&s| s <= 0.0) {
        return Err(NoiseqError::DegenerateMixtureFit(
            "replicates show no variability to standardize by".to_string(),
        ));
    }
    let a0_m = quantile(&se_m, a0per).unwrap_or(0.0);
    let a0_d = quantile(&se_d, a0per).unwrap_or(0.0);

    // A term with nothing to standardize by carries no evidence of change
    let standardized = |x: f64, denom: f64| if denom > 0.0 { x / denom } else { 0.0 };
    let theta = (0..m.len())
        .map(|i| {
            (standardized(m[i], a0_m + se_m[i]) + standardized(d[i], a0_d + se_d[i])) / 2.0
        })
        .collect();

    Ok(ThetaStatistics {
        means_a,
        means_b,
        m,
        d,
        theta,
        a0_m,
        a0_d,
    })
}

/// θ of every feature under `config.r` random relabellings, pooled.
fn null_theta(
    values: &Array2<f64>,
    cols_a: &[usize],
    cols_b: &[usize],
    config: &BioConfig,
) -> Result<Vec<f64>> {
    let all: Vec<usize> = cols_a.iter().chain(cols_b).copied().collect();

    let per_relabelling = (0..config.r)
        .into_par_iter()
        .map(|i| {
            let mut rng = ChaCha20Rng::seed_from_u64(config.seed.wrapping_add(i as u64));
            let mut shuffled = all.clone();
            shuffled.shuffle(&mut rng);
            let (a, b) = shuffled.split_at(cols_a.len());
            theta_statistics(values, a, b, config.a0per).map(|s| s.theta)
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    Ok(per_relabelling.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic jitter in [-1, 1).
    fn jitter(i: usize, j: usize) -> f64 {
        ((i * 7919 + j * 104_729) % 1000) as f64 / 500.0 - 1.0
    }

    fn replicated_matrix(n_features: usize, n_changed: usize) -> Array2<f64> {
        Array2::from_shape_fn((n_features, 6), |(i, j)| {
            let base = 50.0 + (i % 13) as f64 * 20.0;
            let level = if i < n_changed && j >= 3 { base * 8.0 } else { base };
            level * (1.0 + 0.1 * jitter(i, j))
        })
    }

    #[test]
    fn test_changed_features_get_higher_probability() {
        let values = replicated_matrix(200, 20);
        let (scores, fit) =
            noiseq_bio_scores(&values, &[0, 1, 2], &[3, 4, 5], &BioConfig::default()).unwrap();

        assert!(fit.p0 > 0.0 && fit.p0 <= 1.0);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(&s.prob)));
        let mean_prob = |range: std::ops::Range<usize>| {
            let n = range.len() as f64;
            range.map(|i| scores[i].prob).sum::<f64>() / n
        };
        assert!(mean_prob(0..20) > mean_prob(20..200));
        assert!(mean_prob(0..20) > 0.8);
        assert!(mean_prob(20..200) < 0.5);
        assert!(scores[..20].iter().all(|s| s.ranking < 0.0));
    }

    #[test]
    fn test_seeded_run_is_reproducible() {
        let values = replicated_matrix(60, 6);
        let config = BioConfig::default();
        let (first, fit_a) = noiseq_bio_scores(&values, &[0, 1, 2], &[3, 4, 5], &config).unwrap();
        let (second, fit_b) = noiseq_bio_scores(&values, &[0, 1, 2], &[3, 4, 5], &config).unwrap();
        assert_eq!(fit_a, fit_b);
        for (x, y) in first.iter().zip(&second) {
            assert_eq!(x.prob, y.prob);
        }
    }

    #[test]
    fn test_single_replicate_is_rejected() {
        let values = replicated_matrix(30, 3);
        let err = noiseq_bio_scores(&values, &[0], &[3, 4, 5], &BioConfig::default()).unwrap_err();
        assert!(matches!(err, NoiseqError::InsufficientReplicates { found: 1, .. }));
    }

    #[test]
    fn test_constant_feature_does_not_abort_the_fit() {
        let mut values = replicated_matrix(100, 10);
        values.row_mut(0).fill(50.0);
        let config = BioConfig {
            a0per: 0.0,
            ..Default::default()
        };
        let (scores, fit) = noiseq_bio_scores(&values, &[0, 1, 2], &[3, 4, 5], &config).unwrap();
        assert_eq!(scores[0].theta, Some(0.0));
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(&s.prob)));
        assert!(fit.p0 > 0.0 && fit.p0 <= 1.0);
    }

    #[test]
    fn test_no_variability_anywhere() {
        // every feature is constant within each condition
        let values = Array2::from_shape_fn((20, 6), |(i, j)| {
            if j < 3 { 10.0 + i as f64 } else { 20.0 + i as f64 }
        });
        assert!(matches!(
            noiseq_bio_scores(&values, &[0, 1, 2], &[3, 4, 5], &BioConfig::default()),
            Err(NoiseqError::DegenerateMixtureFit(_))
        ));
    }

    #[test]
    fn test_too_few_features() {
        let values = replicated_matrix(5, 1);
        assert!(matches!(
            noiseq_bio_scores(&values, &[0, 1, 2], &[3, 4, 5], &BioConfig::default()),
            Err(NoiseqError::DegenerateMixtureFit(_))
        ));
    }
}
