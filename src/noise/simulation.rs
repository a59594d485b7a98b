//! Pseudo-replicate simulation for conditions without real replicates.
//!
//! Each condition's reads are pooled and `nss` smaller libraries are drawn
//! from them by multinomial resampling. A library holds a fraction
//! `pnr ± v` of the pooled reads. Every simulated count is then converted
//! with the feature's own normalized-per-raw ratio in that condition, so
//! length correction and sample factors reach the replicates exactly as
//! they reach the condition mean.

use log::debug;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Binomial, Distribution};
use rayon::prelude::*;

use crate::data::from_columns;
use crate::error::{NoiseqError, Result};
use crate::testing::effect::row_mean;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Fraction of the condition's reads in each pseudo-replicate (default: 0.2).
    pub pnr: f64,
    /// Pseudo-replicates per condition (default: 5).
    pub nss: usize,
    /// Half-width of the uniform jitter around `pnr` (default: 0.02).
    pub v: f64,
    /// Base seed; condition `i` uses `seed + i`.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            pnr: 0.2,
            nss: 5,
            v: 0.02,
            seed: 12345,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.nss < 2 {
            return Err(NoiseqError::invalid("nss", "at least 2 pseudo-replicates are needed"));
        }
        if !(self.pnr > 0.0 && self.pnr <= 1.0) {
            return Err(NoiseqError::invalid("pnr", "must be in (0, 1]"));
        }
        if !(self.v >= 0.0 && self.v < self.pnr) {
            return Err(NoiseqError::invalid("v", "must be in [0, pnr)"));
        }
        Ok(())
    }
}

/// Simulated replicates for every condition.
///
/// `raw` and `normalized` share their layout (features × samples); `groups`
/// names each condition with its column indices. A replicate's expected
/// value for a feature is the condition's mean normalized value. Returns the
/// simulated values and the column indices of each condition's replicates.
pub fn simulate_replicates(
    raw: &Array2<f64>,
    normalized: &Array2<f64>,
    groups: &[(String, Vec<usize>)],
    config: &SimulationConfig,
) -> Result<(Array2<f64>, Vec<Vec<usize>>)> {
    config.validate()?;
    if raw.dim() != normalized.dim() {
        return Err(NoiseqError::DimensionMismatch {
            what: "normalized matrix".to_string(),
            expected: raw.len(),
            actual: normalized.len(),
        });
    }

    let per_condition = groups
        .par_iter()
        .enumerate()
        .map(|(idx, (name, columns))| {
            let pooled: Vec<f64> = raw
                .rows()
                .into_iter()
                .map(|row| columns.iter().map(|&j| row[j]).sum())
                .collect();
            let expected: Vec<f64> = normalized
                .rows()
                .into_iter()
                .map(|row| row_mean(row, columns))
                .collect();

            let mut rng = ChaCha20Rng::seed_from_u64(config.seed.wrapping_add(idx as u64));
            simulate_condition(&pooled, &expected, config, &mut rng).map_err(|e| match e {
                NoiseqError::EmptyData(reason) => {
                    NoiseqError::EmptyData(format!("condition '{}': {}", name, reason))
                }
                other => other,
            })
        })
        .collect::<Result<Vec<Vec<Vec<f64>>>>>()?;

    let mut columns = Vec::with_capacity(groups.len() * config.nss);
    let mut layout = Vec::with_capacity(groups.len());
    for replicates in per_condition {
        let start = columns.len();
        layout.push((start..start + replicates.len()).collect());
        columns.extend(replicates);
    }

    debug!(
        "simulated {} pseudo-replicates for {} condition(s)",
        columns.len(),
        groups.len()
    );
    Ok((from_columns(raw.nrows(), columns), layout))
}

/// `config.nss` pseudo-replicates (as columns) drawn from the pooled counts
/// of one condition.
///
/// `expected[i]` is the value feature `i` should average to across
/// replicates; features absent from `pooled` stay zero.
pub fn simulate_condition(
    pooled: &[f64],
    expected: &[f64],
    config: &SimulationConfig,
    rng: &mut ChaCha20Rng,
) -> Result<Vec<Vec<f64>>> {
    if pooled.len() != expected.len() {
        return Err(NoiseqError::DimensionMismatch {
            what: "expected values".to_string(),
            expected: pooled.len(),
            actual: expected.len(),
        });
    }
    let total = pooled.iter().sum::<f64>().round();
    if total < 1.0 {
        return Err(NoiseqError::EmptyData("no reads to resample".to_string()));
    }
    // normalized value per pooled read, per feature
    let conversion: Vec<f64> = pooled
        .iter()
        .zip(expected)
        .map(|(&p, &e)| if p > 0.0 { e / p } else { 0.0 })
        .collect();

    let low = ((config.pnr - config.v) * total).max(1.0);
    let high = ((config.pnr + config.v) * total).max(low);

    (0..config.nss)
        .map(|_| -> Result<Vec<f64>> {
            let depth = if high > low {
                rng.gen_range(low..=high).round()
            } else {
                low.round()
            };
            let draw = multinomial(depth as u64, pooled, rng)?;
            let scale = total / depth;
            Ok(draw
                .into_iter()
                .zip(&conversion)
                .map(|(c, f)| c * scale * f)
                .collect())
        })
        .collect()
}

/// Multinomial draw of `size` reads over `weights`, as a chain of
/// conditional binomials.
fn multinomial(size: u64, weights: &[f64], rng: &mut ChaCha20Rng) -> Result<Vec<f64>> {
    let mut counts = vec![0.0; weights.len()];
    let Some(last) = weights.iter().rposition(|&w| w > 0.0) else {
        return Ok(counts);
    };

    let mut remaining = size;
    let mut remaining_mass: f64 = weights.iter().filter(|&&w| w > 0.0).sum();
    for (i, &w) in weights.iter().enumerate().take(last + 1) {
        if remaining == 0 {
            break;
        }
        if w <= 0.0 {
            continue;
        }
        let drawn = if i == last {
            remaining
        } else {
            let p = (w / remaining_mass).clamp(0.0, 1.0);
            Binomial::new(remaining, p)
                .map_err(|e| anyhow::anyhow!("binomial({}, {}): {}", remaining, p, e))?
                .sample(rng)
        };
        counts[i] = drawn as f64;
        remaining -= drawn;
        remaining_mass -= w;
    }
    Ok(counts)
}
