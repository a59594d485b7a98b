//! Trimmed Mean of M-values (TMM) normalization.
//!
//! # Algorithm
//!
//! 1. Select a reference sample (by default the one whose upper quartile of
//!    relative abundances is closest to the geometric mean of all samples')
//! 2. For each other sample compute per-feature log-ratios (M) and mean log
//!    abundances (A) against the reference, skipping features that are zero
//!    in either sample
//! 3. Trim the extreme 30% of M and 5% of A
//! 4. The precision-weighted mean of the surviving M values, exponentiated,
//!    is the sample's factor
//!
//! Counts are then divided by `factor × library / reference library`.

use log::debug;
use rayon::prelude::*;

use crate::data::{from_columns, ExpressionMatrix, FeatureAnnotation};
use crate::error::{NoiseqError, Result};
use crate::normalization::{apply_length_divisors, length_divisors, NormalizedMatrix};
use crate::testing::utils::{average_ranks, quantile};

#[derive(Debug, Clone, PartialEq)]
pub struct TmmConfig {
    /// Exponent for `length / 1000` correction; `None` disables it.
    pub length_exponent: Option<f64>,
    /// Fraction of M-values trimmed from each tail (default: 0.30).
    pub trim_m: f64,
    /// Fraction of A-values trimmed from each tail (default: 0.05).
    pub trim_a: f64,
    /// Reference sample index (None = auto-select).
    pub reference: Option<usize>,
    /// Weight M-values by their inverse asymptotic variance (default: true).
    pub weighted: bool,
}

impl Default for TmmConfig {
    fn default() -> Self {
        Self {
            length_exponent: None,
            trim_m: 0.30,
            trim_a: 0.05,
            reference: None,
            weighted: true,
        }
    }
}

impl TmmConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..0.5).contains(&self.trim_m) {
            return Err(NoiseqError::invalid("trim_m", "must be in [0, 0.5)"));
        }
        if !(0.0..0.5).contains(&self.trim_a) {
            return Err(NoiseqError::invalid("trim_a", "must be in [0, 0.5)"));
        }
        Ok(())
    }
}

/// TMM factors of every sample and the reference index used.
pub fn tmm_factors(
    matrix: &ExpressionMatrix,
    annotation: Option<&FeatureAnnotation>,
    config: &TmmConfig,
) -> Result<(Vec<f64>, usize)> {
    config.validate()?;
    let divisors = length_divisors(matrix, annotation, config.length_exponent, "TMM")?;
    let scaled = apply_length_divisors(matrix.counts(), divisors.as_deref());
    let library_sizes: Vec<f64> = (0..matrix.n_samples()).map(|j| scaled.column(j).sum()).collect();

    for (j, &lib) in library_sizes.iter().enumerate() {
        if lib <= 0.0 {
            return Err(NoiseqError::DegenerateNormalization {
                sample: matrix.samples()[j].clone(),
                reason: "library size is zero".to_string(),
            });
        }
    }

    let columns: Vec<Vec<f64>> = (0..matrix.n_samples())
        .map(|j| scaled.column(j).to_vec())
        .collect();

    let ref_idx = match config.reference {
        Some(r) if r >= matrix.n_samples() => {
            return Err(NoiseqError::invalid(
                "reference",
                format!("index {} out of bounds (n_samples = {})", r, matrix.n_samples()),
            ));
        }
        Some(r) => r,
        None => select_reference_sample(matrix, &columns, &library_sizes)?,
    };

    let factors = (0..matrix.n_samples())
        .into_par_iter()
        .map(|j| {
            if j == ref_idx {
                return Ok(1.0);
            }
            calculate_tmm_factor(
                &columns[j],
                &columns[ref_idx],
                library_sizes[j],
                library_sizes[ref_idx],
                config,
            )
            .ok_or_else(|| NoiseqError::DegenerateNormalization {
                sample: matrix.samples()[j].clone(),
                reason: format!(
                    "no feature is expressed in both this sample and reference '{}'",
                    matrix.samples()[ref_idx]
                ),
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    debug!(
        "TMM reference sample '{}', factors {:?}",
        matrix.samples()[ref_idx],
        factors
    );
    Ok((factors, ref_idx))
}

/// Normalize counts with TMM factors.
pub fn tmm(
    matrix: &ExpressionMatrix,
    annotation: Option<&FeatureAnnotation>,
    config: &TmmConfig,
) -> Result<NormalizedMatrix> {
    let (factors, ref_idx) = tmm_factors(matrix, annotation, config)?;
    let divisors = length_divisors(matrix, annotation, config.length_exponent, "TMM")?;
    let scaled = apply_length_divisors(matrix.counts(), divisors.as_deref());
    let library_sizes: Vec<f64> = (0..matrix.n_samples()).map(|j| scaled.column(j).sum()).collect();
    let ref_lib = library_sizes[ref_idx];

    let effective: Vec<f64> = factors
        .iter()
        .zip(&library_sizes)
        .map(|(f, lib)| f * lib / ref_lib)
        .collect();

    let columns: Vec<Vec<f64>> = (0..matrix.n_samples())
        .into_par_iter()
        .map(|j| scaled.column(j).iter().map(|v| v / effective[j]).collect())
        .collect();

    let values = from_columns(matrix.n_features(), columns);
    Ok(NormalizedMatrix::new(matrix, values, "tmm", effective))
}

/// Reference = sample whose upper quartile of relative abundances is closest
/// to the geometric mean of those quartiles.
fn select_reference_sample(
    matrix: &ExpressionMatrix,
    columns: &[Vec<f64>],
    library_sizes: &[f64],
) -> Result<usize> {
    let mut upper_quartiles = Vec::with_capacity(columns.len());
    for (j, col) in columns.iter().enumerate() {
        let proportions: Vec<f64> = col
            .iter()
            .map(|&c| c / library_sizes[j])
            .filter(|&p| p > 0.0)
            .collect();
        match quantile(&proportions, 0.75) {
            Some(q) if q > 0.0 => upper_quartiles.push(q),
            _ => {
                return Err(NoiseqError::DegenerateNormalization {
                    sample: matrix.samples()[j].clone(),
                    reason: "no positive counts to rank against the reference".to_string(),
                });
            }
        }
    }

    let log_sum: f64 = upper_quartiles.iter().map(|q| q.ln()).sum();
    let log_mean = log_sum / upper_quartiles.len() as f64;
    let geo_mean = log_mean.exp();

    Ok(upper_quartiles
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let diff_a = (*a - geo_mean).abs();
            let diff_b = (*b - geo_mean).abs();
            diff_a.partial_cmp(&diff_b).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(idx, _)| idx)
        .unwrap_or(0))
}

/// TMM factor of `obs` relative to `reference`, `None` if no feature is usable.
fn calculate_tmm_factor(
    obs: &[f64],
    reference: &[f64],
    obs_lib: f64,
    ref_lib: f64,
    config: &TmmConfig,
) -> Option<f64> {
    // (M, A, variance) for features present in both samples
    let mut log_ratios = Vec::new();
    let mut abundances = Vec::new();
    let mut variances = Vec::new();

    for (&o, &r) in obs.iter().zip(reference) {
        if o <= 0.0 || r <= 0.0 {
            continue;
        }
        let prop_o = o / obs_lib;
        let prop_r = r / ref_lib;
        let m = (prop_o / prop_r).log2();
        let a = 0.5 * (prop_o.log2() + prop_r.log2());
        // Var(M) ≈ (N-Y)/NY + (N'-Y')/N'Y'
        let v = (obs_lib - o) / (obs_lib * o) + (ref_lib - r) / (ref_lib * r);
        if m.is_finite() && a.is_finite() && v > 0.0 {
            log_ratios.push(m);
            abundances.push(a);
            variances.push(v);
        }
    }

    let n = log_ratios.len();
    if n == 0 {
        return None;
    }

    let lo_m = (n as f64 * config.trim_m).floor() + 1.0;
    let hi_m = n as f64 + 1.0 - lo_m;
    let lo_a = (n as f64 * config.trim_a).floor() + 1.0;
    let hi_a = n as f64 + 1.0 - lo_a;

    let rank_m = average_ranks(&log_ratios);
    let rank_a = average_ranks(&abundances);

    let mut sum_weighted_m = 0.0;
    let mut sum_weights = 0.0;
    for i in 0..n {
        let keep = rank_m[i] >= lo_m && rank_m[i] <= hi_m && rank_a[i] >= lo_a && rank_a[i] <= hi_a;
        if !keep {
            continue;
        }
        let w = if config.weighted { 1.0 / variances[i] } else { 1.0 };
        sum_weighted_m += log_ratios[i] * w;
        sum_weights += w;
    }

    if sum_weights <= 0.0 {
        return Some(1.0);
    }

    Some(2f64.powf(sum_weighted_m / sum_weights))
}
