//! Low-count feature filtering.
//!
//! Three strategies decide, per condition, whether a feature carries enough
//! signal to be analysed. A feature is kept when at least one condition
//! accepts it; a feature that is zero in every sample is always dropped.
//!
//! - **CPM**: summed counts-per-million over the condition exceed
//!   `cpm × samples`, optionally with a bounded coefficient of variation
//! - **Wilcoxon**: one-sided signed-rank test of "median > 0"
//! - **Proportion**: one-sided test of "relative abundance > cpm / 1e6"

use log::{debug, warn};
use rayon::prelude::*;

use crate::data::{ExpressionMatrix, FactorAssignment};
use crate::error::{NoiseqError, Result};
use crate::testing::correction::{adjust_p_values, PAdjustMethod};
use crate::testing::inference::{proportion_test, signed_rank_matrix_rows};
use crate::testing::utils::{mean, std_dev};
use crate::testing::Alternative;

/// Samples per condition below which the Wilcoxon filter has little power.
pub const WILCOXON_MIN_SAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMethod {
    Cpm,
    Wilcoxon,
    Proportion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    pub method: FilterMethod,
    /// CPM threshold (CPM method) or null abundance in CPM (proportion method).
    pub cpm: f64,
    /// Maximum coefficient of variation in percent (CPM method); `None` disables it.
    pub cv_cutoff: Option<f64>,
    /// Correction applied per condition across features (test-based methods).
    pub p_adjust: PAdjustMethod,
    /// Retention threshold on the smallest corrected p-value.
    pub alpha: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            method: FilterMethod::Cpm,
            cpm: 1.0,
            cv_cutoff: Some(100.0),
            p_adjust: PAdjustMethod::BenjaminiHochberg,
            alpha: 0.05,
        }
    }
}

impl FilterConfig {
    pub fn with_method(method: FilterMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.cpm >= 0.0 && self.cpm.is_finite()) {
            return Err(NoiseqError::invalid("cpm", "must be a non-negative number"));
        }
        if self.method == FilterMethod::Proportion && !(self.cpm > 0.0 && self.cpm < 1e6) {
            return Err(NoiseqError::invalid("cpm", "proportion test needs 0 < cpm < 1e6"));
        }
        if let Some(cv) = self.cv_cutoff {
            if !(cv > 0.0) {
                return Err(NoiseqError::invalid("cv_cutoff", "must be positive"));
            }
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(NoiseqError::invalid("alpha", "must be in [0, 1]"));
        }
        Ok(())
    }
}

/// Which features survived, and the matrix restricted to them.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub retained: Vec<bool>,
    pub matrix: ExpressionMatrix,
}

impl FilterOutcome {
    pub fn n_retained(&self) -> usize {
        self.retained.iter().filter(|&&k| k).count()
    }

    pub fn n_dropped(&self) -> usize {
        self.retained.len() - self.n_retained()
    }
}

/// Filter `matrix` using the conditions defined by `factor`.
pub fn filter_low_counts(
    matrix: &ExpressionMatrix,
    factors: &FactorAssignment,
    factor: &str,
    config: &FilterConfig,
) -> Result<FilterOutcome> {
    config.validate()?;
    let conditions = condition_columns(matrix, factors, factor)?;

    let retained = match config.method {
        FilterMethod::Cpm => cpm_filter(matrix, &conditions, config),
        FilterMethod::Wilcoxon => wilcoxon_filter(matrix, &conditions, config)?,
        FilterMethod::Proportion => proportion_filter(matrix, &conditions, config)?,
    };

    // All-zero rows never pass, whatever the test said
    let retained: Vec<bool> = retained
        .into_iter()
        .enumerate()
        .map(|(i, keep)| keep && matrix.row(i).iter().any(|&v| v > 0.0))
        .collect();

    let rows: Vec<usize> = retained
        .iter()
        .enumerate()
        .filter_map(|(i, &keep)| if keep { Some(i) } else { None })
        .collect();

    if rows.is_empty() {
        return Err(NoiseqError::EmptyData(
            "every feature was removed by the low-count filter".to_string(),
        ));
    }

    let dropped = matrix.n_features() - rows.len();
    if dropped > 0 {
        warn!(
            "{:?} filter removed {} of {} features",
            config.method,
            dropped,
            matrix.n_features()
        );
    }

    Ok(FilterOutcome {
        matrix: matrix.select_features(&rows)?,
        retained,
    })
}

/// Column indices of every level of `factor` among the matrix samples.
fn condition_columns(
    matrix: &ExpressionMatrix,
    factors: &FactorAssignment,
    factor: &str,
) -> Result<Vec<(String, Vec<usize>)>> {
    factors.validate_against(matrix)?;
    let mut conditions = Vec::new();
    for (level, samples) in factors.groups(factor)? {
        let present: Vec<String> = samples
            .into_iter()
            .filter(|s| matrix.samples().contains(s))
            .collect();
        if !present.is_empty() {
            conditions.push((level, matrix.sample_indices(&present)?));
        }
    }
    Ok(conditions)
}

fn cpm_filter(
    matrix: &ExpressionMatrix,
    conditions: &[(String, Vec<usize>)],
    config: &FilterConfig,
) -> Vec<bool> {
    let library_sizes = matrix.library_sizes();

    (0..matrix.n_features())
        .into_par_iter()
        .map(|i| {
            conditions.iter().any(|(_, cols)| {
                let cpm: Vec<f64> = cols
                    .iter()
                    .map(|&j| {
                        if library_sizes[j] > 0.0 {
                            matrix.get(i, j) / library_sizes[j] * 1e6
                        } else {
                            0.0
                        }
                    })
                    .collect();
                let total: f64 = cpm.iter().sum();
                if total <= config.cpm * cols.len() as f64 {
                    return false;
                }
                match config.cv_cutoff {
                    Some(cutoff) => coefficient_of_variation(&cpm) <= cutoff,
                    None => true,
                }
            })
        })
        .collect()
}

/// Coefficient of variation in percent; zero for a single value.
fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if values.len() < 2 || m <= 0.0 {
        return 0.0;
    }
    100.0 * std_dev(values) / m
}

fn wilcoxon_filter(
    matrix: &ExpressionMatrix,
    conditions: &[(String, Vec<usize>)],
    config: &FilterConfig,
) -> Result<Vec<bool>> {
    for (level, cols) in conditions {
        if cols.len() < WILCOXON_MIN_SAMPLES {
            warn!(
                "Wilcoxon filter on condition '{}' with {} sample(s); at least {} are recommended",
                level,
                cols.len(),
                WILCOXON_MIN_SAMPLES
            );
        }
    }

    let mut per_condition = Vec::with_capacity(conditions.len());
    for (_, cols) in conditions {
        let results = signed_rank_matrix_rows(matrix.counts(), cols, 0.0, Alternative::Greater)?;
        let p_values: Vec<f64> = results.iter().map(|r| r.p_value).collect();
        per_condition.push(adjust_p_values(&p_values, config.p_adjust)?);
    }
    Ok(retain_by_min_p(matrix.n_features(), &per_condition, config.alpha))
}

fn proportion_filter(
    matrix: &ExpressionMatrix,
    conditions: &[(String, Vec<usize>)],
    config: &FilterConfig,
) -> Result<Vec<bool>> {
    let library_sizes = matrix.library_sizes();
    let p0 = config.cpm / 1e6;

    let mut per_condition = Vec::with_capacity(conditions.len());
    for (_, cols) in conditions {
        let trials: f64 = cols.iter().map(|&j| library_sizes[j]).sum();
        let p_values: Vec<f64> = (0..matrix.n_features())
            .into_par_iter()
            .map(|i| {
                let successes: f64 = cols.iter().map(|&j| matrix.get(i, j)).sum();
                proportion_test(successes, trials, p0, Alternative::Greater).p_value
            })
            .collect();
        per_condition.push(adjust_p_values(&p_values, config.p_adjust)?);
    }
    debug!("proportion filter against p0 = {}", p0);
    Ok(retain_by_min_p(matrix.n_features(), &per_condition, config.alpha))
}

fn retain_by_min_p(n_features: usize, per_condition: &[Vec<f64>], alpha: f64) -> Vec<bool> {
    (0..n_features)
        .map(|i| {
            per_condition
                .iter()
                .map(|p| p[i])
                .fold(f64::INFINITY, f64::min)
                <= alpha
        })
        .collect()
}
