//! Between-sample normalization of raw counts.
//!
//! Every method takes a raw [`ExpressionMatrix`] and returns a
//! [`NormalizedMatrix`] of identical shape in which each column has been
//! divided by a single per-sample correction factor (and, optionally, each
//! row by a length term). Zero counts stay zero; they are only excluded from
//! the percentile and log-ratio computations that derive the factors.

use ndarray::Array2;

use crate::data::{require_lengths, ExpressionMatrix, FeatureAnnotation};
use crate::error::{NoiseqError, Result};

pub mod rpkm;
pub mod tmm;
pub mod upper_quartile;

pub use rpkm::{rpkm, RpkmConfig};
pub use tmm::{tmm, tmm_factors, TmmConfig};
pub use upper_quartile::{upper_quartile, UpperQuartileConfig};

/// Normalization applied before noise modelling.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizationMethod {
    /// Counts are used as they are.
    None,
    Rpkm(RpkmConfig),
    UpperQuartile(UpperQuartileConfig),
    Tmm(TmmConfig),
}

impl Default for NormalizationMethod {
    fn default() -> Self {
        NormalizationMethod::Tmm(TmmConfig::default())
    }
}

impl NormalizationMethod {
    pub fn name(&self) -> &'static str {
        match self {
            NormalizationMethod::None => "none",
            NormalizationMethod::Rpkm(_) => "rpkm",
            NormalizationMethod::UpperQuartile(_) => "uqua",
            NormalizationMethod::Tmm(_) => "tmm",
        }
    }

    pub fn validate(&self) -> Result<()> {
        let exponent_ok = |e: Option<f64>| e.is_none_or(|e| e.is_finite());
        match self {
            NormalizationMethod::None => Ok(()),
            NormalizationMethod::Rpkm(c) => {
                if c.length_exponent.is_finite() {
                    Ok(())
                } else {
                    Err(NoiseqError::invalid("length_exponent", "must be finite"))
                }
            }
            NormalizationMethod::UpperQuartile(c) => {
                if !exponent_ok(c.length_exponent) {
                    return Err(NoiseqError::invalid("length_exponent", "must be finite"));
                }
                if !(c.min_count >= 0.0 && c.min_count.is_finite()) {
                    return Err(NoiseqError::invalid("min_count", "must be a non-negative number"));
                }
                Ok(())
            }
            NormalizationMethod::Tmm(c) => {
                if !exponent_ok(c.length_exponent) {
                    return Err(NoiseqError::invalid("length_exponent", "must be finite"));
                }
                c.validate()
            }
        }
    }

    /// Whether this configuration needs feature lengths.
    pub fn requires_lengths(&self) -> bool {
        match self {
            NormalizationMethod::None => false,
            NormalizationMethod::Rpkm(_) => true,
            NormalizationMethod::UpperQuartile(c) => c.length_exponent.is_some(),
            NormalizationMethod::Tmm(c) => c.length_exponent.is_some(),
        }
    }
}

/// Scale-corrected values with the factors that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMatrix {
    features: Vec<String>,
    samples: Vec<String>,
    values: Array2<f64>,
    method: &'static str,
    factors: Vec<f64>,
}

impl NormalizedMatrix {
    pub(crate) fn new(
        source: &ExpressionMatrix,
        values: Array2<f64>,
        method: &'static str,
        factors: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(values.dim(), source.counts().dim());
        NormalizedMatrix {
            features: source.features().to_vec(),
            samples: source.samples().to_vec(),
            values,
            method,
            factors,
        }
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn get(&self, feature: usize, sample: usize) -> f64 {
        self.values[[feature, sample]]
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    /// The value each sample's counts were divided by.
    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }
}

/// Apply `method` to `matrix`.
pub fn normalize(
    matrix: &ExpressionMatrix,
    annotation: Option<&FeatureAnnotation>,
    method: &NormalizationMethod,
) -> Result<NormalizedMatrix> {
    match method {
        NormalizationMethod::None => {
            let factors = vec![1.0; matrix.n_samples()];
            Ok(NormalizedMatrix::new(matrix, matrix.counts().clone(), "none", factors))
        }
        NormalizationMethod::Rpkm(config) => rpkm(matrix, annotation, config),
        NormalizationMethod::UpperQuartile(config) => upper_quartile(matrix, annotation, config),
        NormalizationMethod::Tmm(config) => tmm(matrix, annotation, config),
    }
}

/// Per-feature length divisors `(length / 1000)^exponent`, if an exponent is set.
pub(crate) fn length_divisors(
    matrix: &ExpressionMatrix,
    annotation: Option<&FeatureAnnotation>,
    exponent: Option<f64>,
    operation: &str,
) -> Result<Option<Vec<f64>>> {
    let Some(exponent) = exponent else {
        return Ok(None);
    };
    let lengths = require_lengths(annotation, matrix.features(), operation)?;
    Ok(Some(lengths.iter().map(|l| (l / 1000.0).powf(exponent)).collect()))
}

/// Divide each row by its length divisor.
pub(crate) fn apply_length_divisors(counts: &Array2<f64>, divisors: Option<&[f64]>) -> Array2<f64> {
    let mut out = counts.clone();
    if let Some(divisors) = divisors {
        for (mut row, &d) in out.rows_mut().into_iter().zip(divisors) {
            row.mapv_inplace(|v| v / d);
        }
    }
    out
}
