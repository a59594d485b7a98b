//! Reads per kilobase of feature length per million mapped reads.

use log::debug;

use crate::data::{require_lengths, ExpressionMatrix, FeatureAnnotation};
use crate::error::{NoiseqError, Result};
use crate::normalization::NormalizedMatrix;

#[derive(Debug, Clone, PartialEq)]
pub struct RpkmConfig {
    /// Exponent applied to `length / 1000` (default: 1.0, plain RPKM).
    pub length_exponent: f64,
}

impl Default for RpkmConfig {
    fn default() -> Self {
        Self { length_exponent: 1.0 }
    }
}

/// `count / (library / 1e6) / (length / 1000)^lc` for every cell.
///
/// Requires a length for every feature.
pub fn rpkm(
    matrix: &ExpressionMatrix,
    annotation: Option<&FeatureAnnotation>,
    config: &RpkmConfig,
) -> Result<NormalizedMatrix> {
    let lengths = require_lengths(annotation, matrix.features(), "RPKM")?;
    let library_sizes = matrix.library_sizes();

    for (j, &lib) in library_sizes.iter().enumerate() {
        if lib <= 0.0 {
            return Err(NoiseqError::DegenerateNormalization {
                sample: matrix.samples()[j].clone(),
                reason: "library size is zero".to_string(),
            });
        }
    }

    let per_million: Vec<f64> = library_sizes.iter().map(|l| l / 1e6).collect();
    let kilobases: Vec<f64> = lengths
        .iter()
        .map(|l| (l / 1000.0).powf(config.length_exponent))
        .collect();

    let mut values = matrix.counts().clone();
    for ((i, j), v) in values.indexed_iter_mut() {
        *v = *v / per_million[j] / kilobases[i];
    }

    debug!("RPKM scaling with library sizes {:?}", library_sizes);
    Ok(NormalizedMatrix::new(matrix, values, "rpkm", per_million))
}
