use std::collections::HashSet;

use nalgebra_sparse::CsrMatrix;
use ndarray::{Array2, ArrayView1, Axis};
use num_traits::NumCast;
use single_utilities::traits::FloatOpsTS;

use crate::error::{NoiseqError, Result};

/// Feature-by-sample count matrix.
///
/// Rows are features (genes, transcripts), columns are samples. Values are
/// non-negative and finite; the shape is fixed once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMatrix {
    features: Vec<String>,
    samples: Vec<String>,
    counts: Array2<f64>,
}

impl ExpressionMatrix {
    /// Build a matrix from identifiers and a dense `features × samples` array.
    pub fn new(features: Vec<String>, samples: Vec<String>, counts: Array2<f64>) -> Result<Self> {
        if counts.nrows() != features.len() {
            return Err(NoiseqError::DimensionMismatch {
                what: "feature rows".to_string(),
                expected: features.len(),
                actual: counts.nrows(),
            });
        }
        if counts.ncols() != samples.len() {
            return Err(NoiseqError::DimensionMismatch {
                what: "sample columns".to_string(),
                expected: samples.len(),
                actual: counts.ncols(),
            });
        }
        if features.is_empty() || samples.is_empty() {
            return Err(NoiseqError::EmptyData(
                "expression matrix needs at least one feature and one sample".to_string(),
            ));
        }
        check_unique("feature", &features)?;
        check_unique("sample", &samples)?;

        if let Some(((row, col), value)) = counts
            .indexed_iter()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(NoiseqError::invalid(
                "counts",
                format!(
                    "value {} for feature '{}' in sample '{}' is not a non-negative finite count",
                    value, features[row], samples[col]
                ),
            ));
        }

        Ok(ExpressionMatrix {
            features,
            samples,
            counts,
        })
    }

    /// Build a matrix from row-major nested vectors, one inner vector per feature.
    pub fn from_rows(
        features: Vec<String>,
        samples: Vec<String>,
        rows: &[Vec<f64>],
    ) -> Result<Self> {
        let n_samples = samples.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != n_samples) {
            return Err(NoiseqError::DimensionMismatch {
                what: "row length".to_string(),
                expected: n_samples,
                actual: bad.len(),
            });
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let counts = Array2::from_shape_vec((rows.len(), n_samples), flat)
            .map_err(|e| NoiseqError::invalid("counts", e.to_string()))?;
        Self::new(features, samples, counts)
    }

    /// Densify a sparse `features × samples` matrix; absent entries are zero counts.
    pub fn from_csr<T>(
        features: Vec<String>,
        samples: Vec<String>,
        matrix: &CsrMatrix<T>,
    ) -> Result<Self>
    where
        T: FloatOpsTS,
    {
        let mut counts = Array2::<f64>::zeros((matrix.nrows(), matrix.ncols()));
        for (row, col, value) in matrix.triplet_iter() {
            counts[[row, col]] = <f64 as NumCast>::from(*value).unwrap_or(f64::NAN);
        }
        Self::new(features, samples, counts)
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn counts(&self) -> &Array2<f64> {
        &self.counts
    }

    pub fn get(&self, feature: usize, sample: usize) -> f64 {
        self.counts[[feature, sample]]
    }

    pub fn row(&self, feature: usize) -> ArrayView1<'_, f64> {
        self.counts.row(feature)
    }

    /// Total count of each sample.
    pub fn library_sizes(&self) -> Vec<f64> {
        self.counts.sum_axis(Axis(0)).to_vec()
    }

    /// Column indices of the named samples, in the given order.
    pub fn sample_indices(&self, samples: &[String]) -> Result<Vec<usize>> {
        samples
            .iter()
            .map(|s| {
                self.samples.iter().position(|x| x == s).ok_or_else(|| {
                    NoiseqError::invalid("samples", format!("sample '{}' is not in the matrix", s))
                })
            })
            .collect()
    }

    /// A new matrix restricted to the given rows, in the given order.
    pub fn select_features(&self, rows: &[usize]) -> Result<Self> {
        if rows.is_empty() {
            return Err(NoiseqError::EmptyData("no features selected".to_string()));
        }
        let features = rows.iter().map(|&i| self.features[i].clone()).collect();
        Ok(ExpressionMatrix {
            features,
            samples: self.samples.clone(),
            counts: self.counts.select(Axis(0), rows),
        })
    }

    /// A new matrix restricted to the given columns, in the given order.
    pub fn select_samples(&self, cols: &[usize]) -> Result<Self> {
        if cols.is_empty() {
            return Err(NoiseqError::EmptyData("no samples selected".to_string()));
        }
        let samples = cols.iter().map(|&j| self.samples[j].clone()).collect();
        Ok(ExpressionMatrix {
            features: self.features.clone(),
            samples,
            counts: self.counts.select(Axis(1), cols),
        })
    }
}

pub(crate) fn check_unique(kind: &str, ids: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(NoiseqError::DuplicateIdentifier {
                kind: kind.to_string(),
                id: id.clone(),
            });
        }
    }
    Ok(())
}

/// Assemble a `rows × columns.len()` array from per-column vectors.
pub(crate) fn from_columns(rows: usize, columns: Vec<Vec<f64>>) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((rows, columns.len()));
    for (j, col) in columns.into_iter().enumerate() {
        for (i, value) in col.into_iter().enumerate() {
            out[[i, j]] = value;
        }
    }
    out
}
