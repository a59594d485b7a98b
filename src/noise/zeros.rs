use ndarray::Array2;

use crate::error::{NoiseqError, Result};

/// How zero expression values are replaced before any log ratio is taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZeroSubstitution {
    /// Replace zeros with a fixed pseudo-count `k`.
    PseudoCount(f64),
    /// Replace zeros with half of the smallest non-zero value in the matrix.
    Midpoint,
}

impl Default for ZeroSubstitution {
    fn default() -> Self {
        ZeroSubstitution::PseudoCount(0.5)
    }
}

impl ZeroSubstitution {
    /// `Some(k)` is a pseudo-count, `None` the midpoint rule.
    pub fn from_k(k: Option<f64>) -> Self {
        match k {
            Some(k) => ZeroSubstitution::PseudoCount(k),
            None => ZeroSubstitution::Midpoint,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let ZeroSubstitution::PseudoCount(k) = self {
            if !(*k > 0.0 && k.is_finite()) {
                return Err(NoiseqError::invalid("k", "pseudo-count must be positive and finite"));
            }
        }
        Ok(())
    }

    /// The value zeros are replaced with in `values`.
    pub fn replacement(&self, values: &Array2<f64>) -> Result<f64> {
        self.validate()?;
        match self {
            ZeroSubstitution::PseudoCount(k) => Ok(*k),
            ZeroSubstitution::Midpoint => values
                .iter()
                .copied()
                .filter(|&v| v > 0.0)
                .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
                .map(|min| min / 2.0)
                .ok_or_else(|| NoiseqError::EmptyData("matrix has no non-zero value".to_string())),
        }
    }

    /// A copy of `values` with zeros replaced, and the replacement used.
    pub fn apply(&self, values: &Array2<f64>) -> Result<(Array2<f64>, f64)> {
        let replacement = self.replacement(values)?;
        Ok((replace_zeros(values, replacement), replacement))
    }
}

/// Replace every zero cell with `replacement`.
pub fn replace_zeros(values: &Array2<f64>, replacement: f64) -> Array2<f64> {
    values.mapv(|v| if v == 0.0 { replacement } else { v })
}
