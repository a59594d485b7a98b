//! Input data structures: the count matrix, sample factors and feature annotation.
//!
//! All three are read-only inputs owned by the caller; pipeline stages only
//! borrow them and produce new derived artifacts.

mod annotation;
mod factors;
mod matrix;

pub use annotation::{FeatureAnnotation, FeatureInfo};
pub(crate) use annotation::require_lengths;
pub use factors::{Comparison, FactorAssignment};
pub use matrix::ExpressionMatrix;
pub(crate) use matrix::{check_unique, from_columns};
