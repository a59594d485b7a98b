//! Per-feature hypothesis tests.
//!
//! - **[`nonparametric`]**: one-sample Wilcoxon signed-rank test
//! - **[`discrete`]**: one-sample proportion test

pub mod discrete;

pub mod nonparametric;

pub use discrete::proportion_test;
pub use nonparametric::{signed_rank_matrix_rows, wilcoxon_signed_rank};
