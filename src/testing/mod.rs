//! Statistical primitives shared by the filter, the noise model and the DE engine.
//!
//! - **[`inference`]**: one-sample Wilcoxon signed-rank and proportion tests
//! - **[`effect`]**: M and D change statistics and the ranking score
//! - **[`correction`]**: multiple testing correction of p-values
//! - **[`utils`]**: quantiles, means and variances over plain slices

use single_utilities::traits::FloatOps;
use std::collections::HashMap;

pub mod correction;
pub mod effect;
pub mod inference;

pub mod utils;

pub use correction::PAdjustMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alternative {
    TwoSided,
    Less,
    Greater,
}

#[derive(Debug, Clone)]
pub struct TestResult<T> {
    /// The test statistic value (e.g., V for signed-rank, X-squared for proportions)
    pub statistic: T,
    /// The p-value of the test
    pub p_value: T,
    /// Point estimate of the tested quantity (if available)
    pub estimate: Option<T>,
    /// Additional test-specific information
    pub metadata: HashMap<String, T>,
}

impl<T> TestResult<T>
where
    T: FloatOps,
{
    /// Create a new test result with minimal information
    pub fn new(statistic: T, p_value: T) -> Self {
        TestResult {
            statistic,
            p_value,
            estimate: None,
            metadata: HashMap::new(),
        }
    }

    /// Add a point estimate to the result
    pub fn with_estimate(mut self, estimate: T) -> Self {
        self.estimate = Some(estimate);
        self
    }

    /// Add additional metadata
    pub fn with_metadata(mut self, key: &str, value: T) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// `value` in the test's float type; NaN if it cannot be represented.
pub(crate) fn cast<T: FloatOps>(value: f64) -> T {
    T::from(value).unwrap_or_else(<T as num_traits::Float>::nan)
}
