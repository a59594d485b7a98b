use std::collections::HashMap;

use crate::error::{NoiseqError, Result};

/// Optional per-feature metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureInfo {
    pub length: Option<f64>,
    /// GC content as a fraction in [0, 1].
    pub gc: Option<f64>,
    pub biotype: Option<String>,
    pub chromosome: Option<String>,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// Feature annotation keyed by feature identifier. Partial coverage is allowed.
#[derive(Debug, Clone, Default)]
pub struct FeatureAnnotation {
    entries: HashMap<String, FeatureInfo>,
}

impl FeatureAnnotation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature: &str, info: FeatureInfo) -> Result<()> {
        if let Some(length) = info.length {
            if !(length > 0.0 && length.is_finite()) {
                return Err(NoiseqError::invalid(
                    "length",
                    format!("feature '{}' has non-positive length {}", feature, length),
                ));
            }
        }
        if let Some(gc) = info.gc {
            if !(0.0..=1.0).contains(&gc) {
                return Err(NoiseqError::invalid(
                    "gc",
                    format!("feature '{}' has GC fraction {} outside [0, 1]", feature, gc),
                ));
            }
        }
        if let (Some(start), Some(end)) = (info.start, info.end) {
            if end < start {
                return Err(NoiseqError::invalid(
                    "end",
                    format!("feature '{}' ends ({}) before it starts ({})", feature, end, start),
                ));
            }
        }
        self.entries.insert(feature.to_string(), info);
        Ok(())
    }

    /// Annotation holding only lengths, in feature order.
    pub fn from_lengths(features: &[String], lengths: &[f64]) -> Result<Self> {
        if features.len() != lengths.len() {
            return Err(NoiseqError::DimensionMismatch {
                what: "feature lengths".to_string(),
                expected: features.len(),
                actual: lengths.len(),
            });
        }
        let mut annotation = Self::new();
        for (feature, &length) in features.iter().zip(lengths) {
            annotation.insert(
                feature,
                FeatureInfo {
                    length: Some(length),
                    ..FeatureInfo::default()
                },
            )?;
        }
        Ok(annotation)
    }

    pub fn get(&self, feature: &str) -> Option<&FeatureInfo> {
        self.entries.get(feature)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lengths for every listed feature, failing on the first one without a length.
    pub fn lengths_for(&self, features: &[String], operation: &str) -> Result<Vec<f64>> {
        features
            .iter()
            .map(|f| {
                self.entries.get(f).and_then(|info| info.length).ok_or_else(|| {
                    NoiseqError::MissingAnnotation {
                        operation: operation.to_string(),
                        feature: f.clone(),
                    }
                })
            })
            .collect()
    }
}

/// Lengths for `features`, or `MissingAnnotation` if no annotation was supplied.
pub(crate) fn require_lengths(
    annotation: Option<&FeatureAnnotation>,
    features: &[String],
    operation: &str,
) -> Result<Vec<f64>> {
    match annotation {
        Some(a) => a.lengths_for(features, operation),
        None => Err(NoiseqError::MissingAnnotation {
            operation: operation.to_string(),
            feature: features.first().cloned().unwrap_or_default(),
        }),
    }
}
