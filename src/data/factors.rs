use std::collections::HashMap;

use crate::data::{check_unique, ExpressionMatrix};
use crate::error::{NoiseqError, Result};

/// Categorical labels (condition, batch, lane, ...) attached to every sample.
#[derive(Debug, Clone, Default)]
pub struct FactorAssignment {
    samples: Vec<String>,
    factors: Vec<(String, Vec<String>)>,
}

impl FactorAssignment {
    /// Start an assignment over `samples`; sample ids must be unique.
    pub fn new(samples: Vec<String>) -> Result<Self> {
        check_unique("sample", &samples)?;
        Ok(FactorAssignment {
            samples,
            factors: Vec::new(),
        })
    }

    /// Add a factor with one label per sample, in sample order.
    pub fn with_factor(mut self, name: &str, labels: Vec<String>) -> Result<Self> {
        if labels.len() != self.samples.len() {
            return Err(NoiseqError::DimensionMismatch {
                what: format!("labels of factor '{}'", name),
                expected: self.samples.len(),
                actual: labels.len(),
            });
        }
        if self.factors.iter().any(|(n, _)| n == name) {
            return Err(NoiseqError::DuplicateIdentifier {
                kind: "factor".to_string(),
                id: name.to_string(),
            });
        }
        self.factors.push((name.to_string(), labels));
        Ok(self)
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn labels(&self, factor: &str) -> Result<&[String]> {
        self.factors
            .iter()
            .find(|(n, _)| n == factor)
            .map(|(_, l)| l.as_slice())
            .ok_or_else(|| NoiseqError::UnknownFactor(factor.to_string()))
    }

    /// Distinct levels of a factor in order of first appearance.
    pub fn levels(&self, factor: &str) -> Result<Vec<String>> {
        let mut levels: Vec<String> = Vec::new();
        for label in self.labels(factor)? {
            if !levels.contains(label) {
                levels.push(label.clone());
            }
        }
        Ok(levels)
    }

    /// Samples grouped by level, levels in order of first appearance.
    pub fn groups(&self, factor: &str) -> Result<Vec<(String, Vec<String>)>> {
        let labels = self.labels(factor)?;
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        let mut slot: HashMap<&str, usize> = HashMap::new();
        for (sample, label) in self.samples.iter().zip(labels) {
            let idx = *slot.entry(label.as_str()).or_insert_with(|| {
                groups.push((label.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[idx].1.push(sample.clone());
        }
        Ok(groups)
    }

    /// Check that every matrix sample carries a label for every factor.
    pub fn validate_against(&self, matrix: &ExpressionMatrix) -> Result<()> {
        for sample in matrix.samples() {
            if !self.samples.contains(sample) {
                return Err(NoiseqError::invalid(
                    "factors",
                    format!("sample '{}' has no factor labels", sample),
                ));
            }
        }
        Ok(())
    }

    /// Resolve the two levels compared in one run.
    ///
    /// Without explicit levels the factor must have exactly two levels; with
    /// them, samples of any other level are left out of the comparison.
    pub fn resolve_comparison(
        &self,
        factor: &str,
        levels: Option<(&str, &str)>,
    ) -> Result<Comparison> {
        let available = self.levels(factor)?;
        let (level_a, level_b) = match levels {
            Some((a, b)) => {
                for level in [a, b] {
                    if !available.iter().any(|l| l == level) {
                        return Err(NoiseqError::UnknownLevel {
                            factor: factor.to_string(),
                            level: level.to_string(),
                        });
                    }
                }
                if a == b {
                    return Err(NoiseqError::InvalidFactorCardinality {
                        factor: factor.to_string(),
                        levels: 1,
                    });
                }
                (a.to_string(), b.to_string())
            }
            None => {
                if available.len() != 2 {
                    return Err(NoiseqError::InvalidFactorCardinality {
                        factor: factor.to_string(),
                        levels: available.len(),
                    });
                }
                (available[0].clone(), available[1].clone())
            }
        };

        let labels = self.labels(factor)?;
        let members = |level: &str| -> Vec<String> {
            self.samples
                .iter()
                .zip(labels)
                .filter(|(_, l)| l.as_str() == level)
                .map(|(s, _)| s.clone())
                .collect()
        };

        Ok(Comparison {
            factor: factor.to_string(),
            samples_a: members(&level_a),
            samples_b: members(&level_b),
            level_a,
            level_b,
        })
    }
}

/// The two sides of a pairwise comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub factor: String,
    pub level_a: String,
    pub level_b: String,
    pub samples_a: Vec<String>,
    pub samples_b: Vec<String>,
}

impl Comparison {
    pub fn label(&self) -> String {
        format!("{}_vs_{}", self.level_a, self.level_b)
    }

    /// Samples of both sides, A first.
    pub fn all_samples(&self) -> Vec<String> {
        self.samples_a.iter().chain(&self.samples_b).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn assignment() -> FactorAssignment {
        FactorAssignment::new(strings(&["s1", "s2", "s3", "s4", "s5"]))
            .unwrap()
            .with_factor("tissue", strings(&["brain", "brain", "liver", "liver", "kidney"]))
            .unwrap()
            .with_factor("batch", strings(&["b1", "b2", "b1", "b2", "b1"]))
            .unwrap()
    }

    #[test]
    fn test_levels_in_appearance_order() {
        let f = assignment();
        assert_eq!(f.levels("tissue").unwrap(), strings(&["brain", "liver", "kidney"]));
        let groups = f.groups("batch").unwrap();
        assert_eq!(groups[0].1, strings(&["s1", "s3", "s5"]));
    }

    #[test]
    fn test_three_levels_need_explicit_pair() {
        let f = assignment();
        let err = f.resolve_comparison("tissue", None).unwrap_err();
        assert!(matches!(err, NoiseqError::InvalidFactorCardinality { levels: 3, .. }));

        let cmp = f.resolve_comparison("tissue", Some(("liver", "brain"))).unwrap();
        assert_eq!(cmp.samples_a, strings(&["s3", "s4"]));
        assert_eq!(cmp.samples_b, strings(&["s1", "s2"]));
        assert_eq!(cmp.label(), "liver_vs_brain");
    }

    #[test]
    fn test_unknown_factor_and_level() {
        let f = assignment();
        assert!(matches!(f.levels("lane"), Err(NoiseqError::UnknownFactor(_))));
        assert!(matches!(
            f.resolve_comparison("tissue", Some(("liver", "heart"))),
            Err(NoiseqError::UnknownLevel { .. })
        ));
    }

    #[test]
    fn test_label_count_mismatch() {
        let f = FactorAssignment::new(strings(&["s1", "s2"])).unwrap();
        assert!(f.with_factor("tissue", strings(&["a"])).is_err());
    }

    #[test]
    fn test_repeated_sample_id() {
        assert!(matches!(
            FactorAssignment::new(strings(&["s1", "s2", "s1"])),
            Err(NoiseqError::DuplicateIdentifier { ref kind, ref id })
                if kind == "sample" && id == "s1"
        ));
    }
}
