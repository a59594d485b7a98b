//! Differential-expression statistics and result tables.
//!
//! Two variants share the M/D primitives of [`crate::testing::effect`]:
//!
//! - **[`noiseq`]**: probability read from the joint (|M|, |D|) distribution
//!   of within-condition noise (technical or simulated replicates)
//! - **[`bio`]**: NOISeqBIO, a θ statistic scored against a permutation null
//!   through a two-density mixture (biological replicates)
//!
//! Probabilities are bounded confidence scores, not p-values.

use std::collections::HashMap;

use crate::data::FeatureAnnotation;
use crate::error::{NoiseqError, Result};

pub mod bio;
pub mod density;
pub mod ecdf;
pub mod noiseq;

pub use bio::{noiseq_bio_scores, BioConfig, BioFit};
pub use noiseq::noiseq_scores;

/// Statistics of one feature, before identifiers and annotation are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureScore {
    pub mean_a: f64,
    pub mean_b: f64,
    pub m: f64,
    pub d: f64,
    /// NOISeqBIO only.
    pub theta: Option<f64>,
    pub prob: f64,
    pub ranking: f64,
}

/// One row of a [`DeTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeRecord {
    pub feature_id: String,
    /// Mean normalized expression in the first condition.
    pub mean_a: f64,
    /// Mean normalized expression in the second condition.
    pub mean_b: f64,
    /// log2(mean_a / mean_b).
    pub m: f64,
    /// mean_a - mean_b.
    pub d: f64,
    pub theta: Option<f64>,
    /// Probability of differential expression in [0, 1].
    pub prob: f64,
    pub ranking: f64,
    pub length: Option<f64>,
    pub gc: Option<f64>,
    pub biotype: Option<String>,
    pub chromosome: Option<String>,
}

/// How a run was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMetadata {
    /// `"{level_a}_vs_{level_b}"`.
    pub comparison: String,
    pub level_a: String,
    pub level_b: String,
    pub normalization: String,
    /// Per-sample normalization factors, in compared-sample order.
    pub factors: Vec<f64>,
    pub replicate_mode: String,
    /// Value zero counts were replaced with.
    pub k_used: f64,
    /// Features removed by the low-count filter.
    pub n_filtered: usize,
    /// q threshold the run was configured with.
    pub q: f64,
    pub noise_size: Option<usize>,
    pub a0_m: Option<f64>,
    pub a0_d: Option<f64>,
    pub p0: Option<f64>,
}

/// Direction of change relative to the first condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Higher in the first condition (M > 0).
    Up,
    /// Higher in the second condition (M < 0).
    Down,
    #[default]
    Both,
}

/// Extra conditions applied by [`DeTable::degenes`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Selection {
    /// Smallest |M| to report.
    pub min_abs_m: f64,
    pub direction: Direction,
}

/// Per-feature results of a run, in input feature order.
#[derive(Debug, Clone)]
pub struct DeTable {
    rows: Vec<DeRecord>,
    index: HashMap<String, usize>,
    metadata: RunMetadata,
}

impl DeTable {
    /// Attach feature identifiers and annotation to `scores`.
    pub fn from_scores(
        features: &[String],
        scores: Vec<FeatureScore>,
        annotation: Option<&FeatureAnnotation>,
        metadata: RunMetadata,
    ) -> Result<Self> {
        if features.len() != scores.len() {
            return Err(NoiseqError::DimensionMismatch {
                what: "feature scores".to_string(),
                expected: features.len(),
                actual: scores.len(),
            });
        }

        let rows: Vec<DeRecord> = features
            .iter()
            .zip(scores)
            .map(|(id, s)| {
                let info = annotation.and_then(|a| a.get(id));
                DeRecord {
                    feature_id: id.clone(),
                    mean_a: s.mean_a,
                    mean_b: s.mean_b,
                    m: s.m,
                    d: s.d,
                    theta: s.theta,
                    prob: s.prob,
                    ranking: s.ranking,
                    length: info.and_then(|i| i.length),
                    gc: info.and_then(|i| i.gc),
                    biotype: info.and_then(|i| i.biotype.clone()),
                    chromosome: info.and_then(|i| i.chromosome.clone()),
                }
            })
            .collect();
        let index = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.feature_id.clone(), i))
            .collect();

        Ok(DeTable { rows, index, metadata })
    }

    pub fn rows(&self) -> &[DeRecord] {
        &self.rows
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, feature_id: &str) -> Option<&DeRecord> {
        self.index.get(feature_id).map(|&i| &self.rows[i])
    }

    /// Features with probability ≥ `q` that pass `selection`, most probable first.
    ///
    /// `q = 0` with the default selection returns every row.
    pub fn degenes(&self, q: f64, selection: &Selection) -> Result<Vec<&DeRecord>> {
        if !(0.0..=1.0).contains(&q) {
            return Err(NoiseqError::invalid("q", "must be in [0, 1]"));
        }
        if !(selection.min_abs_m >= 0.0) {
            return Err(NoiseqError::invalid("min_abs_m", "must be non-negative"));
        }

        let mut selected: Vec<&DeRecord> = self
            .rows
            .iter()
            .filter(|r| r.prob >= q && r.m.abs() >= selection.min_abs_m)
            .filter(|r| match selection.direction {
                Direction::Up => r.m > 0.0,
                Direction::Down => r.m < 0.0,
                Direction::Both => true,
            })
            .collect();
        selected.sort_by(|a, b| b.prob.total_cmp(&a.prob));
        Ok(selected)
    }

    /// Features at the run's configured q threshold.
    pub fn differentially_expressed(&self) -> Vec<&DeRecord> {
        self.rows.iter().filter(|r| r.prob >= self.metadata.q).collect()
    }
}
