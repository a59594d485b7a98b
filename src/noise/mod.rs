//! Noise model: the (M, D) values seen between samples of the same condition.
//!
//! The pooled [`NoiseDistribution`] is the reference the NOISeq probability is
//! read from. Values fed in must already be zero-substituted
//! ([`ZeroSubstitution`]) so every log ratio is finite.

use ndarray::Array2;
use rayon::prelude::*;

use crate::testing::effect::md_pair;

pub mod simulation;
pub mod zeros;

pub use simulation::{simulate_condition, simulate_replicates, SimulationConfig};
pub use zeros::{replace_zeros, ZeroSubstitution};

/// Pooled (M, D) pairs from within-condition comparisons.
///
/// Only the multiset of pairs is meaningful; [`merge`](Self::merge) is
/// associative so pools may be built per replicate pair and combined in any
/// grouping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoiseDistribution {
    m: Vec<f64>,
    d: Vec<f64>,
}

impl NoiseDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Noise of a single replicate pair: one (M, D) per feature.
    pub fn from_pair(values: &Array2<f64>, first: usize, second: usize) -> Self {
        let (m, d): (Vec<f64>, Vec<f64>) = values
            .rows()
            .into_iter()
            .map(|row| md_pair(row[first], row[second]))
            .unzip();
        NoiseDistribution { m, d }
    }

    /// Pool every within-group column pair of `values`.
    pub fn from_replicates(values: &Array2<f64>, groups: &[Vec<usize>]) -> Self {
        replicate_pairs(groups)
            .into_par_iter()
            .map(|(i, j)| Self::from_pair(values, i, j))
            .reduce(Self::new, Self::merge)
    }

    pub fn push(&mut self, m: f64, d: f64) {
        self.m.push(m);
        self.d.push(d);
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.m.extend(other.m);
        self.d.extend(other.d);
        self
    }

    pub fn len(&self) -> usize {
        self.m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }

    pub fn m_values(&self) -> &[f64] {
        &self.m
    }

    pub fn d_values(&self) -> &[f64] {
        &self.d
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.m.iter().copied().zip(self.d.iter().copied())
    }

    /// Pairs in a canonical order, for comparing pools as multisets.
    pub fn sorted_points(&self) -> Vec<(f64, f64)> {
        let mut points: Vec<(f64, f64)> = self.points().collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        points
    }
}

/// Every unordered pair of columns sharing a group.
pub fn replicate_pairs(groups: &[Vec<usize>]) -> Vec<(usize, usize)> {
    groups
        .iter()
        .flat_map(|group| {
            group
                .iter()
                .enumerate()
                .flat_map(move |(pos, &i)| group[pos + 1..].iter().map(move |&j| (i, j)))
        })
        .collect()
}
