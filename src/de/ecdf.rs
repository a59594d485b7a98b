//! Joint empirical distribution of (|M|, |D|) over the noise pool.
//!
//! For every query the fraction of noise points lying strictly inside the
//! rectangle `[0, |M|) × [0, |D|)` is needed. Queries and noise points are
//! swept together in order of |M| while a Fenwick tree over the ranks of
//! |D| counts the points admitted so far, giving `O((n + q) log n)`.

use crate::noise::NoiseDistribution;

/// Count tree over `0..n` positions, 1-based internally.
#[derive(Debug, Clone)]
struct FenwickTree {
    tree: Vec<usize>,
}

impl FenwickTree {
    fn new(n: usize) -> Self {
        Self { tree: vec![0; n + 1] }
    }

    /// Add one at position `i` (0-based).
    fn increment(&mut self, i: usize) {
        let mut idx = i + 1;
        while idx < self.tree.len() {
            self.tree[idx] += 1;
            idx += lowbit(idx);
        }
    }

    /// Total over the first `len` positions.
    fn count_below(&self, len: usize) -> usize {
        let mut idx = len.min(self.tree.len() - 1);
        let mut sum = 0;
        while idx > 0 {
            sum += self.tree[idx];
            idx -= lowbit(idx);
        }
        sum
    }
}

#[inline]
fn lowbit(i: usize) -> usize {
    i & i.wrapping_neg()
}

/// `#{noise : |Mn| < |M| and |Dn| < |D|} / #noise` for each `(M, D)` query.
///
/// An empty noise pool gives probability 0 everywhere.
pub fn joint_exceedance(noise: &NoiseDistribution, queries: &[(f64, f64)]) -> Vec<f64> {
    let n = noise.len();
    if n == 0 {
        return vec![0.0; queries.len()];
    }

    let mut points: Vec<(f64, f64)> = noise.points().map(|(m, d)| (m.abs(), d.abs())).collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut d_levels: Vec<f64> = points.iter().map(|p| p.1).collect();
    d_levels.sort_by(|a, b| a.total_cmp(b));
    d_levels.dedup();

    let mut order: Vec<usize> = (0..queries.len()).collect();
    order.sort_by(|&a, &b| queries[a].0.abs().total_cmp(&queries[b].0.abs()));

    let mut tree = FenwickTree::new(d_levels.len());
    let mut admitted = 0;
    let mut result = vec![0.0; queries.len()];

    for q in order {
        let (m, d) = (queries[q].0.abs(), queries[q].1.abs());
        while admitted < n && points[admitted].0 < m {
            let rank = d_levels.partition_point(|&v| v < points[admitted].1);
            tree.increment(rank);
            admitted += 1;
        }
        let below = d_levels.partition_point(|&v| v < d);
        result[q] = tree.count_below(below) as f64 / n as f64;
    }
    result
}
