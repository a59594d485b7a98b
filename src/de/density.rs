//! Gaussian kernel density estimate on a regular grid.
//!
//! Values are linearly binned onto the grid and convolved with the kernel,
//! so fitting costs `O(n + G²)` for `G` grid points. Evaluation between grid
//! points interpolates linearly; outside the grid the density is zero.

use crate::error::{NoiseqError, Result};
use crate::testing::utils::{quantile_sorted, sort_ascending, std_dev};

/// Grid points of every fitted density.
pub const GRID_POINTS: usize = 512;
/// Bandwidths the grid extends beyond the data on each side.
pub const CUT: f64 = 3.0;

#[derive(Debug, Clone)]
pub struct KernelDensity {
    lower: f64,
    step: f64,
    bandwidth: f64,
    density: Vec<f64>,
}

impl KernelDensity {
    /// Fit with bandwidth `adjust × nrd0(values)`.
    pub fn fit(values: &[f64], adjust: f64) -> Result<Self> {
        if values.len() < 2 {
            return Err(NoiseqError::DegenerateMixtureFit(format!(
                "{} value(s) are too few for a density estimate",
                values.len()
            )));
        }
        if !(adjust > 0.0 && adjust.is_finite()) {
            return Err(NoiseqError::invalid("adj", "bandwidth adjustment must be positive"));
        }
        let bandwidth = adjust * nrd0(values);
        if !(bandwidth > 0.0 && bandwidth.is_finite()) {
            return Err(NoiseqError::DegenerateMixtureFit(
                "values have no spread, bandwidth is zero".to_string(),
            ));
        }

        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let lower = min - CUT * bandwidth;
        let upper = max + CUT * bandwidth;
        let step = (upper - lower) / (GRID_POINTS - 1) as f64;

        let weight = 1.0 / values.len() as f64;
        let mut bins = vec![0.0; GRID_POINTS];
        for &v in values {
            let pos = (v - lower) / step;
            let k = (pos.floor() as usize).min(GRID_POINTS - 2);
            let frac = pos - k as f64;
            bins[k] += weight * (1.0 - frac);
            bins[k + 1] += weight * frac;
        }

        let kernel: Vec<f64> = (0..GRID_POINTS)
            .map(|t| gaussian(t as f64 * step / bandwidth) / bandwidth)
            .collect();
        let density: Vec<f64> = (0..GRID_POINTS)
            .map(|g| {
                bins.iter()
                    .enumerate()
                    .filter(|(_, w)| **w > 0.0)
                    .map(|(k, w)| w * kernel[g.abs_diff(k)])
                    .sum::<f64>()
            })
            .collect();

        Ok(KernelDensity {
            lower,
            step,
            bandwidth,
            density,
        })
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn support(&self) -> (f64, f64) {
        (self.lower, self.lower + self.step * (GRID_POINTS - 1) as f64)
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let pos = (x - self.lower) / self.step;
        if !(pos >= 0.0 && pos <= (GRID_POINTS - 1) as f64) {
            return 0.0;
        }
        let k = (pos.floor() as usize).min(GRID_POINTS - 2);
        let frac = pos - k as f64;
        self.density[k] * (1.0 - frac) + self.density[k + 1] * frac
    }
}

#[inline]
fn gaussian(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Silverman's rule of thumb: `0.9 × min(sd, IQR / 1.34) × n^(-1/5)`.
///
/// Falls back to the standard deviation when the IQR is zero.
pub fn nrd0(values: &[f64]) -> f64 {
    let sd = std_dev(values);
    let mut sorted = values.to_vec();
    sort_ascending(&mut sorted);
    let iqr = match (quantile_sorted(&sorted, 0.75), quantile_sorted(&sorted, 0.25)) {
        (Some(hi), Some(lo)) => hi - lo,
        _ => 0.0,
    };
    let spread = if iqr > 0.0 { sd.min(iqr / 1.34) } else { sd };
    0.9 * spread * (values.len() as f64).powf(-0.2)
}
