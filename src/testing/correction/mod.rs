use anyhow::{Result, anyhow};

/// Correction applied across the features tested within one condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PAdjustMethod {
    /// Raw p-values are used as they are
    None,
    Bonferroni,
    Holm,
    Hochberg,
    /// Benjamini-Hochberg false discovery rate ("fdr")
    #[default]
    BenjaminiHochberg,
    BenjaminiYekutieli,
}

impl PAdjustMethod {
    pub fn name(&self) -> &'static str {
        match self {
            PAdjustMethod::None => "none",
            PAdjustMethod::Bonferroni => "bonferroni",
            PAdjustMethod::Holm => "holm",
            PAdjustMethod::Hochberg => "hochberg",
            PAdjustMethod::BenjaminiHochberg => "BH",
            PAdjustMethod::BenjaminiYekutieli => "BY",
        }
    }
}

/// Adjust `p_values` with the chosen method.
pub fn adjust_p_values(p_values: &[f64], method: PAdjustMethod) -> Result<Vec<f64>> {
    match method {
        PAdjustMethod::None => {
            validate_p_values(p_values)?;
            Ok(p_values.to_vec())
        }
        PAdjustMethod::Bonferroni => bonferroni_correction(p_values),
        PAdjustMethod::Holm => holm_bonferroni_correction(p_values),
        PAdjustMethod::Hochberg => hochberg_correction(p_values),
        PAdjustMethod::BenjaminiHochberg => benjamini_hochberg_correction(p_values),
        PAdjustMethod::BenjaminiYekutieli => benjamini_yekutieli_correction(p_values),
    }
}

fn validate_p_values(p_values: &[f64]) -> Result<()> {
    if p_values.is_empty() {
        return Err(anyhow!("Empty p-value array"));
    }
    for (i, &p) in p_values.iter().enumerate() {
        if !(0.0..=1.0).contains(&p) {
            return Err(anyhow!("Invalid p-value at index {}: {}", i, p));
        }
    }
    Ok(())
}

fn sorted_ascending(p_values: &[f64]) -> Vec<(usize, f64)> {
    let mut indexed: Vec<(usize, f64)> = p_values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.total_cmp(&b.1));
    indexed
}

/// `min(1, n·p)` for every p-value.
pub fn bonferroni_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate_p_values(p_values)?;
    let n = p_values.len() as f64;
    Ok(p_values.iter().map(|&p| (p * n).min(1.0)).collect())
}

/// Benjamini-Hochberg step-up adjustment (R's `"BH"` / `"fdr"`).
pub fn benjamini_hochberg_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    step_up_fdr(p_values, 1.0)
}

/// Benjamini-Yekutieli: BH scaled by `c(n) = Σ 1/i`, valid under arbitrary dependence.
pub fn benjamini_yekutieli_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    let c_n: f64 = (1..=p_values.len()).map(|i| 1.0 / i as f64).sum();
    step_up_fdr(p_values, c_n)
}

/// Step-up pass shared by BH and BY: `p·scale·n/rank`, cumulative minimum from the largest p.
fn step_up_fdr(p_values: &[f64], scale: f64) -> Result<Vec<f64>> {
    validate_p_values(p_values)?;
    let n = p_values.len();
    let mut adjusted = vec![0.0; n];
    let mut running_min = 1.0f64;

    for (i, &(idx, p)) in sorted_ascending(p_values).iter().enumerate().rev() {
        running_min = running_min.min((p * scale * n as f64 / (i + 1) as f64).min(1.0));
        adjusted[idx] = running_min;
    }
    Ok(adjusted)
}

/// Holm step-down adjustment.
pub fn holm_bonferroni_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate_p_values(p_values)?;
    let n = p_values.len();
    let indexed_p_values = sorted_ascending(p_values);

    let mut adjusted = vec![0.0; n];
    let mut running_max = 0.0f64;

    for (i, &(idx, p)) in indexed_p_values.iter().enumerate() {
        running_max = running_max.max((p * (n - i) as f64).min(1.0));
        adjusted[idx] = running_max;
    }
    Ok(adjusted)
}

pub fn hochberg_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate_p_values(p_values)?;
    let n = p_values.len();
    let indexed_p_values = sorted_ascending(p_values);

    let mut adjusted = vec![0.0; n];
    let mut running_min = 1.0f64;

    // largest p keeps multiplier 1, the smallest gets n
    for (i, &(idx, p)) in indexed_p_values.iter().enumerate().rev() {
        running_min = running_min.min((p * (n - i) as f64).min(1.0));
        adjusted[idx] = running_min;
    }
    Ok(adjusted)
}
