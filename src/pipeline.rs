//! End-to-end runs: normalization, filtering, noise model and scoring.
//!
//! A [`Pipeline`] borrows the caller's inputs, validates everything it can
//! before computing, and produces a fresh [`DeTable`]. Each stage is also
//! exposed on its own so intermediate artifacts can be inspected.

use log::{debug, info, warn};

use crate::data::{
    require_lengths, Comparison, ExpressionMatrix, FactorAssignment, FeatureAnnotation,
};
use crate::de::bio::{check_replicates, BIOLOGICAL_Q};
use crate::de::noiseq::{SIMULATED_Q, TECHNICAL_Q};
use crate::de::{noiseq_bio_scores, noiseq_scores, BioConfig, DeTable, RunMetadata};
use crate::error::{NoiseqError, Result};
use crate::filter::{filter_low_counts, FilterConfig, FilterOutcome};
use crate::noise::{
    replace_zeros, simulate_replicates, NoiseDistribution, SimulationConfig, ZeroSubstitution,
};
use crate::normalization::{normalize, NormalizationMethod, NormalizedMatrix};

/// How within-condition noise is obtained.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ReplicateMode {
    /// Pairs of real replicates within each condition (NOISeq).
    #[default]
    TechnicalReal,
    /// Multinomial pseudo-replicates (NOISeq-sim).
    TechnicalSimulated(SimulationConfig),
    /// Biological replicates scored with NOISeqBIO.
    Biological(BioConfig),
}

impl ReplicateMode {
    pub fn name(&self) -> &'static str {
        match self {
            ReplicateMode::TechnicalReal => "technical",
            ReplicateMode::TechnicalSimulated(_) => "simulated",
            ReplicateMode::Biological(_) => "biological",
        }
    }

    /// Recommended q threshold for this mode.
    pub fn default_q(&self) -> f64 {
        match self {
            ReplicateMode::TechnicalReal => TECHNICAL_Q,
            ReplicateMode::TechnicalSimulated(_) => SIMULATED_Q,
            ReplicateMode::Biological(_) => BIOLOGICAL_Q,
        }
    }
}

/// Settings of every stage of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Factor whose levels are compared.
    pub factor: String,
    /// Levels to compare; `None` requires the factor to have exactly two.
    pub levels: Option<(String, String)>,
    pub normalization: NormalizationMethod,
    /// Low-count filter; `None` keeps every feature.
    pub filter: Option<FilterConfig>,
    pub mode: ReplicateMode,
    /// Pseudo-count for zeros; `None` uses half the smallest non-zero value.
    pub k: Option<f64>,
    /// q threshold; `None` uses the mode's recommendation.
    pub q: Option<f64>,
}

impl PipelineConfig {
    pub fn new(factor: &str) -> Self {
        Self {
            factor: factor.to_string(),
            levels: None,
            normalization: NormalizationMethod::default(),
            filter: None,
            mode: ReplicateMode::default(),
            k: Some(0.5),
            q: None,
        }
    }

    pub fn with_levels(mut self, level_a: &str, level_b: &str) -> Self {
        self.levels = Some((level_a.to_string(), level_b.to_string()));
        self
    }

    pub fn with_normalization(mut self, method: NormalizationMethod) -> Self {
        self.normalization = method;
        self
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_mode(mut self, mode: ReplicateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_k(mut self, k: Option<f64>) -> Self {
        self.k = k;
        self
    }

    pub fn with_q(mut self, q: f64) -> Self {
        self.q = Some(q);
        self
    }

    pub fn effective_q(&self) -> f64 {
        self.q.unwrap_or_else(|| self.mode.default_q())
    }

    pub fn validate(&self) -> Result<()> {
        if self.factor.is_empty() {
            return Err(NoiseqError::invalid("factor", "must name a factor"));
        }
        self.normalization.validate()?;
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        match &self.mode {
            ReplicateMode::TechnicalReal => {}
            ReplicateMode::TechnicalSimulated(config) => config.validate()?,
            ReplicateMode::Biological(config) => config.validate()?,
        }
        ZeroSubstitution::from_k(self.k).validate()?;
        if let Some(q) = self.q {
            if !(0.0..=1.0).contains(&q) {
                return Err(NoiseqError::invalid("q", "must be in [0, 1]"));
            }
        }
        Ok(())
    }
}

/// One differential-expression run over borrowed inputs.
#[derive(Debug, Clone)]
pub struct Pipeline<'a> {
    matrix: &'a ExpressionMatrix,
    factors: &'a FactorAssignment,
    annotation: Option<&'a FeatureAnnotation>,
    config: PipelineConfig,
    comparison: Comparison,
}

impl<'a> Pipeline<'a> {
    /// Validate inputs and configuration together; nothing is computed yet.
    pub fn new(
        matrix: &'a ExpressionMatrix,
        factors: &'a FactorAssignment,
        annotation: Option<&'a FeatureAnnotation>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        factors.validate_against(matrix)?;
        let levels = config.levels.as_ref().map(|(a, b)| (a.as_str(), b.as_str()));
        let comparison = factors.resolve_comparison(&config.factor, levels)?;
        matrix.sample_indices(&comparison.all_samples())?;

        let (n_a, n_b) = (comparison.samples_a.len(), comparison.samples_b.len());
        match &config.mode {
            ReplicateMode::TechnicalReal => {
                if n_a < 2 && n_b < 2 {
                    return Err(NoiseqError::InsufficientReplicates {
                        condition: comparison.level_a.clone(),
                        found: n_a,
                        required: 2,
                    });
                }
            }
            ReplicateMode::TechnicalSimulated(_) => {
                if n_a >= 2 && n_b >= 2 {
                    warn!(
                        "simulating replicates although '{}' has {} and '{}' has {} samples",
                        comparison.level_a, n_a, comparison.level_b, n_b
                    );
                }
            }
            ReplicateMode::Biological(_) => check_replicates([
                (comparison.level_a.as_str(), n_a),
                (comparison.level_b.as_str(), n_b),
            ])?,
        }

        if config.normalization.requires_lengths() {
            require_lengths(annotation, matrix.features(), config.normalization.name())?;
        }

        Ok(Pipeline {
            matrix,
            factors,
            annotation,
            config,
            comparison,
        })
    }

    pub fn comparison(&self) -> &Comparison {
        &self.comparison
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Raw counts of the compared samples, first condition first.
    pub fn compared_counts(&self) -> Result<ExpressionMatrix> {
        let columns = self.matrix.sample_indices(&self.comparison.all_samples())?;
        self.matrix.select_samples(&columns)
    }

    /// Apply the configured low-count filter, or keep everything.
    pub fn filter(&self, counts: &ExpressionMatrix) -> Result<FilterOutcome> {
        match &self.config.filter {
            Some(config) => filter_low_counts(counts, self.factors, &self.config.factor, config),
            None => Ok(FilterOutcome {
                retained: vec![true; counts.n_features()],
                matrix: counts.clone(),
            }),
        }
    }

    pub fn normalize(&self, counts: &ExpressionMatrix) -> Result<NormalizedMatrix> {
        normalize(counts, self.annotation, &self.config.normalization)
    }

    /// Run every stage and assemble the result table.
    pub fn run(&self) -> Result<DeTable> {
        let mode = self.config.mode.name();
        info!("NOISeq run {} ({} replicates)", self.comparison.label(), mode);

        let counts = self.compared_counts()?;
        let filtered = self.filter(&counts)?;
        info!(
            "{} of {} features kept for analysis",
            filtered.n_retained(),
            counts.n_features()
        );

        let normalized = self.normalize(&filtered.matrix)?;
        info!("normalized with {}", normalized.method());

        let rule = ZeroSubstitution::from_k(self.config.k);
        let (values, k_used) = rule.apply(normalized.values())?;
        debug!("zeros replaced with {}", k_used);

        let n_a = self.comparison.samples_a.len();
        let cols_a: Vec<usize> = (0..n_a).collect();
        let cols_b: Vec<usize> = (n_a..n_a + self.comparison.samples_b.len()).collect();

        let mut metadata = RunMetadata {
            comparison: self.comparison.label(),
            level_a: self.comparison.level_a.clone(),
            level_b: self.comparison.level_b.clone(),
            normalization: normalized.method().to_string(),
            factors: normalized.factors().to_vec(),
            replicate_mode: mode.to_string(),
            k_used,
            n_filtered: filtered.n_dropped(),
            q: self.config.effective_q(),
            noise_size: None,
            a0_m: None,
            a0_d: None,
            p0: None,
        };

        let scores = match &self.config.mode {
            ReplicateMode::TechnicalReal => {
                let groups = [cols_a.clone(), cols_b.clone()];
                let noise = NoiseDistribution::from_replicates(&values, &groups);
                info!("noise distribution from {} within-condition points", noise.len());
                metadata.noise_size = Some(noise.len());
                noiseq_scores(&values, &cols_a, &cols_b, &noise)?
            }
            ReplicateMode::TechnicalSimulated(config) => {
                let groups = vec![
                    (self.comparison.level_a.clone(), cols_a.clone()),
                    (self.comparison.level_b.clone(), cols_b.clone()),
                ];
                let raw = filtered.matrix.counts();
                let (simulated, layout) =
                    simulate_replicates(raw, normalized.values(), &groups, config)?;
                let simulated = replace_zeros(&simulated, k_used);
                let noise = NoiseDistribution::from_replicates(&simulated, &layout);
                info!("noise distribution from {} simulated points", noise.len());
                metadata.noise_size = Some(noise.len());
                noiseq_scores(&values, &cols_a, &cols_b, &noise)?
            }
            ReplicateMode::Biological(config) => {
                let (scores, fit) = noiseq_bio_scores(&values, &cols_a, &cols_b, config)?;
                metadata.a0_m = Some(fit.a0_m);
                metadata.a0_d = Some(fit.a0_d);
                metadata.p0 = Some(fit.p0);
                scores
            }
        };

        let features = filtered.matrix.features();
        let table = DeTable::from_scores(features, scores, self.annotation, metadata)?;
        info!(
            "{} feature(s) at q >= {}",
            table.differentially_expressed().len(),
            table.metadata().q
        );
        Ok(table)
    }
}
