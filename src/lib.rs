//! # noiseq
//!
//! Non-parametric differential expression for count data (RNA-seq and
//! similar), following the NOISeq family of methods.
//!
//! A run compares two levels of a sample factor. Counts are normalized,
//! optionally filtered for low expression, and every feature's change between
//! the two conditions (M = log2 ratio, D = difference) is contrasted with the
//! change seen between samples of the same condition.
//!
//! ## Core Features
//!
//! - **Normalization**: RPKM, upper quartile and TMM, with optional length correction
//! - **Low-count filtering**: CPM threshold, Wilcoxon signed-rank or proportion test
//! - **Noise model**: real technical replicates or simulated pseudo-replicates
//! - **NOISeqBIO**: biological replicates scored through a permutation-based mixture
//! - **Sparse input**: `CsrMatrix` from nalgebra-sparse is accepted directly
//!
//! ## Quick Start
//!
//! Build an [`ExpressionMatrix`] and a [`FactorAssignment`], describe the run
//! with a [`PipelineConfig`] and call [`Pipeline::run`]. The returned
//! [`DeTable`] holds one row per analysed feature; [`DeTable::degenes`]
//! selects the differentially expressed ones.
//!
//! ## Module Organization
//!
//! - **[`data`]**: input matrix, sample factors and feature annotation
//! - **[`normalization`]**: between-sample normalization
//! - **[`filter`]**: low-count feature filtering
//! - **[`noise`]**: zero substitution, noise pooling and replicate simulation
//! - **[`de`]**: NOISeq and NOISeqBIO statistics and result tables
//! - **[`pipeline`]**: stage orchestration
//! - **[`testing`]**: statistical test primitives and multiple testing correction

pub mod data;
pub mod de;
pub mod error;
pub mod filter;
pub mod noise;
pub mod normalization;
pub mod pipeline;
pub mod testing;

pub use data::{Comparison, ExpressionMatrix, FactorAssignment, FeatureAnnotation, FeatureInfo};
pub use de::{DeRecord, DeTable, Direction, RunMetadata, Selection};
pub use error::{NoiseqError, Result};
pub use pipeline::{Pipeline, PipelineConfig, ReplicateMode};
