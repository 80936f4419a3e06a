//! Microregime Core Library
//!
//! This library provides the core functionality for regime analysis:
//! - Feature assembly and projection from raw per-timestep tables
//! - Gaussian HMM fitting, decoding and simulation
//! - Cluster quality and regime duration diagnostics
//! - Cross-series causal significance tests
//! - Pipeline orchestration, logging and exit codes
//!
//! The binary entry point is in `main.rs`.

pub mod causality;
pub mod exit_codes;
pub mod features;
pub mod hmm;
pub mod logging;
pub mod pipeline;
pub mod quality;

pub use causality::{AlignedPair, CausalReport, CausalSignificanceEngine, RegimeSeries};
pub use features::{BuiltFeatures, FeatureMatrixBuilder};
pub use hmm::{align_labels, FitOptions, FitReport, GaussianHmm, LabelAlignment};
pub use pipeline::{
    CausalityOutcome, CausalityRequest, FitOutcome, FitRequest, FittedRegimes, PipelineError,
    RegimePipeline,
};
pub use quality::{ModelQualityEvaluator, QualityReport};
