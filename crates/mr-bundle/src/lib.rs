//! Model bundle writer/reader.
//!
//! A `.mrb` bundle packages a fitted regime model so that it can be decoded
//! against new data without refitting.
//!
//! # Bundle Format
//!
//! Bundles are ZIP archives containing:
//! - `manifest.json`: bundle version, run id, file listing with checksums
//! - `parameters.json`: frozen HMM parameters
//! - `summary.json`: fit statistics and feature names
//! - `projection.json`: PCA projection (optional)
//! - `config.json`: resolved configuration snapshot (optional)
//!
//! # Example
//!
//! ```no_run
//! use mr_bundle::ModelBundle;
//! use std::path::Path;
//!
//! let bundle = ModelBundle::load(Path::new("model.mrb")).unwrap();
//! println!("{} states, BIC {}", bundle.summary.n_states, bundle.summary.bic);
//! ```

pub mod error;
pub mod manifest;
pub mod model;
pub mod reader;
pub mod writer;

pub use error::{BundleError, Result};
pub use manifest::{BundleManifest, FileEntry, BUNDLE_VERSION};
pub use model::ModelBundle;
pub use reader::BundleReader;
pub use writer::BundleWriter;
