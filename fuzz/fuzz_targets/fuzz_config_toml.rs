//! Fuzz target for TOML pipeline configuration parsing.
//!
//! Parsing and validation must return errors, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mr_config::{validate_pipeline, PipelineConfig};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(config) = PipelineConfig::from_toml_str(text) {
            let _ = validate_pipeline(&config);
        }
    }
});
