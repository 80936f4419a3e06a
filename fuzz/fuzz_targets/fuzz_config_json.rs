//! Fuzz target for JSON pipeline configuration parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mr_config::{validate_pipeline, PipelineConfig};

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = serde_json::from_slice::<PipelineConfig>(data) {
        let _ = validate_pipeline(&config);
    }
});
