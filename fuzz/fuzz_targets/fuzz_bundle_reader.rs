//! Fuzz target for .mrb bundle reading.
//!
//! Tests that bundle parsing handles arbitrary input without panicking.
//! Bundles are exchanged between machines, so the reader must reject
//! anything malformed with an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mr_bundle::ModelBundle;

fuzz_target!(|data: &[u8]| {
    // Most random data is not a ZIP archive and fails quickly.
    let _ = ModelBundle::from_bytes(data.to_vec());
});
