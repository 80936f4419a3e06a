//! Fuzz target for `parameters.json` decoding.
//!
//! Arbitrary parameter documents go through structural validation and
//! model construction; a document that passes must yield a usable model.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mr_common::RegimeModelParameters;
use mr_core::hmm::GaussianHmm;

fuzz_target!(|data: &[u8]| {
    let Ok(params) = serde_json::from_slice::<RegimeModelParameters>(data) else {
        return;
    };
    if params.validate().is_err() {
        return;
    }
    if let Ok(model) = GaussianHmm::from_params(&params) {
        assert_eq!(model.n_states(), params.n_states);
        assert_eq!(model.n_features(), params.n_features);
    }
});
