//! Round-trip and tamper detection against bundles on disk.

use std::io::{Read, Write};
use std::path::Path;

use mr_bundle::{BundleError, ModelBundle};
use mr_common::{
    CovarianceType, ModelSummary, Projection, RegimeModelParameters, PARAMETERS_FORMAT_VERSION,
};
use mr_config::{ConfigSnapshot, ConfigSource, PipelineConfig};
use zip::write::{FileOptions, ZipWriter};
use zip::ZipArchive;

fn fitted_bundle() -> ModelBundle {
    let parameters = RegimeModelParameters {
        format_version: PARAMETERS_FORMAT_VERSION,
        n_states: 2,
        n_features: 2,
        covariance_type: CovarianceType::Diagonal,
        means: vec![vec![0.0, 1.0], vec![2.0, -1.0]],
        covariances: vec![
            vec![vec![1.0, 0.0], vec![0.0, 2.0]],
            vec![vec![0.5, 0.0], vec![0.0, 0.5]],
        ],
        transition_matrix: vec![vec![0.9, 0.1], vec![0.3, 0.7]],
        initial_distribution: vec![0.6, 0.4],
    };
    let summary = ModelSummary {
        n_states: 2,
        n_features: 2,
        n_samples: 1000,
        n_segments: 2,
        covariance_type: CovarianceType::Diagonal,
        n_parameters: parameters.parameter_count(),
        log_likelihood: -2500.0,
        aic: 5030.0,
        bic: 5103.6,
        converged: true,
        iterations: 42,
        feature_names: vec!["pc1".into(), "pc2".into()],
    };
    let projection = Projection {
        input_names: vec!["long_spread".into(), "long_depth".into(), "long_ofi".into()],
        means: vec![0.1, 5.0, 0.0],
        scales: vec![1.0, 2.0, 0.5],
        components: vec![vec![0.7, 0.7, 0.1], vec![-0.1, 0.1, 0.99]],
        explained_variance_ratio: vec![0.8, 0.19],
        variance_fraction: 0.99,
    };
    ModelBundle {
        run_id: "run-a1b2c3d4e5f6".into(),
        parameters,
        summary,
        projection: Some(projection),
        config: Some(ConfigSnapshot::new(
            &PipelineConfig::default(),
            &ConfigSource::BuiltinDefault,
            None,
        )),
    }
}

/// Copies a bundle entry by entry, letting `edit` rewrite any entry.
fn rewrite(src: &Path, dst: &Path, edit: impl Fn(&str, Vec<u8>) -> Option<Vec<u8>>) {
    let mut archive = ZipArchive::new(std::fs::File::open(src).unwrap()).unwrap();
    let mut out = ZipWriter::new(std::fs::File::create(dst).unwrap());
    let options: FileOptions<'_, ()> = FileOptions::default();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let name = entry.name().to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        if let Some(data) = edit(&name, data) {
            out.start_file(name, options).unwrap();
            out.write_all(&data).unwrap();
        }
    }
    out.finish().unwrap();
}

#[test]
fn bundle_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.mrb");
    let bundle = fitted_bundle();
    let manifest = bundle.save(&path).unwrap();
    assert_eq!(manifest.file_count(), 4);
    assert_eq!(manifest.run_id, "run-a1b2c3d4e5f6");

    let loaded = ModelBundle::load(&path).unwrap();
    assert_eq!(loaded, bundle);
    assert_eq!(loaded.input_feature_names().len(), 3);
    assert!(loaded.config.as_ref().unwrap().is_consistent());
}

#[test]
fn tampered_parameters_fail_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.mrb");
    let bad = dir.path().join("bad.mrb");
    fitted_bundle().save(&good).unwrap();

    rewrite(&good, &bad, |name, data| {
        if name == "parameters.json" {
            let text = String::from_utf8(data).unwrap().replace("0.9", "0.8");
            Some(text.into_bytes())
        } else {
            Some(data)
        }
    });

    let err = ModelBundle::load(&bad).unwrap_err();
    assert!(
        matches!(err, BundleError::ChecksumMismatch { ref path, .. } if path == "parameters.json"),
        "unexpected error: {err}"
    );
}

#[test]
fn missing_required_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.mrb");
    let bad = dir.path().join("bad.mrb");
    fitted_bundle().save(&good).unwrap();

    rewrite(&good, &bad, |name, data| (name != "summary.json").then_some(data));

    let err = ModelBundle::load(&bad).unwrap_err();
    assert!(matches!(err, BundleError::MissingFile(ref p) if p == "summary.json"));
}

#[test]
fn future_bundle_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.mrb");
    let bad = dir.path().join("bad.mrb");
    fitted_bundle().save(&good).unwrap();

    rewrite(&good, &bad, |name, data| {
        if name == "manifest.json" {
            let mut manifest: serde_json::Value = serde_json::from_slice(&data).unwrap();
            manifest["bundle_version"] = "2.0.0".into();
            Some(serde_json::to_vec(&manifest).unwrap())
        } else {
            Some(data)
        }
    });

    assert!(matches!(
        ModelBundle::load(&bad),
        Err(BundleError::UnsupportedVersion { .. })
    ));
}
