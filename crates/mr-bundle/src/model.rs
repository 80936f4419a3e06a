//! Typed view of a model bundle.

use std::io::{Read, Seek};
use std::path::Path;

use mr_common::{ModelSummary, Projection, RegimeModelParameters};
use mr_config::ConfigSnapshot;

use crate::{BundleError, BundleManifest, BundleReader, BundleWriter, Result};

pub const PARAMETERS_FILE: &str = "parameters.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const PROJECTION_FILE: &str = "projection.json";
pub const CONFIG_FILE: &str = "config.json";

/// Everything needed to decode new data with a fitted model, independent of
/// the code that fitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBundle {
    pub run_id: String,
    pub parameters: RegimeModelParameters,
    pub summary: ModelSummary,
    /// Present when features were projected before fitting.
    pub projection: Option<Projection>,
    pub config: Option<ConfigSnapshot>,
}

impl ModelBundle {
    /// Names of the raw columns this model expects as input.
    pub fn input_feature_names(&self) -> &[String] {
        match &self.projection {
            Some(p) => &p.input_names,
            None => &self.summary.feature_names,
        }
    }

    fn check_consistency(&self) -> Result<()> {
        self.parameters
            .validate()
            .map_err(|e| BundleError::InvalidParameters(e.to_string()))?;
        let p = &self.parameters;
        let s = &self.summary;
        if p.n_states != s.n_states || p.n_features != s.n_features {
            return Err(BundleError::InvalidParameters(format!(
                "summary describes {}x{} but parameters are {}x{}",
                s.n_states, s.n_features, p.n_states, p.n_features
            )));
        }
        if s.feature_names.len() != p.n_features {
            return Err(BundleError::InvalidParameters(format!(
                "{} feature names for {} features",
                s.feature_names.len(),
                p.n_features
            )));
        }
        if let Some(proj) = &self.projection {
            if proj.n_components() != p.n_features {
                return Err(BundleError::InvalidParameters(format!(
                    "projection yields {} components but the model has {} features",
                    proj.n_components(),
                    p.n_features
                )));
            }
        }
        Ok(())
    }

    fn to_writer(&self) -> Result<BundleWriter> {
        self.check_consistency()?;
        let mut writer = BundleWriter::new(self.run_id.clone())
            .with_generator(concat!("mr ", env!("CARGO_PKG_VERSION")));
        writer.add_json(PARAMETERS_FILE, &self.parameters)?;
        writer.add_json(SUMMARY_FILE, &self.summary)?;
        if let Some(projection) = &self.projection {
            writer.add_json(PROJECTION_FILE, projection)?;
        }
        if let Some(config) = &self.config {
            writer.add_json(CONFIG_FILE, config)?;
        }
        Ok(writer)
    }

    pub fn save(&self, path: &Path) -> Result<BundleManifest> {
        self.to_writer()?.write(path)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.to_writer()?.write_to_vec()?.0)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_reader(&mut BundleReader::open(path)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_reader(&mut BundleReader::from_bytes(bytes)?)
    }

    /// Reads and verifies every listed file, then decodes the typed parts.
    pub fn from_reader<R: Read + Seek>(reader: &mut BundleReader<R>) -> Result<Self> {
        for required in [PARAMETERS_FILE, SUMMARY_FILE] {
            if !reader.has_file(required) {
                return Err(BundleError::MissingFile(required.to_string()));
            }
        }
        let failures = reader.verify_all();
        if let Some(first) = failures.first() {
            // Re-read to surface the concrete mismatch.
            reader.read_verified(first)?;
        }

        let bundle = ModelBundle {
            run_id: reader.run_id().to_string(),
            parameters: reader.read_json(PARAMETERS_FILE)?,
            summary: reader.read_json(SUMMARY_FILE)?,
            projection: reader.read_json_opt(PROJECTION_FILE)?,
            config: reader.read_json_opt(CONFIG_FILE)?,
        };
        bundle.check_consistency()?;
        Ok(bundle)
    }
}
