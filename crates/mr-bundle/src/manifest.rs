//! Bundle manifest types.
//!
//! The manifest is the source of truth for a bundle's contents: format
//! version, creation time, the run that produced it and a checksummed
//! listing of every other file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{BundleError, Result};

/// Current bundle format version.
pub const BUNDLE_VERSION: &str = "1.0.0";

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub bundle_version: String,
    pub created_at: DateTime<Utc>,
    /// Run that fitted the model.
    pub run_id: String,
    pub files: Vec<FileEntry>,
    /// Version of the tool that wrote the bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
}

impl BundleManifest {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            bundle_version: BUNDLE_VERSION.to_string(),
            created_at: Utc::now(),
            run_id: run_id.into(),
            files: Vec::new(),
            generator: None,
        }
    }

    pub fn with_generator(mut self, generator: impl Into<String>) -> Self {
        self.generator = Some(generator.into());
        self
    }

    pub fn add_file(&mut self, entry: FileEntry) {
        self.files.push(entry);
    }

    /// Total size of all listed files in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn find_file(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Checks the version and the shape of every entry.
    pub fn validate(&self) -> Result<()> {
        if major(&self.bundle_version) != major(BUNDLE_VERSION) {
            return Err(BundleError::UnsupportedVersion {
                version: self.bundle_version.clone(),
                supported: BUNDLE_VERSION.to_string(),
            });
        }
        if self.run_id.is_empty() {
            return Err(BundleError::CorruptedManifest("run_id is empty".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for file in &self.files {
            if file.path.is_empty() || file.path == MANIFEST_FILE_NAME {
                return Err(BundleError::CorruptedManifest(format!(
                    "invalid file entry path '{}'",
                    file.path
                )));
            }
            if file.sha256.len() != 64 || !file.sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(BundleError::CorruptedManifest(format!(
                    "file '{}' has an invalid checksum",
                    file.path
                )));
            }
            if !seen.insert(file.path.as_str()) {
                return Err(BundleError::CorruptedManifest(format!(
                    "file '{}' is listed twice",
                    file.path
                )));
            }
        }
        Ok(())
    }

    /// Sort files for deterministic ordering.
    pub fn sort_files(&mut self) {
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or("")
}

/// File entry in the manifest with checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path within the bundle (relative).
    pub path: String,
    /// SHA-256 checksum (64 hex characters).
    pub sha256: String,
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, sha256: impl Into<String>, bytes: u64) -> Self {
        Self {
            path: path.into(),
            sha256: sha256.into(),
            bytes,
            mime_type: None,
        }
    }

    /// Entry for `data`, checksummed.
    pub fn for_data(path: impl Into<String>, data: &[u8]) -> Self {
        Self::new(path, Self::compute_checksum(data), data.len() as u64)
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn compute_checksum(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute_checksum(data) == self.sha256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_manifest_is_current_version() {
        let manifest = BundleManifest::new("run-0123456789ab").with_generator("mr 0.1.0");
        assert_eq!(manifest.bundle_version, BUNDLE_VERSION);
        assert_eq!(manifest.generator.as_deref(), Some("mr 0.1.0"));
        manifest.validate().unwrap();
    }

    #[test]
    fn totals_and_lookup() {
        let mut manifest = BundleManifest::new("run-1");
        manifest.add_file(FileEntry::new("summary.json", "a".repeat(64), 100));
        manifest.add_file(FileEntry::new("parameters.json", "b".repeat(64), 200));
        assert_eq!(manifest.file_count(), 2);
        assert_eq!(manifest.total_bytes(), 300);
        assert!(manifest.find_file("summary.json").is_some());
        assert!(manifest.find_file("missing.json").is_none());

        manifest.sort_files();
        assert_eq!(manifest.files[0].path, "parameters.json");
    }

    #[test]
    fn minor_version_bump_is_accepted_major_is_not() {
        let mut manifest = BundleManifest::new("run-1");
        manifest.bundle_version = "1.3.0".into();
        manifest.validate().unwrap();
        manifest.bundle_version = "2.0.0".into();
        assert!(matches!(
            manifest.validate(),
            Err(BundleError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn rejects_bad_entries() {
        let mut manifest = BundleManifest::new("run-1");
        manifest.add_file(FileEntry::new("a.json", "zz".repeat(32), 1));
        assert!(manifest.validate().is_err());

        let mut manifest = BundleManifest::new("run-1");
        manifest.add_file(FileEntry::new("a.json", "a".repeat(64), 1));
        manifest.add_file(FileEntry::new("a.json", "a".repeat(64), 1));
        assert!(matches!(
            manifest.validate(),
            Err(BundleError::CorruptedManifest(_))
        ));

        assert!(BundleManifest::new("").validate().is_err());
    }

    #[test]
    fn checksum_matches_known_digest() {
        let entry = FileEntry::for_data("x", b"hello world");
        assert_eq!(
            entry.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(entry.bytes, 11);
        assert!(entry.verify(b"hello world"));
        assert!(!entry.verify(b"hello world!"));
    }
}
