//! Bundle reader with integrity verification.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::manifest::MANIFEST_FILE_NAME;
use crate::{BundleError, BundleManifest, FileEntry, Result};

/// Reader for .mrb bundles. Every content read is checked against the
/// manifest checksum.
pub struct BundleReader<R: Read + Seek> {
    manifest: BundleManifest,
    archive: ZipArchive<R>,
    verified: HashSet<String>,
}

impl BundleReader<File> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl BundleReader<Cursor<Vec<u8>>> {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> BundleReader<R> {
    /// Opens the archive, parses and validates the manifest.
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let manifest = Self::read_manifest(&mut archive)?;
        manifest.validate()?;

        info!(
            run_id = %manifest.run_id,
            files = manifest.file_count(),
            version = %manifest.bundle_version,
            "bundle opened"
        );

        Ok(Self {
            manifest,
            archive,
            verified: HashSet::new(),
        })
    }

    fn read_manifest(archive: &mut ZipArchive<R>) -> Result<BundleManifest> {
        let mut manifest_file = archive
            .by_name(MANIFEST_FILE_NAME)
            .map_err(|_| BundleError::MissingFile(MANIFEST_FILE_NAME.to_string()))?;
        let mut json = String::new();
        manifest_file.read_to_string(&mut json)?;
        BundleManifest::from_json(&json)
            .map_err(|e| BundleError::CorruptedManifest(e.to_string()))
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    pub fn run_id(&self) -> &str {
        &self.manifest.run_id
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.manifest.files
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.manifest.find_file(path).is_some()
    }

    /// Reads an entry with checksum verification. Paths that are not in the
    /// manifest are refused even if the archive contains them.
    pub fn read_verified(&mut self, path: &str) -> Result<Vec<u8>> {
        let entry = self
            .manifest
            .find_file(path)
            .ok_or_else(|| BundleError::FileNotFound(path.to_string()))?
            .clone();

        let mut file = self
            .archive
            .by_name(path)
            .map_err(|_| BundleError::MissingFile(path.to_string()))?;
        let mut data = Vec::with_capacity(entry.bytes.min(1 << 24) as usize);
        file.read_to_end(&mut data)?;

        let actual = FileEntry::compute_checksum(&data);
        if actual != entry.sha256 {
            return Err(BundleError::ChecksumMismatch {
                path: path.to_string(),
                expected: entry.sha256,
                actual,
            });
        }

        self.verified.insert(path.to_string());
        debug!(path, bytes = data.len(), "file verified");
        Ok(data)
    }

    pub fn is_verified(&self, path: &str) -> bool {
        self.verified.contains(path)
    }

    /// Verifies every listed file and returns the paths that failed.
    pub fn verify_all(&mut self) -> Vec<String> {
        let paths: Vec<String> = self.manifest.files.iter().map(|f| f.path.clone()).collect();
        let mut failures = Vec::new();
        for path in paths {
            if let Err(e) = self.read_verified(&path) {
                warn!(path = %path, error = %e, "verification failed");
                failures.push(path);
            }
        }
        failures
    }

    pub fn read_json<T: serde::de::DeserializeOwned>(&mut self, path: &str) -> Result<T> {
        let data = self.read_verified(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Like [`read_json`](Self::read_json) but `None` when the manifest does
    /// not list `path`.
    pub fn read_json_opt<T: serde::de::DeserializeOwned>(
        &mut self,
        path: &str,
    ) -> Result<Option<T>> {
        if self.has_file(path) {
            self.read_json(path).map(Some)
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BundleWriter;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};

    fn sample_bytes() -> Vec<u8> {
        let mut writer = BundleWriter::new("run-abc");
        writer.add_json("summary.json", &serde_json::json!({"n": 3})).unwrap();
        writer.add_bytes("blob.bin", vec![9; 32]);
        writer.write_to_vec().unwrap().0
    }

    #[test]
    fn reads_back_and_tracks_verification() {
        let mut reader = BundleReader::from_bytes(sample_bytes()).unwrap();
        assert_eq!(reader.run_id(), "run-abc");
        assert_eq!(reader.files().len(), 2);
        assert!(!reader.is_verified("blob.bin"));
        assert_eq!(reader.read_verified("blob.bin").unwrap(), vec![9; 32]);
        assert!(reader.is_verified("blob.bin"));
        let v: serde_json::Value = reader.read_json("summary.json").unwrap();
        assert_eq!(v["n"], 3);
        assert!(reader.verify_all().is_empty());
    }

    #[test]
    fn unlisted_paths_are_refused() {
        let mut reader = BundleReader::from_bytes(sample_bytes()).unwrap();
        assert!(matches!(
            reader.read_verified("other.json"),
            Err(BundleError::FileNotFound(_))
        ));
        let missing: Option<serde_json::Value> = reader.read_json_opt("other.json").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn archive_without_manifest_is_rejected() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buf);
            let options: FileOptions<'_, ()> = FileOptions::default();
            zip.start_file("summary.json", options).unwrap();
            zip.write_all(b"{}").unwrap();
            zip.finish().unwrap();
        }
        let err = BundleReader::from_bytes(buf.into_inner()).err().unwrap();
        assert!(matches!(err, BundleError::MissingFile(ref p) if p == MANIFEST_FILE_NAME));
    }

    #[test]
    fn garbage_is_not_a_bundle() {
        assert!(matches!(
            BundleReader::from_bytes(b"definitely not a zip".to_vec()),
            Err(BundleError::Zip(_))
        ));
    }
}
