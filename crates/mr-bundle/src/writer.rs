//! Bundle writer for creating .mrb files.

use std::fs::File;
use std::io::{Cursor, Seek, Write};
use std::path::Path;

use tracing::{debug, info};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::manifest::MANIFEST_FILE_NAME;
use crate::{BundleError, BundleManifest, FileEntry, Result};

const MIME_JSON: &str = "application/json";
const MIME_BINARY: &str = "application/octet-stream";

/// Collects files in memory and writes them as one zip archive with a
/// leading manifest.
pub struct BundleWriter {
    manifest: BundleManifest,
    files: Vec<(String, Vec<u8>)>,
}

impl BundleWriter {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            manifest: BundleManifest::new(run_id),
            files: Vec::new(),
        }
    }

    pub fn with_generator(mut self, generator: impl Into<String>) -> Self {
        self.manifest = self.manifest.with_generator(generator);
        self
    }

    /// Adds raw bytes. Re-adding a path replaces the earlier content.
    pub fn add_bytes(&mut self, path: impl Into<String>, data: Vec<u8>) {
        let path = path.into();
        let mime = if path.ends_with(".json") {
            MIME_JSON
        } else {
            MIME_BINARY
        };
        let entry = FileEntry::for_data(&path, &data).with_mime_type(mime);

        self.manifest.files.retain(|f| f.path != path);
        self.files.retain(|(p, _)| *p != path);
        debug!(path = %path, bytes = entry.bytes, "added file to bundle");
        self.manifest.add_file(entry);
        self.files.push((path, data));
    }

    pub fn add_json<T: serde::Serialize>(
        &mut self,
        path: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        self.add_bytes(path, json);
        Ok(())
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    /// Total size in bytes before compression.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|(_, data)| data.len() as u64).sum()
    }

    /// File count, not including the manifest.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Writes the bundle to `path` through a sibling temporary file, so a
    /// failed write never leaves a truncated bundle behind.
    pub fn write(self, path: &Path) -> Result<BundleManifest> {
        let tmp = path.with_extension("mrb.tmp");
        let file = File::create(&tmp)?;
        let (file, manifest) = match self.write_into(file) {
            Ok(done) => done,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                return Err(e);
            }
        };
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, path)?;

        info!(
            event = "bundle.written",
            path = %path.display(),
            files = manifest.file_count(),
            bytes = manifest.total_bytes(),
            run_id = %manifest.run_id,
            "bundle written"
        );
        Ok(manifest)
    }

    /// Writes the bundle into memory.
    pub fn write_to_vec(self) -> Result<(Vec<u8>, BundleManifest)> {
        let (cursor, manifest) = self.write_into(Cursor::new(Vec::new()))?;
        Ok((cursor.into_inner(), manifest))
    }

    fn write_into<W: Write + Seek>(mut self, sink: W) -> Result<(W, BundleManifest)> {
        if self.files.is_empty() {
            return Err(BundleError::MissingFile("bundle has no content".to_string()));
        }

        self.manifest.sort_files();
        self.files.sort_by(|a, b| a.0.cmp(&b.0));
        self.manifest.validate()?;
        let manifest_json = self.manifest.to_json()?;

        let mut zip = ZipWriter::new(sink);
        let options: FileOptions<'_, ()> = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        zip.start_file(MANIFEST_FILE_NAME, options)?;
        zip.write_all(manifest_json.as_bytes())?;
        for (file_path, data) in &self.files {
            zip.start_file(file_path.as_str(), options)?;
            zip.write_all(data)?;
        }
        let sink = zip.finish()?;
        Ok((sink, self.manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_writer_refuses_to_write() {
        let writer = BundleWriter::new("run-1");
        assert!(matches!(
            writer.write_to_vec(),
            Err(BundleError::MissingFile(_))
        ));
    }

    #[test]
    fn re_adding_a_path_replaces_it() {
        let mut writer = BundleWriter::new("run-1");
        writer.add_bytes("a.bin", vec![1, 2, 3]);
        writer.add_bytes("a.bin", vec![4]);
        assert_eq!(writer.file_count(), 1);
        assert_eq!(writer.total_bytes(), 1);
        assert_eq!(writer.manifest().files[0].bytes, 1);
        assert_eq!(
            writer.manifest().files[0].mime_type.as_deref(),
            Some("application/octet-stream")
        );
    }

    #[test]
    fn json_entries_are_tagged_and_sorted() {
        let mut writer = BundleWriter::new("run-1");
        writer.add_json("z.json", &serde_json::json!({"k": 1})).unwrap();
        writer.add_json("a.json", &serde_json::json!([1, 2])).unwrap();
        let (bytes, manifest) = writer.write_to_vec().unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(manifest.files[0].path, "a.json");
        assert_eq!(manifest.files[1].mime_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn write_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.mrb");
        let mut writer = BundleWriter::new("run-1");
        writer.add_bytes("a.bin", vec![0; 16]);
        writer.write(&path).unwrap();
        assert!(path.exists());
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }
}
