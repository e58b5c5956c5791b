//! Field source backed by a local directory.
//!
//! Each field is a `<name>.grib` payload next to a `<name>.json` sidecar
//! holding its decoded header. Payloads may be gzip-compressed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use adaptor_common::Request;
use adaptors::{FieldSource, RetrievedField};
use definitions::FieldHeader;

pub struct LocalDirectorySource {
    root: PathBuf,
}

impl LocalDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn scan(root: &Path) -> Result<Vec<RetrievedField>> {
        anyhow::ensure!(root.is_dir(), "Field directory {:?} does not exist", root);

        let mut fields = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {:?}", root))?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("grib") {
                continue;
            }

            let sidecar = path.with_extension("json");
            if !sidecar.exists() {
                warn!(path = %path.display(), "Skipping field without header sidecar");
                continue;
            }

            let header: FieldHeader = serde_json::from_slice(
                &fs::read(&sidecar).with_context(|| format!("Failed to read {:?}", sidecar))?,
            )
            .with_context(|| format!("Malformed header sidecar {:?}", sidecar))?;
            let payload = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;

            debug!(path = %path.display(), size = payload.len(), "Loaded field");
            fields.push(RetrievedField::new(header, Bytes::from(payload)));
        }
        Ok(fields)
    }
}

#[async_trait]
impl FieldSource for LocalDirectorySource {
    async fn fetch(&self, _request: &Request) -> Result<Vec<RetrievedField>> {
        let root = self.root.clone();
        let fields = tokio::task::spawn_blocking(move || Self::scan(&root))
            .await
            .context("Field scan task failed")??;
        info!(root = %self.root.display(), fields = fields.len(), "Scanned local fields");
        Ok(fields)
    }
}
