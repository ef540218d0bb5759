//! Filesystem-backed object store.

use std::fs;
use std::path::{Path, PathBuf};

use reserva_common::{PipelineError, Result};
use tracing::debug;

use super::ObjectStore;

/// Treats `<root>/<bucket>/<object>` as the object.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, object: &str) -> PathBuf {
        self.root.join(bucket).join(object)
    }
}

impl ObjectStore for LocalObjectStore {
    fn download(&self, bucket: &str, object: &str, dest: &Path) -> Result<u64> {
        let source = self.object_path(bucket, object);
        if !source.is_file() {
            return Err(PipelineError::Storage(format!(
                "object '{}' not found in bucket '{}' ({})",
                object,
                bucket,
                source.display()
            )));
        }

        let bytes = fs::copy(&source, dest)?;
        debug!("Copied {} bytes from {}", bytes, source.display());
        Ok(bytes)
    }

    fn name(&self) -> &str {
        "local"
    }
}
