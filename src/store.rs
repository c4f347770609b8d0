//! Content-Addressed Store
//!
//! Files are copied into one target directory keyed by the SHA-256 of their
//! bytes. Equal content always resolves to one stored path; different
//! content never overwrites a file that is already there.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{LayerError, Result};
use crate::hashing::file_sha256;

#[derive(Debug)]
pub struct ContentStore {
    target_dir: PathBuf,
    seen: HashMap<String, PathBuf>,
    outputs: Vec<PathBuf>,
}

impl ContentStore {
    /// Open a store over `target_dir`, creating the directory if needed
    pub fn open(target_dir: impl Into<PathBuf>) -> Result<Self> {
        let target_dir = target_dir.into();

        if target_dir.exists() && !target_dir.is_dir() {
            return Err(LayerError::Precondition(target_dir));
        }
        fs::create_dir_all(&target_dir).map_err(|e| LayerError::io(&target_dir, e))?;

        Ok(Self {
            target_dir,
            seen: HashMap::new(),
            outputs: Vec::new(),
        })
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Copy `source` into the store, returning where its content lives
    pub fn copy(&mut self, source: &Path) -> Result<PathBuf> {
        let digest = file_sha256(source)?;

        if let Some(stored) = self.seen.get(&digest) {
            debug!(source = %source.display(), stored = %stored.display(), "content already stored");
            return Ok(stored.clone());
        }

        let file_name = source
            .file_name()
            .ok_or_else(|| LayerError::Validation(format!("{} has no file name", source.display())))?
            .to_string_lossy()
            .into_owned();

        let mut candidate = self.target_dir.join(&file_name);
        let mut counter: u32 = 0;

        // name conflict: prefix a counter until the name is free
        while candidate.exists() {
            if candidate.is_file() && file_sha256(&candidate)? == digest {
                debug!(stored = %candidate.display(), "identical file already in target");
                return Ok(self.record(digest, candidate));
            }
            candidate = self.target_dir.join(format!("{:05}_{}", counter, file_name));
            counter += 1;
        }

        fs::copy(source, &candidate).map_err(|e| LayerError::io(&candidate, e))?;
        debug!(source = %source.display(), stored = %candidate.display(), "stored");

        Ok(self.record(digest, candidate))
    }

    /// Register a file already inside the target directory
    pub fn adopt(&mut self, path: &Path) -> Result<PathBuf> {
        let digest = file_sha256(path)?;
        match self.seen.get(&digest) {
            Some(stored) => Ok(stored.clone()),
            None => Ok(self.record(digest, path.to_path_buf())),
        }
    }

    /// Every distinct stored file, in first-use order
    pub fn outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    fn record(&mut self, digest: String, path: PathBuf) -> PathBuf {
        self.seen.insert(digest, path.clone());
        self.outputs.push(path.clone());
        path
    }
}
