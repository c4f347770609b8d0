//! Incremental Build Cache
//!
//! Persists, per component, `source hash -> configuration -> artifact path`
//! in one JSON file inside the target directory. The previous run's record
//! is read at start; at the end every component used in this run has its
//! section replaced by what this run produced.
//!
//! One writer per target directory. The file is replaced by renaming a fully
//! written temporary file, so readers never see a half-written record.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{LayerError, Result};

pub const DEFAULT_CACHE_FILE: &str = ".layerdeck-cache.json";

/// source hash -> canonical configuration -> artifact path
pub type CacheSection = BTreeMap<String, BTreeMap<String, PathBuf>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheHit {
    /// Produced earlier in this run
    ThisRun(PathBuf),
    /// Recorded by a previous run and still on disk
    PriorRun(PathBuf),
}

impl CacheHit {
    pub fn path(&self) -> &Path {
        match self {
            CacheHit::ThisRun(path) | CacheHit::PriorRun(path) => path,
        }
    }
}

#[derive(Debug)]
pub struct BuildCache {
    path: PathBuf,
    previous: BTreeMap<String, CacheSection>,
    current: BTreeMap<String, CacheSection>,
    active: BTreeSet<String>,
}

impl BuildCache {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let previous = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| LayerError::io(&path, e))?;
            match serde_json::from_str(&content) {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable build cache, starting empty");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            previous,
            current: BTreeMap::new(),
            active: BTreeSet::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mark a component as taking part in this run. Its persisted section
    /// will be replaced on flush even if nothing is recorded.
    pub fn begin(&mut self, component: &str) {
        self.active.insert(component.to_string());
    }

    pub fn lookup(&self, component: &str, source_hash: &str, configuration: &str) -> Option<CacheHit> {
        if let Some(path) = entry(&self.current, component, source_hash, configuration) {
            return Some(CacheHit::ThisRun(path.clone()));
        }

        let path = entry(&self.previous, component, source_hash, configuration)?;
        if path.is_file() {
            debug!(%component, %configuration, path = %path.display(), "prior render still on disk");
            Some(CacheHit::PriorRun(path.clone()))
        } else {
            warn!(%component, %configuration, path = %path.display(), "cached render missing, will re-render");
            None
        }
    }

    pub fn record(&mut self, component: &str, source_hash: &str, configuration: &str, artifact: PathBuf) {
        self.active.insert(component.to_string());
        self.current
            .entry(component.to_string())
            .or_default()
            .entry(source_hash.to_string())
            .or_default()
            .insert(configuration.to_string(), artifact);
    }

    /// Prior record with this run's components swapped in
    pub fn merged(&self) -> BTreeMap<String, CacheSection> {
        let mut merged = self.previous.clone();
        for component in &self.active {
            let section = self.current.get(component).cloned().unwrap_or_default();
            merged.insert(component.clone(), section);
        }
        merged
    }

    pub fn flush(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| LayerError::io(&dir, e))?;

        let content = serde_json::to_string_pretty(&self.merged())?;

        let mut staged = tempfile::Builder::new()
            .prefix(".layerdeck-cache-")
            .tempfile_in(&dir)
            .map_err(|e| LayerError::io(&dir, e))?;
        staged
            .write_all(content.as_bytes())
            .and_then(|_| staged.flush())
            .map_err(|e| LayerError::io(staged.path(), e))?;
        staged
            .persist(&self.path)
            .map_err(|e| LayerError::io(&self.path, e.error))?;

        debug!(path = %self.path.display(), components = self.active.len(), "build cache written");
        Ok(())
    }
}

fn entry<'a>(
    record: &'a BTreeMap<String, CacheSection>,
    component: &str,
    source_hash: &str,
    configuration: &str,
) -> Option<&'a PathBuf> {
    record.get(component)?.get(source_hash)?.get(configuration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BuildCache::load(dir.path().join(DEFAULT_CACHE_FILE)).unwrap();
        assert!(cache.merged().is_empty());
    }

    #[test]
    fn test_prior_hit_requires_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("deck_10.png");
        fs::write(&artifact, b"png").unwrap();

        let cache_path = dir.path().join(DEFAULT_CACHE_FILE);
        let mut first = BuildCache::load(&cache_path).unwrap();
        first.record("inkscape", "abc", "10", artifact.clone());
        first.flush().unwrap();

        let second = BuildCache::load(&cache_path).unwrap();
        assert_eq!(second.lookup("inkscape", "abc", "10"), Some(CacheHit::PriorRun(artifact.clone())));
        assert_eq!(second.lookup("inkscape", "abc", "01"), None);
        assert_eq!(second.lookup("inkscape", "other", "10"), None);

        fs::remove_file(&artifact).unwrap();
        assert_eq!(second.lookup("inkscape", "abc", "10"), None);
    }

    #[test]
    fn test_this_run_hit_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = BuildCache::load(dir.path().join(DEFAULT_CACHE_FILE)).unwrap();
        cache.record("inkscape", "abc", "11", PathBuf::from("fresh.png"));
        assert_eq!(
            cache.lookup("inkscape", "abc", "11"),
            Some(CacheHit::ThisRun(PathBuf::from("fresh.png")))
        );
    }

    #[test]
    fn test_flush_replaces_active_sections_only() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join(DEFAULT_CACHE_FILE);
        fs::write(
            &cache_path,
            serde_json::to_string(&json!({
                "inkscape": {"old": {"1": "old_1.png"}},
                "images": {"h": {"": "pic.png"}}
            }))
            .unwrap(),
        )
        .unwrap();

        let mut cache = BuildCache::load(&cache_path).unwrap();
        cache.begin("inkscape");
        cache.record("inkscape", "new", "1", PathBuf::from("new_1.png"));
        cache.flush().unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&cache_path).unwrap()).unwrap();
        assert_eq!(
            written,
            json!({
                "inkscape": {"new": {"1": "new_1.png"}},
                "images": {"h": {"": "pic.png"}}
            })
        );
    }

    #[test]
    fn test_begun_component_with_no_entries_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join(DEFAULT_CACHE_FILE);
        fs::write(&cache_path, r#"{"inkscape": {"old": {"1": "old_1.png"}}}"#).unwrap();

        let mut cache = BuildCache::load(&cache_path).unwrap();
        cache.begin("inkscape");
        cache.flush().unwrap();

        let reloaded = BuildCache::load(&cache_path).unwrap();
        assert_eq!(reloaded.merged().get("inkscape"), Some(&CacheSection::new()));
    }

    #[test]
    fn test_corrupt_cache_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join(DEFAULT_CACHE_FILE);
        fs::write(&cache_path, "{ not json").unwrap();

        let cache = BuildCache::load(&cache_path).unwrap();
        assert!(cache.merged().is_empty());
    }
}
