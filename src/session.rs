//! Build Session - One Target Directory, One Run
//!
//! Owns the content store and the build cache for a target directory and
//! passes them to every render. A configuration is rendered only when
//! neither this run nor a previous run already produced it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cache::{BuildCache, CacheHit};
use crate::configuration::{enumerate, parse_config_list, ConfigSpec, Configuration};
use crate::directive::{image_reference, image_tag, parse_directive};
use crate::document::Document;
use crate::error::{LayerError, Result};
use crate::hashing::file_sha256;
use crate::layers::LayerOrder;
use crate::pipeline::LayerPipeline;
use crate::render::{InkscapeRasterizer, OutputFormat, Rasterizer};
use crate::settings::BuildSettings;
use crate::store::ContentStore;

/// Cache component prefix for layered renders
pub const LAYERS_COMPONENT: &str = "inkscape";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub target_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents: usize,
    pub rendered: usize,
    pub reused: usize,
    pub outputs: Vec<PathBuf>,
}

pub struct BuildSession<R: Rasterizer> {
    settings: BuildSettings,
    format: OutputFormat,
    pipeline: LayerPipeline<R>,
    store: ContentStore,
    cache: BuildCache,
    started_at: DateTime<Utc>,
    documents: usize,
    rendered: usize,
    reused: usize,
}

impl BuildSession<InkscapeRasterizer> {
    pub fn open(settings: BuildSettings) -> Result<Self> {
        let rasterizer = settings.inkscape.rasterizer();
        Self::with_rasterizer(settings, rasterizer)
    }
}

impl<R: Rasterizer> BuildSession<R> {
    pub fn with_rasterizer(settings: BuildSettings, rasterizer: R) -> Result<Self> {
        settings.validate()?;
        let format = settings.output_format()?;
        let store = ContentStore::open(&settings.target_dir)?;
        let cache = BuildCache::load(settings.cache_path())?;

        info!(target_dir = %settings.target_dir.display(), %format, "build session opened");

        Ok(Self {
            pipeline: LayerPipeline::new(rasterizer, settings.text_to_path),
            settings,
            format,
            store,
            cache,
            started_at: Utc::now(),
            documents: 0,
            rendered: 0,
            reused: 0,
        })
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    pub fn rasterizer(&self) -> &R {
        self.pipeline.invoker().rasterizer()
    }

    /// Render `source` with the default (reversed) layer order
    pub fn render_document(&mut self, source: &Path, configs: Option<&[ConfigSpec]>) -> Result<Vec<PathBuf>> {
        self.render_document_with_order(source, &LayerOrder::Reversed, configs)
    }

    /// Artifact paths inside the target directory, one per configuration,
    /// in configuration order
    pub fn render_document_with_order(
        &mut self,
        source: &Path,
        order: &LayerOrder,
        configs: Option<&[ConfigSpec]>,
    ) -> Result<Vec<PathBuf>> {
        let source_hash = file_sha256(source)?;
        let mut document = Document::open(source, order)?;
        let configurations = enumerate(document.layer_count(), configs)?;

        let explicit_order = match order {
            LayerOrder::Explicit(ids) => Some(ids.as_slice()),
            LayerOrder::Reversed => None,
        };
        let component = self.component(explicit_order)?;
        self.cache.begin(&component);
        self.documents += 1;

        let mut pending: Vec<Configuration> = Vec::new();
        for configuration in &configurations {
            let bits = configuration.canonical();
            match self.cache.lookup(&component, &source_hash, &bits) {
                Some(CacheHit::ThisRun(_)) => self.reused += 1,
                Some(CacheHit::PriorRun(path)) => {
                    let stored = self.store.adopt(&path)?;
                    self.cache.record(&component, &source_hash, &bits, stored);
                    self.reused += 1;
                }
                None if pending.contains(configuration) => {}
                None => pending.push(configuration.clone()),
            }
        }

        if !pending.is_empty() {
            self.render_pending(&mut document, &component, &source_hash, &pending)?;
        }

        configurations
            .iter()
            .map(|configuration| {
                let bits = configuration.canonical();
                self.cache
                    .lookup(&component, &source_hash, &bits)
                    .map(|hit| hit.path().to_path_buf())
                    .ok_or_else(|| {
                        LayerError::Structural(format!("configuration {} of {} was never produced", bits, source.display()))
                    })
            })
            .collect()
    }

    /// Each configuration is rendered and stored before the next one starts,
    /// so a failure keeps everything produced so far.
    fn render_pending(
        &mut self,
        document: &mut Document,
        component: &str,
        source_hash: &str,
        pending: &[Configuration],
    ) -> Result<()> {
        let scratch = tempfile::Builder::new()
            .prefix(".layerdeck-render-")
            .tempdir()
            .map_err(|e| LayerError::io(std::env::temp_dir(), e))?;
        let root = scratch
            .path()
            .join(document.root_name().unwrap_or_else(|| "layers".to_string()));

        for configuration in pending {
            let rendered = self.pipeline.render_configurations(
                document,
                &root,
                self.format,
                std::slice::from_ref(configuration),
            )?;

            for artifact in &rendered {
                let stored = self.store.copy(artifact)?;
                debug!(configuration = %configuration, stored = %stored.display(), "rendered");
                self.cache
                    .record(component, source_hash, &configuration.canonical(), stored);
                self.rendered += 1;
            }
        }

        Ok(())
    }

    /// Copy a plain image through the store
    pub fn copy_image(&mut self, source: &Path) -> Result<PathBuf> {
        self.store.copy(source)
    }

    /// Replacement lines for one slide line. Ordinary lines come back as-is.
    pub fn process_line(&mut self, line: &str) -> Result<Vec<String>> {
        if let Some(parsed) = parse_directive(line, &self.settings.layer_marker) {
            let directive = parsed?;
            let configs = directive.arguments.as_deref().map(parse_config_list);
            let artifacts = self.render_document(&directive.target, configs.as_deref())?;
            return Ok(artifacts.iter().map(|path| image_reference(path)).collect());
        }

        if let Some(parsed) = parse_directive(line, &self.settings.image_marker) {
            let directive = parsed?;
            let stored = self.copy_image(&directive.target)?;
            return Ok(vec![image_tag(&stored, directive.arguments.as_deref())]);
        }

        Ok(vec![line.to_string()])
    }

    /// Persist what this run has recorded so far. Used after a failed
    /// document so finished configurations are not rendered again next run.
    pub fn flush(&self) -> Result<()> {
        self.cache.flush()
    }

    /// Flush the build cache and report what happened
    pub fn finish(self) -> Result<BuildSummary> {
        self.cache.flush()?;

        let summary = BuildSummary {
            target_dir: self.settings.target_dir.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            documents: self.documents,
            rendered: self.rendered,
            reused: self.reused,
            outputs: self.store.outputs().to_vec(),
        };
        info!(rendered = summary.rendered, reused = summary.reused, "build finished");
        Ok(summary)
    }

    fn component(&self, explicit_order: Option<&[String]>) -> Result<String> {
        let profile = self.settings.render_fingerprint(explicit_order)?;
        Ok(format!("{}-{}", LAYERS_COMPONENT, &profile[..12]))
    }
}
