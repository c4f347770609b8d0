//! Layer Pipeline - Configurations to Artifacts
//!
//! For each configuration, in order: toggle the layers, derive the canonical
//! artifact name, render unless that name was already produced in this call.
//! The document is restored to its pristine state afterwards, whether or not
//! every render succeeded.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::configuration::{enumerate, ConfigSpec, Configuration};
use crate::document::Document;
use crate::error::Result;
use crate::render::{OutputFormat, Rasterizer, RenderInvoker};

pub struct LayerPipeline<R: Rasterizer> {
    invoker: RenderInvoker<R>,
}

impl<R: Rasterizer> LayerPipeline<R> {
    pub fn new(rasterizer: R, text_to_path: bool) -> Self {
        Self {
            invoker: RenderInvoker::new(rasterizer, text_to_path),
        }
    }

    pub fn invoker(&self) -> &RenderInvoker<R> {
        &self.invoker
    }

    /// Render every requested configuration (or the cumulative default).
    ///
    /// Returns one path per configuration, duplicates and order preserved.
    pub fn render_layers(
        &self,
        document: &mut Document,
        output_root: &Path,
        format: OutputFormat,
        configs: Option<&[ConfigSpec]>,
    ) -> Result<Vec<PathBuf>> {
        let configurations = enumerate(document.layer_count(), configs)?;
        self.render_configurations(document, output_root, format, &configurations)
    }

    pub fn render_configurations(
        &self,
        document: &mut Document,
        output_root: &Path,
        format: OutputFormat,
        configurations: &[Configuration],
    ) -> Result<Vec<PathBuf>> {
        let result = self.render_each(document, output_root, format, configurations);
        document.reset();
        result
    }

    fn render_each(
        &self,
        document: &mut Document,
        output_root: &Path,
        format: OutputFormat,
        configurations: &[Configuration],
    ) -> Result<Vec<PathBuf>> {
        let mut produced: HashSet<PathBuf> = HashSet::new();
        let mut rendered = Vec::with_capacity(configurations.len());

        for configuration in configurations {
            let bits = document.set_configuration(configuration)?;
            let output = artifact_path(output_root, &bits, format);

            if produced.insert(output.clone()) {
                self.invoker.render(document, &output, format)?;
            } else {
                debug!(output = %output.display(), "configuration repeated, reusing artifact");
            }

            rendered.push(output);
        }

        Ok(rendered)
    }
}

/// `<root>_<bits>.<ext>`
pub fn artifact_path(output_root: &Path, bits: &str, format: OutputFormat) -> PathBuf {
    let mut name = OsString::from(output_root.as_os_str());
    name.push(format!("_{}.{}", bits, format.extension()));
    PathBuf::from(name)
}
