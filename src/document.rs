//! Layered Document
//!
//! Holds the pristine source text, the element tree parsed from it, and a
//! working tree that layer toggles mutate. The pristine side is never
//! touched; `reset` re-derives the working tree from it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::configuration::Configuration;
use crate::error::{LayerError, Result};
use crate::layers::{is_hidden, LayerDirectory, LayerOrder, LayerRecord};
use crate::svg::{set_style_display, SvgTree};

#[derive(Debug, Clone)]
pub struct Document {
    source_path: Option<PathBuf>,
    pristine: String,
    pristine_tree: SvgTree,
    working: SvgTree,
    directory: LayerDirectory,
}

impl Document {
    pub fn parse(source: impl Into<String>, order: &LayerOrder) -> Result<Self> {
        let pristine = source.into();
        let pristine_tree = SvgTree::parse(&pristine)?;
        let directory = LayerDirectory::scan(&pristine_tree, order)?;

        Ok(Self {
            source_path: None,
            working: pristine_tree.clone(),
            pristine,
            pristine_tree,
            directory,
        })
    }

    pub fn open(path: &Path, order: &LayerOrder) -> Result<Self> {
        let source = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::InvalidData => LayerError::Parse(format!("{} is not UTF-8 text", path.display())),
            _ => LayerError::io(path, e),
        })?;
        let mut document = Self::parse(source, order)?;
        document.source_path = Some(path.to_path_buf());
        Ok(document)
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// File stem of the source, used as the artifact name root
    pub fn root_name(&self) -> Option<String> {
        self.source_path
            .as_deref()
            .and_then(Path::file_stem)
            .map(|stem| stem.to_string_lossy().into_owned())
    }

    pub fn pristine(&self) -> &str {
        &self.pristine
    }

    /// Layers in directory order
    pub fn layers(&self) -> &[LayerRecord] {
        self.directory.records()
    }

    pub fn layer_count(&self) -> usize {
        self.directory.len()
    }

    pub fn set_visibility(&mut self, layer_id: &str, visible: bool) -> Result<()> {
        let node = self.layer_node(layer_id)?;
        let element = self
            .working
            .element_mut(node)
            .ok_or_else(|| LayerError::Structural(format!("layer '{}' lost its element", layer_id)))?;

        let display = if visible { "inline" } else { "none" };
        let style = set_style_display(element.attribute("style").unwrap_or(""), display);
        element.set_attribute("style", style);
        Ok(())
    }

    /// Current visibility of one layer in the working copy
    pub fn visibility(&self, layer_id: &str) -> Result<bool> {
        let node = self.layer_node(layer_id)?;
        self.working
            .element(node)
            .map(|element| !is_hidden(element))
            .ok_or_else(|| LayerError::Structural(format!("layer '{}' lost its element", layer_id)))
    }

    /// Apply one flag per layer in directory order; returns the canonical bitstring.
    ///
    /// A failure part way through leaves the working copy half edited. Call
    /// `reset` before trying again.
    pub fn set_configuration(&mut self, configuration: &Configuration) -> Result<String> {
        if configuration.len() != self.layer_count() {
            return Err(LayerError::Validation(format!(
                "configuration '{}' has {} entries, document has {} layers",
                configuration,
                configuration.len(),
                self.layer_count()
            )));
        }

        let ids: Vec<String> = self.directory.ids().map(str::to_string).collect();
        for (index, id) in ids.iter().enumerate() {
            self.set_visibility(id, configuration.is_visible(index))?;
        }

        Ok(configuration.canonical())
    }

    /// Visibility of every layer as it stands in the working copy
    pub fn current_configuration(&self) -> Result<Configuration> {
        self.directory
            .ids()
            .map(|id| self.visibility(id))
            .collect::<Result<Vec<_>>>()
            .map(Configuration::new)
    }

    pub fn reset(&mut self) {
        self.working = self.pristine_tree.clone();
    }

    /// Serialized working copy
    pub fn svg(&self) -> Result<String> {
        self.working.to_xml()
    }

    /// Write the working copy as an Inkscape SVG. Existing files are kept
    /// unless `force` is set.
    pub fn write_svg(&self, output: &Path, force: bool) -> Result<()> {
        if output.extension().map_or(true, |ext| ext != "svg") {
            return Err(LayerError::Configuration(format!(
                "{} must have an .svg extension",
                output.display()
            )));
        }
        if output.exists() && !force {
            return Err(LayerError::Precondition(output.to_path_buf()));
        }

        let svg = self.svg()?;
        fs::write(output, svg).map_err(|e| LayerError::io(output, e))
    }

    fn layer_node(&self, layer_id: &str) -> Result<usize> {
        self.directory
            .node(layer_id)
            .ok_or_else(|| LayerError::Validation(format!("layer '{}' not in document", layer_id)))
    }
}
