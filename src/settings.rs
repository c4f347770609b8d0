//! Build Settings
//!
//! Loaded from a JSON file. Every field has a default so an empty object is
//! a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::DEFAULT_CACHE_FILE;
use crate::error::{LayerError, Result};
use crate::hashing::fingerprint;
use crate::render::{InkscapeCli, InkscapeRasterizer, OutputFormat};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSettings {
    #[serde(default = "default_target_dir")]
    pub target_dir: PathBuf,
    /// svg, pdf or png
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub text_to_path: bool,
    #[serde(default = "default_layer_marker")]
    pub layer_marker: String,
    #[serde(default = "default_image_marker")]
    pub image_marker: String,
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
    #[serde(default)]
    pub inkscape: InkscapeSettings,
}

fn default_true() -> bool { true }
fn default_target_dir() -> PathBuf { PathBuf::from("layerdeck.data") }
fn default_format() -> String { "png".to_string() }
fn default_layer_marker() -> String { "![sm.inkscape]".to_string() }
fn default_image_marker() -> String { "![sm.image]".to_string() }
fn default_cache_file() -> String { DEFAULT_CACHE_FILE.to_string() }
fn default_program() -> PathBuf { PathBuf::from("inkscape") }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InkscapeSettings {
    #[serde(default = "default_program")]
    pub program: PathBuf,
    #[serde(default)]
    pub cli: InkscapeCli,
    #[serde(default = "default_true")]
    pub export_area_page: bool,
}

impl Default for InkscapeSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            cli: InkscapeCli::default(),
            export_area_page: true,
        }
    }
}

impl InkscapeSettings {
    pub fn rasterizer(&self) -> InkscapeRasterizer {
        InkscapeRasterizer::new(&self.program, self.cli).with_export_area_page(self.export_area_page)
    }
}

/// Settings that change rendered bytes
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderProfile<'a> {
    format: OutputFormat,
    text_to_path: bool,
    cli: InkscapeCli,
    export_area_page: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    layer_order: Option<&'a [String]>,
}

impl BuildSettings {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| LayerError::io(path, e))?;
        let settings: Self = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.output_format()?;

        if self.layer_marker.trim().is_empty() || self.image_marker.trim().is_empty() {
            return Err(LayerError::Configuration("directive markers must not be empty".into()));
        }
        if self.layer_marker == self.image_marker {
            return Err(LayerError::Configuration("layer and image markers must differ".into()));
        }

        let cache_name = Path::new(&self.cache_file);
        if self.cache_file.is_empty() || cache_name.file_name() != Some(cache_name.as_os_str()) {
            return Err(LayerError::Configuration(format!(
                "cache file '{}' must be a plain file name inside the target directory",
                self.cache_file
            )));
        }

        Ok(())
    }

    pub fn output_format(&self) -> Result<OutputFormat> {
        self.format.parse()
    }

    pub fn cache_path(&self) -> PathBuf {
        self.target_dir.join(&self.cache_file)
    }

    /// Digest of everything besides the source document that shapes an
    /// artifact. An explicit layer order changes what each bit means.
    pub fn render_fingerprint(&self, layer_order: Option<&[String]>) -> Result<String> {
        fingerprint(&RenderProfile {
            format: self.output_format()?,
            text_to_path: self.text_to_path,
            cli: self.inkscape.cli,
            export_area_page: self.inkscape.export_area_page,
            layer_order,
        })
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            target_dir: default_target_dir(),
            format: default_format(),
            text_to_path: true,
            layer_marker: default_layer_marker(),
            image_marker: default_image_marker(),
            cache_file: default_cache_file(),
            inkscape: InkscapeSettings::default(),
        }
    }
}
