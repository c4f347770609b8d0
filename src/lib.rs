//! LayerDeck Core - Layered Figures to Slide Artifacts
//!
//! An SVG with named layers becomes a sequence of rendered artifacts, one
//! per visibility configuration. Artifacts land in a content-addressed
//! target directory and are reused across runs through a build cache.
//!
//! # Ground Rules
//! 1. The source document is never modified
//! 2. Equal inputs give byte-identical artifacts
//! 3. Equal content is stored once
//! 4. Nothing already in the target directory is overwritten

pub mod cache;
pub mod configuration;
pub mod directive;
pub mod document;
pub mod error;
pub mod hashing;
pub mod layers;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod settings;
pub mod store;
pub mod svg;

pub use cache::{BuildCache, CacheHit};
pub use configuration::{enumerate, ConfigSpec, Configuration};
pub use document::Document;
pub use error::{LayerError, Result};
pub use hashing::{canonical_json, file_sha256};
pub use layers::{LayerDirectory, LayerOrder, LayerRecord};
pub use pipeline::LayerPipeline;
pub use render::{InkscapeCli, InkscapeRasterizer, OutputFormat, Rasterizer, RenderInvoker};
pub use session::{BuildSession, BuildSummary};
pub use settings::BuildSettings;
pub use store::ContentStore;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
