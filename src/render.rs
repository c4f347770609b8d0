//! Render Invoker - External Rasterizer Bridge
//!
//! The working copy is written to a throwaway SVG, handed to the
//! rasterizer, and the output file is checked afterwards. The throwaway
//! file is removed on every exit path.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::{LayerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Svg,
    Pdf,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Png => "png",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "svg" => Ok(OutputFormat::Svg),
            "pdf" => Ok(OutputFormat::Pdf),
            "png" => Ok(OutputFormat::Png),
            other => Err(LayerError::Configuration(format!(
                "output format '{}' not recognized, must be one of svg, pdf, png",
                other
            ))),
        }
    }
}

/// Anything that turns an SVG file into an output file
pub trait Rasterizer {
    fn rasterize(&self, input: &Path, output: &Path, format: OutputFormat, text_to_path: bool) -> Result<()>;
}

/// Inkscape changed its command line in 1.0
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InkscapeCli {
    /// 0.92 and earlier: `-z --file=in --export-png=out`
    Legacy,
    /// 1.x: `in --export-type=png --export-filename=out`
    #[default]
    Modern,
}

#[derive(Debug, Clone)]
pub struct InkscapeRasterizer {
    program: PathBuf,
    cli: InkscapeCli,
    export_area_page: bool,
}

impl InkscapeRasterizer {
    pub fn new(program: impl Into<PathBuf>, cli: InkscapeCli) -> Self {
        Self {
            program: program.into(),
            cli,
            export_area_page: true,
        }
    }

    pub fn with_export_area_page(mut self, export_area_page: bool) -> Self {
        self.export_area_page = export_area_page;
        self
    }

    pub fn arguments(&self, input: &Path, output: &Path, format: OutputFormat, text_to_path: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();

        match self.cli {
            InkscapeCli::Legacy => {
                args.push("-z".into());
                args.push(flag_with_path("--file=", input));
            }
            InkscapeCli::Modern => args.push(input.as_os_str().to_os_string()),
        }

        if self.export_area_page {
            args.push("--export-area-page".into());
        }
        if text_to_path {
            args.push("--export-text-to-path".into());
        }

        match self.cli {
            InkscapeCli::Legacy => {
                let flag = match format {
                    OutputFormat::Svg => "--export-plain-svg=",
                    OutputFormat::Pdf => "--export-pdf=",
                    OutputFormat::Png => "--export-png=",
                };
                args.push(flag_with_path(flag, output));
            }
            InkscapeCli::Modern => {
                args.push(format!("--export-type={}", format.extension()).into());
                if format == OutputFormat::Svg {
                    args.push("--export-plain-svg".into());
                }
                args.push(flag_with_path("--export-filename=", output));
            }
        }

        args
    }
}

impl Default for InkscapeRasterizer {
    fn default() -> Self {
        Self::new("inkscape", InkscapeCli::default())
    }
}

impl Rasterizer for InkscapeRasterizer {
    fn rasterize(&self, input: &Path, output: &Path, format: OutputFormat, text_to_path: bool) -> Result<()> {
        let args = self.arguments(input, output, format, text_to_path);
        debug!(program = %self.program.display(), ?args, "invoking inkscape");

        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| LayerError::Render {
                output: output.to_path_buf(),
                reason: format!("could not start {}: {}", self.program.display(), e),
            })?;

        // the output file, not the exit status, decides success
        if !result.status.success() {
            warn!(
                status = %result.status,
                stderr = %String::from_utf8_lossy(&result.stderr).trim(),
                "inkscape exited with failure"
            );
        }

        Ok(())
    }
}

fn flag_with_path(flag: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push(path.as_os_str());
    arg
}

/// Renders one document state into one artifact file
pub struct RenderInvoker<R: Rasterizer> {
    rasterizer: R,
    text_to_path: bool,
}

impl<R: Rasterizer> RenderInvoker<R> {
    pub fn new(rasterizer: R, text_to_path: bool) -> Self {
        Self {
            rasterizer,
            text_to_path,
        }
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    pub fn render(&self, document: &Document, output: &Path, format: OutputFormat) -> Result<PathBuf> {
        if output.extension().map_or(true, |ext| ext != format.extension()) {
            return Err(LayerError::Configuration(format!(
                "{} does not match output format {}",
                output.display(),
                format
            )));
        }

        // Never overwrite
        if output.exists() {
            return Err(LayerError::Precondition(output.to_path_buf()));
        }

        let mut scratch = scratch_file(document, output)?;
        let svg = document.svg()?;
        scratch
            .write_all(svg.as_bytes())
            .and_then(|_| scratch.flush())
            .map_err(|e| LayerError::io(scratch.path(), e))?;

        info!(output = %output.display(), %format, "rendering");
        self.rasterizer
            .rasterize(scratch.path(), output, format, self.text_to_path)?;

        if !output.is_file() {
            return Err(LayerError::Render {
                output: output.to_path_buf(),
                reason: "rasterizer finished without writing the output file".to_string(),
            });
        }

        Ok(output.to_path_buf())
    }
}

/// Throwaway copy of the working SVG. Placed beside the source so relative
/// links in the drawing still resolve.
fn scratch_file(document: &Document, output: &Path) -> Result<tempfile::NamedTempFile> {
    let candidates = [
        document.source_path().and_then(Path::parent),
        output.parent(),
    ];

    for dir in candidates.into_iter().flatten() {
        let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
        match tempfile::Builder::new()
            .prefix(".layerdeck-")
            .suffix(".svg")
            .tempfile_in(dir)
        {
            Ok(file) => return Ok(file),
            Err(e) => debug!(dir = %dir.display(), error = %e, "scratch directory unusable"),
        }
    }

    tempfile::Builder::new()
        .prefix(".layerdeck-")
        .suffix(".svg")
        .tempfile()
        .map_err(|e| LayerError::io(std::env::temp_dir(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerOrder;
    use std::cell::RefCell;
    use std::fs;

    /// Copies the scratch SVG to the output and remembers where it was
    #[derive(Default)]
    struct CopyRasterizer {
        inputs: RefCell<Vec<PathBuf>>,
    }

    impl Rasterizer for CopyRasterizer {
        fn rasterize(&self, input: &Path, output: &Path, _: OutputFormat, _: bool) -> Result<()> {
            self.inputs.borrow_mut().push(input.to_path_buf());
            fs::copy(input, output).map_err(|e| LayerError::io(output, e))?;
            Ok(())
        }
    }

    /// Never writes the output; optionally reports an error instead
    #[derive(Default)]
    struct BrokenRasterizer {
        inputs: RefCell<Vec<PathBuf>>,
        fail: bool,
    }

    impl Rasterizer for BrokenRasterizer {
        fn rasterize(&self, input: &Path, output: &Path, _: OutputFormat, _: bool) -> Result<()> {
            assert!(input.is_file());
            self.inputs.borrow_mut().push(input.to_path_buf());
            if self.fail {
                return Err(LayerError::Render {
                    output: output.to_path_buf(),
                    reason: "exited with signal 11".to_string(),
                });
            }
            Ok(())
        }
    }

    fn document() -> Document {
        Document::parse(
            r#"<svg><g inkscape:groupmode="layer" id="A"/></svg>"#,
            &LayerOrder::Reversed,
        )
        .unwrap()
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("pdf".parse::<OutputFormat>().unwrap(), OutputFormat::Pdf);
        let err = "jpg".parse::<OutputFormat>().unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
        assert!("PNG".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_legacy_arguments() {
        let inkscape = InkscapeRasterizer::new("inkscape", InkscapeCli::Legacy);
        let args = inkscape.arguments(Path::new("in.svg"), Path::new("out.png"), OutputFormat::Png, true);
        assert_eq!(
            args,
            vec!["-z", "--file=in.svg", "--export-area-page", "--export-text-to-path", "--export-png=out.png"]
                .into_iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_modern_plain_svg_arguments() {
        let inkscape = InkscapeRasterizer::default().with_export_area_page(false);
        let args = inkscape.arguments(Path::new("in.svg"), Path::new("out.svg"), OutputFormat::Svg, false);
        assert_eq!(
            args,
            vec!["in.svg", "--export-type=svg", "--export-plain-svg", "--export-filename=out.svg"]
                .into_iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_render_writes_working_copy_and_cleans_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("deck_1.png");
        let mut doc = document();
        doc.set_visibility("A", false).unwrap();

        let invoker = RenderInvoker::new(CopyRasterizer::default(), true);
        invoker.render(&doc, &output, OutputFormat::Png).unwrap();

        assert_eq!(fs::read_to_string(&output).unwrap(), doc.svg().unwrap());
        let scratch = invoker.rasterizer().inputs.borrow()[0].clone();
        assert!(!scratch.exists());
    }

    #[test]
    fn test_missing_output_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("deck_1.png");

        let invoker = RenderInvoker::new(BrokenRasterizer::default(), true);
        let err = invoker.render(&document(), &output, OutputFormat::Png).unwrap_err();
        assert_eq!(err.error_code(), "RENDER_ERROR");

        let scratch = invoker.rasterizer().inputs.borrow()[0].clone();
        assert!(!scratch.exists());
    }

    #[test]
    fn test_rasterizer_error_propagates_and_cleans_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("deck_1.png");

        let invoker = RenderInvoker::new(BrokenRasterizer { fail: true, ..Default::default() }, true);
        let err = invoker.render(&document(), &output, OutputFormat::Png).unwrap_err();
        assert!(err.to_string().contains("signal 11"));

        let scratch = invoker.rasterizer().inputs.borrow()[0].clone();
        assert!(!scratch.exists());
        assert!(!output.exists());
    }

    #[test]
    fn test_existing_output_is_precondition_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("deck_1.png");
        fs::write(&output, b"keep me").unwrap();

        let invoker = RenderInvoker::new(CopyRasterizer::default(), true);
        let err = invoker.render(&document(), &output, OutputFormat::Png).unwrap_err();
        assert_eq!(err.error_code(), "PRECONDITION_ERROR");
        assert_eq!(fs::read(&output).unwrap(), b"keep me");
        assert!(invoker.rasterizer().inputs.borrow().is_empty());
    }

    #[test]
    fn test_extension_mismatch_caught_before_rasterizer() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = RenderInvoker::new(CopyRasterizer::default(), true);
        let err = invoker
            .render(&document(), &dir.path().join("deck_1.pdf"), OutputFormat::Png)
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
        assert!(invoker.rasterizer().inputs.borrow().is_empty());
    }

    #[test]
    fn test_unstartable_program_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let inkscape = InkscapeRasterizer::new(dir.path().join("no-such-inkscape"), InkscapeCli::Modern);
        let invoker = RenderInvoker::new(inkscape, false);
        let err = invoker
            .render(&document(), &dir.path().join("deck_1.png"), OutputFormat::Png)
            .unwrap_err();
        assert_eq!(err.error_code(), "RENDER_ERROR");
    }
}
