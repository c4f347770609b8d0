//! LayerDeck CLI - Bridge interface for the slide composer
//!
//! Commands: layers, render, process
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on validation failure, 1 on any other error

use clap::{Parser, Subcommand};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use layerdeck_core::{
    configuration::parse_config_list,
    layers::read_layer_list,
    BuildSession, BuildSettings, Document, LayerError, LayerOrder, Rasterizer, Result,
};

#[derive(Parser)]
#[command(name = "layerdeck-cli")]
#[command(about = "LayerDeck CLI - Layered SVG figures to slide artifacts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON settings file
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the layers of a document
    Layers {
        svg: PathBuf,

        /// File naming the layers in order, one id per line
        #[arg(short, long)]
        layers: Option<PathBuf>,
    },

    /// Render every configuration of a document
    Render {
        svg: PathBuf,

        #[arg(short, long)]
        target_dir: Option<PathBuf>,

        /// svg, pdf or png
        #[arg(short, long)]
        format: Option<String>,

        /// Comma-separated bitstrings, e.g. 100,110
        #[arg(short, long)]
        configs: Option<String>,

        /// File naming the layers in order, one id per line
        #[arg(short, long)]
        layers: Option<PathBuf>,

        #[arg(long)]
        no_text_to_path: bool,
    },

    /// Expand slide directives in a markdown file
    Process {
        input: PathBuf,

        /// Write here instead of stdout; never overwrites
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let output = json!({
                "error": e.to_string(),
                "code": e.error_code(),
            });
            println!("{}", output);
            if e.is_validation() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> Result<String> {
    let settings = match &cli.settings {
        Some(path) => BuildSettings::load_from_file(path)?,
        None => BuildSettings::default(),
    };

    match cli.command {
        Commands::Layers { svg, layers } => {
            let order = layer_order(layers.as_deref())?;
            let document = Document::open(&svg, &order)?;
            Ok(serde_json::to_string_pretty(document.layers())?)
        }

        Commands::Render { svg, target_dir, format, configs, layers, no_text_to_path } => {
            let mut settings = settings;
            if let Some(target_dir) = target_dir {
                settings.target_dir = target_dir;
            }
            if let Some(format) = format {
                settings.format = format;
            }
            if no_text_to_path {
                settings.text_to_path = false;
            }
            let order = layer_order(layers.as_deref())?;
            let configs = configs.as_deref().map(parse_config_list);

            let mut session = BuildSession::open(settings)?;
            let artifacts = session
                .render_document_with_order(&svg, &order, configs.as_deref())
                .map_err(|e| keep_progress(&session, e))?;
            let summary = session.finish()?;

            Ok(serde_json::to_string_pretty(&json!({
                "artifacts": artifacts,
                "summary": summary,
            }))?)
        }

        Commands::Process { input, output } => {
            if let Some(output) = &output {
                if output.exists() {
                    return Err(LayerError::Precondition(output.clone()));
                }
            }

            let content = fs::read_to_string(&input).map_err(|e| io_error(&input, e))?;
            let mut session = BuildSession::open(settings)?;
            let mut processed = String::with_capacity(content.len());
            for line in content.lines() {
                let replacements = session
                    .process_line(line)
                    .map_err(|e| keep_progress(&session, e))?;
                for replacement in replacements {
                    processed.push_str(&replacement);
                    processed.push('\n');
                }
            }
            let summary = session.finish()?;

            match output {
                Some(output) => {
                    fs::write(&output, &processed).map_err(|e| io_error(&output, e))?;
                    Ok(serde_json::to_string_pretty(&json!({
                        "output": output,
                        "summary": summary,
                    }))?)
                }
                None => Ok(processed.trim_end_matches('\n').to_string()),
            }
        }
    }
}

fn layer_order(layers: Option<&Path>) -> Result<LayerOrder> {
    match layers {
        Some(path) => Ok(LayerOrder::Explicit(read_layer_list(path)?)),
        None => Ok(LayerOrder::Reversed),
    }
}

/// Record finished renders before reporting `error`
fn keep_progress<R: Rasterizer>(session: &BuildSession<R>, error: LayerError) -> LayerError {
    if let Err(flush_error) = session.flush() {
        warn!(error = %flush_error, "could not save build cache");
    }
    error
}

fn io_error(path: &Path, source: std::io::Error) -> LayerError {
    LayerError::Io { path: path.to_path_buf(), source }
}
