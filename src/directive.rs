//! Slide Directives
//!
//! Recognizes the one-line markers the slide composer hands over:
//!
//! ```text
//! ![sm.inkscape](figures/deck.svg) 100,110,111
//! ![sm.image](photos/cat\(1\).png) style="width:40%"
//! ```
//!
//! Parentheses in the path are escaped with a backslash.

use std::path::{Path, PathBuf};

use crate::error::{LayerError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveLine {
    pub target: PathBuf,
    /// Whatever follows the closing parenthesis, trimmed; `None` if blank
    pub arguments: Option<String>,
}

/// Parse `line` if it starts with `marker`. Returns `None` for ordinary lines.
pub fn parse_directive(line: &str, marker: &str) -> Option<Result<DirectiveLine>> {
    let rest = line.trim_start().strip_prefix(marker)?;
    Some(parse_target(rest, line))
}

fn parse_target(rest: &str, line: &str) -> Result<DirectiveLine> {
    let malformed = || LayerError::Validation(format!("malformed directive: {}", line.trim_end()));

    let mut chars = rest.chars();
    loop {
        match chars.next() {
            Some('(') => break,
            Some(c) if c.is_whitespace() => continue,
            _ => return Err(malformed()),
        }
    }

    let mut target = String::new();
    let mut closed = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => target.push(escaped),
                None => target.push('\\'),
            },
            ')' => {
                closed = true;
                break;
            }
            other => target.push(other),
        }
    }

    let target = target.trim();
    if !closed || target.is_empty() {
        return Err(malformed());
    }

    let arguments = chars.as_str().trim();
    Ok(DirectiveLine {
        target: PathBuf::from(target),
        arguments: (!arguments.is_empty()).then(|| arguments.to_string()),
    })
}

/// Markdown image reference for one rendered artifact
pub fn image_reference(path: &Path) -> String {
    format!("![an image]({})", path.display())
}

/// Inline HTML image tag with optional extra attributes
pub fn image_tag(path: &Path, options: Option<&str>) -> String {
    match options {
        Some(options) => format!("<img src=\"{}\" {} />", path.display(), options),
        None => format!("<img src=\"{}\" />", path.display()),
    }
}
