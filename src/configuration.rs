//! Layer Configurations
//!
//! A configuration is one visibility flag per layer, in directory order.
//! Its canonical form is a '0'/'1' string and is used for file names and
//! cache keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LayerError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Configuration(Vec<bool>);

impl Configuration {
    pub fn new(flags: Vec<bool>) -> Self {
        Self(flags)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn flags(&self) -> &[bool] {
        &self.0
    }

    pub fn is_visible(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn canonical(&self) -> String {
        self.0.iter().map(|&on| if on { '1' } else { '0' }).collect()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromStr for Configuration {
    type Err = LayerError;

    fn from_str(bits: &str) -> Result<Self> {
        bits.chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(LayerError::Validation(format!(
                    "configuration '{}' contains '{}', expected only 0 and 1",
                    bits, other
                ))),
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }
}

impl TryFrom<String> for Configuration {
    type Error = LayerError;

    fn try_from(bits: String) -> Result<Self> {
        bits.parse()
    }
}

impl From<Configuration> for String {
    fn from(configuration: Configuration) -> Self {
        configuration.canonical()
    }
}

/// Caller-supplied configuration, either form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigSpec {
    Flags(Vec<bool>),
    Bits(String),
}

impl ConfigSpec {
    pub fn normalize(&self) -> Result<Configuration> {
        match self {
            ConfigSpec::Flags(flags) => Ok(Configuration::new(flags.clone())),
            ConfigSpec::Bits(bits) => bits.trim().parse(),
        }
    }
}

impl From<&str> for ConfigSpec {
    fn from(bits: &str) -> Self {
        ConfigSpec::Bits(bits.to_string())
    }
}

impl From<Vec<bool>> for ConfigSpec {
    fn from(flags: Vec<bool>) -> Self {
        ConfigSpec::Flags(flags)
    }
}

impl From<&Configuration> for ConfigSpec {
    fn from(configuration: &Configuration) -> Self {
        ConfigSpec::Flags(configuration.flags().to_vec())
    }
}

/// Configurations to render for a document with `layer_count` layers.
///
/// Explicit input is validated and kept in order. Without input, layers are
/// revealed one at a time: `100`, `110`, `111`.
pub fn enumerate(layer_count: usize, explicit: Option<&[ConfigSpec]>) -> Result<Vec<Configuration>> {
    let Some(specs) = explicit else {
        return Ok(cumulative(layer_count));
    };

    if specs.is_empty() {
        return Err(LayerError::Validation(
            "configuration list must have at least one configuration".to_string(),
        ));
    }

    specs
        .iter()
        .map(|spec| {
            let configuration = spec.normalize()?;
            if configuration.len() != layer_count {
                return Err(LayerError::Validation(format!(
                    "configuration '{}' has {} entries, document has {} layers",
                    configuration,
                    configuration.len(),
                    layer_count
                )));
            }
            Ok(configuration)
        })
        .collect()
}

pub fn cumulative(layer_count: usize) -> Vec<Configuration> {
    (0..layer_count)
        .map(|i| Configuration::new((0..layer_count).map(|layer| layer <= i).collect()))
        .collect()
}

/// Comma-separated list as written after a slide directive
pub fn parse_config_list(text: &str) -> Vec<ConfigSpec> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ConfigSpec::from)
        .collect()
}
