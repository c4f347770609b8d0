//! Layer Directory
//!
//! Inkscape marks layers as `<g inkscape:groupmode="layer">`. Only those
//! groups are layers; ordinary groups are drawing content.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::{LayerError, Result};
use crate::svg::{style_display, Element, NodeId, SvgTree};

pub type LayerId = String;

pub const GROUP_MODE_ATTR: &str = "inkscape:groupmode";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRecord {
    pub id: LayerId,
    pub default_visible: bool,
    /// Encounter order in the file, 0-based
    pub position: usize,
}

/// How the directory orders the layers it finds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LayerOrder {
    /// Reverse of file order. Inkscape stores the topmost layer last, so
    /// this lists layers top of the stack first.
    #[default]
    Reversed,
    /// Exactly the given ids, in the given order
    Explicit(Vec<LayerId>),
}

#[derive(Debug, Clone)]
pub struct LayerDirectory {
    records: Vec<LayerRecord>,
    nodes: HashMap<LayerId, NodeId>,
}

impl LayerDirectory {
    pub fn scan(tree: &SvgTree, order: &LayerOrder) -> Result<Self> {
        let mut found: Vec<LayerRecord> = Vec::new();
        let mut nodes: HashMap<LayerId, NodeId> = HashMap::new();

        for (node, element) in tree.elements() {
            if !is_layer(element) {
                continue;
            }

            let id = element
                .attribute("id")
                .ok_or_else(|| LayerError::Parse(format!("layer group #{} has no id", found.len())))?;

            if nodes.insert(id.to_string(), node).is_some() {
                return Err(LayerError::Structural(format!(
                    "layer id '{}' appears on more than one layer",
                    id
                )));
            }

            found.push(LayerRecord {
                id: id.to_string(),
                default_visible: !is_hidden(element),
                position: found.len(),
            });
        }

        let records = match order {
            LayerOrder::Reversed => {
                found.reverse();
                found
            }
            LayerOrder::Explicit(ids) => arrange(found, ids)?,
        };

        Ok(Self { records, nodes })
    }

    /// Layers in directory order
    pub fn records(&self) -> &[LayerRecord] {
        &self.records
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<NodeId> {
        self.nodes.get(id).copied()
    }
}

fn is_layer(element: &Element) -> bool {
    element.local_name() == "g" && element.attribute(GROUP_MODE_ATTR) == Some("layer")
}

pub(crate) fn is_hidden(element: &Element) -> bool {
    element
        .attribute("style")
        .and_then(style_display)
        .map_or(false, |display| display.eq_ignore_ascii_case("none"))
}

fn arrange(found: Vec<LayerRecord>, ids: &[LayerId]) -> Result<Vec<LayerRecord>> {
    let mut listed: HashSet<&str> = HashSet::new();
    for id in ids {
        if !listed.insert(id.as_str()) {
            return Err(LayerError::Validation(format!("layer '{}' listed more than once", id)));
        }
    }

    let mut by_id: HashMap<String, LayerRecord> =
        found.into_iter().map(|r| (r.id.clone(), r)).collect();

    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        let record = by_id
            .remove(id)
            .ok_or_else(|| LayerError::Validation(format!("layer '{}' not in document", id)))?;
        records.push(record);
    }

    if !by_id.is_empty() {
        let mut missing: Vec<_> = by_id.into_keys().collect();
        missing.sort();
        return Err(LayerError::Validation(format!(
            "layer list omits document layers: {}",
            missing.join(", ")
        )));
    }

    Ok(records)
}

/// Layer-list file: one id per line, blank lines and `#` comments skipped
pub fn parse_layer_list(text: &str) -> Vec<LayerId> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn read_layer_list(path: &Path) -> Result<Vec<LayerId>> {
    let text = fs::read_to_string(path).map_err(|e| LayerError::io(path, e))?;
    Ok(parse_layer_list(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_layers() -> SvgTree {
        SvgTree::parse(
            r#"<svg xmlns:inkscape="http://www.inkscape.org/namespaces/inkscape">
  <g inkscape:groupmode="layer" id="A"/>
  <g id="plain"><g inkscape:groupmode="layer" id="B" style="fill:none;display:none"/></g>
  <g inkscape:groupmode="layer" id="C" style="display:inline"/>
</svg>"#,
        )
        .unwrap()
    }

    fn ids(directory: &LayerDirectory) -> Vec<&str> {
        directory.ids().collect()
    }

    #[test]
    fn test_default_order_is_reversed() {
        let directory = LayerDirectory::scan(&three_layers(), &LayerOrder::Reversed).unwrap();
        assert_eq!(ids(&directory), vec!["C", "B", "A"]);
        assert_eq!(directory.records()[0].position, 2);
        assert_eq!(directory.records()[2].position, 0);
    }

    #[test]
    fn test_default_visibility_from_style() {
        let directory = LayerDirectory::scan(&three_layers(), &LayerOrder::Reversed).unwrap();
        let visible: Vec<_> = directory.records().iter().map(|r| r.default_visible).collect();
        assert_eq!(visible, vec![true, false, true]);
    }

    #[test]
    fn test_plain_groups_are_not_layers() {
        let directory = LayerDirectory::scan(&three_layers(), &LayerOrder::Reversed).unwrap();
        assert_eq!(directory.len(), 3);
        assert!(directory.node("plain").is_none());
    }

    #[test]
    fn test_explicit_order_is_kept() {
        let order = LayerOrder::Explicit(vec!["B".into(), "A".into(), "C".into()]);
        let directory = LayerDirectory::scan(&three_layers(), &order).unwrap();
        assert_eq!(ids(&directory), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_explicit_order_rejects_mismatch() {
        let cases = vec![
            vec!["A", "B"],
            vec!["A", "B", "C", "D"],
            vec!["A", "B", "B"],
            vec!["A", "B", "X"],
        ];
        for case in cases {
            let order = LayerOrder::Explicit(case.iter().map(|s| s.to_string()).collect());
            let err = LayerDirectory::scan(&three_layers(), &order).unwrap_err();
            assert!(err.is_validation(), "{:?} should fail validation", case);
        }
    }

    #[test]
    fn test_duplicate_layer_id_is_structural() {
        let tree = SvgTree::parse(
            r#"<svg><g inkscape:groupmode="layer" id="A"/><g inkscape:groupmode="layer" id="A"/></svg>"#,
        )
        .unwrap();
        let err = LayerDirectory::scan(&tree, &LayerOrder::Reversed).unwrap_err();
        assert_eq!(err.error_code(), "STRUCTURAL_ERROR");
    }

    #[test]
    fn test_layer_without_id_is_parse_error() {
        let tree = SvgTree::parse(r#"<svg><g inkscape:groupmode="layer"/></svg>"#).unwrap();
        let err = LayerDirectory::scan(&tree, &LayerOrder::Reversed).unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }

    #[test]
    fn test_parse_layer_list() {
        let text = "# top first\nlayer3\n\n  layer1  \n#layer2\n";
        assert_eq!(parse_layer_list(text), vec!["layer3", "layer1"]);
    }
}
