//! SVG Element Tree
//!
//! The document is parsed once into an arena of nodes. Elements own an
//! ordered attribute list and their children; everything that is not an
//! element (text, comments, declarations, doctype) is kept as the raw event
//! it was read as, so re-serialization reproduces it unchanged.

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::{LayerError, Result};

pub type NodeId = usize;

#[derive(Debug, Clone)]
enum Node {
    Element(Element),
    Markup(Event<'static>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<NodeId>,
    self_closing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Attribute {
    key: String,
    value: String,
    /// Escaped text as read from the file; dropped once the value is set
    raw: Option<String>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>, self_closing: bool, position: usize) -> Result<Self> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| syntax_error(position, e))?
            .to_string();

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| syntax_error(position, e))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| syntax_error(position, e))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|e| syntax_error(position, e))?
                .into_owned();
            let raw = std::str::from_utf8(&attr.value)
                .map_err(|e| syntax_error(position, e))?
                .to_string();
            attributes.push(Attribute { key, value, raw: Some(raw) });
        }

        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
            self_closing,
        })
    }

    /// Qualified name as written, e.g. `svg:g`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without namespace prefix
    pub fn local_name(&self) -> &str {
        match self.name.rsplit_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }

    /// Overwrite in place, or append as the last attribute
    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|attr| attr.key == key) {
            Some(existing) => {
                existing.value = value;
                existing.raw = None;
            }
            None => self.attributes.push(Attribute {
                key: key.to_string(),
                value,
                raw: None,
            }),
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|attr| (attr.key.as_str(), attr.value.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct SvgTree {
    nodes: Vec<Node>,
    top: Vec<NodeId>,
    root: NodeId,
}

impl SvgTree {
    pub fn parse(source: &str) -> Result<Self> {
        let mut reader = Reader::from_str(source);
        let mut nodes: Vec<Node> = Vec::new();
        let mut top: Vec<NodeId> = Vec::new();
        let mut open: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        loop {
            let position = reader.buffer_position();
            let event = reader
                .read_event()
                .map_err(|e| syntax_error(position, e))?;

            match event {
                Event::Start(start) | Event::Empty(start) if open.is_empty() && root.is_some() => {
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    return Err(syntax_error(
                        position,
                        format!("second root element <{}>", name),
                    ));
                }
                Event::Start(start) => {
                    let element = Element::from_start(&start, false, position)?;
                    let id = attach(&mut nodes, &mut top, &open, Node::Element(element));
                    root.get_or_insert(id);
                    open.push(id);
                }
                Event::Empty(start) => {
                    let element = Element::from_start(&start, true, position)?;
                    let id = attach(&mut nodes, &mut top, &open, Node::Element(element));
                    root.get_or_insert(id);
                }
                Event::End(_) => {
                    // the reader enforces matching names
                    if open.pop().is_none() {
                        return Err(syntax_error(position, "closing tag without opening tag"));
                    }
                }
                Event::Eof => break,
                other => {
                    attach(&mut nodes, &mut top, &open, Node::Markup(other.into_owned()));
                }
            }
        }

        if let Some(&unclosed) = open.last() {
            let name = match &nodes[unclosed] {
                Node::Element(element) => element.name.clone(),
                Node::Markup(_) => String::new(),
            };
            return Err(LayerError::Parse(format!("unclosed element <{}>", name)));
        }

        let root = root.ok_or_else(|| LayerError::Parse("no root element".to_string()))?;

        Ok(Self { nodes, top, root })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.nodes.get(id) {
            Some(Node::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.nodes.get_mut(id) {
            Some(Node::Element(element)) => Some(element),
            _ => None,
        }
    }

    /// All elements in document order
    pub fn elements(&self) -> impl Iterator<Item = (NodeId, &Element)> {
        self.nodes.iter().enumerate().filter_map(|(id, node)| match node {
            Node::Element(element) => Some((id, element)),
            Node::Markup(_) => None,
        })
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        for &id in &self.top {
            self.write_node(id, &mut writer)?;
        }
        String::from_utf8(writer.into_inner())
            .map_err(|e| LayerError::Structural(format!("serialized document is not UTF-8: {}", e)))
    }

    fn write_node(&self, id: NodeId, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        match &self.nodes[id] {
            Node::Markup(event) => write_event(writer, event.clone()),
            Node::Element(element) => {
                let mut start = BytesStart::new(element.name.as_str());
                for attr in &element.attributes {
                    match &attr.raw {
                        // untouched values go back exactly as they were read
                        Some(raw) => start.push_attribute((attr.key.as_bytes(), raw.as_bytes())),
                        None => start.push_attribute((attr.key.as_str(), attr.value.as_str())),
                    }
                }

                if element.self_closing && element.children.is_empty() {
                    return write_event(writer, Event::Empty(start));
                }

                write_event(writer, Event::Start(start))?;
                for &child in &element.children {
                    self.write_node(child, writer)?;
                }
                write_event(writer, Event::End(BytesEnd::new(element.name.as_str())))
            }
        }
    }
}

fn attach(nodes: &mut Vec<Node>, top: &mut Vec<NodeId>, open: &[NodeId], node: Node) -> NodeId {
    let id = nodes.len();
    nodes.push(node);
    match open.last() {
        Some(&parent) => {
            if let Node::Element(element) = &mut nodes[parent] {
                element.children.push(id);
            }
        }
        None => top.push(id),
    }
    id
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| LayerError::Structural(format!("cannot serialize document: {}", e)))
}

fn syntax_error(position: usize, reason: impl std::fmt::Display) -> LayerError {
    LayerError::Parse(format!("at byte {}: {}", position, reason))
}

/// Value of the last `display` declaration in a CSS style string
pub fn style_display(style: &str) -> Option<&str> {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .filter(|(property, _)| property.trim().eq_ignore_ascii_case("display"))
        .map(|(_, value)| value.trim())
        .last()
}

/// Rewrite the `display` declaration of a style string, appending one if absent.
/// Other declarations keep their order.
pub fn set_style_display(style: &str, value: &str) -> String {
    let mut declarations: Vec<String> = Vec::new();
    let mut replaced = false;

    for decl in style.split(';').map(str::trim).filter(|d| !d.is_empty()) {
        let is_display = decl
            .split_once(':')
            .map_or(false, |(property, _)| property.trim().eq_ignore_ascii_case("display"));

        if !is_display {
            declarations.push(decl.to_string());
        } else if !replaced {
            declarations.push(format!("display:{}", value));
            replaced = true;
        }
    }

    if !replaced {
        declarations.push(format!("display:{}", value));
    }

    declarations.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- drawn by hand -->
<svg xmlns="http://www.w3.org/2000/svg" xmlns:inkscape="http://www.inkscape.org/namespaces/inkscape">
  <g inkscape:groupmode="layer" id="layer1" style="display:inline">
    <rect width="10" height="10"/>
    <text>a &amp; b</text>
  </g>
</svg>"#;

    #[test]
    fn test_parse_finds_root_and_elements() {
        let tree = SvgTree::parse(SAMPLE).unwrap();
        let root = tree.element(tree.root()).unwrap();
        assert_eq!(root.name(), "svg");

        let names: Vec<_> = tree.elements().map(|(_, e)| e.name().to_string()).collect();
        assert_eq!(names, vec!["svg", "g", "rect", "text"]);
    }

    #[test]
    fn test_roundtrip_preserves_markup() {
        let tree = SvgTree::parse(SAMPLE).unwrap();
        let xml = tree.to_xml().unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains("<!-- drawn by hand -->"));
        assert!(xml.contains("a &amp; b"));
        assert!(xml.contains(r#"<rect width="10" height="10"/>"#));

        // serialization is a fixed point
        let again = SvgTree::parse(&xml).unwrap().to_xml().unwrap();
        assert_eq!(xml, again);
    }

    #[test]
    fn test_set_attribute_overwrites_or_appends() {
        let mut tree = SvgTree::parse(SAMPLE).unwrap();
        let (id, _) = tree.elements().find(|(_, e)| e.local_name() == "g").unwrap();

        let group = tree.element_mut(id).unwrap();
        group.set_attribute("style", "display:none");
        group.set_attribute("opacity", "0.5");

        let keys: Vec<_> = group.attributes().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["inkscape:groupmode", "id", "style", "opacity"]);
        assert_eq!(group.attribute("style"), Some("display:none"));
    }

    #[test]
    fn test_untouched_attributes_keep_their_escapes() {
        let mut tree = SvgTree::parse(
            r#"<svg><g inkscape:label="a&#10;b" title="x &lt; y" style="fill:red"/></svg>"#,
        )
        .unwrap();
        let (id, _) = tree.elements().find(|(_, e)| e.local_name() == "g").unwrap();
        assert_eq!(tree.element(id).unwrap().attribute("inkscape:label"), Some("a\nb"));

        tree.element_mut(id).unwrap().set_attribute("style", "fill:red;content:\"<\"");
        let xml = tree.to_xml().unwrap();
        assert!(xml.contains(r#"inkscape:label="a&#10;b""#));
        assert!(xml.contains(r#"title="x &lt; y""#));
        assert!(xml.contains(r#"style="fill:red;content:&quot;&lt;&quot;""#));

        let reparsed = SvgTree::parse(&xml).unwrap();
        let (id, _) = reparsed.elements().find(|(_, e)| e.local_name() == "g").unwrap();
        assert_eq!(reparsed.element(id).unwrap().attribute("inkscape:label"), Some("a\nb"));
        assert_eq!(reparsed.element(id).unwrap().attribute("style"), Some("fill:red;content:\"<\""));
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        let err = SvgTree::parse("<svg><g></svg>").unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");

        let err = SvgTree::parse("<svg><g>").unwrap_err();
        assert!(err.to_string().contains("unclosed"));

        let err = SvgTree::parse("just text").unwrap_err();
        assert!(err.to_string().contains("no root element"));
    }

    #[test]
    fn test_second_root_is_parse_error() {
        let err = SvgTree::parse("<svg/><svg/>").unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }

    #[test]
    fn test_style_display_reads_last_declaration() {
        assert_eq!(style_display("fill:red;display:none"), Some("none"));
        assert_eq!(style_display("display:inline; DISPLAY : none "), Some("none"));
        assert_eq!(style_display("fill:red"), None);
        assert_eq!(style_display(""), None);
    }

    #[test]
    fn test_set_style_display() {
        assert_eq!(set_style_display("fill:red;display:none", "inline"), "fill:red;display:inline");
        assert_eq!(set_style_display("fill:red;", "none"), "fill:red;display:none");
        assert_eq!(set_style_display("", "none"), "display:none");
        assert_eq!(
            set_style_display("display:none;opacity:1;display:inline", "inline"),
            "display:inline;opacity:1"
        );
    }
}
