//! Parsed response documents and the pluggable parser behind them.
//!
//! The default driver builds an `xmltree` DOM; any other backend only has to
//! produce an [`XmlDocument`] from raw bytes. Parsing never expands external
//! entities.

use crate::error::{Result, SoapError};
use crate::xpath;
use chrono::{DateTime, FixedOffset};
use xmltree::{Element, EmitterConfig, XMLNode};

pub use crate::xpath::XmlNode;

/// Parses raw response bytes into a queryable document.
pub trait DocumentDriver: Send + Sync {
    /// Fails with [`SoapError::Parse`] on malformed input.
    fn parse(&self, bytes: &[u8]) -> Result<XmlDocument>;
}

/// Default driver, backed by `xmltree`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlTreeDriver;

impl DocumentDriver for XmlTreeDriver {
    fn parse(&self, bytes: &[u8]) -> Result<XmlDocument> {
        Element::parse(bytes)
            .map(XmlDocument::new)
            .map_err(|e| SoapError::Parse(e.to_string()))
    }
}

/// A parsed XML document.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    root: Element,
    /// Bindings used by [`XmlDocument::select`]
    namespaces: Vec<(String, String)>,
}

impl XmlDocument {
    pub fn new(root: Element) -> Self {
        Self {
            root,
            namespaces: Vec::new(),
        }
    }

    /// Root element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Evaluate a location path with explicit prefix bindings.
    pub fn xpath(&self, expr: &str, namespaces: &[(&str, &str)]) -> Result<Vec<XmlNode<'_>>> {
        xpath::select(&self.root, &self.root, expr, namespaces)
    }

    /// Bind `prefix` for later [`XmlDocument::select`] calls.
    pub fn register_namespace(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        let prefix = prefix.into();
        let uri = uri.into();
        match self.namespaces.iter_mut().find(|(p, _)| *p == prefix) {
            Some(binding) => binding.1 = uri,
            None => self.namespaces.push((prefix, uri)),
        }
    }

    /// Namespace bound to `prefix` by [`XmlDocument::register_namespace`].
    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// Evaluate a location path using the registered namespaces.
    pub fn select(&self, expr: &str) -> Result<Vec<XmlNode<'_>>> {
        let bindings: Vec<(&str, &str)> = self
            .namespaces
            .iter()
            .map(|(p, u)| (p.as_str(), u.as_str()))
            .collect();
        self.xpath(expr, &bindings)
    }

    /// Text of every selected node, concatenated.
    pub fn text_at(&self, expr: &str, namespaces: &[(&str, &str)]) -> Result<String> {
        Ok(concat_text(&self.xpath(expr, namespaces)?))
    }

    /// Compact serialization of the document.
    pub fn to_text(&self) -> Result<String> {
        self.write(EmitterConfig::new().write_document_declaration(false))
    }

    /// Indented serialization, used for debug output.
    pub fn to_pretty_text(&self) -> Result<String> {
        self.write(
            EmitterConfig::new()
                .write_document_declaration(false)
                .perform_indent(true)
                .indent_string("  "),
        )
    }

    fn write(&self, config: EmitterConfig) -> Result<String> {
        let mut buf = Vec::new();
        self.root
            .write_with_config(&mut buf, config)
            .map_err(|e| SoapError::Xml(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| SoapError::Xml(e.to_string()))
    }
}

impl<'a> XmlNode<'a> {
    pub fn as_element(&self) -> Option<&'a Element> {
        match *self {
            Self::Element(e) => Some(e),
            Self::Text(_) => None,
        }
    }

    /// Evaluate a path relative to this node. Absolute paths are rooted at
    /// this node as well.
    pub fn xpath(&self, expr: &str, namespaces: &[(&str, &str)]) -> Result<Vec<XmlNode<'a>>> {
        match *self {
            Self::Element(e) => xpath::select(e, e, expr, namespaces),
            Self::Text(_) => Ok(Vec::new()),
        }
    }

    /// Text content: the string itself for text nodes, all descendant text
    /// for elements.
    pub fn to_text(&self) -> String {
        match *self {
            Self::Text(t) => t.to_string(),
            Self::Element(e) => {
                let mut out = String::new();
                collect_text(e, &mut out);
                out
            }
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        self.to_text().trim().parse().ok()
    }

    pub fn to_f64(&self) -> Option<f64> {
        self.to_text().trim().parse().ok()
    }

    /// `true` only for the literal text `"true"`.
    pub fn to_bool(&self) -> bool {
        self.to_text().trim() == "true"
    }

    /// ISO-8601 / RFC 3339 timestamp.
    pub fn to_date(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(self.to_text().trim()).ok()
    }
}

/// Concatenated text of a node set.
pub fn concat_text(nodes: &[XmlNode<'_>]) -> String {
    nodes.iter().map(XmlNode::to_text).collect()
}

fn collect_text(element: &Element, out: &mut String) {
    let mut stack: Vec<&XMLNode> = element.children.iter().rev().collect();
    while let Some(node) = stack.pop() {
        match node {
            XMLNode::Text(t) | XMLNode::CData(t) => out.push_str(t),
            XMLNode::Element(e) => stack.extend(e.children.iter().rev()),
            _ => {}
        }
    }
}

/// Re-indent a body that looks like a SOAP envelope, for logging.
///
/// Anything else is returned unchanged.
pub fn pretty_format_envelope(body: &[u8], driver: &dyn DocumentDriver) -> String {
    let text = String::from_utf8_lossy(body);
    let looks_like_envelope = text.lines().any(|line| {
        line.starts_with('<')
            && line
                .find(":Envelope")
                .is_some_and(|pos| pos > 1)
    });
    if !looks_like_envelope {
        return text.into_owned();
    }
    match driver.parse(body).and_then(|doc| doc.to_pretty_text()) {
        Ok(pretty) => pretty,
        Err(e) => format!("Formatting failed: {}", e),
    }
}
