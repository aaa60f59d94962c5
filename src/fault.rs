//! SOAP Fault values and their extraction from response documents.

use crate::document::{concat_text, XmlNode};
use crate::error::{Result, SoapError};
use std::fmt;
use xmltree::Element;

/// A SOAP Fault returned by the service.
///
/// Immutable once extracted; raised as [`SoapError::Fault`] by default.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    code: String,
    reason: String,
    details: Vec<Element>,
}

impl Fault {
    pub fn new(code: impl Into<String>, reason: impl Into<String>, details: Vec<Element>) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
            details,
        }
    }

    /// Fault code (`Code/Value` in SOAP 1.2, `faultcode` in SOAP 1.1).
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Human-readable reason (`Reason/Text[1]` or `faultstring`).
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Application-defined children of `detail`, in document order.
    pub fn details(&self) -> &[Element] {
        &self.details
    }

    /// Extract a fault from its `Fault` element.
    ///
    /// The SOAP 1.2 shape is tried first in `namespace`, then the
    /// unqualified SOAP 1.1 shape. Without a namespace there is no way to
    /// try the 1.2 shape, so that is a configuration error.
    pub fn from_element(fault: &Element, namespace: Option<&str>) -> Result<Self> {
        let namespace = namespace
            .ok_or_else(|| SoapError::Config("Missing option namespace".to_string()))?;
        let ns = [("env", namespace)];
        let node = XmlNode::Element(fault);
        let text = |expr: &str| -> Result<String> {
            Ok(concat_text(&node.xpath(expr, &ns)?).trim().to_string())
        };

        let mut code = text("./env:Code/env:Value/text()")?;
        if code.is_empty() {
            code = text("./faultcode/text()")?;
        }

        let mut reason = text("./env:Reason/env:Text[1]/text()")?;
        if reason.is_empty() {
            reason = text("./faultstring/text()")?;
        }

        let details = node
            .xpath("./detail/*", &ns)?
            .iter()
            .filter_map(XmlNode::as_element)
            .cloned()
            .collect();

        Ok(Self::new(code, reason, details))
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SOAP Fault {{ code: '{}', reason: '{}' }}",
            self.code, self.reason
        )
    }
}

impl std::error::Error for Fault {}
