//! Response classification: document, fault or neither.
//!
//! Parsing and fault lookup happen lazily, at most once per response.
//! Faults are looked for before the HTTP status is considered, since some
//! stacks send fault bodies with a 2xx status.

use crate::document::{DocumentDriver, XmlDocument};
use crate::fault::Fault;
use crate::transport::RawResponse;
use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

const FAULT_PATH: &str = "/env:Envelope/env:Body/descendant-or-self::env:Fault";

/// A SOAP response, classified on demand.
pub struct Response {
    raw: RawResponse,
    namespace: &'static str,
    driver: Arc<dyn DocumentDriver>,
    document: OnceCell<Option<XmlDocument>>,
    fault: OnceCell<Option<Fault>>,
}

impl Response {
    /// Wrap a raw HTTP response; `namespace` is the active envelope namespace.
    pub fn new(raw: RawResponse, namespace: &'static str, driver: Arc<dyn DocumentDriver>) -> Self {
        Self {
            raw,
            namespace,
            driver,
            document: OnceCell::new(),
            fault: OnceCell::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.raw.status
    }

    pub fn body(&self) -> &[u8] {
        &self.raw.body
    }

    /// Body decoded as UTF-8, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.raw.body).into_owned()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.raw.content_type.as_deref()
    }

    /// Envelope namespace the response is classified against.
    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// The parsed body, or `None` when it is not well-formed XML.
    pub fn document(&self) -> Option<&XmlDocument> {
        self.document
            .get_or_init(|| match self.driver.parse(&self.raw.body) {
                Ok(document) => Some(document),
                Err(e) => {
                    debug!(error = %e, "Response body is not a parseable document");
                    None
                }
            })
            .as_ref()
    }

    pub fn has_document(&self) -> bool {
        self.document().is_some()
    }

    /// The first `Fault` under `Envelope/Body`, if any.
    pub fn fault(&self) -> Option<&Fault> {
        self.fault
            .get_or_init(|| {
                let document = self.document()?;
                let ns = [("env", self.namespace)];
                let nodes = match document.xpath(FAULT_PATH, &ns) {
                    Ok(nodes) => nodes,
                    Err(e) => {
                        warn!(error = %e, "Fault lookup failed");
                        return None;
                    }
                };
                let element = nodes.first()?.as_element()?;
                match Fault::from_element(element, Some(self.namespace)) {
                    Ok(fault) => Some(fault),
                    Err(e) => {
                        warn!(error = %e, "Fault extraction failed");
                        None
                    }
                }
            })
            .as_ref()
    }

    pub fn has_fault(&self) -> bool {
        self.fault().is_some()
    }

    /// Mutable access for the response-document hook.
    pub(crate) fn document_mut(&mut self) -> Option<&mut XmlDocument> {
        self.document();
        self.document.get_mut().and_then(Option::as_mut)
    }

    /// Consume the response, keeping the raw exchange.
    pub fn into_raw(self) -> RawResponse {
        self.raw
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.raw.status)
            .field("content_type", &self.raw.content_type)
            .field("body_len", &self.raw.body.len())
            .field("namespace", &self.namespace)
            .finish()
    }
}
