//! Override points of the dispatch pipeline.
//!
//! Every method has a default. The three terminal handlers raise by
//! default; returning `Ok(())` from one of them is the only way to recover
//! locally, in which case the caller receives the [`Response`] as is.

use crate::document::XmlDocument;
use crate::envelope::Envelope;
use crate::error::{Result, SoapError};
use crate::fault::Fault;
use crate::response::Response;
use crate::transport::TransportOptions;
use std::collections::BTreeMap;

/// Message returned by the default missing-document handler.
pub const MISSING_DOCUMENT_MESSAGE: &str = "The response is not a valid SOAP envelope";

/// Customization hooks, injected into a [`crate::SoapService`].
pub trait ServiceHooks: Send + Sync {
    /// A request envelope was created, before the caller fills the action.
    /// Typical use: common namespaces and authentication headers.
    fn on_create_document(&self, _envelope: &mut Envelope) {}

    /// About to send. Side effects only (logging, metrics).
    fn on_before_dispatch(&self, _envelope: &Envelope) {}

    /// The HTTP client for this call is about to be built.
    fn on_after_create_http_client(&self, _options: &mut TransportOptions) {}

    /// A valid, fault-free document came back.
    /// Typical use: register namespaces for later queries.
    fn on_response_document(&self, _document: &mut XmlDocument) {}

    /// Status was 300 or above and the body held no fault.
    fn on_http_error(&self, status: u16, body: &[u8]) -> Result<()> {
        Err(SoapError::Http {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }

    /// The body held a SOAP Fault.
    fn on_fault(&self, fault: &Fault) -> Result<()> {
        Err(SoapError::Fault(fault.clone()))
    }

    /// The body could not be parsed at all.
    fn on_missing_document(&self, _response: &Response) -> Result<()> {
        Err(SoapError::Protocol(MISSING_DOCUMENT_MESSAGE.to_string()))
    }
}

/// All defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl ServiceHooks for DefaultHooks {}

/// Declares a fixed set of namespace aliases on every request envelope and
/// registers them on every response document.
#[derive(Debug, Clone, Default)]
pub struct NamespaceHooks {
    namespaces: BTreeMap<String, String>,
}

impl NamespaceHooks {
    pub fn new(namespaces: BTreeMap<String, String>) -> Self {
        Self { namespaces }
    }

    pub fn with(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }
}

impl ServiceHooks for NamespaceHooks {
    fn on_create_document(&self, envelope: &mut Envelope) {
        for (prefix, uri) in &self.namespaces {
            envelope.alias(prefix.as_str(), uri.as_str());
        }
    }

    fn on_response_document(&self, document: &mut XmlDocument) {
        for (prefix, uri) in &self.namespaces {
            document.register_namespace(prefix.as_str(), uri.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SOAP_11_NS;
    use crate::document::{DocumentDriver, XmlTreeDriver};

    #[test]
    fn test_default_terminal_handlers_raise() {
        let hooks = DefaultHooks;

        let err = hooks.on_http_error(503, b"busy").unwrap_err();
        assert!(matches!(err, SoapError::Http { status: 503, ref body } if body == "busy"));

        let fault = Fault::new("soap:Server", "down", Vec::new());
        let err = hooks.on_fault(&fault).unwrap_err();
        assert_eq!(err.as_fault(), Some(&fault));
    }

    #[test]
    fn test_namespace_hooks() {
        let hooks = NamespaceHooks::default().with("ns", "urn:example");

        let mut envelope = Envelope::new(SOAP_11_NS);
        hooks.on_create_document(&mut envelope);
        assert!(envelope.to_xml().unwrap().contains("xmlns:ns=\"urn:example\""));

        let mut document = XmlTreeDriver.parse(b"<ns:A xmlns:ns=\"urn:example\"/>").unwrap();
        hooks.on_response_document(&mut document);
        assert_eq!(document.select("/ns:A").unwrap().len(), 1);
    }
}
