//! SOAP client for Zentinel services
//!
//! Builds SOAP 1.1/1.2 envelopes, posts them over HTTP and classifies the
//! answer as a document, a SOAP Fault or an HTTP-level error.
//!
//! # Features
//!
//! - Envelope builder with namespace aliases and lookup by local name
//! - Pluggable HTTP transport (blocking `ureq` driver by default)
//! - Pluggable document parser (`xmltree` driver by default) with a
//!   namespace-aware location-path query API
//! - Fault extraction for both SOAP 1.1 and SOAP 1.2 shapes
//! - Hooks for every pipeline stage, with raising defaults for errors
//!
//! # Example
//!
//! ```ignore
//! use zentinel_soap_client::{EndpointConfig, SoapAction, SoapService, UreqTransport};
//!
//! let endpoint = EndpointConfig::configure(2, "http://example.org/stock")?;
//! let service = SoapService::new(endpoint, UreqTransport::new());
//! let response = service.invoke_with(Some("GetPrice"), &SoapAction::Auto, |action| {
//!     action.add_value("Item", "Apples");
//! })?;
//! ```

pub mod config;
pub mod document;
pub mod envelope;
pub mod error;
pub mod fault;
pub mod hooks;
pub mod response;
pub mod service;
pub mod transport;
mod xpath;

pub use config::{ClientConfig, EndpointConfig, MethodMap, SoapVersion};
pub use document::{DocumentDriver, XmlDocument, XmlNode, XmlTreeDriver};
pub use envelope::{Element, Envelope};
pub use error::{ErrorKind, Result, SoapError};
pub use fault::Fault;
pub use hooks::{DefaultHooks, NamespaceHooks, ServiceHooks};
pub use response::Response;
pub use service::{SoapAction, SoapService};
pub use transport::{HttpRequest, RawResponse, Transport, TransportOptions, UreqTransport};
