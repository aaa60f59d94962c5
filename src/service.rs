//! The dispatch pipeline.
//!
//! `invoke` builds the envelope, runs the document hooks, sends it through
//! the transport and classifies the answer. Classification order is fixed:
//! fault, then HTTP status, then document presence.

use crate::config::{EndpointConfig, MethodMap};
use crate::document::{pretty_format_envelope, DocumentDriver, XmlTreeDriver};
use crate::envelope::{Element, Envelope};
use crate::error::{Result, SoapError};
use crate::hooks::{DefaultHooks, ServiceHooks};
use crate::response::Response;
use crate::transport::{HttpRequest, Transport, TransportOptions};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn, Level};

/// How the `SOAPAction` HTTP header is produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SoapAction {
    /// Derived from the action name, namespace prefix stripped
    #[default]
    Auto,
    /// No header at all
    None,
    /// This exact value
    Explicit(String),
}

impl SoapAction {
    pub fn explicit(value: impl Into<String>) -> Self {
        Self::Explicit(value.into())
    }

    /// Header value for `action`, or `None` to omit the header.
    pub fn resolve(&self, action: &str) -> Option<String> {
        match self {
            Self::Auto => Some(
                match action.rsplit_once(':') {
                    Some((prefix, local)) if !prefix.is_empty() => local,
                    _ => action,
                }
                .to_string(),
            ),
            Self::None => None,
            Self::Explicit(value) => Some(value.clone()),
        }
    }
}

impl FromStr for SoapAction {
    type Err = Infallible;

    /// `"auto"`, `"none"`, or anything else as a literal value.
    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match value {
            "auto" => Self::Auto,
            "none" => Self::None,
            other => Self::Explicit(other.to_string()),
        })
    }
}

/// A SOAP service client.
///
/// Holds only read-only state, so one instance can serve concurrent calls;
/// each call owns its envelope and response.
pub struct SoapService {
    endpoint: Arc<EndpointConfig>,
    transport: Arc<dyn Transport>,
    driver: Arc<dyn DocumentDriver>,
    hooks: Arc<dyn ServiceHooks>,
    transport_options: TransportOptions,
    methods: MethodMap,
}

impl SoapService {
    /// Create a service with the default document driver and hooks.
    pub fn new(endpoint: impl Into<Arc<EndpointConfig>>, transport: impl Transport + 'static) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport: Arc::new(transport),
            driver: Arc::new(XmlTreeDriver),
            hooks: Arc::new(DefaultHooks),
            transport_options: TransportOptions::default(),
            methods: MethodMap::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: impl ServiceHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_document_driver(mut self, driver: impl DocumentDriver + 'static) -> Self {
        self.driver = Arc::new(driver);
        self
    }

    pub fn with_transport_options(mut self, options: TransportOptions) -> Self {
        self.transport_options = options;
        self
    }

    pub fn with_methods(mut self, methods: MethodMap) -> Self {
        self.methods = methods;
        self
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    pub fn methods(&self) -> &MethodMap {
        &self.methods
    }

    /// Invoke `action` with an empty action element.
    ///
    /// A `None` action is a deliberate no-op: nothing is sent and
    /// `Ok(None)` is returned.
    pub fn invoke(&self, action: Option<&str>, soap_action: &SoapAction) -> Result<Option<Response>> {
        self.invoke_inner(action, soap_action, None::<fn(&mut Element)>)
    }

    /// Invoke `action`, letting `fill` populate the action element.
    pub fn invoke_with<F>(
        &self,
        action: Option<&str>,
        soap_action: &SoapAction,
        fill: F,
    ) -> Result<Option<Response>>
    where
        F: FnOnce(&mut Element),
    {
        self.invoke_inner(action, soap_action, Some(fill))
    }

    /// Invoke the action mapped to `method` in the method table.
    pub fn call(&self, method: &str, soap_action: &SoapAction) -> Result<Option<Response>> {
        let action = self.mapped_action(method)?;
        self.invoke(Some(action), soap_action)
    }

    /// [`SoapService::call`] with an action-element filler.
    pub fn call_with<F>(&self, method: &str, soap_action: &SoapAction, fill: F) -> Result<Option<Response>>
    where
        F: FnOnce(&mut Element),
    {
        let action = self.mapped_action(method)?;
        self.invoke_with(Some(action), soap_action, fill)
    }

    fn mapped_action(&self, method: &str) -> Result<&str> {
        self.methods
            .get(method)
            .ok_or_else(|| SoapError::UnknownMethod(method.to_string()))
    }

    fn invoke_inner<F>(
        &self,
        action: Option<&str>,
        soap_action: &SoapAction,
        fill: Option<F>,
    ) -> Result<Option<Response>>
    where
        F: FnOnce(&mut Element),
    {
        let Some(action) = action else {
            debug!("No action given, skipping dispatch");
            return Ok(None);
        };
        let header = soap_action.resolve(action);

        let mut envelope = Envelope::new(self.endpoint.envelope_namespace());
        envelope.body_mut().add(action);
        self.hooks.on_create_document(&mut envelope);

        if let Some(fill) = fill {
            let element = envelope.body_mut().child_mut(action).ok_or_else(|| {
                SoapError::Protocol(format!("Action element '{}' missing from Body", action))
            })?;
            fill(element);
        }

        self.dispatch(&envelope, header.as_deref()).map(Some)
    }

    /// Build an envelope for the configured version, run the document hook,
    /// then let `fill` populate the Body.
    pub fn make_envelope(&self, fill: impl FnOnce(&mut Element)) -> Envelope {
        let mut envelope = Envelope::new(self.endpoint.envelope_namespace());
        self.hooks.on_create_document(&mut envelope);
        fill(envelope.body_mut());
        envelope
    }

    /// Send `envelope` and classify the response.
    ///
    /// `soap_action` is the literal header value; `None` omits the header.
    pub fn dispatch(&self, envelope: &Envelope, soap_action: Option<&str>) -> Result<Response> {
        self.hooks.on_before_dispatch(envelope);

        let mut headers = BTreeMap::new();
        headers.insert(
            "Content-Type".to_string(),
            format!("{};charset=UTF-8", self.endpoint.request_content_type()),
        );
        if let Some(value) = soap_action {
            headers.insert("SOAPAction".to_string(), value.to_string());
        }

        let body = envelope.to_xml()?;
        debug!(
            uri = %self.endpoint.uri(),
            headers = ?headers,
            body = %body,
            "Sending SOAP request"
        );

        let mut options = self.transport_options.clone();
        self.hooks.on_after_create_http_client(&mut options);

        let raw = self.transport.send(&HttpRequest {
            uri: self.endpoint.uri(),
            body: body.as_bytes(),
            headers: &headers,
            options: &options,
        })?;

        if tracing::enabled!(Level::DEBUG) {
            debug!(
                status = raw.status,
                content_type = ?raw.content_type,
                body = %pretty_format_envelope(&raw.body, self.driver.as_ref()),
                "Received SOAP response"
            );
        }

        let mut response = Response::new(raw, self.endpoint.envelope_namespace(), self.driver.clone());

        if let Some(fault) = response.fault() {
            warn!(
                status = response.status(),
                code = %fault.code(),
                reason = %fault.reason(),
                "SOAP fault received"
            );
            self.hooks.on_fault(fault)?;
            return Ok(response);
        }

        if response.status() >= 300 {
            warn!(status = response.status(), "HTTP error response");
            self.hooks.on_http_error(response.status(), response.body())?;
            return Ok(response);
        }

        if !response.has_document() {
            warn!(
                status = response.status(),
                content_type = ?response.content_type(),
                "Response is not a valid SOAP envelope"
            );
            self.hooks.on_missing_document(&response)?;
            return Ok(response);
        }

        if let Some(document) = response.document_mut() {
            self.hooks.on_response_document(document);
        }
        Ok(response)
    }
}
