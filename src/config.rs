//! Configuration types for the SOAP client.

use crate::error::{Result, SoapError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// SOAP 1.1 envelope namespace.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// SOAP 1.2 envelope namespace.
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// SOAP protocol versions, keyed by their configuration number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SoapVersion {
    /// SOAP 1.1 (`1`)
    Soap11,
    /// SOAP 1.2 (`2`)
    Soap12,
}

impl SoapVersion {
    /// Envelope namespace URI for this version.
    pub fn envelope_namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => SOAP_11_NS,
            Self::Soap12 => SOAP_12_NS,
        }
    }

    /// Media type sent in the request `Content-Type` header.
    pub fn request_content_type(&self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml",
            Self::Soap12 => "application/soap+xml",
        }
    }

    /// Configuration number of this version.
    pub fn number(&self) -> u8 {
        match self {
            Self::Soap11 => 1,
            Self::Soap12 => 2,
        }
    }
}

impl TryFrom<u8> for SoapVersion {
    type Error = SoapError;

    fn try_from(version: u8) -> Result<Self> {
        match version {
            1 => Ok(Self::Soap11),
            2 => Ok(Self::Soap12),
            other => Err(SoapError::Config(format!(
                "Unknown protocol version '{}'",
                other
            ))),
        }
    }
}

impl From<SoapVersion> for u8 {
    fn from(version: SoapVersion) -> Self {
        version.number()
    }
}

/// Envelope namespace for a raw version number.
pub fn envelope_namespace_for(version: u8) -> Result<&'static str> {
    SoapVersion::try_from(version).map(|v| v.envelope_namespace())
}

/// Static binding of a service: protocol version and target URI.
///
/// Built once per service and shared read-only by every dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    version: SoapVersion,
    uri: String,
}

impl EndpointConfig {
    /// Validate a raw `(version, uri)` pair.
    pub fn configure(version: u8, uri: impl Into<String>) -> Result<Self> {
        let version = SoapVersion::try_from(version)?;
        Self::new(version, uri)
    }

    /// Create an endpoint for an already-typed version.
    pub fn new(version: SoapVersion, uri: impl Into<String>) -> Result<Self> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            return Err(SoapError::Config("Missing option uri".to_string()));
        }
        url::Url::parse(&uri)
            .map_err(|e| SoapError::Config(format!("Invalid uri '{}': {}", uri, e)))?;
        Ok(Self { version, uri })
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Envelope namespace URI for the configured version.
    pub fn envelope_namespace(&self) -> &'static str {
        self.version.envelope_namespace()
    }

    /// `"text/xml"` for SOAP 1.1, `"application/soap+xml"` for SOAP 1.2.
    pub fn request_content_type(&self) -> &'static str {
        self.version.request_content_type()
    }
}

/// Explicit `method name -> action name` table for the legacy call style.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodMap(BTreeMap<String, String>);

impl MethodMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) mappings.
    pub fn map_method(&mut self, method: impl Into<String>, action: impl Into<String>) {
        self.0.insert(method.into(), action.into());
    }

    /// Action registered for `method`.
    pub fn get(&self, method: &str) -> Option<&str> {
        self.0.get(method).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<M: Into<String>, A: Into<String>> FromIterator<(M, A)> for MethodMap {
    fn from_iter<I: IntoIterator<Item = (M, A)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(m, a)| (m.into(), a.into()))
                .collect(),
        )
    }
}

/// Client configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service endpoint
    pub endpoint: EndpointSection,

    /// HTTP transport settings
    pub transport: TransportConfig,

    /// Namespace aliases declared on requests and registered on responses
    pub namespaces: BTreeMap<String, String>,

    /// Legacy method mapping table
    pub methods: MethodMap,

    /// Default SOAPAction policy: "auto", "none" or a literal value
    pub soap_action: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointSection::default(),
            transport: TransportConfig::default(),
            namespaces: BTreeMap::new(),
            methods: MethodMap::default(),
            soap_action: "auto".to_string(),
        }
    }
}

impl ClientConfig {
    /// Parse a YAML configuration document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| SoapError::Config(format!("Invalid configuration: {}", e)))
    }

    /// Validated endpoint binding.
    pub fn endpoint_config(&self) -> Result<EndpointConfig> {
        let uri = self
            .endpoint
            .uri
            .clone()
            .ok_or_else(|| SoapError::Config("Missing option uri".to_string()))?;
        EndpointConfig::configure(self.endpoint.version, uri)
    }
}

/// Raw endpoint section; validated by [`ClientConfig::endpoint_config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSection {
    /// Protocol version number (1 or 2)
    pub version: u8,

    /// Target URI
    pub uri: Option<String>,
}

impl Default for EndpointSection {
    fn default() -> Self {
        Self {
            version: 1,
            uri: None,
        }
    }
}

/// HTTP transport settings handed to the transport driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Whole-request timeout in seconds (0 disables it)
    pub timeout_secs: u64,

    /// User-Agent header value
    pub user_agent: Option<String>,

    /// Largest response body accepted, in bytes (unset means no limit)
    pub max_response_bytes: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: None,
            max_response_bytes: None,
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}
