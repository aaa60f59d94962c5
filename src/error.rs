//! Error types for the SOAP client.

use crate::fault::Fault;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SoapError>;

/// SOAP client errors.
#[derive(Error, Debug)]
pub enum SoapError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("XML parsing error: {0}")]
    Parse(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("HTTP error {status}")]
    Http { status: u16, body: String },

    #[error("{0}")]
    Fault(Fault),

    #[error("XPath error: {0}")]
    XPath(String),

    #[error("XML write error: {0}")]
    Xml(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),
}

/// Coarse error category, used for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Transport,
    Parse,
    Protocol,
    Http,
    Fault,
    XPath,
    Xml,
    UnknownMethod,
}

impl ErrorKind {
    /// Get the string code for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "CONFIG_ERROR",
            Self::Transport => "TRANSPORT_ERROR",
            Self::Parse => "PARSE_ERROR",
            Self::Protocol => "PROTOCOL_ERROR",
            Self::Http => "HTTP_ERROR",
            Self::Fault => "SOAP_FAULT",
            Self::XPath => "XPATH_ERROR",
            Self::Xml => "XML_WRITE_ERROR",
            Self::UnknownMethod => "UNKNOWN_METHOD",
        }
    }
}

impl SoapError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Http { .. } => ErrorKind::Http,
            Self::Fault(_) => ErrorKind::Fault,
            Self::XPath(_) => ErrorKind::XPath,
            Self::Xml(_) => ErrorKind::Xml,
            Self::UnknownMethod(_) => ErrorKind::UnknownMethod,
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Only connection-level transport failures qualify. The client never
    /// retries on its own; a hook or the caller decides.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// The fault carried by this error, if any.
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<Fault> for SoapError {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}
