//! HTTP transport port and the default `ureq` driver.

use crate::config::TransportConfig;
use crate::error::{Result, SoapError};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Per-call client settings, adjustable by the client-creation hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportOptions {
    /// Whole-request timeout
    pub timeout: Option<Duration>,
    /// User-Agent header value
    pub user_agent: Option<String>,
    /// Headers added to every request (SOAP headers win on conflict)
    pub extra_headers: BTreeMap<String, String>,
    /// Response body size limit in bytes; `None` reads the whole body
    pub max_response_bytes: Option<u64>,
}

impl From<&TransportConfig> for TransportOptions {
    fn from(config: &TransportConfig) -> Self {
        Self {
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
            extra_headers: BTreeMap::new(),
            max_response_bytes: config.max_response_bytes,
        }
    }
}

/// An outgoing SOAP POST.
#[derive(Debug, Clone)]
pub struct HttpRequest<'a> {
    pub uri: &'a str,
    pub body: &'a [u8],
    pub headers: &'a BTreeMap<String, String>,
    pub options: &'a TransportOptions,
}

/// The HTTP exchange result, whatever the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// Sends a POST and returns status, body and content type.
///
/// Implementations must report non-2xx statuses as a [`RawResponse`], not
/// as an error: fault bodies often arrive with status 500. Only a failed
/// exchange is a [`SoapError::Transport`].
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest<'_>) -> Result<RawResponse>;
}

/// Blocking transport built on `ureq`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqTransport;

impl UreqTransport {
    pub fn new() -> Self {
        Self
    }

    fn agent(options: &TransportOptions) -> ureq::Agent {
        // Statuses are classified by the pipeline, never by the agent.
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(options.timeout)
            .build();
        config.into()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest<'_>) -> Result<RawResponse> {
        let agent = Self::agent(request.options);

        let mut builder = agent.post(request.uri);
        if let Some(user_agent) = &request.options.user_agent {
            builder = builder.header("User-Agent", user_agent.as_str());
        }
        for (name, value) in &request.options.extra_headers {
            if !request.headers.contains_key(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        for (name, value) in request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder.send(request.body).map_err(|e| {
            SoapError::Transport(format!("POST to {} failed: {}", request.uri, e))
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let limit = request.options.max_response_bytes.unwrap_or(u64::MAX);
        let body = response
            .body_mut()
            .with_config()
            .limit(limit)
            .read_to_vec()
            .map_err(|e| match e {
                // Retrying would hit the same limit.
                ureq::Error::BodyExceedsLimit(limit) => SoapError::Protocol(format!(
                    "Response from {} exceeds the {} byte limit",
                    request.uri, limit
                )),
                e => SoapError::Transport(format!(
                    "Failed to read response from {}: {}",
                    request.uri, e
                )),
            })?;

        debug!(
            uri = %request.uri,
            status = status,
            bytes = body.len(),
            "HTTP exchange complete"
        );

        Ok(RawResponse {
            status,
            body,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one HTTP exchange on loopback, answering 200 with `body`.
    /// Returns the endpoint URI.
    fn serve_once(body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
            }
            let mut request_body = vec![0u8; content_length];
            let _ = reader.read_exact(&mut request_body);

            let mut stream = reader.into_inner();
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            // The client may hang up early when it rejects the body.
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
        });
        format!("http://{}/svc", addr)
    }

    fn post(uri: &str, options: &TransportOptions) -> Result<RawResponse> {
        let headers = BTreeMap::new();
        let request = HttpRequest {
            uri,
            body: b"<x/>",
            headers: &headers,
            options,
        };
        UreqTransport::new().send(&request)
    }

    #[test]
    fn test_options_from_config() {
        let config = TransportConfig {
            timeout_secs: 5,
            user_agent: Some("soap-call/1.0".to_string()),
            max_response_bytes: Some(1024),
        };
        let options = TransportOptions::from(&config);
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.user_agent.as_deref(), Some("soap-call/1.0"));
        assert_eq!(options.max_response_bytes, Some(1024));
        assert!(options.extra_headers.is_empty());
    }

    #[test]
    fn test_large_response_read_without_limit() {
        let mut body = b"<Envelope><Body><Data>".to_vec();
        body.resize(body.len() + 11 * 1024 * 1024, b'A');
        body.extend_from_slice(b"</Data></Body></Envelope>");
        let expected = body.len();

        let uri = serve_once(body);
        let options = TransportOptions {
            timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let response = post(&uri, &options).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.len(), expected);
    }

    #[test]
    fn test_configured_limit_is_not_retryable() {
        let uri = serve_once(vec![b'A'; 4096]);
        let options = TransportOptions {
            timeout: Some(Duration::from_secs(10)),
            max_response_bytes: Some(1024),
            ..Default::default()
        };
        let err = post(&uri, &options).unwrap_err();
        assert!(matches!(err, SoapError::Protocol(_)), "got {:?}", err);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_connection_failure_is_transport_error() {
        let headers = BTreeMap::new();
        let options = TransportOptions {
            timeout: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        let request = HttpRequest {
            // Port 1 on loopback is never listening in test environments.
            uri: "http://127.0.0.1:1/svc",
            body: b"<x/>",
            headers: &headers,
            options: &options,
        };
        let err = UreqTransport::new().send(&request).unwrap_err();
        assert!(matches!(err, SoapError::Transport(_)));
        assert!(err.is_retryable());
    }
}
