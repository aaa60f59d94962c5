//! Integration tests for the zentinel-soap-client crate.
//!
//! These tests drive the public API end-to-end through a stub transport,
//! combining envelope building, dispatch, classification and hooks.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zentinel_soap_client::config::{SOAP_11_NS, SOAP_12_NS};
use zentinel_soap_client::document::concat_text;
use zentinel_soap_client::hooks::MISSING_DOCUMENT_MESSAGE;
use zentinel_soap_client::{
    DocumentDriver, EndpointConfig, Envelope, Fault, HttpRequest, NamespaceHooks, RawResponse,
    Response, Result, ServiceHooks, SoapAction, SoapError, SoapService, Transport,
    TransportOptions, XmlDocument, XmlTreeDriver,
};

// ============================================================================
// Helpers: stub transport and counting driver
// ============================================================================

#[derive(Debug, Clone)]
struct SentRequest {
    uri: String,
    body: String,
    headers: BTreeMap<String, String>,
    options: TransportOptions,
}

#[derive(Clone)]
struct StubTransport {
    inner: Arc<StubState>,
}

struct StubState {
    status: u16,
    body: String,
    sent: Mutex<Vec<SentRequest>>,
}

impl StubTransport {
    fn new(status: u16, body: &str) -> Self {
        Self {
            inner: Arc::new(StubState {
                status,
                body: body.to_string(),
                sent: Mutex::new(Vec::new()),
            }),
        }
    }

    fn sent(&self) -> Vec<SentRequest> {
        self.inner.sent.lock().unwrap().clone()
    }

    fn last(&self) -> SentRequest {
        self.sent().pop().expect("no request sent")
    }
}

impl Transport for StubTransport {
    fn send(&self, request: &HttpRequest<'_>) -> Result<RawResponse> {
        self.inner.sent.lock().unwrap().push(SentRequest {
            uri: request.uri.to_string(),
            body: String::from_utf8_lossy(request.body).into_owned(),
            headers: request.headers.clone(),
            options: request.options.clone(),
        });
        Ok(RawResponse {
            status: self.inner.status,
            body: self.inner.body.clone().into_bytes(),
            content_type: Some("text/xml; charset=utf-8".to_string()),
        })
    }
}

struct FailingTransport;

impl Transport for FailingTransport {
    fn send(&self, request: &HttpRequest<'_>) -> Result<RawResponse> {
        Err(SoapError::Transport(format!("connection refused: {}", request.uri)))
    }
}

#[derive(Clone, Default)]
struct CountingDriver {
    calls: Arc<AtomicUsize>,
}

impl DocumentDriver for CountingDriver {
    fn parse(&self, bytes: &[u8]) -> Result<XmlDocument> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        XmlTreeDriver.parse(bytes)
    }
}

fn service(version: u8, stub: &StubTransport) -> SoapService {
    let endpoint = EndpointConfig::configure(version, "http://x/svc").unwrap();
    SoapService::new(endpoint, stub.clone())
}

fn soap_11_fault() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{}">
  <soap:Body>
    <soap:Fault>
      <faultcode>soap:Client</faultcode>
      <faultstring>Unknown account</faultstring>
      <detail>
        <acct:Error xmlns:acct="urn:accounts">A-17</acct:Error>
      </detail>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        SOAP_11_NS
    )
}

fn soap_12_fault() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{}">
  <soap:Body>
    <soap:Fault>
      <soap:Code>
        <soap:Value>soap:Client</soap:Value>
      </soap:Code>
      <soap:Reason>
        <soap:Text xml:lang="en">Unknown account</soap:Text>
      </soap:Reason>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        SOAP_12_NS
    )
}

fn get_foo_response() -> String {
    format!(
        r#"<env:Envelope xmlns:env="{}"><env:Body><GetFooResponse>42</GetFooResponse></env:Body></env:Envelope>"#,
        SOAP_12_NS
    )
}

// ============================================================================
// End-to-end: success path
// ============================================================================

#[test]
fn test_e2e_get_foo_soap_12() {
    let stub = StubTransport::new(200, &get_foo_response());
    let service = service(2, &stub);

    let response = service
        .invoke(Some("GetFoo"), &SoapAction::Auto)
        .unwrap()
        .expect("action given, response expected");

    assert_eq!(response.status(), 200);
    assert!(response.has_document());
    assert!(!response.has_fault());
    let document = response.document().unwrap();
    let text = document
        .text_at("/env:Envelope/env:Body/GetFooResponse", &[("env", SOAP_12_NS)])
        .unwrap();
    assert_eq!(text, "42");

    let sent = stub.last();
    assert_eq!(sent.uri, "http://x/svc");
    assert_eq!(sent.headers["Content-Type"], "application/soap+xml;charset=UTF-8");
    assert_eq!(sent.headers["SOAPAction"], "GetFoo");
}

#[test]
fn test_envelope_round_trip_through_parser() {
    let envelope = Envelope::build(SOAP_11_NS, |body| {
        body.add("Foo")
            .add_value("Name", "Tom & Jerry")
            .add_with("Address", |address| {
                address.add_value("City", "Paris").set_attr("kind", "home");
            });
    });
    let xml = envelope.to_xml().unwrap();

    let document = XmlTreeDriver.parse(xml.as_bytes()).unwrap();
    let ns = [("env", SOAP_11_NS)];
    let foo = document.xpath("/env:Envelope/env:Body/Foo", &ns).unwrap();
    assert_eq!(foo.len(), 1);
    let name = foo[0].xpath("./Name/text()", &ns).unwrap();
    assert_eq!(concat_text(&name), "Tom & Jerry");
    let city = foo[0].xpath("./Address/City", &ns).unwrap();
    assert_eq!(concat_text(&city), "Paris");
    let address = foo[0].xpath("./Address", &ns).unwrap()[0].as_element().unwrap();
    assert_eq!(address.attributes.get("kind").map(String::as_str), Some("home"));
    assert!(document.xpath("/env:Envelope/env:Header", &ns).unwrap().len() == 1);
}

// ============================================================================
// SOAPAction header derivation
// ============================================================================

#[test]
fn test_soap_action_auto_strips_prefix() {
    let stub = StubTransport::new(200, &get_foo_response());
    let service = service(2, &stub).with_hooks(NamespaceHooks::default().with("ns", "urn:work"));

    service.invoke(Some("ns:DoWork"), &SoapAction::Auto).unwrap();
    assert_eq!(stub.last().headers["SOAPAction"], "DoWork");

    service.invoke(Some("DoWork"), &SoapAction::Auto).unwrap();
    assert_eq!(stub.last().headers["SOAPAction"], "DoWork");
}

#[test]
fn test_soap_action_none_omits_header() {
    let stub = StubTransport::new(200, &get_foo_response());
    service(2, &stub)
        .invoke(Some("ns:DoWork"), &SoapAction::None)
        .unwrap();
    let sent = stub.last();
    assert!(!sent.headers.contains_key("SOAPAction"));
    assert!(sent.headers.contains_key("Content-Type"));
}

#[test]
fn test_soap_action_explicit() {
    let stub = StubTransport::new(200, &get_foo_response());
    service(2, &stub)
        .invoke(Some("ns:DoWork"), &SoapAction::explicit("urn:work#DoWork"))
        .unwrap();
    assert_eq!(stub.last().headers["SOAPAction"], "urn:work#DoWork");
}

#[test]
fn test_absent_action_sends_nothing() {
    let stub = StubTransport::new(200, &get_foo_response());
    let service = service(2, &stub);
    assert!(service.invoke(None, &SoapAction::Auto).unwrap().is_none());
    assert!(service
        .invoke_with(None, &SoapAction::Auto, |_| panic!("filler must not run"))
        .unwrap()
        .is_none());
    assert!(stub.sent().is_empty());
}

// ============================================================================
// Classification order
// ============================================================================

#[test]
fn test_fault_with_200_status_is_fault_not_http_error() {
    let stub = StubTransport::new(200, &soap_11_fault());
    let err = service(1, &stub)
        .invoke(Some("GetAccount"), &SoapAction::Auto)
        .unwrap_err();
    let fault = err.as_fault().expect("fault expected");
    assert_eq!(fault.code(), "soap:Client");
    assert_eq!(fault.reason(), "Unknown account");
    assert_eq!(fault.details().len(), 1);
    assert_eq!(fault.details()[0].name, "Error");
}

#[test]
fn test_fault_with_500_status_is_still_fault() {
    let stub = StubTransport::new(500, &soap_12_fault());
    let err = service(2, &stub)
        .invoke(Some("GetAccount"), &SoapAction::Auto)
        .unwrap_err();
    assert!(matches!(err, SoapError::Fault(_)));
}

#[test]
fn test_fault_shapes_extract_the_same_fields() {
    let v11 = service(1, &StubTransport::new(500, &soap_11_fault()))
        .invoke(Some("GetAccount"), &SoapAction::Auto)
        .unwrap_err();
    let v12 = service(2, &StubTransport::new(500, &soap_12_fault()))
        .invoke(Some("GetAccount"), &SoapAction::Auto)
        .unwrap_err();
    let (v11, v12) = (v11.as_fault().unwrap(), v12.as_fault().unwrap());
    assert_eq!(v11.code(), v12.code());
    assert_eq!(v11.reason(), v12.reason());
}

#[test]
fn test_http_error_with_non_fault_document() {
    let body = format!(
        r#"<env:Envelope xmlns:env="{}"><env:Body><Busy/></env:Body></env:Envelope>"#,
        SOAP_12_NS
    );
    let stub = StubTransport::new(503, &body);
    let err = service(2, &stub)
        .invoke(Some("GetFoo"), &SoapAction::Auto)
        .unwrap_err();
    match err {
        SoapError::Http { status, body } => {
            assert_eq!(status, 503);
            assert!(body.contains("<Busy/>"));
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }
}

#[test]
fn test_http_error_takes_precedence_over_missing_document() {
    let stub = StubTransport::new(502, "<html><body>Bad Gateway</html>");
    let err = service(1, &stub)
        .invoke(Some("GetFoo"), &SoapAction::Auto)
        .unwrap_err();
    assert!(matches!(err, SoapError::Http { status: 502, .. }));
}

#[test]
fn test_missing_document_is_protocol_error() {
    for body in ["", "<html><body>oops</html>", "Service Unavailable"] {
        let stub = StubTransport::new(200, body);
        let err = service(1, &stub)
            .invoke(Some("GetFoo"), &SoapAction::Auto)
            .unwrap_err();
        match err {
            SoapError::Protocol(message) => assert_eq!(message, MISSING_DOCUMENT_MESSAGE),
            other => panic!("expected protocol error for {:?}, got {:?}", body, other),
        }
    }
}

#[test]
fn test_transport_error_is_surfaced() {
    let endpoint = EndpointConfig::configure(1, "http://x/svc").unwrap();
    let service = SoapService::new(endpoint, FailingTransport);
    let err = service.invoke(Some("GetFoo"), &SoapAction::Auto).unwrap_err();
    assert!(matches!(err, SoapError::Transport(_)));
    assert!(err.is_retryable());
}

// ============================================================================
// Hooks
// ============================================================================

#[derive(Clone, Default)]
struct RecordingHooks {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingHooks {
    fn record(&self, event: &str) {
        self.events.lock().unwrap().push(event.to_string());
    }
}

impl ServiceHooks for RecordingHooks {
    fn on_create_document(&self, envelope: &mut Envelope) {
        self.record("create_document");
        envelope.alias("auth", "urn:auth");
        envelope.header_mut().add("auth:Token").set_value("secret");
    }

    fn on_before_dispatch(&self, _envelope: &Envelope) {
        self.record("before_dispatch");
    }

    fn on_after_create_http_client(&self, options: &mut TransportOptions) {
        self.record("after_create_http_client");
        options.timeout = Some(Duration::from_secs(7));
        options
            .extra_headers
            .insert("X-Trace".to_string(), "abc".to_string());
    }

    fn on_response_document(&self, document: &mut XmlDocument) {
        self.record("response_document");
        document.register_namespace("env", SOAP_12_NS);
    }

    fn on_fault(&self, fault: &Fault) -> Result<()> {
        self.record(&format!("fault:{}", fault.code()));
        Ok(())
    }

    fn on_http_error(&self, status: u16, _body: &[u8]) -> Result<()> {
        self.record(&format!("http_error:{}", status));
        Ok(())
    }

    fn on_missing_document(&self, response: &Response) -> Result<()> {
        self.record(&format!("missing_document:{}", response.body_text()));
        Ok(())
    }
}

#[test]
fn test_hooks_run_in_pipeline_order() {
    let hooks = RecordingHooks::default();
    let stub = StubTransport::new(200, &get_foo_response());
    let service = service(2, &stub).with_hooks(hooks.clone());

    let response = service
        .invoke_with(Some("GetFoo"), &SoapAction::Auto, |action| {
            action.add_value("Id", "7");
        })
        .unwrap()
        .unwrap();

    assert_eq!(
        *hooks.events.lock().unwrap(),
        vec![
            "create_document",
            "before_dispatch",
            "after_create_http_client",
            "response_document"
        ]
    );

    let sent = stub.last();
    assert!(sent.body.contains("<auth:Token>secret</auth:Token>"));
    assert!(sent.body.contains("xmlns:auth=\"urn:auth\""));
    assert!(sent.body.contains("<GetFoo><Id>7</Id></GetFoo>"));
    assert_eq!(sent.options.timeout, Some(Duration::from_secs(7)));
    assert_eq!(sent.options.extra_headers["X-Trace"], "abc");

    // Registered by the response-document hook.
    let selected = response
        .document()
        .unwrap()
        .select("/env:Envelope/env:Body/GetFooResponse")
        .unwrap();
    assert_eq!(concat_text(&selected), "42");
}

#[test]
fn test_overridden_fault_hook_recovers() {
    let hooks = RecordingHooks::default();
    let stub = StubTransport::new(500, &soap_11_fault());
    let response = service(1, &stub)
        .with_hooks(hooks.clone())
        .invoke(Some("GetAccount"), &SoapAction::Auto)
        .unwrap()
        .unwrap();

    assert!(response.has_fault());
    assert_eq!(response.fault().unwrap().reason(), "Unknown account");
    let events = hooks.events.lock().unwrap().clone();
    assert_eq!(events.last().map(String::as_str), Some("fault:soap:Client"));
    assert!(!events.iter().any(|e| e.starts_with("http_error")));
}

#[test]
fn test_overridden_http_and_missing_document_hooks() {
    let hooks = RecordingHooks::default();
    let stub = StubTransport::new(404, "not found");
    let response = service(1, &stub)
        .with_hooks(hooks.clone())
        .invoke(Some("GetFoo"), &SoapAction::Auto)
        .unwrap()
        .unwrap();
    assert_eq!(response.status(), 404);
    assert!(!response.has_document());

    let stub = StubTransport::new(200, "not xml");
    service(1, &stub)
        .with_hooks(hooks.clone())
        .invoke(Some("GetFoo"), &SoapAction::Auto)
        .unwrap()
        .unwrap();

    let events = hooks.events.lock().unwrap().clone();
    assert!(events.contains(&"http_error:404".to_string()));
    assert!(events.contains(&"missing_document:not xml".to_string()));
}

// ============================================================================
// Memoization and concurrency
// ============================================================================

#[test]
fn test_response_parses_once() {
    let driver = CountingDriver::default();
    let calls = driver.calls.clone();
    let stub = StubTransport::new(200, &get_foo_response());
    let response = service(2, &stub)
        .with_document_driver(driver)
        .invoke(Some("GetFoo"), &SoapAction::Auto)
        .unwrap()
        .unwrap();

    // The pipeline already classified the response.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let _ = response.document();
    let _ = response.fault();
    let _ = response.document();
    let _ = response.fault();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_dispatch_shares_service() {
    let stub = StubTransport::new(200, &get_foo_response());
    let service = service(2, &stub);

    std::thread::scope(|scope| {
        for i in 0..8 {
            let service = &service;
            scope.spawn(move || {
                let response = service
                    .invoke_with(Some("GetFoo"), &SoapAction::Auto, |action| {
                        action.add_value("Id", i.to_string());
                    })
                    .unwrap()
                    .unwrap();
                assert!(response.has_document());
            });
        }
    });

    let sent = stub.sent();
    assert_eq!(sent.len(), 8);
    for i in 0..8 {
        let needle = format!("<Id>{}</Id>", i);
        assert_eq!(sent.iter().filter(|r| r.body.contains(&needle)).count(), 1);
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_file_drives_service() {
    let yaml = r#"
endpoint:
  version: 2
  uri: "http://x/svc"
namespaces:
  foo: "urn:foo"
methods:
  get_foo: "foo:GetFoo"
"#;
    let config = zentinel_soap_client::ClientConfig::from_yaml(yaml).unwrap();
    let stub = StubTransport::new(200, &get_foo_response());
    let service = SoapService::new(config.endpoint_config().unwrap(), stub.clone())
        .with_hooks(NamespaceHooks::new(config.namespaces.clone()))
        .with_transport_options(TransportOptions::from(&config.transport))
        .with_methods(config.methods.clone());

    service.call("get_foo", &SoapAction::Auto).unwrap().unwrap();
    let sent = stub.last();
    assert!(sent.body.contains("xmlns:foo=\"urn:foo\""));
    assert!(sent.body.contains("<foo:GetFoo/>"));
    assert_eq!(sent.headers["SOAPAction"], "GetFoo");
    assert_eq!(sent.options.timeout, Some(Duration::from_secs(30)));
}

#[test]
fn test_unknown_version_rejected() {
    assert!(matches!(
        EndpointConfig::configure(3, "http://x/svc"),
        Err(SoapError::Config(_))
    ));
}
