//! Integration tests for the soap-wsdl crate.
//!
//! These tests exercise the public API surface end-to-end: a client and a
//! server built from the same interface model, talking through the loopback
//! transport.

use async_trait::async_trait;
use serde_json::{json, Value};
use soap_wsdl::config::{SoapConfig, WsdlConfig};
use soap_wsdl::envelope::unwrap;
use soap_wsdl::error::{FaultCode, SoapError, SoapFault};
use soap_wsdl::security::{BasicAuthSecurity, BearerSecurity, Security, SecurityChain, WsSecurity};
use soap_wsdl::transport::{header, Headers, TransportOptions};
use soap_wsdl::{
    async_handler_fn, authenticator_fn, handler_fn, Client, InboundRequest, InterfaceModel,
    LoopbackTransport, MimePart, OutboundRequest, Server, ServiceRegistry, Transport,
    TransportResponse,
};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

const HELLO_WSDL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<definitions name="HelloService"
   targetNamespace="http://www.examples.com/wsdl/HelloService.wsdl"
   xmlns="http://schemas.xmlsoap.org/wsdl/"
   xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
   xmlns:tns="http://www.examples.com/wsdl/HelloService.wsdl"
   xmlns:xsd="http://www.w3.org/2001/XMLSchema">
   <message name="SayHelloRequest">
      <part name="firstName" type="xsd:string"/>
   </message>
   <message name="SayHelloResponse">
      <part name="greeting" type="xsd:string"/>
   </message>
   <portType name="Hello_PortType">
      <operation name="sayHello">
         <input message="tns:SayHelloRequest"/>
         <output message="tns:SayHelloResponse"/>
      </operation>
   </portType>
   <binding name="Hello_Binding" type="tns:Hello_PortType">
      <soap:binding style="rpc" transport="http://schemas.xmlsoap.org/soap/http"/>
      <operation name="sayHello">
         <soap:operation soapAction="sayHello"/>
         <input><soap:body use="literal"/></input>
         <output><soap:body use="literal"/></output>
      </operation>
   </binding>
   <service name="Hello_Service">
      <port binding="tns:Hello_Binding" name="Hello_Port">
         <soap:address location="http://localhost:51515/SayHello/"/>
      </port>
   </service>
</definitions>"#;

const STYLE_MIX_WSDL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<definitions targetNamespace="http://tempuri.org/"
   xmlns="http://schemas.xmlsoap.org/wsdl/"
   xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
   xmlns:tns="http://tempuri.org/"
   xmlns:urn="urn:hl7-org:v3"
   xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <types>
    <xs:schema targetNamespace="urn:hl7-org:v3" elementFormDefault="qualified">
      <xs:element name="hl7Message">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="test" type="xs:string" minOccurs="0"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
      <xs:element name="hl7MessageResponse">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="result" type="xs:string" minOccurs="0"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>
  </types>
  <message name="hl7MessageIn"><part name="parameters" element="urn:hl7Message"/></message>
  <message name="hl7MessageOut"><part name="parameters" element="urn:hl7MessageResponse"/></message>
  <portType name="Hl7PortType">
    <operation name="opHl7Message">
      <input message="tns:hl7MessageIn"/>
      <output message="tns:hl7MessageOut"/>
    </operation>
  </portType>
  <binding name="Hl7Binding" type="tns:Hl7PortType">
    <soap:binding style="rpc" transport="http://schemas.xmlsoap.org/soap/http"/>
    <operation name="opHl7Message">
      <soap:operation soapAction="urn:#opHl7Message" style="document"/>
      <input><soap:body use="literal"/></input>
      <output><soap:body use="literal"/></output>
    </operation>
  </binding>
  <service name="HL7Service">
    <port name="Hl7MessageBinding" binding="tns:Hl7Binding">
      <soap:address location="http://localhost:51515/"/>
    </port>
  </service>
</definitions>"#;

// ============================================================================
// Helpers
// ============================================================================

fn load(xml: &str) -> Arc<InterfaceModel> {
    Arc::new(InterfaceModel::parse(xml, &WsdlConfig::default()).expect("WSDL should load"))
}

fn hello_server() -> Arc<Server> {
    let mut registry = ServiceRegistry::new();
    registry.register(
        "Hello_Service",
        "Hello_Port",
        "sayHello",
        handler_fn(|args, _ctx| {
            let name = args["firstName"].as_str().unwrap_or_default();
            Ok(json!({ "greeting": format!("Hello {}", name) }))
        }),
    );
    Arc::new(Server::new(load(HELLO_WSDL), SoapConfig::default(), registry))
}

/// Captures outbound requests and answers with an empty success.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<OutboundRequest>>,
}

#[async_trait]
impl Transport for Recorder {
    async fn send(&self, request: OutboundRequest) -> soap_wsdl::Result<TransportResponse> {
        self.seen.lock().unwrap().push(request);
        Ok(TransportResponse {
            status: 200,
            ..TransportResponse::default()
        })
    }
}

const HL7_REQUEST: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <hl7Message xmlns="urn:hl7-org:v3"><test>ORU^R01</test></hl7Message>
  </soap:Body>
</soap:Envelope>"#;

const HL7_WRAPPED_REQUEST: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <opHl7Message xmlns="http://tempuri.org/"><hl7Message xmlns="urn:hl7-org:v3"><test>ORU^R01</test></hl7Message></opHl7Message>
  </soap:Body>
</soap:Envelope>"#;

// ============================================================================
// End-to-end: client -> loopback -> server
// ============================================================================

#[tokio::test]
async fn test_e2e_say_hello() {
    let server = hello_server();
    let client = Client::new(
        load(HELLO_WSDL),
        SoapConfig::default(),
        Arc::new(LoopbackTransport::new(server.clone())),
    );

    let greeting = client
        .call("sayHello", json!({ "firstName": "Bob" }))
        .await
        .unwrap();
    assert_eq!(greeting, json!({ "greeting": "Hello Bob" }));
    assert_eq!(server.stats().requests_processed, 1);
}

#[tokio::test]
async fn test_e2e_async_handler_does_not_block_others() {
    let release = Arc::new(Notify::new());
    let mut registry = ServiceRegistry::new();
    let gate = release.clone();
    registry.register(
        "Hello_Service",
        "Hello_Port",
        "sayHello",
        async_handler_fn(move |args, _ctx| {
            let gate = gate.clone();
            async move {
                let name = args["firstName"].as_str().unwrap_or_default().to_string();
                if name == "slow" {
                    gate.notified().await;
                }
                Ok(json!({ "greeting": name }))
            }
        }),
    );
    let server = Arc::new(Server::new(load(HELLO_WSDL), SoapConfig::default(), registry));
    let client = Arc::new(Client::new(
        load(HELLO_WSDL),
        SoapConfig::default(),
        Arc::new(LoopbackTransport::new(server)),
    ));

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.call("sayHello", json!({ "firstName": "slow" })).await })
    };
    tokio::task::yield_now().await;

    let fast = client
        .call("sayHello", json!({ "firstName": "fast" }))
        .await
        .unwrap();
    assert_eq!(fast["greeting"], "fast");
    assert!(!slow.is_finished());

    release.notify_one();
    assert_eq!(slow.await.unwrap().unwrap()["greeting"], "slow");
}

#[tokio::test]
async fn test_e2e_fault_round_trip() {
    let mut registry = ServiceRegistry::new();
    registry.register(
        "Hello_Service",
        "Hello_Port",
        "sayHello",
        handler_fn(|_, _| {
            Err(SoapError::Fault(
                SoapFault::client("name required").with_detail("firstName is empty"),
            ))
        }),
    );
    let server = Arc::new(Server::new(load(HELLO_WSDL), SoapConfig::default(), registry));
    let client = Client::new(
        load(HELLO_WSDL),
        SoapConfig::default(),
        Arc::new(LoopbackTransport::new(server)),
    );

    match client.call("sayHello", json!({})).await {
        Err(SoapError::Fault(fault)) => {
            assert_eq!(fault.code, FaultCode::Client);
            assert_eq!(fault.reason, "name required");
            assert_eq!(fault.detail.as_deref(), Some("firstName is empty"));
            assert_eq!(fault.status, 500);
        }
        other => panic!("expected a fault, got {:?}", other),
    }
}

// ============================================================================
// Style fallback
// ============================================================================

#[tokio::test]
async fn test_style_mix_dispatches_by_declared_style() {
    let mut registry = ServiceRegistry::new();
    registry.register(
        "HL7Service",
        "Hl7MessageBinding",
        "opHl7Message",
        handler_fn(|args, ctx| {
            assert_eq!(ctx.operation, "opHl7Message");
            Ok(json!({ "result": args["test"] }))
        }),
    );
    let server = Server::new(load(STYLE_MIX_WSDL), SoapConfig::default(), registry);

    // No SOAPAction: the rpc binding style finds nothing, the operation's own
    // document style matches the body element.
    let response = server.handle(InboundRequest::post("/", HL7_REQUEST)).await;
    assert_eq!(response.status, 200, "{}", response.body);
    assert!(response
        .body
        .contains("<hl7MessageResponse xmlns=\"urn:hl7-org:v3\"><result>ORU^R01</result></hl7MessageResponse>"));

    let response = server
        .handle(InboundRequest::post("/", HL7_REQUEST).with_header("SOAPAction", "\"urn:#opHl7Message\""))
        .await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_style_mix_wrapped_and_bare_shapes_see_same_args() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let mut registry = ServiceRegistry::new();
    registry.register(
        "HL7Service",
        "Hl7MessageBinding",
        "opHl7Message",
        handler_fn(move |args, _ctx| {
            recorder.lock().unwrap().push(args.clone());
            Ok(json!({ "result": args["test"] }))
        }),
    );
    let server = Server::new(load(STYLE_MIX_WSDL), SoapConfig::default(), registry);

    let wrapped = server.handle(InboundRequest::post("/", HL7_WRAPPED_REQUEST)).await;
    let bare = server.handle(InboundRequest::post("/", HL7_REQUEST)).await;
    assert_eq!(wrapped.status, 200, "{}", wrapped.body);
    assert_eq!(bare.status, 200, "{}", bare.body);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], json!({ "test": "ORU^R01" }));
    assert_eq!(seen[0], seen[1]);

    // Both replies use the declared document element.
    let expected = "<hl7MessageResponse xmlns=\"urn:hl7-org:v3\"><result>ORU^R01</result></hl7MessageResponse>";
    assert!(wrapped.body.contains(expected), "{}", wrapped.body);
    assert!(bare.body.contains(expected), "{}", bare.body);
    assert!(!wrapped.body.contains("opHl7MessageResponse"));
}

// ============================================================================
// Malformed input
// ============================================================================

#[tokio::test]
async fn test_missing_body_faults_and_server_keeps_serving() {
    let server = hello_server();

    let response = server
        .handle(InboundRequest::post(
            "/SayHello/",
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"/>"#,
        ))
        .await;
    assert_eq!(response.status, 500);
    let fault = unwrap(&response.body).unwrap().fault().unwrap();
    assert_eq!(fault.code, FaultCode::Client);
    assert!(fault.reason.contains("failed to parse message body"));

    let response = server
        .handle(InboundRequest::post("/SayHello/", "<not xml"))
        .await;
    assert_eq!(response.status, 500);

    let ok = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body><sayHello xmlns="http://www.examples.com/wsdl/HelloService.wsdl"><firstName>Eve</firstName></sayHello></soap:Body>
</soap:Envelope>"#;
    let response = server.handle(InboundRequest::post("/SayHello/", ok)).await;
    assert_eq!(response.status, 200);
    assert!(response.body.contains("<greeting>Hello Eve</greeting>"));
    assert_eq!(server.stats().faults_returned, 2);
}

#[tokio::test]
async fn test_unknown_operation_is_client_fault() {
    let server = hello_server();
    let body = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body><sayGoodbye/></soap:Body>
</soap:Envelope>"#;
    let response = server.handle(InboundRequest::post("/SayHello/", body)).await;
    let fault = unwrap(&response.body).unwrap().fault().unwrap();
    assert_eq!(fault.code, FaultCode::Client);
    assert!(fault.reason.contains("sayGoodbye"));
}

// ============================================================================
// Model immutability
// ============================================================================

#[tokio::test]
async fn test_model_unchanged_by_traffic() {
    let model = load(HELLO_WSDL);
    let snapshot = (*model).clone();

    let mut registry = ServiceRegistry::new();
    registry.register(
        "Hello_Service",
        "Hello_Port",
        "sayHello",
        handler_fn(|args, _| Ok(json!({ "greeting": args["firstName"] }))),
    );
    let server = Arc::new(Server::new(model.clone(), SoapConfig::default(), registry));
    let client = Client::new(
        model.clone(),
        SoapConfig::default(),
        Arc::new(LoopbackTransport::new(server)),
    );

    for name in ["a", "b", "c"] {
        client.call("sayHello", json!({ "firstName": name })).await.unwrap();
    }
    assert_eq!(*model, snapshot);
}

// ============================================================================
// Marshalling through the wire
// ============================================================================

#[tokio::test]
async fn test_cdata_passes_through() {
    let mut registry = ServiceRegistry::new();
    registry.register(
        "Hello_Service",
        "Hello_Port",
        "sayHello",
        handler_fn(|args, _| Ok(json!({ "greeting": args["firstName"] }))),
    );
    let server = Server::new(load(HELLO_WSDL), SoapConfig::default(), registry);
    let body = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body><sayHello xmlns="http://www.examples.com/wsdl/HelloService.wsdl"><firstName><![CDATA[<b>Bo</b>]]></firstName></sayHello></soap:Body>
</soap:Envelope>"#;
    let response = server.handle(InboundRequest::post("/SayHello/", body)).await;
    assert_eq!(response.status, 200);
    assert!(response.body.contains("<greeting><![CDATA[<b>Bo</b>]]></greeting>"));
}

// ============================================================================
// Security
// ============================================================================

#[tokio::test]
async fn test_security_chain_applied_in_order() {
    let recorder = Arc::new(Recorder::default());
    let chain = SecurityChain::new()
        .with(BasicAuthSecurity::new("user", "pass"))
        .with(BearerSecurity::new("token"))
        .with(WsSecurity::new("alice", "secret"));
    let client = Client::new(load(HELLO_WSDL), SoapConfig::default(), recorder.clone())
        .with_security(chain);

    let value = client.call("sayHello", json!({ "firstName": "x" })).await.unwrap();
    assert_eq!(value, Value::Null);

    let seen = recorder.seen.lock().unwrap();
    let request = &seen[0];
    // later strategies overwrite earlier headers
    assert_eq!(header(&request.headers, "Authorization"), Some("Bearer token"));
    assert!(request.body.contains("<soap:Header><wsse:Security "));
    assert!(request.body.contains("<wsse:Username>alice</wsse:Username>"));
}

#[test]
fn test_post_process_runs_once_on_full_envelope() {
    struct Counter(Mutex<u32>);

    impl Security for Counter {
        fn post_process(&self, xml: &str, envelope_key: &str) -> soap_wsdl::Result<String> {
            *self.0.lock().unwrap() += 1;
            assert!(xml.ends_with(&format!("</{}:Envelope>", envelope_key)));
            Ok(xml.to_string())
        }
    }

    let counter = Arc::new(Counter(Mutex::new(0)));
    struct Shared(Arc<Counter>);
    impl Security for Shared {
        fn post_process(&self, xml: &str, key: &str) -> soap_wsdl::Result<String> {
            self.0.post_process(xml, key)
        }
    }

    let client = Client::new(load(HELLO_WSDL), SoapConfig::default(), Arc::new(Recorder::default()))
        .with_security(Shared(counter.clone()));
    client.build_request("sayHello", &json!({})).unwrap();
    assert_eq!(*counter.0.lock().unwrap(), 1);
}

#[test]
fn test_options_flow_to_request() {
    struct Options;
    impl Security for Options {
        fn add_options(&self, options: &mut TransportOptions) {
            options.reject_unauthorized = Some(false);
        }
    }

    let client = Client::new(load(HELLO_WSDL), SoapConfig::default(), Arc::new(Recorder::default()))
        .with_security(Options);
    let request = client.build_request("sayHello", &json!({})).unwrap();
    assert_eq!(request.options.reject_unauthorized, Some(false));
}

#[tokio::test]
async fn test_ws_security_checked_by_server_authenticator() {
    let mut registry = ServiceRegistry::new();
    registry.register(
        "Hello_Service",
        "Hello_Port",
        "sayHello",
        handler_fn(|_, _| Ok(json!({ "greeting": "welcome" }))),
    );
    let mut server = Server::new(load(HELLO_WSDL), SoapConfig::default(), registry)
        .with_authenticator(authenticator_fn(|security, _request| {
            let token = security.and_then(|s| s.elements().find(|e| e.local_name() == "UsernameToken"));
            let field = |name: &str| {
                token
                    .and_then(|t| t.elements().find(|e| e.local_name() == name))
                    .map(|e| e.text())
            };
            Ok(field("Username").as_deref() == Some("alice")
                && field("Password").as_deref() == Some("secret"))
        }));
    server.add_soap_header("<s:Session xmlns:s=\"urn:session\">42</s:Session>");
    let server = Arc::new(server);

    let client = |password: &str| {
        Client::new(
            load(HELLO_WSDL),
            SoapConfig::default(),
            Arc::new(LoopbackTransport::new(server.clone())),
        )
        .with_security(WsSecurity::new("alice", password))
    };

    let result = client("secret").invoke("sayHello", json!({})).await.unwrap();
    assert_eq!(result.value, json!({ "greeting": "welcome" }));
    assert_eq!(result.soap_headers.len(), 1);
    assert_eq!(result.soap_headers[0].local_name(), "Session");

    match client("wrong").call("sayHello", json!({})).await {
        Err(SoapError::Fault(fault)) => {
            assert_eq!(fault.status, 401);
            assert_eq!(fault.code, FaultCode::Client);
            assert_eq!(fault.subcode.as_deref(), Some("AuthenticationFailure"));
        }
        other => panic!("expected authentication fault, got {:?}", other),
    }
}

// ============================================================================
// Attachments and WSDL publishing
// ============================================================================

#[tokio::test]
async fn test_multipart_response_exposes_attachments() {
    struct Multipart;

    #[async_trait]
    impl Transport for Multipart {
        async fn send(&self, _request: OutboundRequest) -> soap_wsdl::Result<TransportResponse> {
            let envelope = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><sayHelloResponse xmlns="http://www.examples.com/wsdl/HelloService.wsdl"><greeting>hi</greeting></sayHelloResponse></soap:Body></soap:Envelope>"#;
            let mut image = Headers::new();
            image.insert("Content-ID".to_string(), "<image1>".to_string());
            image.insert("Content-Type".to_string(), "image/png".to_string());
            Ok(TransportResponse {
                status: 200,
                parts: Some(vec![
                    MimePart::new(Headers::new(), envelope.as_bytes()),
                    MimePart::new(image, vec![0x89, 0x50, 0x4e, 0x47]),
                ]),
                ..TransportResponse::default()
            })
        }
    }

    let client = Client::new(load(HELLO_WSDL), SoapConfig::default(), Arc::new(Multipart));
    let result = client.invoke("sayHello", json!({})).await.unwrap();
    assert_eq!(result.value["greeting"], "hi");
    let image = result.attachments.get("image1").unwrap();
    assert_eq!(image.content_type(), Some("image/png"));
    assert_eq!(image.body, vec![0x89, 0x50, 0x4e, 0x47]);
}

#[tokio::test]
async fn test_get_wsdl_returns_source() {
    let server = hello_server();
    let response = server.handle(InboundRequest::get("/SayHello/?wsdl")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, HELLO_WSDL);
}
