//! Transport boundary.
//!
//! The core never opens connections. Clients hand an [`OutboundRequest`] to a
//! [`Transport`]; servers are driven with an [`InboundRequest`] and answer
//! with a [`ServerResponse`]. [`LoopbackTransport`] wires the two together
//! in-process.

use crate::attachments::MimePart;
use crate::error::{Result, SoapError};
use crate::server::Server;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// HTTP-style header map.
pub type Headers = HashMap<String, String>;

/// Case-insensitive header lookup.
pub fn header<'h>(headers: &'h Headers, name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// The `action` parameter of a SOAP 1.2 Content-Type.
pub fn content_type_action(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("action="))
        .map(|action| action.trim_matches('"').to_string())
}

/// Connection options contributed by security strategies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportOptions {
    /// Client private key (PEM)
    pub key: Option<Vec<u8>>,
    /// Client certificate (PEM)
    pub cert: Option<Vec<u8>>,
    /// Trusted CA bundle (PEM)
    pub ca: Option<Vec<u8>>,
    pub passphrase: Option<String>,
    pub reject_unauthorized: Option<bool>,
    pub secure_protocol: Option<String>,
    /// Any other transport-specific flag
    pub extra: BTreeMap<String, String>,
}

impl TransportOptions {
    /// Overlay every option set in `other`.
    pub fn merge(&mut self, other: &TransportOptions) {
        if other.key.is_some() {
            self.key = other.key.clone();
        }
        if other.cert.is_some() {
            self.cert = other.cert.clone();
        }
        if other.ca.is_some() {
            self.ca = other.ca.clone();
        }
        if other.passphrase.is_some() {
            self.passphrase = other.passphrase.clone();
        }
        if other.reject_unauthorized.is_some() {
            self.reject_unauthorized = other.reject_unauthorized;
        }
        if other.secure_protocol.is_some() {
            self.secure_protocol = other.secure_protocol.clone();
        }
        self.extra
            .extend(other.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// A request leaving the client.
#[derive(Debug, Clone, Default)]
pub struct OutboundRequest {
    pub url: String,
    pub body: String,
    pub headers: Headers,
    pub options: TransportOptions,
}

/// What a transport hands back.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
    /// Multipart responses: part 0 is the SOAP envelope
    pub parts: Option<Vec<MimePart>>,
}

/// Sends requests on behalf of a client.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse>;
}

/// A request arriving at a server.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub method: String,
    /// Path plus query string
    pub path: String,
    pub headers: Headers,
    pub body: String,
}

impl InboundRequest {
    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            path: path.into(),
            headers: Headers::new(),
            body: body.into(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.into(),
            headers: Headers::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Path without the query string.
    pub fn path_only(&self) -> &str {
        self.path.split('?').next().unwrap_or_default()
    }

    pub fn query(&self) -> Option<&str> {
        self.path.split_once('?').map(|(_, query)| query)
    }
}

/// A server's answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
}

impl ServerResponse {
    pub fn new(status: u16, content_type: &str, body: impl Into<String>) -> Self {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        Self {
            status,
            headers,
            body: body.into(),
        }
    }
}

/// Drives a [`Server`] in-process.
#[derive(Clone)]
pub struct LoopbackTransport {
    server: Arc<Server>,
}

impl LoopbackTransport {
    pub fn new(server: Arc<Server>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse> {
        let url = Url::parse(&request.url)
            .map_err(|e| SoapError::Transport(format!("invalid URL '{}': {}", request.url, e)))?;
        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        debug!(url = %request.url, path = %path, "Loopback request");

        let inbound = InboundRequest {
            method: "POST".to_string(),
            path,
            headers: request.headers,
            body: request.body,
        };
        let response = self.server.handle(inbound).await;

        Ok(TransportResponse {
            status: response.status,
            headers: response.headers,
            body: response.body,
            parts: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let mut headers = Headers::new();
        headers.insert("SOAPAction".to_string(), "\"x\"".to_string());
        assert_eq!(header(&headers, "soapaction"), Some("\"x\""));
        assert_eq!(header(&headers, "content-type"), None);
    }

    #[test]
    fn test_content_type_action() {
        assert_eq!(
            content_type_action("application/soap+xml; charset=utf-8; action=\"urn:x/Op\"").as_deref(),
            Some("urn:x/Op")
        );
        assert_eq!(content_type_action("text/xml; charset=utf-8"), None);
    }

    #[test]
    fn test_inbound_path_and_query() {
        let request = InboundRequest::get("/service?wsdl");
        assert_eq!(request.path_only(), "/service");
        assert_eq!(request.query(), Some("wsdl"));
        assert_eq!(InboundRequest::post("/", "").query(), None);
    }

    #[test]
    fn test_options_merge() {
        let mut options = TransportOptions {
            passphrase: Some("old".to_string()),
            ..TransportOptions::default()
        };
        let mut extra = BTreeMap::new();
        extra.insert("forever".to_string(), "true".to_string());
        options.merge(&TransportOptions {
            cert: Some(b"cert".to_vec()),
            reject_unauthorized: Some(false),
            extra,
            ..TransportOptions::default()
        });
        assert_eq!(options.passphrase.as_deref(), Some("old"));
        assert_eq!(options.cert.as_deref(), Some(&b"cert"[..]));
        assert_eq!(options.reject_unauthorized, Some(false));
        assert_eq!(options.extra["forever"], "true");
    }
}
