//! WSDL-driven SOAP client and server core.
//!
//! Loads a WSDL document (with its imports and schemas) into an immutable
//! [`InterfaceModel`], converts between native JSON-like values and SOAP
//! XML following the schema, and routes inbound and outbound messages by
//! binding style.
//!
//! # Features
//!
//! - WSDL 1.1 / XSD subset loading with import and include resolution
//! - Schema-directed marshalling with namespace-prefix management
//! - RPC and document binding styles, per-operation style overrides
//! - SOAP 1.1 and 1.2 envelopes and faults
//! - Pluggable security strategies (Basic, Bearer, client TLS, WS-Security)
//! - Transport-agnostic client and server facades
//!
//! # Example
//!
//! ```ignore
//! use soap_wsdl::{handler_fn, InterfaceModel, Server, ServiceRegistry, SoapConfig};
//! use std::sync::Arc;
//!
//! let config = SoapConfig::default();
//! let model = Arc::new(InterfaceModel::open("hello.wsdl", &config.wsdl)?);
//! let mut registry = ServiceRegistry::new();
//! registry.register("Hello_Service", "Hello_Port", "sayHello", handler_fn(|args, _| {
//!     Ok(serde_json::json!({ "greeting": format!("Hello {}", args["firstName"]) }))
//! }));
//! let server = Server::new(model, config, registry);
//! ```

pub mod attachments;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod marshal;
pub mod nscontext;
pub mod parser;
pub mod security;
pub mod server;
pub mod transport;
pub mod wsdl;

#[cfg(test)]
mod testdata;

pub use attachments::{Attachments, MimePart};
pub use client::{CallResult, Client};
pub use config::{SoapConfig, SoapVersion};
pub use dispatch::{Dispatcher, Route};
pub use envelope::{EnvelopeBuilder, Unwrapped};
pub use error::{FaultCode, Result, SoapError, SoapFault};
pub use marshal::{BodyShape, Deserializers, Marshaller};
pub use nscontext::{NamespaceContext, QName};
pub use security::{
    BasicAuthSecurity, BearerSecurity, ClientSslSecurity, Security, SecurityChain, WsSecurity,
};
pub use server::{
    async_handler_fn, authenticator_fn, handler_fn, Authenticator, Handler, RequestContext,
    ResponseHeader, Server, ServiceRegistry,
};
pub use transport::{
    InboundRequest, LoopbackTransport, OutboundRequest, ServerResponse, Transport,
    TransportOptions, TransportResponse,
};
pub use wsdl::{InterfaceModel, Style};
