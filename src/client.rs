//! SOAP client facade.

use crate::attachments::{split_parts, Attachments};
use crate::config::{SoapConfig, SoapVersion};
use crate::dispatch::{Direction, Dispatcher};
use crate::envelope::{unwrap, EnvelopeBuilder};
use crate::error::{Result, SoapError};
use crate::marshal::{Deserializers, Marshaller};
use crate::parser::XmlElement;
use crate::security::Security;
use crate::transport::{Headers, OutboundRequest, Transport, TransportOptions};
use crate::wsdl::InterfaceModel;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a call returned.
#[derive(Debug, Clone, Default)]
pub struct CallResult {
    /// Decoded output message; `null` for one-way operations
    pub value: Value,
    /// Entries of the response SOAP Header
    pub soap_headers: Vec<XmlElement>,
    pub attachments: Attachments,
    /// Response envelope as received
    pub raw: String,
}

/// Invokes operations of a loaded interface through a [`Transport`].
pub struct Client {
    model: Arc<InterfaceModel>,
    config: SoapConfig,
    transport: Arc<dyn Transport>,
    security: Option<Arc<dyn Security>>,
    endpoint: Option<String>,
    soap_headers: Vec<String>,
    http_headers: Headers,
    deserializers: Deserializers,
}

impl Client {
    pub fn new(model: Arc<InterfaceModel>, config: SoapConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            model,
            config,
            transport,
            security: None,
            endpoint: None,
            soap_headers: Vec::new(),
            http_headers: Headers::new(),
            deserializers: Deserializers::new(),
        }
    }

    /// Override the port location; also selects the port when the model has
    /// several bindings.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_security(mut self, security: impl Security + 'static) -> Self {
        self.security = Some(Arc::new(security));
        self
    }

    pub fn with_deserializers(mut self, deserializers: Deserializers) -> Self {
        self.deserializers = deserializers;
        self
    }

    /// Add a raw XML entry to the SOAP Header of every request.
    pub fn add_soap_header(&mut self, xml: impl Into<String>) {
        self.soap_headers.push(xml.into());
    }

    pub fn clear_soap_headers(&mut self) {
        self.soap_headers.clear();
    }

    /// Add a transport header to every request.
    pub fn add_http_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.http_headers.insert(name.into(), value.into());
    }

    pub fn model(&self) -> &Arc<InterfaceModel> {
        &self.model
    }

    /// Services, ports and operations with their message shapes.
    pub fn describe(&self) -> Value {
        self.model.describe_services()
    }

    fn marshaller(&self) -> Marshaller<'_> {
        Marshaller::new(&self.model, &self.config.marshal)
            .with_ignored_namespaces(self.config.wsdl.ignored_namespaces.effective())
            .with_deserializers(&self.deserializers)
    }

    /// Build the request for `operation` without sending it.
    pub fn build_request(&self, operation: &str, args: &Value) -> Result<OutboundRequest> {
        let dispatcher = Dispatcher::new(&self.model);
        let route = dispatcher.resolve_port(self.endpoint.as_deref())?;
        let resolved = dispatcher.operation(&route, operation)?;
        let shape = dispatcher.body_shape(resolved.operation, resolved.style, Direction::Input)?;

        let builder = EnvelopeBuilder::new(self.config.envelope.clone());
        let body = self
            .marshaller()
            .encode_body(&shape, args, &mut builder.body_context())?;
        let xml = builder.wrap(&body, &self.soap_headers.concat(), self.security.as_deref())?;

        let action = self.model.soap_action(resolved.operation);
        let mut headers = self.http_headers.clone();
        match builder.version() {
            SoapVersion::Soap11 => {
                headers.insert(
                    "Content-Type".to_string(),
                    SoapVersion::Soap11.content_type().to_string(),
                );
                headers.insert("SOAPAction".to_string(), format!("\"{}\"", action));
            }
            SoapVersion::Soap12 => {
                headers.insert(
                    "Content-Type".to_string(),
                    format!("{}; action=\"{}\"", SoapVersion::Soap12.content_type(), action),
                );
            }
        }

        let mut options = TransportOptions::default();
        if let Some(ref security) = self.security {
            security.add_headers(&mut headers);
            security.add_options(&mut options);
        }

        let url = self
            .endpoint
            .clone()
            .unwrap_or_else(|| route.port.location.clone());
        debug!(operation = %operation, url = %url, style = %resolved.style, "Built SOAP request");

        Ok(OutboundRequest {
            url,
            body: xml,
            headers,
            options,
        })
    }

    /// Call `operation` and return the decoded output message.
    pub async fn call(&self, operation: &str, args: Value) -> Result<Value> {
        Ok(self.invoke(operation, args).await?.value)
    }

    /// Call `operation` and return the full response.
    pub async fn invoke(&self, operation: &str, args: Value) -> Result<CallResult> {
        let request = self.build_request(operation, &args)?;
        let response = self.transport.send(request).await?;
        debug!(operation = %operation, status = response.status, "Received SOAP response");

        let (raw, attachments) = match response.parts {
            Some(parts) => split_parts(parts)?,
            None => (response.body, Attachments::default()),
        };

        let dispatcher = Dispatcher::new(&self.model);
        let route = dispatcher.resolve_port(self.endpoint.as_deref())?;
        let resolved = dispatcher.operation(&route, operation)?;

        if raw.trim().is_empty() {
            if response.status >= 400 {
                return Err(SoapError::Transport(format!(
                    "HTTP {} with empty body",
                    response.status
                )));
            }
            return Ok(CallResult {
                attachments,
                ..CallResult::default()
            });
        }

        let unwrapped = match unwrap(&raw) {
            Ok(unwrapped) => unwrapped,
            Err(e) if response.status >= 400 => {
                warn!(status = response.status, error = %e, "Non-SOAP error response");
                return Err(SoapError::Transport(format!(
                    "HTTP {}: {}",
                    response.status, raw
                )));
            }
            Err(e) => return Err(e),
        };

        if let Some(fault) = unwrapped.fault() {
            warn!(operation = %operation, reason = %fault.reason, "SOAP fault received");
            return Err(SoapError::Fault(fault.with_status(response.status)));
        }

        let soap_headers = unwrapped.header_entries().into_iter().cloned().collect();
        let value = match (resolved.operation.is_one_way(), unwrapped.body_root()) {
            (false, Some(root)) => {
                let shape =
                    dispatcher.body_shape(resolved.operation, resolved.style, Direction::Output)?;
                self.marshaller()
                    .decode_body(&shape, root, &mut unwrapped.body_context())?
            }
            _ => Value::Null,
        };

        Ok(CallResult {
            value,
            soap_headers,
            attachments,
            raw,
        })
    }
}
