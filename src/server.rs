//! SOAP server facade.
//!
//! Unwraps inbound envelopes, dispatches them to registered handlers and
//! answers with a response envelope or a SOAP Fault. The server never stops
//! on a bad request: every failure becomes a fault response.

use crate::config::{EnvelopeConfig, SoapConfig, SoapVersion};
use crate::dispatch::{Direction, Dispatcher};
use crate::envelope::{unwrap, EnvelopeBuilder};
use crate::error::{Result, SoapError, SoapFault};
use crate::marshal::{Deserializers, Marshaller};
use crate::parser::{parse_soap_action, XmlElement};
use crate::transport::{content_type_action, header, Headers, InboundRequest, ServerResponse};
use crate::wsdl::InterfaceModel;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a handler learns about the request besides its arguments.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub service: String,
    pub port: String,
    pub operation: String,
    /// Transport headers of the request
    pub headers: Headers,
    /// Entries of the SOAP Header
    pub soap_headers: Vec<XmlElement>,
}

/// Implements one operation.
///
/// Returning `Err(SoapError::Fault(..))` answers with that fault; any other
/// error becomes a `Server` fault.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, args: Value, ctx: RequestContext) -> Result<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(Value, RequestContext) -> Result<Value> + Send + Sync,
{
    async fn call(&self, args: Value, ctx: RequestContext) -> Result<Value> {
        (self.0)(args, ctx)
    }
}

struct AsyncFnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for AsyncFnHandler<F>
where
    F: Fn(Value, RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn call(&self, args: Value, ctx: RequestContext) -> Result<Value> {
        (self.0)(args, ctx).await
    }
}

/// Adapt a synchronous closure.
pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Value, RequestContext) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Adapt a closure returning a future.
pub fn async_handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(AsyncFnHandler(f))
}

/// Decides whether an inbound request may reach its handler.
///
/// `security` is the `Security` entry of the request's SOAP Header, if any.
/// `Ok(false)` is answered with a `Client` fault (subcode
/// `AuthenticationFailure`, status 401); an error becomes a fault the same
/// way handler errors do.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        security: Option<&XmlElement>,
        request: &InboundRequest,
    ) -> Result<bool>;
}

struct FnAuthenticator<F>(F);

#[async_trait]
impl<F> Authenticator for FnAuthenticator<F>
where
    F: Fn(Option<&XmlElement>, &InboundRequest) -> Result<bool> + Send + Sync,
{
    async fn authenticate(
        &self,
        security: Option<&XmlElement>,
        request: &InboundRequest,
    ) -> Result<bool> {
        (self.0)(security, request)
    }
}

/// Adapt a synchronous closure.
pub fn authenticator_fn<F>(f: F) -> Arc<dyn Authenticator>
where
    F: Fn(Option<&XmlElement>, &InboundRequest) -> Result<bool> + Send + Sync + 'static,
{
    Arc::new(FnAuthenticator(f))
}

type HeaderFn = dyn Fn(&RequestContext, &Value) -> String + Send + Sync;

/// A SOAP Header fragment the server adds to every response.
#[derive(Clone)]
pub enum ResponseHeader {
    Static(String),
    /// Rendered per request from the context and the decoded arguments
    Dynamic(Arc<HeaderFn>),
}

impl ResponseHeader {
    fn render(&self, ctx: &RequestContext, args: &Value) -> String {
        match self {
            ResponseHeader::Static(xml) => xml.clone(),
            ResponseHeader::Dynamic(f) => f(ctx, args),
        }
    }
}

/// Handlers keyed service, then port, then operation.
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    services: HashMap<String, HashMap<String, HashMap<String, Arc<dyn Handler>>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        service: impl Into<String>,
        port: impl Into<String>,
        operation: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) {
        self.services
            .entry(service.into())
            .or_default()
            .entry(port.into())
            .or_default()
            .insert(operation.into(), handler);
    }

    pub fn get(&self, service: &str, port: &str, operation: &str) -> Option<Arc<dyn Handler>> {
        self.services.get(service)?.get(port)?.get(operation).cloned()
    }
}

/// Request counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub requests_processed: u64,
    pub faults_returned: u64,
}

enum Outcome {
    Reply {
        operation: String,
        body: String,
        version: SoapVersion,
    },
    OneWay { operation: String },
}

/// A failed request: the fault plus the version to render it in.
struct Failure {
    fault: SoapFault,
    version: Option<SoapVersion>,
}

impl Failure {
    fn new(error: SoapError, version: Option<SoapVersion>) -> Self {
        Self {
            fault: into_fault(error),
            version,
        }
    }
}

/// Map an error to the fault sent back to the caller.
fn into_fault(error: SoapError) -> SoapFault {
    match error {
        SoapError::Fault(fault) => fault,
        e @ (SoapError::Parse(_) | SoapError::Dispatch(_)) => SoapFault::client(e.to_string()),
        e => SoapFault::server(e.to_string()),
    }
}

pub struct Server {
    model: Arc<InterfaceModel>,
    config: SoapConfig,
    registry: ServiceRegistry,
    deserializers: Deserializers,
    authenticator: Option<Arc<dyn Authenticator>>,
    soap_headers: Vec<ResponseHeader>,
    requests_processed: AtomicU64,
    faults_returned: AtomicU64,
}

impl Server {
    pub fn new(model: Arc<InterfaceModel>, config: SoapConfig, registry: ServiceRegistry) -> Self {
        info!(
            location = %model.location(),
            services = model.services().len(),
            "SOAP server ready"
        );
        Self {
            model,
            config,
            registry,
            deserializers: Deserializers::new(),
            authenticator: None,
            soap_headers: Vec::new(),
            requests_processed: AtomicU64::new(0),
            faults_returned: AtomicU64::new(0),
        }
    }

    pub fn with_deserializers(mut self, deserializers: Deserializers) -> Self {
        self.deserializers = deserializers;
        self
    }

    /// Check every request before it is dispatched.
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Add a fixed SOAP Header fragment to responses. Returns its index.
    pub fn add_soap_header(&mut self, xml: impl Into<String>) -> usize {
        self.soap_headers.push(ResponseHeader::Static(xml.into()));
        self.soap_headers.len() - 1
    }

    /// Add a SOAP Header fragment rendered per request. Returns its index.
    pub fn add_soap_header_fn<F>(&mut self, f: F) -> usize
    where
        F: Fn(&RequestContext, &Value) -> String + Send + Sync + 'static,
    {
        self.soap_headers.push(ResponseHeader::Dynamic(Arc::new(f)));
        self.soap_headers.len() - 1
    }

    pub fn change_soap_header(&mut self, index: usize, header: ResponseHeader) -> Result<()> {
        match self.soap_headers.get_mut(index) {
            Some(slot) => {
                *slot = header;
                Ok(())
            }
            None => Err(SoapError::Config(format!(
                "no response SOAP header at index {}",
                index
            ))),
        }
    }

    pub fn soap_headers(&self) -> &[ResponseHeader] {
        &self.soap_headers
    }

    pub fn clear_soap_headers(&mut self) {
        self.soap_headers.clear();
    }

    pub fn model(&self) -> &Arc<InterfaceModel> {
        &self.model
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            faults_returned: self.faults_returned.load(Ordering::Relaxed),
        }
    }

    /// Check if Content-Type is acceptable for SOAP.
    fn is_valid_content_type(&self, content_type: &str) -> bool {
        let ct_lower = content_type.to_lowercase();
        self.config
            .settings
            .allowed_content_types
            .iter()
            .any(|allowed| ct_lower.contains(&allowed.to_lowercase()))
    }

    fn envelope_builder(&self, version: SoapVersion) -> EnvelopeBuilder {
        EnvelopeBuilder::new(EnvelopeConfig {
            soap_version: version,
            ..self.config.envelope.clone()
        })
    }

    /// Answer one request.
    pub async fn handle(&self, request: InboundRequest) -> ServerResponse {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
        debug!(method = %request.method, path = %request.path, "Processing SOAP request");

        if request.method.eq_ignore_ascii_case("GET") {
            return self.handle_get(&request);
        }

        let content_type = header(&request.headers, "Content-Type");
        if let Some(content_type) = content_type {
            if !self.is_valid_content_type(content_type) {
                warn!(content_type = %content_type, "Rejected content type");
                let fault = SoapFault::client(format!("unsupported content type '{}'", content_type))
                    .with_status(415);
                return self.fault_response(fault, None);
            }
        }

        if request.body.len() > self.config.settings.max_body_size {
            warn!(
                body_size = request.body.len(),
                max_size = self.config.settings.max_body_size,
                "SOAP body too large"
            );
            let fault = SoapFault::client(format!(
                "request body size {} exceeds maximum {}",
                request.body.len(),
                self.config.settings.max_body_size
            ))
            .with_status(413);
            return self.fault_response(fault, None);
        }

        match self.process(&request).await {
            Ok(Outcome::Reply {
                operation,
                body,
                version,
            }) => {
                debug!(operation = %operation, "SOAP request handled");
                let mut response = ServerResponse::new(200, version.content_type(), body);
                self.add_debug_headers(&mut response, Some(&operation), version);
                response
            }
            Ok(Outcome::OneWay { operation }) => {
                debug!(operation = %operation, "One-way request handled");
                let mut response = ServerResponse {
                    status: self.config.server.oneway_status,
                    headers: Headers::new(),
                    body: String::new(),
                };
                self.add_debug_headers(&mut response, Some(&operation), self.config.envelope.soap_version);
                response
            }
            Err(failure) => {
                warn!(
                    code = %failure.fault.code.as_str(SoapVersion::Soap11),
                    reason = %failure.fault.reason,
                    "Returning SOAP fault"
                );
                self.fault_response(failure.fault, failure.version)
            }
        }
    }

    fn handle_get(&self, request: &InboundRequest) -> ServerResponse {
        match request.query() {
            Some(query) if query.eq_ignore_ascii_case("wsdl") => {
                debug!(path = %request.path, "Serving WSDL");
                ServerResponse::new(200, "text/xml; charset=utf-8", self.model.source())
            }
            _ => ServerResponse::new(404, "text/plain; charset=utf-8", "Not Found"),
        }
    }

    async fn process(&self, request: &InboundRequest) -> std::result::Result<Outcome, Failure> {
        let unwrapped = unwrap(&request.body).map_err(|e| Failure::new(e, None))?;
        let version = Some(unwrapped.version());
        let fail = |e: SoapError| Failure::new(e, version);

        let root = unwrapped.body_root().ok_or_else(|| {
            fail(SoapError::Parse(
                "failed to parse message body: SOAP Body is empty".to_string(),
            ))
        })?;

        if let Some(ref authenticator) = self.authenticator {
            let security = unwrapped
                .header_entries()
                .into_iter()
                .find(|entry| entry.local_name() == "Security");
            if !authenticator.authenticate(security, request).await.map_err(fail)? {
                warn!(path = %request.path, "Authentication failed");
                return Err(fail(SoapError::Fault(
                    SoapFault::client("Invalid username or password")
                        .with_subcode("AuthenticationFailure")
                        .with_status(401),
                )));
            }
        }

        let dispatcher = Dispatcher::new(&self.model);
        let route = dispatcher
            .resolve_port(Some(request.path_only()))
            .map_err(fail)?;

        let soap_action = header(&request.headers, "SOAPAction")
            .map(parse_soap_action)
            .or_else(|| header(&request.headers, "Content-Type").and_then(content_type_action));
        let resolved = dispatcher
            .resolve_inbound(
                &route,
                soap_action.as_deref(),
                root,
                unwrapped.body_root_namespace().as_deref(),
            )
            .map_err(fail)?;
        let operation = resolved.operation;
        debug!(
            service = %route.service.name,
            port = %route.port.name,
            operation = %operation.name,
            style = %resolved.style,
            "Dispatching operation"
        );

        let marshaller = Marshaller::new(&self.model, &self.config.marshal)
            .with_ignored_namespaces(self.config.wsdl.ignored_namespaces.effective())
            .with_deserializers(&self.deserializers);
        let input = dispatcher
            .body_shape(operation, resolved.style, Direction::Input)
            .map_err(fail)?;
        let message = resolved.message_root(root).map_err(fail)?;
        let mut ctx = unwrapped.body_context();
        let decoded = if resolved.wrapped {
            let mut scope = ctx.scope();
            scope.declare_element(root);
            marshaller.decode_body(&input, message, &mut scope)
        } else {
            marshaller.decode_body(&input, message, &mut ctx)
        };
        let args = decoded.map_err(fail)?;

        let handler = self
            .registry
            .get(&route.service.name, &route.port.name, &operation.name)
            .ok_or_else(|| {
                Failure::new(
                    SoapError::Dispatch(format!(
                        "no handler for {}.{}.{}",
                        route.service.name, route.port.name, operation.name
                    )),
                    version,
                )
            })?;

        let ctx = RequestContext {
            service: route.service.name.clone(),
            port: route.port.name.clone(),
            operation: operation.name.clone(),
            headers: request.headers.clone(),
            soap_headers: unwrapped.header_entries().into_iter().cloned().collect(),
        };
        let response_headers: String = self
            .soap_headers
            .iter()
            .map(|header| header.render(&ctx, &args))
            .collect();
        let result = match tokio::spawn(async move { handler.call(args, ctx).await }).await {
            Ok(result) => result,
            Err(join_error) => {
                warn!(operation = %operation.name, error = %join_error, "Handler task failed");
                Err(SoapError::Handler(format!(
                    "handler for '{}' panicked",
                    operation.name
                )))
            }
        };
        let value = result.map_err(fail)?;

        if operation.is_one_way() {
            return Ok(Outcome::OneWay {
                operation: operation.name.clone(),
            });
        }

        let output = dispatcher
            .body_shape(operation, resolved.style, Direction::Output)
            .map_err(fail)?;
        let builder = self.envelope_builder(unwrapped.version());
        let body = marshaller
            .encode_body(&output, &value, &mut builder.body_context())
            .map_err(fail)?;
        let body = builder.wrap(&body, &response_headers, None).map_err(fail)?;

        Ok(Outcome::Reply {
            operation: operation.name.clone(),
            body,
            version: unwrapped.version(),
        })
    }

    fn fault_response(&self, fault: SoapFault, version: Option<SoapVersion>) -> ServerResponse {
        self.faults_returned.fetch_add(1, Ordering::Relaxed);
        let version = version.unwrap_or(self.config.envelope.soap_version);
        let body = self.envelope_builder(version).render_fault(&fault);
        let mut response = ServerResponse::new(fault.status, version.content_type(), body);
        self.add_debug_headers(&mut response, None, version);
        response
    }

    /// Add debug headers to a response.
    fn add_debug_headers(
        &self,
        response: &mut ServerResponse,
        operation: Option<&str>,
        version: SoapVersion,
    ) {
        if !self.config.settings.debug_headers {
            return;
        }
        let version = match version {
            SoapVersion::Soap11 => "1.1",
            SoapVersion::Soap12 => "1.2",
        };
        response
            .headers
            .insert("X-SOAP-Version".to_string(), version.to_string());
        if let Some(operation) = operation {
            response
                .headers
                .insert("X-SOAP-Operation".to_string(), operation.to_string());
        }
        response.headers.insert(
            "X-SOAP-Requests".to_string(),
            self.requests_processed.load(Ordering::Relaxed).to_string(),
        );
    }
}
