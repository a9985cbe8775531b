//! Binding dispatcher.
//!
//! Picks the port and binding for a call or request, resolves the operation
//! an inbound body addresses, and derives the body shape the marshaller
//! works with.

use crate::error::{Result, SoapError};
use crate::marshal::BodyShape;
use crate::nscontext::QName;
use crate::parser::XmlElement;
use crate::wsdl::{Binding, InterfaceModel, Operation, Port, Service, Style};
use tracing::debug;
use url::Url;

/// A resolved service port and its binding.
#[derive(Debug, Clone, Copy)]
pub struct Route<'a> {
    pub service: &'a Service,
    pub port: &'a Port,
    pub binding: &'a Binding,
}

/// Which message of an operation a body carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// An operation together with the style its body is read with.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub operation: &'a Operation,
    pub style: Style,
    /// The body root is an rpc wrapper around the document element of an
    /// operation that declares `document` style.
    pub wrapped: bool,
}

impl<'a> Resolved<'a> {
    fn new(operation: &'a Operation, style: Style) -> Self {
        Self {
            operation,
            style,
            wrapped: false,
        }
    }

    /// The element the input message is decoded from.
    pub fn message_root<'x>(&self, root: &'x XmlElement) -> Result<&'x XmlElement> {
        if !self.wrapped {
            return Ok(root);
        }
        root.elements().next().ok_or_else(|| {
            SoapError::Parse(format!(
                "failed to parse message body: wrapper '{}' has no message element",
                root.local_name()
            ))
        })
    }
}

pub struct Dispatcher<'a> {
    model: &'a InterfaceModel,
}

impl<'a> Dispatcher<'a> {
    pub fn new(model: &'a InterfaceModel) -> Self {
        Self { model }
    }

    /// Resolve the port for an endpoint URL or request path.
    ///
    /// Port locations are matched by path, ignoring a trailing `/`. When no
    /// location matches and the model has a single binding, its first port
    /// is used.
    pub fn resolve_port(&self, endpoint: Option<&str>) -> Result<Route<'a>> {
        if let Some(endpoint) = endpoint {
            let wanted = normalize_path(endpoint);
            for service in self.model.services() {
                for port in &service.ports {
                    if normalize_path(&port.location) != wanted {
                        continue;
                    }
                    if let Some(binding) = self.model.binding(&port.binding) {
                        debug!(service = %service.name, port = %port.name, "Resolved port by path");
                        return Ok(Route { service, port, binding });
                    }
                }
            }
        }

        let mut bindings = self.model.bindings();
        if let (Some(binding), None) = (bindings.next(), bindings.next()) {
            for service in self.model.services() {
                if let Some(port) = service.ports.iter().find(|p| p.binding == binding.qname()) {
                    return Ok(Route { service, port, binding });
                }
            }
            return Err(SoapError::Dispatch(format!(
                "no port uses binding '{}'",
                binding.name
            )));
        }

        Err(SoapError::Dispatch(match endpoint {
            Some(endpoint) => format!("no port matches endpoint '{}'", endpoint),
            None => "several bindings defined and no endpoint given".to_string(),
        }))
    }

    /// Look up an operation by name for an outbound call.
    pub fn operation(&self, route: &Route<'a>, name: &str) -> Result<Resolved<'a>> {
        let operation = route.binding.operation(name).ok_or_else(|| {
            SoapError::Dispatch(format!(
                "operation '{}' not found in binding '{}'",
                name, route.binding.name
            ))
        })?;
        Ok(Resolved::new(
            operation,
            operation.effective_style(route.binding.style),
        ))
    }

    /// Resolve the operation an inbound body addresses.
    ///
    /// Tried in order: the SOAPAction header, the body root under the
    /// binding's nominal style, then the body root under each operation's
    /// own style.
    pub fn resolve_inbound(
        &self,
        route: &Route<'a>,
        soap_action: Option<&str>,
        root: &XmlElement,
        root_namespace: Option<&str>,
    ) -> Result<Resolved<'a>> {
        let binding = route.binding;

        if let Some(action) = soap_action.filter(|a| !a.is_empty()) {
            if let Some(operation) = binding
                .operations
                .iter()
                .find(|op| self.model.soap_action(op) == action)
            {
                debug!(operation = %operation.name, action = %action, "Resolved operation by SOAPAction");
                return Ok(self.resolved(binding, operation, root, root_namespace));
            }
        }

        if let Some(operation) = binding
            .operations
            .iter()
            .find(|op| body_matches(op, binding.style, root, root_namespace))
        {
            return Ok(self.resolved(binding, operation, root, root_namespace));
        }

        for operation in &binding.operations {
            let style = operation.effective_style(binding.style);
            if body_matches(operation, style, root, root_namespace) {
                debug!(operation = %operation.name, style = %style, "Resolved operation by declared style");
                return Ok(Resolved::new(operation, style));
            }
        }

        Err(SoapError::Dispatch(format!(
            "no operation of binding '{}' matches body element '{}'",
            binding.name,
            root.local_name()
        )))
    }

    /// Read the body with the operation's declared style. A `document`
    /// operation under an `rpc` binding may still arrive wrapped in an
    /// `<opName>` element; the wrapper is then skipped so handlers see the
    /// same arguments for both shapes.
    fn resolved(
        &self,
        binding: &Binding,
        operation: &'a Operation,
        root: &XmlElement,
        root_namespace: Option<&str>,
    ) -> Resolved<'a> {
        let style = operation.effective_style(binding.style);
        let wrapped = style == Style::Document
            && binding.style == Style::Rpc
            && root.local_name() == operation.name
            && !body_matches(operation, Style::Document, root, root_namespace);
        if wrapped {
            debug!(operation = %operation.name, "Unwrapping rpc wrapper of document operation");
        }
        Resolved {
            operation,
            style,
            wrapped,
        }
    }

    /// The body shape of one message of an operation.
    pub fn body_shape(
        &self,
        operation: &Operation,
        style: Style,
        direction: Direction,
    ) -> Result<BodyShape> {
        let reference = match direction {
            Direction::Input => operation.input.as_ref(),
            Direction::Output => operation.output.as_ref(),
        }
        .ok_or_else(|| {
            SoapError::Dispatch(format!(
                "operation '{}' has no {} message",
                operation.name,
                direction_name(direction)
            ))
        })?;

        match style {
            Style::Rpc => {
                let local = match direction {
                    Direction::Input => operation.name.clone(),
                    Direction::Output => format!("{}Response", operation.name),
                };
                let parts = self
                    .model
                    .message(&reference.message)
                    .map(|m| m.parts.clone())
                    .unwrap_or_default();
                Ok(BodyShape::Rpc {
                    wrapper: QName::new(self.model.target_namespace(), local),
                    parts,
                })
            }
            Style::Document => {
                let element = reference.element.clone().ok_or_else(|| {
                    SoapError::Dispatch(format!(
                        "document operation '{}' has no {} element",
                        operation.name,
                        direction_name(direction)
                    ))
                })?;
                Ok(BodyShape::Document { element })
            }
        }
    }
}

fn direction_name(direction: Direction) -> &'static str {
    match direction {
        Direction::Input => "input",
        Direction::Output => "output",
    }
}

fn body_matches(
    operation: &Operation,
    style: Style,
    root: &XmlElement,
    root_namespace: Option<&str>,
) -> bool {
    match style {
        Style::Rpc => root.local_name() == operation.name,
        Style::Document => operation
            .input
            .as_ref()
            .and_then(|input| input.element.as_ref())
            .is_some_and(|element| {
                element.local == root.local_name()
                    && (root_namespace.is_none() || element.namespace() == root_namespace)
            }),
    }
}

/// Path of a URL or bare path, without query and trailing `/`.
fn normalize_path(location: &str) -> String {
    let path = match Url::parse(location) {
        Ok(url) => url.path().to_string(),
        Err(_) => location.split('?').next().unwrap_or_default().to_string(),
    };
    path.trim_end_matches('/').to_string()
}
