//! Builds an [`InterfaceModel`] from a root document and its imports.

use super::loader::{self, DocumentLoader};
use super::schema::{resolve_qname, Schema, SchemaParser, TypeArena, TypeId, TypeNode};
use super::{
    lookup_component, lookup_type, Binding, InterfaceModel, Message, MessageRef, Operation, Part, Port, PortType,
    PortTypeOperation, Service, Style,
};
use crate::config::WsdlConfig;
use crate::error::{Result, SoapError};
use crate::nscontext::{NamespaceContext, QName};
use crate::parser::{parse_document, XmlElement};
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, info, warn};
use url::Url;

struct PendingDocument {
    url: Url,
    inherit_namespace: Option<String>,
}

pub(crate) struct ModelBuilder<'a> {
    loader: &'a dyn DocumentLoader,
    config: &'a WsdlConfig,
    visited: HashSet<String>,
    pending: VecDeque<PendingDocument>,
    arena: TypeArena,
    schemas: BTreeMap<String, Schema>,
    messages: BTreeMap<QName, Message>,
    port_types: BTreeMap<QName, PortType>,
    bindings: BTreeMap<QName, Binding>,
    services: Vec<Service>,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(loader: &'a dyn DocumentLoader, config: &'a WsdlConfig) -> Self {
        Self {
            loader,
            config,
            visited: HashSet::new(),
            pending: VecDeque::new(),
            arena: TypeArena::default(),
            schemas: BTreeMap::new(),
            messages: BTreeMap::new(),
            port_types: BTreeMap::new(),
            bindings: BTreeMap::new(),
            services: Vec::new(),
        }
    }

    pub fn build(mut self, url: Url, source: String) -> Result<InterfaceModel> {
        self.visited.insert(url.to_string());

        let root = parse_document(&source)?;
        if root.local_name() != "definitions" {
            return Err(SoapError::Parse(format!(
                "expected wsdl:definitions, found <{}> in {}",
                root.name, url
            )));
        }
        let target_namespace = root.attr("targetNamespace").unwrap_or_default().to_string();
        let namespaces = root
            .namespace_declarations()
            .map(|(prefix, uri)| (prefix.to_string(), uri.to_string()))
            .collect();

        self.process_definitions(&root, &url)?;

        while let Some(document) = self.pending.pop_front() {
            if !self.visited.insert(document.url.to_string()) {
                debug!(url = %document.url, "Skipping already loaded document");
                continue;
            }
            let text = self.loader.load(&document.url)?;
            let doc = parse_document(&text)?;
            match doc.local_name() {
                "definitions" => self.process_definitions(&doc, &document.url)?,
                "schema" => {
                    let mut ctx = NamespaceContext::new();
                    self.process_schema(
                        &doc,
                        &mut ctx,
                        &document.url,
                        document.inherit_namespace.as_deref(),
                    )?;
                }
                other => {
                    return Err(SoapError::Parse(format!(
                        "unexpected root element <{}> in {}",
                        other, document.url
                    )))
                }
            }
        }

        self.link()?;

        info!(
            location = %url,
            services = self.services.len(),
            bindings = self.bindings.len(),
            types = self.arena.len(),
            "Interface model built"
        );

        Ok(InterfaceModel {
            target_namespace,
            services: self.services,
            bindings: self.bindings,
            port_types: self.port_types,
            messages: self.messages,
            schemas: self.schemas,
            arena: self.arena,
            namespaces,
            source,
            location: url.to_string(),
        })
    }

    fn enqueue(&mut self, base: &Url, location: &str, inherit_namespace: Option<String>) -> Result<()> {
        let url = loader::join(base, location)?;
        if !self.visited.contains(url.as_str()) {
            self.pending.push_back(PendingDocument {
                url,
                inherit_namespace,
            });
        }
        Ok(())
    }

    fn resolve(&self, ctx: &NamespaceContext, raw: &str) -> Result<Option<QName>> {
        resolve_qname(ctx, raw, self.config.strict)
    }

    fn process_definitions(&mut self, root: &XmlElement, url: &Url) -> Result<()> {
        let target_namespace = root.attr("targetNamespace").unwrap_or_default();
        let mut ctx = NamespaceContext::new();
        let mut scope = ctx.scope();
        scope.declare_element(root);

        for child in root.elements() {
            match child.local_name() {
                "import" => {
                    if let Some(location) = child.attr("location") {
                        self.enqueue(url, location, None)?;
                    }
                }
                "types" => {
                    let mut types = scope.scope();
                    types.declare_element(child);
                    for schema in child.elements().filter(|e| e.local_name() == "schema") {
                        self.process_schema(schema, &mut types, url, None)?;
                    }
                }
                "message" => self.parse_message(child, target_namespace, &mut scope)?,
                "portType" => self.parse_port_type(child, target_namespace, &mut scope)?,
                "binding" => self.parse_binding(child, target_namespace, &mut scope)?,
                "service" => self.parse_service(child, &mut scope)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn process_schema(
        &mut self,
        node: &XmlElement,
        ctx: &mut NamespaceContext,
        url: &Url,
        inherit_namespace: Option<&str>,
    ) -> Result<()> {
        let parsed = SchemaParser::new(&mut self.arena, self.config.strict)
            .parse(node, ctx, inherit_namespace)?;
        for reference in parsed.references {
            self.enqueue(url, &reference.location, reference.inherit_namespace)?;
        }

        let schema = parsed.schema;
        match self.schemas.get_mut(&schema.target_namespace) {
            Some(existing) => {
                debug!(namespace = %schema.target_namespace, "Merging schema fragment");
                existing.merge(schema, self.config.override_duplicate_types);
            }
            None => {
                self.schemas.insert(schema.target_namespace.clone(), schema);
            }
        }
        Ok(())
    }

    fn parse_message(
        &mut self,
        node: &XmlElement,
        target_namespace: &str,
        ctx: &mut NamespaceContext,
    ) -> Result<()> {
        let mut scope = ctx.scope();
        scope.declare_element(node);

        let name = node.attr("name").unwrap_or_default().to_string();
        let mut parts = Vec::new();
        for part in node.elements().filter(|e| e.local_name() == "part") {
            let mut part_scope = scope.scope();
            part_scope.declare_element(part);
            let element = match part.attr("element") {
                Some(raw) => self.resolve(&part_scope, raw)?,
                None => None,
            };
            let type_name = match part.attr("type") {
                Some(raw) => self.resolve(&part_scope, raw)?,
                None => None,
            };
            parts.push(Part {
                name: part.attr("name").unwrap_or_default().to_string(),
                element,
                type_name,
                type_ref: None,
            });
        }

        register(
            &mut self.messages,
            component_name(target_namespace, &name),
            Message { name, parts },
        );
        Ok(())
    }

    /// Qualified name of a QName-valued attribute.
    fn reference(&self, ctx: &NamespaceContext, raw: Option<&str>) -> Result<Option<QName>> {
        match raw {
            Some(raw) => self.resolve(ctx, raw),
            None => Ok(None),
        }
    }

    fn parse_port_type(
        &mut self,
        node: &XmlElement,
        target_namespace: &str,
        ctx: &mut NamespaceContext,
    ) -> Result<()> {
        let mut scope = ctx.scope();
        scope.declare_element(node);

        let name = node.attr("name").unwrap_or_default().to_string();
        let mut operations = Vec::new();
        for op in node.elements().filter(|e| e.local_name() == "operation") {
            let mut op_scope = scope.scope();
            op_scope.declare_element(op);
            let mut operation = PortTypeOperation {
                name: op.attr("name").unwrap_or_default().to_string(),
                input: None,
                output: None,
            };
            for io in op.elements() {
                match io.local_name() {
                    "input" => operation.input = self.reference(&op_scope, io.attr("message"))?,
                    "output" => operation.output = self.reference(&op_scope, io.attr("message"))?,
                    _ => {}
                }
            }
            operations.push(operation);
        }

        register(
            &mut self.port_types,
            component_name(target_namespace, &name),
            PortType { name, operations },
        );
        Ok(())
    }

    fn parse_binding(
        &mut self,
        node: &XmlElement,
        target_namespace: &str,
        ctx: &mut NamespaceContext,
    ) -> Result<()> {
        let mut scope = ctx.scope();
        scope.declare_element(node);

        let name = node.attr("name").unwrap_or_default().to_string();
        let port_type = self.reference(&scope, node.attr("type"))?.unwrap_or_default();
        let mut binding = Binding {
            name: name.clone(),
            namespace: component_name(target_namespace, &name).namespace,
            port_type,
            style: Style::default(),
            operations: Vec::new(),
        };

        for child in node.elements() {
            match child.local_name() {
                "binding" => {
                    if let Some(style) = child.attr("style").and_then(Style::parse) {
                        binding.style = style;
                    }
                }
                "operation" => binding.operations.push(parse_binding_operation(child)),
                _ => {}
            }
        }

        register(&mut self.bindings, binding.qname(), binding);
        Ok(())
    }

    fn parse_service(&mut self, node: &XmlElement, ctx: &mut NamespaceContext) -> Result<()> {
        let mut scope = ctx.scope();
        scope.declare_element(node);

        let mut service = Service {
            name: node.attr("name").unwrap_or_default().to_string(),
            ports: Vec::new(),
        };
        for port in node.elements().filter(|e| e.local_name() == "port") {
            let mut port_scope = scope.scope();
            port_scope.declare_element(port);
            let location = port
                .elements()
                .find(|e| e.local_name() == "address")
                .and_then(|address| address.attr("location"))
                .unwrap_or_default()
                .to_string();
            service.ports.push(Port {
                name: port.attr("name").unwrap_or_default().to_string(),
                binding: self
                    .reference(&port_scope, port.attr("binding"))?
                    .unwrap_or_default(),
                location,
            });
        }
        self.services.push(service);
        Ok(())
    }

    /// Resolve every stored QName reference once.
    fn link(&mut self) -> Result<()> {
        let strict = self.config.strict;

        // type names on local elements and derivation bases
        let ids: Vec<TypeId> = self.arena.ids().collect();
        for id in &ids {
            let Some(node) = self.arena.get_mut(*id) else {
                continue;
            };
            match node {
                TypeNode::Complex(complex) => {
                    if let Some(ref base) = complex.base_name {
                        complex.base = resolve_type(&self.schemas, base, "base type", strict)?;
                    }
                    for child in &mut complex.children {
                        if child.type_ref.is_none() {
                            if let Some(ref name) = child.type_name {
                                child.type_ref = resolve_type(&self.schemas, name, &child.name, strict)?;
                            }
                        }
                    }
                }
                TypeNode::Simple(simple) => {
                    if let Some(ref base) = simple.base_name {
                        simple.base = resolve_type(&self.schemas, base, "base type", strict)?;
                    }
                }
            }
        }

        // type names on top-level elements
        let mut resolved = Vec::new();
        for (namespace, schema) in &self.schemas {
            for (name, decl) in &schema.elements {
                if decl.type_ref.is_some() {
                    continue;
                }
                if let Some(ref type_name) = decl.type_name {
                    let ty = resolve_type(&self.schemas, type_name, name, strict)?;
                    resolved.push((namespace.clone(), name.clone(), ty));
                }
            }
        }
        for (namespace, name, ty) in resolved {
            if let Some(decl) = self
                .schemas
                .get_mut(&namespace)
                .and_then(|schema| schema.elements.get_mut(&name))
            {
                decl.type_ref = ty;
            }
        }

        // element references on local elements
        for id in &ids {
            let Some(TypeNode::Complex(complex)) = self.arena.get_mut(*id) else {
                continue;
            };
            for child in &mut complex.children {
                let Some(ref target) = child.ref_name else {
                    continue;
                };
                let referenced = self
                    .schemas
                    .get(target.namespace().unwrap_or_default())
                    .and_then(|schema| schema.elements.get(&target.local));
                match referenced {
                    Some(decl) => {
                        child.namespace = decl.namespace.clone();
                        child.type_name = decl.type_name.clone();
                        child.type_ref = decl.type_ref.clone();
                        child.nillable |= decl.nillable;
                    }
                    None => unresolved(strict, &format!("element reference {}", target))?,
                }
            }
        }

        // message parts
        for message in self.messages.values_mut() {
            for part in &mut message.parts {
                if let Some(ref type_name) = part.type_name {
                    part.type_ref = resolve_type(&self.schemas, type_name, &part.name, strict)?;
                }
                if let Some(ref element) = part.element {
                    let known = self
                        .schemas
                        .get(element.namespace().unwrap_or_default())
                        .is_some_and(|schema| schema.elements.contains_key(&element.local));
                    if !known {
                        unresolved(strict, &format!("element {} of part {}", element, part.name))?;
                    }
                }
            }
        }

        // binding operations take their messages from the port type
        for binding in self.bindings.values_mut() {
            let Some((port_type_name, port_type)) =
                lookup_component(&self.port_types, &binding.port_type)
            else {
                unresolved(
                    strict,
                    &format!("port type {} of binding {}", binding.port_type, binding.name),
                )?;
                continue;
            };
            binding.port_type = port_type_name.clone();
            for operation in &mut binding.operations {
                let Some(abstract_op) = port_type.operation(&operation.name) else {
                    unresolved(
                        strict,
                        &format!("operation {} in port type {}", operation.name, port_type.name),
                    )?;
                    continue;
                };
                operation.input = message_ref(&self.messages, abstract_op.input.as_ref(), strict)?;
                operation.output =
                    message_ref(&self.messages, abstract_op.output.as_ref(), strict)?;
            }
        }

        for service in &mut self.services {
            for port in &mut service.ports {
                match lookup_component(&self.bindings, &port.binding) {
                    Some((binding_name, _)) => port.binding = binding_name.clone(),
                    None => {
                        unresolved(strict, &format!("binding {} of port {}", port.binding, port.name))?
                    }
                }
            }
        }

        Ok(())
    }
}

impl PortType {
    fn operation(&self, name: &str) -> Option<&PortTypeOperation> {
        self.operations.iter().find(|op| op.name == name)
    }
}

fn parse_binding_operation(node: &XmlElement) -> Operation {
    let mut operation = Operation {
        name: node.attr("name").unwrap_or_default().to_string(),
        style: None,
        soap_action: None,
        input: None,
        output: None,
        encoded: false,
    };
    for child in node.elements() {
        match child.local_name() {
            "operation" => {
                operation.soap_action = child
                    .attr("soapAction")
                    .filter(|action| !action.is_empty())
                    .map(String::from);
                operation.style = child.attr("style").and_then(Style::parse);
            }
            "input" => {
                operation.encoded = child
                    .elements()
                    .any(|body| body.local_name() == "body" && body.attr("use") == Some("encoded"));
            }
            _ => {}
        }
    }
    operation
}

/// Components are named by the defining document's target namespace.
fn component_name(target_namespace: &str, name: &str) -> QName {
    if target_namespace.is_empty() {
        QName::unqualified(name)
    } else {
        QName::new(target_namespace, name)
    }
}

/// The first definition of a qualified name wins.
fn register<T>(registry: &mut BTreeMap<QName, T>, name: QName, component: T) {
    if registry.contains_key(&name) {
        debug!(name = %name, "Ignoring duplicate WSDL component");
        return;
    }
    registry.insert(name, component);
}

fn unresolved(strict: bool, what: &str) -> Result<()> {
    if strict {
        return Err(SoapError::Parse(format!("unresolved reference: {}", what)));
    }
    warn!(reference = %what, "Leaving reference unresolved");
    Ok(())
}

fn resolve_type(
    schemas: &BTreeMap<String, Schema>,
    name: &QName,
    owner: &str,
    strict: bool,
) -> Result<Option<super::TypeRef>> {
    match lookup_type(schemas, name) {
        Some(ty) => Ok(Some(ty)),
        None => {
            unresolved(strict, &format!("type {} of {}", name, owner))?;
            Ok(None)
        }
    }
}

fn message_ref(
    messages: &BTreeMap<QName, Message>,
    name: Option<&QName>,
    strict: bool,
) -> Result<Option<MessageRef>> {
    let Some(name) = name else {
        return Ok(None);
    };
    let Some((message_name, message)) = lookup_component(messages, name) else {
        unresolved(strict, &format!("message {}", name))?;
        return Ok(None);
    };
    Ok(Some(MessageRef {
        message: message_name.clone(),
        element: message.parts.iter().find_map(|part| part.element.clone()),
    }))
}
