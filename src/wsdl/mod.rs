//! Interface model.
//!
//! An [`InterfaceModel`] is built once from a WSDL document and everything it
//! transitively imports. All QName references are resolved while building;
//! afterwards the model is read-only and meant to be shared as
//! `Arc<InterfaceModel>`.

mod builder;
pub mod loader;
pub mod schema;

pub use loader::{DocumentLoader, FsLoader, MemoryLoader};
pub use schema::{
    AttributeDecl, ComplexType, ElementDecl, MaxOccurs, Schema, SimpleType, TypeArena, TypeId,
    TypeNode, TypeRef,
};

use crate::config::WsdlConfig;
use crate::error::Result;
use crate::nscontext::QName;
use crate::parser::XSD_NS;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// SOAP encoding namespace; its types are treated like XSD built-ins.
pub const SOAP_ENC_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Binding style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Rpc,
    #[default]
    Document,
}

impl Style {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rpc" => Some(Style::Rpc),
            "document" => Some(Style::Document),
            _ => None,
        }
    }
}

impl std::fmt::Display for Style {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Style::Rpc => write!(f, "rpc"),
            Style::Document => write!(f, "document"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub name: String,
    pub ports: Vec<Port>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub name: String,
    /// Qualified binding name
    pub binding: QName,
    /// `soap:address` location
    pub location: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    /// Target namespace of the defining document
    pub namespace: Option<String>,
    pub port_type: QName,
    /// Nominal style, from the SOAP binding extension element
    pub style: Style,
    /// Operations in document order
    pub operations: Vec<Operation>,
}

impl Binding {
    pub fn qname(&self) -> QName {
        QName {
            namespace: self.namespace.clone(),
            local: self.name.clone(),
        }
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: String,
    /// Operation-level style override
    pub style: Option<Style>,
    pub soap_action: Option<String>,
    pub input: Option<MessageRef>,
    pub output: Option<MessageRef>,
    /// `use="encoded"` on the input body
    pub encoded: bool,
}

impl Operation {
    /// The operation's declared style, falling back to the binding's.
    pub fn effective_style(&self, binding_style: Style) -> Style {
        self.style.unwrap_or(binding_style)
    }

    /// One-way operations have no output message.
    pub fn is_one_way(&self) -> bool {
        self.output.is_none()
    }
}

/// Reference from a binding operation to a message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRef {
    pub message: QName,
    /// Element of the message's element part, the document-style body root
    pub element: Option<QName>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortType {
    pub name: String,
    pub operations: Vec<PortTypeOperation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortTypeOperation {
    pub name: String,
    /// Qualified input message name
    pub input: Option<QName>,
    pub output: Option<QName>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub name: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub name: String,
    pub element: Option<QName>,
    pub type_name: Option<QName>,
    pub type_ref: Option<TypeRef>,
}

/// The parsed, linked interface description.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceModel {
    pub(crate) target_namespace: String,
    pub(crate) services: Vec<Service>,
    pub(crate) bindings: BTreeMap<QName, Binding>,
    pub(crate) port_types: BTreeMap<QName, PortType>,
    pub(crate) messages: BTreeMap<QName, Message>,
    pub(crate) schemas: BTreeMap<String, Schema>,
    pub(crate) arena: TypeArena,
    pub(crate) namespaces: Vec<(String, String)>,
    pub(crate) source: String,
    pub(crate) location: String,
}

impl InterfaceModel {
    /// Build a model from WSDL text. Imports can only be resolved by
    /// [`InterfaceModel::parse_with_loader`].
    pub fn parse(xml: &str, config: &WsdlConfig) -> Result<Self> {
        Self::parse_with_loader(xml, "service.wsdl", &MemoryLoader::new(), config)
    }

    /// Build a model from WSDL text located at `location`; imports are
    /// resolved relative to it and fetched through `loader`.
    pub fn parse_with_loader(
        xml: &str,
        location: &str,
        loader: &dyn DocumentLoader,
        config: &WsdlConfig,
    ) -> Result<Self> {
        let url = loader::resolve_location(location)?;
        builder::ModelBuilder::new(loader, config).build(url, xml.to_string())
    }

    /// Fetch the root document through `loader` and build a model.
    pub fn load(location: &str, loader: &dyn DocumentLoader, config: &WsdlConfig) -> Result<Self> {
        let url = loader::resolve_location(location)?;
        let source = loader.load(&url)?;
        builder::ModelBuilder::new(loader, config).build(url, source)
    }

    /// Load a WSDL file and its imports from disk.
    pub fn open(path: impl AsRef<Path>, config: &WsdlConfig) -> Result<Self> {
        let url = loader::file_url(path.as_ref())?;
        let source = FsLoader.load(&url)?;
        builder::ModelBuilder::new(&FsLoader, config).build(url, source)
    }

    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    pub fn binding(&self, name: &QName) -> Option<&Binding> {
        lookup_component(&self.bindings, name).map(|(_, binding)| binding)
    }

    pub fn port_type(&self, name: &QName) -> Option<&PortType> {
        lookup_component(&self.port_types, name).map(|(_, port_type)| port_type)
    }

    pub fn message(&self, name: &QName) -> Option<&Message> {
        lookup_component(&self.messages, name).map(|(_, message)| message)
    }

    pub fn schema(&self, namespace: &str) -> Option<&Schema> {
        self.schemas.get(namespace)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.values()
    }

    pub fn arena(&self) -> &TypeArena {
        &self.arena
    }

    /// Namespace declarations of the root WSDL document.
    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }

    /// The root WSDL text as loaded.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Absolute URL of the root WSDL document.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Look up a top-level element declaration.
    pub fn find_element(&self, name: &QName) -> Option<&ElementDecl> {
        self.schemas
            .get(name.namespace().unwrap_or_default())?
            .elements
            .get(&name.local)
    }

    /// Look up a named type, built-ins included.
    pub fn find_type(&self, name: &QName) -> Option<TypeRef> {
        lookup_type(&self.schemas, name)
    }

    /// SOAPAction a client sends for `operation`: the declared one, or the
    /// target namespace joined with the operation name.
    pub fn soap_action(&self, operation: &Operation) -> String {
        match operation.soap_action {
            Some(ref action) => action.clone(),
            None => {
                let tns = self.target_namespace.trim_end_matches('/');
                format!("{}/{}", tns, operation.name)
            }
        }
    }

    /// Describe every service, port and operation with the shape of its
    /// input and output messages.
    pub fn describe_services(&self) -> Value {
        let mut services = Map::new();
        for service in &self.services {
            let mut ports = Map::new();
            for port in &service.ports {
                let mut operations = Map::new();
                if let Some(binding) = self.binding(&port.binding) {
                    for operation in &binding.operations {
                        let style = operation.effective_style(binding.style);
                        let mut description = Map::new();
                        if let Some(ref input) = operation.input {
                            description.insert("input".into(), self.describe_message(input, style));
                        }
                        if let Some(ref output) = operation.output {
                            description.insert("output".into(), self.describe_message(output, style));
                        }
                        operations.insert(operation.name.clone(), Value::Object(description));
                    }
                }
                ports.insert(port.name.clone(), Value::Object(operations));
            }
            services.insert(service.name.clone(), Value::Object(ports));
        }
        Value::Object(services)
    }

    fn describe_message(&self, reference: &MessageRef, style: Style) -> Value {
        let message = match self.message(&reference.message) {
            Some(message) => message,
            None => return Value::Null,
        };
        let mut stack = Vec::new();

        if style == Style::Document {
            if let Some(decl) = reference.element.as_ref().and_then(|e| self.find_element(e)) {
                return self.describe_type(decl.type_ref.as_ref(), &mut stack);
            }
        }

        let mut parts = Map::new();
        for part in &message.parts {
            let ty = match part.element {
                Some(ref element) => self.find_element(element).and_then(|d| d.type_ref.as_ref()),
                None => part.type_ref.as_ref(),
            };
            parts.insert(part.name.clone(), self.describe_type(ty, &mut stack));
        }
        Value::Object(parts)
    }

    fn describe_type(&self, ty: Option<&TypeRef>, stack: &mut Vec<TypeId>) -> Value {
        let id = match ty {
            None => return Value::String("anyType".to_string()),
            Some(TypeRef::Builtin(name)) => return Value::String(name.clone()),
            Some(TypeRef::Node(id)) => *id,
        };

        let node = match self.arena.get(id) {
            Some(node) => node,
            None => return Value::Null,
        };
        if stack.contains(&id) {
            let name = node.qname().map(|q| q.to_string()).unwrap_or_default();
            return Value::String(name);
        }

        match node {
            TypeNode::Simple(_) => {
                let primitive = ty.and_then(|t| self.arena.primitive(t)).unwrap_or("string");
                Value::String(primitive.to_string())
            }
            TypeNode::Complex(complex) if complex.simple_content => {
                let primitive = ty.and_then(|t| self.arena.primitive(t)).unwrap_or("string");
                Value::String(primitive.to_string())
            }
            TypeNode::Complex(_) => {
                stack.push(id);
                let mut fields = Map::new();
                let ty = TypeRef::Node(id);
                for child in self.arena.effective_children(&ty) {
                    let key = if child.max_occurs.is_many() {
                        format!("{}[]", child.name)
                    } else {
                        child.name.clone()
                    };
                    fields.insert(key, self.describe_type(child.type_ref.as_ref(), stack));
                }
                stack.pop();
                Value::Object(fields)
            }
        }
    }
}

/// Find a WSDL component by qualified name. A reference whose namespace
/// matches nothing falls back to the component with the same local name,
/// provided exactly one exists.
pub(crate) fn lookup_component<'m, T>(
    registry: &'m BTreeMap<QName, T>,
    name: &QName,
) -> Option<(&'m QName, &'m T)> {
    if let Some(found) = registry.get_key_value(name) {
        return Some(found);
    }
    let mut candidates = registry.iter().filter(|(key, _)| key.local == name.local);
    match (candidates.next(), candidates.next()) {
        (Some(found), None) => Some(found),
        _ => None,
    }
}

/// Resolve a type QName against merged schemas.
pub(crate) fn lookup_type(schemas: &BTreeMap<String, Schema>, name: &QName) -> Option<TypeRef> {
    match name.namespace() {
        Some(XSD_NS) | Some(SOAP_ENC_NS) => Some(TypeRef::Builtin(name.local.clone())),
        namespace => schemas
            .get(namespace.unwrap_or_default())?
            .types
            .get(&name.local)
            .map(|id| TypeRef::Node(*id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::HELLO_WSDL;
    use serde_json::json;

    const CYCLIC_WSDL: &str = r#"<definitions targetNamespace="urn:tree"
   xmlns="http://schemas.xmlsoap.org/wsdl/"
   xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
   xmlns:tns="urn:tree"
   xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <types>
    <xs:schema targetNamespace="urn:tree" elementFormDefault="qualified">
      <xs:complexType name="Node">
        <xs:sequence>
          <xs:element name="label" type="xs:string"/>
          <xs:element name="child" type="tns:Node" minOccurs="0" maxOccurs="unbounded"/>
        </xs:sequence>
      </xs:complexType>
      <xs:element name="GetTree" type="tns:Node"/>
      <xs:element name="GetTreeResponse" type="tns:Node"/>
    </xs:schema>
  </types>
  <message name="In"><part name="body" element="tns:GetTree"/></message>
  <message name="Out"><part name="body" element="tns:GetTreeResponse"/></message>
  <portType name="TreePort">
    <operation name="GetTree"><input message="tns:In"/><output message="tns:Out"/></operation>
  </portType>
  <binding name="TreeBinding" type="tns:TreePort">
    <soap:binding style="document"/>
    <operation name="GetTree"><soap:operation soapAction=""/></operation>
  </binding>
  <service name="TreeService">
    <port name="TreePort" binding="tns:TreeBinding">
      <soap:address location="http://localhost/tree"/>
    </port>
  </service>
</definitions>"#;

    #[test]
    fn test_parse_hello_wsdl() {
        let model = InterfaceModel::parse(HELLO_WSDL, &WsdlConfig::default()).unwrap();
        assert_eq!(model.target_namespace(), "http://www.examples.com/wsdl/HelloService.wsdl");

        let service = model.service("Hello_Service").unwrap();
        let hello = |local: &str| QName::new(model.target_namespace(), local);
        assert_eq!(service.ports[0].binding, hello("Hello_Binding"));
        assert_eq!(service.ports[0].location, "http://localhost:51515/SayHello/");

        let binding = model.binding(&hello("Hello_Binding")).unwrap();
        assert_eq!(binding.style, Style::Rpc);
        let op = binding.operation("sayHello").unwrap();
        assert_eq!(op.soap_action.as_deref(), Some("sayHello"));
        assert_eq!(op.input.as_ref().unwrap().message, hello("SayHelloRequest"));
        assert_eq!(op.output.as_ref().unwrap().message, hello("SayHelloResponse"));

        let part = &model.message(&hello("SayHelloRequest")).unwrap().parts[0];
        assert_eq!(part.type_ref, Some(TypeRef::Builtin("string".to_string())));
    }

    #[test]
    fn test_cyclic_types_link_by_index() {
        let model = InterfaceModel::parse(CYCLIC_WSDL, &WsdlConfig::default()).unwrap();
        let decl = model.find_element(&QName::new("urn:tree", "GetTree")).unwrap();
        let ty = decl.type_ref.clone().unwrap();
        let children = model.arena().effective_children(&ty);
        assert_eq!(children[1].type_ref, Some(ty.clone()));

        let op = model.binding(&QName::new("urn:tree", "TreeBinding")).unwrap().operation("GetTree").unwrap();
        // empty soapAction is treated as absent
        assert_eq!(op.soap_action, None);
        assert_eq!(
            op.input.as_ref().unwrap().element,
            Some(QName::new("urn:tree", "GetTree"))
        );
    }

    #[test]
    fn test_describe_services_is_cycle_safe() {
        let model = InterfaceModel::parse(CYCLIC_WSDL, &WsdlConfig::default()).unwrap();
        let description = model.describe_services();
        assert_eq!(
            description["TreeService"]["TreePort"]["GetTree"]["input"],
            json!({ "label": "string", "child[]": "{urn:tree}Node" })
        );
    }

    #[test]
    fn test_describe_rpc_parts() {
        let model = InterfaceModel::parse(HELLO_WSDL, &WsdlConfig::default()).unwrap();
        let description = model.describe_services();
        assert_eq!(
            description["Hello_Service"]["Hello_Port"]["sayHello"],
            json!({ "input": { "firstName": "string" }, "output": { "greeting": "string" } })
        );
    }

    #[test]
    fn test_default_soap_action() {
        let model = InterfaceModel::parse(CYCLIC_WSDL, &WsdlConfig::default()).unwrap();
        let op = model.binding(&QName::new("urn:tree", "TreeBinding")).unwrap().operation("GetTree").unwrap();
        assert_eq!(model.soap_action(op), "urn:tree/GetTree");
    }

    #[test]
    fn test_source_and_namespaces_kept() {
        let model = InterfaceModel::parse(HELLO_WSDL, &WsdlConfig::default()).unwrap();
        assert_eq!(model.source(), HELLO_WSDL);
        assert!(model
            .namespaces()
            .iter()
            .any(|(prefix, uri)| prefix == "tns" && uri == model.target_namespace()));
        assert_eq!(model.location(), "file:///service.wsdl");
    }

    #[test]
    fn test_rejects_non_wsdl_root() {
        assert!(InterfaceModel::parse("<root/>", &WsdlConfig::default()).is_err());
        assert!(InterfaceModel::parse("<definitions>", &WsdlConfig::default()).is_err());
    }
}
