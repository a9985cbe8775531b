//! Native value <-> XML marshalling.
//!
//! Native values are `serde_json::Value` trees. The [`Marshaller`] walks a
//! value (or an element tree) alongside the interface model's type graph,
//! threading a [`NamespaceContext`] so that every namespace is declared once,
//! at the outermost element that needs it.

use crate::config::{MarshalConfig, DEFAULT_IGNORED_NAMESPACES};
use crate::error::{xml_escape, Result, SoapError};
use crate::nscontext::{NamespaceContext, QName};
use crate::parser::{XmlElement, XmlNode, XSI_NS};
use crate::wsdl::{ElementDecl, InterfaceModel, Part, TypeRef};
use serde_json::{Map, Number, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

const CDATA_START: &str = "<![CDATA[";
const CDATA_END: &str = "]]>";

/// XSD primitives decoded as integers.
const INTEGER_TYPES: &[&str] = &[
    "int",
    "integer",
    "long",
    "short",
    "byte",
    "nonNegativeInteger",
    "nonPositiveInteger",
    "positiveInteger",
    "negativeInteger",
    "unsignedLong",
    "unsignedInt",
    "unsignedShort",
    "unsignedByte",
];

/// Custom leaf decoder.
pub type DeserializeFn = Arc<dyn Fn(&str) -> Value + Send + Sync>;

/// Per-type custom decoders, keyed by type local name (`date`,
/// `dateTime`, or a named simple type).
#[derive(Clone, Default)]
pub struct Deserializers {
    by_type: HashMap<String, DeserializeFn>,
}

impl Deserializers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, type_name: impl Into<String>, f: F)
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        self.by_type.insert(type_name.into(), Arc::new(f));
    }

    pub fn get(&self, type_name: &str) -> Option<&DeserializeFn> {
        self.by_type.get(type_name)
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl fmt::Debug for Deserializers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.by_type.keys()).finish()
    }
}

/// Wire shape of a message body.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyShape {
    /// Wrapper element named after the operation, one accessor per part
    Rpc { wrapper: QName, parts: Vec<Part> },
    /// The message's declared element is the body root
    Document { element: QName },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Body root; takes the default namespace
    Root,
    Child,
    /// RPC part accessor; unqualified, inherits the wrapper's namespace
    Accessor,
}

struct ElementSpec<'k> {
    local: &'k str,
    prefix: Option<&'k str>,
    namespace: Option<String>,
    ty: Option<TypeRef>,
    position: Position,
}

/// Model-driven codec between native values and XML.
pub struct Marshaller<'a> {
    model: &'a InterfaceModel,
    options: &'a MarshalConfig,
    ignored_namespaces: Vec<String>,
    deserializers: Option<&'a Deserializers>,
}

impl<'a> Marshaller<'a> {
    pub fn new(model: &'a InterfaceModel, options: &'a MarshalConfig) -> Self {
        Self {
            model,
            options,
            ignored_namespaces: DEFAULT_IGNORED_NAMESPACES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            deserializers: None,
        }
    }

    pub fn with_ignored_namespaces(mut self, prefixes: Vec<String>) -> Self {
        self.ignored_namespaces = prefixes;
        self
    }

    pub fn with_deserializers(mut self, deserializers: &'a Deserializers) -> Self {
        self.deserializers = Some(deserializers);
        self
    }

    /// Serialize `value` as the element `name` of type `ty`.
    pub fn to_xml(
        &self,
        value: &Value,
        name: &QName,
        ty: Option<&TypeRef>,
        ctx: &mut NamespaceContext,
    ) -> Result<String> {
        let spec = ElementSpec {
            local: &name.local,
            prefix: None,
            namespace: name.namespace.clone(),
            ty: ty.cloned(),
            position: Position::Root,
        };
        let mut out = String::new();
        self.write_value(&mut out, &spec, value, ctx)?;
        Ok(out)
    }

    /// Deserialize `node` as a value of type `ty`. `ctx` holds the
    /// ancestors' declarations; the node's own are declared here.
    pub fn from_xml(
        &self,
        node: &XmlElement,
        ty: Option<&TypeRef>,
        ctx: &mut NamespaceContext,
    ) -> Result<Value> {
        let mut scope = ctx.scope();
        scope.declare_element(node);
        self.decode_in_scope(node, ty, &mut scope)
    }

    /// Serialize a message body in the given shape.
    pub fn encode_body(
        &self,
        shape: &BodyShape,
        value: &Value,
        ctx: &mut NamespaceContext,
    ) -> Result<String> {
        match shape {
            BodyShape::Document { element } => {
                let ty = self.model.find_element(element).and_then(|d| d.type_ref.clone());
                self.to_xml(value, element, ty.as_ref(), ctx)
            }
            BodyShape::Rpc { wrapper, parts } => self.encode_rpc(wrapper, parts, value, ctx),
        }
    }

    /// Deserialize a body root element in the given shape.
    pub fn decode_body(
        &self,
        shape: &BodyShape,
        root: &XmlElement,
        ctx: &mut NamespaceContext,
    ) -> Result<Value> {
        match shape {
            BodyShape::Document { element } => {
                let ty = self.model.find_element(element).and_then(|d| d.type_ref.clone());
                self.from_xml(root, ty.as_ref(), ctx)
            }
            BodyShape::Rpc { parts, .. } => {
                let mut scope = ctx.scope();
                scope.declare_element(root);
                let mut map = Map::new();
                for child in root.elements() {
                    let mut child_scope = scope.scope();
                    child_scope.declare_element(child);
                    let part = parts.iter().find(|p| self.part_local(p) == child.local_name());
                    let ty = part.and_then(|p| self.part_type(p));
                    let value = self.decode_in_scope(child, ty.as_ref(), &mut child_scope)?;
                    let key = part.map(|p| p.name.clone()).unwrap_or_else(|| child.local_name().to_string());
                    insert_collapsing(&mut map, key, value);
                }
                Ok(Value::Object(map))
            }
        }
    }

    fn part_local<'p>(&self, part: &'p Part) -> &'p str {
        match part.element {
            Some(ref element) => &element.local,
            None => &part.name,
        }
    }

    fn part_type(&self, part: &Part) -> Option<TypeRef> {
        match part.element {
            Some(ref element) => self.model.find_element(element).and_then(|d| d.type_ref.clone()),
            None => part.type_ref.clone(),
        }
    }

    fn encode_rpc(
        &self,
        wrapper: &QName,
        parts: &[Part],
        value: &Value,
        ctx: &mut NamespaceContext,
    ) -> Result<String> {
        let mut scope = ctx.scope();
        let mut attributes = Vec::new();
        let spec = ElementSpec {
            local: &wrapper.local,
            prefix: None,
            namespace: wrapper.namespace.clone(),
            ty: None,
            position: Position::Root,
        };
        let name = self.element_name(&spec, &mut scope, &mut attributes);

        let mut content = String::new();
        let args = value.as_object();
        let mut written = HashSet::new();
        for part in parts {
            let Some(arg) = args.and_then(|a| a.get(&part.name).or_else(|| a.get(self.part_local(part))))
            else {
                continue;
            };
            written.insert(part.name.as_str());
            written.insert(self.part_local(part));
            let spec = ElementSpec {
                local: self.part_local(part),
                prefix: None,
                namespace: part.element.as_ref().and_then(|e| e.namespace.clone()),
                ty: self.part_type(part),
                position: if part.element.is_some() { Position::Child } else { Position::Accessor },
            };
            self.write_value(&mut content, &spec, arg, &mut scope)?;
        }
        if let Some(args) = args {
            for (key, arg) in args {
                if written.contains(key.as_str()) || self.is_special_key(key) {
                    continue;
                }
                let (prefix, local) = self.split_key(key);
                let spec = ElementSpec {
                    local,
                    prefix,
                    namespace: None,
                    ty: None,
                    position: Position::Accessor,
                };
                self.write_value(&mut content, &spec, arg, &mut scope)?;
            }
        }

        Ok(self.render(&name, &attributes, &content))
    }

    fn write_value(
        &self,
        out: &mut String,
        spec: &ElementSpec<'_>,
        value: &Value,
        ctx: &mut NamespaceContext,
    ) -> Result<()> {
        match value {
            Value::Array(items) if self.options.namespace_array_elements => {
                for item in items {
                    self.write_element(out, spec, item, ctx)?;
                }
                Ok(())
            }
            _ => self.write_element(out, spec, value, ctx),
        }
    }

    fn write_element(
        &self,
        out: &mut String,
        spec: &ElementSpec<'_>,
        value: &Value,
        ctx: &mut NamespaceContext,
    ) -> Result<()> {
        let mut scope = ctx.scope();
        let mut attributes = Vec::new();
        let name = self.element_name(spec, &mut scope, &mut attributes);
        let mut ty = spec.ty.clone();
        let mut content = String::new();

        match value {
            Value::Null => {
                let xsi = xsi_prefix(&mut scope, &mut attributes);
                attributes.push((format!("{}:nil", xsi), "true".to_string()));
                out.push_str(&self.render_empty(&name, &attributes));
                return Ok(());
            }
            Value::Object(map) => {
                if let Some(attrs) = map.get(&self.options.attributes_key) {
                    self.write_attributes(attrs, &mut scope, &mut attributes, &mut ty)?;
                }
                if let Some(text) = map.get(&self.options.value_key) {
                    content.push_str(&scalar_text(text)?);
                }
                if let Some(raw) = map.get(&self.options.xml_key) {
                    match raw {
                        Value::String(raw) => content.push_str(raw),
                        other => content.push_str(&scalar_text(other)?),
                    }
                }
                self.write_children(&mut content, map, ty.as_ref(), spec.namespace.as_deref(), &mut scope)?;
            }
            Value::Array(items) => {
                // items share this element
                for item in items {
                    match item {
                        Value::Object(map) => {
                            self.write_children(&mut content, map, ty.as_ref(), spec.namespace.as_deref(), &mut scope)?
                        }
                        other => content.push_str(&scalar_text(other)?),
                    }
                }
            }
            scalar => content.push_str(&scalar_text(scalar)?),
        }

        out.push_str(&self.render(&name, &attributes, &content));
        Ok(())
    }

    fn render(&self, name: &str, attributes: &[(String, String)], content: &str) -> String {
        if content.is_empty() && self.options.use_empty_tag {
            return self.render_empty(name, attributes);
        }
        format!("<{}{}>{}</{}>", name, render_attributes(attributes), content, name)
    }

    fn render_empty(&self, name: &str, attributes: &[(String, String)]) -> String {
        format!("<{}{}/>", name, render_attributes(attributes))
    }

    /// Qualified tag name for `spec`, adding any namespace declarations it
    /// needs to `attributes`.
    fn element_name(
        &self,
        spec: &ElementSpec<'_>,
        scope: &mut NamespaceContext,
        attributes: &mut Vec<(String, String)>,
    ) -> String {
        if spec.position == Position::Root {
            if let Some(ref root) = self.options.override_root_element {
                for attr in &root.xmlns_attributes {
                    attributes.push((attr.name.clone(), attr.value.clone()));
                    if attr.name == "xmlns" {
                        scope.declare_namespace("", &attr.value);
                    } else if let Some(prefix) = attr.name.strip_prefix("xmlns:") {
                        scope.declare_namespace(prefix, &attr.value);
                    }
                }
                return qualify(&root.namespace, spec.local);
            }
        }

        if let Some(prefix) = spec.prefix {
            if let Some(ref ns) = spec.namespace {
                if scope.get_namespace_uri(prefix, false) != Some(ns.as_str())
                    && scope.declare_namespace(prefix, ns)
                {
                    attributes.push((format!("xmlns:{}", prefix), ns.clone()));
                }
            }
            return qualify(prefix, spec.local);
        }

        let default_ns = scope.get_namespace_uri("", false).map(String::from);
        match spec.namespace {
            Some(ref ns) => {
                if default_ns.as_deref() == Some(ns.as_str()) {
                    return spec.local.to_string();
                }
                if spec.position == Position::Root {
                    scope.declare_namespace("", ns);
                    attributes.push(("xmlns".to_string(), ns.clone()));
                    return spec.local.to_string();
                }
                let prefix = scope.register_namespace(ns);
                if scope.declare_namespace(&prefix, ns) {
                    attributes.push((format!("xmlns:{}", prefix), ns.clone()));
                }
                qualify(&prefix, spec.local)
            }
            None => {
                let inherits = spec.position == Position::Accessor;
                if !inherits && default_ns.is_some_and(|ns| !ns.is_empty()) {
                    scope.declare_namespace("", "");
                    attributes.push(("xmlns".to_string(), String::new()));
                }
                spec.local.to_string()
            }
        }
    }

    fn write_attributes(
        &self,
        attrs: &Value,
        scope: &mut NamespaceContext,
        attributes: &mut Vec<(String, String)>,
        ty: &mut Option<TypeRef>,
    ) -> Result<()> {
        let Value::Object(attrs) = attrs else {
            return Err(SoapError::Parse(format!(
                "'{}' must hold an object of attributes",
                self.options.attributes_key
            )));
        };

        // declarations first so prefixed values below can resolve
        for (key, value) in attrs {
            let value = scalar_attribute(key, value)?;
            if key == "xmlns" {
                scope.declare_namespace("", &value);
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.declare_namespace(prefix, &value);
            }
        }

        for (key, value) in attrs {
            let value = scalar_attribute(key, value)?;
            if let Some(("xsi", local)) = key.split_once(':') {
                if scope.get_namespace_uri("xsi", false).is_none() {
                    scope.declare_namespace("xsi", XSI_NS);
                    attributes.push(("xmlns:xsi".to_string(), XSI_NS.to_string()));
                }
                if local == "type" {
                    if let Some(found) = scope
                        .resolve_qname(&value)
                        .and_then(|q| self.model.find_type(&q))
                    {
                        *ty = Some(found);
                    }
                }
            }
            attributes.push((key.clone(), xml_escape(&value)));
        }
        Ok(())
    }

    fn write_children(
        &self,
        out: &mut String,
        map: &Map<String, Value>,
        ty: Option<&TypeRef>,
        parent_namespace: Option<&str>,
        scope: &mut NamespaceContext,
    ) -> Result<()> {
        let decls = ty
            .map(|t| self.model.arena().effective_children(t))
            .unwrap_or_default();

        let mut children = Vec::new();
        for (key, value) in map {
            if self.is_special_key(key) {
                continue;
            }
            let (prefix, local) = self.split_key(key);
            let key_namespace = prefix.and_then(|p| self.prefix_namespace(p, scope));
            let matched = match_decl(&decls, local, key_namespace.as_deref());
            let order = matched.map(|(index, _)| index).unwrap_or(usize::MAX);
            children.push((order, key.as_str(), value, matched.map(|(_, decl)| decl), key_namespace));
        }
        // schema order first, the rest in the value's own order
        children.sort_by_key(|(order, ..)| *order);

        for (_, key, value, decl, key_namespace) in children {
            let (prefix, local) = self.split_key(key);
            let spec = match decl {
                Some(decl) => ElementSpec {
                    local,
                    prefix,
                    namespace: decl.namespace.clone(),
                    ty: decl.type_ref.clone(),
                    position: Position::Child,
                },
                None => ElementSpec {
                    local,
                    prefix,
                    namespace: match prefix {
                        Some(_) => key_namespace,
                        None => parent_namespace.map(String::from),
                    },
                    ty: None,
                    position: Position::Child,
                },
            };
            self.write_value(out, &spec, value, scope)?;
        }
        Ok(())
    }

    /// Namespace of an explicit key prefix: the visible binding, else the
    /// WSDL root's declaration.
    fn prefix_namespace(&self, prefix: &str, scope: &NamespaceContext) -> Option<String> {
        scope
            .get_namespace_uri(prefix, false)
            .map(String::from)
            .or_else(|| {
                self.model
                    .namespaces()
                    .iter()
                    .find(|(p, _)| p == prefix)
                    .map(|(_, uri)| uri.clone())
            })
    }

    fn is_special_key(&self, key: &str) -> bool {
        key == self.options.attributes_key
            || key == self.options.value_key
            || key == self.options.xml_key
    }

    /// Split `prefix:local`, dropping ignored prefixes.
    fn split_key<'k>(&self, key: &'k str) -> (Option<&'k str>, &'k str) {
        match key.split_once(':') {
            Some((prefix, local)) if self.ignored_namespaces.iter().any(|p| p == prefix) => {
                (None, local)
            }
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, key),
        }
    }

    fn decode_in_scope(
        &self,
        node: &XmlElement,
        ty: Option<&TypeRef>,
        scope: &mut NamespaceContext,
    ) -> Result<Value> {
        let mut ty = ty.cloned();
        let mut attributes = Map::new();
        for (key, value) in node.plain_attributes() {
            if let Some((prefix, local)) = key.split_once(':') {
                if scope.get_namespace_uri(prefix, false) == Some(XSI_NS) {
                    match local {
                        "nil" if value == "true" || value == "1" => return Ok(Value::Null),
                        "type" => {
                            if let Some(found) = scope
                                .resolve_qname(value)
                                .and_then(|q| self.model.find_type(&q))
                            {
                                ty = Some(found);
                            }
                        }
                        _ => {}
                    }
                }
            }
            attributes.insert(key.to_string(), Value::String(value.to_string()));
        }

        let elements: Vec<&XmlElement> = node.elements().collect();
        if elements.is_empty() {
            let value = self.decode_leaf(node, ty.as_ref());
            if attributes.is_empty() {
                return Ok(value);
            }
            let mut map = Map::new();
            map.insert(self.options.attributes_key.clone(), Value::Object(attributes));
            if value != Value::String(String::new()) && value != Value::Object(Map::new()) {
                map.insert(self.options.value_key.clone(), value);
            }
            return Ok(Value::Object(map));
        }

        let decls = ty
            .as_ref()
            .map(|t| self.model.arena().effective_children(t))
            .unwrap_or_default();

        let mut map = Map::new();
        if !attributes.is_empty() {
            map.insert(self.options.attributes_key.clone(), Value::Object(attributes));
        }

        let mut repeated = HashSet::new();
        for child in elements {
            let mut child_scope = scope.scope();
            child_scope.declare_element(child);
            let namespace = child_scope.element_namespace(child);
            let decl = match_decl(&decls, child.local_name(), namespace.as_deref()).map(|(_, d)| d);

            let key = child.local_name().to_string();
            if self.options.force_arrays || decl.is_some_and(|d| d.max_occurs.is_many()) {
                repeated.insert(key.clone());
            }
            let value =
                self.decode_in_scope(child, decl.and_then(|d| d.type_ref.as_ref()), &mut child_scope)?;
            insert_collapsing(&mut map, key, value);
        }

        for key in repeated {
            if let Some(value) = map.get_mut(&key) {
                if !value.is_array() {
                    *value = Value::Array(vec![value.take()]);
                }
            }
        }

        Ok(Value::Object(map))
    }

    fn decode_leaf(&self, node: &XmlElement, ty: Option<&TypeRef>) -> Value {
        if node.has_cdata() {
            let verbatim: String = node
                .children
                .iter()
                .filter_map(|n| match n {
                    XmlNode::CData(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            return Value::String(verbatim);
        }

        let raw = node.text();
        let text = if self.options.preserve_whitespace {
            raw.as_str()
        } else {
            raw.trim()
        };

        if text.is_empty() {
            if let Some(ty) = ty {
                if self.model.arena().complex(ty).is_some_and(|c| !c.simple_content) {
                    return Value::Object(Map::new());
                }
            }
        }
        self.coerce(text, ty)
    }

    fn coerce(&self, text: &str, ty: Option<&TypeRef>) -> Value {
        let Some(ty) = ty else {
            return Value::String(text.to_string());
        };
        let primitive = self.model.arena().primitive(ty);

        if let Some(deserializers) = self.deserializers {
            let own_name = match ty {
                TypeRef::Builtin(name) => Some(name.as_str()),
                TypeRef::Node(id) => self.model.arena().get(*id).and_then(|n| n.name()),
            };
            if let Some(f) = own_name
                .and_then(|n| deserializers.get(n))
                .or_else(|| primitive.and_then(|p| deserializers.get(p)))
            {
                return f(text);
            }
        }

        match primitive {
            Some(p) if INTEGER_TYPES.contains(&p) => text
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| text.parse::<u64>().map(Value::from))
                .unwrap_or_else(|_| Value::String(text.to_string())),
            Some("decimal" | "float" | "double") => text
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(text.to_string())),
            Some("boolean") => Value::Bool(text == "true" || text == "1"),
            _ => Value::String(text.to_string()),
        }
    }
}

/// Find the declaration an element named `local` in `namespace` maps to.
/// Among same-named declarations the one in the element's namespace wins.
fn match_decl<'d>(
    decls: &[&'d ElementDecl],
    local: &str,
    namespace: Option<&str>,
) -> Option<(usize, &'d ElementDecl)> {
    let mut candidates = decls
        .iter()
        .enumerate()
        .filter(|(_, d)| d.name == local)
        .map(|(i, d)| (i, *d));
    let first = candidates.next()?;
    if first.1.namespace.as_deref() == namespace || namespace.is_none() {
        return Some(first);
    }
    candidates
        .find(|(_, d)| d.namespace.as_deref() == namespace)
        .or(Some(first))
}

fn insert_collapsing(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

fn qualify(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

fn render_attributes(attributes: &[(String, String)]) -> String {
    attributes
        .iter()
        .map(|(k, v)| format!(" {}=\"{}\"", k, v))
        .collect()
}

fn xsi_prefix(scope: &mut NamespaceContext, attributes: &mut Vec<(String, String)>) -> String {
    if let Some(prefix) = scope.get_prefix(XSI_NS, false) {
        return prefix.to_string();
    }
    scope.declare_namespace("xsi", XSI_NS);
    attributes.push(("xmlns:xsi".to_string(), XSI_NS.to_string()));
    "xsi".to_string()
}

/// Text content for a scalar. CDATA-wrapped strings pass through verbatim.
fn scalar_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) if s.starts_with(CDATA_START) && s.ends_with(CDATA_END) => Ok(s.clone()),
        Value::String(s) => Ok(xml_escape(s)),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(SoapError::Parse(format!("expected a scalar value, got {}", other))),
    }
}

fn scalar_attribute(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(SoapError::Parse(format!("attribute '{}' must be a scalar", key))),
    }
}
