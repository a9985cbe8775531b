//! XML Schema registry.
//!
//! Type definitions live in a [`TypeArena`] and are addressed by [`TypeId`].
//! Element declarations point at their type through a [`TypeRef`], so types
//! may reference each other in cycles without owning each other.

use crate::error::{Result, SoapError};
use crate::nscontext::{NamespaceContext, QName};
use crate::parser::XmlElement;
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// Index of a type node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) usize);

/// A resolved type reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// Built-in XSD type, by local name (`string`, `int`, ...)
    Builtin(String),
    /// User-defined type node
    Node(TypeId),
}

/// `maxOccurs` of a particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

impl MaxOccurs {
    /// Whether more than one occurrence is allowed.
    pub fn is_many(&self) -> bool {
        match self {
            MaxOccurs::Bounded(n) => *n > 1,
            MaxOccurs::Unbounded => true,
        }
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("unbounded") => MaxOccurs::Unbounded,
            Some(n) => MaxOccurs::Bounded(n.trim().parse().unwrap_or(1)),
            None => MaxOccurs::Bounded(1),
        }
    }
}

/// An element declaration, top-level or local to a complex type.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDecl {
    pub name: String,
    /// Effective namespace: the schema's target namespace for top-level and
    /// qualified local elements, `None` for unqualified ones
    pub namespace: Option<String>,
    /// Declared `type` attribute
    pub type_name: Option<QName>,
    /// Resolved type; `None` for untyped (any) content or unresolved names
    pub type_ref: Option<TypeRef>,
    /// Declared `ref` attribute
    pub ref_name: Option<QName>,
    pub min_occurs: u32,
    pub max_occurs: MaxOccurs,
    pub nillable: bool,
}

impl ElementDecl {
    pub fn qname(&self) -> QName {
        QName {
            namespace: self.namespace.clone(),
            local: self.name.clone(),
        }
    }
}

/// An attribute declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDecl {
    pub name: String,
    pub type_name: Option<QName>,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexType {
    /// `None` for anonymous types
    pub name: Option<String>,
    pub namespace: Option<String>,
    /// Extension/restriction base as declared
    pub base_name: Option<QName>,
    pub base: Option<TypeRef>,
    /// Child elements in declaration order
    pub children: Vec<ElementDecl>,
    pub attributes: Vec<AttributeDecl>,
    /// Contains an `xs:any` wildcard
    pub open: bool,
    /// Text content with attributes (`simpleContent`)
    pub simple_content: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleType {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub base_name: Option<QName>,
    pub base: Option<TypeRef>,
    pub enumerations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeNode {
    Complex(ComplexType),
    Simple(SimpleType),
}

impl TypeNode {
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeNode::Complex(c) => c.name.as_deref(),
            TypeNode::Simple(s) => s.name.as_deref(),
        }
    }

    pub fn qname(&self) -> Option<QName> {
        let (name, namespace) = match self {
            TypeNode::Complex(c) => (c.name.as_ref(), &c.namespace),
            TypeNode::Simple(s) => (s.name.as_ref(), &s.namespace),
        };
        name.map(|local| QName {
            namespace: namespace.clone(),
            local: local.clone(),
        })
    }
}

/// Arena owning every type node of a model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeArena {
    nodes: Vec<TypeNode>,
}

impl TypeArena {
    pub fn alloc(&mut self, node: TypeNode) -> TypeId {
        self.nodes.push(node);
        TypeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeNode> {
        self.nodes.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: TypeId) -> Option<&mut TypeNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.nodes.len()).map(TypeId)
    }

    /// Complex type behind a reference, if any.
    pub fn complex(&self, ty: &TypeRef) -> Option<&ComplexType> {
        match ty {
            TypeRef::Node(id) => match self.get(*id) {
                Some(TypeNode::Complex(c)) => Some(c),
                _ => None,
            },
            TypeRef::Builtin(_) => None,
        }
    }

    /// Child elements of a complex type, base type's children first.
    pub fn effective_children(&self, ty: &TypeRef) -> Vec<&ElementDecl> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.complex(ty).map(|c| (c, ty.clone()));
        while let Some((complex, id)) = current {
            if let TypeRef::Node(node) = id {
                if !seen.insert(node) {
                    break;
                }
            }
            chain.push(complex);
            current = complex
                .base
                .as_ref()
                .and_then(|base| self.complex(base).map(|c| (c, base.clone())));
        }
        chain
            .into_iter()
            .rev()
            .flat_map(|complex| complex.children.iter())
            .collect()
    }

    /// Whether elements of this type carry child elements.
    pub fn has_children(&self, ty: &TypeRef) -> bool {
        !self.effective_children(ty).is_empty()
    }

    /// The XSD primitive a type ultimately derives from, for leaf coercion.
    pub fn primitive<'a>(&'a self, ty: &'a TypeRef) -> Option<&'a str> {
        let mut seen = HashSet::new();
        let mut current = ty;
        loop {
            match current {
                TypeRef::Builtin(name) => return Some(name.as_str()),
                TypeRef::Node(id) => {
                    if !seen.insert(*id) {
                        return None;
                    }
                    let base = match self.get(*id)? {
                        TypeNode::Simple(s) => s.base.as_ref(),
                        TypeNode::Complex(c) if c.simple_content => c.base.as_ref(),
                        TypeNode::Complex(_) => None,
                    };
                    current = base?;
                }
            }
        }
    }
}

/// One logical schema: every fragment sharing a target namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub target_namespace: String,
    pub element_form_qualified: bool,
    pub types: BTreeMap<String, TypeId>,
    pub elements: BTreeMap<String, ElementDecl>,
}

impl Schema {
    pub fn new(target_namespace: impl Into<String>) -> Self {
        Self {
            target_namespace: target_namespace.into(),
            element_form_qualified: false,
            types: BTreeMap::new(),
            elements: BTreeMap::new(),
        }
    }

    /// Fold another fragment of the same namespace into this one. Existing
    /// names win unless `override_existing` is set.
    pub(crate) fn merge(&mut self, other: Schema, override_existing: bool) {
        for (name, id) in other.types {
            if override_existing || !self.types.contains_key(&name) {
                self.types.insert(name, id);
            }
        }
        for (name, element) in other.elements {
            if override_existing || !self.elements.contains_key(&name) {
                self.elements.insert(name, element);
            }
        }
    }
}

/// A schema document referenced from another one.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SchemaReference {
    pub location: String,
    /// Namespace adopted by an `include`d schema that declares none
    pub inherit_namespace: Option<String>,
}

/// Result of parsing one `xs:schema` element.
pub(crate) struct ParsedSchema {
    pub schema: Schema,
    pub references: Vec<SchemaReference>,
}

/// Resolve a QName-valued attribute. An unbound prefix is an error in strict
/// mode and a skipped reference otherwise.
pub(crate) fn resolve_qname(
    ctx: &NamespaceContext,
    raw: &str,
    strict: bool,
) -> Result<Option<QName>> {
    match ctx.resolve_qname(raw) {
        Some(qname) => Ok(Some(qname)),
        None if strict => Err(SoapError::Parse(format!(
            "unresolved namespace prefix in QName '{}'",
            raw
        ))),
        None => {
            warn!(qname = %raw, "Skipping QName with unbound prefix");
            Ok(None)
        }
    }
}

/// Parses `xs:schema` elements into an arena.
pub(crate) struct SchemaParser<'a> {
    arena: &'a mut TypeArena,
    strict: bool,
    target_namespace: String,
    qualified: bool,
}

impl<'a> SchemaParser<'a> {
    pub fn new(arena: &'a mut TypeArena, strict: bool) -> Self {
        Self {
            arena,
            strict,
            target_namespace: String::new(),
            qualified: false,
        }
    }

    /// Parse a schema element. `ctx` must already hold the ancestors'
    /// declarations; the schema's own are declared here.
    pub fn parse(
        mut self,
        node: &XmlElement,
        ctx: &mut NamespaceContext,
        inherit_namespace: Option<&str>,
    ) -> Result<ParsedSchema> {
        let mut scope = ctx.scope();
        scope.declare_element(node);

        self.target_namespace = node
            .attr("targetNamespace")
            .or(inherit_namespace)
            .unwrap_or_default()
            .to_string();
        self.qualified = node.attr("elementFormDefault") == Some("qualified");

        // a chameleon include's unprefixed names belong to the includer
        if node.attr("targetNamespace").is_none()
            && !self.target_namespace.is_empty()
            && scope.get_namespace_uri("", false).is_none()
        {
            scope.add_namespace("", &self.target_namespace, true);
        }

        let mut schema = Schema::new(self.target_namespace.clone());
        schema.element_form_qualified = self.qualified;
        let mut references = Vec::new();

        for child in node.elements() {
            match child.local_name() {
                "element" => {
                    let decl = self.parse_element(child, &mut scope, true)?;
                    schema.elements.entry(decl.name.clone()).or_insert(decl);
                }
                "complexType" => {
                    if let Some(name) = child.attr("name") {
                        let id = self.parse_complex(child, Some(name.to_string()), &mut scope)?;
                        schema.types.entry(name.to_string()).or_insert(id);
                    }
                }
                "simpleType" => {
                    if let Some(name) = child.attr("name") {
                        let id = self.parse_simple(child, Some(name.to_string()), &mut scope)?;
                        schema.types.entry(name.to_string()).or_insert(id);
                    }
                }
                "import" => {
                    if let Some(location) = child.attr("schemaLocation") {
                        references.push(SchemaReference {
                            location: location.to_string(),
                            inherit_namespace: None,
                        });
                    }
                }
                "include" => {
                    if let Some(location) = child.attr("schemaLocation") {
                        references.push(SchemaReference {
                            location: location.to_string(),
                            inherit_namespace: Some(self.target_namespace.clone()),
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(ParsedSchema { schema, references })
    }

    fn resolve(&self, ctx: &NamespaceContext, raw: &str) -> Result<Option<QName>> {
        resolve_qname(ctx, raw, self.strict)
    }

    fn parse_element(
        &mut self,
        node: &XmlElement,
        ctx: &mut NamespaceContext,
        top_level: bool,
    ) -> Result<ElementDecl> {
        let mut scope = ctx.scope();
        scope.declare_element(node);

        let ref_name = match node.attr("ref") {
            Some(raw) => self.resolve(&scope, raw)?,
            None => None,
        };
        let name = node
            .attr("name")
            .map(String::from)
            .or_else(|| ref_name.as_ref().map(|q| q.local.clone()))
            .unwrap_or_default();

        let namespace = if top_level {
            Some(self.target_namespace.clone())
        } else if let Some(ref target) = ref_name {
            target.namespace.clone()
        } else {
            let qualified = match node.attr("form") {
                Some("qualified") => true,
                Some("unqualified") => false,
                _ => self.qualified,
            };
            qualified.then(|| self.target_namespace.clone())
        }
        .filter(|ns| !ns.is_empty());

        let mut type_name = None;
        let mut type_ref = None;
        if let Some(raw) = node.attr("type") {
            type_name = self.resolve(&scope, raw)?;
        } else {
            for child in node.elements() {
                match child.local_name() {
                    "complexType" => {
                        type_ref = Some(TypeRef::Node(self.parse_complex(child, None, &mut scope)?));
                    }
                    "simpleType" => {
                        type_ref = Some(TypeRef::Node(self.parse_simple(child, None, &mut scope)?));
                    }
                    _ => {}
                }
            }
        }

        Ok(ElementDecl {
            name,
            namespace,
            type_name,
            type_ref,
            ref_name,
            min_occurs: node
                .attr("minOccurs")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(1),
            max_occurs: MaxOccurs::parse(node.attr("maxOccurs")),
            nillable: node.attr("nillable") == Some("true"),
        })
    }

    fn parse_complex(
        &mut self,
        node: &XmlElement,
        name: Option<String>,
        ctx: &mut NamespaceContext,
    ) -> Result<TypeId> {
        let mut scope = ctx.scope();
        scope.declare_element(node);

        let mut complex = ComplexType {
            name,
            namespace: Some(self.target_namespace.clone()).filter(|ns| !ns.is_empty()),
            base_name: None,
            base: None,
            children: Vec::new(),
            attributes: Vec::new(),
            open: false,
            simple_content: false,
        };

        self.collect_content(node, &mut complex, &mut scope)?;
        Ok(self.arena.alloc(TypeNode::Complex(complex)))
    }

    fn collect_content(
        &mut self,
        node: &XmlElement,
        complex: &mut ComplexType,
        ctx: &mut NamespaceContext,
    ) -> Result<()> {
        for child in node.elements() {
            match child.local_name() {
                "sequence" | "all" => self.collect_particles(child, complex, false, ctx)?,
                "choice" => self.collect_particles(child, complex, true, ctx)?,
                "attribute" => {
                    if let Some(attribute) = self.parse_attribute(child, ctx)? {
                        complex.attributes.push(attribute);
                    }
                }
                "anyAttribute" => {}
                "complexContent" | "simpleContent" => {
                    let mut scope = ctx.scope();
                    scope.declare_element(child);
                    complex.simple_content = child.local_name() == "simpleContent";
                    for derivation in child.elements() {
                        if matches!(derivation.local_name(), "extension" | "restriction") {
                            let mut inner = scope.scope();
                            inner.declare_element(derivation);
                            if let Some(raw) = derivation.attr("base") {
                                complex.base_name = self.resolve(&inner, raw)?;
                            }
                            self.collect_content(derivation, complex, &mut inner)?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn collect_particles(
        &mut self,
        node: &XmlElement,
        complex: &mut ComplexType,
        optional: bool,
        ctx: &mut NamespaceContext,
    ) -> Result<()> {
        let mut scope = ctx.scope();
        scope.declare_element(node);

        let repeated = MaxOccurs::parse(node.attr("maxOccurs")).is_many();
        for child in node.elements() {
            match child.local_name() {
                "element" => {
                    let mut decl = self.parse_element(child, &mut scope, false)?;
                    if optional {
                        decl.min_occurs = 0;
                    }
                    if repeated {
                        decl.max_occurs = MaxOccurs::Unbounded;
                    }
                    complex.children.push(decl);
                }
                "sequence" | "all" => self.collect_particles(child, complex, optional, &mut scope)?,
                "choice" => self.collect_particles(child, complex, true, &mut scope)?,
                "any" => complex.open = true,
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_attribute(
        &mut self,
        node: &XmlElement,
        ctx: &mut NamespaceContext,
    ) -> Result<Option<AttributeDecl>> {
        let name = match node.attr("name").or_else(|| node.attr("ref")) {
            Some(name) => crate::parser::local_part(name).to_string(),
            None => return Ok(None),
        };
        let mut scope = ctx.scope();
        scope.declare_element(node);
        let type_name = match node.attr("type") {
            Some(raw) => self.resolve(&scope, raw)?,
            None => None,
        };
        Ok(Some(AttributeDecl {
            name,
            type_name,
            required: node.attr("use") == Some("required"),
        }))
    }

    fn parse_simple(
        &mut self,
        node: &XmlElement,
        name: Option<String>,
        ctx: &mut NamespaceContext,
    ) -> Result<TypeId> {
        let mut scope = ctx.scope();
        scope.declare_element(node);

        let mut simple = SimpleType {
            name,
            namespace: Some(self.target_namespace.clone()).filter(|ns| !ns.is_empty()),
            base_name: None,
            base: None,
            enumerations: Vec::new(),
        };

        for child in node.elements() {
            match child.local_name() {
                "restriction" => {
                    if let Some(raw) = child.attr("base") {
                        let mut inner = scope.scope();
                        inner.declare_element(child);
                        simple.base_name = self.resolve(&inner, raw)?;
                    }
                    simple.enumerations = child
                        .elements()
                        .filter(|facet| facet.local_name() == "enumeration")
                        .filter_map(|facet| facet.attr("value").map(String::from))
                        .collect();
                }
                "list" | "union" => {
                    simple.base_name = Some(QName::new(crate::parser::XSD_NS, "string"));
                }
                _ => {}
            }
        }

        Ok(self.arena.alloc(TypeNode::Simple(simple)))
    }
}
