//! Lexical namespace scoping.
//!
//! A [`NamespaceContext`] is a stack of prefix/URI scopes. Tree builders push
//! a scope per element (through [`NamespaceContext::scope`], which pops again
//! when the guard drops) and tree walkers declare each element's `xmlns`
//! attributes into the scope they pushed for it. Lookups fall through to
//! enclosing scopes.

use crate::parser::XmlElement;
use std::fmt;
use std::ops::{Deref, DerefMut};

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";

/// A namespace-qualified name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    /// Namespace URI; `None` for unqualified names
    pub namespace: Option<String>,
    /// Local part
    pub local: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local: local.into(),
        }
    }

    /// An unqualified name.
    pub fn unqualified(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Some(ref ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

/// One prefix binding inside a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceMapping {
    pub prefix: String,
    pub uri: String,
    /// Whether an `xmlns` attribute has been emitted for it at this scope
    pub declared: bool,
}

#[derive(Debug, Clone, Default)]
struct NamespaceScope {
    mappings: Vec<NamespaceMapping>,
}

impl NamespaceScope {
    fn get(&self, prefix: &str) -> Option<&NamespaceMapping> {
        self.mappings.iter().find(|m| m.prefix == prefix)
    }

    fn set(&mut self, mapping: NamespaceMapping) {
        match self.mappings.iter_mut().find(|m| m.prefix == mapping.prefix) {
            Some(existing) => *existing = mapping,
            None => self.mappings.push(mapping),
        }
    }
}

/// Stack of namespace scopes; the top of the stack is the current scope.
#[derive(Debug, Clone)]
pub struct NamespaceContext {
    scopes: Vec<NamespaceScope>,
    prefix_count: usize,
}

impl Default for NamespaceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceContext {
    /// Create a context holding a single (root) scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![NamespaceScope::default()],
            prefix_count: 0,
        }
    }

    /// Number of scopes on the stack, root included.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(NamespaceScope::default());
    }

    /// Pop the current scope. The root scope is never popped.
    pub fn pop_scope(&mut self) -> bool {
        if self.scopes.len() > 1 {
            self.scopes.pop();
            true
        } else {
            false
        }
    }

    /// Push a scope that is popped when the returned guard drops.
    pub fn scope(&mut self) -> ScopeGuard<'_> {
        self.push_scope();
        ScopeGuard { ctx: self }
    }

    fn current(&mut self) -> &mut NamespaceScope {
        if self.scopes.is_empty() {
            self.scopes.push(NamespaceScope::default());
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn mapping(&self, prefix: &str, local_only: bool) -> Option<&NamespaceMapping> {
        let mut scopes = self.scopes.iter().rev();
        if local_only {
            return scopes.next().and_then(|scope| scope.get(prefix));
        }
        scopes.find_map(|scope| scope.get(prefix))
    }

    /// Look up the namespace URI bound to `prefix`.
    pub fn get_namespace_uri(&self, prefix: &str, local_only: bool) -> Option<&str> {
        match prefix {
            "xml" => Some(XML_NS),
            "xmlns" => Some(XMLNS_NS),
            _ => self.mapping(prefix, local_only).map(|m| m.uri.as_str()),
        }
    }

    /// Look up a prefix currently bound to `uri`. Prefixes shadowed by a
    /// nearer scope are skipped.
    pub fn get_prefix(&self, uri: &str, local_only: bool) -> Option<&str> {
        match uri {
            XML_NS => return Some("xml"),
            XMLNS_NS => return Some("xmlns"),
            _ => {}
        }
        let limit = if local_only { 1 } else { self.scopes.len() };
        for scope in self.scopes.iter().rev().take(limit) {
            for mapping in &scope.mappings {
                if mapping.uri == uri
                    && self.get_namespace_uri(&mapping.prefix, false) == Some(uri)
                {
                    return Some(mapping.prefix.as_str());
                }
            }
        }
        None
    }

    /// Add an undeclared mapping to the current scope. Returns false when
    /// the same mapping is already visible.
    pub fn add_namespace(&mut self, prefix: &str, uri: &str, local_only: bool) -> bool {
        if self.get_namespace_uri(prefix, local_only) == Some(uri) {
            return false;
        }
        self.current().set(NamespaceMapping {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
            declared: false,
        });
        true
    }

    /// Mark `prefix -> uri` as declared at the current node. Returns true when
    /// the declaration is net-new, i.e. an `xmlns` attribute must be emitted.
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) -> bool {
        if let Some(mapping) = self.mapping(prefix, false) {
            if mapping.uri == uri && mapping.declared {
                return false;
            }
        }
        self.current().set(NamespaceMapping {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
            declared: true,
        });
        true
    }

    /// Return the visible prefix for `uri`, or generate the next unused
    /// `ns<N>` prefix and bind it (undeclared) in the current scope.
    pub fn register_namespace(&mut self, uri: &str) -> String {
        if let Some(prefix) = self.get_prefix(uri, false) {
            return prefix.to_string();
        }
        let prefix = loop {
            self.prefix_count += 1;
            let candidate = format!("ns{}", self.prefix_count);
            if self.get_namespace_uri(&candidate, false).is_none() {
                break candidate;
            }
        };
        self.add_namespace(&prefix, uri, true);
        prefix
    }

    /// Declare every `xmlns` attribute of `element` in the current scope.
    pub fn declare_element(&mut self, element: &XmlElement) {
        for (prefix, uri) in element.namespace_declarations() {
            self.declare_namespace(prefix, uri);
        }
    }

    /// Resolve a `prefix:local` (or bare `local`) name against the visible
    /// scopes. Bare names take the default namespace. Returns `None` when the
    /// prefix is not bound.
    pub fn resolve_qname(&self, name: &str) -> Option<QName> {
        match name.split_once(':') {
            Some((prefix, local)) => self.get_namespace_uri(prefix, false).map(|uri| QName {
                namespace: Some(uri.to_string()),
                local: local.to_string(),
            }),
            None => Some(QName {
                namespace: self
                    .get_namespace_uri("", false)
                    .filter(|uri| !uri.is_empty())
                    .map(String::from),
                local: name.to_string(),
            }),
        }
    }

    /// Namespace of an element whose declarations are already in scope.
    pub fn element_namespace(&self, element: &XmlElement) -> Option<String> {
        self.resolve_qname(&element.name).and_then(|q| q.namespace)
    }
}

/// Guard returned by [`NamespaceContext::scope`]; pops the scope on drop.
pub struct ScopeGuard<'a> {
    ctx: &'a mut NamespaceContext,
}

impl Deref for ScopeGuard<'_> {
    type Target = NamespaceContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.ctx.pop_scope();
    }
}
