//! SOAP envelope assembly and disassembly.

use crate::config::{EnvelopeConfig, SoapVersion};
use crate::error::{fault_body, xml_escape, FaultCode, Result, SoapError, SoapFault};
use crate::nscontext::NamespaceContext;
use crate::parser::{parse_document, XmlElement, XmlNode, XSI_NS};
use crate::security::Security;
use tracing::debug;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Wraps marshalled bodies in envelopes and takes inbound envelopes apart.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeBuilder {
    config: EnvelopeConfig,
}

impl EnvelopeBuilder {
    pub fn new(config: EnvelopeConfig) -> Self {
        Self { config }
    }

    /// Prefix bound to the envelope namespace.
    pub fn key(&self) -> &str {
        &self.config.envelope_key
    }

    pub fn version(&self) -> SoapVersion {
        self.config.soap_version
    }

    /// A context holding the declarations the `Envelope` element makes, for
    /// marshalling bodies that go into [`EnvelopeBuilder::wrap`].
    pub fn body_context(&self) -> NamespaceContext {
        let mut ctx = NamespaceContext::new();
        ctx.declare_namespace(self.key(), self.version().namespace());
        ctx.declare_namespace("xsi", XSI_NS);
        for attr in &self.config.extra_xmlns {
            if attr.name == "xmlns" {
                ctx.declare_namespace("", &attr.value);
            } else if let Some(prefix) = attr.name.strip_prefix("xmlns:") {
                ctx.declare_namespace(prefix, &attr.value);
            }
        }
        ctx
    }

    /// Assemble a full envelope around a serialized body. The Header is
    /// omitted when neither `security` nor `header` contribute content.
    pub fn wrap(
        &self,
        body: &str,
        header: &str,
        security: Option<&dyn Security>,
    ) -> Result<String> {
        let mut header_content = security.map(|s| s.to_xml()).unwrap_or_default();
        header_content.push_str(header);

        let xml = self.assemble(body, &header_content);
        match security {
            Some(security) => security.post_process(&xml, self.key()),
            None => Ok(xml),
        }
    }

    /// A complete envelope whose body is `fault`.
    pub fn render_fault(&self, fault: &SoapFault) -> String {
        self.assemble(&fault_body(fault, self.version(), self.key()), "")
    }

    fn assemble(&self, body: &str, header: &str) -> String {
        let key = self.key();
        let mut xml = String::from(XML_DECLARATION);
        xml.push_str(&format!(
            "<{key}:Envelope xmlns:{key}=\"{}\" xmlns:xsi=\"{}\"",
            self.version().namespace(),
            XSI_NS
        ));
        for attr in &self.config.extra_xmlns {
            xml.push_str(&format!(" {}=\"{}\"", attr.name, xml_escape(&attr.value)));
        }
        xml.push('>');
        if !header.is_empty() {
            xml.push_str(&format!("<{key}:Header>{header}</{key}:Header>"));
        }
        xml.push_str(&format!("<{key}:Body>{body}</{key}:Body></{key}:Envelope>"));
        xml
    }

    /// Take an inbound envelope apart. Either SOAP version is accepted,
    /// under any prefix.
    pub fn unwrap(&self, raw: &str) -> Result<Unwrapped> {
        unwrap(raw)
    }
}

/// The parts of a received envelope.
#[derive(Debug, Clone)]
pub struct Unwrapped {
    version: SoapVersion,
    header: Option<XmlElement>,
    body: XmlElement,
    /// `(prefix, uri)` declared on Envelope, then on Body
    declarations: Vec<(String, String)>,
}

/// See [`EnvelopeBuilder::unwrap`].
pub fn unwrap(raw: &str) -> Result<Unwrapped> {
    let root = parse_document(raw)
        .map_err(|e| SoapError::Parse(format!("failed to parse message body: {}", e)))?;

    let mut ctx = NamespaceContext::new();
    ctx.declare_element(&root);
    let version = match ctx.resolve_qname(&root.name) {
        Some(name) if name.local == "Envelope" => name
            .namespace()
            .and_then(SoapVersion::from_namespace)
            .ok_or_else(|| {
                SoapError::Parse(format!(
                    "failed to parse message body: unknown envelope namespace {:?}",
                    name.namespace
                ))
            })?,
        _ => {
            return Err(SoapError::Parse(format!(
                "failed to parse message body: root element '{}' is not an Envelope",
                root.name
            )))
        }
    };
    let envelope_ns = version.namespace();

    let mut declarations: Vec<(String, String)> = root
        .namespace_declarations()
        .map(|(p, u)| (p.to_string(), u.to_string()))
        .collect();
    let mut header = None;
    let mut body = None;
    for child in root.elements() {
        let mut scope = ctx.scope();
        scope.declare_element(child);
        if scope.element_namespace(child).as_deref() != Some(envelope_ns) {
            continue;
        }
        match child.local_name() {
            "Header" if header.is_none() => header = Some(child.clone()),
            "Body" if body.is_none() => body = Some(child.clone()),
            _ => {}
        }
    }

    let body = body.ok_or_else(|| {
        SoapError::Parse("failed to parse message body: missing SOAP Body".to_string())
    })?;
    declarations.extend(
        body.namespace_declarations()
            .map(|(p, u)| (p.to_string(), u.to_string())),
    );
    debug!(version = ?version, has_header = header.is_some(), "Unwrapped envelope");

    Ok(Unwrapped {
        version,
        header,
        body,
        declarations,
    })
}

impl Unwrapped {
    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn header(&self) -> Option<&XmlElement> {
        self.header.as_ref()
    }

    /// Header entries in document order.
    pub fn header_entries(&self) -> Vec<&XmlElement> {
        self.header
            .as_ref()
            .map(|h| h.elements().collect())
            .unwrap_or_default()
    }

    pub fn body(&self) -> &XmlElement {
        &self.body
    }

    /// First element inside Body.
    pub fn body_root(&self) -> Option<&XmlElement> {
        self.body.elements().next()
    }

    /// A context with the Envelope and Body declarations in scope, ready to
    /// decode [`Unwrapped::body_root`].
    pub fn body_context(&self) -> NamespaceContext {
        let mut ctx = NamespaceContext::new();
        for (prefix, uri) in &self.declarations {
            ctx.declare_namespace(prefix, uri);
        }
        ctx
    }

    /// Namespace of the body root element.
    pub fn body_root_namespace(&self) -> Option<String> {
        let root = self.body_root()?;
        let mut ctx = self.body_context();
        ctx.declare_element(root);
        ctx.element_namespace(root)
    }

    /// The Fault carried in the body, if any.
    pub fn fault(&self) -> Option<SoapFault> {
        let root = self.body_root()?;
        if root.local_name() != "Fault" {
            return None;
        }
        if self.body_root_namespace().as_deref() != Some(self.version.namespace()) {
            return None;
        }

        let fault = match self.version {
            SoapVersion::Soap11 => {
                let code = child(root, "faultcode").map(deep_text).unwrap_or_default();
                let reason = child(root, "faultstring").map(deep_text).unwrap_or_default();
                let (code, subcode) = match code.split_once('.') {
                    Some((code, subcode)) => (code.to_string(), Some(subcode.to_string())),
                    None => (code, None),
                };
                let mut fault = SoapFault::new(FaultCode::parse(&code), reason);
                fault.subcode = subcode;
                fault.detail = child(root, "detail").map(deep_text).filter(|d| !d.is_empty());
                fault
            }
            SoapVersion::Soap12 => {
                let code = child(root, "Code")
                    .and_then(|c| child(c, "Value"))
                    .map(deep_text)
                    .unwrap_or_default();
                let reason = child(root, "Reason")
                    .and_then(|r| child(r, "Text"))
                    .map(deep_text)
                    .unwrap_or_default();
                let mut fault = SoapFault::new(FaultCode::parse(&code), reason);
                fault.subcode = child(root, "Code")
                    .and_then(|c| child(c, "Subcode"))
                    .and_then(|s| child(s, "Value"))
                    .map(deep_text);
                fault.detail = child(root, "Detail").map(deep_text).filter(|d| !d.is_empty());
                fault
            }
        };
        Some(fault)
    }
}

fn child<'e>(element: &'e XmlElement, local: &str) -> Option<&'e XmlElement> {
    element.elements().find(|e| e.local_name() == local)
}

/// Text of an element and all its descendants, trimmed.
fn deep_text(element: &XmlElement) -> String {
    fn collect(element: &XmlElement, out: &mut String) {
        for node in &element.children {
            match node {
                XmlNode::Text(text) | XmlNode::CData(text) => out.push_str(text),
                XmlNode::Element(e) => collect(e, out),
            }
        }
    }
    let mut out = String::new();
    collect(element, &mut out);
    out.trim().to_string()
}
