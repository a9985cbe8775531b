//! XML document parsing.
//!
//! Uses quick-xml which is safe against XXE by default (doesn't expand
//! entities). Documents are read into a small owned element tree; namespace
//! prefixes are kept raw and resolved by whoever walks the tree, through a
//! [`NamespaceContext`](crate::nscontext::NamespaceContext).

use crate::error::{Result, SoapError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// SOAP namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const WSSE_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

/// WSDL and XML Schema namespace URIs.
pub const WSDL_NS: &str = "http://schemas.xmlsoap.org/wsdl/";
pub const WSDL_SOAP_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap/";
pub const WSDL_SOAP12_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap12/";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// An element of a parsed document.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    /// Raw (possibly prefixed) tag name
    pub name: String,
    /// Attributes in document order, values unescaped
    pub attributes: Vec<(String, String)>,
    /// Child nodes in document order
    pub children: Vec<XmlNode>,
}

/// A node inside an element.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
}

impl XmlElement {
    /// Prefix part of the tag name, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Local part of the tag name.
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Look up an attribute by its raw name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Concatenated text and CDATA content of this element (not descendants).
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) | XmlNode::CData(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Whether any direct child is a CDATA section.
    pub fn has_cdata(&self) -> bool {
        self.children.iter().any(|node| matches!(node, XmlNode::CData(_)))
    }

    /// `xmlns` declarations on this element as `(prefix, uri)`; the default
    /// namespace has the empty prefix.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|(key, value)| {
            if key == "xmlns" {
                Some(("", value.as_str()))
            } else {
                key.strip_prefix("xmlns:").map(|prefix| (prefix, value.as_str()))
            }
        })
    }

    /// Attributes that are not namespace declarations.
    pub fn plain_attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .filter(|(key, _)| key != "xmlns" && !key.starts_with("xmlns:"))
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Local part of a possibly prefixed name.
pub fn local_part(name: &str) -> &str {
    name.split_once(':').map(|(_, local)| local).unwrap_or(name)
}

/// Parse a complete document and return its root element.
pub fn parse_document(xml: &str) -> Result<XmlElement> {
    // Pre-scan for XXE patterns (belt-and-suspenders with quick-xml's safety)
    check_xxe_patterns(xml)?;

    let xml = xml.trim_start_matches('\u{feff}');
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                stack.push(element_from(e)?);
            }

            Ok(Event::Empty(ref e)) => {
                let element = element_from(e)?;
                attach(&mut stack, &mut root, element)?;
            }

            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| SoapError::Parse("unexpected closing tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }

            Ok(Event::Text(ref e)) => {
                if let Some(top) = stack.last_mut() {
                    let text = e.unescape()?;
                    top.children.push(XmlNode::Text(text.into_owned()));
                }
            }

            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    let text = String::from_utf8(e.into_inner().into_owned())
                        .map_err(|e| SoapError::Parse(format!("Invalid UTF-8: {}", e)))?;
                    top.children.push(XmlNode::CData(text));
                }
            }

            Ok(Event::DocType(_)) => {
                return Err(SoapError::Parse(
                    "DOCTYPE declarations are not allowed".to_string(),
                ));
            }

            Ok(Event::Eof) => break,

            Err(e) => {
                return Err(SoapError::Parse(format!(
                    "XML parse error at position {}: {}",
                    reader.error_position(),
                    e
                )));
            }

            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(SoapError::Parse(format!("unclosed element <{}>", open.name)));
    }

    root.ok_or_else(|| SoapError::Parse("document has no root element".to_string()))
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(SoapError::Parse("multiple root elements".to_string()));
    }
    Ok(())
}

fn element_from(e: &BytesStart<'_>) -> Result<XmlElement> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|e| SoapError::Parse(format!("Invalid UTF-8 in tag name: {}", e)))?
        .to_string();

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SoapError::Parse(format!("bad attribute: {}", e)))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| SoapError::Parse(format!("Invalid UTF-8 in attribute name: {}", e)))?
            .to_string();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
    })
}

/// Check for XXE attack patterns.
fn check_xxe_patterns(xml: &str) -> Result<()> {
    // DOCTYPE detection
    if xml.contains("<!DOCTYPE") || xml.contains("<!doctype") {
        return Err(SoapError::Parse(
            "DOCTYPE declarations are not allowed".to_string(),
        ));
    }

    // Entity declarations
    if xml.contains("<!ENTITY") || xml.contains("<!entity") {
        return Err(SoapError::Parse(
            "Entity declarations are not allowed".to_string(),
        ));
    }

    Ok(())
}

/// Extract SOAPAction from HTTP header value (removes quotes).
pub fn parse_soap_action(header_value: &str) -> String {
    header_value.trim().trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOAP_11_SAMPLE: &str = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Header>
    <m:Trans xmlns:m="http://example.org/trans">234</m:Trans>
  </soap:Header>
  <soap:Body>
    <m:GetPrice xmlns:m="http://example.org/stock">
      <m:Item>Apples &amp; Pears</m:Item>
      <m:Note><![CDATA[<b>raw</b>]]></m:Note>
      <m:Empty/>
    </m:GetPrice>
  </soap:Body>
</soap:Envelope>"#;

    #[test]
    fn test_parse_document_tree() {
        let root = parse_document(SOAP_11_SAMPLE).unwrap();
        assert_eq!(root.local_name(), "Envelope");
        assert_eq!(root.prefix(), Some("soap"));

        let children: Vec<_> = root.elements().map(|e| e.local_name()).collect();
        assert_eq!(children, vec!["Header", "Body"]);

        let body = root.elements().nth(1).unwrap();
        let op = body.elements().next().unwrap();
        assert_eq!(op.name, "m:GetPrice");
        let decls: Vec<_> = op.namespace_declarations().collect();
        assert_eq!(decls, vec![("m", "http://example.org/stock")]);

        let items: Vec<_> = op.elements().collect();
        assert_eq!(items[0].text(), "Apples & Pears");
        assert!(items[1].has_cdata());
        assert_eq!(items[1].text(), "<b>raw</b>");
        assert!(items[2].children.is_empty());
    }

    #[test]
    fn test_plain_attributes_skip_xmlns() {
        let root = parse_document(r#"<a xmlns="urn:x" xmlns:p="urn:p" id="1" p:k="v"/>"#).unwrap();
        let attrs: Vec<_> = root.plain_attributes().collect();
        assert_eq!(attrs, vec![("id", "1"), ("p:k", "v")]);
        let decls: Vec<_> = root.namespace_declarations().collect();
        assert_eq!(decls, vec![("", "urn:x"), ("p", "urn:p")]);
    }

    #[test]
    fn test_xxe_detection() {
        let xxe_payload = r#"<?xml version="1.0"?>
<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>&xxe;</soap:Body>
</soap:Envelope>"#;

        let err = parse_document(xxe_payload).unwrap_err();
        assert!(err.to_string().contains("DOCTYPE"));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(parse_document("<a><b></a>").is_err());
        assert!(parse_document("<a>").is_err());
        assert!(parse_document("   ").is_err());
        assert!(parse_document("<a/><b/>").is_err());
    }

    #[test]
    fn test_parse_soap_action() {
        assert_eq!(parse_soap_action("\"GetUser\""), "GetUser");
        assert_eq!(parse_soap_action("GetUser"), "GetUser");
        assert_eq!(parse_soap_action("  \"GetUser\"  "), "GetUser");
    }
}
