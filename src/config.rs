//! Configuration types for the SOAP/WSDL core.

use serde::{Deserialize, Serialize};

/// Prefixes that are never emitted on marshalled elements unless overridden.
pub const DEFAULT_IGNORED_NAMESPACES: &[&str] = &["tns", "targetNamespace", "typedNamespace"];

/// Main configuration shared by the client and server facades.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoapConfig {
    /// Config version
    pub version: String,

    /// General request handling settings
    pub settings: SettingsConfig,

    /// Interface model loading
    pub wsdl: WsdlConfig,

    /// Object <-> XML conventions
    pub marshal: MarshalConfig,

    /// Envelope assembly
    pub envelope: EnvelopeConfig,

    /// Server-only settings
    pub server: ServerConfig,
}

impl Default for SoapConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: SettingsConfig::default(),
            wsdl: WsdlConfig::default(),
            marshal: MarshalConfig::default(),
            envelope: EnvelopeConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl SoapConfig {
    /// Parse a YAML configuration document.
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Maximum request body size the server accepts (bytes)
    pub max_body_size: usize,

    /// Add debug headers (X-SOAP-*) to server responses
    pub debug_headers: bool,

    /// Allowed Content-Type headers for inbound SOAP requests
    pub allowed_content_types: Vec<String>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1_048_576, // 1MB
            debug_headers: false,
            allowed_content_types: vec![
                "text/xml".to_string(),
                "application/soap+xml".to_string(),
                "application/xml".to_string(),
            ],
        }
    }
}

/// Interface model loading configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsdlConfig {
    /// Fail the load on unresolved QName references. When false, unresolved
    /// references are skipped at marshal time.
    pub strict: bool,

    /// Let later same-name type definitions replace earlier ones when schema
    /// fragments are merged.
    pub override_duplicate_types: bool,

    /// Prefixes never used on emitted elements
    pub ignored_namespaces: IgnoredNamespacesConfig,
}

impl Default for WsdlConfig {
    fn default() -> Self {
        Self {
            strict: true,
            override_duplicate_types: false,
            ignored_namespaces: IgnoredNamespacesConfig::default(),
        }
    }
}

/// Ignored namespace prefixes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoredNamespacesConfig {
    /// Additional (or replacement) prefixes
    pub namespaces: Vec<String>,

    /// Replace the default list instead of extending it
    #[serde(rename = "override")]
    pub override_defaults: bool,
}

impl IgnoredNamespacesConfig {
    /// The effective list of ignored prefixes.
    pub fn effective(&self) -> Vec<String> {
        if self.override_defaults {
            return self.namespaces.clone();
        }
        DEFAULT_IGNORED_NAMESPACES
            .iter()
            .map(|s| s.to_string())
            .chain(self.namespaces.iter().cloned())
            .collect()
    }
}

/// Marshalling conventions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarshalConfig {
    /// Object key whose value is rendered as XML attributes
    pub attributes_key: String,

    /// Object key holding text content next to attributes
    pub value_key: String,

    /// Object key holding raw XML inserted verbatim
    pub xml_key: String,

    /// Give every array item its own element. When false, all items share a
    /// single element.
    pub namespace_array_elements: bool,

    /// Render empty content as a self-closing tag
    pub use_empty_tag: bool,

    /// Decode every child element as an array, even when it occurs once and
    /// the schema does not declare `maxOccurs > 1`
    pub force_arrays: bool,

    /// Keep leading/trailing whitespace of text nodes
    pub preserve_whitespace: bool,

    /// Replace the body root element's prefix and namespace declarations
    pub override_root_element: Option<RootElementOverride>,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            attributes_key: "attributes".to_string(),
            value_key: "$value".to_string(),
            xml_key: "$xml".to_string(),
            namespace_array_elements: true,
            use_empty_tag: false,
            force_arrays: false,
            preserve_whitespace: false,
            override_root_element: None,
        }
    }
}

/// Body root element override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RootElementOverride {
    /// Prefix used on the root element (empty for none)
    pub namespace: String,

    /// Attributes emitted on the root element, typically `xmlns:*`
    pub xmlns_attributes: Vec<XmlnsAttribute>,
}

/// A raw `name="value"` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlnsAttribute {
    pub name: String,
    pub value: String,
}

/// Envelope assembly configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Prefix bound to the SOAP envelope namespace
    pub envelope_key: String,

    /// SOAP version of outbound envelopes
    pub soap_version: SoapVersion,

    /// Extra namespace declarations on the Envelope element
    pub extra_xmlns: Vec<XmlnsAttribute>,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            envelope_key: "soap".to_string(),
            soap_version: SoapVersion::Soap11,
            extra_xmlns: Vec::new(),
        }
    }
}

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[default]
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    /// Envelope namespace URI.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => crate::parser::SOAP_11_NS,
            Self::Soap12 => crate::parser::SOAP_12_NS,
        }
    }

    /// Content-Type for messages of this version.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml; charset=utf-8",
            Self::Soap12 => "application/soap+xml; charset=utf-8",
        }
    }

    /// Detect the version from an envelope namespace URI.
    pub fn from_namespace(uri: &str) -> Option<Self> {
        match uri {
            crate::parser::SOAP_11_NS => Some(Self::Soap11),
            crate::parser::SOAP_12_NS => Some(Self::Soap12),
            _ => None,
        }
    }
}

/// Server-only configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP status for one-way operations (no output message)
    pub oneway_status: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { oneway_status: 200 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SoapConfig::default();
        assert!(config.wsdl.strict);
        assert_eq!(config.marshal.attributes_key, "attributes");
        assert_eq!(config.envelope.envelope_key, "soap");
        assert_eq!(config.envelope.soap_version, SoapVersion::Soap11);
        assert!(config.marshal.namespace_array_elements);
    }

    #[test]
    fn test_config_serialization() {
        let config = SoapConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: SoapConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.settings.max_body_size, config.settings.max_body_size);
        assert_eq!(parsed.marshal.value_key, "$value");
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
version: "1"
wsdl:
  strict: false
  ignored_namespaces:
    namespaces: ["ns"]
    override: true
marshal:
  attributes_key: "$attributes"
  override_root_element:
    namespace: "xmlns"
    xmlns_attributes:
      - name: "xmlns:ns2"
        value: "http://tempuri.org/"
envelope:
  envelope_key: "soapenv"
  soap_version: "1.2"
"#;
        let config = SoapConfig::from_yaml(yaml).unwrap();
        assert!(!config.wsdl.strict);
        assert_eq!(config.wsdl.ignored_namespaces.effective(), vec!["ns".to_string()]);
        assert_eq!(config.marshal.attributes_key, "$attributes");
        let root = config.marshal.override_root_element.unwrap();
        assert_eq!(root.xmlns_attributes[0].value, "http://tempuri.org/");
        assert_eq!(config.envelope.envelope_key, "soapenv");
        assert_eq!(config.envelope.soap_version, SoapVersion::Soap12);
    }

    #[test]
    fn test_ignored_namespaces_extend_defaults() {
        let ignored = IgnoredNamespacesConfig {
            namespaces: vec!["extra".to_string()],
            override_defaults: false,
        };
        let effective = ignored.effective();
        assert!(effective.contains(&"tns".to_string()));
        assert!(effective.contains(&"extra".to_string()));
    }

    #[test]
    fn test_soap_version_namespace() {
        assert_eq!(
            SoapVersion::from_namespace(SoapVersion::Soap12.namespace()),
            Some(SoapVersion::Soap12)
        );
        assert_eq!(SoapVersion::from_namespace("urn:other"), None);
    }
}
