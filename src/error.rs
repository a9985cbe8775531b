//! Error types for the SOAP/WSDL core.

use crate::config::SoapVersion;
use thiserror::Error;

/// Errors raised while loading interface documents, marshalling messages or
/// dispatching calls.
#[derive(Error, Debug)]
pub enum SoapError {
    /// Malformed document, unresolved reference in strict mode, or a message
    /// that does not have the expected envelope structure.
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// No binding, port or operation matches the call or request.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// A registered handler failed.
    #[error("Handler error: {0}")]
    Handler(String),

    /// Raised by the transport collaborator and passed through unchanged.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A SOAP Fault, either received from a peer or raised by a handler.
    #[error("SOAP fault: {0}")]
    Fault(SoapFault),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SoapError>;

impl From<quick_xml::Error> for SoapError {
    fn from(e: quick_xml::Error) -> Self {
        SoapError::Parse(e.to_string())
    }
}

impl From<serde_yaml::Error> for SoapError {
    fn from(e: serde_yaml::Error) -> Self {
        SoapError::Config(e.to_string())
    }
}

/// Fault codes, named after their SOAP 1.1 spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultCode {
    /// The message was malformed or could not be routed (`Sender` in 1.2).
    Client,
    /// Processing failed on the receiving side (`Receiver` in 1.2).
    Server,
    VersionMismatch,
    MustUnderstand,
    /// A code not covered above, kept verbatim.
    Other(String),
}

impl FaultCode {
    /// Get the local code name for the given SOAP version.
    pub fn as_str(&self, version: SoapVersion) -> &str {
        match (self, version) {
            (Self::Client, SoapVersion::Soap11) => "Client",
            (Self::Client, SoapVersion::Soap12) => "Sender",
            (Self::Server, SoapVersion::Soap11) => "Server",
            (Self::Server, SoapVersion::Soap12) => "Receiver",
            (Self::VersionMismatch, _) => "VersionMismatch",
            (Self::MustUnderstand, _) => "MustUnderstand",
            (Self::Other(code), _) => code.as_str(),
        }
    }

    /// Parse a (possibly prefixed) fault code value.
    pub fn parse(value: &str) -> Self {
        let local = value.rsplit(':').next().unwrap_or(value).trim();
        match local {
            "Client" | "Sender" => Self::Client,
            "Server" | "Receiver" => Self::Server,
            "VersionMismatch" => Self::VersionMismatch,
            "MustUnderstand" => Self::MustUnderstand,
            _ => Self::Other(value.trim().to_string()),
        }
    }
}

/// A SOAP Fault.
#[derive(Debug, Clone, PartialEq)]
pub struct SoapFault {
    /// Fault code
    pub code: FaultCode,
    /// Human-readable reason (`faultstring` / `Reason/Text`)
    pub reason: String,
    /// Optional detail text
    pub detail: Option<String>,
    /// Refinement of the code, such as `AuthenticationFailure`
    pub subcode: Option<String>,
    /// HTTP status the server answers with
    pub status: u16,
}

impl SoapFault {
    /// Create a new fault with status 500.
    pub fn new(code: FaultCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            detail: None,
            subcode: None,
            status: 500,
        }
    }

    /// Create a `Client` fault.
    pub fn client(reason: impl Into<String>) -> Self {
        Self::new(FaultCode::Client, reason)
    }

    /// Create a `Server` fault.
    pub fn server(reason: impl Into<String>) -> Self {
        Self::new(FaultCode::Server, reason)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_subcode(mut self, subcode: impl Into<String>) -> Self {
        self.subcode = Some(subcode.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

impl std::fmt::Display for SoapFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code.as_str(SoapVersion::Soap11))?;
        if let Some(ref subcode) = self.subcode {
            write!(f, ".{}", subcode)?;
        }
        write!(f, ": {}", self.reason)?;
        if let Some(ref detail) = self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

/// Render the `Fault` element that goes inside a SOAP Body.
///
/// `envelope_key` is the prefix bound to the envelope namespace on the
/// surrounding `Envelope` element.
pub fn fault_body(fault: &SoapFault, version: SoapVersion, envelope_key: &str) -> String {
    match version {
        SoapVersion::Soap11 => soap_11_fault(fault, envelope_key),
        SoapVersion::Soap12 => soap_12_fault(fault, envelope_key),
    }
}

fn soap_11_fault(fault: &SoapFault, key: &str) -> String {
    let detail = fault
        .detail
        .as_ref()
        .map(|d| format!("<detail>{}</detail>", xml_escape(d)))
        .unwrap_or_default();

    // SOAP 1.1 refines codes with dotted notation
    let subcode = fault
        .subcode
        .as_ref()
        .map(|s| format!(".{}", xml_escape(s)))
        .unwrap_or_default();

    format!(
        "<{key}:Fault><faultcode>{key}:{}{}</faultcode><faultstring>{}</faultstring>{}</{key}:Fault>",
        fault.code.as_str(SoapVersion::Soap11),
        subcode,
        xml_escape(&fault.reason),
        detail,
    )
}

fn soap_12_fault(fault: &SoapFault, key: &str) -> String {
    let detail = fault
        .detail
        .as_ref()
        .map(|d| format!("<{key}:Detail>{}</{key}:Detail>", xml_escape(d)))
        .unwrap_or_default();

    let subcode = fault
        .subcode
        .as_ref()
        .map(|s| format!("<{key}:Subcode><{key}:Value>{}</{key}:Value></{key}:Subcode>", xml_escape(s)))
        .unwrap_or_default();

    format!(
        "<{key}:Fault><{key}:Code><{key}:Value>{key}:{}</{key}:Value>{}</{key}:Code>\
         <{key}:Reason><{key}:Text xml:lang=\"en\">{}</{key}:Text></{key}:Reason>{}</{key}:Fault>",
        fault.code.as_str(SoapVersion::Soap12),
        subcode,
        xml_escape(&fault.reason),
        detail,
    )
}

/// Escape the five XML special characters.
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
