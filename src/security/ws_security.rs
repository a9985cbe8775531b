use super::Security;
use crate::config::SoapVersion;
use crate::error::xml_escape;
use crate::parser::{WSSE_NS, WSU_NS};
use chrono::{DateTime, Duration, Utc};

const PASSWORD_TEXT: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";

/// Lifetime of the emitted Timestamp.
const TIMESTAMP_TTL_SECS: i64 = 600;

#[derive(Debug, Clone)]
pub struct WsSecurityOptions {
    /// Emit a `wsu:Timestamp` block
    pub has_timestamp: bool,
    /// Emit `wsu:Created` inside the UsernameToken
    pub has_token_created: bool,
    /// Value of `soap:actor` on the Security header
    pub actor: Option<String>,
    /// Add `soap:mustUnderstand="1"`
    pub must_understand: bool,
    /// Envelope namespace the `soap:` attributes are bound to
    pub soap_version: SoapVersion,
}

impl Default for WsSecurityOptions {
    fn default() -> Self {
        Self {
            has_timestamp: true,
            has_token_created: true,
            actor: None,
            must_understand: false,
            soap_version: SoapVersion::Soap11,
        }
    }
}

/// WS-Security UsernameToken with a plain-text password.
#[derive(Debug, Clone)]
pub struct WsSecurity {
    username: String,
    password: String,
    options: WsSecurityOptions,
}

impl WsSecurity {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::with_options(username, password, WsSecurityOptions::default())
    }

    pub fn with_options(
        username: impl Into<String>,
        password: impl Into<String>,
        options: WsSecurityOptions,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            options,
        }
    }

    /// Render the Security header as of `now`.
    pub fn to_xml_at(&self, now: DateTime<Utc>) -> String {
        let created = format_instant(now);
        let mut xml = String::from("<wsse:Security ");
        // The envelope prefix is configurable, so `soap` is bound here.
        if self.options.actor.is_some() || self.options.must_understand {
            xml.push_str(&format!(
                "xmlns:soap=\"{}\" ",
                self.options.soap_version.namespace()
            ));
        }
        if let Some(ref actor) = self.options.actor {
            let attribute = match self.options.soap_version {
                SoapVersion::Soap11 => "actor",
                SoapVersion::Soap12 => "role",
            };
            xml.push_str(&format!("soap:{}=\"{}\" ", attribute, xml_escape(actor)));
        }
        if self.options.must_understand {
            xml.push_str("soap:mustUnderstand=\"1\" ");
        }
        xml.push_str(&format!("xmlns:wsse=\"{}\" xmlns:wsu=\"{}\">", WSSE_NS, WSU_NS));

        if self.options.has_timestamp {
            let expires = format_instant(now + Duration::seconds(TIMESTAMP_TTL_SECS));
            xml.push_str(&format!(
                "<wsu:Timestamp wsu:Id=\"Timestamp-{created}\">\
                 <wsu:Created>{created}</wsu:Created>\
                 <wsu:Expires>{expires}</wsu:Expires>\
                 </wsu:Timestamp>"
            ));
        }

        xml.push_str(&format!(
            "<wsse:UsernameToken xmlns:wsu=\"{}\" wsu:Id=\"SecurityToken-{}\">\
             <wsse:Username>{}</wsse:Username>\
             <wsse:Password Type=\"{}\">{}</wsse:Password>",
            WSU_NS,
            created,
            xml_escape(&self.username),
            PASSWORD_TEXT,
            xml_escape(&self.password),
        ));
        if self.options.has_token_created {
            xml.push_str(&format!("<wsu:Created>{}</wsu:Created>", created));
        }
        xml.push_str("</wsse:UsernameToken></wsse:Security>");
        xml
    }
}

impl Security for WsSecurity {
    fn to_xml(&self) -> String {
        self.to_xml_at(Utc::now())
    }
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
