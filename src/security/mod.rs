//! Security strategies.
//!
//! A strategy can touch three things on an outbound call: the transport
//! headers, the transport options, and the envelope (a header fragment plus
//! a final pass over the serialized text). Every hook defaults to a no-op.

mod basic_auth;
mod bearer;
mod client_ssl;
mod ws_security;

pub use basic_auth::BasicAuthSecurity;
pub use bearer::BearerSecurity;
pub use client_ssl::{ClientSslSecurity, PemSource};
pub use ws_security::{WsSecurity, WsSecurityOptions};

use crate::error::Result;
use crate::transport::{Headers, TransportOptions};

pub trait Security: Send + Sync {
    /// Add transport headers such as `Authorization`.
    fn add_headers(&self, _headers: &mut Headers) {}

    /// XML fragment placed first in the SOAP Header.
    fn to_xml(&self) -> String {
        String::new()
    }

    /// Contribute transport connection options.
    fn add_options(&self, _options: &mut TransportOptions) {}

    /// Rewrite the fully serialized envelope. Runs once, after assembly.
    fn post_process(&self, xml: &str, _envelope_key: &str) -> Result<String> {
        Ok(xml.to_string())
    }
}

/// Applies several strategies in registration order.
#[derive(Default)]
pub struct SecurityChain {
    strategies: Vec<Box<dyn Security>>,
}

impl SecurityChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, strategy: impl Security + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Box<dyn Security>) {
        self.strategies.push(strategy);
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Security for SecurityChain {
    fn add_headers(&self, headers: &mut Headers) {
        for strategy in &self.strategies {
            strategy.add_headers(headers);
        }
    }

    fn to_xml(&self) -> String {
        self.strategies.iter().map(|s| s.to_xml()).collect()
    }

    fn add_options(&self, options: &mut TransportOptions) {
        for strategy in &self.strategies {
            strategy.add_options(options);
        }
    }

    fn post_process(&self, xml: &str, envelope_key: &str) -> Result<String> {
        let mut xml = xml.to_string();
        for strategy in &self.strategies {
            xml = strategy.post_process(&xml, envelope_key)?;
        }
        Ok(xml)
    }
}
