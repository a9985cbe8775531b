use super::Security;
use crate::transport::{Headers, TransportOptions};

/// Bearer token authentication.
#[derive(Debug, Clone)]
pub struct BearerSecurity {
    token: String,
    defaults: TransportOptions,
}

impl BearerSecurity {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            defaults: TransportOptions::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: TransportOptions) -> Self {
        self.defaults = defaults;
        self
    }
}

impl Security for BearerSecurity {
    fn add_headers(&self, headers: &mut Headers) {
        headers.insert("Authorization".to_string(), format!("Bearer {}", self.token));
    }

    fn add_options(&self, options: &mut TransportOptions) {
        options.merge(&self.defaults);
    }
}
