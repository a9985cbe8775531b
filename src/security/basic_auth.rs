use super::Security;
use crate::transport::{Headers, TransportOptions};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// HTTP basic authentication.
#[derive(Debug, Clone)]
pub struct BasicAuthSecurity {
    username: String,
    password: String,
    defaults: TransportOptions,
}

impl BasicAuthSecurity {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            defaults: TransportOptions::default(),
        }
    }

    /// Options merged into every request's transport options.
    pub fn with_defaults(mut self, defaults: TransportOptions) -> Self {
        self.defaults = defaults;
        self
    }
}

impl Security for BasicAuthSecurity {
    fn add_headers(&self, headers: &mut Headers) {
        let credentials = STANDARD.encode(format!("{}:{}", self.username, self.password));
        headers.insert("Authorization".to_string(), format!("Basic {}", credentials));
    }

    fn add_options(&self, options: &mut TransportOptions) {
        options.merge(&self.defaults);
    }
}
