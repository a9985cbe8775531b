use super::Security;
use crate::error::Result;
use crate::transport::TransportOptions;
use std::path::PathBuf;
use tracing::debug;

/// PEM material, inline or read from disk once at construction.
#[derive(Debug, Clone)]
pub enum PemSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl PemSource {
    fn read(self) -> Result<Vec<u8>> {
        match self {
            PemSource::Bytes(bytes) => Ok(bytes),
            PemSource::File(path) => {
                debug!(path = %path.display(), "Reading PEM file");
                Ok(std::fs::read(path)?)
            }
        }
    }
}

/// Client certificate authentication.
#[derive(Debug, Clone)]
pub struct ClientSslSecurity {
    key: Vec<u8>,
    cert: Vec<u8>,
    ca: Option<Vec<u8>>,
    defaults: TransportOptions,
}

impl ClientSslSecurity {
    pub fn new(key: PemSource, cert: PemSource) -> Result<Self> {
        Ok(Self {
            key: key.read()?,
            cert: cert.read()?,
            ca: None,
            defaults: TransportOptions::default(),
        })
    }

    pub fn with_ca(mut self, ca: PemSource) -> Result<Self> {
        self.ca = Some(ca.read()?);
        Ok(self)
    }

    /// Flags such as `passphrase`, `reject_unauthorized` or `secure_protocol`.
    pub fn with_defaults(mut self, defaults: TransportOptions) -> Self {
        self.defaults = defaults;
        self
    }
}

impl Security for ClientSslSecurity {
    fn add_options(&self, options: &mut TransportOptions) {
        options.key = Some(self.key.clone());
        options.cert = Some(self.cert.clone());
        options.ca = self.ca.clone();
        options.merge(&self.defaults);
    }
}
