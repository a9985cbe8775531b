//! Fetching WSDL and XSD documents by URL.

use crate::error::{Result, SoapError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;
use url::Url;

/// Base URL for documents that were not loaded from a location.
pub const MEMORY_BASE: &str = "file:///";

/// Source of interface documents.
pub trait DocumentLoader: Send + Sync {
    /// Fetch the document at an absolute URL.
    fn load(&self, location: &Url) -> Result<String>;
}

/// Loads `file:` URLs from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

impl DocumentLoader for FsLoader {
    fn load(&self, location: &Url) -> Result<String> {
        if location.scheme() != "file" {
            return Err(SoapError::Config(format!(
                "unsupported document scheme '{}' in {}",
                location.scheme(),
                location
            )));
        }
        let path = location
            .to_file_path()
            .map_err(|_| SoapError::Config(format!("invalid file URL: {}", location)))?;
        debug!(path = %path.display(), "Loading interface document");
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Serves documents from an in-memory map, keyed by absolute URL.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    documents: HashMap<String, String>,
    loads: AtomicUsize,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document. Relative locations are taken relative to
    /// [`MEMORY_BASE`].
    pub fn insert(&mut self, location: &str, document: impl Into<String>) -> Result<()> {
        let url = resolve_location(location)?;
        self.documents.insert(url.to_string(), document.into());
        Ok(())
    }

    pub fn with_document(mut self, location: &str, document: impl Into<String>) -> Result<Self> {
        self.insert(location, document)?;
        Ok(self)
    }

    /// Number of successful loads served so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl DocumentLoader for MemoryLoader {
    fn load(&self, location: &Url) -> Result<String> {
        let document = self
            .documents
            .get(location.as_str())
            .cloned()
            .ok_or_else(|| SoapError::Config(format!("document not found: {}", location)))?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(document)
    }
}

/// Turn a location string into an absolute URL. Strings that are not URLs
/// are taken relative to [`MEMORY_BASE`].
pub fn resolve_location(location: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(location) {
        return Ok(url);
    }
    let base = Url::parse(MEMORY_BASE)
        .map_err(|e| SoapError::Config(format!("invalid base URL: {}", e)))?;
    base.join(location)
        .map_err(|e| SoapError::Config(format!("invalid document location '{}': {}", location, e)))
}

/// Turn a filesystem path into a `file:` URL.
pub fn file_url(path: &std::path::Path) -> Result<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute)
        .map_err(|_| SoapError::Config(format!("invalid path: {}", absolute.display())))
}

/// Resolve a reference found in the document at `base`.
pub(crate) fn join(base: &Url, reference: &str) -> Result<Url> {
    base.join(reference).map_err(|e| {
        SoapError::Config(format!("cannot resolve '{}' against {}: {}", reference, base, e))
    })
}
