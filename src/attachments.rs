//! Multipart attachment boundary.
//!
//! Byte-level MIME framing is the transport's job; the core only sees the
//! decoded parts. Part 0 carries the SOAP envelope, the rest are attachments
//! addressed by `Content-ID`.

use crate::error::{Result, SoapError};
use crate::transport::{header, Headers};
use std::collections::BTreeMap;
use tracing::warn;

/// One decoded MIME part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MimePart {
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl MimePart {
    pub fn new(headers: Headers, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// `Content-ID` without the surrounding angle brackets.
    pub fn content_id(&self) -> Option<&str> {
        header(&self.headers, "Content-ID").map(|id| id.trim().trim_start_matches('<').trim_end_matches('>'))
    }

    pub fn content_type(&self) -> Option<&str> {
        header(&self.headers, "Content-Type")
    }
}

/// Attachments of a multipart message, keyed by content id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attachments {
    parts: BTreeMap<String, MimePart>,
}

impl Attachments {
    pub fn get(&self, content_id: &str) -> Option<&MimePart> {
        self.parts.get(content_id)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MimePart)> {
        self.parts.iter().map(|(id, part)| (id.as_str(), part))
    }
}

/// Split decoded parts into the SOAP envelope text and its attachments.
pub fn split_parts(parts: Vec<MimePart>) -> Result<(String, Attachments)> {
    let mut parts = parts.into_iter();
    let root = parts
        .next()
        .ok_or_else(|| SoapError::Parse("multipart message has no parts".to_string()))?;
    let envelope = String::from_utf8(root.body)
        .map_err(|e| SoapError::Parse(format!("SOAP part is not UTF-8: {}", e)))?;

    let mut attachments = Attachments::default();
    for (index, part) in parts.enumerate() {
        match part.content_id().map(String::from) {
            Some(id) => {
                attachments.parts.insert(id, part);
            }
            None => warn!(part = index + 1, "Dropping attachment without Content-ID"),
        }
    }
    Ok((envelope, attachments))
}
