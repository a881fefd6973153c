//! Image encoding: raw upload bytes ⇄ `data:<mime>;base64,<payload>` strings.
//!
//! Chat-completion APIs accept images as data URLs embedded in the JSON
//! request body, and the HTTP layer hands cropped faces back to the browser
//! the same way. [`EmbeddableImage`] keeps the bytes and the MIME type
//! together so neither side has to guess the format.

use crate::error::PassportError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// MIME type assumed for uploads that do not declare one.
pub const DEFAULT_MIME: &str = "image/jpeg";

/// A byte buffer tagged with its MIME type.
///
/// The boundary representation is the data URL produced by [`fmt::Display`]
/// and accepted by [`EmbeddableImage::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddableImage {
    mime: String,
    bytes: Vec<u8>,
}

impl EmbeddableImage {
    /// Wrap raw bytes. Never fails.
    pub fn new(bytes: impl Into<Vec<u8>>, mime: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Parse a `data:<mime>;base64,<payload>` string.
    ///
    /// # Errors
    /// [`PassportError::Format`] when the prefix, the MIME type, the
    /// `;base64,` marker or the payload is missing or malformed.
    pub fn parse(data_url: &str) -> Result<Self, PassportError> {
        let rest = data_url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| PassportError::format("expected a 'data:' URL"))?;
        let (mime, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| PassportError::format("expected ';base64,' after the MIME type"))?;
        if mime.is_empty() || !mime.contains('/') {
            return Err(PassportError::format(format!(
                "invalid MIME type '{mime}' in data URL"
            )));
        }
        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| PassportError::format(format!("invalid base64 payload: {e}")))?;
        Ok(Self::new(bytes, mime))
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Base64 payload without the `data:` header.
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// The full data URL.
    pub fn to_data_url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EmbeddableImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime, self.base64())
    }
}

impl FromStr for EmbeddableImage {
    type Err = PassportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Serialised as the data URL so JSON responses can drop it straight into
// an `<img src>`.
impl Serialize for EmbeddableImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Encode raw bytes as an [`EmbeddableImage`].
pub fn encode(bytes: &[u8], mime: &str) -> EmbeddableImage {
    let image = EmbeddableImage::new(bytes.to_vec(), mime);
    debug!("Encoded {} bytes as {}", bytes.len(), mime);
    image
}

/// Decode a data URL back into the raw bytes it carries.
pub fn decode(data_url: &str) -> Result<Vec<u8>, PassportError> {
    EmbeddableImage::parse(data_url).map(EmbeddableImage::into_bytes)
}
