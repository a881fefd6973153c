//! Error types for the passport-verify library.
//!
//! Every failure is a variant of [`PassportError`]. The variants fall into
//! four user-facing groups, exposed through [`PassportError::category`]:
//!
//! * [`ErrorCategory::Upload`]: the caller's input could not be read
//!   (malformed data URL, undecodable image, degenerate crop box, image the
//!   face service rejects as invalid).
//! * [`ErrorCategory::Provider`]: an external provider failed or answered
//!   with something that does not fit the expected schema.
//! * [`ErrorCategory::NoFace`]: the face service found no face at all.
//! * [`ErrorCategory::Internal`]: a bug or misconfiguration on our side.
//!
//! The HTTP layer maps the category to a status code, so the three cases a
//! user can act on are never conflated into one generic message.

use serde::Serialize;
use thiserror::Error;

/// All errors returned by the passport-verify library.
#[derive(Debug, Error)]
pub enum PassportError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The embeddable-image string is not `data:<mime>;base64,<payload>`,
    /// or the bytes are not a decodable image.
    #[error("Could not read image: {detail}")]
    Format { detail: String },

    /// A bounding box resolved to a rectangle with no area.
    #[error("Bounding box has no area inside a {image_width}x{image_height} image: {detail}")]
    Geometry {
        image_width: u32,
        image_height: u32,
        detail: String,
    },

    /// A multipart upload was missing, empty, or unreadable.
    #[error("Upload '{field}' could not be read: {detail}")]
    Upload { field: String, detail: String },

    /// The face-comparison provider rejected an image (no detectable face,
    /// unsupported format, too large).
    #[error(
        "Could not detect a face in one of the images, or the image format is not supported. \
Please use a clear, well-lit image. ({detail})"
    )]
    InvalidImage { detail: String },

    // ── Verification outcomes ─────────────────────────────────────────────
    /// The face-comparison provider reported neither a match nor an
    /// unmatched face.
    #[error("Face is not found in the passport image")]
    FaceNotFound,

    // ── Provider errors ───────────────────────────────────────────────────
    /// The provider reply could not be coerced into the requested schema.
    #[error("Reply from '{schema}' request does not match its schema: {detail}")]
    SchemaValidation { schema: String, detail: String },

    /// Transport or provider failure. `status` is the HTTP status when the
    /// provider returned one.
    #[error("{provider} request failed{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Upstream {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// A provider call exceeded the configured timeout.
    #[error("{provider} request timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    /// The configured provider could not be initialised (missing API key etc.).
    #[error("Provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse grouping of errors for user-facing rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// "We could not read your upload."
    Upload,
    /// "The provider rejected or failed the request."
    Provider,
    /// "No face was detected."
    NoFace,
    /// Anything that is our fault.
    Internal,
}

impl PassportError {
    /// Shorthand for an [`PassportError::Upstream`] error.
    pub fn upstream(
        provider: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        PassportError::Upstream {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Shorthand for a [`PassportError::Format`] error.
    pub fn format(detail: impl Into<String>) -> Self {
        PassportError::Format {
            detail: detail.into(),
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            PassportError::Format { .. } => "format_error",
            PassportError::Geometry { .. } => "geometry_error",
            PassportError::Upload { .. } => "upload_error",
            PassportError::InvalidImage { .. } => "invalid_image",
            PassportError::FaceNotFound => "face_not_found",
            PassportError::SchemaValidation { .. } => "schema_validation_error",
            PassportError::Upstream { .. } => "upstream_error",
            PassportError::Timeout { .. } => "timeout",
            PassportError::ProviderNotConfigured { .. } => "provider_not_configured",
            PassportError::InvalidConfig(_) => "invalid_config",
            PassportError::Internal(_) => "internal_error",
        }
    }

    /// Which user-facing group this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PassportError::Format { .. }
            | PassportError::Geometry { .. }
            | PassportError::Upload { .. }
            | PassportError::InvalidImage { .. } => ErrorCategory::Upload,
            PassportError::FaceNotFound => ErrorCategory::NoFace,
            PassportError::SchemaValidation { .. }
            | PassportError::Upstream { .. }
            | PassportError::Timeout { .. }
            | PassportError::ProviderNotConfigured { .. } => ErrorCategory::Provider,
            PassportError::InvalidConfig(_) | PassportError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a single retry of the same call may succeed.
    ///
    /// Rate limits, server errors, dropped connections and timeouts are
    /// transient. Everything else (bad key, bad request, schema mismatch)
    /// fails the same way on the second try.
    pub fn is_transient(&self) -> bool {
        match self {
            PassportError::Timeout { .. } => true,
            PassportError::Upstream { status, .. } => match status {
                Some(code) => *code == 429 || (500..600).contains(code),
                // No status means the request never got a response.
                None => true,
            },
            _ => false,
        }
    }
}
