//! Configuration types for the passport service.
//!
//! All behaviour is controlled through [`ServiceConfig`], built via its
//! [`ServiceConfigBuilder`]. The config is read once at process start and
//! turned into a [`crate::service::PassportService`]; nothing reads the
//! environment after that point.

use crate::error::PassportError;
use crate::pipeline::llm::ChatBackend;
use crate::verify::FaceComparisonService;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

/// Gemini's OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
/// Model used for passport field extraction.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";
/// Model used for same-person judgment and face location.
pub const DEFAULT_ALT_MODEL: &str = "gemini-2.0-flash";
/// Minimum similarity (0–100) for the face service to report a match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 90.0;

/// Configuration for a [`crate::service::PassportService`].
///
/// # Example
/// ```rust
/// use passport_verify::{ServiceConfig, VerificationStrategy};
///
/// let config = ServiceConfig::builder()
///     .model("gemini-2.0-flash")
///     .strategy(VerificationStrategy::Model)
///     .build()
///     .unwrap();
/// assert_eq!(config.strategy, VerificationStrategy::Model);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// `edgequake-llm` provider name (`"gemini"`, `"openai"`, `"anthropic"`, …).
    ///
    /// `None` talks to `base_url` directly as an OpenAI-compatible
    /// chat-completions endpoint, which is how Gemini is reached by default.
    pub provider_name: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint. Default: Gemini.
    pub base_url: String,

    /// Bearer key for `base_url`. Falls back to `GEMINI_API_KEY`.
    pub api_key: Option<String>,

    /// Model for field extraction. Default: `gemini-2.0-flash-lite`.
    pub model: String,

    /// Model for verification and face location. Default: `gemini-2.0-flash`.
    pub alt_model: String,

    /// Pre-constructed chat backend. Takes precedence over `provider_name`.
    pub chat_backend: Option<Arc<dyn ChatBackend>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Field extraction is transcription; low temperature keeps the model
    /// faithful to what is printed on the page.
    pub temperature: f32,

    /// Maximum tokens per reply. Default: 1024.
    pub max_tokens: usize,

    /// Per-call timeout in seconds for every provider call. Default: 60.
    pub api_timeout_secs: u64,

    /// Retries on a transient provider failure. Default: 1.
    pub max_retries: u32,

    /// Delay before the retry, in milliseconds. Default: 500.
    pub retry_backoff_ms: u64,

    /// Which verification strategy `verify` uses. Default: managed service.
    pub strategy: VerificationStrategy,

    /// Similarity threshold (0–100) passed to the face service. Default: 90.
    pub similarity_threshold: f32,

    /// Model strategy only: also ask the alternate model where the holder's
    /// face is and return its crop. Default: true.
    pub locate_face: bool,

    /// AWS region of the face service. Falls back to `AWS_REGION`, then `us-east-1`.
    pub aws_region: Option<String>,

    /// Override of the face-service endpoint URL (tests, VPC endpoints).
    pub face_endpoint: Option<String>,

    /// Pre-constructed face-comparison service. Takes precedence over AWS settings.
    pub face_service: Option<Arc<dyn FaceComparisonService>>,

    /// Address the HTTP server binds to. Default: `127.0.0.1:8000`.
    pub bind_addr: String,

    /// Largest accepted request body in bytes. Default: 10 MiB.
    pub max_upload_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            provider_name: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            alt_model: DEFAULT_ALT_MODEL.to_string(),
            chat_backend: None,
            temperature: 0.1,
            max_tokens: 1024,
            api_timeout_secs: 60,
            max_retries: 1,
            retry_backoff_ms: 500,
            strategy: VerificationStrategy::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            locate_face: true,
            aws_region: None,
            face_endpoint: None,
            face_service: None,
            bind_addr: "127.0.0.1:8000".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("provider_name", &self.provider_name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("alt_model", &self.alt_model)
            .field("chat_backend", &self.chat_backend.as_ref().map(|b| b.name().to_string()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("strategy", &self.strategy)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("locate_face", &self.locate_face)
            .field("aws_region", &self.aws_region)
            .field("face_endpoint", &self.face_endpoint)
            .field("face_service", &self.face_service.as_ref().map(|_| "<dyn FaceComparisonService>"))
            .field("bind_addr", &self.bind_addr)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn alt_model(mut self, model: impl Into<String>) -> Self {
        self.config.alt_model = model.into();
        self
    }

    pub fn chat_backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.config.chat_backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn strategy(mut self, strategy: VerificationStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    pub fn locate_face(mut self, v: bool) -> Self {
        self.config.locate_face = v;
        self
    }

    pub fn aws_region(mut self, region: impl Into<String>) -> Self {
        self.config.aws_region = Some(region.into());
        self
    }

    pub fn face_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.face_endpoint = Some(url.into());
        self
    }

    pub fn face_service(mut self, service: Arc<dyn FaceComparisonService>) -> Self {
        self.config.face_service = Some(service);
        self
    }

    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_addr = addr.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, PassportError> {
        let c = &self.config;
        if c.model.trim().is_empty() || c.alt_model.trim().is_empty() {
            return Err(PassportError::InvalidConfig("model names must not be empty".into()));
        }
        if !(0.0..=100.0).contains(&c.similarity_threshold) {
            return Err(PassportError::InvalidConfig(format!(
                "similarity threshold must be 0–100, got {}",
                c.similarity_threshold
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(PassportError::InvalidConfig("API timeout must be ≥ 1s".into()));
        }
        if c.max_tokens == 0 {
            return Err(PassportError::InvalidConfig("max tokens must be ≥ 1".into()));
        }
        if c.max_upload_bytes == 0 {
            return Err(PassportError::InvalidConfig("upload limit must be ≥ 1 byte".into()));
        }
        c.bind_addr.parse::<SocketAddr>().map_err(|e| {
            PassportError::InvalidConfig(format!("bind address '{}': {e}", c.bind_addr))
        })?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How `verify` decides whether the selfie matches the passport.
///
/// | Strategy | Decided by | Score |
/// |----------|------------|-------|
/// | `Managed` | face-comparison service (Rekognition) | similarity 0–100 |
/// | `Model` | vision model judgment | confidence 0.0–1.0 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStrategy {
    /// Managed face-comparison service. (default)
    #[default]
    Managed,
    /// Same-person judgment from the vision model.
    Model,
}

impl FromStr for VerificationStrategy {
    type Err = PassportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "managed" | "rekognition" => Ok(VerificationStrategy::Managed),
            "model" | "llm" => Ok(VerificationStrategy::Model),
            other => Err(PassportError::InvalidConfig(format!(
                "unknown verification strategy '{other}' (expected 'managed' or 'model')"
            ))),
        }
    }
}

impl fmt::Display for VerificationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VerificationStrategy::Managed => "managed",
            VerificationStrategy::Model => "model",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ServiceConfig::builder().build().unwrap();
        assert_eq!(c.model, "gemini-2.0-flash-lite");
        assert_eq!(c.alt_model, "gemini-2.0-flash");
        assert_eq!(c.similarity_threshold, 90.0);
        assert_eq!(c.max_retries, 1);
        assert_eq!(c.strategy, VerificationStrategy::Managed);
        assert!(c.provider_name.is_none());
    }

    #[test]
    fn rejects_bad_threshold() {
        let err = ServiceConfig::builder()
            .similarity_threshold(120.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, PassportError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(ServiceConfig::builder().api_timeout_secs(0).build().is_err());
    }

    #[test]
    fn rejects_bad_bind_addr() {
        assert!(ServiceConfig::builder().bind_addr("nowhere").build().is_err());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = ServiceConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("managed".parse::<VerificationStrategy>().unwrap(), VerificationStrategy::Managed);
        assert_eq!("MODEL".parse::<VerificationStrategy>().unwrap(), VerificationStrategy::Model);
        assert!("coin-flip".parse::<VerificationStrategy>().is_err());
        assert_eq!(VerificationStrategy::Model.to_string(), "model");
    }

    #[test]
    fn debug_redacts_key() {
        let c = ServiceConfig::builder().api_key("secret-key").build().unwrap();
        let s = format!("{c:?}");
        assert!(!s.contains("secret-key"));
        assert!(s.contains("<redacted>"));
    }
}
