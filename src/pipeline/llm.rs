//! Completion client: one instruction + content in, text or a validated
//! structured object out.
//!
//! The client itself knows nothing about HTTP. It hands a [`ChatRequest`] to
//! a [`ChatBackend`] (see [`crate::providers`]) and owns the policy around
//! that call:
//!
//! * every call is bounded by `api_timeout_secs`;
//! * a transient failure (429, 5xx, dropped connection, timeout) is retried
//!   once after `retry_backoff_ms`; anything else is returned immediately;
//! * with a schema, the reply is validated before it reaches the caller and
//!   a mismatch is a [`PassportError::SchemaValidation`].
//!
//! Failures are always returned, never logged and replaced by a default.

use crate::config::ServiceConfig;
use crate::error::PassportError;
use crate::pipeline::content::ContentPayload;
use crate::pipeline::schema::{OutputSchema, StructuredOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Everything a backend needs to issue one chat completion.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    /// System instruction.
    pub instruction: &'a str,
    /// User content (text first, then images).
    pub content: &'a ContentPayload,
    /// Structured-output contract, when one is requested.
    pub schema: Option<&'a OutputSchema>,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// A chat-completion provider.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Provider name used in logs and error messages.
    fn name(&self) -> &str;

    /// Issue one completion and return the assistant message text.
    async fn chat(&self, request: ChatRequest<'_>) -> Result<String, PassportError>;
}

/// Reply of [`CompletionClient::complete`].
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    Structured(Value),
}

/// Completion client bound to one model.
#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn ChatBackend>,
    model: String,
    temperature: f32,
    max_tokens: usize,
    api_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("api_timeout", &self.api_timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl CompletionClient {
    /// Client on the default model with the config's call policy.
    pub fn new(backend: Arc<dyn ChatBackend>, config: &ServiceConfig) -> Self {
        Self {
            backend,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_timeout: Duration::from_secs(config.api_timeout_secs),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Same backend and policy, different model.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `instruction` + `content`; validate against `schema` if given.
    pub async fn complete(
        &self,
        instruction: &str,
        content: &ContentPayload,
        schema: Option<&OutputSchema>,
    ) -> Result<Completion, PassportError> {
        let request = ChatRequest {
            model: &self.model,
            instruction,
            content,
            schema,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let reply = self.call_with_retry(request).await?;

        match schema {
            None => Ok(Completion::Text(reply)),
            Some(schema) => schema.parse_reply(&reply).map(Completion::Structured),
        }
    }

    /// Typed variant of [`complete`](Self::complete).
    pub async fn complete_as<T: StructuredOutput>(
        &self,
        instruction: &str,
        content: &ContentPayload,
    ) -> Result<T, PassportError> {
        let schema = T::schema();
        match self.complete(instruction, content, Some(&schema)).await? {
            Completion::Structured(value) => schema.decode(value),
            Completion::Text(_) => Err(PassportError::Internal(
                "structured request returned plain text".into(),
            )),
        }
    }

    async fn call_with_retry(&self, request: ChatRequest<'_>) -> Result<String, PassportError> {
        let start = Instant::now();
        let mut attempt = 0;
        loop {
            match self.call_once(request.clone()).await {
                Ok(reply) => {
                    debug!(
                        "{} ({}): {} chars in {:?}",
                        self.backend.name(),
                        self.model,
                        reply.len(),
                        start.elapsed()
                    );
                    return Ok(reply);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "{}: attempt {} failed, retrying in {:?}: {}",
                        self.backend.name(),
                        attempt,
                        self.retry_backoff,
                        e
                    );
                    sleep(self.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once(&self, request: ChatRequest<'_>) -> Result<String, PassportError> {
        match timeout(self.api_timeout, self.backend.chat(request)).await {
            Ok(result) => result,
            Err(_) => Err(PassportError::Timeout {
                provider: self.backend.name().to_string(),
                secs: self.api_timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::content::build_content;
    use crate::pipeline::encode::EmbeddableImage;
    use crate::pipeline::schema::{FieldKind, FieldSpec};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned results and records the requests it saw.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, PassportError>>>,
        seen: Mutex<Vec<(String, usize, bool)>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, PassportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, request: ChatRequest<'_>) -> Result<String, PassportError> {
            self.seen.lock().unwrap().push((
                request.model.to_string(),
                request.content.images().count(),
                request.schema.is_some(),
            ));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PassportError::Internal("script exhausted".into())))
        }
    }

    struct Hangs;

    #[async_trait]
    impl ChatBackend for Hangs {
        fn name(&self) -> &str {
            "hangs"
        }

        async fn chat(&self, _request: ChatRequest<'_>) -> Result<String, PassportError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn config() -> ServiceConfig {
        ServiceConfig::builder()
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    fn flag_schema() -> OutputSchema {
        OutputSchema::new(
            "flag",
            vec![FieldSpec::new("ok", FieldKind::Boolean, "flag")],
        )
    }

    fn content() -> ContentPayload {
        let img = EmbeddableImage::new(b"img".to_vec(), "image/png");
        build_content("look", [&img])
    }

    #[tokio::test]
    async fn plain_text_reply() {
        let backend = Scripted::new(vec![Ok("hello".into())]);
        let client = CompletionClient::new(backend.clone(), &config());
        let out = client.complete("sys", &content(), None).await.unwrap();
        assert_eq!(out, Completion::Text("hello".into()));
        assert_eq!(
            backend.seen.lock().unwrap()[0],
            ("gemini-2.0-flash-lite".to_string(), 1, false)
        );
    }

    #[tokio::test]
    async fn structured_reply_is_validated() {
        let backend = Scripted::new(vec![Ok("```json\n{\"ok\": true}\n```".into())]);
        let client = CompletionClient::new(backend, &config());
        let out = client
            .complete("sys", &content(), Some(&flag_schema()))
            .await
            .unwrap();
        assert_eq!(out, Completion::Structured(serde_json::json!({"ok": true})));
    }

    #[tokio::test]
    async fn schema_mismatch_is_not_retried() {
        let backend = Scripted::new(vec![Ok("{}".into()), Ok("{\"ok\": true}".into())]);
        let client = CompletionClient::new(backend.clone(), &config());
        let err = client
            .complete("sys", &content(), Some(&flag_schema()))
            .await
            .unwrap_err();
        assert!(matches!(err, PassportError::SchemaValidation { .. }));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failure_retried_once() {
        let backend = Scripted::new(vec![
            Err(PassportError::upstream("scripted", Some(503), "busy")),
            Ok("fine".into()),
        ]);
        let client = CompletionClient::new(backend.clone(), &config());
        let out = client.complete("sys", &content(), None).await.unwrap();
        assert_eq!(out, Completion::Text("fine".into()));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn second_transient_failure_surfaces() {
        let backend = Scripted::new(vec![
            Err(PassportError::upstream("scripted", Some(503), "busy")),
            Err(PassportError::upstream("scripted", Some(429), "slow down")),
            Ok("never".into()),
        ]);
        let client = CompletionClient::new(backend.clone(), &config());
        let err = client.complete("sys", &content(), None).await.unwrap_err();
        assert!(matches!(
            err,
            PassportError::Upstream {
                status: Some(429),
                ..
            }
        ));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn permanent_failure_not_retried() {
        let backend = Scripted::new(vec![
            Err(PassportError::upstream("scripted", Some(401), "bad key")),
            Ok("never".into()),
        ]);
        let client = CompletionClient::new(backend.clone(), &config());
        let err = client.complete("sys", &content(), None).await.unwrap_err();
        assert!(matches!(
            err,
            PassportError::Upstream {
                status: Some(401),
                ..
            }
        ));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn hung_call_times_out() {
        let config = ServiceConfig::builder()
            .api_timeout_secs(1)
            .max_retries(0)
            .build()
            .unwrap();
        let client = CompletionClient::new(Arc::new(Hangs), &config);
        let err = client.complete("sys", &content(), None).await.unwrap_err();
        assert!(matches!(err, PassportError::Timeout { secs: 1, .. }));
    }

    #[tokio::test]
    async fn with_model_switches_model_only() {
        let backend = Scripted::new(vec![Ok("a".into())]);
        let client = CompletionClient::new(backend.clone(), &config()).with_model("alt");
        client.complete("sys", &content(), None).await.unwrap();
        assert_eq!(backend.seen.lock().unwrap()[0].0, "alt");
    }
}
