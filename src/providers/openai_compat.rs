//! Chat backend for any OpenAI-compatible `/chat/completions` endpoint.
//!
//! The default base URL is Gemini's OpenAI-compatible surface, which
//! accepts image parts as data URLs and honours `response_format` with a
//! JSON schema.

use crate::config::ServiceConfig;
use crate::error::PassportError;
use crate::pipeline::llm::{ChatBackend, ChatRequest};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

/// Environment variable read when no API key is configured.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const PROVIDER: &str = "openai-compatible";

/// `reqwest` client for an OpenAI-compatible chat endpoint.
#[derive(Clone)]
pub struct OpenAiCompatBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiCompatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatBackend")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatBackend {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        }
    }

    /// Backend from the config's base URL and key, falling back to
    /// `GEMINI_API_KEY`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, PassportError> {
        let key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PassportError::ProviderNotConfigured {
                provider: PROVIDER.to_string(),
                hint: format!("Set {API_KEY_ENV} or pass an API key"),
            })?;
        Ok(Self::new(&config.base_url, key))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Request body for one chat completion.
fn request_body(request: &ChatRequest<'_>) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": [
            { "role": "system", "content": request.instruction },
            { "role": "user", "content": request.content.to_openai_parts() },
        ],
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    });
    if let Some(schema) = request.schema {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "schema": schema.to_json_schema(),
                "strict": true,
            },
        });
    }
    body
}

/// Best-effort error message out of an error body (object or array form).
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.pointer("/0/error/message"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

fn reply_text(body: &Value) -> Option<&str> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(&self, request: ChatRequest<'_>) -> Result<String, PassportError> {
        let body = request_body(&request);
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PassportError::upstream(PROVIDER, None, e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PassportError::upstream(PROVIDER, Some(status.as_u16()), e.to_string()))?;
        if !status.is_success() {
            return Err(PassportError::upstream(
                PROVIDER,
                Some(status.as_u16()),
                error_message(&text),
            ));
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| {
            PassportError::upstream(PROVIDER, Some(status.as_u16()), format!("unreadable reply: {e}"))
        })?;
        if let Some(usage) = value.get("usage") {
            debug!("{}: usage {}", request.model, usage);
        }
        reply_text(&value).map(str::to_string).ok_or_else(|| {
            PassportError::upstream(
                PROVIDER,
                Some(status.as_u16()),
                "reply has no message content",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::content::build_content;
    use crate::pipeline::encode::EmbeddableImage;
    use crate::pipeline::schema::{FieldKind, FieldSpec, OutputSchema};
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    /// Serve `reply` with `status` on `/v1/chat/completions`, recording requests.
    async fn fake_endpoint(status: StatusCode, reply: Value) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(
                    move |State(seen): State<Seen>,
                          headers: axum::http::HeaderMap,
                          Json(body): Json<Value>| {
                        let reply = reply.clone();
                        async move {
                            let auth = headers
                                .get("authorization")
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string);
                            seen.lock().unwrap().push((auth, body));
                            (status, Json(reply))
                        }
                    },
                ),
            )
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/v1/"), seen)
    }

    fn schema() -> OutputSchema {
        OutputSchema::new(
            "probe",
            vec![FieldSpec::new("name", FieldKind::String, "a name")],
        )
    }

    #[test]
    fn body_carries_schema_and_images() {
        let img = EmbeddableImage::new(b"abc".to_vec(), "image/png");
        let content = build_content("look", [&img]);
        let schema = schema();
        let body = request_body(&ChatRequest {
            model: "m",
            instruction: "be precise",
            content: &content,
            schema: Some(&schema),
            temperature: 0.1,
            max_tokens: 64,
        });
        assert_eq!(body["messages"][0]["content"], "be precise");
        assert_eq!(body["messages"][1]["content"][0]["text"], "look");
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,YWJj"
        );
        assert_eq!(body["response_format"]["json_schema"]["name"], "probe");
        assert_eq!(body["max_tokens"], 64);
    }

    #[test]
    fn body_without_schema_has_no_response_format() {
        let content = build_content("hi", Vec::<&EmbeddableImage>::new());
        let body = request_body(&ChatRequest {
            model: "m",
            instruction: "",
            content: &content,
            schema: None,
            temperature: 0.0,
            max_tokens: 1,
        });
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn error_message_handles_both_shapes() {
        assert_eq!(
            error_message(r#"{"error":{"message":"bad key"}}"#),
            "bad key"
        );
        assert_eq!(
            error_message(r#"[{"error":{"code":400,"message":"nope"}}]"#),
            "nope"
        );
        assert_eq!(error_message("plain text\n"), "plain text");
    }

    #[tokio::test]
    async fn returns_message_content() {
        let (base, seen) = fake_endpoint(
            StatusCode::OK,
            json!({"choices":[{"message":{"role":"assistant","content":"{\"name\":\"A\"}"}}]}),
        )
        .await;
        let backend = OpenAiCompatBackend::new(&base, "k-123");
        let content = build_content("hi", Vec::<&EmbeddableImage>::new());
        let reply = backend
            .chat(ChatRequest {
                model: "gemini-2.0-flash-lite",
                instruction: "sys",
                content: &content,
                schema: None,
                temperature: 0.1,
                max_tokens: 10,
            })
            .await
            .unwrap();
        assert_eq!(reply, r#"{"name":"A"}"#);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("Bearer k-123"));
        assert_eq!(seen[0].1["model"], "gemini-2.0-flash-lite");
    }

    #[tokio::test]
    async fn http_failure_keeps_status() {
        let (base, _) = fake_endpoint(
            StatusCode::TOO_MANY_REQUESTS,
            json!({"error":{"message":"quota exceeded"}}),
        )
        .await;
        let backend = OpenAiCompatBackend::new(&base, "k");
        let content = build_content("hi", Vec::<&EmbeddableImage>::new());
        let err = backend
            .chat(ChatRequest {
                model: "m",
                instruction: "",
                content: &content,
                schema: None,
                temperature: 0.1,
                max_tokens: 10,
            })
            .await
            .unwrap_err();
        match &err {
            PassportError::Upstream {
                status, message, ..
            } => {
                assert_eq!(*status, Some(429));
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[test]
    fn missing_key_is_not_configured() {
        let config = ServiceConfig::builder().base_url("http://x/").build().unwrap();
        // Only meaningful when the variable is absent in the test environment.
        if std::env::var(API_KEY_ENV).is_err() {
            let err = OpenAiCompatBackend::from_config(&config).unwrap_err();
            assert!(matches!(err, PassportError::ProviderNotConfigured { .. }));
        }
        let with_key = ServiceConfig::builder()
            .base_url("http://x/")
            .api_key("k")
            .build()
            .unwrap();
        let backend = OpenAiCompatBackend::from_config(&with_key).unwrap();
        assert_eq!(backend.endpoint(), "http://x/chat/completions");
    }
}
