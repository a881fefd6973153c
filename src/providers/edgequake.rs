//! Chat backend over `edgequake-llm` providers.
//!
//! `edgequake-llm` binds a provider to one model at construction, so the
//! backend keeps one provider per configured model name (the default model
//! and the alternate verification model). Structured output is requested by
//! appending the JSON schema to the system instruction; the reply is then
//! validated like any other.

use crate::error::PassportError;
use crate::pipeline::llm::{ChatBackend, ChatRequest};
use crate::prompts::schema_suffix;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// [`ChatBackend`] dispatching to one `edgequake-llm` provider per model.
pub struct EdgequakeBackend {
    provider_name: String,
    providers: HashMap<String, Arc<dyn LLMProvider>>,
}

impl std::fmt::Debug for EdgequakeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut models: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        models.sort_unstable();
        f.debug_struct("EdgequakeBackend")
            .field("provider_name", &self.provider_name)
            .field("models", &models)
            .finish()
    }
}

impl EdgequakeBackend {
    /// Create a provider named `provider_name` for each of `models`.
    ///
    /// Provider credentials are read from the environment by
    /// [`ProviderFactory::create_llm_provider`].
    pub fn new<'a>(
        provider_name: &str,
        models: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, PassportError> {
        let mut providers = HashMap::new();
        for model in models {
            if providers.contains_key(model) {
                continue;
            }
            let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
                PassportError::ProviderNotConfigured {
                    provider: provider_name.to_string(),
                    hint: format!("{e}"),
                }
            })?;
            providers.insert(model.to_string(), provider);
        }
        Ok(Self::with_providers(provider_name, providers))
    }

    /// Use already constructed providers, keyed by model name.
    pub fn with_providers(
        provider_name: impl Into<String>,
        providers: HashMap<String, Arc<dyn LLMProvider>>,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            providers,
        }
    }

    fn provider_for(&self, model: &str) -> Result<&Arc<dyn LLMProvider>, PassportError> {
        self.providers.get(model).ok_or_else(|| {
            PassportError::InvalidConfig(format!(
                "no {} provider configured for model '{model}'",
                self.provider_name
            ))
        })
    }
}

/// System instruction with the structured-output contract appended.
fn system_instruction(request: &ChatRequest<'_>) -> String {
    match request.schema {
        Some(schema) => format!(
            "{}{}",
            request.instruction,
            schema_suffix(&schema.to_json_schema().to_string())
        ),
        None => request.instruction.to_string(),
    }
}

fn build_messages(request: &ChatRequest<'_>) -> Vec<ChatMessage> {
    let images: Vec<ImageData> = request
        .content
        .images()
        .map(|img| ImageData::new(img.base64(), img.mime()))
        .collect();
    vec![
        ChatMessage::system(system_instruction(request)),
        ChatMessage::user_with_images(request.content.text(), images),
    ]
}

#[async_trait]
impl ChatBackend for EdgequakeBackend {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn chat(&self, request: ChatRequest<'_>) -> Result<String, PassportError> {
        let provider = self.provider_for(request.model)?;
        let messages = build_messages(&request);
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let start = Instant::now();
        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| PassportError::upstream(&self.provider_name, None, format!("{e}")))?;
        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            request.model,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}
