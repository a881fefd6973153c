//! The assembled service: one completion client, one verifier.
//!
//! [`PassportService::new`] resolves every collaborator from a
//! [`ServiceConfig`] once, at startup. The result is immutable and shared
//! across requests behind an `Arc`.

use crate::config::{ServiceConfig, VerificationStrategy};
use crate::error::PassportError;
use crate::extract::{self, PassportRecord};
use crate::pipeline::encode::EmbeddableImage;
use crate::pipeline::llm::{ChatBackend, CompletionClient};
use crate::providers::{EdgequakeBackend, OpenAiCompatBackend, RekognitionClient};
use crate::verify::{
    FaceComparisonService, ManagedServiceStrategy, ModelJudgmentStrategy, VerificationResult,
    Verifier,
};
use std::sync::Arc;
use tracing::info;

/// Extraction and verification behind one handle.
#[derive(Debug, Clone)]
pub struct PassportService {
    client: CompletionClient,
    verifier: Verifier,
}

impl PassportService {
    /// Build the service.
    ///
    /// Chat backend, most specific first:
    /// 1. `config.chat_backend` if injected;
    /// 2. `config.provider_name` via `edgequake-llm` (default and alternate
    ///    models);
    /// 3. the OpenAI-compatible endpoint at `config.base_url`.
    ///
    /// The face-comparison client is only required for the managed
    /// strategy: an injected `config.face_service`, else Rekognition with
    /// credentials from the environment.
    pub fn new(config: &ServiceConfig) -> Result<Self, PassportError> {
        let backend = resolve_backend(config)?;
        let client = CompletionClient::new(backend, config);

        let verifier = match config.strategy {
            VerificationStrategy::Managed => {
                let service = resolve_face_service(config)?;
                Verifier::new(Arc::new(ManagedServiceStrategy::new(service, config)))
            }
            VerificationStrategy::Model => {
                let judge = client.with_model(&config.alt_model);
                let locator = config.locate_face.then(|| judge.clone());
                Verifier::new(Arc::new(ModelJudgmentStrategy::new(judge, locator)))
            }
        };

        info!(
            "Passport service ready: model={} strategy={}",
            client.model(),
            verifier.kind()
        );
        Ok(Self { client, verifier })
    }

    pub fn strategy(&self) -> VerificationStrategy {
        self.verifier.kind()
    }

    /// Read the data-page fields off a passport image.
    pub async fn extract_passport_info(
        &self,
        passport: &EmbeddableImage,
    ) -> Result<PassportRecord, PassportError> {
        extract::extract_passport_info(&self.client, passport).await
    }

    /// Decide whether `selfie` shows the holder of `passport`.
    pub async fn verify(
        &self,
        selfie: &EmbeddableImage,
        passport: &EmbeddableImage,
    ) -> Result<VerificationResult, PassportError> {
        self.verifier.verify(selfie, passport).await
    }
}

fn resolve_backend(config: &ServiceConfig) -> Result<Arc<dyn ChatBackend>, PassportError> {
    if let Some(backend) = &config.chat_backend {
        return Ok(Arc::clone(backend));
    }
    if let Some(name) = &config.provider_name {
        let backend = EdgequakeBackend::new(name, [config.model.as_str(), config.alt_model.as_str()])?;
        return Ok(Arc::new(backend));
    }
    Ok(Arc::new(OpenAiCompatBackend::from_config(config)?))
}

fn resolve_face_service(
    config: &ServiceConfig,
) -> Result<Arc<dyn FaceComparisonService>, PassportError> {
    if let Some(service) = &config.face_service {
        return Ok(Arc::clone(service));
    }
    let client =
        RekognitionClient::from_env(config.aws_region.as_deref(), config.face_endpoint.as_deref())?;
    Ok(Arc::new(client))
}
