//! Selfie ↔ passport verification.
//!
//! Two interchangeable strategies implement [`FaceMatchStrategy`]:
//!
//! | Strategy | Module | Decided by |
//! |----------|--------|------------|
//! | [`ManagedServiceStrategy`] | [`managed`] | a face-comparison service ([`FaceComparisonService`]) |
//! | [`ModelJudgmentStrategy`]  | [`model`]   | a vision model's same-person judgment |
//!
//! [`Verifier`] holds whichever one the configuration selects and is the
//! only entry point the service and HTTP layer use.

pub mod managed;
pub mod model;

pub use managed::ManagedServiceStrategy;
pub use model::{FaceLocation, ModelJudgmentStrategy, PersonVerification};

use crate::config::VerificationStrategy;
use crate::error::PassportError;
use crate::pipeline::crop::FractionalBox;
use crate::pipeline::encode::EmbeddableImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Units of [`VerificationResult::confidence_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreScale {
    /// 0–100, as reported by the face-comparison service.
    Percent,
    /// 0.0–1.0, as reported by the model.
    Unit,
}

/// Outcome of one verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub is_match: bool,
    pub confidence_score: f64,
    pub score_scale: ScoreScale,
    /// The holder's face cropped from the passport image, as PNG.
    pub detected_face: Option<EmbeddableImage>,
    /// The model's explanation (model strategy only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub strategy: VerificationStrategy,
}

/// One way of deciding whether a selfie matches a passport.
#[async_trait]
pub trait FaceMatchStrategy: Send + Sync {
    fn kind(&self) -> VerificationStrategy;

    async fn verify(
        &self,
        selfie: &EmbeddableImage,
        passport: &EmbeddableImage,
    ) -> Result<VerificationResult, PassportError>;
}

/// The configured verification strategy.
#[derive(Clone)]
pub struct Verifier {
    strategy: Arc<dyn FaceMatchStrategy>,
}

impl Verifier {
    pub fn new(strategy: Arc<dyn FaceMatchStrategy>) -> Self {
        Self { strategy }
    }

    pub fn kind(&self) -> VerificationStrategy {
        self.strategy.kind()
    }

    /// Decide whether `selfie` shows the holder of `passport`.
    pub async fn verify(
        &self,
        selfie: &EmbeddableImage,
        passport: &EmbeddableImage,
    ) -> Result<VerificationResult, PassportError> {
        self.strategy.verify(selfie, passport).await
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("strategy", &self.strategy.kind())
            .finish()
    }
}

// ── Face-comparison service seam ─────────────────────────────────────────

/// Input of [`FaceComparisonService::compare_faces`].
#[derive(Debug, Clone, Copy)]
pub struct CompareFacesRequest<'a> {
    /// Image holding the face to look for (the selfie).
    pub source: &'a [u8],
    /// Image searched for that face (the passport).
    pub target: &'a [u8],
    /// Minimum similarity (0–100) for a face to count as a match.
    pub similarity_threshold: f32,
}

/// Faces found in the target image.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompareFacesResponse {
    #[serde(default)]
    pub face_matches: Vec<FaceMatch>,
    #[serde(default)]
    pub unmatched_faces: Vec<ComparedFace>,
}

/// A target face at or above the similarity threshold.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FaceMatch {
    pub similarity: f64,
    pub face: ComparedFace,
}

/// A face detected in the target image.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ComparedFace {
    pub bounding_box: FractionalBox,
    /// Detection confidence (0–100).
    #[serde(default)]
    pub confidence: f64,
}

/// Failure of a face-comparison call.
#[derive(Debug, Error)]
pub enum FaceServiceError {
    /// The service refused one of the images (no detectable face,
    /// unsupported format, too large).
    #[error("{code}: {message}")]
    Rejected { code: String, message: String },

    /// Transport, auth, throttling or anything else.
    #[error(transparent)]
    Other(#[from] PassportError),
}

/// A managed face-comparison provider.
#[async_trait]
pub trait FaceComparisonService: Send + Sync {
    fn name(&self) -> &str;

    async fn compare_faces(
        &self,
        request: CompareFacesRequest<'_>,
    ) -> Result<CompareFacesResponse, FaceServiceError>;
}
