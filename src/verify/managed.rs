//! Verification through a managed face-comparison service.
//!
//! The selfie is the source image and the passport the target. The first
//! face match (if any) decides; otherwise the first unmatched face is
//! reported with `is_match = false`; a reply with neither is
//! [`PassportError::FaceNotFound`]. The face box always comes from the
//! passport image and is cropped out of it.
//!
//! The comparison call follows the same policy as model calls: bounded by
//! `api_timeout_secs` and retried once on a transient failure.

use super::{
    CompareFacesRequest, CompareFacesResponse, FaceComparisonService, FaceMatchStrategy, FaceServiceError, ScoreScale,
    VerificationResult,
};
use crate::config::{ServiceConfig, VerificationStrategy};
use crate::error::PassportError;
use crate::pipeline::crop::{crop_blocking, FractionalBox};
use crate::pipeline::encode::EmbeddableImage;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// [`FaceMatchStrategy`] backed by a [`FaceComparisonService`].
pub struct ManagedServiceStrategy {
    service: Arc<dyn FaceComparisonService>,
    similarity_threshold: f32,
    api_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ManagedServiceStrategy {
    /// Threshold and call policy are taken from `config`.
    pub fn new(service: Arc<dyn FaceComparisonService>, config: &ServiceConfig) -> Self {
        Self {
            service,
            similarity_threshold: config.similarity_threshold,
            api_timeout: Duration::from_secs(config.api_timeout_secs),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    async fn compare_with_retry(
        &self,
        request: CompareFacesRequest<'_>,
    ) -> Result<CompareFacesResponse, FaceServiceError> {
        let mut attempt = 0;
        loop {
            match self.compare_once(request).await {
                Err(FaceServiceError::Other(e)) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "{}: attempt {} failed, retrying in {:?}: {}",
                        self.service.name(),
                        attempt,
                        self.retry_backoff,
                        e
                    );
                    sleep(self.retry_backoff).await;
                }
                other => return other,
            }
        }
    }

    async fn compare_once(
        &self,
        request: CompareFacesRequest<'_>,
    ) -> Result<CompareFacesResponse, FaceServiceError> {
        match timeout(self.api_timeout, self.service.compare_faces(request)).await {
            Ok(result) => result,
            Err(_) => Err(FaceServiceError::Other(PassportError::Timeout {
                provider: self.service.name().to_string(),
                secs: self.api_timeout.as_secs(),
            })),
        }
    }
}

#[async_trait]
impl FaceMatchStrategy for ManagedServiceStrategy {
    fn kind(&self) -> VerificationStrategy {
        VerificationStrategy::Managed
    }

    async fn verify(
        &self,
        selfie: &EmbeddableImage,
        passport: &EmbeddableImage,
    ) -> Result<VerificationResult, PassportError> {
        let request = CompareFacesRequest {
            source: selfie.bytes(),
            target: passport.bytes(),
            similarity_threshold: self.similarity_threshold,
        };
        let response = self
            .compare_with_retry(request)
            .await
            .map_err(|e| match e {
                FaceServiceError::Rejected { code, message } => PassportError::InvalidImage {
                    detail: format!("{code}: {message}"),
                },
                FaceServiceError::Other(e) => e,
            })?;
        debug!(
            "{}: {} match(es), {} unmatched face(s)",
            self.service.name(),
            response.face_matches.len(),
            response.unmatched_faces.len()
        );

        let (is_match, score, bbox) = if let Some(m) = response.face_matches.first() {
            (true, m.similarity, m.face.bounding_box)
        } else if let Some(face) = response.unmatched_faces.first() {
            (false, face.confidence, face.bounding_box)
        } else {
            return Err(PassportError::FaceNotFound);
        };

        let detected_face = crop_face(passport, bbox).await?;
        info!("Managed verification: match={} score={:.1}", is_match, score);

        Ok(VerificationResult {
            is_match,
            confidence_score: score,
            score_scale: ScoreScale::Percent,
            detected_face: Some(detected_face),
            reasoning: None,
            strategy: VerificationStrategy::Managed,
        })
    }
}

async fn crop_face(
    passport: &EmbeddableImage,
    bbox: FractionalBox,
) -> Result<EmbeddableImage, PassportError> {
    crop_blocking(passport.bytes().to_vec(), bbox.into()).await
}
