//! Verification through a vision model's same-person judgment.
//!
//! The model sees the selfie first and the passport second and answers with
//! a [`PersonVerification`]. When a locator client is configured, a second
//! call asks where the holder's photo sits on the passport
//! ([`FaceLocation`], pixel coordinates) and that region is cropped and
//! attached to the result. A failure in that second call is logged and
//! leaves the result without a face.

use super::{FaceMatchStrategy, ScoreScale, VerificationResult};
use crate::config::VerificationStrategy;
use crate::error::PassportError;
use crate::pipeline::content::build_content;
use crate::pipeline::crop::{crop_blocking, image_dimensions, PixelBox};
use crate::pipeline::encode::EmbeddableImage;
use crate::pipeline::llm::CompletionClient;
use crate::pipeline::schema::{FieldKind, FieldSpec, OutputSchema, StructuredOutput};
use crate::prompts::{
    face_location_user_text, FACE_LOCATION_PROMPT, PERSON_VERIFICATION_PROMPT,
    PERSON_VERIFICATION_USER_TEXT,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Same-person judgment returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonVerification {
    pub same_person: bool,
    /// 0.0–1.0
    pub confidence_score: f64,
    pub reasoning: String,
}

impl StructuredOutput for PersonVerification {
    fn schema() -> OutputSchema {
        OutputSchema::new(
            "person_verification",
            vec![
                FieldSpec::new(
                    "same_person",
                    FieldKind::Boolean,
                    "Whether both images show the same person",
                ),
                FieldSpec::new(
                    "confidence_score",
                    FieldKind::Number,
                    "Confidence in the judgment, 0.0 to 1.0",
                ),
                FieldSpec::new("reasoning", FieldKind::String, "Short explanation"),
            ],
        )
    }
}

/// Where the holder's photo is on the passport, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceLocation {
    pub face_found: bool,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl FaceLocation {
    pub fn bounding_box(&self) -> Option<PixelBox> {
        self.face_found.then_some(PixelBox {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        })
    }
}

impl StructuredOutput for FaceLocation {
    fn schema() -> OutputSchema {
        OutputSchema::new(
            "face_location",
            vec![
                FieldSpec::new("face_found", FieldKind::Boolean, "Whether a face was found"),
                FieldSpec::new("x", FieldKind::Integer, "Left edge in pixels"),
                FieldSpec::new("y", FieldKind::Integer, "Top edge in pixels"),
                FieldSpec::new("width", FieldKind::Integer, "Width in pixels"),
                FieldSpec::new("height", FieldKind::Integer, "Height in pixels"),
            ],
        )
    }
}

/// [`FaceMatchStrategy`] backed by model judgment.
pub struct ModelJudgmentStrategy {
    judge: CompletionClient,
    locator: Option<CompletionClient>,
}

impl ModelJudgmentStrategy {
    /// `locator`, when given, is used to find and crop the passport face.
    pub fn new(judge: CompletionClient, locator: Option<CompletionClient>) -> Self {
        Self { judge, locator }
    }
}

#[async_trait]
impl FaceMatchStrategy for ModelJudgmentStrategy {
    fn kind(&self) -> VerificationStrategy {
        VerificationStrategy::Model
    }

    async fn verify(
        &self,
        selfie: &EmbeddableImage,
        passport: &EmbeddableImage,
    ) -> Result<VerificationResult, PassportError> {
        let content = build_content(PERSON_VERIFICATION_USER_TEXT, [selfie, passport]);
        let judgment: PersonVerification = self
            .judge
            .complete_as(PERSON_VERIFICATION_PROMPT, &content)
            .await?;
        info!(
            "Model verification ({}): same_person={} confidence={:.2}",
            self.judge.model(),
            judgment.same_person,
            judgment.confidence_score
        );

        // The verdict stands on its own; a failed crop only drops the face.
        let detected_face = match &self.locator {
            Some(locator) => match locate_face(locator, passport).await {
                Ok(face) => face,
                Err(e) => {
                    warn!("Face location failed, returning verdict without a face: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(VerificationResult {
            is_match: judgment.same_person,
            confidence_score: judgment.confidence_score,
            score_scale: ScoreScale::Unit,
            detected_face,
            reasoning: Some(judgment.reasoning),
            strategy: VerificationStrategy::Model,
        })
    }
}

/// Ask the model where the holder's photo is and crop it.
///
/// `Ok(None)` when the model reports no face.
pub async fn locate_face(
    client: &CompletionClient,
    passport: &EmbeddableImage,
) -> Result<Option<EmbeddableImage>, PassportError> {
    let (width, height) = image_dimensions(passport.bytes())?;
    let content = build_content(face_location_user_text(width, height), [passport]);
    let location: FaceLocation = client.complete_as(FACE_LOCATION_PROMPT, &content).await?;

    let Some(bbox) = location.bounding_box() else {
        debug!("Model found no face on the passport");
        return Ok(None);
    };
    crop_blocking(passport.bytes().to_vec(), bbox.into())
        .await
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_location_box_only_when_found() {
        let found = FaceLocation {
            face_found: true,
            x: 1,
            y: 2,
            width: 3,
            height: 4,
        };
        assert_eq!(
            found.bounding_box(),
            Some(PixelBox {
                x: 1,
                y: 2,
                width: 3,
                height: 4
            })
        );
        let missing = FaceLocation {
            face_found: false,
            ..found
        };
        assert_eq!(missing.bounding_box(), None);
    }

    #[test]
    fn verification_schema_matches_struct() {
        let schema = PersonVerification::schema();
        let value = schema
            .parse_reply(r#"{"same_person": true, "confidence_score": 0.92, "reasoning": "same jawline"}"#)
            .unwrap();
        let parsed: PersonVerification = schema.decode(value).unwrap();
        assert!(parsed.same_person);
        assert_eq!(parsed.confidence_score, 0.92);
    }

    #[test]
    fn integer_like_floats_decode_into_location() {
        let schema = FaceLocation::schema();
        let value = schema
            .parse_reply(r#"{"face_found": true, "x": 10.0, "y": 20, "width": 30, "height": 40}"#)
            .unwrap();
        let loc: FaceLocation = schema.decode(value).unwrap();
        assert_eq!(loc.x, 10);
    }
}
