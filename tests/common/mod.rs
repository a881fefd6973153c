//! Stub providers and synthetic images shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use passport_verify::prompts::{FACE_LOCATION_PROMPT, PERSON_VERIFICATION_PROMPT};
use passport_verify::{
    ChatBackend, ChatRequest, CompareFacesRequest, CompareFacesResponse, EmbeddableImage,
    FaceComparisonService, FaceServiceError, PassportError,
};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;

pub const RECORD_JSON: &str = r#"{
    "nationality": "UTOPIA",
    "full_name": "ANNA MARIA",
    "surname": "ERIKSSON",
    "passport_type": "P",
    "date_of_birth": "12 AUG 1974",
    "personal_number": "ZE184226B",
    "gender": "F",
    "expiration_date": "15 APR 2027"
}"#;

/// Encode a gradient image of the given size.
pub fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap();
    buf
}

pub fn jpeg(width: u32, height: u32) -> EmbeddableImage {
    EmbeddableImage::new(image_bytes(width, height, ImageFormat::Jpeg), "image/jpeg")
}

pub fn png(width: u32, height: u32) -> EmbeddableImage {
    EmbeddableImage::new(image_bytes(width, height, ImageFormat::Png), "image/png")
}

/// What a [`ScriptedBackend`] saw for one call.
#[derive(Debug, Clone)]
pub struct SeenCall {
    pub model: String,
    pub instruction: String,
    pub text: String,
    pub image_count: usize,
    pub schema: Option<String>,
}

/// Chat backend that pops canned replies in order and records each call.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, PassportError>>>,
    pub calls: Mutex<Vec<SeenCall>>,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = Result<String, PassportError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::default(),
        }
    }

    pub fn replying(reply: &str) -> Self {
        Self::new([Ok(reply.to_string())])
    }

    pub fn calls(&self) -> Vec<SeenCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest<'_>) -> Result<String, PassportError> {
        self.calls.lock().unwrap().push(SeenCall {
            model: request.model.to_string(),
            instruction: request.instruction.to_string(),
            text: request.content.text().to_string(),
            image_count: request.content.images().count(),
            schema: request.schema.map(|s| s.name.to_string()),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PassportError::Internal("no scripted reply left".into())))
    }
}

/// Chat backend answering by instruction: a same-person judgment or a
/// face location, for the model verification strategy.
pub struct JudgeBackend {
    pub judgment: String,
    pub location: String,
    pub calls: Mutex<Vec<SeenCall>>,
}

impl JudgeBackend {
    pub fn new(judgment: &str, location: &str) -> Self {
        Self {
            judgment: judgment.to_string(),
            location: location.to_string(),
            calls: Mutex::default(),
        }
    }
}

#[async_trait]
impl ChatBackend for JudgeBackend {
    fn name(&self) -> &str {
        "judge"
    }

    async fn chat(&self, request: ChatRequest<'_>) -> Result<String, PassportError> {
        self.calls.lock().unwrap().push(SeenCall {
            model: request.model.to_string(),
            instruction: request.instruction.to_string(),
            text: request.content.text().to_string(),
            image_count: request.content.images().count(),
            schema: request.schema.map(|s| s.name.to_string()),
        });
        if request.instruction == PERSON_VERIFICATION_PROMPT {
            Ok(self.judgment.clone())
        } else if request.instruction == FACE_LOCATION_PROMPT {
            Ok(self.location.clone())
        } else {
            Err(PassportError::Internal(format!(
                "unexpected instruction: {}",
                request.instruction
            )))
        }
    }
}

/// Face-comparison service returning one canned reply to every call.
pub struct CannedFaces {
    reply: Mutex<Option<Result<CompareFacesResponse, FaceServiceError>>>,
    pub thresholds: Mutex<Vec<f32>>,
}

impl CannedFaces {
    pub fn new(reply: Result<CompareFacesResponse, FaceServiceError>) -> Self {
        Self {
            reply: Mutex::new(Some(reply)),
            thresholds: Mutex::default(),
        }
    }

    /// Reply parsed from a Rekognition-shaped JSON body.
    pub fn from_json(body: &str) -> Self {
        Self::new(Ok(serde_json::from_str(body).unwrap()))
    }
}

#[async_trait]
impl FaceComparisonService for CannedFaces {
    fn name(&self) -> &str {
        "canned"
    }

    async fn compare_faces(
        &self,
        request: CompareFacesRequest<'_>,
    ) -> Result<CompareFacesResponse, FaceServiceError> {
        self.thresholds
            .lock()
            .unwrap()
            .push(request.similarity_threshold);
        match self.reply.lock().unwrap().take() {
            Some(reply) => reply,
            None => Err(FaceServiceError::Other(PassportError::Internal(
                "canned reply already used".into(),
            ))),
        }
    }
}
