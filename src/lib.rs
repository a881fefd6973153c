//! # passport-verify
//!
//! Read passports and check selfies against them using vision models and a
//! managed face-comparison service.
//!
//! Two operations, available as a library, an HTTP service and a CLI:
//!
//! * **Extraction**: a passport image goes to a vision model with a
//!   structured-output contract and comes back as a [`PassportRecord`]
//!   (nationality, names, passport type, dates, personal number, gender).
//! * **Verification**: a selfie and a passport image are compared and the
//!   result is a [`VerificationResult`] carrying the decision, a confidence
//!   score and the holder's face cropped from the passport.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Encode    bytes + MIME → data URL           (pipeline::encode)
//!  ├─ 2. Content   instruction text + images         (pipeline::content)
//!  ├─ 3. Complete  timeout, one retry, schema check  (pipeline::llm, providers)
//!  ├─ 4. Compare   CompareFaces or model judgment    (verify)
//!  └─ 5. Crop      box → clipped rect → PNG          (pipeline::crop, spawn_blocking)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use passport_verify::{EmbeddableImage, PassportService, ServiceConfig, VerificationStrategy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Key from GEMINI_API_KEY; model judgment needs no AWS credentials.
//!     let config = ServiceConfig::builder()
//!         .strategy(VerificationStrategy::Model)
//!         .build()?;
//!     let service = PassportService::new(&config)?;
//!
//!     let passport = EmbeddableImage::new(std::fs::read("passport.jpg")?, "image/jpeg");
//!     let selfie = EmbeddableImage::new(std::fs::read("selfie.jpg")?, "image/jpeg");
//!
//!     let record = service.extract_passport_info(&passport).await?;
//!     println!("{} {}", record.full_name, record.surname);
//!
//!     let result = service.verify(&selfie, &passport).await?;
//!     println!("match: {} ({})", result.is_match, result.confidence_score);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `passport-verify` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod server;
pub mod service;
pub mod verify;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder, VerificationStrategy};
pub use error::{ErrorCategory, PassportError};
pub use extract::{extract_passport_info, PassportRecord};
pub use pipeline::crop::{crop, BoundingBox, FractionalBox, PixelBox, PixelRect};
pub use pipeline::encode::{decode, encode, EmbeddableImage};
pub use pipeline::llm::{ChatBackend, ChatRequest, Completion, CompletionClient};
pub use service::PassportService;
pub use verify::{
    CompareFacesRequest, CompareFacesResponse, ComparedFace, FaceComparisonService, FaceMatch,
    FaceServiceError, ScoreScale, VerificationResult, Verifier,
};
