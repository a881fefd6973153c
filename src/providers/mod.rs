//! Network clients behind the [`ChatBackend`](crate::pipeline::llm::ChatBackend)
//! and [`FaceComparisonService`](crate::verify::FaceComparisonService) seams.
//!
//! | Module | Implements | Talks to |
//! |--------|------------|----------|
//! | [`openai_compat`] | `ChatBackend` | any OpenAI-compatible `/chat/completions` (Gemini by default) |
//! | [`edgequake`] | `ChatBackend` | providers from `edgequake-llm` |
//! | [`rekognition`] | `FaceComparisonService` | AWS Rekognition `CompareFaces` |
//! | [`sigv4`] | | AWS request signing used by `rekognition` |

pub mod edgequake;
pub mod openai_compat;
pub mod rekognition;
pub mod sigv4;

pub use edgequake::EdgequakeBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use rekognition::RekognitionClient;
