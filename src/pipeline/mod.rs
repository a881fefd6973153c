//! Building blocks shared by the extraction and verification flows.
//!
//! Each submodule implements exactly one transformation step and is
//! independently testable.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ encode ──▶ content ──▶ llm ──▶ postprocess ──▶ schema
//! (bytes)   (data URL)  (text+imgs) (call)   (peel JSON)     (validate)
//!
//! passport ──▶ crop ──▶ encode
//!   (bytes)    (box)    (data URL)
//! ```
//!
//! 1. [`encode`]:      bytes + MIME ⇄ `data:<mime>;base64,…`
//! 2. [`content`]:     instruction text followed by images, in order
//! 3. [`llm`]:         completion client with timeout and one retry
//! 4. [`postprocess`]: recover the JSON object from a chatty reply
//! 5. [`schema`]:      field-typed contract sent to and checked against the model
//! 6. [`crop`]:        bounding box → clipped pixel rectangle → PNG

pub mod content;
pub mod crop;
pub mod encode;
pub mod llm;
pub mod postprocess;
pub mod schema;
