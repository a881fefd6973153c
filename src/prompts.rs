//! Prompts for passport extraction and face verification.
//!
//! Every instruction sent to a model lives here so the flows only decide
//! *which* prompt to send, and tests can inspect the prompts directly.

/// System instruction for passport field extraction.
pub const INFO_EXTRACTION_PROMPT: &str = "Extract all info from the given passport image";

/// User text accompanying the passport image during extraction.
pub const INFO_EXTRACTION_USER_TEXT: &str = "Extract information from this passport.";

/// System instruction for same-person judgment.
pub const PERSON_VERIFICATION_PROMPT: &str = r#"Compare the two provided images and determine whether they belong to the same person.
Return the result in JSON format:

{
  "same_person": true/false,
  "confidence_score": <0.0-1.0>,
  "reasoning": "<short explanation>"
}

- Consider facial features, not background or image quality.
- Be strict: minor differences like hairstyle or lighting should not reduce confidence if the core features match."#;

/// User text accompanying the selfie and passport during verification.
pub const PERSON_VERIFICATION_USER_TEXT: &str =
    "The first image is a live capture. The second image is a passport.";

/// System instruction for locating the holder's photo on a passport.
pub const FACE_LOCATION_PROMPT: &str = r#"Identify the photo of the passport holder in the provided passport image.
Return the bounding box of the face as pixel coordinates in the format:

{
  "face_found": true/false,
  "x": <int>,
  "y": <int>,
  "width": <int>,
  "height": <int>
}

- Coordinates must be relative to the top-left corner of the image.
- If no face is detected, set "face_found" to false and all coordinates to 0."#;

/// User text accompanying the passport during face location.
pub fn face_location_user_text(width: u32, height: u32) -> String {
    format!("Locate the holder's photo in this passport image. The image is {width}x{height} pixels.")
}

/// Appended to the system instruction for backends that cannot enforce a
/// response schema natively.
pub fn schema_suffix(schema_json: &str) -> String {
    format!(
        "\n\nRespond with a single JSON object that conforms to this JSON Schema. \
Do not add commentary or markdown fences.\n{schema_json}"
    )
}
