//! Passport field extraction.

use crate::error::PassportError;
use crate::pipeline::content::build_content;
use crate::pipeline::encode::EmbeddableImage;
use crate::pipeline::llm::CompletionClient;
use crate::pipeline::schema::{FieldKind, FieldSpec, OutputSchema, StructuredOutput};
use crate::prompts::{INFO_EXTRACTION_PROMPT, INFO_EXTRACTION_USER_TEXT};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Fields read off a passport's data page.
///
/// All values are the text as printed; no cross-field validation is done
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportRecord {
    pub nationality: String,
    pub full_name: String,
    pub surname: String,
    pub passport_type: String,
    pub date_of_birth: String,
    pub personal_number: String,
    pub gender: String,
    pub expiration_date: String,
}

impl StructuredOutput for PassportRecord {
    fn schema() -> OutputSchema {
        use FieldKind::String;
        OutputSchema::new(
            "passport_record",
            vec![
                FieldSpec::new("nationality", String, "Nationality of the holder"),
                FieldSpec::new("full_name", String, "Given names and surname"),
                FieldSpec::new("surname", String, "Surname"),
                FieldSpec::new("passport_type", String, "Passport type code, e.g. P"),
                FieldSpec::new("date_of_birth", String, "Date of birth as printed"),
                FieldSpec::new("personal_number", String, "Personal or passport number"),
                FieldSpec::new("gender", String, "Sex as printed"),
                FieldSpec::new("expiration_date", String, "Date of expiry as printed"),
            ],
        )
    }
}

/// Read the passport fields from one image.
///
/// Errors are exactly those of [`CompletionClient::complete`]: a reply
/// missing any field is a [`PassportError::SchemaValidation`].
pub async fn extract_passport_info(
    client: &CompletionClient,
    image: &EmbeddableImage,
) -> Result<PassportRecord, PassportError> {
    let content = build_content(INFO_EXTRACTION_USER_TEXT, [image]);
    let record: PassportRecord = client
        .complete_as(INFO_EXTRACTION_PROMPT, &content)
        .await?;
    info!("Extracted passport fields ({})", record.nationality);
    Ok(record)
}
