//! User-message content: one instruction text followed by images.

use crate::pipeline::encode::EmbeddableImage;
use serde_json::{json, Value};

/// One item of a user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentItem {
    Text(String),
    Image(EmbeddableImage),
}

/// Ordered, provider-agnostic user content.
///
/// Built by [`build_content`]; the first item is always the text, the rest
/// are images in the order they were supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPayload {
    items: Vec<ContentItem>,
}

impl ContentPayload {
    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    /// The instruction text (first item).
    pub fn text(&self) -> &str {
        match self.items.first() {
            Some(ContentItem::Text(t)) => t,
            _ => "",
        }
    }

    /// The images, in input order.
    pub fn images(&self) -> impl Iterator<Item = &EmbeddableImage> {
        self.items.iter().filter_map(|item| match item {
            ContentItem::Image(img) => Some(img),
            ContentItem::Text(_) => None,
        })
    }

    /// Render as an OpenAI-style content-part array.
    pub fn to_openai_parts(&self) -> Vec<Value> {
        self.items
            .iter()
            .map(|item| match item {
                ContentItem::Text(text) => json!({ "type": "text", "text": text }),
                ContentItem::Image(img) => json!({
                    "type": "image_url",
                    "image_url": { "url": img.to_data_url() },
                }),
            })
            .collect()
    }
}

/// Build the user content for a completion call.
pub fn build_content<'a, I>(text: impl Into<String>, images: I) -> ContentPayload
where
    I: IntoIterator<Item = &'a EmbeddableImage>,
{
    let mut items = vec![ContentItem::Text(text.into())];
    items.extend(images.into_iter().cloned().map(ContentItem::Image));
    ContentPayload { items }
}
