//! Request composition: encoded segments → chat-completion messages.
//!
//! The message types mirror the OpenAI-compatible wire format directly, so a
//! [`ModelRequest`] serialises into the request body with no translation
//! layer. Composition is pure: same segments in, same request out.
//!
//! ## Message Layout
//!
//! Single screenshot:
//! ```text
//! system: SINGLE_IMAGE_SYSTEM_PROMPT
//! user:   [text instruction, image]
//! ```
//!
//! N segments:
//! ```text
//! system: MULTI_SEGMENT_SYSTEM_PROMPT
//! user:   [text intro, "Segment 1 of N:", image 1, …, "Segment N of N:", image N]
//! ```
//!
//! Each label sits directly before its image so the model can tell which
//! band is above which.

use crate::error::Page2HtmlError;
use crate::pipeline::normalize::EncodedSegment;
use crate::prompts::{
    segment_label, MULTI_SEGMENT_INSTRUCTION, MULTI_SEGMENT_SYSTEM_PROMPT,
    SINGLE_IMAGE_INSTRUCTION, SINGLE_IMAGE_SYSTEM_PROMPT,
};
use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// Reference to an image, here always a base64 `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One part of a multimodal user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// Message body: plain text or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }
}

/// An immutable, ordered list of messages for one model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelRequest {
    messages: Vec<ChatMessage>,
}

impl ModelRequest {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of image parts across all messages.
    pub fn image_count(&self) -> usize {
        self.messages
            .iter()
            .filter_map(|m| match &m.content {
                MessageContent::Parts(parts) => Some(parts),
                MessageContent::Text(_) => None,
            })
            .flatten()
            .filter(|p| matches!(p, ContentPart::ImageUrl { .. }))
            .count()
    }

    /// The system prompt text, if the first message is a system message.
    pub fn system_prompt(&self) -> Option<&str> {
        match self.messages.first() {
            Some(ChatMessage {
                role: Role::System,
                content: MessageContent::Text(t),
            }) => Some(t),
            _ => None,
        }
    }
}

/// Build the request for `segments`, choosing single-image or multi-segment
/// layout by count.
///
/// `system_override` replaces the built-in system prompt for either layout.
pub fn compose(
    segments: &[EncodedSegment],
    system_override: Option<&str>,
) -> Result<ModelRequest, Page2HtmlError> {
    let (default_system, parts) = match segments {
        [] => {
            return Err(Page2HtmlError::InvalidInput {
                input: "segments".into(),
                reason: "at least one encoded segment is required".into(),
            })
        }
        [only] => (
            SINGLE_IMAGE_SYSTEM_PROMPT,
            vec![
                ContentPart::text(SINGLE_IMAGE_INSTRUCTION),
                ContentPart::image(only.data_uri()),
            ],
        ),
        many => {
            let total = many.len();
            let mut parts = Vec::with_capacity(1 + 2 * total);
            parts.push(ContentPart::text(MULTI_SEGMENT_INSTRUCTION));
            for (i, seg) in many.iter().enumerate() {
                parts.push(ContentPart::text(segment_label(i + 1, total)));
                parts.push(ContentPart::image(seg.data_uri()));
            }
            (MULTI_SEGMENT_SYSTEM_PROMPT, parts)
        }
    };

    let system = system_override.unwrap_or(default_system);
    Ok(ModelRequest {
        messages: vec![ChatMessage::system(system), ChatMessage::user_parts(parts)],
    })
}
