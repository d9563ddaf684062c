//! Check requests - the input unit of the pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of content submitted for verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Url,
    Text,
    Image,
    Video,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// Latency/thoroughness tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Quick,
    Deep,
}

/// A request to verify one piece of content.
///
/// Immutable once created. The caller guarantees at most one concurrent run
/// per `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Caller-assigned idempotency key
    pub id: Uuid,

    /// What kind of content `input_payload` holds
    pub input_type: InputType,

    /// Raw URL, raw text, or a reference to uploaded binary content
    pub input_payload: String,

    /// Quick or deep verification
    #[serde(default)]
    pub mode: Mode,

    /// Opaque owner reference, not interpreted by the pipeline
    pub owner_id: String,

    /// Credits the caller already reserved for this check
    #[serde(default)]
    pub reserved_credits: u32,
}

impl CheckRequest {
    /// Create a request with a fresh time-ordered id.
    pub fn new(
        input_type: InputType,
        input_payload: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            input_type,
            input_payload: input_payload.into(),
            mode: Mode::Quick,
            owner_id: owner_id.into(),
            reserved_credits: 0,
        }
    }

    /// Convenience constructor for raw text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(InputType::Text, text, "anonymous")
    }

    /// Convenience constructor for a URL.
    pub fn url(url: impl Into<String>) -> Self {
        Self::new(InputType::Url, url, "anonymous")
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_reserved_credits(mut self, credits: u32) -> Self {
        self.reserved_credits = credits;
        self
    }
}
