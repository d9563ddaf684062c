//! OCR and transcript service traits.

use async_trait::async_trait;

use crate::error::ProviderResult;

/// Extracts visible text from an uploaded image.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// `reference` identifies the uploaded binary (storage key or URL).
    /// Returns the recognized text, possibly empty.
    async fn extract_text(&self, reference: &str) -> ProviderResult<String>;
}

/// Pulls a caption/transcript track for a video.
#[async_trait]
pub trait TranscriptService: Send + Sync {
    /// Returns `None` when the source exposes no caption track.
    async fn fetch_transcript(&self, video_url: &str) -> ProviderResult<Option<String>>;
}
