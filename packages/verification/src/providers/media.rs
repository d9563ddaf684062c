//! OCR and transcript services served over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::check_status;
use crate::error::ProviderResult;
use crate::security::ServiceCredentials;
use crate::traits::media::{OcrService, TranscriptService};

/// OCR endpoint taking `{"image": <url or base64>}` and answering `{"text"}`.
pub struct HttpOcrService {
    client: reqwest::Client,
    credentials: ServiceCredentials,
}

impl HttpOcrService {
    pub fn new(credentials: ServiceCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
        }
    }
}

#[derive(Serialize)]
struct OcrRequest<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl OcrService for HttpOcrService {
    async fn extract_text(&self, reference: &str) -> ProviderResult<String> {
        let request = self
            .credentials
            .authorize(self.client.post(&self.credentials.endpoint))
            .json(&OcrRequest { image: reference });
        let response: OcrResponse = check_status(request.send().await?).await?.json().await?;
        Ok(response.text)
    }
}

/// Caption/transcript lookup. A 404 or a null transcript means the video
/// has no captions.
pub struct HttpTranscriptService {
    client: reqwest::Client,
    credentials: ServiceCredentials,
}

impl HttpTranscriptService {
    pub fn new(credentials: ServiceCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
        }
    }
}

#[derive(Serialize)]
struct TranscriptRequest<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct TranscriptResponse {
    transcript: Option<String>,
}

#[async_trait]
impl TranscriptService for HttpTranscriptService {
    async fn fetch_transcript(&self, video_url: &str) -> ProviderResult<Option<String>> {
        let response = self
            .credentials
            .authorize(self.client.post(&self.credentials.endpoint))
            .json(&TranscriptRequest { url: video_url })
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response: TranscriptResponse = check_status(response).await?.json().await?;
        Ok(response
            .transcript
            .filter(|transcript| !transcript.trim().is_empty()))
    }
}
