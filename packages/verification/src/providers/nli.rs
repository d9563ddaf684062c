//! NLI classifier served over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::check_status;
use crate::error::{ProviderError, ProviderResult};
use crate::security::ServiceCredentials;
use crate::traits::classifier::{NliClassifier, NliPair, NliScores};

/// Client for a batched NLI inference endpoint.
///
/// The endpoint accepts `{"pairs": [{"premise", "hypothesis"}]}` and answers
/// `{"scores": [{"entails", "contradicts", "neutral"}]}` in input order.
pub struct HttpNliClassifier {
    client: reqwest::Client,
    credentials: ServiceCredentials,
}

impl HttpNliClassifier {
    pub fn new(credentials: ServiceCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
        }
    }
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    pairs: &'a [NliPair],
}

#[derive(Deserialize)]
struct BatchResponse {
    scores: Vec<NliScores>,
}

#[async_trait]
impl NliClassifier for HttpNliClassifier {
    async fn classify_batch(&self, pairs: &[NliPair]) -> ProviderResult<Vec<NliScores>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let request = self
            .credentials
            .authorize(self.client.post(&self.credentials.endpoint))
            .json(&BatchRequest { pairs });
        let response: BatchResponse = check_status(request.send().await?).await?.json().await?;

        if response.scores.len() != pairs.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} NLI scores, got {}",
                pairs.len(),
                response.scores.len()
            )));
        }

        debug!(pairs = pairs.len(), "NLI batch classified");
        Ok(response.scores)
    }
}
