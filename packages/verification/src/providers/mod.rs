//! HTTP-backed implementations of the collaborator traits.

mod http;
mod media;
mod nli;
mod openai;
mod rate_limited;
mod robots;
mod tavily;

pub use http::HttpFetcher;
pub use media::{HttpOcrService, HttpTranscriptService};
pub use nli::HttpNliClassifier;
pub use openai::OpenAi;
pub use rate_limited::RateLimitedSearcher;
pub use robots::{fetch_robots, RobotsRules};
pub use tavily::TavilySearcher;

use crate::error::{ProviderError, ProviderResult};

/// Map non-success responses to typed provider errors.
pub(crate) async fn check_status(response: reqwest::Response) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}
