//! Credential handling with secure memory.
//!
//! Uses the `secrecy` crate to prevent accidental logging of API keys.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

/// A secret string that won't be logged or displayed.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Expose the secret value for use.
    ///
    /// Only call this when actually using the secret (e.g., in an API request).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Endpoint plus optional bearer token for an HTTP-backed service
/// (NLI classifier, OCR, transcripts).
#[derive(Clone)]
pub struct ServiceCredentials {
    pub endpoint: String,
    pub token: Option<SecretString>,
}

impl ServiceCredentials {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::new(token));
        self
    }

    /// Attach the bearer token, if any, to a request.
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        }
    }
}

impl fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_not_in_debug_or_display() {
        let secret = SecretString::new("sk-super-secret-key");
        assert!(!format!("{:?}", secret).contains("sk-super"));
        assert!(!format!("{}", secret).contains("sk-super"));
        assert_eq!(secret.expose(), "sk-super-secret-key");
    }

    #[test]
    fn test_service_credentials_debug_redacts_token() {
        let creds = ServiceCredentials::new("https://nli.internal/classify").with_token("hf_secret");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hf_secret"));
        assert!(debug.contains("nli.internal"));
    }
}
