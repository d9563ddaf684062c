//! Credential handling and SSRF protection for user-submitted URLs.

mod credentials;
mod url_policy;

pub use credentials::{SecretString, ServiceCredentials};
pub use url_policy::UrlPolicy;
