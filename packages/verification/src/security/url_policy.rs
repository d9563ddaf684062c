//! URL policy for SSRF protection.
//!
//! Submitted URLs come from untrusted users, so every fetch target is
//! checked before a connection is made:
//! - only http(s) schemes
//! - no internal hostnames or cloud metadata services
//! - no private, loopback or link-local address ranges, including after DNS
//!   resolution

use std::collections::HashSet;
use std::net::IpAddr;
use url::Url;

use crate::error::{SecurityError, SecurityResult};

#[derive(Debug, Clone)]
pub struct UrlPolicy {
    allowed_schemes: HashSet<String>,
    blocked_hosts: HashSet<String>,
    blocked_cidrs: Vec<ipnet::IpNet>,

    /// Hosts that skip every other check (test fixtures, internal mirrors)
    trusted_hosts: HashSet<String>,
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlPolicy {
    pub fn new() -> Self {
        let blocked_cidrs = [
            "10.0.0.0/8",
            "172.16.0.0/12",
            "192.168.0.0/16",
            "169.254.0.0/16",
            "127.0.0.0/8",
            "0.0.0.0/8",
            "::1/128",
            "fc00::/7",
            "fe80::/10",
        ]
        .iter()
        .filter_map(|cidr| cidr.parse().ok())
        .collect();

        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: [
                "localhost",
                "metadata.google.internal",
                "metadata.gke.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_cidrs,
            trusted_hosts: HashSet::new(),
        }
    }

    pub fn trust_host(mut self, host: impl Into<String>) -> Self {
        self.trusted_hosts.insert(host.into());
        self
    }

    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into());
        self
    }

    /// Parse and check a URL without touching the network.
    pub fn check(&self, url: &str) -> SecurityResult<Url> {
        let parsed = Url::parse(url)?;

        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(SecurityError::DisallowedScheme(parsed.scheme().to_string()));
        }

        let host = parsed
            .host_str()
            .ok_or(SecurityError::NoHost)?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_lowercase();

        if self.trusted_hosts.contains(&host) {
            return Ok(parsed);
        }

        if self.blocked_hosts.contains(&host) || host.ends_with(".localhost") {
            return Err(SecurityError::BlockedHost(host));
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            self.check_ip(ip)?;
        }

        Ok(parsed)
    }

    /// Check a URL and every address its host resolves to.
    ///
    /// Catches hostnames that resolve to internal addresses.
    pub async fn check_resolved(&self, url: &str) -> SecurityResult<Url> {
        let parsed = self.check(url)?;
        let host = parsed.host_str().ok_or(SecurityError::NoHost)?;

        if self.trusted_hosts.contains(host) || host.parse::<IpAddr>().is_ok() {
            return Ok(parsed);
        }

        let port = parsed.port_or_known_default().unwrap_or(80);
        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| SecurityError::DnsResolution(e.to_string()))?;

        for addr in addrs {
            self.check_ip(addr.ip()).map_err(|_| {
                SecurityError::BlockedCidr(format!("{} resolved to {}", host, addr.ip()))
            })?;
        }

        Ok(parsed)
    }

    fn check_ip(&self, ip: IpAddr) -> SecurityResult<()> {
        match self.blocked_cidrs.iter().find(|cidr| cidr.contains(&ip)) {
            Some(_) => Err(SecurityError::BlockedCidr(ip.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_loopback_and_localhost() {
        let policy = UrlPolicy::new();
        assert!(policy.check("http://localhost/").is_err());
        assert!(policy.check("http://app.localhost/").is_err());
        assert!(policy.check("http://127.0.0.1/").is_err());
        assert!(policy.check("http://[::1]/").is_err());
    }

    #[test]
    fn test_blocks_private_ranges_and_metadata() {
        let policy = UrlPolicy::new();
        assert!(policy.check("http://10.0.0.1/").is_err());
        assert!(policy.check("http://172.16.0.1/").is_err());
        assert!(policy.check("http://192.168.1.1/").is_err());
        assert!(policy.check("http://169.254.169.254/latest").is_err());
        assert!(policy.check("http://metadata.google.internal/").is_err());
    }

    #[test]
    fn test_blocks_non_http_schemes() {
        let policy = UrlPolicy::new();
        assert!(matches!(
            policy.check("file:///etc/passwd"),
            Err(SecurityError::DisallowedScheme(_))
        ));
        assert!(policy.check("ftp://example.com/").is_err());
    }

    #[test]
    fn test_allows_public_urls_and_trusted_hosts() {
        let policy = UrlPolicy::new();
        assert!(policy.check("https://example.com/article").is_ok());

        let trusted = UrlPolicy::new().trust_host("localhost");
        assert!(trusted.check("http://localhost:8080/").is_ok());
    }
}
