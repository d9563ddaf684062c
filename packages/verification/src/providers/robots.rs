//! robots.txt rules for evidence and URL fetches.

use std::collections::HashMap;

/// Parsed robots.txt, keyed by lowercase user-agent token.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: HashMap<String, PathRules>,
    wildcard: PathRules,
}

#[derive(Debug, Clone, Default)]
struct PathRules {
    allow: Vec<String>,
    disallow: Vec<String>,
}

impl PathRules {
    /// Longest matching prefix wins; allow wins a tie.
    fn permits(&self, path: &str) -> bool {
        let longest = |prefixes: &[String]| {
            prefixes
                .iter()
                .filter(|p| path.starts_with(p.as_str()))
                .map(String::len)
                .max()
        };

        match (longest(&self.allow), longest(&self.disallow)) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(allow), Some(disallow)) => allow >= disallow,
        }
    }
}

impl RobotsRules {
    pub fn parse(content: &str) -> Self {
        let mut robots = Self::default();
        let mut agents: Vec<String> = Vec::new();
        let mut rules = PathRules::default();
        let mut in_rules = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match directive.trim().to_lowercase().as_str() {
                "user-agent" => {
                    // Consecutive user-agent lines share one group.
                    if in_rules {
                        robots.store(&agents, &rules);
                        agents.clear();
                        rules = PathRules::default();
                        in_rules = false;
                    }
                    agents.push(value.to_lowercase());
                }
                "allow" => {
                    in_rules = true;
                    if !value.is_empty() {
                        rules.allow.push(value.to_string());
                    }
                }
                "disallow" => {
                    in_rules = true;
                    if !value.is_empty() {
                        rules.disallow.push(value.to_string());
                    }
                }
                _ => {}
            }
        }
        robots.store(&agents, &rules);

        robots
    }

    fn store(&mut self, agents: &[String], rules: &PathRules) {
        for agent in agents {
            if agent == "*" {
                self.wildcard = rules.clone();
            } else {
                self.groups.insert(agent.clone(), rules.clone());
            }
        }
    }

    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let agent = user_agent.to_lowercase();
        let rules = self
            .groups
            .iter()
            .find(|(token, _)| agent.contains(token.as_str()))
            .map(|(_, rules)| rules)
            .unwrap_or(&self.wildcard);

        rules.permits(path)
    }
}

/// Fetch robots.txt for the origin of `url`. Missing or unreadable files
/// allow everything.
pub async fn fetch_robots(client: &reqwest::Client, url: &url::Url) -> RobotsRules {
    let mut robots_url = url.clone();
    robots_url.set_path("/robots.txt");
    robots_url.set_query(None);
    robots_url.set_fragment(None);

    match client.get(robots_url.as_str()).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(body) => RobotsRules::parse(&body),
            Err(_) => RobotsRules::default(),
        },
        _ => RobotsRules::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_rules() {
        let robots = RobotsRules::parse(
            r#"
User-agent: *
Disallow: /private/
Allow: /private/press/
            "#,
        );

        assert!(robots.is_allowed("VerifyBot", "/news/story"));
        assert!(!robots.is_allowed("VerifyBot", "/private/notes"));
        assert!(robots.is_allowed("VerifyBot", "/private/press/release"));
    }

    #[test]
    fn test_named_agent_group_overrides_wildcard() {
        let robots = RobotsRules::parse(
            r#"
User-agent: *
Disallow: /

User-agent: verifybot
User-agent: otherbot
Disallow: /drafts
            "#,
        );

        assert!(!robots.is_allowed("RandomBot", "/page"));
        assert!(robots.is_allowed("VerifyBot/1.0", "/page"));
        assert!(robots.is_allowed("otherbot", "/page"));
        assert!(!robots.is_allowed("VerifyBot/1.0", "/drafts/1"));
    }

    #[test]
    fn test_empty_file_allows_all() {
        let robots = RobotsRules::parse("");
        assert!(robots.is_allowed("VerifyBot", "/anything"));
    }
}
