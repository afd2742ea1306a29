//! robots.txt fetching, parsing, and per-host caching.
//!
//! Fetch failures are soft: the caller receives a reason string and reports a
//! warning, never an error. A missing robots.txt (HTTP 404) means allow-all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace};
use tokio::sync::Mutex;

/// Crawl permissions parsed from one robots.txt file, for one user agent.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    allowed: Vec<String>,
    disallowed: Vec<String>,
}

impl RobotsRules {
    /// Whether `path` may be fetched. Longest matching pattern wins; a tie
    /// goes to Allow, and an unmatched path is allowed.
    pub fn is_allowed(&self, path: &str) -> bool {
        let longest_disallow = self
            .disallowed
            .iter()
            .filter(|p| path_matches(path, p))
            .map(|p| p.len())
            .max();
        let longest_allow = self
            .allowed
            .iter()
            .filter(|p| path_matches(path, p))
            .map(|p| p.len())
            .max();

        match (longest_allow, longest_disallow) {
            (Some(a), Some(d)) => a >= d,
            (None, Some(_)) => false,
            _ => true,
        }
    }
}

struct Group {
    agents: Vec<String>,
    rules: RobotsRules,
}

/// Parses a robots.txt document and selects the rule group for `user_agent`.
///
/// Group selection follows the robots convention: a group naming our agent
/// token (case-insensitive) wins over the `*` group; with neither present,
/// everything is allowed.
pub fn parse_robots(txt: &str, user_agent: &str) -> RobotsRules {
    let mut groups: Vec<Group> = Vec::new();
    // A user-agent line directly after another user-agent line extends the
    // same group rather than starting a new one.
    let mut last_was_agent = false;

    for line in txt.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if last_was_agent {
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                } else {
                    groups.push(Group {
                        agents: vec![value.to_ascii_lowercase()],
                        rules: RobotsRules::default(),
                    });
                }
                last_was_agent = true;
            }
            "allow" => {
                last_was_agent = false;
                if !value.is_empty() {
                    if let Some(group) = groups.last_mut() {
                        group.rules.allowed.push(value.to_string());
                    }
                }
            }
            "disallow" => {
                last_was_agent = false;
                if !value.is_empty() {
                    if let Some(group) = groups.last_mut() {
                        group.rules.disallowed.push(value.to_string());
                    }
                }
            }
            _ => {
                // Crawl-delay, Sitemap, and unknown directives end an agent run
                // but carry no permission information we use.
                last_was_agent = false;
            }
        }
    }

    let ua = user_agent.to_ascii_lowercase();
    let named = groups.iter().find(|g| g.agents.iter().any(|a| *a == ua));
    let wildcard = groups.iter().find(|g| g.agents.iter().any(|a| a == "*"));
    named
        .or(wildcard)
        .map(|g| g.rules.clone())
        .unwrap_or_default()
}

/// Prefix matching with the two robots.txt pattern forms: a trailing `*`
/// widens the prefix, a trailing `$` anchors an exact match.
fn path_matches(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return path.starts_with(prefix);
    }
    if let Some(exact) = pattern.strip_suffix('$') {
        return path == exact;
    }
    path.starts_with(pattern)
}

struct CachedRobots {
    rules: Arc<RobotsRules>,
    fetched_at: Instant,
}

/// Per-host robots.txt cache.
///
/// Keyed by `scheme://authority`; entries expire after the configured TTL so
/// stale rules eventually refresh. Only successful fetches (including 404
/// allow-all) are cached, so a failed fetch is retried on the next call.
pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedRobots>>,
}

impl RobotsCache {
    /// Builds a cache whose fetches use `user_agent` and time out after
    /// `fetch_timeout`.
    pub fn new(
        user_agent: &str,
        fetch_timeout: Duration,
        ttl: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(RobotsCache {
            client,
            user_agent: user_agent.to_string(),
            ttl,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Whether robots.txt on `authority` permits fetching `path`.
    ///
    /// `Err` carries the reason the check could not be performed; callers
    /// surface it as a warning.
    pub async fn is_allowed(
        &self,
        scheme: &str,
        authority: &str,
        path: &str,
    ) -> Result<bool, String> {
        let origin = format!("{scheme}://{authority}");

        {
            let entries = self.entries.lock().await;
            if let Some(cached) = entries.get(&origin) {
                if cached.fetched_at.elapsed() < self.ttl {
                    trace!("robots.txt cache hit for {origin}");
                    return Ok(cached.rules.is_allowed(path));
                }
            }
        }

        // Fetch outside the lock so a slow host cannot stall lookups for
        // other hosts. Concurrent fetches of the same origin are harmless.
        let rules = Arc::new(self.fetch(&origin).await?);
        let allowed = rules.is_allowed(path);

        let mut entries = self.entries.lock().await;
        entries.insert(
            origin,
            CachedRobots {
                rules,
                fetched_at: Instant::now(),
            },
        );
        Ok(allowed)
    }

    async fn fetch(&self, origin: &str) -> Result<RobotsRules, String> {
        let robots_url = format!("{origin}/robots.txt");
        debug!("fetching {robots_url}");

        let response = self
            .client
            .get(&robots_url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            // No robots.txt published: everything is allowed.
            return Ok(RobotsRules::default());
        }
        if !status.is_success() {
            return Err(format!("robots.txt request returned HTTP {status}"));
        }

        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(parse_robots(&body, &self.user_agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORTAL_ROBOTS: &str = r#"
# provider portal crawl policy
User-agent: *
Disallow: /internal/
Disallow: /claims/print$
Allow: /internal/directory

User-agent: badbot
Disallow: /
"#;

    #[test]
    fn test_parse_selects_wildcard_group() {
        let rules = parse_robots(PORTAL_ROBOTS, "url_warden");
        assert!(rules.is_allowed("/providers"));
        assert!(!rules.is_allowed("/internal/reports"));
    }

    #[test]
    fn test_parse_selects_named_group_over_wildcard() {
        let rules = parse_robots(PORTAL_ROBOTS, "BadBot");
        assert!(!rules.is_allowed("/providers"));
        assert!(!rules.is_allowed("/"));
    }

    #[test]
    fn test_longest_match_allow_wins() {
        let rules = parse_robots(PORTAL_ROBOTS, "url_warden");
        assert!(rules.is_allowed("/internal/directory"));
        assert!(rules.is_allowed("/internal/directory/dentists"));
    }

    #[test]
    fn test_dollar_anchors_exact_path() {
        let rules = parse_robots(PORTAL_ROBOTS, "url_warden");
        assert!(!rules.is_allowed("/claims/print"));
        assert!(rules.is_allowed("/claims/printable"));
    }

    #[test]
    fn test_star_suffix_widens_prefix() {
        let rules = parse_robots("User-agent: *\nDisallow: /tmp*\n", "url_warden");
        assert!(!rules.is_allowed("/tmp"));
        assert!(!rules.is_allowed("/tmp-export"));
        assert!(rules.is_allowed("/temp"));
    }

    #[test]
    fn test_stacked_user_agents_share_a_group() {
        let txt = "User-agent: alpha\nUser-agent: beta\nDisallow: /private\n";
        assert!(!parse_robots(txt, "alpha").is_allowed("/private"));
        assert!(!parse_robots(txt, "beta").is_allowed("/private"));
        assert!(parse_robots(txt, "gamma").is_allowed("/private"));
    }

    #[test]
    fn test_no_groups_means_allow_all() {
        let rules = parse_robots("Sitemap: https://example.com/sitemap.xml\n", "url_warden");
        assert!(rules.is_allowed("/anything"));
    }

    #[test]
    fn test_empty_disallow_is_ignored() {
        let rules = parse_robots("User-agent: *\nDisallow:\n", "url_warden");
        assert!(rules.is_allowed("/anything"));
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_reason() {
        let cache = RobotsCache::new(
            "url_warden-test",
            Duration::from_millis(500),
            Duration::from_secs(60),
        )
        .unwrap();
        // Nothing listens on port 9; the connection is refused immediately.
        let result = cache.is_allowed("http", "127.0.0.1:9", "/x").await;
        assert!(result.is_err());
    }
}
