//! Syntactic and robots.txt validation of crawl URLs.
//!
//! Validation is a fixed pipeline: emptiness, length, structural
//! decomposition, scheme, host grammar, path characters, and finally
//! robots.txt for otherwise-clean URLs. Robots infrastructure failures
//! degrade to warnings so an unreachable host never makes a good URL look
//! bad.

pub mod robots;

use std::sync::LazyLock;
use std::time::Duration;

use log::debug;
use regex::Regex;
use url::{ParseError, Url};

use crate::config::constants::{
    BLOCKED_EXTENSIONS, MAX_HOST_LENGTH, MAX_URL_LENGTH, PROBLEMATIC_PATH_CHARS,
    ROBOTS_CACHE_TTL, ROBOTS_FETCH_TIMEOUT,
};
use crate::config::DEFAULT_USER_AGENT;
use crate::error_handling::{InitializationError, ValidationError, ValidationWarning};
use robots::RobotsCache;

/// One DNS label: 1-63 alphanumeric/hyphen characters, no edge hyphen.
static DNS_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").expect("DNS label pattern compiles")
});

/// Structural pieces of a decomposed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// URL scheme, lowercased.
    pub scheme: String,
    /// Host, lowercased (no port).
    pub host: String,
    /// Path as parsed, `/` for an absent path on http(s) URLs.
    pub path: String,
    /// Raw query string, if any.
    pub query: Option<String>,
    /// Fragment, if any.
    pub fragment: Option<String>,
}

/// Outcome of validating one URL.
///
/// `is_valid` holds exactly when `errors` is empty; warnings never affect it.
/// `parsed_url` is populated whenever the URL could be decomposed, even if
/// later checks failed.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the URL passed every check that produces errors.
    pub is_valid: bool,
    /// Findings that make the URL unusable, in pipeline order.
    pub errors: Vec<ValidationError>,
    /// Non-fatal findings.
    pub warnings: Vec<ValidationWarning>,
    /// Structural decomposition, when one was possible.
    pub parsed_url: Option<ParsedUrl>,
}

impl ValidationResult {
    fn rejected(errors: Vec<ValidationError>) -> Self {
        ValidationResult {
            is_valid: false,
            errors,
            warnings: Vec::new(),
            parsed_url: None,
        }
    }

    /// The error messages as plain strings, for aggregation and batch reports.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }

    /// The warning messages as plain strings.
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(|w| w.to_string()).collect()
    }
}

/// Validates URLs for carrier portal crawling.
///
/// Stateless apart from the robots.txt cache it owns; safe to share behind a
/// reference across concurrent crawl tasks.
pub struct UrlValidator {
    robots: RobotsCache,
}

impl UrlValidator {
    /// Builds a validator with an explicit robots fetch configuration.
    pub fn new(
        user_agent: &str,
        robots_fetch_timeout: Duration,
        robots_cache_ttl: Duration,
    ) -> Result<Self, InitializationError> {
        Ok(UrlValidator {
            robots: RobotsCache::new(user_agent, robots_fetch_timeout, robots_cache_ttl)?,
        })
    }

    /// Builds a validator with the default user agent, fetch timeout, and
    /// 24-hour robots cache TTL.
    pub fn with_defaults() -> Result<Self, InitializationError> {
        Self::new(DEFAULT_USER_AGENT, ROBOTS_FETCH_TIMEOUT, ROBOTS_CACHE_TTL)
    }

    /// Validates `url` and returns the full pipeline result.
    ///
    /// With `check_robots` set, an otherwise-clean URL is also checked against
    /// the host's robots.txt; a disallowed path is an error, while a fetch or
    /// parse failure is only a warning.
    pub async fn validate(&self, url: &str, check_robots: bool) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let trimmed = url.trim();
        if trimmed.is_empty() {
            return ValidationResult::rejected(vec![ValidationError::EmptyUrl]);
        }
        if url.len() > MAX_URL_LENGTH {
            return ValidationResult::rejected(vec![ValidationError::TooLong {
                len: url.len(),
                max: MAX_URL_LENGTH,
            }]);
        }

        let parsed = match Url::parse(trimmed) {
            Ok(parsed) => parsed,
            Err(e) => return ValidationResult::rejected(vec![decomposition_error(trimmed, e)]),
        };

        let scheme = parsed.scheme().to_string();
        let host = parsed.host_str().unwrap_or_default().to_string();
        let parsed_url = ParsedUrl {
            scheme: scheme.clone(),
            host: host.clone(),
            path: parsed.path().to_string(),
            query: parsed.query().map(str::to_string),
            fragment: parsed.fragment().map(str::to_string),
        };

        if !matches!(scheme.as_str(), "http" | "https") {
            errors.push(ValidationError::InvalidScheme(scheme));
        }

        if host.is_empty() {
            errors.push(ValidationError::MissingHost);
        } else if !is_valid_host(&host) {
            errors.push(ValidationError::InvalidHostFormat(host.clone()));
        }

        // The parser percent-encodes several of the characters we reject, so
        // the scan runs on the raw path slice of the input.
        if let Some(raw) = raw_path(trimmed) {
            if raw.chars().any(|c| PROBLEMATIC_PATH_CHARS.contains(&c)) {
                errors.push(ValidationError::InvalidPathCharacters(raw.to_string()));
            }
        }

        if let Some(ext) = blocked_extension(&parsed_url.path) {
            warnings.push(ValidationWarning::BlockedExtension(ext.to_string()));
        }

        if errors.is_empty() && check_robots && !host.is_empty() {
            let authority = match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            };
            match self
                .robots
                .is_allowed(&parsed_url.scheme, &authority, &parsed_url.path)
                .await
            {
                Ok(true) => {}
                Ok(false) => errors.push(ValidationError::RobotsDisallowed),
                Err(reason) => {
                    debug!("robots.txt check failed for {trimmed}: {reason}");
                    warnings.push(ValidationWarning::RobotsCheckFailed(reason));
                }
            }
        }

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            parsed_url: Some(parsed_url),
        }
    }
}

fn decomposition_error(url: &str, e: ParseError) -> ValidationError {
    match e {
        ParseError::RelativeUrlWithoutBase => ValidationError::MissingScheme,
        ParseError::EmptyHost => ValidationError::MissingHost,
        ParseError::InvalidIpv4Address => {
            ValidationError::InvalidHostFormat(raw_host(url).unwrap_or(url).to_string())
        }
        other => ValidationError::Unparsable(other.to_string()),
    }
}

/// Whether `host` satisfies the host grammar: `localhost`, a dotted-quad with
/// octets in 0..=255, or dot-separated DNS labels. Case-insensitive; a single
/// trailing dot is tolerated.
pub fn is_valid_host(host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() {
        return false;
    }
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    let segments: Vec<&str> = host.split('.').collect();
    let all_numeric = segments
        .iter()
        .all(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()));
    if segments.len() == 4 && all_numeric {
        return segments
            .iter()
            .all(|s| s.parse::<u32>().map(|n| n <= 255).unwrap_or(false));
    }

    if host.len() > MAX_HOST_LENGTH {
        return false;
    }
    segments.iter().all(|label| DNS_LABEL.is_match(label))
}

/// The raw path slice of `url`: everything from the first `/` after the
/// authority up to the query or fragment.
fn raw_path(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let start = rest.find('/')?;
    let path = &rest[start..];
    let end = path.find(['?', '#']).unwrap_or(path.len());
    Some(&path[..end])
}

/// The raw authority slice of `url`, for error messages about hosts the
/// parser itself rejected.
fn raw_host(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    Some(host.split_once(':').map_or(host, |(h, _)| h))
}

fn blocked_extension(path: &str) -> Option<&'static str> {
    let lower = path.to_ascii_lowercase();
    BLOCKED_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(**ext))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::{ValidationError, ValidationWarning};

    fn validator() -> UrlValidator {
        UrlValidator::with_defaults().expect("validator builds")
    }

    #[tokio::test]
    async fn test_clean_https_url_is_valid() {
        let result = validator()
            .validate("https://www.aetna.com/providers?tab=dental#fees", false)
            .await;
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
        let parsed = result.parsed_url.unwrap();
        assert_eq!(parsed.scheme, "https");
        assert_eq!(parsed.host, "www.aetna.com");
        assert_eq!(parsed.path, "/providers");
        assert_eq!(parsed.query.as_deref(), Some("tab=dental"));
        assert_eq!(parsed.fragment.as_deref(), Some("fees"));
    }

    #[tokio::test]
    async fn test_empty_url_is_rejected_without_parse() {
        for input in ["", "   "] {
            let result = validator().validate(input, false).await;
            assert!(!result.is_valid);
            assert_eq!(result.errors, vec![ValidationError::EmptyUrl]);
            assert!(result.parsed_url.is_none());
        }
    }

    #[tokio::test]
    async fn test_overlong_url_is_rejected_without_parse() {
        let url = format!("https://example.com/{}", "a".repeat(2100));
        let result = validator().validate(&url, false).await;
        assert!(!result.is_valid);
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationError::TooLong { len, .. }] if *len == url.len()
        ));
        assert!(result.parsed_url.is_none());
    }

    #[tokio::test]
    async fn test_url_at_length_limit_is_accepted() {
        let url = format!("https://example.com/{}", "a".repeat(2028));
        assert_eq!(url.len(), MAX_URL_LENGTH);
        let result = validator().validate(&url, false).await;
        assert!(result.is_valid);
    }

    #[tokio::test]
    async fn test_missing_scheme_is_reported() {
        let result = validator().validate("www.aetna.com/providers", false).await;
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec![ValidationError::MissingScheme]);
        assert!(result.parsed_url.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_scheme_names_the_scheme() {
        let result = validator().validate("ftp://www.aetna.com/fees", false).await;
        assert!(!result.is_valid);
        assert_eq!(
            result.errors,
            vec![ValidationError::InvalidScheme("ftp".into())]
        );
        // Decomposition still succeeded.
        assert!(result.parsed_url.is_some());
    }

    #[tokio::test]
    async fn test_bad_host_is_reported_with_parse() {
        let result = validator().validate("https://example..com/x", false).await;
        assert!(!result.is_valid);
        assert_eq!(
            result.errors,
            vec![ValidationError::InvalidHostFormat("example..com".into())]
        );
        assert!(result.parsed_url.is_some());
    }

    #[tokio::test]
    async fn test_out_of_range_octet_is_invalid() {
        let result = validator().validate("https://256.1.1.1/x", false).await;
        assert!(!result.is_valid);
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationError::InvalidHostFormat(_)]
        ));
    }

    #[tokio::test]
    async fn test_problematic_path_characters_are_rejected() {
        for url in [
            "https://www.aetna.com/a<b",
            "https://www.aetna.com/fee|schedule",
            "https://www.aetna.com/x\\y",
            "https://www.aetna.com/arch[ive]",
        ] {
            let result = validator().validate(url, false).await;
            assert!(!result.is_valid, "{url} should be rejected");
            assert!(matches!(
                result.errors.as_slice(),
                [ValidationError::InvalidPathCharacters(_)]
            ));
        }
    }

    #[tokio::test]
    async fn test_tilde_in_query_is_fine() {
        // Only the path is scanned for problematic characters.
        let result = validator()
            .validate("https://www.aetna.com/search?q=~fees", false)
            .await;
        assert!(result.is_valid);
    }

    #[tokio::test]
    async fn test_blocked_extension_is_a_warning_only() {
        let result = validator()
            .validate("https://www.aetna.com/fees-2025.zip", false)
            .await;
        assert!(result.is_valid);
        assert_eq!(
            result.warnings,
            vec![ValidationWarning::BlockedExtension(".zip".into())]
        );
    }

    #[tokio::test]
    async fn test_robots_fetch_failure_is_a_warning_not_an_error() {
        let validator = UrlValidator::new(
            "url_warden-test",
            Duration::from_millis(500),
            Duration::from_secs(60),
        )
        .unwrap();
        // Connection refused: port 9 has no listener.
        let result = validator.validate("http://127.0.0.1:9/fees", true).await;
        assert!(result.is_valid);
        assert!(matches!(
            result.warnings.as_slice(),
            [ValidationWarning::RobotsCheckFailed(_)]
        ));
    }

    #[tokio::test]
    async fn test_check_robots_false_never_touches_the_network() {
        // An unroutable authority validates instantly when robots is off.
        let result = validator().validate("http://127.0.0.1:9/fees", false).await;
        assert!(result.is_valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_host_grammar() {
        assert!(is_valid_host("localhost"));
        assert!(is_valid_host("LOCALHOST"));
        assert!(is_valid_host("example.com"));
        assert!(is_valid_host("EXAMPLE.COM"));
        assert!(is_valid_host("provider.aetna.com."));
        assert!(is_valid_host("10.0.0.1"));
        assert!(is_valid_host("255.255.255.255"));

        assert!(!is_valid_host(""));
        assert!(!is_valid_host("256.1.1.1"));
        assert!(!is_valid_host("example..com"));
        assert!(!is_valid_host("-example.com"));
        assert!(!is_valid_host("example-.com"));
        assert!(!is_valid_host(&format!("{}.com", "a".repeat(64))));
    }

    #[test]
    fn test_raw_path_extraction() {
        assert_eq!(raw_path("https://a.com/x/y?q=1"), Some("/x/y"));
        assert_eq!(raw_path("https://a.com/x#frag"), Some("/x"));
        assert_eq!(raw_path("https://a.com"), None);
        assert_eq!(raw_path("https://a.com:8080/p"), Some("/p"));
    }

    // Property-based tests using proptest
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_host_grammar_never_panics(host in "\\PC{0,80}") {
            let _ = is_valid_host(&host);
        }

        #[test]
        fn test_dotted_quads_follow_octet_rule(
            a in 0u32..400, b in 0u32..400, c in 0u32..400, d in 0u32..400
        ) {
            let host = format!("{a}.{b}.{c}.{d}");
            let expected = a <= 255 && b <= 255 && c <= 255 && d <= 255;
            prop_assert_eq!(is_valid_host(&host), expected);
        }

        #[test]
        fn test_simple_domains_are_valid(
            label in "[a-z0-9]{1,20}", tld in "(com|org|net)"
        ) {
            let host = format!("{label}.{tld}");
            prop_assert!(is_valid_host(&host));
        }
    }
}
