//! Limits, timeouts, and vocabularies for URL management.

use std::time::Duration;

/// Maximum URL length (2048 characters).
/// This matches common browser and server limits (e.g., IE, Apache, Nginx default limits).
pub const MAX_URL_LENGTH: usize = 2048;

/// Maximum host length per RFC 1035.
pub const MAX_HOST_LENGTH: usize = 255;

/// Characters that are never accepted in a URL path.
///
/// Carrier portals routinely 500 on these, and several of them double as shell
/// metacharacters in downstream tooling.
pub const PROBLEMATIC_PATH_CHARS: &[char] =
    &['<', '>', '{', '}', '|', '^', '~', '`', '[', ']', '\\'];

/// Timeout for a single robots.txt fetch.
/// Bounded so one unreachable host cannot stall validation of other URLs.
pub const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a fetched robots.txt ruleset stays fresh before it is re-fetched.
pub const ROBOTS_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default path of the persisted URL store document.
pub const DEFAULT_STORE_PATH: &str = "./url_store.json";

/// Default User-Agent for robots.txt fetches and carrier custom headers.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Categories the crawlers file URLs under.
///
/// Not enforced: an unknown category is accepted with a warning so a new
/// portal section never blocks a crawl.
pub const URL_CATEGORIES: &[&str] = &[
    "provider-portal",
    "documentation",
    "claims",
    "eligibility",
    "benefits",
    "preauthorization",
    "fee-schedule",
    "forms",
    "resources",
    "contact",
];

/// Tags in common use across carriers.
pub const COMMON_TAGS: &[&str] = &[
    "login-required",
    "high-priority",
    "rate-limited",
    "pdf",
    "form",
    "api",
    "deprecated",
    "maintenance",
    "beta",
];

/// File extensions we never crawl (binaries and media).
/// Matching paths get a validation warning, not an error.
pub const BLOCKED_EXTENSIONS: &[&str] = &[
    ".exe", ".dll", ".bat", ".sh", ".jar", ".mp3", ".mp4", ".avi", ".mov", ".zip", ".tar", ".gz",
    ".rar",
];

/// Whether `category` is one of the known [`URL_CATEGORIES`].
pub fn is_known_category(category: &str) -> bool {
    URL_CATEGORIES
        .iter()
        .any(|c| c.eq_ignore_ascii_case(category))
}

/// Whether `tag` is one of the [`COMMON_TAGS`].
pub fn is_known_tag(tag: &str) -> bool {
    COMMON_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag))
}
