//! Registry entries and store key normalization.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::types::Carrier;

/// Crawl outcome state of a tracked URL.
///
/// Reflects the most recent reported outcome only; history is summarized by
/// the success/failure counters on the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlStatus {
    /// Tracked, never fetched (or re-queued by the caller).
    Pending,
    /// The most recent fetch succeeded.
    Success,
    /// The most recent fetch failed.
    Failed,
}

/// One tracked URL with its crawl bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlEntry {
    /// The URL as originally provided.
    pub url: String,
    /// Deduplication key; see [`normalized_key`].
    pub normalized_key: String,
    /// Carrier the URL belongs to.
    pub carrier: Carrier,
    /// Category the crawlers file the URL under.
    #[serde(default)]
    pub category: Option<String>,
    /// Tags, kept sorted for a stable on-disk form.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Most recent crawl outcome.
    pub status: UrlStatus,
    /// Number of successful fetches reported.
    pub success_count: u64,
    /// Number of failed fetches reported.
    pub failure_count: u64,
    /// Message from the most recent failure.
    #[serde(default)]
    pub last_error: Option<String>,
    /// When the entry was first added.
    pub created_at: DateTime<Utc>,
    /// When the entry was last touched.
    pub updated_at: DateTime<Utc>,
}

/// Derives the deduplication key for a URL: lowercased scheme, host, and
/// path, with any trailing slash collapsed. Query, fragment, and port do not
/// participate, so `https://X.com/A/` and `https://x.com/a` share a key.
pub fn normalized_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    let path = parsed.path().trim_end_matches('/');
    Some(format!(
        "{}://{}{}",
        parsed.scheme().to_ascii_lowercase(),
        host.to_ascii_lowercase(),
        path.to_ascii_lowercase()
    ))
}
