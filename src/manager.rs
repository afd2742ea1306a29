//! High-level URL management façade.
//!
//! `UrlManager` composes the validator, the rules engine, and the store into
//! one decision: is this URL well-formed, permitted, safe to request now, and
//! what happened the last time we fetched it. It owns no persistent state of
//! its own.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, warn};

use crate::config::constants::{
    is_known_category, DEFAULT_STORE_PATH, DEFAULT_USER_AGENT, ROBOTS_CACHE_TTL,
    ROBOTS_FETCH_TIMEOUT,
};
use crate::config::types::{Carrier, CarrierRule, RuleSet};
use crate::error_handling::{
    AddUrlError, ErrorKind, ErrorStats, InitializationError, StoreError,
};
use crate::rules::RulesEngine;
use crate::store::{normalized_key, UrlEntry, UrlStore};
use crate::validator::UrlValidator;

/// Configuration for building a [`UrlManager`].
///
/// # Examples
///
/// ```no_run
/// use url_warden::{UrlManager, UrlManagerConfig};
///
/// let manager = UrlManager::new(UrlManagerConfig {
///     store_path: Some("./carrier_urls.json".into()),
///     ..Default::default()
/// }).expect("manager builds");
/// ```
#[derive(Debug, Clone)]
pub struct UrlManagerConfig {
    /// Store file path; `None` keeps the registry in memory only.
    pub store_path: Option<PathBuf>,
    /// Carrier rule table.
    pub rules: RuleSet,
    /// User agent for robots.txt fetches and group matching.
    pub user_agent: String,
    /// Timeout for a single robots.txt fetch.
    pub robots_fetch_timeout: Duration,
    /// How long fetched robots.txt rules stay fresh.
    pub robots_cache_ttl: Duration,
    /// Whether validation consults robots.txt at all. On by default; turn off
    /// for offline runs and tests.
    pub check_robots: bool,
}

impl Default for UrlManagerConfig {
    fn default() -> Self {
        UrlManagerConfig {
            store_path: Some(PathBuf::from(DEFAULT_STORE_PATH)),
            rules: RuleSet::builtin(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            robots_fetch_timeout: ROBOTS_FETCH_TIMEOUT,
            robots_cache_ttl: ROBOTS_CACHE_TTL,
            check_robots: true,
        }
    }
}

/// Result of a successful [`UrlManager::add_url`].
#[derive(Debug, Clone)]
pub struct AddedUrl {
    /// False when the URL merged into an existing entry.
    pub created: bool,
    /// The entry as persisted.
    pub entry: UrlEntry,
}

/// The URL management subsystem's public face.
///
/// Shared by reference (or `Arc`) across all of a process's crawl tasks; every
/// method takes `&self`.
pub struct UrlManager {
    validator: UrlValidator,
    rules: RulesEngine,
    store: UrlStore,
    check_robots: bool,
    authenticated: RwLock<HashSet<Carrier>>,
    stats: ErrorStats,
}

impl UrlManager {
    /// Builds a manager from `config`.
    pub fn new(config: UrlManagerConfig) -> Result<Self, InitializationError> {
        let validator = UrlValidator::new(
            &config.user_agent,
            config.robots_fetch_timeout,
            config.robots_cache_ttl,
        )?;
        let store = match config.store_path {
            Some(path) => UrlStore::open(path),
            None => UrlStore::in_memory(),
        };
        Ok(UrlManager {
            validator,
            rules: RulesEngine::new(config.rules),
            store,
            check_robots: config.check_robots,
            authenticated: RwLock::new(HashSet::new()),
            stats: ErrorStats::new(),
        })
    }

    /// Validates `url`, checks it against `carrier`'s rules, and persists it.
    ///
    /// All validation and rule errors are aggregated into the rejection; the
    /// store is not touched unless every check passes. Re-adding an existing
    /// URL merges tags and category into the entry.
    pub async fn add_url(
        &self,
        url: &str,
        carrier: Carrier,
        category: Option<&str>,
        tags: &BTreeSet<String>,
    ) -> Result<AddedUrl, AddUrlError> {
        let errors = self.run_checks(url, carrier).await;
        if !errors.is_empty() {
            return Err(AddUrlError::Rejected(errors));
        }

        if let Some(category) = category {
            if !is_known_category(category) {
                warn!("unrecognized category {category:?} for {url}");
            }
        }

        let (created, entry) = self.store.add(url, carrier, category, tags).map_err(|e| {
            self.stats.increment(ErrorKind::StoreWriteFailure);
            e
        })?;
        debug!(
            "{} {url} for carrier {carrier}",
            if created { "added" } else { "merged" }
        );
        Ok(AddedUrl { created, entry })
    }

    /// Pre-flight check: validation plus rules, no persistence.
    ///
    /// `Ok(())` means the URL would be accepted by [`Self::add_url`] right
    /// now; `Err` carries every failure message.
    pub async fn validate_url(&self, url: &str, carrier: Carrier) -> Result<(), Vec<String>> {
        let errors = self.run_checks(url, carrier).await;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validates many URLs independently and concurrently.
    ///
    /// Returns only the failures, keyed by URL; an empty map means everything
    /// passed. One bad URL never affects the others.
    pub async fn validate_urls_batch(
        &self,
        urls: &[(String, Carrier)],
    ) -> HashMap<String, Vec<String>> {
        let checks = urls.iter().map(|(url, carrier)| {
            let carrier = *carrier;
            async move { (url.clone(), self.run_checks(url, carrier).await) }
        });
        join_all(checks)
            .await
            .into_iter()
            .filter(|(_, errors)| !errors.is_empty())
            .collect()
    }

    /// Asks whether `url` may be fetched right now under `carrier`'s rate
    /// limit. Grants consume budget; denials return the seconds to wait.
    ///
    /// Syntactic validation is not re-run here; callers are expected to have
    /// validated the URL already.
    pub async fn can_request_url(&self, url: &str, carrier: Carrier) -> (bool, f64) {
        let (granted, wait) = self.rules.can_request(carrier).await;
        if !granted {
            self.stats.increment(ErrorKind::RateLimitExceeded);
            debug!("rate limit for {carrier} defers {url} by {wait:.2}s");
        }
        (granted, wait)
    }

    /// Records the outcome of a fetch of `url`.
    ///
    /// A failed URL stays tracked and may always be retried; the entry's
    /// counters summarize its history.
    pub fn report_outcome(
        &self,
        url: &str,
        carrier: Carrier,
        success: bool,
        error: Option<&str>,
    ) -> Result<UrlEntry, StoreError> {
        let key = normalized_key(url).ok_or_else(|| StoreError::InvalidUrl(url.to_string()))?;
        if !success {
            debug!("recording failure for {carrier} URL {url}: {}", error.unwrap_or("unspecified"));
        }
        self.store.update_status(&key, success, error).map_err(|e| {
            match &e {
                StoreError::NotFound(_) => self.stats.increment(ErrorKind::StoreNotFound),
                _ => self.stats.increment(ErrorKind::StoreWriteFailure),
            }
            e
        })
    }

    /// All tracked URLs for `carrier`, oldest first.
    pub fn get_urls_by_carrier(&self, carrier: Carrier) -> Vec<UrlEntry> {
        self.store.by_carrier(carrier)
    }

    /// All tracked URLs filed under `category`, oldest first.
    pub fn get_urls_by_category(&self, category: &str) -> Vec<UrlEntry> {
        self.store.by_category(category)
    }

    /// All tracked URLs carrying `tag`, oldest first.
    pub fn get_urls_by_tag(&self, tag: &str) -> Vec<UrlEntry> {
        self.store.by_tag(tag)
    }

    /// The tracked entry for `url`, if any.
    pub fn get_url(&self, url: &str) -> Option<UrlEntry> {
        let key = normalized_key(url)?;
        self.store.get(&key)
    }

    /// Stops tracking `url`.
    pub fn remove_url(&self, url: &str) -> Result<UrlEntry, StoreError> {
        let key = normalized_key(url).ok_or_else(|| StoreError::InvalidUrl(url.to_string()))?;
        self.store.remove(&key)
    }

    /// Adds `tags` to the tracked entry for `url`.
    pub fn add_tags(&self, url: &str, tags: &BTreeSet<String>) -> Result<UrlEntry, StoreError> {
        let key = normalized_key(url).ok_or_else(|| StoreError::InvalidUrl(url.to_string()))?;
        self.store.add_tags(&key, tags)
    }

    /// Removes `tags` from the tracked entry for `url`.
    pub fn remove_tags(&self, url: &str, tags: &BTreeSet<String>) -> Result<UrlEntry, StoreError> {
        let key = normalized_key(url).ok_or_else(|| StoreError::InvalidUrl(url.to_string()))?;
        self.store.remove_tags(&key, tags)
    }

    /// The static rule for `carrier`, with its custom headers and auth
    /// requirement.
    pub fn carrier_rule(&self, carrier: Carrier) -> Option<&CarrierRule> {
        self.rules.rule(carrier)
    }

    /// Marks `carrier` as having an authenticated session, satisfying its
    /// `auth_required` rule until [`Self::clear_authenticated`].
    pub fn mark_authenticated(&self, carrier: Carrier) {
        self.write_authenticated().insert(carrier);
    }

    /// Clears the authenticated mark for `carrier`.
    pub fn clear_authenticated(&self, carrier: Carrier) {
        self.write_authenticated().remove(&carrier);
    }

    /// Failure counters accumulated by this manager.
    pub fn stats(&self) -> &ErrorStats {
        &self.stats
    }

    /// The load error recorded if the store file was unreadable or malformed
    /// when the manager was built.
    pub fn store_load_error(&self) -> Option<String> {
        self.store.load_error()
    }

    async fn run_checks(&self, url: &str, carrier: Carrier) -> Vec<String> {
        let result = self.validator.validate(url, self.check_robots).await;
        for error in &result.errors {
            self.stats.increment(error.kind());
        }
        for warning in &result.warnings {
            debug!("validation warning for {url}: {warning}");
        }
        let mut errors = result.error_messages();

        // Rule checks need a decomposed URL; run them only when validation
        // passed, so a syntactically broken URL reports its real problem
        // instead of a cascade.
        if result.is_valid {
            if let Some(parsed) = &result.parsed_url {
                let violations =
                    self.rules
                        .check_rules(parsed, carrier, self.is_authenticated(carrier));
                for violation in &violations {
                    self.stats.increment(violation.kind());
                }
                errors.extend(violations.iter().map(|v| v.to_string()));
            }
        }
        errors
    }

    fn is_authenticated(&self, carrier: Carrier) -> bool {
        match self.authenticated.read() {
            Ok(set) => set.contains(&carrier),
            Err(poisoned) => poisoned.into_inner().contains(&carrier),
        }
    }

    fn write_authenticated(&self) -> std::sync::RwLockWriteGuard<'_, HashSet<Carrier>> {
        match self.authenticated.write() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
