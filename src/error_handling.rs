//! Error families for the URL management subsystem.
//!
//! Validation findings and rule violations are data: they come back as typed
//! lists so callers can aggregate and report them in batch. Only storage I/O
//! and initialization failures are hard errors.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::SetLoggerError;
use strum::IntoEnumIterator;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

use crate::config::types::Carrier;

/// Error types for initialization failures.
#[derive(Error, Debug)]
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    Logger(#[from] SetLoggerError),

    /// Error initializing the HTTP client used for robots.txt fetches.
    #[error("HTTP client initialization error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// A syntactic or robots.txt finding against a single URL.
///
/// The `Display` form of each variant is the message surfaced to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The URL string was empty or whitespace-only.
    #[error("URL cannot be empty")]
    EmptyUrl,

    /// The URL exceeded the maximum accepted length.
    #[error("URL exceeds maximum length of {max} characters (length={len})")]
    TooLong {
        /// Actual length of the rejected URL.
        len: usize,
        /// The configured maximum.
        max: usize,
    },

    /// The URL could not be decomposed at all.
    #[error("failed to parse URL: {0}")]
    Unparsable(String),

    /// No scheme was present.
    #[error("no URL scheme specified")]
    MissingScheme,

    /// A scheme other than http/https was present.
    #[error("URL scheme must be http or https (found: {0})")]
    InvalidScheme(String),

    /// No host was present.
    #[error("no host specified")]
    MissingHost,

    /// The host failed the host grammar (DNS labels, dotted-quad, localhost).
    #[error("invalid domain format: {0}")]
    InvalidHostFormat(String),

    /// The path contained characters that break carrier portals.
    #[error("path contains problematic characters: {0}")]
    InvalidPathCharacters(String),

    /// robots.txt disallows the path for our user agent.
    #[error("URL is blocked by robots.txt")]
    RobotsDisallowed,
}

impl ValidationError {
    /// The statistics bucket this error counts toward.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::EmptyUrl => ErrorKind::EmptyUrl,
            ValidationError::TooLong { .. } => ErrorKind::UrlTooLong,
            ValidationError::Unparsable(_) => ErrorKind::UnparsableUrl,
            ValidationError::MissingScheme => ErrorKind::MissingScheme,
            ValidationError::InvalidScheme(_) => ErrorKind::InvalidScheme,
            ValidationError::MissingHost => ErrorKind::MissingHost,
            ValidationError::InvalidHostFormat(_) => ErrorKind::InvalidHostFormat,
            ValidationError::InvalidPathCharacters(_) => ErrorKind::InvalidPathCharacters,
            ValidationError::RobotsDisallowed => ErrorKind::RobotsDisallowed,
        }
    }
}

/// A non-fatal validation finding. Warnings never affect validity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// The robots.txt file could not be fetched or parsed.
    #[error("could not check robots.txt: {0}")]
    RobotsCheckFailed(String),

    /// The path ends with a binary/media extension we never crawl.
    #[error("path ends with blocked file extension: {0}")]
    BlockedExtension(String),
}

/// A carrier policy violation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleViolation {
    /// The host is not under any of the carrier's allowed domain suffixes.
    #[error("domain {host} not allowed for carrier {carrier}")]
    DomainNotAllowed {
        /// Host that was rejected.
        host: String,
        /// Carrier whose rules rejected it.
        carrier: Carrier,
    },

    /// The path starts with none of the carrier's required prefixes.
    #[error("URL path must start with a required prefix for carrier {carrier}")]
    MissingRequiredPath {
        /// Carrier whose rules rejected it.
        carrier: Carrier,
    },

    /// The path contains a forbidden pattern.
    #[error("URL contains forbidden path: {path}")]
    ForbiddenPath {
        /// Path that was rejected.
        path: String,
    },

    /// The carrier requires an authenticated context and none was signaled.
    #[error("authentication required for carrier {carrier}")]
    AuthenticationRequired {
        /// Carrier whose rules rejected it.
        carrier: Carrier,
    },

    /// The carrier has no usable rule configuration.
    #[error("no rules configured for carrier: {0}")]
    NoRulesForCarrier(Carrier),
}

impl RuleViolation {
    /// The statistics bucket this violation counts toward.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuleViolation::DomainNotAllowed { .. } => ErrorKind::DomainNotAllowed,
            RuleViolation::MissingRequiredPath { .. } => ErrorKind::MissingRequiredPath,
            RuleViolation::ForbiddenPath { .. } => ErrorKind::ForbiddenPath,
            RuleViolation::AuthenticationRequired { .. } => ErrorKind::AuthenticationRequired,
            RuleViolation::NoRulesForCarrier(_) => ErrorKind::NoRulesForCarrier,
        }
    }
}

/// Error types for URL store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No entry exists under the given normalized key.
    #[error("URL not found in store: {0}")]
    NotFound(String),

    /// A store key could not be derived from the URL.
    #[error("cannot derive a store key from URL: {0}")]
    InvalidUrl(String),

    /// The store file could not be read.
    #[error("failed to read store file {path}: {source}")]
    Load {
        /// Store file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The store file was not a valid store document.
    #[error("failed to parse store file {path}: {source}")]
    Parse {
        /// Store file path.
        path: PathBuf,
        /// Underlying deserialization error.
        source: serde_json::Error,
    },

    /// The store file could not be written or atomically replaced.
    #[error("failed to write store file {path}: {source}")]
    Write {
        /// Store file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Error types for carrier rule configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The rule file could not be read.
    #[error("failed to read rule configuration {path}: {source}")]
    Io {
        /// Rule file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The rule file was not valid JSON for the expected shape.
    #[error("failed to parse rule configuration {path}: {source}")]
    Parse {
        /// Rule file path.
        path: PathBuf,
        /// Underlying deserialization error.
        source: serde_json::Error,
    },

    /// A carrier rule failed load-time validation.
    #[error("invalid rule for carrier {carrier}: {reason}")]
    InvalidCarrierRule {
        /// Carrier the rule was for.
        carrier: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Why `add_url` did not persist an entry.
#[derive(Error, Debug)]
pub enum AddUrlError {
    /// Validation and/or rule checks failed; all messages aggregated.
    #[error("URL rejected: {}", .0.join("; "))]
    Rejected(Vec<String>),

    /// The checks passed but the store mutation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Kinds of failures tracked by [`ErrorStats`].
///
/// One bucket per entry in the subsystem's error taxonomy, so operators can
/// see at a glance what is rejecting their URLs.
#[allow(missing_docs)] // Variant names mirror the error variants they count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ErrorKind {
    EmptyUrl,
    UrlTooLong,
    UnparsableUrl,
    MissingScheme,
    InvalidScheme,
    MissingHost,
    InvalidHostFormat,
    InvalidPathCharacters,
    RobotsDisallowed,
    RobotsCheckFailed,
    DomainNotAllowed,
    MissingRequiredPath,
    ForbiddenPath,
    AuthenticationRequired,
    NoRulesForCarrier,
    RateLimitExceeded,
    StoreNotFound,
    StoreLoadFailure,
    StoreWriteFailure,
}

impl ErrorKind {
    /// Human-readable label for reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EmptyUrl => "empty URL",
            ErrorKind::UrlTooLong => "URL too long",
            ErrorKind::UnparsableUrl => "unparsable URL",
            ErrorKind::MissingScheme => "missing scheme",
            ErrorKind::InvalidScheme => "invalid scheme",
            ErrorKind::MissingHost => "missing host",
            ErrorKind::InvalidHostFormat => "invalid host format",
            ErrorKind::InvalidPathCharacters => "invalid path characters",
            ErrorKind::RobotsDisallowed => "blocked by robots.txt",
            ErrorKind::RobotsCheckFailed => "robots.txt check failed",
            ErrorKind::DomainNotAllowed => "domain not allowed",
            ErrorKind::MissingRequiredPath => "missing required path",
            ErrorKind::ForbiddenPath => "forbidden path",
            ErrorKind::AuthenticationRequired => "authentication required",
            ErrorKind::NoRulesForCarrier => "no rules for carrier",
            ErrorKind::RateLimitExceeded => "rate limit exceeded",
            ErrorKind::StoreNotFound => "store entry not found",
            ErrorKind::StoreLoadFailure => "store load failure",
            ErrorKind::StoreWriteFailure => "store write failure",
        }
    }
}

/// Thread-safe failure counters, one per [`ErrorKind`].
///
/// All kinds are initialized to zero on creation, so incrementing never
/// allocates and the struct can be shared across tasks behind an `Arc`.
pub struct ErrorStats {
    errors: HashMap<ErrorKind, AtomicUsize>,
}

impl ErrorStats {
    /// Creates a tracker with every kind at zero.
    pub fn new() -> Self {
        let mut errors = HashMap::new();
        for kind in ErrorKind::iter() {
            errors.insert(kind, AtomicUsize::new(0));
        }
        ErrorStats { errors }
    }

    /// Adds one occurrence of `kind`.
    pub fn increment(&self, kind: ErrorKind) {
        // All ErrorKind variants are initialized in new(), so unwrap() is safe
        self.errors
            .get(&kind)
            .unwrap()
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current count for `kind`.
    pub fn get_count(&self, kind: ErrorKind) -> usize {
        // All ErrorKind variants are initialized in new(), so unwrap() is safe
        self.errors.get(&kind).unwrap().load(Ordering::SeqCst)
    }

    /// Total failures across all kinds.
    pub fn total(&self) -> usize {
        ErrorKind::iter().map(|k| self.get_count(k)).sum()
    }
}

impl Default for ErrorStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_stats_initialization() {
        let stats = ErrorStats::new();
        for kind in ErrorKind::iter() {
            assert_eq!(stats.get_count(kind), 0);
        }
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn test_error_stats_increment() {
        let stats = ErrorStats::new();
        stats.increment(ErrorKind::DomainNotAllowed);
        stats.increment(ErrorKind::DomainNotAllowed);
        stats.increment(ErrorKind::RobotsDisallowed);
        assert_eq!(stats.get_count(ErrorKind::DomainNotAllowed), 2);
        assert_eq!(stats.get_count(ErrorKind::RobotsDisallowed), 1);
        assert_eq!(stats.get_count(ErrorKind::EmptyUrl), 0);
        assert_eq!(stats.total(), 3);
        assert_eq!(ErrorKind::DomainNotAllowed.as_str(), "domain not allowed");
    }

    #[test]
    fn test_validation_error_messages() {
        assert_eq!(ValidationError::EmptyUrl.to_string(), "URL cannot be empty");
        assert_eq!(
            ValidationError::TooLong { len: 3000, max: 2048 }.to_string(),
            "URL exceeds maximum length of 2048 characters (length=3000)"
        );
        assert_eq!(
            ValidationError::InvalidScheme("ftp".into()).to_string(),
            "URL scheme must be http or https (found: ftp)"
        );
        assert_eq!(
            ValidationError::RobotsDisallowed.to_string(),
            "URL is blocked by robots.txt"
        );
    }

    #[test]
    fn test_rule_violation_messages_name_the_carrier() {
        let v = RuleViolation::DomainNotAllowed {
            host: "evil.com".into(),
            carrier: Carrier::Aetna,
        };
        assert_eq!(v.to_string(), "domain evil.com not allowed for carrier aetna");
        assert_eq!(v.kind(), ErrorKind::DomainNotAllowed);

        let v = RuleViolation::AuthenticationRequired {
            carrier: Carrier::DeltaDental,
        };
        assert!(v.to_string().contains("delta_dental"));
    }

    #[test]
    fn test_add_url_error_aggregates_messages() {
        let err = AddUrlError::Rejected(vec!["first".into(), "second".into()]);
        assert_eq!(err.to_string(), "URL rejected: first; second");
    }
}
