//! url_warden: URL management for dental insurance carrier crawlers
//!
//! This library decides whether a URL is well-formed, permitted by
//! carrier-specific crawl rules and robots.txt, safe to request right now
//! (rate limiting), and durably tracks the outcome of each crawl attempt.
//! Crawlers ask it "may I fetch this, and may I fetch it *now*?" and report
//! back what happened; fetching, parsing, and cleaning all live outside.
//!
//! # Example
//!
//! ```no_run
//! use url_warden::{Carrier, UrlManager, UrlManagerConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = UrlManager::new(UrlManagerConfig::default())?;
//! manager.mark_authenticated(Carrier::Aetna);
//!
//! let added = manager
//!     .add_url(
//!         "https://www.aetna.com/providers",
//!         Carrier::Aetna,
//!         Some("provider-portal"),
//!         &["high-priority".to_string()].into_iter().collect(),
//!     )
//!     .await?;
//!
//! let (granted, wait) = manager.can_request_url(&added.entry.url, Carrier::Aetna).await;
//! if granted {
//!     // ... fetch the page ...
//!     manager.report_outcome(&added.entry.url, Carrier::Aetna, true, None)?;
//! } else {
//!     println!("rate limited, retry in {wait:.1}s");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! The robots.txt check performs network I/O, so the async APIs require a
//! Tokio runtime. Use `#[tokio::main]` or call from within an async context.

#![warn(missing_docs)]

pub mod config;
mod error_handling;
mod logging;
mod manager;
mod rules;
mod store;
mod validator;

// Re-export public API
pub use config::types::{Carrier, CarrierRule, RateLimitConfig, RuleSet};
pub use error_handling::{
    AddUrlError, ConfigError, ErrorKind, ErrorStats, InitializationError, RuleViolation,
    StoreError, ValidationError, ValidationWarning,
};
pub use logging::{init_logging, LogLevel};
pub use manager::{AddedUrl, UrlManager, UrlManagerConfig};
pub use rules::RulesEngine;
pub use store::{normalized_key, UrlEntry, UrlStatus, UrlStore};
pub use validator::{is_valid_host, ParsedUrl, UrlValidator, ValidationResult};
