//! Configuration: limits, timeouts, and per-carrier crawl rules.

pub mod constants;
pub mod types;

pub use constants::{
    is_known_category, is_known_tag, DEFAULT_STORE_PATH, DEFAULT_USER_AGENT, MAX_URL_LENGTH,
    ROBOTS_CACHE_TTL, ROBOTS_FETCH_TIMEOUT,
};
pub use types::{Carrier, CarrierRule, RateLimitConfig, RuleSet};
