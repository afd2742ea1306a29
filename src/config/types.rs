//! Carrier identities and per-carrier crawl rules.
//!
//! Rules are an explicit, enumerated configuration: built-in defaults per
//! carrier, optionally overridden from a JSON file, validated once at load
//! time. A rule that fails validation disables that carrier only; the rest of
//! the fleet keeps crawling.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use log::error;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::config::constants::DEFAULT_USER_AGENT;
use crate::error_handling::ConfigError;

/// An insurance carrier whose portal we crawl.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Carrier {
    /// Aetna dental.
    Aetna,
    /// Cigna dental.
    Cigna,
    /// MetLife dental.
    Metlife,
    /// UnitedHealthcare dental.
    Uhc,
    /// Delta Dental.
    DeltaDental,
}

/// Fixed-window request budget for one carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests granted per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub period_seconds: u64,
}

/// Static crawl policy for one carrier. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierRule {
    /// Host suffixes requests may target (`aetna.com` admits `www.aetna.com`).
    pub allowed_domains: BTreeSet<String>,
    /// When non-empty, the path must start with one of these.
    #[serde(default)]
    pub required_path_prefixes: Vec<String>,
    /// Substrings that must not appear in the path.
    #[serde(default)]
    pub forbidden_path_patterns: Vec<String>,
    /// Request budget for the carrier.
    pub rate_limit: RateLimitConfig,
    /// Whether the carrier's pages need an authenticated session.
    #[serde(default)]
    pub auth_required: bool,
    /// Headers the crawler must send to this carrier.
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
}

impl CarrierRule {
    /// Validates the rule and normalizes domains to lowercase.
    ///
    /// Returns the reason on failure; used at load time so a bad rule can
    /// disable its carrier without touching the others.
    pub fn validated(mut self) -> Result<Self, String> {
        if self.allowed_domains.is_empty() {
            return Err("allowed_domains must not be empty".into());
        }
        if self
            .allowed_domains
            .iter()
            .any(|d| d.is_empty() || d.contains('/'))
        {
            return Err("allowed_domains entries must be bare host suffixes".into());
        }
        if self.rate_limit.max_requests == 0 {
            return Err("rate_limit.max_requests must be at least 1".into());
        }
        if self.rate_limit.period_seconds == 0 {
            return Err("rate_limit.period_seconds must be at least 1".into());
        }
        if let Some(p) = self
            .required_path_prefixes
            .iter()
            .find(|p| !p.starts_with('/'))
        {
            return Err(format!("required path prefix {p:?} must start with '/'"));
        }
        self.allowed_domains = self
            .allowed_domains
            .iter()
            .map(|d| d.to_ascii_lowercase())
            .collect();
        Ok(self)
    }
}

/// The full rule table, one [`CarrierRule`] per enabled carrier.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: HashMap<Carrier, CarrierRule>,
}

impl RuleSet {
    /// A rule set with no carriers enabled.
    pub fn empty() -> Self {
        RuleSet {
            rules: HashMap::new(),
        }
    }

    /// The built-in defaults for every known carrier.
    pub fn builtin() -> Self {
        let mut rules = HashMap::new();
        rules.insert(
            Carrier::Aetna,
            default_rule(
                &[
                    "www.aetna.com",
                    "provider.aetna.com",
                    "connect.aetna.com",
                    "navinet.aetna.com",
                ],
                &["/login", "/logout", "/password-reset"],
                RateLimitConfig {
                    max_requests: 10,
                    period_seconds: 5,
                },
            ),
        );
        rules.insert(
            Carrier::Cigna,
            default_rule(
                &["www.cigna.com", "cignaforhcp.cigna.com", "provider.cigna.com"],
                &["/login", "/logout", "/reset-password"],
                RateLimitConfig {
                    max_requests: 5,
                    period_seconds: 5,
                },
            ),
        );
        rules.insert(
            Carrier::Metlife,
            default_rule(
                &["www.metlife.com", "online.metlife.com", "provider.metlife.com"],
                &["/login", "/logout", "/password-reset"],
                RateLimitConfig {
                    max_requests: 3,
                    period_seconds: 2,
                },
            ),
        );
        rules.insert(
            Carrier::Uhc,
            default_rule(
                &[
                    "www.uhc.com",
                    "provider.uhc.com",
                    "www.unitedhealthcareonline.com",
                ],
                &["/login", "/logout", "/password-reset"],
                RateLimitConfig {
                    max_requests: 5,
                    period_seconds: 5,
                },
            ),
        );
        rules.insert(
            Carrier::DeltaDental,
            default_rule(
                &["www.deltadental.com", "provider.deltadental.com"],
                &["/login", "/logout", "/password-reset"],
                RateLimitConfig {
                    max_requests: 5,
                    period_seconds: 5,
                },
            ),
        );
        RuleSet { rules }
    }

    /// Built-in defaults overridden from a JSON file.
    ///
    /// The file maps carrier names to [`CarrierRule`] objects. An unreadable
    /// or unparsable file is fatal; an invalid entry disables only its own
    /// carrier (logged as an error), and an unknown carrier name is logged and
    /// skipped.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let overrides: HashMap<String, CarrierRule> =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut set = Self::builtin();
        for (name, rule) in overrides {
            let carrier = match name.parse::<Carrier>() {
                Ok(c) => c,
                Err(_) => {
                    error!("unknown carrier in rule configuration: {name}");
                    continue;
                }
            };
            match rule.validated() {
                Ok(rule) => {
                    set.rules.insert(carrier, rule);
                }
                Err(reason) => {
                    error!("invalid rule for carrier {carrier}: {reason}; carrier disabled");
                    set.rules.remove(&carrier);
                }
            }
        }
        Ok(set)
    }

    /// Installs a validated rule for `carrier`, replacing any existing one.
    pub fn set(&mut self, carrier: Carrier, rule: CarrierRule) -> Result<(), ConfigError> {
        let rule = rule
            .validated()
            .map_err(|reason| ConfigError::InvalidCarrierRule {
                carrier: carrier.to_string(),
                reason,
            })?;
        self.rules.insert(carrier, rule);
        Ok(())
    }

    /// The rule for `carrier`, if the carrier is enabled.
    pub fn get(&self, carrier: Carrier) -> Option<&CarrierRule> {
        self.rules.get(&carrier)
    }

    /// All enabled carriers, in a stable order.
    pub fn carriers(&self) -> Vec<Carrier> {
        let mut carriers: Vec<Carrier> = self.rules.keys().copied().collect();
        carriers.sort();
        carriers
    }

    /// Number of enabled carriers.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no carrier is enabled.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

fn default_rule(domains: &[&str], forbidden: &[&str], rate_limit: RateLimitConfig) -> CarrierRule {
    CarrierRule {
        allowed_domains: domains.iter().map(|d| d.to_string()).collect(),
        required_path_prefixes: Vec::new(),
        forbidden_path_patterns: forbidden.iter().map(|p| p.to_string()).collect(),
        rate_limit,
        auth_required: true,
        custom_headers: BTreeMap::from([("User-Agent".to_string(), DEFAULT_USER_AGENT.to_string())]),
    }
}
