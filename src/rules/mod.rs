//! Carrier policy checks and fixed-window rate limiting.
//!
//! Policy checks run against immutable configuration and need no lock. Rate
//! state is one mutex per carrier, so carriers never contend with each other
//! and grants for one carrier are strictly serialized.

use std::collections::HashMap;
use std::time::Duration;

use log::{error, trace};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::types::{Carrier, CarrierRule, RuleSet};
use crate::error_handling::RuleViolation;
use crate::validator::ParsedUrl;

/// Live request-counting state for one carrier's fixed window.
#[derive(Debug)]
struct RateState {
    window_start: Instant,
    requests_in_window: u32,
    last_request_at: Option<Instant>,
}

/// Enforces per-carrier crawl policy and request budgets.
pub struct RulesEngine {
    rules: RuleSet,
    rate: HashMap<Carrier, Mutex<RateState>>,
}

impl RulesEngine {
    /// Builds an engine over `rules`, with a fresh rate window per carrier.
    pub fn new(rules: RuleSet) -> Self {
        let now = Instant::now();
        let rate = rules
            .carriers()
            .into_iter()
            .map(|carrier| {
                (
                    carrier,
                    Mutex::new(RateState {
                        window_start: now,
                        requests_in_window: 0,
                        last_request_at: None,
                    }),
                )
            })
            .collect();
        RulesEngine { rules, rate }
    }

    /// The static rule for `carrier`, if the carrier is enabled.
    ///
    /// Collaborator crawlers read `custom_headers` and `auth_required` here
    /// when building their requests.
    pub fn rule(&self, carrier: Carrier) -> Option<&CarrierRule> {
        self.rules.get(carrier)
    }

    /// Checks a decomposed URL against `carrier`'s policy.
    ///
    /// Returns every violation found (empty means compliant). Read-only; safe
    /// to call from any task without coordination.
    pub fn check_rules(
        &self,
        parsed: &ParsedUrl,
        carrier: Carrier,
        authenticated: bool,
    ) -> Vec<RuleViolation> {
        let Some(rule) = self.rules.get(carrier) else {
            return vec![RuleViolation::NoRulesForCarrier(carrier)];
        };

        let mut violations = Vec::new();
        let host = parsed.host.to_ascii_lowercase();

        let domain_ok = rule
            .allowed_domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")));
        if !domain_ok {
            violations.push(RuleViolation::DomainNotAllowed {
                host: parsed.host.clone(),
                carrier,
            });
        }

        if !rule.required_path_prefixes.is_empty()
            && !rule
                .required_path_prefixes
                .iter()
                .any(|prefix| parsed.path.starts_with(prefix.as_str()))
        {
            violations.push(RuleViolation::MissingRequiredPath { carrier });
        }

        if rule
            .forbidden_path_patterns
            .iter()
            .any(|pattern| parsed.path.contains(pattern.as_str()))
        {
            violations.push(RuleViolation::ForbiddenPath {
                path: parsed.path.clone(),
            });
        }

        if rule.auth_required && !authenticated {
            violations.push(RuleViolation::AuthenticationRequired { carrier });
        }

        violations
    }

    /// Asks for one request slot for `carrier` right now.
    ///
    /// Returns `(true, 0.0)` and consumes a slot when the current window has
    /// budget left; otherwise `(false, wait_seconds)` with the time until the
    /// window resets. Only granted requests count against the window.
    pub async fn can_request(&self, carrier: Carrier) -> (bool, f64) {
        let (Some(rule), Some(state)) = (self.rules.get(carrier), self.rate.get(&carrier)) else {
            error!("can_request called for carrier without rules: {carrier}");
            return (false, 0.0);
        };
        let period = Duration::from_secs(rule.rate_limit.period_seconds);

        let mut state = state.lock().await;
        let now = Instant::now();

        if now.duration_since(state.window_start) >= period {
            state.window_start = now;
            state.requests_in_window = 0;
        }

        if state.requests_in_window < rule.rate_limit.max_requests {
            if let Some(previous) = state.last_request_at {
                trace!(
                    "granting {carrier} request {} of {}, {:.2}s after the previous grant",
                    state.requests_in_window + 1,
                    rule.rate_limit.max_requests,
                    now.duration_since(previous).as_secs_f64()
                );
            }
            state.requests_in_window += 1;
            state.last_request_at = Some(now);
            return (true, 0.0);
        }

        // Window still open and exhausted; elapsed < period after the reset
        // check above, so the wait is always non-negative.
        let wait = period.saturating_sub(now.duration_since(state.window_start));
        (false, wait.as_secs_f64())
    }
}
