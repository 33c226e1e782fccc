//! Guard facade: one decision per inbound request.
//!
//! The rate limit is always consulted first. A rate-limited request never
//! reaches token verification.

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::{Clock, Timestamp};
use crate::rate_limit::{CounterStore, GuardPolicy};
use crate::token::TokenVerifier;

pub const DEFAULT_CLASS: &str = "default";
pub const UNKNOWN_IDENTIFIER: &str = "unknown";
const MAX_IDENTIFIER_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassPolicy {
    pub limit: GuardPolicy,
    pub state_changing: bool,
}

// Operation class -> policy, with a fallback for anything unclassified
#[derive(Debug, Clone)]
pub struct PolicyTable {
    classes: HashMap<String, ClassPolicy>,
    fallback: ClassPolicy,
}

impl PolicyTable {
    pub fn new(fallback: ClassPolicy) -> Self {
        Self {
            classes: HashMap::new(),
            fallback,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>, policy: ClassPolicy) -> Self {
        self.insert(class, policy);
        self
    }

    pub fn insert(&mut self, class: impl Into<String>, policy: ClassPolicy) {
        self.classes.insert(class.into(), policy);
    }

    pub fn contains(&self, class: &str) -> bool {
        class == DEFAULT_CLASS || self.classes.contains_key(class)
    }

    /// Resolved class name and its policy. Unknown classes share the
    /// fallback policy and the `default` key namespace.
    pub fn resolve<'a>(&'a self, class: &'a str) -> (&'a str, &'a ClassPolicy) {
        match self.classes.get_key_value(class) {
            Some((name, policy)) => (name.as_str(), policy),
            None => (DEFAULT_CLASS, &self.fallback),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GuardRequest<'a> {
    pub identifier: Option<&'a str>,
    pub operation_class: &'a str,
    pub csrf_token: Option<&'a str>,
    pub session_id: Option<&'a str>,
    // Set by the transport for non-safe methods
    pub mutating: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allowed { remaining: u32, reset_at: Timestamp },
    RateLimited { retry_after_ms: u64 },
    CsrfRejected,
}

pub struct Guard {
    clock: Arc<dyn Clock>,
    counters: Arc<CounterStore>,
    tokens: Arc<dyn TokenVerifier>,
    policies: PolicyTable,
    single_use_tokens: bool,
}

impl Guard {
    pub fn new(
        counters: Arc<CounterStore>,
        tokens: Arc<dyn TokenVerifier>,
        policies: PolicyTable,
        single_use_tokens: bool,
    ) -> Self {
        Self {
            clock: counters.clock(),
            counters,
            tokens,
            policies,
            single_use_tokens,
        }
    }

    pub fn evaluate(&self, request: &GuardRequest<'_>) -> GuardDecision {
        let (class, policy) = self.policies.resolve(request.operation_class);
        let identifier = normalize_identifier(request.identifier);
        let key = counter_key(class, identifier);

        let outcome = self.counters.check(&policy.limit, &key);
        if !outcome.allowed {
            let retry_after_ms = outcome.reset_at.saturating_sub(self.clock.now()).max(1);
            tracing::debug!(%class, %identifier, retry_after_ms, "rate limited");
            return GuardDecision::RateLimited { retry_after_ms };
        }

        if policy.state_changing && request.mutating && !self.csrf_ok(request) {
            tracing::debug!(%class, %identifier, "csrf rejected");
            return GuardDecision::CsrfRejected;
        }

        GuardDecision::Allowed {
            remaining: outcome.remaining,
            reset_at: outcome.reset_at,
        }
    }

    /// Manual unblock of one identifier within one class.
    pub fn reset(&self, operation_class: &str, identifier: Option<&str>) -> bool {
        let (class, _) = self.policies.resolve(operation_class);
        self.counters
            .reset(&counter_key(class, normalize_identifier(identifier)))
    }

    fn csrf_ok(&self, request: &GuardRequest<'_>) -> bool {
        let (Some(session_id), Some(token)) = (request.session_id, request.csrf_token) else {
            return false;
        };
        if self.single_use_tokens {
            self.tokens.consume(session_id, token)
        } else {
            self.tokens.verify(session_id, token)
        }
    }
}

/// Unusable identifiers collapse to one shared bucket instead of skipping
/// the limiter.
pub fn normalize_identifier(identifier: Option<&str>) -> &str {
    match identifier.map(str::trim) {
        Some(id)
            if !id.is_empty()
                && id.len() <= MAX_IDENTIFIER_LEN
                && !id.chars().any(char::is_control) =>
        {
            id
        }
        _ => UNKNOWN_IDENTIFIER,
    }
}

fn counter_key(class: &str, identifier: &str) -> String {
    format!("{}|{}", class, identifier)
}
