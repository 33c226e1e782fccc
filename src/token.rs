//! Per-session anti-forgery tokens.
//!
//! At most one live token exists per session; issuing again overwrites the
//! previous one. Only the SHA-256 digest of a secret is kept, and candidates
//! are compared digest-to-digest in constant time. Expired entries are purged
//! the next time they are looked at, or by `sweep`.

use dashmap::DashMap;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::clock::{Clock, Timestamp};
use crate::error::GuardError;

const SECRET_BYTES: usize = 32;

/// Token value handed to the client. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenValue(String);

impl TokenValue {
    fn generate() -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for TokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenValue(<redacted>)")
    }
}

struct TokenEntry {
    digest: [u8; 32],
    issued_at: Timestamp,
    expires_at: Timestamp,
}

impl TokenEntry {
    fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    fn matches(&self, candidate: &str) -> bool {
        digests_match(&self.digest, &digest(candidate))
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

// fold over every byte, no early exit
fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Constant-time equality for secrets of any length: both sides are hashed
/// first, so neither the length nor the content of `b` leaks through timing.
pub fn secrets_match(a: &str, b: &str) -> bool {
    digests_match(&digest(a), &digest(b))
}

/// Seam between the guard and whatever holds the tokens.
pub trait TokenVerifier: Send + Sync {
    /// True iff a live token for `session_id` equals `candidate`.
    fn verify(&self, session_id: &str, candidate: &str) -> bool;

    /// Like `verify`, but a match also removes the token in the same step.
    fn consume(&self, session_id: &str, candidate: &str) -> bool;
}

pub struct TokenStore {
    clock: Arc<dyn Clock>,
    tokens: DashMap<String, TokenEntry>,
}

impl TokenStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tokens: DashMap::new(),
        }
    }

    pub fn issue(&self, session_id: &str, lifetime_ms: u64) -> Result<TokenValue, GuardError> {
        if session_id.trim().is_empty() {
            return Err(GuardError::InvalidSession);
        }

        let now = self.clock.now();
        let token = TokenValue::generate();
        self.tokens.insert(
            session_id.to_owned(),
            TokenEntry {
                digest: digest(token.as_str()),
                issued_at: now,
                expires_at: now.saturating_add(lifetime_ms),
            },
        );
        Ok(token)
    }

    pub fn verify(&self, session_id: &str, candidate: &str) -> bool {
        let now = self.clock.now();

        let age_ms = match self.tokens.get(session_id) {
            None => return false,
            Some(entry) if entry.is_expired(now) => now.saturating_sub(entry.issued_at),
            Some(entry) => return entry.matches(candidate),
        };

        // read guard is released; purge unless someone re-issued meanwhile
        self.tokens.remove_if(session_id, |_, entry| entry.is_expired(now));
        tracing::debug!(age_ms, "expired csrf token purged");
        false
    }

    pub fn consume(&self, session_id: &str, candidate: &str) -> bool {
        let now = self.clock.now();

        let spent = self
            .tokens
            .remove_if(session_id, |_, entry| {
                !entry.is_expired(now) && entry.matches(candidate)
            })
            .is_some();
        if !spent {
            self.tokens.remove_if(session_id, |_, entry| entry.is_expired(now));
        }
        spent
    }

    // Logout or explicit revocation
    pub fn invalidate(&self, session_id: &str) -> bool {
        self.tokens.remove(session_id).is_some()
    }

    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.tokens.len();
        self.tokens.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.tokens.len())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenVerifier for TokenStore {
    fn verify(&self, session_id: &str, candidate: &str) -> bool {
        TokenStore::verify(self, session_id, candidate)
    }

    fn consume(&self, session_id: &str, candidate: &str) -> bool {
        TokenStore::consume(self, session_id, candidate)
    }
}
