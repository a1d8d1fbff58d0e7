//! Access tokens and the resolved credential handle.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use crate::strategy::StrategyKind;

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_SKEW: SignedDuration = SignedDuration::from_secs(120);

static NEXT_CREDENTIAL_ID: AtomicU64 = AtomicU64::new(1);

/// OAuth bearer token with its expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    secret: String,
    expires_on: Timestamp,
}

impl AccessToken {
    /// Creates a token that expires at `expires_on`.
    pub fn new(secret: impl Into<String>, expires_on: Timestamp) -> Self {
        Self {
            secret: secret.into(),
            expires_on,
        }
    }

    /// Creates a token valid for `lifetime` from now.
    pub fn expiring_in(secret: impl Into<String>, lifetime: SignedDuration) -> Self {
        let expires_on = Timestamp::now()
            .checked_add(lifetime)
            .unwrap_or(Timestamp::MAX);
        Self::new(secret, expires_on)
    }

    /// The raw bearer token. Never log this.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Expiry instant reported by the identity provider.
    pub fn expires_on(&self) -> Timestamp {
        self.expires_on
    }

    /// Whether the token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Timestamp::now())
    }

    /// Whether the token is expired or about to expire at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        let deadline = self
            .expires_on
            .checked_sub(EXPIRY_SKEW)
            .unwrap_or(Timestamp::MIN);
        now >= deadline
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Authenticated handle produced by [`CredentialResolver`](crate::CredentialResolver).
///
/// Handles are compared by [`id`](Self::id): two handles are equivalent only
/// when they come from the same resolution.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    id: u64,
    strategy: StrategyKind,
    token: AccessToken,
    resolved_at: Timestamp,
    fingerprint: String,
}

impl ResolvedCredential {
    /// Wraps a freshly obtained token.
    pub fn new(strategy: StrategyKind, token: AccessToken, fingerprint: impl Into<String>) -> Self {
        Self {
            id: NEXT_CREDENTIAL_ID.fetch_add(1, Ordering::Relaxed),
            strategy,
            token,
            resolved_at: Timestamp::now(),
            fingerprint: fingerprint.into(),
        }
    }

    /// Process-unique identifier of this resolution.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The strategy that produced this handle.
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// The bearer token used for storage requests.
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    /// When the handle was produced.
    pub fn resolved_at(&self) -> Timestamp {
        self.resolved_at
    }

    /// When the handle stops being usable.
    pub fn expires_on(&self) -> Timestamp {
        self.token.expires_on()
    }

    /// Digest of the strategy inputs this handle was produced from.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Whether the handle can still be used for requests.
    pub fn is_valid(&self) -> bool {
        !self.token.is_expired()
    }
}

impl PartialEq for ResolvedCredential {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ResolvedCredential {}
