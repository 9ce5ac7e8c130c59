//! Recovery tokens.
//!
//! A recovery token is the only credential handed to a client whose
//! booking stalled. The raw token never reaches storage: only its SHA-256
//! digest is persisted, so a leaked table cannot be replayed.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use booking_store::StoredToken;
use chrono::{DateTime, Duration, Utc};
use common::BookingId;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::booking::{BookingState, ParseStateError};

/// Generates a 256-bit random token encoded as base64url (43 characters).
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let mut random_bytes = [0u8; 32];
    rng.fill_bytes(&mut random_bytes);
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Returns the hex-encoded SHA-256 digest the store keys tokens by.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// A persisted recovery grant.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryToken {
    pub token_hash: String,
    pub booking_id: BookingId,

    /// State the booking is forced into on redemption. `None` lets the
    /// redeemer choose, defaulting to `Idle`.
    pub target_state: Option<BookingState>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl RecoveryToken {
    /// Creates a fresh token for a booking, returning the grant and the raw
    /// token to hand to the client.
    pub fn issue(
        booking_id: BookingId,
        target_state: Option<BookingState>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> (Self, IssuedToken) {
        let token = generate_token();
        let grant = Self {
            token_hash: hash_token(&token),
            booking_id,
            target_state,
            issued_at: now,
            expires_at: now + ttl,
            used_at: None,
        };
        let issued = IssuedToken {
            token,
            booking_id,
            expires_at: grant.expires_at,
        };
        (grant, issued)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn to_stored(&self) -> StoredToken {
        StoredToken {
            token_hash: self.token_hash.clone(),
            booking_id: self.booking_id,
            target_state: self.target_state.map(|s| s.as_str().to_string()),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            used_at: self.used_at,
        }
    }

    pub fn from_stored(stored: StoredToken) -> Result<Self, ParseStateError> {
        let target_state = stored
            .target_state
            .as_deref()
            .map(str::parse::<BookingState>)
            .transpose()?;
        Ok(Self {
            token_hash: stored.token_hash,
            booking_id: stored.booking_id,
            target_state,
            issued_at: stored.issued_at,
            expires_at: stored.expires_at,
            used_at: stored.used_at,
        })
    }
}

/// The raw token returned to the caller exactly once, at issue time.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub booking_id: BookingId,
    pub expires_at: DateTime<Utc>,
}
