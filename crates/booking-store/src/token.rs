use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::BookingId;

/// A persisted recovery token.
///
/// Only the hash of the token is stored; the raw token is handed to the
/// client once and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    /// Hex-encoded SHA-256 digest of the raw token.
    pub token_hash: String,

    /// The booking this token may act on.
    pub booking_id: BookingId,

    /// State to force the booking into on redemption, if fixed at issue time.
    pub target_state: Option<String>,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    /// Set once the token has been redeemed.
    pub used_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Returns true if the token has been redeemed.
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    /// Returns true if the token is past its expiry at the given instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
