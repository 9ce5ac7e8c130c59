//! Value objects for the booking domain.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::TransitionError;

/// A confirmed or tentatively selected session time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    /// IANA timezone name the client booked in (e.g. "Europe/Berlin").
    pub client_timezone: String,
}

impl TimeSlot {
    /// Creates a validated time slot.
    pub fn new(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        client_timezone: impl Into<String>,
    ) -> Result<Self, TransitionError> {
        let slot = Self {
            start_time,
            end_time,
            client_timezone: client_timezone.into(),
        };
        slot.validate()?;
        Ok(slot)
    }

    /// Checks that the slot has positive length and a timezone.
    pub fn validate(&self) -> Result<(), TransitionError> {
        if self.end_time <= self.start_time {
            return Err(TransitionError::InvalidSlot(format!(
                "end time {} is not after start time {}",
                self.end_time, self.start_time
            )));
        }
        if self.client_timezone.trim().is_empty() {
            return Err(TransitionError::InvalidSlot(
                "client timezone is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the slot length.
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

/// Why the payment provider reported a checkout as unsuccessful.
///
/// Both kinds move the booking to `Error`; the distinction is kept for
/// support tooling and recovery messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFailure {
    /// The checkout session expired without payment.
    Expired,

    /// The payment was attempted and declined or failed.
    Failed,
}

impl PaymentFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentFailure::Expired => "expired",
            PaymentFailure::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_slot() {
        let start = Utc::now();
        let slot = TimeSlot::new(start, start + Duration::minutes(30), "UTC").unwrap();
        assert_eq!(slot.duration(), Duration::minutes(30));
    }

    #[test]
    fn test_slot_rejects_non_positive_length() {
        let start = Utc::now();
        assert!(matches!(
            TimeSlot::new(start, start, "UTC"),
            Err(TransitionError::InvalidSlot(_))
        ));
        assert!(TimeSlot::new(start, start - Duration::minutes(5), "UTC").is_err());
    }

    #[test]
    fn test_slot_requires_timezone() {
        let start = Utc::now();
        assert!(TimeSlot::new(start, start + Duration::hours(1), "  ").is_err());
    }
}
