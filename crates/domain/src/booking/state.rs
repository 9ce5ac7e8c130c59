//! Booking lifecycle and payment sub-state.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The state of a booking in its lifecycle.
///
/// State transitions:
/// ```text
/// Idle ──► SessionTypeSelected ──► TimeSelected ──► PaymentPending ──► Confirmed ──► Completed
///                                       │                 │
///                                       └────────┬────────┘
///                                                ▼
///                                              Error ──(recovery token)──► Idle | SessionTypeSelected | TimeSelected
///
/// any non-terminal ──► Cancelled | Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingState {
    /// Booking exists, nothing selected yet.
    #[default]
    Idle,

    /// The client picked a session type.
    SessionTypeSelected,

    /// The client picked a time slot.
    TimeSelected,

    /// A checkout session is open with the payment provider.
    PaymentPending,

    /// Slot confirmed and paid (or exempt) (terminal-success).
    Confirmed,

    /// The session took place (terminal).
    Completed,

    /// Cancelled by a participant or the scheduling provider (terminal).
    Cancelled,

    /// The booking hold lapsed (terminal, recoverable via token).
    Expired,

    /// Payment failed or the checkout expired (recoverable via token).
    Error,
}

impl BookingState {
    /// All states, in lifecycle order.
    pub const ALL: [BookingState; 9] = [
        BookingState::Idle,
        BookingState::SessionTypeSelected,
        BookingState::TimeSelected,
        BookingState::PaymentPending,
        BookingState::Confirmed,
        BookingState::Completed,
        BookingState::Cancelled,
        BookingState::Expired,
        BookingState::Error,
    ];

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingState::Confirmed
                | BookingState::Completed
                | BookingState::Cancelled
                | BookingState::Expired
        )
    }

    /// Returns true if a session type can be (re)selected in this state.
    pub fn can_select_session_type(&self) -> bool {
        matches!(
            self,
            BookingState::Idle | BookingState::SessionTypeSelected | BookingState::TimeSelected
        )
    }

    /// Returns true if a time slot can be (re)selected in this state.
    pub fn can_select_time(&self) -> bool {
        matches!(
            self,
            BookingState::SessionTypeSelected | BookingState::TimeSelected
        )
    }

    /// Returns true if a checkout can be opened in this state.
    pub fn can_start_checkout(&self) -> bool {
        matches!(self, BookingState::TimeSelected)
    }

    /// Returns true if a payment outcome can be accepted in this state.
    ///
    /// `TimeSelected` is included because the payment webhook can overtake
    /// the checkout-started signal.
    pub fn awaits_payment(&self) -> bool {
        matches!(
            self,
            BookingState::TimeSelected | BookingState::PaymentPending
        )
    }

    /// Returns true if a recovery token can be issued for this state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BookingState::Error | BookingState::Expired | BookingState::PaymentPending
        )
    }

    /// Returns true if a recovery may force a booking into this state.
    pub fn is_recovery_target(&self) -> bool {
        matches!(
            self,
            BookingState::Idle
                | BookingState::SessionTypeSelected
                | BookingState::TimeSelected
                | BookingState::Cancelled
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingState::Idle => "IDLE",
            BookingState::SessionTypeSelected => "SESSION_TYPE_SELECTED",
            BookingState::TimeSelected => "TIME_SELECTED",
            BookingState::PaymentPending => "PAYMENT_PENDING",
            BookingState::Confirmed => "CONFIRMED",
            BookingState::Completed => "COMPLETED",
            BookingState::Cancelled => "CANCELLED",
            BookingState::Expired => "EXPIRED",
            BookingState::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for BookingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown state name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown booking state: {0}")]
pub struct ParseStateError(pub String);

impl FromStr for BookingState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        BookingState::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}

/// Payment sub-state, tracked independently of the booking lifecycle.
///
/// Moves forward only:
/// ```text
/// Unpaid ──► Pending ──┬──► Paid
///    │                 └──► Failed
///    └──► Paid | Failed   (provider outcome overtook checkout start)
/// ```
/// The single exception is administrative recovery, which resets to `Unpaid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    fn rank(&self) -> u8 {
        match self {
            PaymentStatus::Unpaid => 0,
            PaymentStatus::Pending => 1,
            PaymentStatus::Paid | PaymentStatus::Failed => 2,
        }
    }

    /// Returns true if moving to `next` is a forward move.
    pub fn can_advance_to(&self, next: PaymentStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Returns true if no further provider outcome is expected.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        assert_eq!(BookingState::default(), BookingState::Idle);
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = BookingState::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                BookingState::Confirmed,
                BookingState::Completed,
                BookingState::Cancelled,
                BookingState::Expired,
            ]
        );
    }

    #[test]
    fn test_awaits_payment() {
        assert!(!BookingState::SessionTypeSelected.awaits_payment());
        assert!(BookingState::TimeSelected.awaits_payment());
        assert!(BookingState::PaymentPending.awaits_payment());
        assert!(!BookingState::Confirmed.awaits_payment());
        assert!(!BookingState::Error.awaits_payment());
    }

    #[test]
    fn test_recoverable_states() {
        assert!(BookingState::Error.is_recoverable());
        assert!(BookingState::Expired.is_recoverable());
        assert!(BookingState::PaymentPending.is_recoverable());
        assert!(!BookingState::Confirmed.is_recoverable());
        assert!(!BookingState::Cancelled.is_recoverable());
        assert!(!BookingState::Idle.is_recoverable());
    }

    #[test]
    fn test_recovery_targets() {
        assert!(BookingState::Idle.is_recovery_target());
        assert!(BookingState::TimeSelected.is_recovery_target());
        assert!(BookingState::Cancelled.is_recovery_target());
        assert!(!BookingState::Confirmed.is_recovery_target());
        assert!(!BookingState::PaymentPending.is_recovery_target());
        assert!(!BookingState::Error.is_recovery_target());
    }

    #[test]
    fn test_display_and_parse() {
        for state in BookingState::ALL {
            let parsed: BookingState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
        assert_eq!(
            "time_selected".parse::<BookingState>(),
            Ok(BookingState::TimeSelected)
        );
        assert!("PAYMENT_RETRY".parse::<BookingState>().is_err());
    }

    #[test]
    fn test_serialization_uses_screaming_snake_case() {
        let json = serde_json::to_string(&BookingState::PaymentPending).unwrap();
        assert_eq!(json, "\"PAYMENT_PENDING\"");
        let deserialized: BookingState = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, BookingState::PaymentPending);
    }

    #[test]
    fn test_payment_status_moves_forward_only() {
        use PaymentStatus::*;
        assert!(Unpaid.can_advance_to(Pending));
        assert!(Unpaid.can_advance_to(Paid));
        assert!(Pending.can_advance_to(Paid));
        assert!(Pending.can_advance_to(Failed));
        assert!(!Paid.can_advance_to(Pending));
        assert!(!Paid.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Paid));
        assert!(!Pending.can_advance_to(Unpaid));
        assert!(!Pending.can_advance_to(Pending));
    }
}
