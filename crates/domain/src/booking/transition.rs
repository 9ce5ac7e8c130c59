//! The booking transition function.
//!
//! `transition` is pure: it takes the current booking and an event and
//! returns the next booking plus the side effects to fire, or a
//! `TransitionError`. It never reads the clock or touches storage; the
//! caller passes the current time in `TransitionContext`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    Booking, BookingEvent, BookingEventKind, BookingState, NotificationKind, PaymentFailure,
    PaymentStatus, SideEffect, TimeSlot, TransitionError,
};

/// Inputs the transition function needs besides the booking and event.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext {
    pub now: DateTime<Utc>,
}

impl TransitionContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

/// How an accepted event affected the booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// The lifecycle state changed.
    Applied,

    /// Slot or correlation data changed; the state did not.
    Merged,

    /// A repeated delivery. Nothing changed.
    Duplicate,

    /// The event belongs to a payment attempt retired by recovery.
    Superseded,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Applied => "applied",
            TransitionKind::Merged => "merged",
            TransitionKind::Duplicate => "duplicate",
            TransitionKind::Superseded => "superseded",
        }
    }
}

/// The result of a successful transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub kind: TransitionKind,
    pub previous_state: BookingState,

    /// The booking after the event. Equal to the input unless the
    /// booking changed.
    pub booking: Booking,

    /// Empty unless `kind` is `Applied`.
    pub effects: Vec<SideEffect>,
}

impl Transition {
    pub fn next_state(&self) -> BookingState {
        self.booking.state()
    }

    /// Returns true if the booking must be persisted.
    pub fn changes_record(&self) -> bool {
        matches!(self.kind, TransitionKind::Applied | TransitionKind::Merged)
    }
}

enum Handled {
    Evaluated,
    Superseded,
}

/// Computes the next booking for an event.
pub fn transition(
    current: &Booking,
    event: &BookingEvent,
    ctx: &TransitionContext,
) -> Result<Transition, TransitionError> {
    if event.booking_id != current.booking_id {
        return Err(TransitionError::BookingMismatch {
            expected: current.booking_id,
            actual: event.booking_id,
        });
    }

    let mut next = current.clone();
    let handled = match &event.kind {
        BookingEventKind::SessionTypeSelected { session_type_id } => {
            if !current.state.can_select_session_type() {
                return Err(illegal(current, event));
            }
            // Re-selecting the current type past Idle changes nothing
            if current.session_type_id != *session_type_id || current.state == BookingState::Idle
            {
                next.session_type_id = session_type_id.clone();
                next.state = BookingState::SessionTypeSelected;
            }
            Handled::Evaluated
        }

        BookingEventKind::TimeSelected { slot } => {
            slot.validate()?;
            if !current.state.can_select_time() {
                return Err(illegal(current, event));
            }
            next.slot = Some(slot.clone());
            next.state = BookingState::TimeSelected;
            Handled::Evaluated
        }

        BookingEventKind::CheckoutStarted { session_ref } => {
            checkout_started(current, &mut next, event, session_ref)?
        }

        BookingEventKind::PaymentSucceeded { session_ref } => {
            payment_succeeded(current, &mut next, event, session_ref)?
        }

        BookingEventKind::PaymentFailed {
            session_ref,
            failure,
            ..
        } => payment_failed(current, &mut next, event, session_ref, *failure)?,

        BookingEventKind::TimeConfirmed { event_ref, slot } => {
            time_confirmed(current, &mut next, event, event_ref.as_deref(), slot.as_ref())?
        }

        BookingEventKind::SchedulingCanceled { event_ref, reason } => {
            check_event_ref(current, event_ref)?;
            match current.state {
                BookingState::Cancelled => {}
                state if state.is_terminal() => return Err(illegal(current, event)),
                _ => {
                    next.external_event_ref = Some(event_ref.clone());
                    next.cancellation_reason = reason
                        .clone()
                        .or_else(|| Some("canceled with scheduling provider".to_string()));
                    next.state = BookingState::Cancelled;
                }
            }
            Handled::Evaluated
        }

        BookingEventKind::ClientClaimed { client_id } => {
            match &current.client_id {
                Some(existing) if existing == client_id => {}
                Some(_) => return Err(TransitionError::ClientConflict),
                None if current.state.is_terminal() => return Err(illegal(current, event)),
                None => next.client_id = Some(client_id.clone()),
            }
            Handled::Evaluated
        }

        BookingEventKind::Cancelled { reason } => {
            match current.state {
                BookingState::Cancelled => {}
                state if state.is_terminal() => return Err(illegal(current, event)),
                _ => {
                    next.cancellation_reason = reason.clone();
                    next.state = BookingState::Cancelled;
                }
            }
            Handled::Evaluated
        }

        BookingEventKind::SessionCompleted => {
            match current.state {
                BookingState::Completed => {}
                BookingState::Confirmed => next.state = BookingState::Completed,
                _ => return Err(illegal(current, event)),
            }
            Handled::Evaluated
        }

        BookingEventKind::HoldExpired => {
            match current.state {
                BookingState::Expired => {}
                state if state.is_terminal() => return Err(illegal(current, event)),
                _ => next.state = BookingState::Expired,
            }
            Handled::Evaluated
        }

        BookingEventKind::Recover { target } => {
            recover(current, &mut next, event, *target)?;
            Handled::Evaluated
        }
    };

    if let Handled::Superseded = handled {
        return Ok(Transition {
            kind: TransitionKind::Superseded,
            previous_state: current.state,
            booking: current.clone(),
            effects: Vec::new(),
        });
    }

    let kind = if next.state != current.state {
        TransitionKind::Applied
    } else if next != *current {
        TransitionKind::Merged
    } else {
        TransitionKind::Duplicate
    };

    if kind == TransitionKind::Duplicate {
        return Ok(Transition {
            kind,
            previous_state: current.state,
            booking: current.clone(),
            effects: Vec::new(),
        });
    }

    next.updated_at = ctx.now;
    let effects = if kind == TransitionKind::Applied {
        effects_for(current.state, &next, &event.kind)
    } else {
        Vec::new()
    };

    Ok(Transition {
        kind,
        previous_state: current.state,
        booking: next,
        effects,
    })
}

fn illegal(current: &Booking, event: &BookingEvent) -> TransitionError {
    TransitionError::IllegalTransition {
        from: current.state,
        event: event.event_type(),
    }
}

/// Rejects a payment session that differs from the one already recorded.
fn check_session_ref(current: &Booking, session_ref: &str) -> Result<(), TransitionError> {
    match current.external_session_ref.as_deref() {
        Some(existing) if existing != session_ref => Err(TransitionError::ExternalRefConflict {
            kind: "payment_session",
            existing: existing.to_string(),
            received: session_ref.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Rejects a scheduling event that differs from the one already recorded.
fn check_event_ref(current: &Booking, event_ref: &str) -> Result<(), TransitionError> {
    match current.external_event_ref.as_deref() {
        Some(existing) if existing != event_ref => Err(TransitionError::ExternalRefConflict {
            kind: "scheduling_event",
            existing: existing.to_string(),
            received: event_ref.to_string(),
        }),
        _ => Ok(()),
    }
}

fn advance_payment(next: &mut Booking, status: PaymentStatus) {
    if next.payment_status.can_advance_to(status) {
        next.payment_status = status;
    }
}

fn checkout_started(
    current: &Booking,
    next: &mut Booking,
    event: &BookingEvent,
    session_ref: &str,
) -> Result<Handled, TransitionError> {
    if current.is_superseded_session(session_ref) {
        return Ok(Handled::Superseded);
    }

    match current.state {
        BookingState::TimeSelected => {
            check_session_ref(current, session_ref)?;
            next.external_session_ref = Some(session_ref.to_string());
            advance_payment(next, PaymentStatus::Pending);
            next.state = BookingState::PaymentPending;
        }
        // The checkout-started call lost the race against the provider's
        // outcome webhook; the booking already moved on.
        BookingState::PaymentPending | BookingState::Confirmed | BookingState::Error
            if current.external_session_ref.as_deref() == Some(session_ref) => {}
        BookingState::PaymentPending => check_session_ref(current, session_ref)?,
        _ => return Err(illegal(current, event)),
    }
    Ok(Handled::Evaluated)
}

fn payment_succeeded(
    current: &Booking,
    next: &mut Booking,
    event: &BookingEvent,
    session_ref: &str,
) -> Result<Handled, TransitionError> {
    if current.is_superseded_session(session_ref) {
        return Ok(Handled::Superseded);
    }

    match current.state {
        state if state.awaits_payment() => {
            check_session_ref(current, session_ref)?;
            if current.slot.is_none() {
                return Err(TransitionError::MissingSlot {
                    event: event.event_type(),
                });
            }
            next.external_session_ref = Some(session_ref.to_string());
            advance_payment(next, PaymentStatus::Paid);
            next.state = BookingState::Confirmed;
        }
        BookingState::Confirmed | BookingState::Completed
            if current.external_session_ref.as_deref() == Some(session_ref) => {}
        _ => return Err(illegal(current, event)),
    }
    Ok(Handled::Evaluated)
}

fn payment_failed(
    current: &Booking,
    next: &mut Booking,
    event: &BookingEvent,
    session_ref: &str,
    failure: PaymentFailure,
) -> Result<Handled, TransitionError> {
    if current.is_superseded_session(session_ref) {
        return Ok(Handled::Superseded);
    }

    match current.state {
        state if state.awaits_payment() => {
            check_session_ref(current, session_ref)?;
            // Slot and session type stay in place so recovery can resume
            next.external_session_ref = Some(session_ref.to_string());
            advance_payment(next, PaymentStatus::Failed);
            next.last_payment_failure = Some(failure);
            next.state = BookingState::Error;
        }
        BookingState::Error if current.external_session_ref.as_deref() == Some(session_ref) => {}
        _ => return Err(illegal(current, event)),
    }
    Ok(Handled::Evaluated)
}

fn time_confirmed(
    current: &Booking,
    next: &mut Booking,
    event: &BookingEvent,
    event_ref: Option<&str>,
    slot: Option<&TimeSlot>,
) -> Result<Handled, TransitionError> {
    if let Some(slot) = slot {
        slot.validate()?;
    }
    if let Some(event_ref) = event_ref {
        check_event_ref(current, event_ref)?;
    }

    // A bare confirmation is the client confirming a free session
    if event_ref.is_none() && slot.is_none() {
        match current.state {
            BookingState::Confirmed => {}
            BookingState::TimeSelected if current.can_confirm() => {
                next.state = BookingState::Confirmed;
            }
            _ => return Err(illegal(current, event)),
        }
        return Ok(Handled::Evaluated);
    }

    match current.state {
        BookingState::Confirmed | BookingState::Completed => {
            // Only correlation data may be merged after confirmation
            if let Some(slot) = slot
                && current.slot.as_ref() != Some(slot)
            {
                return Err(illegal(current, event));
            }
        }
        BookingState::Cancelled | BookingState::Expired => return Err(illegal(current, event)),
        _ => {
            if let Some(slot) = slot {
                next.slot = Some(slot.clone());
            }
        }
    }

    if let Some(event_ref) = event_ref
        && current.external_event_ref.is_none()
    {
        next.external_event_ref = Some(event_ref.to_string());
    }

    if matches!(
        current.state,
        BookingState::Idle | BookingState::SessionTypeSelected
    ) {
        if next.slot.is_none() {
            return Err(TransitionError::MissingSlot {
                event: event.event_type(),
            });
        }
        next.state = BookingState::TimeSelected;
    }

    if next.state == BookingState::TimeSelected && next.can_confirm() {
        next.state = BookingState::Confirmed;
    }

    Ok(Handled::Evaluated)
}

fn recover(
    current: &Booking,
    next: &mut Booking,
    event: &BookingEvent,
    target: BookingState,
) -> Result<(), TransitionError> {
    if !target.is_recovery_target() {
        return Err(TransitionError::InvalidRecoveryTarget(target));
    }
    if !current.state.is_recoverable() {
        return Err(illegal(current, event));
    }
    if target == BookingState::TimeSelected && current.slot.is_none() {
        return Err(TransitionError::MissingSlot {
            event: event.event_type(),
        });
    }

    // Administrative reset: the only place payment status moves backwards
    if matches!(
        current.payment_status,
        PaymentStatus::Pending | PaymentStatus::Failed
    ) {
        next.payment_status = PaymentStatus::Unpaid;
    }
    if let Some(session_ref) = next.external_session_ref.take() {
        next.superseded_session_refs.push(session_ref);
    }
    if target == BookingState::Cancelled {
        next.cancellation_reason = Some("cancelled during recovery".to_string());
    }
    next.state = target;
    Ok(())
}

fn effects_for(
    previous: BookingState,
    next: &Booking,
    kind: &BookingEventKind,
) -> Vec<SideEffect> {
    let mut effects = vec![SideEffect::state_changed(
        next.booking_id,
        previous,
        next.state,
        kind.event_type(),
    )];

    let notification = match (kind, next.state) {
        (BookingEventKind::Recover { .. }, _) => Some(NotificationKind::BookingRecovered),
        (_, BookingState::Confirmed) => Some(NotificationKind::BookingConfirmed),
        (_, BookingState::Cancelled) => Some(NotificationKind::BookingCancelled),
        (_, BookingState::Error) => Some(NotificationKind::PaymentFailed),
        (_, BookingState::Expired) => Some(NotificationKind::BookingExpired),
        (_, BookingState::Completed) => Some(NotificationKind::SessionCompleted),
        _ => None,
    };
    if let Some(kind) = notification {
        effects.push(SideEffect::notify(kind, next));
    }

    effects
}
