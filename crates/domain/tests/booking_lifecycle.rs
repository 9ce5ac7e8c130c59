//! Integration tests for the booking lifecycle.
//!
//! These tests drive bookings through the repository against the in-memory
//! store, covering persistence, concurrency, and rejection handling.

use booking_store::{InMemoryStore, RecordStore, StoreError, Version};
use chrono::{Duration, Utc};
use common::{BookingId, BuilderId, ExternalRef, SessionTypeId};
use domain::{
    Booking, BookingEvent, BookingEventKind, BookingRepository, BookingState, DomainError,
    EventOrigin, NewBooking, PaymentFailure, PaymentStatus, TimeSlot, TransitionContext,
    TransitionError, TransitionKind, transition,
};

fn create_repo() -> BookingRepository<InMemoryStore> {
    BookingRepository::new(InMemoryStore::new())
}

fn new_booking(payment_required: bool) -> Booking {
    Booking::new(
        NewBooking {
            booking_id: BookingId::new(),
            builder_id: BuilderId::new("b1"),
            session_type_id: SessionTypeId::new("s1"),
            client_id: None,
            payment_required,
        },
        Utc::now(),
    )
}

fn slot() -> TimeSlot {
    let start = Utc::now() + Duration::days(3);
    TimeSlot::new(start, start + Duration::minutes(45), "America/New_York").unwrap()
}

fn ctx() -> TransitionContext {
    TransitionContext::at(Utc::now())
}

async fn apply(
    repo: &BookingRepository<InMemoryStore>,
    booking_id: BookingId,
    origin: EventOrigin,
    kind: BookingEventKind,
) -> Result<domain::Transition, DomainError> {
    let event = BookingEvent::new(booking_id, origin, kind);
    repo.execute(booking_id, &event, &ctx()).await
}

async fn to_time_selected(repo: &BookingRepository<InMemoryStore>, booking_id: BookingId) {
    apply(
        repo,
        booking_id,
        EventOrigin::User,
        BookingEventKind::SessionTypeSelected {
            session_type_id: SessionTypeId::new("s1"),
        },
    )
    .await
    .unwrap();
    apply(
        repo,
        booking_id,
        EventOrigin::User,
        BookingEventKind::TimeSelected { slot: slot() },
    )
    .await
    .unwrap();
}

mod booking_lifecycle {
    use super::*;

    #[tokio::test]
    async fn paid_booking_lifecycle() {
        let repo = create_repo();
        let booking = repo.insert(&new_booking(true)).await.unwrap();
        let id = booking.booking_id();

        to_time_selected(&repo, id).await;

        let result = apply(
            &repo,
            id,
            EventOrigin::User,
            BookingEventKind::CheckoutStarted {
                session_ref: "cs_100".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(result.next_state(), BookingState::PaymentPending);

        let result = apply(
            &repo,
            id,
            EventOrigin::SchedulingProvider,
            BookingEventKind::TimeConfirmed {
                event_ref: Some("ev_100".to_string()),
                slot: Some(slot()),
            },
        )
        .await
        .unwrap();
        assert_eq!(result.kind, TransitionKind::Merged);

        let result = apply(
            &repo,
            id,
            EventOrigin::PaymentProvider,
            BookingEventKind::PaymentSucceeded {
                session_ref: "cs_100".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(result.next_state(), BookingState::Confirmed);

        let stored = repo.load_required(id).await.unwrap();
        assert_eq!(stored.state(), BookingState::Confirmed);
        assert_eq!(stored.payment_status(), PaymentStatus::Paid);
        assert!(stored.start_time().is_some());
        assert!(stored.end_time().is_some());
        assert_eq!(stored.client_timezone(), Some("America/New_York"));
        assert_eq!(stored.external_session_ref(), Some("cs_100"));
        assert_eq!(stored.external_event_ref(), Some("ev_100"));
        assert_eq!(stored.version(), Version::new(6));

        let result = apply(&repo, id, EventOrigin::System, BookingEventKind::SessionCompleted)
            .await
            .unwrap();
        assert_eq!(result.next_state(), BookingState::Completed);
    }

    #[tokio::test]
    async fn free_session_confirms_without_payment() {
        let repo = create_repo();
        let booking = repo.insert(&new_booking(false)).await.unwrap();
        let id = booking.booking_id();

        to_time_selected(&repo, id).await;
        let result = apply(
            &repo,
            id,
            EventOrigin::User,
            BookingEventKind::TimeConfirmed {
                event_ref: None,
                slot: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(result.next_state(), BookingState::Confirmed);
        assert_eq!(result.booking.payment_status(), PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn failed_payment_then_recovery_keeps_slot() {
        let repo = create_repo();
        let booking = repo.insert(&new_booking(true)).await.unwrap();
        let id = booking.booking_id();

        to_time_selected(&repo, id).await;
        apply(
            &repo,
            id,
            EventOrigin::User,
            BookingEventKind::CheckoutStarted {
                session_ref: "cs_1".to_string(),
            },
        )
        .await
        .unwrap();
        let result = apply(
            &repo,
            id,
            EventOrigin::PaymentProvider,
            BookingEventKind::PaymentFailed {
                session_ref: "cs_1".to_string(),
                failure: PaymentFailure::Failed,
                reason: Some("card_declined".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(result.next_state(), BookingState::Error);

        let result = apply(
            &repo,
            id,
            EventOrigin::Recovery,
            BookingEventKind::Recover {
                target: BookingState::TimeSelected,
            },
        )
        .await
        .unwrap();
        assert_eq!(result.next_state(), BookingState::TimeSelected);
        assert_eq!(result.booking.payment_status(), PaymentStatus::Unpaid);
        assert!(result.booking.slot().is_some());

        // The retired session still routes to this booking
        let found = repo
            .find_by_external_ref(&ExternalRef::PaymentSession("cs_1".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.booking_id(), id);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn concurrent_modifications_detected() {
        let repo = create_repo();
        let booking = repo.insert(&new_booking(true)).await.unwrap();
        let id = booking.booking_id();
        to_time_selected(&repo, id).await;

        // Two writers load the same version
        let loaded_a = repo.load_required(id).await.unwrap();
        let loaded_b = repo.load_required(id).await.unwrap();

        let pay = BookingEvent::new(
            id,
            EventOrigin::PaymentProvider,
            BookingEventKind::PaymentSucceeded {
                session_ref: "cs_1".to_string(),
            },
        );
        let cancel = BookingEvent::new(
            id,
            EventOrigin::User,
            BookingEventKind::Cancelled { reason: None },
        );

        let a = transition(&loaded_a, &pay, &ctx()).unwrap();
        let b = transition(&loaded_b, &cancel, &ctx()).unwrap();

        repo.save(&a.booking).await.unwrap();
        let err = repo.save(&b.booking).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Store(StoreError::ConcurrencyConflict { .. })
        ));

        // The loser retries against the updated record and is rejected
        let err = repo.execute(id, &cancel, &ctx()).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Transition(TransitionError::IllegalTransition {
                from: BookingState::Confirmed,
                ..
            })
        ));
        assert_eq!(
            repo.load_required(id).await.unwrap().state(),
            BookingState::Confirmed
        );
    }

    #[tokio::test]
    async fn external_refs_are_owned_by_one_booking() {
        let repo = create_repo();
        let first = repo.insert(&new_booking(true)).await.unwrap();
        let second = repo.insert(&new_booking(true)).await.unwrap();

        for booking in [&first, &second] {
            to_time_selected(&repo, booking.booking_id()).await;
        }

        apply(
            &repo,
            first.booking_id(),
            EventOrigin::User,
            BookingEventKind::CheckoutStarted {
                session_ref: "cs_shared".to_string(),
            },
        )
        .await
        .unwrap();

        let err = apply(
            &repo,
            second.booking_id(),
            EventOrigin::User,
            BookingEventKind::CheckoutStarted {
                session_ref: "cs_shared".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Store(StoreError::ExternalRefTaken { .. })
        ));

        let record = repo
            .store()
            .get(second.booking_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.state, "TIME_SELECTED");
    }
}

mod error_handling {
    use super::*;

    #[tokio::test]
    async fn duplicate_terminal_event_is_noop() {
        let repo = create_repo();
        let booking = repo.insert(&new_booking(true)).await.unwrap();
        let id = booking.booking_id();
        to_time_selected(&repo, id).await;

        let paid = BookingEventKind::PaymentSucceeded {
            session_ref: "cs_1".to_string(),
        };
        let first = apply(&repo, id, EventOrigin::PaymentProvider, paid.clone())
            .await
            .unwrap();
        let second = apply(&repo, id, EventOrigin::PaymentProvider, paid)
            .await
            .unwrap();

        assert_eq!(first.kind, TransitionKind::Applied);
        assert!(!first.effects.is_empty());
        assert_eq!(second.kind, TransitionKind::Duplicate);
        assert!(second.effects.is_empty());
        assert_eq!(second.booking.version(), first.booking.version());
    }

    #[tokio::test]
    async fn terminal_booking_rejects_resurrection() {
        let repo = create_repo();
        let booking = repo.insert(&new_booking(true)).await.unwrap();
        let id = booking.booking_id();
        apply(
            &repo,
            id,
            EventOrigin::User,
            BookingEventKind::Cancelled { reason: None },
        )
        .await
        .unwrap();

        let err = apply(
            &repo,
            id,
            EventOrigin::User,
            BookingEventKind::SessionTypeSelected {
                session_type_id: SessionTypeId::new("s1"),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Transition(TransitionError::IllegalTransition {
                from: BookingState::Cancelled,
                event: "session_type_selected"
            })
        ));
    }

    #[tokio::test]
    async fn unknown_booking_is_not_found() {
        let repo = create_repo();
        let id = BookingId::new();
        let err = apply(&repo, id, EventOrigin::System, BookingEventKind::HoldExpired)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(missing) if missing == id));
    }
}
