use booking_store::InMemoryStore;
use chrono::{Duration, Utc};
use common::{BookingId, BuilderId, SessionTypeId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Booking, BookingEvent, BookingEventKind, BookingRepository, EventOrigin, NewBooking,
    TimeSlot, TransitionContext, transition,
};

fn new_booking() -> Booking {
    Booking::new(
        NewBooking {
            booking_id: BookingId::new(),
            builder_id: BuilderId::new("b1"),
            session_type_id: SessionTypeId::new("s1"),
            client_id: None,
            payment_required: true,
        },
        Utc::now(),
    )
}

fn lifecycle(booking_id: BookingId) -> Vec<BookingEvent> {
    let start = Utc::now() + Duration::days(1);
    let slot = TimeSlot::new(start, start + Duration::hours(1), "UTC").unwrap();
    [
        BookingEventKind::SessionTypeSelected {
            session_type_id: SessionTypeId::new("s1"),
        },
        BookingEventKind::TimeSelected { slot: slot.clone() },
        BookingEventKind::CheckoutStarted {
            session_ref: "cs_bench".to_string(),
        },
        BookingEventKind::TimeConfirmed {
            event_ref: Some("ev_bench".to_string()),
            slot: Some(slot),
        },
        BookingEventKind::PaymentSucceeded {
            session_ref: "cs_bench".to_string(),
        },
    ]
    .into_iter()
    .map(|kind| BookingEvent::new(booking_id, EventOrigin::User, kind))
    .collect()
}

fn bench_transition_lifecycle(c: &mut Criterion) {
    let booking = new_booking();
    let events = lifecycle(booking.booking_id());
    let ctx = TransitionContext::at(Utc::now());

    c.bench_function("domain/transition_full_lifecycle", |b| {
        b.iter(|| {
            let mut current = booking.clone();
            for event in &events {
                current = transition(&current, event, &ctx).unwrap().booking;
            }
            current
        });
    });
}

fn bench_duplicate_webhook(c: &mut Criterion) {
    let mut booking = new_booking();
    let events = lifecycle(booking.booking_id());
    let ctx = TransitionContext::at(Utc::now());
    for event in &events {
        booking = transition(&booking, event, &ctx).unwrap().booking;
    }
    let duplicate = events.last().unwrap().clone();

    c.bench_function("domain/transition_duplicate", |b| {
        b.iter(|| transition(&booking, &duplicate, &ctx).unwrap());
    });
}

fn bench_repository_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/repository_full_lifecycle", |b| {
        b.iter(|| {
            rt.block_on(async {
                let repo = BookingRepository::new(InMemoryStore::new());
                let booking = repo.insert(&new_booking()).await.unwrap();
                let ctx = TransitionContext::at(Utc::now());
                for event in lifecycle(booking.booking_id()) {
                    repo.execute(booking.booking_id(), &event, &ctx)
                        .await
                        .unwrap();
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_transition_lifecycle,
    bench_duplicate_webhook,
    bench_repository_cycle,
);
criterion_main!(benches);
