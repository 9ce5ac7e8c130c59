//! Booking orchestrator.

use std::sync::Arc;
use std::time::Instant;

use booking_store::{ConsumeOutcome, RecordStore, StoreError, TokenStore};
use chrono::{DateTime, Duration, Utc};
use common::{BookingId, BuilderId, ClientId, SessionTypeId};
use domain::{
    Booking, BookingEvent, BookingEventKind, BookingRepository, BookingState, Clock, EventOrigin,
    IssuedToken, NewBooking, NotificationKind, RecoveryToken, SideEffect, SystemClock, Transition,
    TransitionContext, TransitionError, TransitionKind, hash_token, transition,
};
use ingest::{
    BookingAction, InboundEvent, PaymentAdapter, SchedulingAdapter, SignatureVerifier,
    WebhookAdapter, WebhookSource,
};
use serde::{Deserialize, Serialize};

use crate::auth::{Action, Actor, Authorizer, OwnershipPolicy};
use crate::config::OrchestratorConfig;
use crate::effects::{EffectSink, TracingSink, dispatch};
use crate::error::{BookingError, ErrorKind, Result};

/// Input for `create_booking`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBooking {
    pub builder_id: BuilderId,
    pub session_type_id: SessionTypeId,
    #[serde(default)]
    pub client_id: Option<ClientId>,

    /// Client-generated ID, making retries of the create call idempotent.
    #[serde(default)]
    pub booking_id: Option<BookingId>,

    #[serde(default = "default_payment_required")]
    pub payment_required: bool,
}

fn default_payment_required() -> bool {
    true
}

impl CreateBooking {
    pub fn new(builder_id: impl Into<String>, session_type_id: impl Into<String>) -> Self {
        Self {
            builder_id: BuilderId::new(builder_id),
            session_type_id: SessionTypeId::new(session_type_id),
            client_id: None,
            booking_id: None,
            payment_required: true,
        }
    }

    pub fn with_booking_id(mut self, booking_id: BookingId) -> Self {
        self.booking_id = Some(booking_id);
        self
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(ClientId::new(client_id));
        self
    }

    pub fn free(mut self) -> Self {
        self.payment_required = false;
        self
    }
}

/// Result of `create_booking`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedBooking {
    pub booking_id: BookingId,
    pub state: BookingState,

    /// False when an existing booking was returned.
    pub created: bool,
}

/// Result of routing one event through the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub booking_id: BookingId,
    pub previous_state: BookingState,
    pub current_state: BookingState,
    pub outcome: TransitionKind,
}

impl TransitionOutcome {
    fn from_transition(transition: &Transition) -> Self {
        Self {
            booking_id: transition.booking.booking_id(),
            previous_state: transition.previous_state,
            current_state: transition.next_state(),
            outcome: transition.kind,
        }
    }
}

/// Caller-facing result of a recovery attempt.
///
/// Failures carry no detail; the classified error is only logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<BookingId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<BookingState>,
}

impl RecoveryResult {
    pub fn failed() -> Self {
        Self {
            success: false,
            booking_id: None,
            state: None,
        }
    }
}

impl From<&Result<TransitionOutcome>> for RecoveryResult {
    fn from(result: &Result<TransitionOutcome>) -> Self {
        match result {
            Ok(outcome) => Self {
                success: true,
                booking_id: Some(outcome.booking_id),
                state: Some(outcome.current_state),
            },
            Err(_) => Self::failed(),
        }
    }
}

/// The transactional boundary for every booking entry point.
///
/// Each call resolves the booking, runs the transition function, and
/// persists the result with a compare-and-swap on the record version.
/// Losing writers retry the whole cycle. Side effects are dispatched only
/// after the commit and are never awaited.
pub struct BookingOrchestrator<S> {
    repository: BookingRepository<S>,
    store: S,
    payment: PaymentAdapter,
    scheduling: SchedulingAdapter,
    authorizer: Arc<dyn Authorizer>,
    sink: Arc<dyn EffectSink>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
}

impl<S> BookingOrchestrator<S>
where
    S: RecordStore + TokenStore + Clone + 'static,
{
    /// Creates an orchestrator with default collaborators.
    ///
    /// No webhook keys are configured, so every webhook is rejected until
    /// adapters are supplied.
    pub fn new(store: S) -> Self {
        let no_keys = || SignatureVerifier::new(Vec::<String>::new(), Duration::minutes(5));
        Self {
            repository: BookingRepository::new(store.clone()),
            store,
            payment: PaymentAdapter::new(no_keys()),
            scheduling: SchedulingAdapter::new(no_keys()),
            authorizer: Arc::new(OwnershipPolicy),
            sink: Arc::new(TracingSink),
            clock: Arc::new(SystemClock),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_payment_adapter(mut self, adapter: PaymentAdapter) -> Self {
        self.payment = adapter;
        self
    }

    pub fn with_scheduling_adapter(mut self, adapter: SchedulingAdapter) -> Self {
        self.scheduling = adapter;
        self
    }

    pub fn with_authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Arc::new(authorizer);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EffectSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a booking in `Idle`.
    ///
    /// If `booking_id` is supplied and already exists, the existing booking
    /// is returned unchanged.
    #[tracing::instrument(skip(self, actor), fields(booking_id = ?input.booking_id))]
    pub async fn create_booking(
        &self,
        actor: &Actor,
        input: CreateBooking,
    ) -> Result<CreatedBooking> {
        self.authorize(actor, Action::Create, None)?;

        if input.builder_id.as_str().trim().is_empty() {
            return Err(BookingError::Validation("builder_id is required".to_string()));
        }
        if input.session_type_id.as_str().trim().is_empty() {
            return Err(BookingError::Validation(
                "session_type_id is required".to_string(),
            ));
        }

        if let Some(booking_id) = input.booking_id
            && let Some(existing) = self.repository.load(booking_id).await?
        {
            return self.existing(actor, &existing);
        }

        let booking = Booking::new(
            NewBooking {
                booking_id: input.booking_id.unwrap_or_default(),
                builder_id: input.builder_id,
                session_type_id: input.session_type_id,
                client_id: input.client_id.or_else(|| actor.client_id()),
                payment_required: input.payment_required,
            },
            self.clock.now(),
        );

        let stored = match self.repository.insert(&booking).await {
            Ok(stored) => stored,
            // A concurrent retry of the same create won the insert
            Err(domain::DomainError::Store(StoreError::AlreadyExists(id))) => {
                let existing = self
                    .repository
                    .load(id)
                    .await?
                    .ok_or(BookingError::BookingNotFound(id))?;
                return self.existing(actor, &existing);
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(booking_id = %stored.booking_id(), "Booking created");
        dispatch(self.sink.clone(), SideEffect::for_created(&stored));

        Ok(CreatedBooking {
            booking_id: stored.booking_id(),
            state: stored.state(),
            created: true,
        })
    }

    fn existing(&self, actor: &Actor, existing: &Booking) -> Result<CreatedBooking> {
        self.authorize(actor, Action::Read, Some(existing))?;
        tracing::debug!(booking_id = %existing.booking_id(), "Create replayed for existing booking");
        Ok(CreatedBooking {
            booking_id: existing.booking_id(),
            state: existing.state(),
            created: false,
        })
    }

    /// Reads a booking.
    #[tracing::instrument(skip(self, actor))]
    pub async fn get_booking(&self, actor: &Actor, booking_id: BookingId) -> Result<Booking> {
        let booking = self.repository.load_required(booking_id).await?;
        self.authorize(actor, Action::Read, Some(&booking))?;
        Ok(booking)
    }

    /// Applies a user action to a booking.
    #[tracing::instrument(skip(self, actor, action), fields(action = action.name()))]
    pub async fn apply_action(
        &self,
        actor: &Actor,
        booking_id: BookingId,
        action: BookingAction,
    ) -> Result<TransitionOutcome> {
        let required = match &action {
            BookingAction::Claim => Action::Claim,
            BookingAction::Cancel { .. } => Action::Cancel,
            BookingAction::Complete => Action::Complete,
            _ => Action::Update,
        };
        let event = action.into_event(booking_id, actor.client_id())?;
        let transition = self
            .apply_with_retry(booking_id, &event, Some((actor, required)))
            .await?;
        Ok(TransitionOutcome::from_transition(&transition))
    }

    /// Moves a booking whose hold lapsed to `Expired`.
    #[tracing::instrument(skip(self, actor))]
    pub async fn expire_booking(
        &self,
        actor: &Actor,
        booking_id: BookingId,
    ) -> Result<TransitionOutcome> {
        let event = BookingEvent::new(booking_id, EventOrigin::System, BookingEventKind::HoldExpired);
        let transition = self
            .apply_with_retry(booking_id, &event, Some((actor, Action::Expire)))
            .await?;
        Ok(TransitionOutcome::from_transition(&transition))
    }

    /// Verifies, translates, and applies a provider webhook.
    ///
    /// Returns `Ok(None)` when nothing was attempted: the event type does not
    /// affect bookings, or no booking matches the event.
    #[tracing::instrument(skip(self, signature_header, body), fields(source = %source))]
    pub async fn handle_webhook(
        &self,
        source: WebhookSource,
        signature_header: Option<&str>,
        body: &[u8],
    ) -> Result<Option<TransitionOutcome>> {
        let adapter: &dyn WebhookAdapter = match source {
            WebhookSource::Payment => &self.payment,
            WebhookSource::Scheduling => &self.scheduling,
        };

        let inbound = match adapter.ingest(signature_header, body, self.clock.now()) {
            Ok(Some(inbound)) => inbound,
            Ok(None) => {
                record_webhook(source, "ignored");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Webhook rejected");
                record_webhook(source, "rejected");
                return Err(e.into());
            }
        };

        let Some(booking_id) = self.resolve(&inbound).await? else {
            tracing::info!(
                reference = %inbound.reference,
                event_type = %inbound.provider_event_type,
                "No booking matches webhook"
            );
            record_webhook(source, "unknown_booking");
            return Ok(None);
        };

        let event = inbound.into_event(booking_id);
        let result = self.apply_with_retry(booking_id, &event, None).await;

        if let BookingEventKind::PaymentSucceeded { session_ref } = &event.kind
            && is_orphaned(&result)
        {
            self.flag_orphaned_payment(booking_id, session_ref).await;
        }

        match result {
            Ok(transition) => {
                record_webhook(source, transition.kind.as_str());
                Ok(Some(TransitionOutcome::from_transition(&transition)))
            }
            Err(e) => {
                record_webhook(source, e.kind().as_str());
                Err(e)
            }
        }
    }

    /// Money was taken for a session the booking will not honor, either
    /// because a newer session replaced it or because the booking moved on.
    async fn flag_orphaned_payment(&self, booking_id: BookingId, session_ref: &str) {
        metrics::counter!("orphaned_payments_total").increment(1);
        let booking = match self.repository.load(booking_id).await {
            Ok(Some(booking)) => booking,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(
                    %booking_id,
                    session_ref,
                    error = %e,
                    "Orphaned payment could not be reported"
                );
                return;
            }
        };
        tracing::warn!(
            %booking_id,
            session_ref,
            state = %booking.state(),
            "Payment succeeded for a session the booking no longer accepts"
        );
        dispatch(
            self.sink.clone(),
            vec![SideEffect::notify(NotificationKind::OrphanedPayment, &booking)],
        );
    }

    async fn resolve(&self, inbound: &InboundEvent) -> Result<Option<BookingId>> {
        if let Some(booking) = self
            .repository
            .find_by_external_ref(&inbound.reference)
            .await?
        {
            return Ok(Some(booking.booking_id()));
        }
        if let Some(echoed) = inbound.echoed_booking_id
            && self.repository.load(echoed).await?.is_some()
        {
            return Ok(Some(echoed));
        }
        Ok(None)
    }

    /// Issues a single-use recovery token for a stalled booking.
    #[tracing::instrument(skip(self, actor))]
    pub async fn issue_recovery_token(
        &self,
        actor: &Actor,
        booking_id: BookingId,
        target_state: Option<BookingState>,
    ) -> Result<IssuedToken> {
        let booking = self.repository.load_required(booking_id).await?;
        self.authorize(actor, Action::IssueRecoveryToken, Some(&booking))?;

        if let Some(target) = target_state
            && !target.is_recovery_target()
        {
            return Err(TransitionError::InvalidRecoveryTarget(target).into());
        }
        if !booking.state().is_recoverable() {
            return Err(TransitionError::IllegalTransition {
                from: booking.state(),
                event: "recover",
            }
            .into());
        }

        let (grant, issued) = RecoveryToken::issue(
            booking_id,
            target_state,
            self.clock.now(),
            self.config.recovery_token_ttl,
        );
        self.store.insert_token(grant.to_stored()).await?;

        metrics::counter!("recovery_tokens_issued_total").increment(1);
        tracing::info!(expires_at = %issued.expires_at, "Recovery token issued");
        Ok(issued)
    }

    /// Redeems a recovery token, forcing the booking into the target state.
    ///
    /// The token is only consumed once the transition is known to be legal;
    /// an invalid, expired, or used token never changes the booking. If the
    /// transition still fails after consumption the token is released again.
    #[tracing::instrument(skip(self, token))]
    pub async fn recover_booking_with_token(
        &self,
        token: &str,
        target_state: Option<BookingState>,
    ) -> Result<TransitionOutcome> {
        let result = self.redeem(token, target_state).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind().as_str(),
        };
        metrics::counter!("recovery_redemptions_total", "outcome" => outcome).increment(1);
        if let Err(e) = &result {
            tracing::info!(error = %e, kind = %e.kind(), "Recovery redemption failed");
        }
        result
    }

    async fn redeem(
        &self,
        token: &str,
        requested: Option<BookingState>,
    ) -> Result<TransitionOutcome> {
        if token.trim().is_empty() {
            return Err(BookingError::Validation("token is required".to_string()));
        }
        let token_hash = hash_token(token.trim());

        let stored = self
            .store
            .get_token(&token_hash)
            .await?
            .ok_or(BookingError::TokenNotFound)?;
        let grant = RecoveryToken::from_stored(stored).map_err(domain::DomainError::from)?;

        let now = self.clock.now();
        if grant.is_used() {
            return Err(BookingError::TokenAlreadyUsed);
        }
        if grant.is_expired_at(now) {
            return Err(BookingError::TokenExpired);
        }

        let target = match (grant.target_state, requested) {
            (Some(granted), Some(requested)) if granted != requested => {
                return Err(BookingError::Validation(format!(
                    "token grants recovery to {granted}, not {requested}"
                )));
            }
            (Some(granted), _) => granted,
            (None, Some(requested)) => requested,
            (None, None) => BookingState::Idle,
        };

        let event = BookingEvent::new(
            grant.booking_id,
            EventOrigin::Recovery,
            BookingEventKind::Recover { target },
        );

        // Dry run so an illegal recovery fails before the token is spent
        let booking = self.repository.load_required(grant.booking_id).await?;
        transition(&booking, &event, &TransitionContext::at(now))?;

        let used_at = match self.store.consume_token(&token_hash, now).await? {
            // The stored timestamp may be truncated by the backend
            ConsumeOutcome::Consumed(consumed) => consumed.used_at.unwrap_or(now),
            ConsumeOutcome::AlreadyUsed => return Err(BookingError::TokenAlreadyUsed),
            ConsumeOutcome::NotFound => return Err(BookingError::TokenNotFound),
        };

        match self.apply_with_retry(grant.booking_id, &event, None).await {
            Ok(transition) => Ok(TransitionOutcome::from_transition(&transition)),
            Err(e) => {
                self.release_spent_token(grant.booking_id, &token_hash, used_at).await;
                Err(e)
            }
        }
    }

    /// Hands a consumed token back after its transition failed, so the
    /// booking is not left stranded with a spent token.
    async fn release_spent_token(
        &self,
        booking_id: BookingId,
        token_hash: &str,
        used_at: DateTime<Utc>,
    ) {
        match self.store.release_token(token_hash, used_at).await {
            Ok(true) => {
                metrics::counter!("recovery_tokens_released_total").increment(1);
                tracing::warn!(%booking_id, "Recovery transition failed, token released");
            }
            Ok(false) => {
                tracing::warn!(%booking_id, "Recovery transition failed, token was not released");
            }
            Err(e) => {
                tracing::error!(
                    %booking_id,
                    error = %e,
                    "Recovery transition failed and token release errored"
                );
            }
        }
    }

    /// Runs the load-transition-persist cycle, retrying on lost races.
    ///
    /// When `auth` is given the actor is checked against the freshly loaded
    /// booking on every attempt.
    async fn apply_with_retry(
        &self,
        booking_id: BookingId,
        event: &BookingEvent,
        auth: Option<(&Actor, Action)>,
    ) -> Result<Transition> {
        let started = Instant::now();
        let max_attempts = self.config.max_transition_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.attempt(booking_id, event, auth).await {
                Ok(transition) => {
                    metrics::histogram!("booking_transition_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    self.record(&transition, event, attempt);
                    dispatch(self.sink.clone(), transition.effects.clone());
                    return Ok(transition);
                }
                Err(BookingError::ConcurrencyConflict { .. }) => {
                    metrics::counter!("booking_transition_conflicts_total").increment(1);
                    if attempt >= max_attempts {
                        tracing::warn!(
                            %booking_id,
                            attempt,
                            event = event.event_type(),
                            "Giving up after repeated concurrency conflicts"
                        );
                        return Err(BookingError::ConcurrencyConflict {
                            booking_id,
                            attempts: attempt,
                        });
                    }
                    tracing::debug!(%booking_id, attempt, "Concurrency conflict, retrying");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        booking_id: BookingId,
        event: &BookingEvent,
        auth: Option<(&Actor, Action)>,
    ) -> Result<Transition> {
        let current = self.repository.load_required(booking_id).await?;
        if let Some((actor, action)) = auth {
            self.authorize(actor, action, Some(&current))?;
        }

        let ctx = TransitionContext::at(self.clock.now());
        let mut result = transition(&current, event, &ctx)?;
        self.repository.persist(&mut result).await?;
        Ok(result)
    }

    fn record(&self, transition: &Transition, event: &BookingEvent, attempt: u32) {
        match transition.kind {
            TransitionKind::Applied => {
                metrics::counter!(
                    "booking_transitions_total",
                    "from" => transition.previous_state.as_str(),
                    "to" => transition.next_state().as_str()
                )
                .increment(1);
                tracing::info!(
                    booking_id = %transition.booking.booking_id(),
                    from = %transition.previous_state,
                    to = %transition.next_state(),
                    event = event.event_type(),
                    attempt,
                    "Booking transitioned"
                );
            }
            TransitionKind::Merged => {
                tracing::info!(
                    booking_id = %transition.booking.booking_id(),
                    state = %transition.next_state(),
                    event = event.event_type(),
                    "Booking data merged"
                );
            }
            TransitionKind::Duplicate | TransitionKind::Superseded => {
                metrics::counter!("booking_transition_duplicates_total").increment(1);
                tracing::debug!(
                    booking_id = %transition.booking.booking_id(),
                    state = %transition.next_state(),
                    event = event.event_type(),
                    outcome = transition.kind.as_str(),
                    "Event had no effect"
                );
            }
        }
    }

    fn authorize(&self, actor: &Actor, action: Action, booking: Option<&Booking>) -> Result<()> {
        if self.authorizer.authorize(actor, action, booking) {
            return Ok(());
        }
        tracing::info!(
            user_id = ?actor.user_id,
            action = action.as_str(),
            "Authorization denied"
        );
        Err(BookingError::Forbidden {
            action: action.as_str(),
            booking_id: booking.map(Booking::booking_id),
        })
    }
}

/// A successful payment that neither advanced nor matched the booking.
fn is_orphaned(result: &Result<Transition>) -> bool {
    match result {
        Ok(transition) => transition.kind == TransitionKind::Superseded,
        Err(e) => e.kind() == ErrorKind::IllegalTransition,
    }
}

fn record_webhook(source: WebhookSource, outcome: &'static str) {
    metrics::counter!(
        "webhooks_received_total",
        "source" => source.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
