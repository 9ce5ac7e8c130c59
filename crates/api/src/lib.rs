//! HTTP surface for the booking orchestrator.
//!
//! Binds the orchestrator entry points to REST routes and provider webhook
//! endpoints, with structured logging (tracing) and Prometheus metrics.

pub mod actor;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use booking_store::{RecordStore, TokenStore};
use chrono::Duration;
use ingest::{PaymentAdapter, SchedulingAdapter, SignatureVerifier};
use metrics_exporter_prometheus::PrometheusHandle;
use orchestrator::{BookingOrchestrator, OrchestratorConfig, TracingSink};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::{Config, StorageBackend};

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub orchestrator: BookingOrchestrator<S>,
    pub storage: StorageBackend,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: RecordStore + TokenStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health::<S>))
        .route("/bookings", post(routes::bookings::create::<S>))
        .route("/bookings/{id}", get(routes::bookings::get::<S>))
        .route(
            "/bookings/{id}/actions",
            post(routes::bookings::apply_action::<S>),
        )
        .route("/bookings/{id}/expire", post(routes::bookings::expire::<S>))
        .route(
            "/bookings/{id}/recovery-token",
            post(routes::bookings::issue_recovery_token::<S>),
        )
        .route("/recover", post(routes::bookings::recover::<S>))
        .route("/webhooks/payment", post(routes::webhooks::payment::<S>))
        .route(
            "/webhooks/scheduling",
            post(routes::webhooks::scheduling::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the orchestrator for a store from the loaded configuration.
pub fn build_orchestrator<S: RecordStore + TokenStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> BookingOrchestrator<S> {
    let tolerance = Duration::seconds(config.webhook_tolerance_secs);
    BookingOrchestrator::new(store)
        .with_payment_adapter(PaymentAdapter::new(SignatureVerifier::new(
            config.payment_webhook_secrets.clone(),
            tolerance,
        )))
        .with_scheduling_adapter(SchedulingAdapter::new(SignatureVerifier::new(
            config.scheduling_webhook_secrets.clone(),
            tolerance,
        )))
        .with_sink(Arc::new(TracingSink))
        .with_config(OrchestratorConfig {
            max_transition_retries: config.max_transition_retries,
            recovery_token_ttl: Duration::minutes(config.recovery_token_ttl_minutes),
        })
}

/// Creates the application state for a store.
pub fn create_state<S: RecordStore + TokenStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        orchestrator: build_orchestrator(store, config),
        storage: config.storage_backend,
    })
}
