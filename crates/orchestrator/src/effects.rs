//! Side-effect sinks and fire-and-forget dispatch.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use domain::SideEffect;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Notify;

/// A sink failed to accept an event.
#[derive(Debug, Clone, Error)]
#[error("Effect sink failed: {0}")]
pub struct SinkError(pub String);

/// Receives notification and analytics events after a commit.
#[async_trait]
pub trait EffectSink: Send + Sync {
    async fn emit(&self, event_name: &str, payload: Value) -> Result<(), SinkError>;
}

/// Writes every effect as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl EffectSink for TracingSink {
    async fn emit(&self, event_name: &str, payload: Value) -> Result<(), SinkError> {
        tracing::info!(target: "booking_effects", event_name, %payload, "side effect");
        Ok(())
    }
}

/// In-memory sink for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<(String, Value)>>>,
    notify: Arc<Notify>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event received so far.
    pub fn events(&self) -> Vec<(String, Value)> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the names of the events received so far.
    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|(name, _)| name).collect()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Waits until at least `count` events arrived, or the timeout passes.
    pub async fn wait_for_count(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |sink| sink.count() >= count).await
    }

    /// Waits until an event named `event_name` arrived, or the timeout passes.
    pub async fn wait_for_event(&self, event_name: &str, timeout: Duration) -> bool {
        self.wait_until(timeout, |sink| sink.names().iter().any(|n| n == event_name))
            .await
    }

    async fn wait_until(&self, timeout: Duration, done: impl Fn(&Self) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if done(self) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return done(self);
            }
        }
    }
}

#[async_trait]
impl EffectSink for RecordingSink {
    async fn emit(&self, event_name: &str, payload: Value) -> Result<(), SinkError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((event_name.to_string(), payload));
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Emits effects on a background task.
///
/// The caller never waits for the sink; failures are logged and counted,
/// never surfaced as transition failures.
pub fn dispatch(sink: Arc<dyn EffectSink>, effects: Vec<SideEffect>) {
    if effects.is_empty() {
        return;
    }
    tokio::spawn(async move {
        for effect in effects {
            let name = effect.event_name();
            if let Err(e) = sink.emit(&name, effect.payload()).await {
                metrics::counter!("side_effects_failed_total").increment(1);
                tracing::warn!(
                    booking_id = %effect.booking_id(),
                    event_name = %name,
                    error = %e,
                    "Side effect failed"
                );
            }
        }
    });
}
