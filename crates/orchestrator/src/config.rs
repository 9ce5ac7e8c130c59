//! Orchestrator tunables.

use chrono::Duration;

/// Configuration for the booking orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How many times a transition is retried after losing a
    /// compare-and-swap race before `concurrency_conflict` is returned.
    pub max_transition_retries: u32,

    /// Lifetime of a recovery token.
    pub recovery_token_ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_transition_retries: 5,
            recovery_token_ttl: Duration::minutes(15),
        }
    }
}
