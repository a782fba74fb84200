use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Orchestrator-wide settings. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on attempts executing at the same time.
    pub max_workers: usize,
    /// How long `shutdown(wait = true)` waits for running attempts.
    pub shutdown_grace_period: Duration,
    /// Listen for SIGINT/SIGTERM while `start(blocking = true)` runs.
    pub handle_signals: bool,
    /// Capacity of the event broadcast channel returned by `subscribe`.
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            shutdown_grace_period: Duration::from_secs(30),
            handle_signals: true,
            event_buffer: 1024,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_workers == 0 {
            return Err(ValidationError::InvalidPolicy(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ValidationError::InvalidPolicy(
                "event_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
