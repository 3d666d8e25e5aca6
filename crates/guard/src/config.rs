//! Engine configuration.

use std::time::Duration;

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long the response interceptor may wait for a settings read
    /// before it lets the response through unmodified.
    pub response_deadline: Duration,
    /// Maximum number of purge jobs running at once.
    pub max_concurrent_tasks: usize,
}

impl EngineConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for hosts with a tight response-modification window.
    pub fn strict() -> Self {
        Self {
            response_deadline: Duration::from_millis(10),
            ..Self::default()
        }
    }

    /// Set the interceptor deadline.
    pub fn with_response_deadline(mut self, deadline: Duration) -> Self {
        self.response_deadline = deadline;
        self
    }

    /// Set the purge concurrency limit. Zero is raised to one.
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max.max(1);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_deadline: Duration::from_millis(50),
            max_concurrent_tasks: 8,
        }
    }
}
