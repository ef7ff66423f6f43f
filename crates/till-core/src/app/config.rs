//! QueueConfig - キューの設定
//!
//! 全フィールドに既定値があるので `{}` も有効な設定。
//!
//! ```json
//! {
//!   "start_mode": "CONFIRMATION",
//!   "persistence": "ON_BACKGROUND",
//!   "confirm_timeout_ms": 30000,
//!   "error_decision_timeout_ms": null,
//!   "timeout_policy": { "on_confirm_timeout": "SKIP", "on_error_timeout": "ABORT_ALL" }
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{PersistenceStrategy, ProcessorStartMode, QueueTimeoutPolicy};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub start_mode: ProcessorStartMode,
    pub persistence: PersistenceStrategy,
    /// How long a `ConfirmNextProcessor` request waits. `None` waits forever.
    pub confirm_timeout_ms: Option<u64>,
    /// How long an `ErrorRetryOrSkip` request waits. `None` waits forever.
    pub error_decision_timeout_ms: Option<u64>,
    pub timeout_policy: QueueTimeoutPolicy,
    /// How long an interrupted `process` call may take to wind down before its
    /// task is aborted.
    pub abort_grace_ms: u64,
    /// Capacity of the broadcast channels (transitions, queue input requests).
    pub channel_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            start_mode: ProcessorStartMode::Immediate,
            persistence: PersistenceStrategy::Immediate,
            confirm_timeout_ms: None,
            error_decision_timeout_ms: None,
            timeout_policy: QueueTimeoutPolicy::default(),
            abort_grace_ms: 2_000,
            channel_capacity: 64,
        }
    }
}

impl QueueConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity must be > 0".into()));
        }
        Ok(())
    }

    pub fn with_start_mode(mut self, start_mode: ProcessorStartMode) -> Self {
        self.start_mode = start_mode;
        self
    }

    pub fn with_persistence(mut self, persistence: PersistenceStrategy) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_confirm_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirm_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_error_decision_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.error_decision_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_timeout_policy(mut self, policy: QueueTimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    pub fn confirm_timeout(&self) -> Option<Duration> {
        self.confirm_timeout_ms.map(Duration::from_millis)
    }

    pub fn error_decision_timeout(&self) -> Option<Duration> {
        self.error_decision_timeout_ms.map(Duration::from_millis)
    }

    pub fn abort_grace(&self) -> Duration {
        Duration::from_millis(self.abort_grace_ms)
    }
}
