//! Configuration for the state sync runtime.
//!
//! # Example
//!
//! ```
//! use state_sync::{StateSyncConfig, ShrinkPolicy};
//!
//! // Minimal config (uses defaults)
//! let config = StateSyncConfig::default();
//! assert_eq!(config.max_depth, 16);
//! assert_eq!(config.shrink_policy, ShrinkPolicy::AfterScan);
//!
//! // Full config
//! let config = StateSyncConfig {
//!     config_dir: "/config".into(),
//!     channel_capacity: 16,
//!     slow_tick_ms: 500,
//!     ..Default::default()
//! };
//! assert_eq!(config.fast_tick_ms, 20);
//! ```

use serde::Deserialize;
use std::time::Duration;

use crate::diff::ShrinkPolicy;

/// Configuration for the state sync runtime.
///
/// All fields have sensible defaults, so an empty JSON object deserializes
/// into [`StateSyncConfig::default()`].
#[derive(Debug, Clone, Deserialize)]
pub struct StateSyncConfig {
    /// Maximum array nesting the diff engine tracks paths for (default: 16)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// When surplus array elements are dropped during a diff pass
    #[serde(default)]
    pub shrink_policy: ShrinkPolicy,

    /// Directory (or key prefix) holding one persisted document per entity
    #[serde(default = "default_config_dir")]
    pub config_dir: String,

    /// Buffered events per push channel before slow subscribers lag
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Pending jobs in the deferred work queue before submitters are refused
    #[serde(default = "default_work_queue_capacity")]
    pub work_queue_capacity: usize,

    /// Scheduler cadences
    #[serde(default = "default_fast_tick_ms")]
    pub fast_tick_ms: u64,
    #[serde(default = "default_medium_tick_ms")]
    pub medium_tick_ms: u64,
    #[serde(default = "default_slow_tick_ms")]
    pub slow_tick_ms: u64,

    /// Delay before the persistence writer flushes, coalescing bursts (0 = immediate)
    #[serde(default)]
    pub persist_debounce_ms: u64,
}

fn default_max_depth() -> usize { 16 }
fn default_config_dir() -> String { "config".to_string() }
fn default_channel_capacity() -> usize { 64 }
fn default_work_queue_capacity() -> usize { 32 }
fn default_fast_tick_ms() -> u64 { 20 }
fn default_medium_tick_ms() -> u64 { 50 }
fn default_slow_tick_ms() -> u64 { 1000 }

impl Default for StateSyncConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            shrink_policy: ShrinkPolicy::default(),
            config_dir: default_config_dir(),
            channel_capacity: default_channel_capacity(),
            work_queue_capacity: default_work_queue_capacity(),
            fast_tick_ms: default_fast_tick_ms(),
            medium_tick_ms: default_medium_tick_ms(),
            slow_tick_ms: default_slow_tick_ms(),
            persist_debounce_ms: 0,
        }
    }
}

impl StateSyncConfig {
    /// Parse a config from JSON, filling every missing field with its default.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Storage key of the persisted document for one entity.
    #[must_use]
    pub fn document_key(&self, entity: &str) -> String {
        let dir = self.config_dir.trim_end_matches('/');
        if dir.is_empty() {
            format!("{}.json", entity)
        } else {
            format!("{}/{}.json", dir, entity)
        }
    }

    #[must_use]
    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}
