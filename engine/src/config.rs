//! Engine tuning knobs.
//!
//! Settings storage belongs to the host application; the engine only consumes
//! an [`EngineConfig`], which can be deserialized from the host's JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::gate::TaskControl;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Files at or above this many bytes go to the sequential lane
    pub parallel_threshold: u64,

    /// Read/write block size for streamed copies, in bytes
    pub block_size: usize,

    /// Worker count for the small-file lane
    pub small_lane_parallelism: usize,

    /// Worker count for deletion sweeps
    pub delete_parallelism: usize,

    /// Worker count for the size accumulator
    pub size_parallelism: usize,

    /// Idle delay between polls while a task is paused. Applied to the
    /// controls built by [`EngineConfig::task_control`] or
    /// [`crate::gate::ControlHub::register`]; a `TaskControl` built by hand keeps its own.
    pub pause_poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        EngineConfig {
            parallel_threshold: 20_000_000,
            block_size: 128 * 1024,
            small_lane_parallelism: cpus,
            delete_parallelism: cpus,
            size_parallelism: cpus,
            pause_poll_interval_ms: 100,
        }
    }
}

impl EngineConfig {
    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_interval_ms)
    }

    /// Fresh pause/cancel controls for one task, polling at this config's
    /// interval.
    pub fn task_control(&self) -> TaskControl {
        TaskControl::default().with_poll_interval(self.pause_poll_interval())
    }

    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| EngineError::InvalidConfig {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| EngineError::from_io(path, e))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let zero_field = if self.block_size == 0 {
            Some("block_size")
        } else if self.small_lane_parallelism == 0 {
            Some("small_lane_parallelism")
        } else if self.delete_parallelism == 0 {
            Some("delete_parallelism")
        } else if self.size_parallelism == 0 {
            Some("size_parallelism")
        } else {
            None
        };

        match zero_field {
            Some(field) => Err(EngineError::InvalidConfig {
                reason: format!("{} must be greater than zero", field),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "parallel_threshold": 10000000 }"#)
            .expect("config should parse");
        assert_eq!(config.parallel_threshold, 10_000_000);
        assert_eq!(config.block_size, EngineConfig::default().block_size);
    }

    #[test]
    fn test_zero_block_size_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "block_size": 0 }"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(err.to_string().contains("block_size"));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = EngineConfig::from_json_str("{ nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "pause_poll_interval_ms": 5 }"#).expect("Failed to write config");

        let config = EngineConfig::load(&path).expect("config should load");
        assert_eq!(config.pause_poll_interval(), Duration::from_millis(5));
    }

    #[test]
    fn test_task_control_uses_configured_poll_interval() {
        let config = EngineConfig::from_json_str(r#"{ "pause_poll_interval_ms": 7 }"#)
            .expect("config should parse");
        assert_eq!(config.task_control().poll_interval(), Duration::from_millis(7));

        let hub = crate::gate::ControlHub::new();
        let control = hub.register(config.pause_poll_interval());
        assert_eq!(control.poll_interval(), Duration::from_millis(7));
    }
}
