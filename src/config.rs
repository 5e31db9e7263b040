//! Orchestrator configuration.
//!
//! Values are supplied once at construction; there is no dynamic
//! reconfiguration. They can be built in code, loaded from `ORCH_*`
//! environment variables, or read from a TOML file.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `ORCH_QUEUE_CAPACITY` | 256 | Max queued work items |
//! | `ORCH_MAX_BATCH_SIZE` | 8 | Max items per batch |
//! | `ORCH_MAX_WORKERS` | CPU count | Worker ceiling |
//! | `ORCH_BACKLOG_FACTOR` | 2.0 | Queued items per worker before scaling up |
//! | `ORCH_STABILIZATION_MS` | 5000 | Minimum time between scale-ups |
//! | `ORCH_CONTROL_INTERVAL_MS` | 50 | Control loop tick |
//! | `ORCH_SCALE_DOWN_MS` | 0 | Drained time required before scale-down |
//! | `ORCH_DEPTH_HISTORY` | 32 | Queue depth samples kept for the policy |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::{AutoscaleConfig, BatchConfig};

/// Invalid or unreadable configuration. Construction fails on any of these.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("queue_capacity must be greater than 0")]
    QueueCapacity,
    #[error("max_batch_size must be greater than 0")]
    MaxBatchSize,
    #[error("max_workers must be at least 1")]
    MaxWorkers,
    #[error("backlog_threshold_factor must be a positive finite number (got {0})")]
    BacklogFactor(f64),
    #[error("control_interval must be greater than 0")]
    ControlInterval,
    #[error("depth_history_len must be greater than 0")]
    DepthHistory,
    #[error("failed to read config file {path}: {message}")]
    Io { path: PathBuf, message: String },
    #[error("invalid config file: {0}")]
    Parse(String),
}

/// Complete orchestrator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub queue_capacity: usize,
    pub max_batch_size: usize,
    pub max_workers: usize,
    pub backlog_threshold_factor: f64,
    pub stabilization_window: Duration,
    pub control_interval: Duration,
    pub scale_down_window: Duration,
    pub depth_history_len: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_batch_size: 8,
            max_workers: num_cpus::get().max(1),
            backlog_threshold_factor: 2.0,
            stabilization_window: Duration::from_millis(5000),
            control_interval: Duration::from_millis(50),
            scale_down_window: Duration::ZERO,
            depth_history_len: 32,
        }
    }
}

impl OrchestratorConfig {
    /// Check every invariant, reporting the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::QueueCapacity);
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::MaxBatchSize);
        }
        if self.max_workers < 1 {
            return Err(ConfigError::MaxWorkers);
        }
        let factor = self.backlog_threshold_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(ConfigError::BacklogFactor(factor));
        }
        if self.control_interval.is_zero() {
            return Err(ConfigError::ControlInterval);
        }
        if self.depth_history_len == 0 {
            return Err(ConfigError::DepthHistory);
        }
        Ok(())
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig { max_batch_size: self.max_batch_size }
    }

    pub fn autoscale_config(&self) -> AutoscaleConfig {
        AutoscaleConfig {
            backlog_threshold_factor: self.backlog_threshold_factor,
            stabilization_window: self.stabilization_window,
            scale_down_window: self.scale_down_window,
        }
    }

    /// Serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            queue_capacity: self.queue_capacity,
            max_batch_size: self.max_batch_size,
            max_workers: self.max_workers,
            backlog_threshold_factor: self.backlog_threshold_factor,
            stabilization_window_ms: duration_ms(self.stabilization_window),
            control_interval_ms: duration_ms(self.control_interval),
            scale_down_window_ms: duration_ms(self.scale_down_window),
            depth_history_len: self.depth_history_len,
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

/// Effective configuration summary (serializable). Also the TOML file shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EffectiveConfig {
    pub queue_capacity: usize,
    pub max_batch_size: usize,
    pub max_workers: usize,
    pub backlog_threshold_factor: f64,
    pub stabilization_window_ms: u64,
    pub control_interval_ms: u64,
    pub scale_down_window_ms: u64,
    pub depth_history_len: usize,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        OrchestratorConfig::default().effective_config()
    }
}

impl From<EffectiveConfig> for OrchestratorConfig {
    fn from(c: EffectiveConfig) -> Self {
        Self {
            queue_capacity: c.queue_capacity,
            max_batch_size: c.max_batch_size,
            max_workers: c.max_workers,
            backlog_threshold_factor: c.backlog_threshold_factor,
            stabilization_window: Duration::from_millis(c.stabilization_window_ms),
            control_interval: Duration::from_millis(c.control_interval_ms),
            scale_down_window: Duration::from_millis(c.scale_down_window_ms),
            depth_history_len: c.depth_history_len,
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a positive finite `f64` env var, returning `default` otherwise.
fn parse_positive_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|val| val.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(default)
}

/// Load configuration from environment variables.
///
/// Missing or invalid values fall back to defaults without panicking;
/// values that must be positive are floored at 1.
pub fn load() -> OrchestratorConfig {
    let d = OrchestratorConfig::default();
    let queue_capacity = parse_usize("ORCH_QUEUE_CAPACITY", d.queue_capacity).max(1);
    let max_batch_size = parse_usize("ORCH_MAX_BATCH_SIZE", d.max_batch_size).max(1);
    let max_workers = parse_usize("ORCH_MAX_WORKERS", d.max_workers).max(1);
    let backlog_threshold_factor = parse_positive_f64("ORCH_BACKLOG_FACTOR", d.backlog_threshold_factor);
    let stabilization_ms = parse_u64("ORCH_STABILIZATION_MS", duration_ms(d.stabilization_window));
    let control_ms = parse_u64("ORCH_CONTROL_INTERVAL_MS", duration_ms(d.control_interval)).max(1);
    let scale_down_ms = parse_u64("ORCH_SCALE_DOWN_MS", duration_ms(d.scale_down_window));
    let depth_history_len = parse_usize("ORCH_DEPTH_HISTORY", d.depth_history_len).max(1);

    OrchestratorConfig {
        queue_capacity,
        max_batch_size,
        max_workers,
        backlog_threshold_factor,
        stabilization_window: Duration::from_millis(stabilization_ms),
        control_interval: Duration::from_millis(control_ms),
        scale_down_window: Duration::from_millis(scale_down_ms),
        depth_history_len,
    }
}

/// Parse TOML text. Missing keys take defaults; the result is validated.
pub fn from_toml_str(text: &str) -> Result<OrchestratorConfig, ConfigError> {
    let file: EffectiveConfig =
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let config = OrchestratorConfig::from(file);
    config.validate()?;
    Ok(config)
}

/// Load and validate a TOML config file.
pub fn load_file(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    from_toml_str(&text)
}
