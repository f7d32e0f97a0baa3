use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Timeouts and limits used by the graph builders
///
/// Every field has a default, so a JSON file only needs the values it
/// wants to override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Player state changes (Idle, Executing, Pause)
    pub player_state_timeout_ms: u64,
    /// Recorder state changes and every teardown transition
    pub recorder_state_timeout_ms: u64,
    pub teardown_timeout_ms: u64,
    pub port_timeout_ms: u64,
    pub tunneled_port_timeout_ms: u64,
    pub first_frame_timeout_ms: u64,
    pub flush_timeout_ms: u64,
    pub clock_retry_interval_ms: u64,
    pub clock_retry_limit: u32,
    pub max_ports: u32,
    pub metadata_max_len: usize,
    pub default_thumbnail_time_ms: i64,
    pub user_agent: Option<String>,
    pub file_cache_size: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            player_state_timeout_ms: 5000,
            recorder_state_timeout_ms: 10000,
            teardown_timeout_ms: 10000,
            port_timeout_ms: 2000,
            tunneled_port_timeout_ms: 5000,
            first_frame_timeout_ms: 2000,
            flush_timeout_ms: 5000,
            clock_retry_interval_ms: 10,
            clock_retry_limit: 200,
            max_ports: 16,
            metadata_max_len: 16384,
            default_thumbnail_time_ms: 7000,
            user_agent: None,
            file_cache_size: 0,
        }
    }
}

impl GraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| GraphError::BadParameter(format!("config: {}", e)))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GraphError::BadParameter(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
