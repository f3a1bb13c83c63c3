//! Sync configuration.
//!
//! All knobs flow through the engine constructor; there is no process-wide
//! state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboundConfig {
    /// Window size handed to the ingestion batch call.
    pub batch_size: usize,
    /// Per-event retry ceiling.
    pub max_retries: u32,
    /// Advisory initial backoff; the engine schedules the next attempt, no
    /// in-line sleep happens between batches.
    pub retry_delay_ms: u64,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundConfig {
    /// Page size per store query.
    pub batch_size: usize,
    /// Ceiling per sync invocation.
    pub max_events: usize,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_events: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub auto_sync_interval_ms: u64,
    pub enable_auto_sync: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_sync_interval_ms: 60_000,
            enable_auto_sync: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub outbound: OutboundConfig,
    pub inbound: InboundConfig,
    pub engine: EngineConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = SyncConfig::default();
        assert_eq!(config.outbound.batch_size, 50);
        assert_eq!(config.outbound.max_retries, 3);
        assert_eq!(config.outbound.retry_delay_ms, 1_000);
        assert_eq!(config.inbound.batch_size, 100);
        assert_eq!(config.inbound.max_events, 1_000);
        assert_eq!(config.engine.auto_sync_interval_ms, 60_000);
        assert!(config.engine.enable_auto_sync);
    }

    #[test]
    fn partial_config_files_fill_in_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"outbound": {"batch_size": 10}}"#).unwrap();
        assert_eq!(config.outbound.batch_size, 10);
        assert_eq!(config.outbound.max_retries, 3);
        assert_eq!(config.inbound.batch_size, 100);
    }
}
