use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::Severity;

/// Configuration for the heimdall engine and daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine instance configuration
    pub engine: EngineConfig,
    /// Pattern correlation configuration
    pub correlation: CorrelationConfig,
    /// Durable store configuration
    pub persistence: PersistenceConfig,
    /// Out-of-band alerting configuration
    pub alerting: AlertConfig,
    /// Daemon input source configuration
    pub input: InputConfig,
}

/// Engine instance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Server instance identifier. When unset, resolution falls back to the
    /// HEIMDALL_INSTANCE_ID environment variable, then a generated value.
    pub instance_id: Option<String>,
    /// Ring buffer capacity for live reads
    pub buffer_capacity: usize,
    /// Depth of the bounded fire-and-forget pipeline queue
    pub queue_depth: usize,
}

impl EngineConfig {
    /// Resolve the identifier recorded as `server_instance` on every event.
    pub fn resolve_instance_id(&self) -> String {
        if let Some(ref id) = self.instance_id {
            if !id.is_empty() {
                return id.clone();
            }
        }
        if let Ok(id) = std::env::var("HEIMDALL_INSTANCE_ID") {
            if !id.is_empty() {
                return id;
            }
        }
        format!("instance-{}", std::process::id())
    }
}

/// Pattern correlation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Trailing window for burst detection, in seconds
    pub burst_window_seconds: i64,
    /// Events per origin within the window before a burst fires
    pub burst_threshold: usize,
    /// Trailing window for cross-instance correlation, in seconds
    pub cross_instance_window_seconds: i64,
}

/// Durable store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the shared SQLite database
    pub db_path: PathBuf,
    /// Event rows older than this are pruned by the daemon
    pub retention_days: i64,
}

/// Out-of-band alerting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub enabled: bool,
    /// Minimum severity an event needs to be dispatched
    pub min_severity: Severity,
    pub webhooks: Vec<WebhookConfig>,
}

impl AlertConfig {
    /// Append the HEIMDALL_ALERT_WEBHOOK environment endpoint, if set.
    pub fn with_env_webhook(mut self) -> Self {
        if let Ok(url) = std::env::var("HEIMDALL_ALERT_WEBHOOK") {
            if !url.is_empty() {
                self.webhooks.push(WebhookConfig {
                    name: "env".to_string(),
                    url,
                    method: None,
                    headers: None,
                });
            }
        }
        self
    }
}

/// A single webhook endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
    /// HTTP method, defaults to POST
    pub method: Option<String>,
    /// Additional request headers
    pub headers: Option<HashMap<String, String>>,
}

/// Daemon input source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Type of input source: "jsonl" or "udp"
    pub source_type: String,
    /// Path to the NDJSON submission file (if source_type is "jsonl")
    pub file_path: Option<PathBuf>,
    /// UDP bind address (if source_type is "udp")
    pub udp_address: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: EngineConfig {
                instance_id: None,
                buffer_capacity: 100,
                queue_depth: 256,
            },
            correlation: CorrelationConfig {
                burst_window_seconds: 300,
                burst_threshold: 10,
                cross_instance_window_seconds: 600,
            },
            persistence: PersistenceConfig {
                db_path: PathBuf::from("heimdall.db"),
                retention_days: 30,
            },
            alerting: AlertConfig {
                enabled: false,
                min_severity: Severity::Critical,
                webhooks: Vec::new(),
            },
            input: InputConfig {
                source_type: "jsonl".to_string(),
                file_path: Some(PathBuf::from("security-events.jsonl")),
                udp_address: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
