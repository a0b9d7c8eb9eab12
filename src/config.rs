use std::fs;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

use crate::schema::ProtocolInfo;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level structure loaded from `config.json`.
//
// It defines:
// - Ingest master connection settings
// - Output channel sizing
// - Enabled protocols and their parameters
// - Optional debug configuration
//
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Configuration for the ingest master
    pub ingest: IngestConfig,

    /// Output channel sizing
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Subgraph HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// List of protocol configurations
    pub protocols: Vec<ProtocolConfig>,

    /// Optional debug configuration
    pub debug: Option<DebugConfig>,
}

// ------------------------------------------------------------
// Ingest master configuration
// ------------------------------------------------------------
//
// Notes:
// - The `key` is security-sensitive and must never be committed.
// - `demo` disables sending data to the master (local testing).
//
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// WebSocket URL of the ingest master
    pub url: String,

    /// Number of parallel WebSocket connections to the master
    pub connections: usize,

    /// Authentication key used during login
    /// (sent as: key=XYZ&role=collector)
    pub key: String,

    /// Demo mode flag (no data sent, only logged)
    pub demo: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    /// Buffer size of the rate and state channels
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Give up on a full channel after this many milliseconds.
    /// Absent means wait indefinitely.
    pub send_timeout_ms: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            send_timeout_ms: None,
        }
    }
}

impl ChannelConfig {
    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
        }
    }
}

// ------------------------------------------------------------
// Protocol configuration
// ------------------------------------------------------------
//
// One entry per scraped protocol. `name` selects the scraper
// implementation, `info` is the descriptor attached to events.
//
#[derive(Debug, Deserialize, Clone)]
pub struct ProtocolConfig {
    /// Scraper identifier (e.g. "nuo")
    pub name: String,

    /// Enables or disables this protocol at runtime
    pub enabled: bool,

    /// Overrides the scraper's built-in subgraph URL
    pub endpoint: Option<String>,

    /// Seconds between update cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    pub info: ProtocolInfo,
}

impl ProtocolConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Forces debug-level logging
    pub log: Option<bool>,
}

fn default_capacity() -> usize {
    1024
}

fn default_http_timeout() -> u64 {
    30
}

fn default_interval() -> u64 {
    60
}

impl Config {
    pub fn debug_log(&self) -> bool {
        self.debug.as_ref().is_some_and(|d| d.log.unwrap_or(false))
    }

    /// Rejects values that deserialize fine but cannot run.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.channel.capacity == 0 {
            bail!("channel.capacity must be greater than zero");
        }
        if self.http.timeout_secs == 0 {
            bail!("http.timeout_secs must be greater than zero");
        }
        if !self.ingest.demo.unwrap_or(false) && self.ingest.connections == 0 {
            bail!("ingest.connections must be greater than zero");
        }
        if self.protocols.is_empty() {
            bail!("no protocols configured");
        }
        for p in &self.protocols {
            if p.interval_secs == 0 {
                bail!("protocol '{}': interval_secs must be greater than zero", p.name);
            }
        }
        Ok(())
    }
}

/// Reads, deserializes and validates a JSON configuration file.
pub fn load_config(path: &str) -> anyhow::Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config file {path}"))?;
    let cfg = parse_config(&data).with_context(|| format!("loading {path}"))?;
    Ok(cfg)
}

pub fn parse_config(data: &str) -> anyhow::Result<Config> {
    let cfg: Config = serde_json::from_str(data).context("invalid config JSON")?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "ingest": { "url": "ws://localhost:9000", "connections": 2, "key": "secret" },
        "protocols": [
            {
                "name": "nuo",
                "enabled": true,
                "info": { "name": "NUO", "underlying_blockchain": "Ethereum" }
            }
        ]
    }"#;

    #[test]
    fn applies_defaults() {
        let cfg = parse_config(SAMPLE).unwrap();

        assert_eq!(cfg.channel.capacity, 1024);
        assert_eq!(cfg.channel.send_timeout(), None);
        assert_eq!(cfg.http.timeout_secs, 30);
        assert_eq!(cfg.protocols[0].interval(), Duration::from_secs(60));
        assert_eq!(cfg.protocols[0].endpoint, None);
        assert_eq!(cfg.protocols[0].info.name, "NUO");
        assert!(!cfg.debug_log());
    }

    #[test]
    fn reads_explicit_values() {
        let cfg = parse_config(
            r#"{
            "ingest": { "url": "ws://x", "connections": 1, "key": "k", "demo": true },
            "channel": { "capacity": 8, "send_timeout_ms": 250 },
            "protocols": [
                { "name": "nuo", "enabled": false, "interval_secs": 5,
                  "endpoint": "http://localhost/graph", "info": { "name": "NUO" } }
            ],
            "debug": { "log": true }
        }"#,
        )
        .unwrap();

        assert_eq!(cfg.channel.capacity, 8);
        assert_eq!(cfg.channel.send_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.protocols[0].interval_secs, 5);
        assert_eq!(cfg.protocols[0].endpoint.as_deref(), Some("http://localhost/graph"));
        assert!(cfg.debug_log());
    }

    #[test]
    fn rejects_zero_capacity() {
        let data = SAMPLE.replace(r#""protocols""#, r#""channel": {"capacity": 0}, "protocols""#);
        let err = parse_config(&data).unwrap_err();
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn rejects_zero_interval() {
        let data = SAMPLE.replace(r#""enabled": true"#, r#""enabled": true, "interval_secs": 0"#);
        assert!(parse_config(&data).is_err());
    }

    #[test]
    fn rejects_empty_protocol_list() {
        let err = parse_config(
            r#"{ "ingest": { "url": "ws://x", "connections": 1, "key": "k" }, "protocols": [] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("no protocols"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config("/nonexistent/config.json").is_err());
    }
}
