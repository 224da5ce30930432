//! Configuration for the UDP ingest gateway.
//!
//! Configuration can be loaded from a TOML file and/or environment
//! variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the ingest gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Ingest socket and lifecycle settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Per-stream defaults
    #[serde(default)]
    pub stream: StreamDefaults,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Host to bind the HTTP API to
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_http_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            host: default_host(),
        }
    }
}

/// Ingest socket and session lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Largest datagram we will attempt to read at once
    #[serde(default = "default_datagram_size")]
    pub datagram_size: usize,

    /// Idle timeout in milliseconds; also bounds receive-loop cancellation
    /// latency
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Interval between idle sweeps in seconds
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    /// Maximum number of concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_datagram_size() -> usize {
    8192
}

fn default_idle_timeout_ms() -> u64 {
    8000
}

fn default_reap_interval_secs() -> u64 {
    2
}

fn default_max_sessions() -> usize {
    100
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            datagram_size: default_datagram_size(),
            idle_timeout_ms: default_idle_timeout_ms(),
            reap_interval_secs: default_reap_interval_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Defaults applied to new streams when the create request leaves them out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDefaults {
    /// PMT PID hint for transport-stream demux
    #[serde(default = "default_pmt_pid")]
    pub pmt_pid: u16,

    /// Audio PID hint
    #[serde(default = "default_audio_pid")]
    pub audio_pid: u16,

    /// Video PID hint
    #[serde(default = "default_video_pid")]
    pub video_pid: u16,

    /// Metadata PID hint (0 = not set)
    #[serde(default)]
    pub meta_pid: u16,

    /// PES elementary stream id used when re-multiplexing
    #[serde(default = "default_stream_id")]
    pub stream_id: u8,

    /// Default audio type fourCC
    #[serde(default = "default_audio_type")]
    pub audio_type: String,

    /// Default video type fourCC
    #[serde(default = "default_video_type")]
    pub video_type: String,

    /// Default metadata type fourCC
    #[serde(default = "default_metadata_type")]
    pub metadata_type: String,
}

fn default_pmt_pid() -> u16 {
    4096
}

fn default_audio_pid() -> u16 {
    257
}

fn default_video_pid() -> u16 {
    256
}

fn default_stream_id() -> u8 {
    0xe0
}

fn default_audio_type() -> String {
    "ADTS".to_string()
}

fn default_video_type() -> String {
    "H264".to_string()
}

fn default_metadata_type() -> String {
    "ID3 ".to_string()
}

impl Default for StreamDefaults {
    fn default() -> Self {
        Self {
            pmt_pid: default_pmt_pid(),
            audio_pid: default_audio_pid(),
            video_pid: default_video_pid(),
            meta_pid: 0,
            stream_id: default_stream_id(),
            audio_type: default_audio_type(),
            video_type: default_video_type(),
            metadata_type: default_metadata_type(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            ingest: IngestConfig::default(),
            stream: StreamDefaults::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to
    /// defaults
    pub fn from_env() -> Self {
        let mut config = Config::default();

        // Server
        if let Ok(port) = std::env::var("INGEST_HTTP_PORT") {
            if let Ok(p) = port.parse() {
                config.server.http_port = p;
            }
        }
        if let Ok(host) = std::env::var("INGEST_HOST") {
            config.server.host = host;
        }

        // Ingest
        if let Ok(size) = std::env::var("INGEST_DATAGRAM_SIZE") {
            if let Ok(s) = size.parse() {
                config.ingest.datagram_size = s;
            }
        }
        if let Ok(timeout) = std::env::var("INGEST_IDLE_TIMEOUT_MS") {
            if let Ok(t) = timeout.parse() {
                config.ingest.idle_timeout_ms = t;
            }
        }
        if let Ok(max) = std::env::var("INGEST_MAX_SESSIONS") {
            if let Ok(m) = max.parse() {
                config.ingest.max_sessions = m;
            }
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from
    /// environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                return Self::from_file(p);
            }
        }
        Ok(Self::from_env())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
