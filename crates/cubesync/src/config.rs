//! Server and client configuration.
//!
//! Both configs deserialize from TOML. Every field is optional in the file;
//! missing fields keep their [`Default`] values. Durations are written in
//! milliseconds:
//!
//! ```toml
//! # server.toml
//! bind_addr = "0.0.0.0:9000"
//! broadcast_interval_ms = 200
//! frame_rate_hz = 60
//! ```
//!
//! ```toml
//! # client.toml
//! server_url = "ws://127.0.0.1:9000"
//! report_interval_ms = 200
//! drop_check_interval_ms = 1000
//! recolor_interval_ms = 0          # 0 disables recoloring
//! initial_color = [1.0, 0.0, 0.0, 1.0]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use cubesync_protocol::Color;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// Default port the server listens on.
pub const DEFAULT_PORT: u16 = 9000;

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Server settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// How often the full snapshot is broadcast.
    #[serde(rename = "broadcast_interval_ms", deserialize_with = "millis")]
    pub broadcast_interval: Duration,
    /// Frame loop rate. Inbound events are drained once per frame.
    pub frame_rate_hz: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            broadcast_interval: Duration::from_millis(200),
            frame_rate_hz: 60,
        }
    }
}

impl ServerConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        parse(s, Path::new("<inline>"))
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load(path.as_ref())
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Client settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// WebSocket URL of the server.
    pub server_url: String,
    /// How often the client reports its own state.
    #[serde(rename = "report_interval_ms", deserialize_with = "millis")]
    pub report_interval: Duration,
    /// How often players missing from the latest snapshot are dropped.
    #[serde(rename = "drop_check_interval_ms", deserialize_with = "millis")]
    pub drop_check_interval: Duration,
    /// How often the own color is re-rolled. `None` (0 in TOML) disables it.
    #[serde(rename = "recolor_interval_ms", deserialize_with = "millis_or_off")]
    pub recolor_interval: Option<Duration>,
    /// Color sent in the handshake and given to the own proxy.
    pub initial_color: Color,
    /// Frame loop rate.
    pub frame_rate_hz: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("ws://127.0.0.1:{DEFAULT_PORT}"),
            report_interval: Duration::from_millis(200),
            drop_check_interval: Duration::from_secs(1),
            recolor_interval: Some(Duration::from_secs(1)),
            initial_color: Color::RED,
            frame_rate_hz: 60,
        }
    }
}

impl ClientConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        parse(s, Path::new("<inline>"))
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load(path.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content =
        std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse(&content, path)
}

fn parse<T: DeserializeOwned>(s: &str, path: &Path) -> Result<T, ConfigError> {
    toml::from_str(s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn millis<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
}

fn millis_or_off<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<Duration>, D::Error> {
    let ms = u64::deserialize(d)?;
    Ok((ms > 0).then(|| Duration::from_millis(ms)))
}
