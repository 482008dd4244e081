//! Layered configuration for the example harness: built-in defaults, then an
//! optional TOML file, then `ARCUS_*` environment variables, then whatever
//! CLI flags the caller (`src/bin/game.rs`) applies last (§4.9).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
  #[serde(default)]
  pub network: NetworkSection,
  #[serde(default)]
  pub buffers: BuffersSection,
  #[serde(default)]
  pub timing: TimingSection,
  #[serde(default)]
  pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
  #[serde(default)]
  pub network: NetworkSection,
  #[serde(default)]
  pub buffers: BuffersSection,
  #[serde(default)]
  pub timing: TimingSection,
  #[serde(default)]
  pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_port")]
  pub port: u16,
  #[serde(default = "default_backlog")]
  pub backlog: u32,
}

fn default_host() -> String {
  "127.0.0.1".into()
}
fn default_port() -> u16 {
  8787
}
fn default_backlog() -> u32 {
  16
}

impl Default for NetworkSection {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_port(),
      backlog: default_backlog(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuffersSection {
  #[serde(default = "default_stream_buffer_size")]
  pub stream_receive_buffer_size: usize,
  #[serde(default = "default_stream_buffer_size")]
  pub stream_send_buffer_size: usize,
  #[serde(default = "default_ring_capacity")]
  pub incoming_ring_capacity: usize,
  #[serde(default = "default_ring_capacity")]
  pub outgoing_ring_capacity: usize,
  /// Largest JSON payload, in bytes, the codec will encode or decode.
  /// Defaults to `stream_receive_buffer_size - HEADER_SIZE` if left unset.
  #[serde(default)]
  pub payload_max: Option<u32>,
}

fn default_ring_capacity() -> usize {
  crate::ring::DEFAULT_CAPACITY
}
fn default_stream_buffer_size() -> usize {
  128 * 1024
}

impl Default for BuffersSection {
  fn default() -> Self {
    Self {
      stream_receive_buffer_size: default_stream_buffer_size(),
      stream_send_buffer_size: default_stream_buffer_size(),
      incoming_ring_capacity: default_ring_capacity(),
      outgoing_ring_capacity: default_ring_capacity(),
      payload_max: None,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSection {
  #[serde(default = "default_handshake_timeout_seconds")]
  pub handshake_timeout_seconds: u64,
  #[serde(default = "default_health_send_interval_ms")]
  pub health_send_interval_ms: u64,
  #[serde(default = "default_health_receive_interval_ms")]
  pub health_receive_interval_ms: u64,
}

fn default_handshake_timeout_seconds() -> u64 {
  1
}
fn default_health_send_interval_ms() -> u64 {
  5_000
}
fn default_health_receive_interval_ms() -> u64 {
  30_000
}

impl Default for TimingSection {
  fn default() -> Self {
    Self {
      handshake_timeout_seconds: default_handshake_timeout_seconds(),
      health_send_interval_ms: default_health_send_interval_ms(),
      health_receive_interval_ms: default_health_receive_interval_ms(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
  #[serde(default = "default_level")]
  pub level: String,
}

fn default_level() -> String {
  "info".into()
}

impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: default_level(),
    }
  }
}

impl TimingSection {
  pub fn handshake_timeout(&self) -> Duration {
    Duration::from_secs(self.handshake_timeout_seconds)
  }
  pub fn health_send_interval(&self) -> Duration {
    Duration::from_millis(self.health_send_interval_ms)
  }
  pub fn health_receive_interval(&self) -> Duration {
    Duration::from_millis(self.health_receive_interval_ms)
  }
}

impl BuffersSection {
  pub fn payload_max(&self) -> u32 {
    self
      .payload_max
      .unwrap_or((self.stream_receive_buffer_size - crate::header::HEADER_SIZE) as u32)
  }
}

macro_rules! config_loader {
  ($ty:ty, $file_names:expr, $env_prefix:expr) => {
    impl $ty {
      pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
          .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.as_ref().display()))?;
        let mut config: Self = toml::from_str(&content)
          .map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.as_ref().display()))?;
        config.apply_env_overrides();
        Ok(config)
      }

      pub fn find_and_load() -> anyhow::Result<Self> {
        for name in $file_names {
          if Path::new(name).exists() {
            tracing::info!(path = name, "loading config file");
            return Self::from_file(name);
          }
        }
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
      }

      /// Applies `{prefix}_HOST`, `{prefix}_PORT`, `{prefix}_LOG_LEVEL` on top
      /// of whatever defaults/file contents are already loaded. CLI flags, if
      /// any, are applied by the caller after this and win last (§4.9).
      fn apply_env_overrides(&mut self) {
        let prefix = $env_prefix;
        if let Ok(host) = std::env::var(format!("{prefix}_HOST")) {
          self.network.host = host;
        }
        if let Ok(port) = std::env::var(format!("{prefix}_PORT")) {
          if let Ok(port) = port.parse() {
            self.network.port = port;
          } else {
            tracing::warn!(var = %format!("{prefix}_PORT"), "ignoring unparseable port override");
          }
        }
        if let Ok(level) = std::env::var(format!("{prefix}_LOG_LEVEL")) {
          self.logging.level = level;
        }
      }
    }
  };
}

config_loader!(ServerConfig, ["arcus-server.toml"], "ARCUS_SERVER");
config_loader!(ClientConfig, ["arcus-client.toml"], "ARCUS_CLIENT");

impl ServerConfig {
  pub fn connection_config(&self) -> ConnectionConfig {
    ConnectionConfig {
      incoming_capacity: self.buffers.incoming_ring_capacity,
      outgoing_capacity: self.buffers.outgoing_ring_capacity,
      stream_receive_buffer_size: self.buffers.stream_receive_buffer_size,
      stream_send_buffer_size: self.buffers.stream_send_buffer_size,
      payload_max: self.buffers.payload_max(),
      handshake_timeout: self.timing.handshake_timeout(),
      health_send_interval: self.timing.health_send_interval(),
      health_receive_interval: self.timing.health_receive_interval(),
    }
  }
}

impl ClientConfig {
  pub fn connection_config(&self) -> ConnectionConfig {
    ConnectionConfig {
      incoming_capacity: self.buffers.incoming_ring_capacity,
      outgoing_capacity: self.buffers.outgoing_ring_capacity,
      stream_receive_buffer_size: self.buffers.stream_receive_buffer_size,
      stream_send_buffer_size: self.buffers.stream_send_buffer_size,
      payload_max: self.buffers.payload_max(),
      handshake_timeout: self.timing.handshake_timeout(),
      health_send_interval: self.timing.health_send_interval(),
      health_receive_interval: self.timing.health_receive_interval(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_self_consistent() {
    let config = ServerConfig::default();
    assert_eq!(config.network.port, 8787);
    assert!(config.buffers.payload_max() < config.buffers.stream_receive_buffer_size as u32);
  }

  #[test]
  fn from_file_parses_partial_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("arcus-server.toml");
    std::fs::write(&path, "[network]\nport = 9999\n").unwrap();
    let config = ServerConfig::from_file(&path).unwrap();
    assert_eq!(config.network.port, 9999);
    assert_eq!(config.network.host, default_host());
  }

  #[test]
  fn env_override_wins_over_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("arcus-server.toml");
    std::fs::write(&path, "[network]\nport = 9999\n").unwrap();
    std::env::set_var("ARCUS_SERVER_PORT", "1234");
    let config = ServerConfig::from_file(&path).unwrap();
    std::env::remove_var("ARCUS_SERVER_PORT");
    assert_eq!(config.network.port, 1234);
  }
}
