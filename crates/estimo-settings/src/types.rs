//! Settings sections.
//!
//! Every section deserializes with `#[serde(default)]`, so a settings file
//! only needs to name the values it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EstimoSettings {
    /// HTTP and WebSocket transport.
    pub server: ServerSettings,
    /// Live room store.
    pub memory: MemorySettings,
    /// Durable room/task storage.
    pub storage: StorageSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl EstimoSettings {
    /// Reject combinations that cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be positive".into(),
            ));
        }
        if self.server.send_buffer_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendBufferSize must be positive".into(),
            ));
        }
        if self.server.ping_interval_secs == 0
            || self.server.ping_interval_secs >= self.server.pong_timeout_secs
        {
            return Err(SettingsError::InvalidValue(format!(
                "server.pingIntervalSecs ({}) must be between 1 and pongTimeoutSecs ({})",
                self.server.ping_interval_secs, self.server.pong_timeout_secs
            )));
        }
        if self.memory.cleanup_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "memory.cleanupIntervalSecs must be positive".into(),
            ));
        }
        if self.storage.backend == StorageBackend::Sqlite && self.storage.sqlite_path.is_empty() {
            return Err(SettingsError::InvalidValue(
                "storage.sqlitePath is required for the sqlite backend".into(),
            ));
        }
        Ok(())
    }
}

/// Transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Largest accepted inbound WebSocket frame, in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue capacity.
    pub send_buffer_size: usize,
    /// Keep-alive ping interval.
    pub ping_interval_secs: u64,
    /// Idle window after which a silent connection is closed.
    pub pong_timeout_secs: u64,
    /// Upper bound on writing one outbound frame.
    pub write_timeout_secs: u64,
    /// Upper bound on draining tasks at shutdown.
    pub shutdown_timeout_secs: u64,
}

impl ServerSettings {
    /// `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ping interval as a `Duration`.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Pong timeout as a `Duration`.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    /// Write timeout as a `Duration`.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Shutdown drain timeout as a `Duration`.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_message_size: 16 * 1024,
            send_buffer_size: 256,
            ping_interval_secs: 54,
            pong_timeout_secs: 60,
            write_timeout_secs: 10,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Live room store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemorySettings {
    /// Reaper interval.
    pub cleanup_interval_secs: u64,
    /// Idle time after which an empty room is reaped.
    pub room_ttl_secs: u64,
}

impl MemorySettings {
    /// Reaper interval as a `Duration`.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Room TTL as a `Duration`.
    pub fn room_ttl(&self) -> Duration {
        Duration::from_secs(self.room_ttl_secs)
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 600,
            room_ttl_secs: 86_400,
        }
    }
}

/// Where rooms and tasks are kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local maps; lost on restart.
    #[default]
    Memory,
    /// SQLite file.
    Sqlite,
}

impl std::str::FromStr for StorageBackend {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(SettingsError::InvalidValue(format!(
                "unknown storage backend: {other}"
            ))),
        }
    }
}

/// Durable storage settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Backend selection.
    pub backend: StorageBackend,
    /// Database file for the sqlite backend.
    pub sqlite_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sqlite_path: "estimo.db".to_string(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    /// Emit one JSON object per line instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let s = EstimoSettings::default();
        assert_eq!(s.server.bind_addr(), "0.0.0.0:8080");
        assert_eq!(s.server.max_message_size, 16 * 1024);
        assert_eq!(s.server.send_buffer_size, 256);
        assert_eq!(s.server.ping_interval(), Duration::from_secs(54));
        assert_eq!(s.server.pong_timeout(), Duration::from_secs(60));
        assert_eq!(s.server.write_timeout(), Duration::from_secs(10));
        assert_eq!(s.server.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(s.memory.cleanup_interval(), Duration::from_secs(600));
        assert_eq!(s.memory.room_ttl(), Duration::from_secs(86_400));
        assert_eq!(s.storage.backend, StorageBackend::Memory);
        assert_eq!(s.logging.level, "info");
        assert!(!s.logging.json);
        s.validate().unwrap();
    }

    #[test]
    fn camel_case_on_the_wire() {
        let json = serde_json::to_value(EstimoSettings::default()).unwrap();
        assert_eq!(json["server"]["maxMessageSize"], 16_384);
        assert_eq!(json["memory"]["roomTtlSecs"], 86_400);
        assert_eq!(json["storage"]["backend"], "memory");
        assert_eq!(json["storage"]["sqlitePath"], "estimo.db");
    }

    #[test]
    fn partial_section_fills_defaults() {
        let s: EstimoSettings = serde_json::from_str(r#"{"server":{"port":9000}}"#).unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.memory, MemorySettings::default());
    }

    #[test]
    fn backend_from_str() {
        assert_eq!("SQLite".parse::<StorageBackend>().unwrap(), StorageBackend::Sqlite);
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_matches!(
            "redis".parse::<StorageBackend>(),
            Err(SettingsError::InvalidValue(_))
        );
    }

    #[test]
    fn validate_rejects_ping_not_below_pong() {
        let mut s = EstimoSettings::default();
        s.server.ping_interval_secs = 60;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("pingIntervalSecs"));
    }

    #[test]
    fn validate_rejects_sqlite_without_path() {
        let mut s = EstimoSettings::default();
        s.storage.backend = StorageBackend::Sqlite;
        s.storage.sqlite_path.clear();
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn validate_rejects_zero_buffers() {
        let mut s = EstimoSettings::default();
        s.server.send_buffer_size = 0;
        assert!(s.validate().is_err());
        let mut s = EstimoSettings::default();
        s.server.max_message_size = 0;
        assert!(s.validate().is_err());
    }
}
