//! Transport configuration.

use std::time::Duration;

use estimo_settings::ServerSettings;

/// Runtime knobs for the HTTP listener and every `WebSocket` session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind; `0` picks a free port.
    pub port: u16,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue capacity.
    pub send_buffer_size: usize,
    /// Interval between server pings.
    pub ping_interval: Duration,
    /// Idle window after which a silent connection is closed.
    pub pong_timeout: Duration,
    /// Upper bound on writing one outbound frame.
    pub write_timeout: Duration,
}

impl ServerConfig {
    /// `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 16 * 1024,
            send_buffer_size: 256,
            ping_interval: Duration::from_secs(54),
            pong_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_message_size: settings.max_message_size,
            send_buffer_size: settings.send_buffer_size,
            ping_interval: settings.ping_interval(),
            pong_timeout: settings.pong_timeout(),
            write_timeout: settings.write_timeout(),
        }
    }
}
