use std::time::Duration;

use serde::Deserialize;

use crate::cli::Cli;
use crate::error::{AppError, AppResult};
use crate::heartbeat::HeartbeatConfig;
use crate::log_sink::LogSinkConfig;
use crate::snowflake::MAX_NODE_ID;

pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_addr")]
    pub addr: String,

    #[serde(default)]
    pub server_name: Option<String>,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_payload_size")]
    pub payload_size: usize,

    #[serde(default)]
    pub use_tls: bool,

    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Extra handshake headers; command line only.
    #[serde(skip)]
    pub headers: Vec<(String, String)>,

    #[serde(default)]
    pub node_id: Option<u16>,

    #[serde(default = "default_ping_period_secs")]
    pub ping_period_secs: u64,

    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,

    #[serde(default = "default_log_flush_bytes")]
    pub log_flush_bytes: usize,

    #[serde(default = "default_log_flush_interval_ms")]
    pub log_flush_interval_ms: u64,

    #[serde(default)]
    pub log_json: bool,
}

fn default_addr() -> String {
    "localhost:8080".to_string()
}

fn default_interval_ms() -> u64 {
    100
}

fn default_payload_size() -> usize {
    32
}

fn default_ping_period_secs() -> u64 {
    10
}

fn default_pong_timeout_secs() -> u64 {
    30
}

fn default_log_flush_bytes() -> usize {
    4096
}

fn default_log_flush_interval_ms() -> u64 {
    250
}

impl Config {
    /// Read `WS_RTT_*` environment variables (and `.env`) on top of the
    /// defaults.
    pub fn load() -> AppResult<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = ::config::Config::builder()
            .add_source(::config::Environment::with_prefix("WS_RTT").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Command-line values override the environment.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(addr) = &cli.addr {
            self.addr = addr.clone();
        }
        if let Some(server_name) = &cli.server_name {
            self.server_name = Some(server_name.clone());
        }
        if let Some(interval) = cli.interval {
            self.interval_ms = interval;
        }
        if let Some(payload_size) = cli.payload_size {
            self.payload_size = payload_size;
        }
        if let Some(node_id) = cli.node_id {
            self.node_id = Some(node_id);
        }
        if let Some(ping_period) = cli.ping_period {
            self.ping_period_secs = ping_period;
        }
        if let Some(pong_timeout) = cli.pong_timeout {
            self.pong_timeout_secs = pong_timeout;
        }
        self.use_tls |= cli.tls;
        self.insecure_skip_verify |= cli.insecure;
        self.headers.extend(cli.headers.iter().cloned());
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.payload_size == 0 || self.payload_size > MAX_PAYLOAD_SIZE {
            return Err(AppError::config(format!(
                "payload size must be between 1 and {}, got {}",
                MAX_PAYLOAD_SIZE, self.payload_size
            )));
        }
        if let Some(node_id) = self.node_id {
            if node_id > MAX_NODE_ID {
                return Err(AppError::InvalidNodeId {
                    node_id: node_id as u64,
                    max: MAX_NODE_ID as u64,
                });
            }
        }
        if self.ping_period_secs == 0 || self.pong_timeout_secs == 0 {
            return Err(AppError::config(
                "ping period and pong timeout must be at least one second",
            ));
        }
        if self.log_flush_interval_ms == 0 {
            return Err(AppError::config("log flush interval must be positive"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn heartbeat(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            ping_period: Duration::from_secs(self.ping_period_secs),
            pong_timeout: Duration::from_secs(self.pong_timeout_secs),
        }
    }

    pub fn log_sink(&self) -> LogSinkConfig {
        LogSinkConfig {
            flush_threshold: self.log_flush_bytes,
            flush_interval: Duration::from_millis(self.log_flush_interval_ms),
        }
    }

    /// Address to bind in server mode; a bare `:port` listens on all
    /// interfaces.
    pub fn bind_addr(&self) -> String {
        if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }

    /// Authority used in the handshake URL: `server_name` (keeping the port
    /// of `addr`) when set, `addr` otherwise.
    pub fn authority(&self) -> String {
        match &self.server_name {
            Some(name) => match self.addr.rsplit_once(':') {
                Some((_, port)) => format!("{}:{}", name, port),
                None => name.clone(),
            },
            None => self.addr.clone(),
        }
    }

    pub fn websocket_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{}://{}", scheme, self.authority())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            server_name: None,
            interval_ms: default_interval_ms(),
            payload_size: default_payload_size(),
            use_tls: false,
            insecure_skip_verify: false,
            headers: Vec::new(),
            node_id: None,
            ping_period_secs: default_ping_period_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
            log_flush_bytes: default_log_flush_bytes(),
            log_flush_interval_ms: default_log_flush_interval_ms(),
            log_json: false,
        }
    }
}
