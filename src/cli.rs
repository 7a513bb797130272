//! Command-line interface

use clap::{Parser, ValueEnum};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Server,
    Client,
}

/// WebSocket round-trip latency server/client.
///
/// Every option can also be set through a `WS_RTT_*` environment variable
/// (or a `.env` file); command-line values win.
#[derive(Debug, Parser)]
#[command(name = "ws-rtt", disable_version_flag = true)]
pub struct Cli {
    /// Operation mode
    #[arg(long, value_enum, required_unless_present = "version")]
    pub mode: Option<Mode>,

    /// WebSocket server address (host:port)
    #[arg(long)]
    pub addr: Option<String>,

    /// Server name used for TLS and the Host header
    #[arg(long = "servername")]
    pub server_name: Option<String>,

    /// Interval between messages in milliseconds
    #[arg(long, value_name = "MS")]
    pub interval: Option<u64>,

    /// Size of the message payload in bytes
    #[arg(short = 'd', value_name = "BYTES")]
    pub payload_size: Option<usize>,

    /// Use TLS (wss://)
    #[arg(long)]
    pub tls: bool,

    /// Skip TLS certificate verification (insecure)
    #[arg(short = 'k')]
    pub insecure: bool,

    /// Add an HTTP request header, e.g. -H 'Authorization: Bearer xyz' (repeatable)
    #[arg(short = 'H', value_name = "HEADER", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Snowflake node id (0-1023); random when omitted
    #[arg(long)]
    pub node_id: Option<u16>,

    /// Seconds of silence before the server probes a connection
    #[arg(long, value_name = "SECS")]
    pub ping_period: Option<u64>,

    /// Seconds a probe may stay unanswered before the connection is closed
    #[arg(long, value_name = "SECS")]
    pub pong_timeout: Option<u64>,

    /// Show version information and exit
    #[arg(long)]
    pub version: bool,
}

/// Parse `Name: Value`.
pub fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("invalid header format (expected 'Name: Value'): {}", raw))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty: {}", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Authorization: Bearer xyz").unwrap(),
            ("Authorization".to_string(), "Bearer xyz".to_string())
        );
        assert_eq!(
            parse_header("X-Url: http://a:b").unwrap(),
            ("X-Url".to_string(), "http://a:b".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_client_flags() {
        let cli = Cli::try_parse_from([
            "ws-rtt",
            "--mode",
            "client",
            "--addr",
            "example.com:443",
            "--tls",
            "-k",
            "-d",
            "64",
            "-H",
            "X-One: 1",
            "-H",
            "X-Two: 2",
        ])
        .unwrap();

        assert_eq!(cli.mode, Some(Mode::Client));
        assert_eq!(cli.addr.as_deref(), Some("example.com:443"));
        assert!(cli.tls);
        assert!(cli.insecure);
        assert_eq!(cli.payload_size, Some(64));
        assert_eq!(cli.headers.len(), 2);
    }

    #[test]
    fn test_mode_required_unless_version() {
        assert!(Cli::try_parse_from(["ws-rtt"]).is_err());
        let cli = Cli::try_parse_from(["ws-rtt", "--version"]).unwrap();
        assert!(cli.version);
        assert!(cli.mode.is_none());
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::Server.to_string(), "server");
        assert_eq!(Mode::Client.to_string(), "client");
    }
}
