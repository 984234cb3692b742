//! Command-Line Configuration
//!
//! The operational surface (§6): bind address, capacity, tick rate,
//! and the admission/rate-limit tuning each room inherits. Parsed with
//! `clap` the way the rest of the Rust ecosystem in this retrieval
//! pack already does — the teacher's `main.rs` never takes CLI
//! arguments, so this is new rather than adapted.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::network::auth::AuthConfig;
use crate::network::room::RoomConfig;
use crate::network::server::ServerConfig;

/// Lockstep coordinator server.
#[derive(Debug, Parser)]
#[command(name = "lockstep-coordinator", version, about)]
pub struct Cli {
    /// Address to bind the WebSocket listener to.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the WebSocket listener to.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Maximum concurrent connections.
    #[arg(long, default_value_t = 1000)]
    pub max_connections: usize,

    /// Players required before a room starts.
    #[arg(long, default_value_t = 2)]
    pub max_players: u16,

    /// Simulation tick rate, in Hz.
    #[arg(long, default_value_t = 30)]
    pub tick_rate: u32,

    /// Milliseconds a frame may remain incomplete before it's forced.
    #[arg(long, default_value_t = 1000)]
    pub frame_timeout_ms: u64,

    /// Maximum input messages accepted per connection per second.
    #[arg(long, default_value_t = 100)]
    pub max_requests_per_second: u32,

    /// Maximum accepted message size, in bytes.
    #[arg(long, default_value_t = 10 * 1024)]
    pub max_input_size: usize,

    /// Seconds a disconnected player may remain absent before eviction.
    #[arg(long, default_value_t = 30)]
    pub reconnect_timeout_secs: u64,
}

impl Cli {
    /// Resolve into the server's runtime configuration.
    pub fn into_server_config(self) -> ServerConfig {
        let bind_addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .expect("host/port must form a valid socket address");

        let reconnect_timeout_frames = (self.reconnect_timeout_secs * self.tick_rate as u64) as u32;

        ServerConfig {
            bind_addr,
            max_connections: self.max_connections,
            connection_timeout: Duration::from_secs(20),
            auth_timeout: Duration::from_secs(5),
            tick_rate: self.tick_rate,
            room: RoomConfig {
                player_count: self.max_players,
                tick_rate: self.tick_rate,
                reconnect_timeout_frames,
                rate_limit_per_sec: self.max_requests_per_second,
                max_message_bytes: self.max_input_size,
                frame_timeout_ms: self.frame_timeout_ms,
                ..RoomConfig::default()
            },
            auth: AuthConfig::from_env(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_parse() {
        let cli = Cli::parse_from(["lockstep-coordinator"]);
        assert_eq!(cli.port, 8080);
        assert_eq!(cli.tick_rate, 30);
    }

    #[test]
    fn test_into_server_config_derives_reconnect_frames() {
        let cli = Cli::parse_from([
            "lockstep-coordinator",
            "--tick-rate", "20",
            "--reconnect-timeout-secs", "10",
        ]);
        let config = cli.into_server_config();
        assert_eq!(config.room.reconnect_timeout_frames, 200);
    }

    #[test]
    fn test_bind_addr_combines_host_and_port() {
        let cli = Cli::parse_from(["lockstep-coordinator", "--host", "127.0.0.1", "--port", "9000"]);
        let config = cli.into_server_config();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9000");
    }
}
