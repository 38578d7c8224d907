//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Maximum simultaneous players
    pub max_players: usize,
    /// Frames that may queue up for one client before it is dropped
    pub outbound_buffer: usize,
    /// Pings per second per connection (0 = unlimited)
    pub input_rate_limit: u32,
    /// Milliseconds a single frame write may take before the client is dropped
    pub write_timeout_ms: u64,
    /// Seconds between stats log lines (0 = never)
    pub stats_log_interval_secs: u64,
    /// Seed for spawn positions and hues
    pub world_seed: Option<u64>,

    /// Allowed client origin(s) for CORS, comma-separated or `*`
    pub client_origin: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Some(port) = lookup("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:6970".to_string())
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            tick_rate: parse_or(&lookup, "TICK_RATE", 60)?,
            max_players: parse_or(&lookup, "MAX_PLAYERS", 10)?,
            outbound_buffer: parse_or(&lookup, "OUTBOUND_BUFFER", 256)?,
            input_rate_limit: parse_or(&lookup, "INPUT_RATE_LIMIT", 120)?,
            write_timeout_ms: parse_or(&lookup, "WRITE_TIMEOUT_MS", 2000)?,
            stats_log_interval_secs: parse_or(&lookup, "STATS_LOG_INTERVAL", 10)?,
            world_seed: lookup("WORLD_SEED")
                .map(|raw| parse("WORLD_SEED", &raw))
                .transpose()?,

            client_origin: lookup("CLIENT_ORIGIN").unwrap_or_else(|| "*".to_string()),
        };

        if config.tick_rate == 0 {
            return Err(ConfigError::MustBePositive("TICK_RATE"));
        }
        if config.max_players == 0 {
            return Err(ConfigError::MustBePositive("MAX_PLAYERS"));
        }
        if config.outbound_buffer == 0 {
            return Err(ConfigError::MustBePositive("OUTBOUND_BUFFER"));
        }
        if config.write_timeout_ms == 0 {
            return Err(ConfigError::MustBePositive("WRITE_TIMEOUT_MS"));
        }

        Ok(config)
    }

    pub fn stats_log_interval(&self) -> Option<Duration> {
        let secs = self.stats_log_interval_secs;
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
}
