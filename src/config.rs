//! Server configuration parsed from environment variables.
//!
//! All keys are optional:
//! - `HOST`: bind address, default `0.0.0.0`
//! - `PORT`: default 3000
//! - `MAX_HISTORY`: per-room event log cap, default 1000
//! - `DEFAULT_ROOM`: name of the permanent room, default `default`
//! - `CLIENT_CHANNEL_CAPACITY`: outbound queue per connection, default 256
//! - `MAX_ROOM_NAME_LEN`: default 50
//! - `STATIC_DIR`: directory of client files served at `/`

use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_HISTORY: usize = 1000;
pub const DEFAULT_ROOM: &str = "default";
pub const DEFAULT_CLIENT_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_MAX_ROOM_NAME_LEN: usize = 50;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_history: usize,
    pub default_room: String,
    pub client_channel_capacity: usize,
    pub max_room_name_len: usize,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            max_history: DEFAULT_MAX_HISTORY,
            default_room: DEFAULT_ROOM.to_owned(),
            client_channel_capacity: DEFAULT_CLIENT_CHANNEL_CAPACITY,
            max_room_name_len: DEFAULT_MAX_ROOM_NAME_LEN,
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Build config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a numeric key is present but malformed or zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a numeric key is present but malformed or zero.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let host = non_empty("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let port = parse_key(non_empty("PORT"), "PORT", DEFAULT_PORT)?;
        let max_history = positive(parse_key(non_empty("MAX_HISTORY"), "MAX_HISTORY", DEFAULT_MAX_HISTORY)?, "MAX_HISTORY")?;
        let default_room = non_empty("DEFAULT_ROOM").unwrap_or_else(|| DEFAULT_ROOM.to_owned());
        let client_channel_capacity = positive(
            parse_key(non_empty("CLIENT_CHANNEL_CAPACITY"), "CLIENT_CHANNEL_CAPACITY", DEFAULT_CLIENT_CHANNEL_CAPACITY)?,
            "CLIENT_CHANNEL_CAPACITY",
        )?;
        let max_room_name_len = positive(
            parse_key(non_empty("MAX_ROOM_NAME_LEN"), "MAX_ROOM_NAME_LEN", DEFAULT_MAX_ROOM_NAME_LEN)?,
            "MAX_ROOM_NAME_LEN",
        )?;
        let static_dir = non_empty("STATIC_DIR").map(PathBuf::from);

        Ok(Self { host, port, max_history, default_room, client_channel_capacity, max_room_name_len, static_dir })
    }

    /// `host:port` string for the listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_key<T: FromStr>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse::<T>().map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn positive(value: usize, key: &'static str) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { key });
    }
    Ok(value)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
