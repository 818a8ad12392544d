//! Runtime configuration for the proxy.
//!
//! Every knob is read once from the environment at startup and passed down by
//! value; nothing in the request path consults ambient globals.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Upper bound on any single chunk written to the client.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Ceiling on the total bytes relayed for one request.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024 * 1024;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub chunk_size: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_file_size: u64,
    pub listen_addr: SocketAddr,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
        }
    }
}

impl ProxyConfig {
    /// Read configuration from `RANGE_RELAY_*` environment variables,
    /// falling back to the defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = ProxyConfig::default();
        ProxyConfig {
            chunk_size: env_or("RANGE_RELAY_CHUNK_SIZE", defaults.chunk_size).max(1),
            connect_timeout: Duration::from_secs(env_or(
                "RANGE_RELAY_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )),
            read_timeout: Duration::from_secs(env_or(
                "RANGE_RELAY_READ_TIMEOUT_SECS",
                defaults.read_timeout.as_secs(),
            )),
            max_file_size: env_or("RANGE_RELAY_MAX_FILE_SIZE", defaults.max_file_size),
            listen_addr: env_or("RANGE_RELAY_LISTEN_ADDR", defaults.listen_addr),
        }
    }

    /// Upstream HTTP client sharing the configured timeout pair. Used by both
    /// the validation probe and the relay so the two see the same origin
    /// behaviour.
    pub fn client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
    }
}

fn env_or<T: FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(%name, value = %raw, "ignoring unparseable configuration value");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.max_file_size, 10 * 1024 * 1024 * 1024);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
    }

    #[test]
    fn env_override_and_fallback() {
        env::set_var("RANGE_RELAY_CHUNK_SIZE", "4096");
        env::set_var("RANGE_RELAY_MAX_FILE_SIZE", "not-a-number");
        let config = ProxyConfig::from_env();
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        env::remove_var("RANGE_RELAY_CHUNK_SIZE");
        env::remove_var("RANGE_RELAY_MAX_FILE_SIZE");
    }
}
