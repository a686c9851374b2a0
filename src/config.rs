use std::str::FromStr;

use crate::errors::ConfigError;

/// Server configuration read from the environment (`spec.md` §6).
///
/// Construction is fail-fast: [`Config::from_env`] returns every invalid or
/// missing variable as a [`ConfigError`] rather than panicking deep inside
/// request handling, so `main` can print a diagnostic and exit non-zero
/// before anything binds a socket (§7 "Fatal").
#[derive(Debug, Clone)]
pub struct Config {
    pub tcp_host: String,
    pub tcp_port: u16,
    pub buffer_size: usize,
    pub max_connections: usize,
    pub idle_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub log_level: String,
    pub database_url: String,
    pub database_pool_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            tcp_host: read_env_with_default("TCP_HOST", "0.0.0.0".to_string())?,
            tcp_port: read_env_with_default("TCP_PORT", 23000)?,
            buffer_size: read_env_with_default("BUFFER_SIZE", 4096)?,
            max_connections: read_env_with_default("MAX_CONNECTIONS", 1000)?,
            idle_timeout_secs: read_env_with_default("IDLE_TIMEOUT_SECS", 600)?,
            shutdown_grace_secs: read_env_with_default("SHUTDOWN_GRACE_SECS", 5)?,
            log_level: read_env_with_default("LOG_LEVEL", "info".to_string())?,
            database_url: read_required_env("DATABASE_URL")?,
            database_pool_size: read_env_with_default("DATABASE_POOL_SIZE", 20)?,
        })
    }
}

/// Reads and parses a required environment variable.
///
/// # Arguments
/// * `key` - The environment variable key
fn read_required_env<T: FromStr>(key: &'static str) -> Result<T, ConfigError> {
    let raw = std::env::var(key).map_err(|_| ConfigError::MissingVar(key))?;
    raw.parse().map_err(|_| ConfigError::InvalidValue { key, value: raw })
}

/// Reads and parses an environment variable, falling back to `default` when unset.
///
/// # Arguments
/// * `key` - The environment variable key
/// * `default` - The value to use when the variable is not set
fn read_env_with_default<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_database_url_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("DATABASE_URL");
        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::MissingVar("DATABASE_URL"))));
    }

    #[test]
    fn defaults_match_spec() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        for key in [
            "TCP_HOST",
            "TCP_PORT",
            "BUFFER_SIZE",
            "MAX_CONNECTIONS",
            "IDLE_TIMEOUT_SECS",
            "SHUTDOWN_GRACE_SECS",
            "LOG_LEVEL",
            "DATABASE_POOL_SIZE",
        ] {
            std::env::remove_var(key);
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.tcp_host, "0.0.0.0");
        assert_eq!(config.tcp_port, 23000);
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.idle_timeout_secs, 600);
        assert_eq!(config.log_level, "info");
        std::env::remove_var("DATABASE_URL");
    }
}
