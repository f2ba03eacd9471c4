//! Typed configuration surface, loaded once at startup from environment
//! variables. Follows the teacher's `main.rs` discipline of reading each
//! required variable directly and panicking with a clear message if it is
//! absent, generalised into one struct instead of inline `env::var` calls
//! scattered through `main`.

use std::env;

use crate::cdc::ReplicationConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub log_level: String,
    pub replication: ReplicationConfig,
    /// Samples per second the analysis bridge assumes (`settings.SAMPLING_RATE`).
    pub sampling_rate: u32,
    /// Concurrent analysis engine slots (`MATLAB_ENGINE_POOL_SIZE` upstream).
    pub analysis_pool_size: usize,
    pub max_connections: usize,
    pub deepseek_api_key: Option<String>,
}

fn env_var(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("{name} must be set"))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| panic!("{name} is not a valid value")),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env_var("DATABASE_URL"),
            bind_addr: env_var_or("BIND_ADDR", "0.0.0.0:8080"),
            log_level: env_var_or("LOG_LEVEL", "info"),
            replication: ReplicationConfig {
                host: env_var("BINLOG_HOST"),
                port: env_parse_or("BINLOG_PORT", 3306u16),
                user: env_var("BINLOG_USER"),
                password: env_var("BINLOG_PASSWORD"),
                server_id: env_parse_or("BINLOG_SERVER_ID", 100u32),
            },
            sampling_rate: env_parse_or("SAMPLING_RATE", 125u32),
            analysis_pool_size: env_parse_or("ANALYSIS_POOL_SIZE", 200usize),
            max_connections: env_parse_or("MAX_CONNECTIONS", 1000usize),
            deepseek_api_key: env::var("DEEPSEEK_API_KEY").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_or_falls_back_on_missing_var() {
        assert_eq!(env_parse_or::<u32>("TELEMETRY_SERVER_TEST_UNSET_VAR", 125), 125);
    }
}
