use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ElectionError, Result};

const DEFAULT_DATABASE_URL: &str = "sqlite:trusty_elect.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_FINAL_SCRUTINY_ROUND: u32 = 3;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub rules: ElectionRules,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
}

/// Rules of order applied when closing a scrutiny round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionRules {
    /// The round at which plurality decides if nobody reached a majority.
    pub final_scrutiny_round: u32,
}

impl Default for ElectionRules {
    fn default() -> Self {
        Self {
            final_scrutiny_round: DEFAULT_FINAL_SCRUTINY_ROUND,
        }
    }
}

impl ElectionRules {
    pub fn new(final_scrutiny_round: u32) -> Result<Self> {
        if final_scrutiny_round == 0 {
            return Err(ElectionError::Config(
                "final scrutiny round must be at least 1".to_string(),
            ));
        }
        Ok(Self { final_scrutiny_round })
    }
}

impl DatabaseConfig {
    /// A private in-memory store, used by tests.
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

impl Config {
    /// Load configuration from the process environment (after `.env`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ElectionError::Config(
                "DATABASE_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }
        let busy_timeout_ms = parse_or(&lookup, "DATABASE_BUSY_TIMEOUT_MS", DEFAULT_BUSY_TIMEOUT_MS)?;
        let final_round = parse_or(&lookup, "FINAL_SCRUTINY_ROUND", DEFAULT_FINAL_SCRUTINY_ROUND)?;

        Ok(Self {
            database: DatabaseConfig {
                url,
                max_connections,
                busy_timeout: Duration::from_millis(busy_timeout_ms),
            },
            rules: ElectionRules::new(final_round)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ElectionError::Config(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.database.url, DEFAULT_DATABASE_URL);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.busy_timeout, Duration::from_secs(5));
        assert_eq!(config.rules.final_scrutiny_round, 3);
    }

    #[test]
    fn values_are_read_from_lookup() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("DATABASE_MAX_CONNECTIONS", "2"),
            ("DATABASE_BUSY_TIMEOUT_MS", "250"),
            ("FINAL_SCRUTINY_ROUND", " 4 "),
        ]))
        .unwrap();
        assert!(config.database.is_in_memory());
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.database.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.rules.final_scrutiny_round, 4);
    }

    #[test]
    fn rejects_bad_values() {
        let err = Config::from_lookup(lookup_from(&[("FINAL_SCRUTINY_ROUND", "three")])).unwrap_err();
        assert!(matches!(err, ElectionError::Config(_)));

        let err = Config::from_lookup(lookup_from(&[("FINAL_SCRUTINY_ROUND", "0")])).unwrap_err();
        assert!(matches!(err, ElectionError::Config(_)));

        let err = Config::from_lookup(lookup_from(&[("DATABASE_MAX_CONNECTIONS", "0")])).unwrap_err();
        assert!(matches!(err, ElectionError::Config(_)));
    }
}
