// src/config.rs
use crate::error::ConfigError;
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Scylla,
    Memory,
}

impl FromStr for LedgerBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scylla" => Ok(LedgerBackend::Scylla),
            "memory" => Ok(LedgerBackend::Memory),
            other => Err(ConfigError::InvalidValue {
                key: "LEDGER_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub backend: LedgerBackend,
    pub scylla_node: String,
    pub api_key: String,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub starting_cash: Decimal,
}

impl Config {
    /// Reads configuration from the process environment, after loading `.env`
    /// if one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = parse_or(&lookup, "LISTEN_ADDR", "127.0.0.1:3030")?;
        let backend = parse_or(&lookup, "LEDGER_BACKEND", "scylla")?;
        let scylla_node = lookup("SCYLLA_NODE").unwrap_or_else(|| "127.0.0.1:9042".to_string());
        let api_key = required(&lookup, "ALPHAVANTAGE_API_KEY")?;
        let jwt_secret = required(&lookup, "JWT_SECRET")?;
        let ttl_secs: u64 = parse_or(&lookup, "TOKEN_TTL_SECS", "3600")?;
        let starting_cash: Decimal = parse_or(&lookup, "STARTING_CASH", "10000")?;
        if starting_cash.is_sign_negative() {
            return Err(ConfigError::InvalidValue {
                key: "STARTING_CASH",
                value: starting_cash.to_string(),
            });
        }

        Ok(Config {
            listen_addr,
            backend,
            scylla_node,
            api_key,
            jwt_secret,
            token_ttl: Duration::from_secs(ttl_secs),
            starting_cash,
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingKey(key)),
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value: raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secrets_are_set() {
        let config = Config::from_lookup(lookup_from(&[
            ("ALPHAVANTAGE_API_KEY", "demo"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:3030".parse().unwrap());
        assert_eq!(config.backend, LedgerBackend::Scylla);
        assert_eq!(config.scylla_node, "127.0.0.1:9042");
        assert_eq!(config.token_ttl, Duration::from_secs(3600));
        assert_eq!(config.starting_cash, dec!(10000));
    }

    #[test]
    fn api_key_is_required() {
        let err = Config::from_lookup(lookup_from(&[("JWT_SECRET", "secret")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("ALPHAVANTAGE_API_KEY")));
    }

    #[test]
    fn blank_jwt_secret_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("ALPHAVANTAGE_API_KEY", "demo"),
            ("JWT_SECRET", "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("JWT_SECRET")));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("ALPHAVANTAGE_API_KEY", "demo"),
            ("JWT_SECRET", "secret"),
            ("LEDGER_BACKEND", "Memory"),
            ("STARTING_CASH", "2500.50"),
            ("TOKEN_TTL_SECS", "60"),
        ]))
        .unwrap();

        assert_eq!(config.backend, LedgerBackend::Memory);
        assert_eq!(config.starting_cash, dec!(2500.50));
        assert_eq!(config.token_ttl, Duration::from_secs(60));
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = Config::from_lookup(lookup_from(&[
            ("ALPHAVANTAGE_API_KEY", "demo"),
            ("JWT_SECRET", "secret"),
            ("STARTING_CASH", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "STARTING_CASH",
                ..
            }
        ));

        let err = Config::from_lookup(lookup_from(&[
            ("ALPHAVANTAGE_API_KEY", "demo"),
            ("JWT_SECRET", "secret"),
            ("LEDGER_BACKEND", "postgres"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "LEDGER_BACKEND",
                ..
            }
        ));
    }
}
