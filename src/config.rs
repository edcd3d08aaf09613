use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::rate_limit::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
use crate::store::RetryPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {key} has invalid value `{value}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub url: String,
    pub from: String,
    pub credentials: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_pool_size: u32,
    pub public_base_url: String,
    pub mail: MailConfig,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub store_retry: RetryPolicy,
}

impl Config {
    pub fn read_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, `read_env` uses the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let credentials = match (lookup("SMTP_USERNAME"), lookup("SMTP_PASSWORD")) {
            (Some(username), Some(password)) => Some((username, password)),
            (None, None) => None,
            _ => {
                warn!("only one of SMTP_USERNAME and SMTP_PASSWORD is set, sending unauthenticated");
                None
            }
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_pool_size: at_least_one(
                "DATABASE_POOL_SIZE",
                parse_or(&lookup, "DATABASE_POOL_SIZE", 20)?,
            )?,
            public_base_url: required("PUBLIC_BASE_URL")?,
            mail: MailConfig {
                url: required("SMTP_URL")?,
                from: required("SMTP_FROM")?,
                credentials,
            },
            rate_limit_max: parse_or(&lookup, "RATE_LIMIT_MAX", DEFAULT_MAX_REQUESTS)?,
            rate_limit_window: Duration::from_secs(parse_or(
                &lookup,
                "RATE_LIMIT_WINDOW_SECS",
                DEFAULT_WINDOW.as_secs(),
            )?),
            store_retry: RetryPolicy {
                max_attempts: parse_or(&lookup, "STORE_RETRY_ATTEMPTS", 3)?,
                base_delay: Duration::from_millis(parse_or(
                    &lookup,
                    "STORE_RETRY_BASE_DELAY_MS",
                    1000,
                )?),
            },
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        }
    }
}

/// r2d2 panics when asked for a pool of zero connections.
fn at_least_one(key: &'static str, value: u32) -> Result<u32, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be at least 1".to_owned(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("DATABASE_URL", "postgres://letter@localhost/letter"),
        ("PUBLIC_BASE_URL", "https://letter.example.org"),
        ("SMTP_URL", "smtp://127.0.0.1:1025"),
        ("SMTP_FROM", "Open Letter Team <letter@example.org>"),
    ];

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&REQUIRED)).expect("valid config");

        assert_eq!(config.database_pool_size, 20);
        assert_eq!(config.rate_limit_max, 5);
        assert_eq!(config.rate_limit_window, Duration::from_secs(3600));
        assert_eq!(config.store_retry.max_attempts, 3);
        assert_eq!(config.store_retry.base_delay, Duration::from_secs(1));
        assert!(config.mail.credentials.is_none());
    }

    #[test]
    fn overrides_and_credentials() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("RATE_LIMIT_MAX", "10"),
            ("RATE_LIMIT_WINDOW_SECS", "60"),
            ("SMTP_USERNAME", "mailer"),
            ("SMTP_PASSWORD", "secret"),
        ]);

        let config = Config::from_lookup(lookup(&pairs)).expect("valid config");

        assert_eq!(config.rate_limit_max, 10);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(
            config.mail.credentials,
            Some(("mailer".to_owned(), "secret".to_owned()))
        );
    }

    #[test]
    fn missing_required_variable() {
        let err = Config::from_lookup(lookup(&REQUIRED[1..])).expect_err("no database url");
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn invalid_number() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RATE_LIMIT_MAX", "many"));

        let err = Config::from_lookup(lookup(&pairs)).expect_err("not a number");
        assert!(matches!(err, ConfigError::Invalid { key: "RATE_LIMIT_MAX", .. }));
    }

    #[test]
    fn empty_pool_is_refused() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DATABASE_POOL_SIZE", "0"));

        let err = Config::from_lookup(lookup(&pairs)).expect_err("zero connections");
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "DATABASE_POOL_SIZE",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            }
        );

        pairs.pop();
        pairs.push(("DATABASE_POOL_SIZE", "1"));
        let config = Config::from_lookup(lookup(&pairs)).expect("single connection");
        assert_eq!(config.database_pool_size, 1);
    }
}
