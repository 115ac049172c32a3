use crate::domain::LendingPolicy;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/library";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// 設定値の読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{key} must be {requirement}")]
    OutOfRange {
        key: &'static str,
        requirement: &'static str,
    },
}

/// サービスの実行時設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub policy: LendingPolicy,
}

impl AppConfig {
    /// 環境変数から読み込む。未設定の項目は既定値。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 任意のキー参照関数から読み込む
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LendingPolicy::default();

        let policy = LendingPolicy {
            loan_period_days: parse_or(&lookup, "LOAN_PERIOD_DAYS", defaults.loan_period_days)?,
            daily_rate: parse_or(&lookup, "FINE_DAILY_RATE", defaults.daily_rate)?,
            max_fine: parse_or(&lookup, "FINE_MAX", defaults.max_fine)?,
            max_active_borrowings: parse_or(
                &lookup,
                "MAX_ACTIVE_BORROWINGS",
                defaults.max_active_borrowings,
            )?,
        };

        if policy.loan_period_days <= 0 {
            return Err(ConfigError::OutOfRange {
                key: "LOAN_PERIOD_DAYS",
                requirement: "at least 1",
            });
        }
        if policy.daily_rate < Decimal::ZERO {
            return Err(ConfigError::OutOfRange {
                key: "FINE_DAILY_RATE",
                requirement: "non-negative",
            });
        }
        if policy.max_fine < Decimal::ZERO {
            return Err(ConfigError::OutOfRange {
                key: "FINE_MAX",
                requirement: "non-negative",
            });
        }

        let db_max_connections =
            parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;
        if db_max_connections == 0 {
            return Err(ConfigError::OutOfRange {
                key: "DB_MAX_CONNECTIONS",
                requirement: "at least 1",
            });
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            db_max_connections,
            policy,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.database_url, "postgres://localhost/library");
        assert_eq!(config.policy, LendingPolicy::default());
    }

    #[test]
    fn test_policy_values_are_read_from_environment() {
        let config = config_from(&[
            ("LOAN_PERIOD_DAYS", "21"),
            ("FINE_DAILY_RATE", "0.25"),
            ("FINE_MAX", "5.00"),
            ("MAX_ACTIVE_BORROWINGS", "3"),
            ("PORT", "8080"),
        ])
        .unwrap();

        assert_eq!(config.policy.loan_period_days, 21);
        assert_eq!(config.policy.daily_rate, dec!(0.25));
        assert_eq!(config.policy.max_fine, dec!(5.00));
        assert_eq!(config.policy.max_active_borrowings, 3);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_unparseable_value_is_rejected() {
        assert_eq!(
            config_from(&[("FINE_DAILY_RATE", "fifty cents")]).unwrap_err(),
            ConfigError::InvalidValue {
                key: "FINE_DAILY_RATE",
                value: "fifty cents".into()
            }
        );
    }

    #[test]
    fn test_zero_loan_period_is_rejected() {
        assert!(matches!(
            config_from(&[("LOAN_PERIOD_DAYS", "0")]),
            Err(ConfigError::OutOfRange {
                key: "LOAN_PERIOD_DAYS",
                ..
            })
        ));
    }
}
