use std::{env, str::FromStr, time::Duration};

use secrecy::SecretString;
use thiserror::Error;
use tracing::warn;
use url::Url;

mod schema;

pub use schema::{
    AlertConfig, CacheConfig, DEFAULT_MONITORED_TABLES, DEFAULT_TIMESTAMP_COLUMN, DashboardConfig,
    DatabaseConfig, MonitoredTable, QueryLimits, ServerConfig, default_monitored_tables,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl DashboardConfig {
    pub fn from_env() -> Self {
        Self::from_env_with(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source. Invalid values fall back
    /// to their defaults with a warning.
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get_env = |name: &str| {
            get_env(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database = DatabaseConfig {
            url: get_env("DATABASE_URL"),
            host: get_env("DB_HOST").unwrap_or(defaults.database.host),
            user: get_env("DB_USER").unwrap_or(defaults.database.user),
            password: get_env("DB_PASSWORD")
                .map(SecretString::from)
                .unwrap_or(defaults.database.password),
            port: read_env("DB_PORT", defaults.database.port, &get_env),
            name: get_env("DB_NAME").unwrap_or(defaults.database.name),
            pool_size: normalize_min(
                read_env("DB_POOL_SIZE", defaults.database.pool_size, &get_env),
                "DB_POOL_SIZE",
            ),
            max_overflow: read_env("DB_MAX_OVERFLOW", defaults.database.max_overflow, &get_env),
            pool_recycle: read_env_duration(
                "DB_POOL_RECYCLE",
                defaults.database.pool_recycle,
                &get_env,
            ),
            query_timeout: nonzero_duration(
                read_env_duration("QUERY_TIMEOUT", defaults.database.query_timeout, &get_env),
                "QUERY_TIMEOUT",
                defaults.database.query_timeout,
            ),
        };

        let cache = CacheConfig {
            health_ttl: read_env_duration("CACHE_TTL_HEALTH", defaults.cache.health_ttl, &get_env),
            data_ttl: read_env_duration("CACHE_TTL_DATA", defaults.cache.data_ttl, &get_env),
            metrics_ttl: read_env_duration(
                "CACHE_TTL_METRICS",
                defaults.cache.metrics_ttl,
                &get_env,
            ),
            max_entries: normalize_min(
                read_env("CACHE_MAX_ENTRIES", defaults.cache.max_entries, &get_env),
                "CACHE_MAX_ENTRIES",
            ),
        };

        let max_limit = normalize_min(
            read_env("QUERY_MAX_LIMIT", defaults.limits.max_limit, &get_env),
            "QUERY_MAX_LIMIT",
        );
        let max_window_days = normalize_min(
            read_env("QUERY_MAX_WINDOW_DAYS", defaults.limits.max_window_days, &get_env),
            "QUERY_MAX_WINDOW_DAYS",
        );
        let limits = QueryLimits {
            default_limit: normalize_min(
                read_env("QUERY_DEFAULT_LIMIT", defaults.limits.default_limit, &get_env),
                "QUERY_DEFAULT_LIMIT",
            )
            .min(max_limit),
            max_limit,
            default_window_days: normalize_min(
                read_env(
                    "QUERY_DEFAULT_WINDOW_DAYS",
                    defaults.limits.default_window_days,
                    &get_env,
                ),
                "QUERY_DEFAULT_WINDOW_DAYS",
            )
            .min(max_window_days),
            max_window_days,
        };

        let webhook_url = get_env("ALERT_WEBHOOK_URL")
            .or_else(|| get_env("SLACK_WEBHOOK_URL"))
            .and_then(|raw| match Url::parse(&raw) {
                Ok(url) => Some(url),
                Err(err) => {
                    warn!("Invalid alert webhook URL: {err}. Alerts disabled.");
                    None
                }
            });
        let enabled = read_env_bool("ENABLE_ALERTS", &get_env)
            .or_else(|| read_env_bool("ENABLE_SLACK_ALERTS", &get_env))
            .unwrap_or(webhook_url.is_some());
        let alerts = AlertConfig {
            enabled: enabled && webhook_url.is_some(),
            webhook_url,
            threshold_failures: normalize_min(
                read_env(
                    "ALERT_THRESHOLD_FAILURES",
                    defaults.alerts.threshold_failures,
                    &get_env,
                ),
                "ALERT_THRESHOLD_FAILURES",
            ),
        };

        let monitored_tables = match get_env("MONITORED_TABLES") {
            Some(raw) => {
                let tables = parse_monitored_tables(&raw);
                if tables.is_empty() {
                    warn!("MONITORED_TABLES has no valid entries. Using defaults.");
                    defaults.monitored_tables
                } else {
                    tables
                }
            }
            None => defaults.monitored_tables,
        };

        let server = ServerConfig {
            host: get_env("HOST").unwrap_or(defaults.server.host),
            port: match get_env("BACKEND_PORT").or_else(|| get_env("PORT")) {
                Some(raw) => parse_or_default("BACKEND_PORT", &raw, defaults.server.port),
                None => {
                    tracing::info!("No PORT environment variable set, using port 0 for auto-assignment");
                    defaults.server.port
                }
            },
        };

        Self {
            database,
            cache,
            limits,
            alerts,
            monitored_tables,
            server,
        }
    }
}

/// Parses `name[:timestamp_column]` entries separated by commas.
pub fn parse_monitored_tables(raw: &str) -> Vec<MonitoredTable> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            let (name, column) = match entry.split_once(':') {
                Some((name, column)) => (name.trim(), Some(column.trim())),
                None => (entry, None),
            };
            if !is_valid_identifier(name) {
                if !entry.is_empty() {
                    warn!("Ignoring invalid monitored table '{entry}'");
                }
                return None;
            }
            match column {
                Some(column) if is_valid_identifier(column) => {
                    Some(MonitoredTable::new(name).with_timestamp_column(column))
                }
                Some(column) => {
                    warn!("Ignoring invalid timestamp column '{column}' for {name}");
                    Some(MonitoredTable::new(name))
                }
                None => Some(MonitoredTable::new(name)),
            }
        })
        .collect()
}

/// Table and column names are spliced into SQL, so only plain identifiers are accepted.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_or_default<T>(name: &str, value: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match value.parse::<T>() {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("Invalid {name}='{value}': {err}. Using default {default}.");
            default
        }
    }
}

fn read_env<T, F>(name: &str, default: T, get_env: &F) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get_env(name) {
        Some(value) => parse_or_default(name, &value, default),
        None => default,
    }
}

fn read_env_duration<F>(name: &str, default: Duration, get_env: &F) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    match get_env(name) {
        Some(value) => match value.parse::<u64>() {
            Ok(parsed) => Duration::from_secs(parsed),
            Err(err) => {
                warn!(
                    "Invalid {name}='{value}': {err}. Using default {}.",
                    default.as_secs()
                );
                default
            }
        },
        None => default,
    }
}

fn read_env_bool<F>(name: &str, get_env: &F) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let value = get_env(name)?;
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!("Invalid {name}='{value}'. Ignoring.");
            None
        }
    }
}

fn normalize_min<T>(value: T, name: &str) -> T
where
    T: PartialOrd + From<u8> + std::fmt::Display,
{
    let one = T::from(1);
    if value < one {
        warn!("{name} set to {value}. Using minimum value 1.");
        one
    } else {
        value
    }
}

fn nonzero_duration(value: Duration, name: &str, default: Duration) -> Duration {
    if value.is_zero() {
        warn!("{name} set to 0. Using default {}.", default.as_secs());
        default
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults_are_used_without_env() {
        let cfg = DashboardConfig::from_env_with(|_| None);

        assert!(cfg.database.url.is_none());
        assert_eq!(cfg.database.host, "localhost");
        assert_eq!(cfg.database.user, "postgres");
        assert_eq!(cfg.database.port, 5432);
        assert_eq!(cfg.database.name, "dbcp");
        assert_eq!(cfg.database.pool_size, 5);
        assert_eq!(cfg.database.max_overflow, 10);
        assert_eq!(cfg.database.pool_recycle.as_secs(), 300);
        assert_eq!(cfg.database.query_timeout.as_secs(), 15);
        assert_eq!(cfg.cache.health_ttl.as_secs(), 120);
        assert_eq!(cfg.cache.data_ttl.as_secs(), 180);
        assert_eq!(cfg.cache.metrics_ttl.as_secs(), 300);
        assert_eq!(cfg.limits.default_limit, 50);
        assert_eq!(cfg.limits.max_limit, 1000);
        assert_eq!(cfg.limits.default_window_days, 7);
        assert_eq!(cfg.limits.max_window_days, 90);
        assert!(!cfg.alerts.enabled);
        assert_eq!(cfg.alerts.threshold_failures, 5);
        assert_eq!(cfg.monitored_tables.len(), DEFAULT_MONITORED_TABLES.len());
        assert_eq!(cfg.server.port, 0);
        assert_eq!(
            cfg.database.connection_url().unwrap(),
            "postgres://postgres@localhost:5432/dbcp"
        );
    }

    #[test]
    fn overrides_apply_and_invalid_values_fall_back() {
        let mut envs = HashMap::new();
        envs.insert("DB_HOST", "db.internal".to_string());
        envs.insert("DB_PASSWORD", "s3cr:t".to_string());
        envs.insert("DB_PORT", "not-a-port".to_string());
        envs.insert("DB_POOL_SIZE", "0".to_string());
        envs.insert("QUERY_TIMEOUT", "0".to_string());
        envs.insert("CACHE_TTL_DATA", "60".to_string());
        envs.insert("QUERY_DEFAULT_LIMIT", "5000".to_string());
        envs.insert("QUERY_MAX_LIMIT", "200".to_string());
        envs.insert("BACKEND_PORT", " 8080 ".to_string());

        let cfg = DashboardConfig::from_env_with(|key| envs.get(key).cloned());

        assert_eq!(cfg.database.host, "db.internal");
        assert_eq!(cfg.database.password.expose_secret(), "s3cr:t");
        assert_eq!(cfg.database.port, 5432);
        assert_eq!(cfg.database.pool_size, 1);
        assert_eq!(cfg.database.query_timeout.as_secs(), 15);
        assert_eq!(cfg.cache.data_ttl.as_secs(), 60);
        assert_eq!(cfg.limits.max_limit, 200);
        assert_eq!(cfg.limits.default_limit, 200);
        assert_eq!(cfg.server.port, 8080);

        let url = cfg.database.connection_url().unwrap();
        assert!(url.starts_with("postgres://postgres:"));
        assert!(url.ends_with("@db.internal:5432/dbcp"));
        assert!(!url.contains("s3cr:t"));
    }

    #[test]
    fn database_url_takes_precedence() {
        let cfg = DashboardConfig::from_env_with(|key| {
            (key == "DATABASE_URL").then(|| "sqlite::memory:".to_string())
        });
        assert_eq!(cfg.database.connection_url().unwrap(), "sqlite::memory:");
    }

    #[test]
    fn alerts_follow_webhook_and_switch() {
        let mut envs = HashMap::new();
        envs.insert("SLACK_WEBHOOK_URL", "https://hooks.example.com/T000".to_string());
        let cfg = DashboardConfig::from_env_with(|key| envs.get(key).cloned());
        assert!(cfg.alerts.enabled);
        assert!(cfg.alerts.active_webhook().is_some());

        envs.insert("ENABLE_ALERTS", "false".to_string());
        let cfg = DashboardConfig::from_env_with(|key| envs.get(key).cloned());
        assert!(!cfg.alerts.enabled);
        assert!(cfg.alerts.active_webhook().is_none());

        let cfg = DashboardConfig::from_env_with(|key| {
            (key == "ENABLE_ALERTS").then(|| "true".to_string())
        });
        assert!(!cfg.alerts.enabled);
    }

    #[test]
    fn monitored_tables_parse_optional_timestamp_column() {
        let tables =
            parse_monitored_tables("FE_DMV_ALL, prices:updated_at ,bad-name, x:drop table,");
        assert_eq!(
            tables,
            vec![
                MonitoredTable::new("FE_DMV_ALL"),
                MonitoredTable::new("prices").with_timestamp_column("updated_at"),
                MonitoredTable::new("x"),
            ]
        );
    }

    #[test]
    fn identifiers_reject_sql_fragments() {
        assert!(is_valid_identifier("FE_MOMENTUM_SIGNALS"));
        assert!(is_valid_identifier("_staging1"));
        assert!(!is_valid_identifier("1table"));
        assert!(!is_valid_identifier("prices; DROP TABLE etl_runs"));
        assert!(!is_valid_identifier(""));
    }
}
