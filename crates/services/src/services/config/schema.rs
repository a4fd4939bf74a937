use std::time::Duration;

use db::PoolSettings;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use url::Url;

use super::ConfigError;

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_USER: &str = "postgres";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_NAME: &str = "dbcp";
pub const DEFAULT_POOL_SIZE: u32 = 5;
pub const DEFAULT_MAX_OVERFLOW: u32 = 10;
pub const DEFAULT_POOL_RECYCLE_SECS: u64 = 300;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 15;

pub const DEFAULT_CACHE_TTL_HEALTH_SECS: u64 = 120;
pub const DEFAULT_CACHE_TTL_DATA_SECS: u64 = 180;
pub const DEFAULT_CACHE_TTL_METRICS_SECS: u64 = 300;
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 1000;

pub const DEFAULT_QUERY_LIMIT: u64 = 50;
pub const DEFAULT_MAX_QUERY_LIMIT: u64 = 1000;
pub const DEFAULT_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_MAX_WINDOW_DAYS: i64 = 90;

pub const DEFAULT_ALERT_THRESHOLD_FAILURES: u64 = 5;
pub const DEFAULT_TIMESTAMP_COLUMN: &str = "timestamp";

pub const DEFAULT_MONITORED_TABLES: [&str; 9] = [
    "FE_MOMENTUM_SIGNALS",
    "FE_OSCILLATORS_SIGNALS",
    "FE_RATIOS_SIGNALS",
    "FE_METRICS_SIGNAL",
    "FE_TVV_SIGNALS",
    "FE_DMV_ALL",
    "FE_DMV_SCORES",
    "FE_MOMENTUM",
    "FE_OSCILLATORS",
];

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the individual parts.
    pub url: Option<String>,
    pub host: String,
    pub user: String,
    pub password: SecretString,
    pub port: u16,
    pub name: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub pool_recycle: Duration,
    pub query_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: DEFAULT_DB_HOST.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: SecretString::from(String::new()),
            port: DEFAULT_DB_PORT,
            name: DEFAULT_DB_NAME.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            max_overflow: DEFAULT_MAX_OVERFLOW,
            pool_recycle: Duration::from_secs(DEFAULT_POOL_RECYCLE_SECS),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        let mut url = Url::parse("postgres://localhost")
            .map_err(|err| ConfigError::InvalidUrl(err.to_string()))?;
        url.set_host(Some(&self.host))
            .map_err(|err| ConfigError::InvalidUrl(format!("DB_HOST: {err}")))?;
        url.set_port(Some(self.port))
            .map_err(|_| ConfigError::InvalidUrl("DB_PORT".to_string()))?;
        url.set_username(&self.user)
            .map_err(|_| ConfigError::InvalidUrl("DB_USER".to_string()))?;
        let password = self.password.expose_secret();
        if !password.is_empty() {
            url.set_password(Some(password))
                .map_err(|_| ConfigError::InvalidUrl("DB_PASSWORD".to_string()))?;
        }
        url.set_path(&self.name);
        Ok(url.to_string())
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            pool_size: self.pool_size,
            max_overflow: self.max_overflow,
            recycle: self.pool_recycle,
            acquire_timeout: self.query_timeout,
        }
    }
}

/// Time-to-live per cached data class.
#[derive(Debug, Clone, Serialize)]
pub struct CacheConfig {
    pub health_ttl: Duration,
    pub data_ttl: Duration,
    pub metrics_ttl: Duration,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            health_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_HEALTH_SECS),
            data_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_DATA_SECS),
            metrics_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_METRICS_SECS),
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

/// Bounds applied to every listing on the read path.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueryLimits {
    pub default_limit: u64,
    pub max_limit: u64,
    pub default_window_days: i64,
    pub max_window_days: i64,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_QUERY_LIMIT,
            max_limit: DEFAULT_MAX_QUERY_LIMIT,
            default_window_days: DEFAULT_WINDOW_DAYS,
            max_window_days: DEFAULT_MAX_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub webhook_url: Option<Url>,
    pub enabled: bool,
    /// Failed runs in the last day at which the health report raises an alert.
    pub threshold_failures: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            enabled: false,
            threshold_failures: DEFAULT_ALERT_THRESHOLD_FAILURES,
        }
    }
}

impl AlertConfig {
    pub fn active_webhook(&self) -> Option<&Url> {
        if self.enabled {
            self.webhook_url.as_ref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoredTable {
    pub name: String,
    pub timestamp_column: String,
}

impl MonitoredTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN.to_string(),
        }
    }

    pub fn with_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.timestamp_column = column.into();
        self
    }
}

pub fn default_monitored_tables() -> Vec<MonitoredTable> {
    DEFAULT_MONITORED_TABLES
        .iter()
        .map(|name| MonitoredTable::new(*name))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// 0 asks the OS for a free port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub limits: QueryLimits,
    pub alerts: AlertConfig,
    pub monitored_tables: Vec<MonitoredTable>,
    pub server: ServerConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            limits: QueryLimits::default(),
            alerts: AlertConfig::default(),
            monitored_tables: default_monitored_tables(),
            server: ServerConfig::default(),
        }
    }
}
