use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

pub use sea_orm::{
    ConnectionTrait, DatabaseBackend, DbErr, QueryResult, Statement, TransactionTrait, sea_query,
};

pub mod entities;
pub mod models;
mod retry;
pub mod types;

pub type DbPool = DatabaseConnection;

/// Pool sizing applied when connecting.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Connections kept open at all times.
    pub pool_size: u32,
    /// Extra connections allowed under load on top of `pool_size`.
    pub max_overflow: u32,
    /// Connections older than this are closed and replaced.
    pub recycle: Duration,
    /// Upper bound on waiting for a connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pool_size: 5,
            max_overflow: 10,
            recycle: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Clone)]
pub struct DBService {
    pub pool: DbPool,
}

impl DBService {
    /// Connects with a bounded pool and applies pending migrations.
    pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<DBService, DbErr> {
        let mut options = ConnectOptions::new(database_url.to_string());
        // Every connection to an in-memory SQLite database sees its own empty database.
        let (min, max) = if is_sqlite_memory(database_url) {
            (1, 1)
        } else {
            let min = settings.pool_size.max(1);
            (min, min.saturating_add(settings.max_overflow))
        };
        options
            .min_connections(min)
            .max_connections(max)
            .max_lifetime(settings.recycle)
            .acquire_timeout(settings.acquire_timeout)
            .connect_timeout(settings.acquire_timeout)
            .sqlx_logging(false);

        let pool = Database::connect(options).await?;
        db_migration::Migrator::up(&pool, None).await?;
        tracing::info!(
            backend = ?pool.get_database_backend(),
            min_connections = min,
            max_connections = max,
            "Database pool ready"
        );
        Ok(DBService { pool })
    }

    /// Wraps an existing connection, for callers that manage migrations themselves.
    pub fn from_connection(pool: DbPool) -> DBService {
        DBService { pool }
    }

    /// Round-trips a trivial statement and reports how long it took.
    pub async fn ping(&self) -> Result<Duration, DbErr> {
        let started = std::time::Instant::now();
        self.pool.ping().await?;
        Ok(started.elapsed())
    }

    pub async fn close(self) -> Result<(), DbErr> {
        self.pool.close().await
    }
}

fn is_sqlite_memory(url: &str) -> bool {
    url.starts_with("sqlite:") && (url.contains(":memory:") || url.contains("mode=memory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_in_memory_sqlite_urls() {
        assert!(is_sqlite_memory("sqlite::memory:"));
        assert!(is_sqlite_memory("sqlite://file:etl?mode=memory&cache=shared"));
        assert!(!is_sqlite_memory("sqlite://./monitor.db?mode=rwc"));
        assert!(!is_sqlite_memory("postgres://postgres@localhost:5432/dbcp"));
    }

    #[tokio::test]
    async fn connect_runs_migrations_and_pings() {
        let db = DBService::connect("sqlite::memory:", &PoolSettings::default())
            .await
            .unwrap();
        let elapsed = db.ping().await.unwrap();
        assert!(elapsed < Duration::from_secs(5));

        let summary = models::dashboard_summary::DashboardSummary::fetch(&db.pool)
            .await
            .unwrap();
        assert_eq!(summary.total_runs, 0);

        db.close().await.unwrap();
    }
}
