//! Built-in analytics over the database's own catalog: primary key coverage, size and
//! connection figures, index usage, table I/O and long-running statements.
//!
//! SQLite only exposes the schema side (`sqlite_master`, `pragma_table_info`); the
//! statistics views are read on Postgres.

use std::time::Duration;

use async_trait::async_trait;
use db::{ConnectionTrait, DBService, DatabaseBackend, QueryResult, Statement};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{
    analytics::{AnalyticsError, AnalyticsFinding, AnalyticsProvider, AnalyticsReport},
    storage::with_timeout,
};

/// Prefix of the feature tables produced by the pipeline.
const FEATURE_TABLE_PREFIX_LIKE: &str = r"'FE\_%' ESCAPE '\'";
const STATS_ROW_LIMIT: u64 = 10;
const LONG_QUERY_SECONDS: u64 = 5;
const QUERY_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct DatabaseStats {
    pub total_tables: i64,
    pub feature_tables: i64,
    /// Sessions currently executing a statement. Postgres only.
    pub active_connections: Option<i64>,
    pub size_bytes: Option<i64>,
    pub connection_healthy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct PrimaryKeyInfo {
    pub table_name: String,
    /// SQLite primary keys are unnamed.
    pub constraint_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct IndexUsage {
    pub table_name: String,
    pub index_name: String,
    pub idx_scan: i64,
    pub idx_tup_read: i64,
    pub idx_tup_fetch: i64,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct TableIoStats {
    pub table_name: String,
    pub seq_scan: i64,
    pub seq_tup_read: i64,
    pub idx_scan: i64,
    pub idx_tup_fetch: i64,
    pub n_tup_ins: i64,
    pub n_tup_upd: i64,
    pub n_tup_del: i64,
    pub n_tup_hot_upd: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct ActiveQuery {
    pub pid: i64,
    pub database: Option<String>,
    pub username: Option<String>,
    pub application_name: Option<String>,
    pub state: Option<String>,
    pub query: Option<String>,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct CatalogSnapshot {
    pub database: DatabaseStats,
    pub primary_keys: Vec<PrimaryKeyInfo>,
    pub tables_missing_pk: Vec<String>,
    pub index_usage: Vec<IndexUsage>,
    pub table_io: Vec<TableIoStats>,
    pub long_running_queries: Vec<ActiveQuery>,
}

/// Reads the catalog of the monitoring database itself.
#[derive(Clone)]
pub struct CatalogAnalytics {
    db: DBService,
    query_timeout: Duration,
}

impl CatalogAnalytics {
    pub fn new(db: DBService, query_timeout: Duration) -> Self {
        Self { db, query_timeout }
    }

    fn backend(&self) -> DatabaseBackend {
        self.db.pool.get_database_backend()
    }

    async fn query_all(&self, sql: &str) -> Result<Vec<QueryResult>, AnalyticsError> {
        let statement = Statement::from_string(self.backend(), sql.to_string());
        with_timeout(self.query_timeout, async {
            Ok(self.db.pool.query_all_raw(statement).await?)
        })
        .await
    }

    pub async fn primary_keys(&self) -> Result<Vec<PrimaryKeyInfo>, AnalyticsError> {
        let sql = match self.backend() {
            DatabaseBackend::Sqlite => r"
                SELECT m.name AS table_name, NULL AS constraint_name
                FROM sqlite_master m
                WHERE m.type = 'table'
                  AND m.name NOT LIKE 'sqlite\_%' ESCAPE '\'
                  AND EXISTS (SELECT 1 FROM pragma_table_info(m.name) p WHERE p.pk > 0)
                ORDER BY m.name",
            _ => "
                SELECT CAST(t.relname AS TEXT) AS table_name,
                       CAST(c.conname AS TEXT) AS constraint_name
                FROM pg_constraint c
                JOIN pg_class t ON c.conrelid = t.oid
                JOIN pg_namespace n ON t.relnamespace = n.oid
                WHERE c.contype = 'p' AND n.nspname = current_schema()
                ORDER BY t.relname",
        };

        let mut keys = Vec::new();
        for row in self.query_all(sql).await? {
            keys.push(PrimaryKeyInfo {
                table_name: row.try_get("", "table_name")?,
                constraint_name: row.try_get("", "constraint_name")?,
            });
        }
        Ok(keys)
    }

    pub async fn tables_missing_pk(&self) -> Result<Vec<String>, AnalyticsError> {
        let sql = match self.backend() {
            DatabaseBackend::Sqlite => r"
                SELECT m.name AS table_name
                FROM sqlite_master m
                WHERE m.type = 'table'
                  AND m.name NOT LIKE 'sqlite\_%' ESCAPE '\'
                  AND NOT EXISTS (SELECT 1 FROM pragma_table_info(m.name) p WHERE p.pk > 0)
                ORDER BY m.name",
            _ => "
                SELECT CAST(t.table_name AS TEXT) AS table_name
                FROM information_schema.tables t
                WHERE t.table_schema = current_schema()
                  AND t.table_type = 'BASE TABLE'
                  AND NOT EXISTS (
                      SELECT 1 FROM information_schema.table_constraints tc
                      WHERE tc.table_schema = t.table_schema
                        AND tc.table_name = t.table_name
                        AND tc.constraint_type = 'PRIMARY KEY')
                ORDER BY t.table_name",
        };

        let mut tables = Vec::new();
        for row in self.query_all(sql).await? {
            tables.push(row.try_get("", "table_name")?);
        }
        Ok(tables)
    }

    pub async fn database_stats(&self) -> Result<DatabaseStats, AnalyticsError> {
        let sql = match self.backend() {
            DatabaseBackend::Sqlite => format!(
                r"SELECT
                    (SELECT COUNT(*) FROM sqlite_master
                     WHERE type = 'table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\') AS total_tables,
                    (SELECT COUNT(*) FROM sqlite_master
                     WHERE type = 'table' AND name LIKE {FEATURE_TABLE_PREFIX_LIKE}) AS feature_tables,
                    NULL AS active_connections,
                    (SELECT page_count * page_size
                     FROM pragma_page_count(), pragma_page_size()) AS size_bytes"
            ),
            _ => format!(
                "SELECT
                    (SELECT COUNT(*) FROM information_schema.tables
                     WHERE table_schema = current_schema()
                       AND table_type = 'BASE TABLE') AS total_tables,
                    (SELECT COUNT(*) FROM information_schema.tables
                     WHERE table_schema = current_schema()
                       AND table_name LIKE {FEATURE_TABLE_PREFIX_LIKE}) AS feature_tables,
                    (SELECT COUNT(*) FROM pg_stat_activity
                     WHERE state = 'active') AS active_connections,
                    pg_database_size(current_database()) AS size_bytes"
            ),
        };

        let rows = self.query_all(&sql).await?;
        let Some(row) = rows.first() else {
            return Ok(DatabaseStats::default());
        };
        Ok(DatabaseStats {
            total_tables: row.try_get("", "total_tables")?,
            feature_tables: row.try_get("", "feature_tables")?,
            active_connections: row.try_get("", "active_connections")?,
            size_bytes: row.try_get("", "size_bytes")?,
            connection_healthy: self.db.ping().await.is_ok(),
        })
    }

    /// Least-scanned indexes first. Empty outside Postgres.
    pub async fn index_usage(&self) -> Result<Vec<IndexUsage>, AnalyticsError> {
        if self.backend() != DatabaseBackend::Postgres {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT CAST(relname AS TEXT) AS table_name,
                    CAST(indexrelname AS TEXT) AS index_name,
                    COALESCE(idx_scan, 0) AS idx_scan,
                    COALESCE(idx_tup_read, 0) AS idx_tup_read,
                    COALESCE(idx_tup_fetch, 0) AS idx_tup_fetch,
                    pg_relation_size(indexrelid) AS size_bytes
             FROM pg_stat_user_indexes
             WHERE schemaname = current_schema()
             ORDER BY idx_scan ASC
             LIMIT {STATS_ROW_LIMIT}"
        );

        let mut usage = Vec::new();
        for row in self.query_all(&sql).await? {
            usage.push(IndexUsage {
                table_name: row.try_get("", "table_name")?,
                index_name: row.try_get("", "index_name")?,
                idx_scan: row.try_get("", "idx_scan")?,
                idx_tup_read: row.try_get("", "idx_tup_read")?,
                idx_tup_fetch: row.try_get("", "idx_tup_fetch")?,
                size_bytes: row.try_get("", "size_bytes")?,
            });
        }
        Ok(usage)
    }

    /// Busiest tables by total scans. Empty outside Postgres.
    pub async fn table_io(&self) -> Result<Vec<TableIoStats>, AnalyticsError> {
        if self.backend() != DatabaseBackend::Postgres {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT CAST(relname AS TEXT) AS table_name,
                    COALESCE(seq_scan, 0) AS seq_scan,
                    COALESCE(seq_tup_read, 0) AS seq_tup_read,
                    COALESCE(idx_scan, 0) AS idx_scan,
                    COALESCE(idx_tup_fetch, 0) AS idx_tup_fetch,
                    COALESCE(n_tup_ins, 0) AS n_tup_ins,
                    COALESCE(n_tup_upd, 0) AS n_tup_upd,
                    COALESCE(n_tup_del, 0) AS n_tup_del,
                    COALESCE(n_tup_hot_upd, 0) AS n_tup_hot_upd
             FROM pg_stat_user_tables
             WHERE schemaname = current_schema()
             ORDER BY COALESCE(seq_scan, 0) + COALESCE(idx_scan, 0) DESC
             LIMIT {STATS_ROW_LIMIT}"
        );

        let mut stats = Vec::new();
        for row in self.query_all(&sql).await? {
            stats.push(TableIoStats {
                table_name: row.try_get("", "table_name")?,
                seq_scan: row.try_get("", "seq_scan")?,
                seq_tup_read: row.try_get("", "seq_tup_read")?,
                idx_scan: row.try_get("", "idx_scan")?,
                idx_tup_fetch: row.try_get("", "idx_tup_fetch")?,
                n_tup_ins: row.try_get("", "n_tup_ins")?,
                n_tup_upd: row.try_get("", "n_tup_upd")?,
                n_tup_del: row.try_get("", "n_tup_del")?,
                n_tup_hot_upd: row.try_get("", "n_tup_hot_upd")?,
            });
        }
        Ok(stats)
    }

    /// Other sessions' statements active for longer than five seconds. Empty outside
    /// Postgres.
    pub async fn long_running_queries(&self) -> Result<Vec<ActiveQuery>, AnalyticsError> {
        if self.backend() != DatabaseBackend::Postgres {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT CAST(pid AS BIGINT) AS pid,
                    CAST(datname AS TEXT) AS database,
                    CAST(usename AS TEXT) AS username,
                    application_name,
                    state,
                    query,
                    CAST(EXTRACT(EPOCH FROM now() - query_start) AS DOUBLE PRECISION)
                        AS duration_seconds
             FROM pg_stat_activity
             WHERE state = 'active'
               AND pid <> pg_backend_pid()
               AND now() - query_start > INTERVAL '{LONG_QUERY_SECONDS} seconds'
             ORDER BY duration_seconds DESC
             LIMIT {STATS_ROW_LIMIT}"
        );

        let mut queries = Vec::new();
        for row in self.query_all(&sql).await? {
            queries.push(ActiveQuery {
                pid: row.try_get("", "pid")?,
                database: row.try_get("", "database")?,
                username: row.try_get("", "username")?,
                application_name: row.try_get("", "application_name")?,
                state: row.try_get("", "state")?,
                query: row.try_get("", "query")?,
                duration_seconds: row.try_get("", "duration_seconds")?,
            });
        }
        Ok(queries)
    }

    pub async fn snapshot(&self) -> Result<CatalogSnapshot, AnalyticsError> {
        let database = self.database_stats().await?;
        let primary_keys = self.primary_keys().await?;
        let tables_missing_pk = self.tables_missing_pk().await?;

        // Statistics views can be restricted by role; their absence is not fatal.
        let index_usage = self
            .index_usage()
            .await
            .unwrap_or_else(|err| statistics_unavailable("index usage", err));
        let table_io = self
            .table_io()
            .await
            .unwrap_or_else(|err| statistics_unavailable("table I/O", err));
        let long_running_queries = self
            .long_running_queries()
            .await
            .unwrap_or_else(|err| statistics_unavailable("long-running queries", err));

        Ok(CatalogSnapshot {
            database,
            primary_keys,
            tables_missing_pk,
            index_usage,
            table_io,
            long_running_queries,
        })
    }
}

fn statistics_unavailable<T>(section: &str, err: AnalyticsError) -> Vec<T> {
    tracing::warn!(section, error = %err, "Catalog statistics unavailable");
    Vec::new()
}

#[async_trait]
impl AnalyticsProvider for CatalogAnalytics {
    fn name(&self) -> &str {
        "catalog"
    }

    async fn analyze(&self) -> Result<AnalyticsReport, AnalyticsError> {
        let snapshot = self.snapshot().await?;
        let (findings, recommendations) = assess(&snapshot);
        Ok(AnalyticsReport {
            provider: self.name().to_string(),
            available: true,
            findings,
            recommendations,
            catalog: Some(snapshot),
        })
    }
}

/// Turns catalog figures into findings and optimization hints.
pub fn assess(snapshot: &CatalogSnapshot) -> (Vec<AnalyticsFinding>, Vec<String>) {
    let mut findings = Vec::new();
    let mut recommendations = Vec::new();

    if !snapshot.tables_missing_pk.is_empty() {
        findings.push(AnalyticsFinding {
            category: "schema".to_string(),
            severity: "warning".to_string(),
            message: format!(
                "{} tables without primary keys: {}",
                snapshot.tables_missing_pk.len(),
                snapshot.tables_missing_pk.join(", ")
            ),
        });
        for table in &snapshot.tables_missing_pk {
            recommendations.push(format!("Add a primary key to `{table}`"));
        }
    }

    for index in snapshot.index_usage.iter().filter(|index| index.idx_scan == 0) {
        findings.push(AnalyticsFinding {
            category: "index".to_string(),
            severity: "warning".to_string(),
            message: format!(
                "Index `{}` on `{}` has never been scanned ({})",
                index.index_name,
                index.table_name,
                format_bytes(index.size_bytes)
            ),
        });
        recommendations.push(format!(
            "Consider removing or re-evaluating unused index `{}`",
            index.index_name
        ));
    }

    for query in &snapshot.long_running_queries {
        let preview: String = query
            .query
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(QUERY_PREVIEW_CHARS)
            .collect();
        findings.push(AnalyticsFinding {
            category: "query".to_string(),
            severity: "warning".to_string(),
            message: format!(
                "Statement running for {:.1}s on `{}`: {preview}",
                query.duration_seconds,
                query.database.as_deref().unwrap_or("unknown")
            ),
        });
    }
    if !snapshot.long_running_queries.is_empty() {
        recommendations.push(format!(
            "Optimize the {} statements running longer than {LONG_QUERY_SECONDS}s",
            snapshot.long_running_queries.len()
        ));
    }

    if !snapshot.database.connection_healthy {
        findings.push(AnalyticsFinding {
            category: "connection".to_string(),
            severity: "error".to_string(),
            message: "Database did not answer a ping".to_string(),
        });
    }

    (findings, recommendations)
}

/// Human-readable size, as `pg_size_pretty` would print it.
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["bytes", "kB", "MB", "GB", "TB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 10_240.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} bytes")
    } else {
        format!("{} {}", value.round() as i64, UNITS[unit])
    }
}
