use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::{
    ConnectionTrait, DBService, DbErr,
    sea_query::{Alias, Expr, ExprTrait, Func, Query},
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use ts_rs::TS;
use utils::time::parse_timestamp;

use super::config::MonitoredTable;

#[derive(Debug, Clone, PartialEq)]
pub struct TableDetail {
    pub row_count: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Round trips needed to inspect monitored tables.
#[async_trait]
pub trait TableCatalog: Send + Sync {
    /// Which of `names` exist, in a single query.
    async fn existing_tables(&self, names: &[String]) -> Result<HashSet<String>, DbErr>;

    /// Row count and latest timestamp of one table, in a single query.
    async fn table_detail(&self, table: &MonitoredTable) -> Result<TableDetail, DbErr>;
}

/// Catalog backed by the monitoring database itself.
#[derive(Clone)]
pub struct SqlTableCatalog {
    db: DBService,
}

impl SqlTableCatalog {
    pub fn new(db: DBService) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TableCatalog for SqlTableCatalog {
    async fn existing_tables(&self, names: &[String]) -> Result<HashSet<String>, DbErr> {
        if names.is_empty() {
            return Ok(HashSet::new());
        }

        let query = match self.db.pool.get_database_backend() {
            db::DatabaseBackend::Sqlite => Query::select()
                .expr_as(Expr::col(Alias::new("name")), Alias::new("name"))
                .from(Alias::new("sqlite_master"))
                .and_where(Expr::col(Alias::new("type")).eq("table"))
                .and_where(Expr::col(Alias::new("name")).is_in(names.iter().cloned()))
                .to_owned(),
            _ => Query::select()
                .expr_as(Expr::cust("CAST(table_name AS TEXT)"), Alias::new("name"))
                .from((Alias::new("information_schema"), Alias::new("tables")))
                .and_where(Expr::col(Alias::new("table_schema")).eq(Expr::cust("current_schema()")))
                .and_where(Expr::col(Alias::new("table_name")).is_in(names.iter().cloned()))
                .to_owned(),
        };

        let rows = self.db.pool.query_all(&query).await?;
        let mut existing = HashSet::with_capacity(rows.len());
        for row in rows {
            existing.insert(row.try_get::<String>("", "name")?);
        }
        Ok(existing)
    }

    async fn table_detail(&self, table: &MonitoredTable) -> Result<TableDetail, DbErr> {
        let query = Query::select()
            .expr_as(Expr::cust("COUNT(*)"), Alias::new("row_count"))
            .expr_as(
                Func::cast_as(
                    Func::max(Expr::col(Alias::new(table.timestamp_column.as_str()))),
                    Alias::new("TEXT"),
                ),
                Alias::new("last_updated"),
            )
            .from(Alias::new(table.name.as_str()))
            .to_owned();

        let Some(row) = self.db.pool.query_one(&query).await? else {
            return Ok(TableDetail {
                row_count: 0,
                last_updated: None,
            });
        };
        let row_count: i64 = row.try_get("", "row_count")?;
        let raw: Option<String> = row.try_get("", "last_updated")?;
        let last_updated = raw.as_deref().and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                tracing::debug!(table = %table.name, raw, "unparseable table timestamp");
            }
            parsed
        });
        Ok(TableDetail {
            row_count,
            last_updated,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TableState {
    Active,
    Missing,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TableHealth {
    Good,
    Warning,
    Critical,
    Unknown,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Freshness {
    VeryFresh,
    Fresh,
    Recent,
    Stale,
    Old,
    VeryOld,
    Unknown,
}

impl Freshness {
    pub fn from_age_hours(age_hours: Option<f64>) -> Self {
        match age_hours {
            None => Freshness::Unknown,
            Some(h) if h < 1.0 => Freshness::VeryFresh,
            Some(h) if h < 6.0 => Freshness::Fresh,
            Some(h) if h < 24.0 => Freshness::Recent,
            Some(h) if h < 72.0 => Freshness::Stale,
            Some(h) if h < 168.0 => Freshness::Old,
            Some(_) => Freshness::VeryOld,
        }
    }
}

pub fn classify_health(row_count: i64, age_hours: Option<f64>) -> TableHealth {
    if row_count == 0 {
        return TableHealth::Warning;
    }
    match age_hours {
        Some(h) if h < 24.0 => TableHealth::Good,
        Some(h) if h < 72.0 => TableHealth::Warning,
        Some(_) => TableHealth::Critical,
        None => TableHealth::Unknown,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct TableStatus {
    pub table_name: String,
    pub status: TableState,
    pub health: TableHealth,
    pub row_count: Option<i64>,
    pub last_updated: Option<DateTime<Utc>>,
    pub age_hours: Option<f64>,
    pub freshness: Freshness,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct TableStatusReport {
    pub checked_at: Option<DateTime<Utc>>,
    pub tables: Vec<TableStatus>,
    pub existing_tables: usize,
    pub missing_tables: usize,
    pub total_rows: i64,
}

impl TableStatus {
    fn missing(name: &str) -> Self {
        Self {
            table_name: name.to_string(),
            status: TableState::Missing,
            health: TableHealth::Critical,
            row_count: None,
            last_updated: None,
            age_hours: None,
            freshness: Freshness::Unknown,
            error: None,
        }
    }

    fn failed(name: &str, err: &DbErr) -> Self {
        Self {
            table_name: name.to_string(),
            status: TableState::Error,
            health: TableHealth::Error,
            row_count: None,
            last_updated: None,
            age_hours: None,
            freshness: Freshness::Unknown,
            error: Some(err.to_string()),
        }
    }

    fn active(name: &str, detail: TableDetail, now: DateTime<Utc>) -> Self {
        let age_hours = detail.last_updated.map(|ts| {
            let hours = Ord::max((now - ts).num_seconds(), 0) as f64 / 3600.0;
            (hours * 10.0).round() / 10.0
        });
        Self {
            table_name: name.to_string(),
            status: TableState::Active,
            health: classify_health(detail.row_count, age_hours),
            row_count: Some(detail.row_count),
            last_updated: detail.last_updated,
            age_hours,
            freshness: Freshness::from_age_hours(age_hours),
            error: None,
        }
    }
}

/// One existence query for all tables, then one detail query per table that exists.
pub async fn collect_table_status(
    catalog: &dyn TableCatalog,
    tables: &[MonitoredTable],
    now: DateTime<Utc>,
) -> Result<TableStatusReport, DbErr> {
    let names: Vec<String> = tables.iter().map(|table| table.name.clone()).collect();
    let existing = catalog.existing_tables(&names).await?;

    let details = join_all(
        tables
            .iter()
            .filter(|table| existing.contains(&table.name))
            .map(|table| async move { (table.name.as_str(), catalog.table_detail(table).await) }),
    )
    .await;

    let mut detail_iter = details.into_iter();
    let mut report = TableStatusReport {
        checked_at: Some(now),
        ..Default::default()
    };
    for table in tables {
        let status = if existing.contains(&table.name) {
            report.existing_tables += 1;
            match detail_iter.next() {
                Some((_, Ok(detail))) => TableStatus::active(&table.name, detail, now),
                Some((name, Err(err))) => {
                    tracing::warn!(table = name, error = %err, "Failed to inspect monitored table");
                    TableStatus::failed(&table.name, &err)
                }
                None => TableStatus::missing(&table.name),
            }
        } else {
            report.missing_tables += 1;
            TableStatus::missing(&table.name)
        };
        report.total_rows += status.row_count.unwrap_or(0);
        report.tables.push(status);
    }
    Ok(report)
}
