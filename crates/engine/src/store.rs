use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use common::{DataOrigin, Error, Result};

use crate::orchestrator::BacktestReport;

/// Listing entry for a stored run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRun {
    pub id: Uuid,
    pub pair: String,
    pub interval: String,
    pub origin: DataOrigin,
    pub total_return: f64,
    pub win_rate: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub created_at: DateTime<Utc>,
}

/// Persistence for backtest reports.
#[async_trait]
pub trait BacktestStore: Send + Sync {
    async fn save(&self, report: &BacktestReport) -> Result<Uuid>;

    async fn load(&self, id: Uuid) -> Result<Option<BacktestReport>>;

    /// Most recent runs first.
    async fn recent(&self, limit: usize) -> Result<Vec<StoredRun>>;
}

pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Apply the workspace migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.db)
            .await
            .map_err(|e| Error::Database(e.into()))?;
        info!("Backtest store migrated");
        Ok(())
    }
}

fn origin_str(origin: DataOrigin) -> &'static str {
    match origin {
        DataOrigin::Exchange => "exchange",
        DataOrigin::Synthetic => "synthetic",
    }
}

fn parse_origin(raw: &str) -> Result<DataOrigin> {
    match raw {
        "exchange" => Ok(DataOrigin::Exchange),
        "synthetic" => Ok(DataOrigin::Synthetic),
        other => Err(Error::Other(format!("unknown data origin '{other}'"))),
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("bad timestamp '{raw}': {e}")))
}

#[async_trait]
impl BacktestStore for SqliteStore {
    async fn save(&self, report: &BacktestReport) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let result = &report.result;
        let json = serde_json::to_string(report)?;

        sqlx::query(
            r#"
            INSERT INTO backtests
                (id, pair, interval, origin, start_time, end_time, total_return,
                 win_rate, max_drawdown, total_trades, result_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(id.to_string())
        .bind(&result.params.pair)
        .bind(&result.params.interval)
        .bind(origin_str(report.origin))
        .bind(result.start_time.to_rfc3339())
        .bind(result.end_time.to_rfc3339())
        .bind(result.metrics.total_return)
        .bind(result.metrics.win_rate)
        .bind(result.metrics.max_drawdown)
        .bind(result.metrics.total_trades as i64)
        .bind(json)
        .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.db)
        .await?;

        debug!(id = %id, pair = %result.params.pair, "Backtest saved");
        Ok(id)
    }

    async fn load(&self, id: Uuid) -> Result<Option<BacktestReport>> {
        let row = sqlx::query("SELECT result_json FROM backtests WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(row) => {
                let json: String = row.try_get("result_json")?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredRun>> {
        let rows = sqlx::query(
            r#"
            SELECT id, pair, interval, origin, total_return, win_rate, max_drawdown,
                   total_trades, created_at
            FROM backtests
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| -> Result<StoredRun> {
                let id: String = row.try_get("id")?;
                let origin: String = row.try_get("origin")?;
                let created_at: String = row.try_get("created_at")?;
                let total_trades: i64 = row.try_get("total_trades")?;
                Ok(StoredRun {
                    id: Uuid::parse_str(&id).map_err(|e| Error::Other(e.to_string()))?,
                    pair: row.try_get("pair")?,
                    interval: row.try_get("interval")?,
                    origin: parse_origin(&origin)?,
                    total_return: row.try_get("total_return")?,
                    win_rate: row.try_get("win_rate")?,
                    max_drawdown: row.try_get("max_drawdown")?,
                    total_trades: total_trades.max(0) as usize,
                    created_at: parse_time(&created_at)?,
                })
            })
            .collect()
    }
}
