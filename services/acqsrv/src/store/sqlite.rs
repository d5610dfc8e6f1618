//! SQLite configuration store
//!
//! Reads the `servers`, `sources` and `source_statuses` tables maintained by
//! the configuration frontend. Protocol details live in JSON `meta` columns:
//!
//! | Table | Gateway-owned fields |
//! |-------|----------------------|
//! | `servers` | `meta.lastConnect` |
//! | `sources` | `meta.lastValue` |
//! | `source_statuses` | whole row, poll outputs in `meta` |

use std::str::FromStr;
use std::time::Duration;

use acq_model::{
    DataPoint, Device, DeviceCode, DeviceMeta, PointCode, PointId, PointMeta, PointStatus,
    Reading,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use super::ConfigStore;

const SERVER_COLUMNS: &str = "code, name, meta, is_active, timeout";
const SOURCE_COLUMNS: &str = "id, code, server_code, name, is_active, scheduler_interval, meta";

/// Poll outputs kept in `source_statuses.meta`
#[derive(Debug, Default, Serialize, Deserialize)]
struct StatusMeta {
    #[serde(default)]
    reading: Option<Reading>,
    #[serde(default)]
    derived: Option<f64>,
    #[serde(default)]
    accumulated: Option<f64>,
    #[serde(default)]
    note: Option<String>,
}

/// sqlx-backed store over the shared configuration database
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to an existing database, e.g. `sqlite:data/acqsrv.db`
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url {url}"))?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open {url}"))?;

        info!("Configuration store connected: {}", url);
        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if the database is accessible
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn json_meta(&self, table: &str, key: &str, id: i64) -> Result<Map<String, Value>> {
        let sql = format!("SELECT meta FROM {table} WHERE {key} = ?");
        let raw: Option<Option<String>> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let raw = raw.ok_or_else(|| anyhow!("{table} row {id} not found"))?;
        Ok(parse_object(raw.as_deref()))
    }
}

fn parse_object(raw: Option<&str>) -> Map<String, Value> {
    match raw.map(serde_json::from_str::<Value>) {
        Some(Ok(Value::Object(map))) => map,
        _ => Map::new(),
    }
}

fn device_from_row(row: &SqliteRow) -> Result<Device> {
    let code: i64 = row.try_get("code")?;
    let meta = parse_object(row.try_get::<Option<String>, _>("meta")?.as_deref());

    let last_connect = meta
        .get("lastConnect")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));
    let device_meta = serde_json::from_value::<DeviceMeta>(Value::Object(meta))
        .unwrap_or_else(|e| {
            warn!(device = code, "Unreadable device meta: {}", e);
            DeviceMeta::Unsupported
        });

    Ok(Device {
        code,
        name: row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
        is_active: row.try_get::<Option<bool>, _>("is_active")?.unwrap_or(false),
        timeout: row
            .try_get::<Option<i64>, _>("timeout")?
            .and_then(|t| u64::try_from(t).ok()),
        meta: device_meta,
        last_connect,
    })
}

fn point_from_row(row: &SqliteRow) -> Result<DataPoint> {
    let id: i64 = row.try_get("id")?;
    let mut meta = parse_object(row.try_get::<Option<String>, _>("meta")?.as_deref());

    let cached_last_value = meta.remove("lastValue").and_then(Reading::from_json);
    let point_meta = serde_json::from_value::<PointMeta>(Value::Object(meta)).unwrap_or_else(|e| {
        warn!(point = id, "Unreadable point meta: {}", e);
        PointMeta::Unsupported
    });

    Ok(DataPoint {
        id,
        code: row.try_get("code")?,
        // Detached points (server deleted) reference no device
        device_code: row.try_get::<Option<i64>, _>("server_code")?.unwrap_or(0),
        name: row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
        is_active: row.try_get::<Option<bool>, _>("is_active")?.unwrap_or(false),
        scheduler_interval: row
            .try_get::<Option<i64>, _>("scheduler_interval")?
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(1),
        meta: point_meta,
        cached_last_value,
    })
}

fn status_from_row(row: &SqliteRow) -> Result<PointStatus> {
    let meta: StatusMeta = row
        .try_get::<Option<String>, _>("meta")?
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    Ok(PointStatus {
        point_code: row.try_get("source_code")?,
        is_connected: row.try_get::<Option<bool>, _>("is_connected")?.unwrap_or(false),
        failure_count: row
            .try_get::<Option<i64>, _>("connection_attempts")?
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0),
        last_sync_at: row.try_get("last_sync_at")?,
        last_connection_at: row.try_get("last_connection_at")?,
        reading: meta.reading,
        derived: meta.derived,
        accumulated: meta.accumulated,
        note: meta.note,
    })
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn active_devices(&self) -> Result<Vec<Device>> {
        let sql = format!("SELECT {SERVER_COLUMNS} FROM servers WHERE is_active = 1 ORDER BY code");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(device_from_row).collect()
    }

    async fn device(&self, code: DeviceCode) -> Result<Option<Device>> {
        let sql = format!("SELECT {SERVER_COLUMNS} FROM servers WHERE code = ?");
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn record_device_connect(&self, code: DeviceCode, at: DateTime<Utc>) -> Result<()> {
        let mut meta = self.json_meta("servers", "code", code).await?;
        meta.insert("lastConnect".into(), Value::String(at.to_rfc3339()));

        sqlx::query("UPDATE servers SET meta = ?, updated_at = ? WHERE code = ?")
            .bind(Value::Object(meta).to_string())
            .bind(Utc::now())
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn active_points(&self) -> Result<Vec<DataPoint>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE is_active = 1 ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(point_from_row).collect()
    }

    async fn all_points(&self) -> Result<Vec<DataPoint>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(point_from_row).collect()
    }

    async fn point(&self, id: PointId) -> Result<Option<DataPoint>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(point_from_row).transpose()
    }

    async fn cache_point_value(&self, id: PointId, value: &Reading) -> Result<()> {
        let mut meta = self.json_meta("sources", "id", id).await?;
        meta.insert("lastValue".into(), serde_json::to_value(value)?);

        sqlx::query("UPDATE sources SET meta = ?, updated_at = ? WHERE id = ?")
            .bind(Value::Object(meta).to_string())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn status_get_or_create(&self, point: PointCode) -> Result<PointStatus> {
        if let Some(status) = self.status(point).await? {
            return Ok(status);
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO source_statuses \
             (source_code, is_connected, connection_attempts, meta, created_at, updated_at) \
             VALUES (?, 0, 0, '{}', ?, ?)",
        )
        .bind(point)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(PointStatus::new(point))
    }

    async fn status(&self, point: PointCode) -> Result<Option<PointStatus>> {
        let row = sqlx::query(
            "SELECT source_code, is_connected, connection_attempts, last_sync_at, \
             last_connection_at, meta FROM source_statuses WHERE source_code = ? \
             ORDER BY id LIMIT 1",
        )
        .bind(point)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(status_from_row).transpose()
    }

    async fn save_status(&self, status: &PointStatus) -> Result<()> {
        let meta = StatusMeta {
            reading: status.reading.clone(),
            derived: status.derived,
            accumulated: status.accumulated,
            note: status.note.clone(),
        };
        let meta = serde_json::to_string(&meta)?;
        let now = Utc::now();

        let updated = sqlx::query(
            "UPDATE source_statuses SET is_connected = ?, connection_attempts = ?, \
             last_sync_at = ?, last_connection_at = ?, meta = ?, updated_at = ? \
             WHERE source_code = ?",
        )
        .bind(status.is_connected)
        .bind(i64::from(status.failure_count))
        .bind(status.last_sync_at)
        .bind(status.last_connection_at)
        .bind(&meta)
        .bind(now)
        .bind(status.point_code)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO source_statuses (source_code, is_connected, connection_attempts, \
                 last_sync_at, last_connection_at, meta, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(status.point_code)
            .bind(status.is_connected)
            .bind(i64::from(status.failure_count))
            .bind(status.last_sync_at)
            .bind(status.last_connection_at)
            .bind(&meta)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_tolerates_garbage() {
        assert!(parse_object(None).is_empty());
        assert!(parse_object(Some("not json")).is_empty());
        assert!(parse_object(Some("[1, 2]")).is_empty());
        assert_eq!(parse_object(Some(r#"{"kind":"http"}"#)).len(), 1);
    }
}
