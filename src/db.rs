use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use log::{debug, error, info, warn};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Decimal;
use sqlx::{Column, Row, TypeInfo};
use uuid::Uuid;

use crate::error::DashboardError;
use crate::models::{ColumnMap, RawRow, ServiceRecord, TIMESTAMP_FORMAT};
use crate::normalize::normalize_rows;

pub const DEFAULT_TABLE: &str = "atendimentos";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Postgres {
        database_url: Option<String>,
        table: String,
    },
    CsvFile(PathBuf),
}

/// One fetch-and-normalize pass. A failed load carries its notice and no
/// records.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub records: Vec<ServiceRecord>,
    pub dropped_rows: usize,
    pub notice: Option<DashboardError>,
    pub loaded_at: DateTime<Local>,
}

impl Snapshot {
    pub fn failed(notice: DashboardError) -> Self {
        Self {
            records: Vec::new(),
            dropped_rows: 0,
            notice: Some(notice),
            loaded_at: Local::now(),
        }
    }
}

pub async fn fetch_and_normalize(
    source: &SourceConfig,
    columns: &ColumnMap,
) -> Result<Snapshot, DashboardError> {
    let rows = fetch_rows(source).await?;
    let normalized = normalize_rows(&rows, columns)?;
    if normalized.dropped_rows > 0 {
        warn!(
            "{} of {} rows dropped during normalization",
            normalized.dropped_rows,
            rows.len()
        );
    }
    info!("loaded {} service records", normalized.records.len());

    Ok(Snapshot {
        records: normalized.records,
        dropped_rows: normalized.dropped_rows,
        notice: None,
        loaded_at: Local::now(),
    })
}

/// Like [`fetch_and_normalize`], but a failure degrades to an empty snapshot
/// carrying the error as a notice.
pub async fn load_snapshot(source: &SourceConfig, columns: &ColumnMap) -> Snapshot {
    match fetch_and_normalize(source, columns).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            if err.is_source_failure() {
                warn!("refresh failed: {err}");
            } else {
                error!("refresh failed: {err}");
            }
            Snapshot::failed(err)
        }
    }
}

pub async fn fetch_rows(source: &SourceConfig) -> Result<Vec<RawRow>, DashboardError> {
    match source {
        SourceConfig::Postgres {
            database_url,
            table,
        } => {
            let url = database_url
                .as_deref()
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| {
                    DashboardError::DataSourceUnavailable("DATABASE_URL is not set".to_string())
                })?;
            fetch_postgres(url, table).await
        }
        SourceConfig::CsvFile(path) => read_csv(path),
    }
}

async fn fetch_postgres(database_url: &str, table: &str) -> Result<Vec<RawRow>, DashboardError> {
    if !is_valid_table_name(table) {
        return Err(DashboardError::QueryFailure(format!(
            "invalid table name `{table}`"
        )));
    }

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .map_err(|e| {
            DashboardError::DataSourceUnavailable(format!("failed to connect to Postgres: {e}"))
        })?;

    let query = format!("SELECT * FROM {table}");
    let result = sqlx::query(&query).fetch_all(&pool).await;
    pool.close().await;

    let rows = result.map_err(|e| DashboardError::QueryFailure(e.to_string()))?;
    debug!("fetched {} rows from {table}", rows.len());

    let mut undecodable = HashSet::new();
    Ok(rows
        .iter()
        .map(|row| decode_row(row, &mut undecodable))
        .collect())
}

fn is_valid_table_name(table: &str) -> bool {
    !table.is_empty()
        && table.split('.').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// How a Postgres column is read into a raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Bool,
    Timestamp,
    TimestampTz,
    Date,
    Uuid,
    Json,
    Text,
}

fn column_kind(type_name: &str) -> ColumnKind {
    match type_name {
        "INT2" => ColumnKind::Int2,
        "INT4" => ColumnKind::Int4,
        "INT8" => ColumnKind::Int8,
        "FLOAT4" => ColumnKind::Float4,
        "FLOAT8" => ColumnKind::Float8,
        "NUMERIC" => ColumnKind::Numeric,
        "BOOL" => ColumnKind::Bool,
        "TIMESTAMP" => ColumnKind::Timestamp,
        "TIMESTAMPTZ" => ColumnKind::TimestampTz,
        "DATE" => ColumnKind::Date,
        "UUID" => ColumnKind::Uuid,
        "JSON" | "JSONB" => ColumnKind::Json,
        _ => ColumnKind::Text,
    }
}

// Exact text keeps the scale; the normalizer parses it like a CSV cell.
fn numeric_value(value: Decimal) -> Value {
    Value::from(value.to_string())
}

fn uuid_value(value: Uuid) -> Value {
    Value::from(value.hyphenated().to_string())
}

fn timestamp_value(value: NaiveDateTime) -> Value {
    Value::from(value.format(TIMESTAMP_FORMAT).to_string())
}

fn timestamptz_value(value: DateTime<Utc>) -> Value {
    Value::from(value.with_timezone(&Local).to_rfc3339())
}

fn date_value(value: NaiveDate) -> Value {
    Value::from(value.format("%Y-%m-%d").to_string())
}

/// Columns that fail to decode come through as null. Each one is reported
/// once per fetch in `undecodable`.
fn decode_row(row: &PgRow, undecodable: &mut HashSet<String>) -> RawRow {
    let mut raw = RawRow::new();
    for column in row.columns() {
        let type_name = column.type_info().name();
        let value = match decode_column(row, column.ordinal(), column_kind(type_name)) {
            Ok(value) => value,
            Err(err) => {
                if undecodable.insert(column.name().to_string()) {
                    warn!(
                        "column `{}` ({type_name}) cannot be decoded and is read as null: {err}",
                        column.name()
                    );
                }
                Value::Null
            }
        };
        raw.insert(column.name().to_string(), value);
    }
    raw
}

fn decode_column(row: &PgRow, index: usize, kind: ColumnKind) -> Result<Value, sqlx::Error> {
    let value = match kind {
        ColumnKind::Int2 => row.try_get::<Option<i16>, _>(index)?.map(Value::from),
        ColumnKind::Int4 => row.try_get::<Option<i32>, _>(index)?.map(Value::from),
        ColumnKind::Int8 => row.try_get::<Option<i64>, _>(index)?.map(Value::from),
        ColumnKind::Float4 => row
            .try_get::<Option<f32>, _>(index)?
            .map(|f| Value::from(f64::from(f))),
        ColumnKind::Float8 => row.try_get::<Option<f64>, _>(index)?.map(Value::from),
        ColumnKind::Numeric => row.try_get::<Option<Decimal>, _>(index)?.map(numeric_value),
        ColumnKind::Bool => row.try_get::<Option<bool>, _>(index)?.map(Value::from),
        ColumnKind::Timestamp => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(timestamp_value),
        ColumnKind::TimestampTz => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(timestamptz_value),
        ColumnKind::Date => row.try_get::<Option<NaiveDate>, _>(index)?.map(date_value),
        ColumnKind::Uuid => row.try_get::<Option<Uuid>, _>(index)?.map(uuid_value),
        ColumnKind::Json => row.try_get::<Option<Value>, _>(index)?,
        ColumnKind::Text => row.try_get::<Option<String>, _>(index)?.map(Value::from),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Reads a CSV snapshot with a header row. Empty cells are null.
pub fn read_csv(path: &Path) -> Result<Vec<RawRow>, DashboardError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        DashboardError::DataSourceUnavailable(format!("cannot open {}: {e}", path.display()))
    })?;
    let headers = reader
        .headers()
        .map_err(|e| DashboardError::QueryFailure(e.to_string()))?
        .clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| DashboardError::QueryFailure(e.to_string()))?;
        let mut raw = RawRow::new();
        for (name, cell) in headers.iter().zip(record.iter()) {
            let value = if cell.trim().is_empty() {
                Value::Null
            } else {
                Value::from(cell)
            };
            raw.insert(name.to_string(), value);
        }
        rows.push(raw);
    }

    debug!("read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}
