use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, warn};
use serde_json::Value;

use crate::error::DashboardError;
use crate::models::{
    ColumnMap, InterestLevel, Purchase, RawRow, ServiceRecord, TIMESTAMP_FORMAT, UNASSIGNED_AGENT,
    UNSPECIFIED_PROJECT,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normalized {
    pub records: Vec<ServiceRecord>,
    pub dropped_rows: usize,
}

/// Cleans a batch of raw rows into canonical records.
///
/// The whole batch is rejected when no row carries a usable timestamp. Rows
/// with an unusable timestamp or id, and repeated ids, are dropped with a
/// warning. Every other field is defaulted rather than rejected.
pub fn normalize_rows(rows: &[RawRow], columns: &ColumnMap) -> Result<Normalized, DashboardError> {
    if rows.is_empty() {
        return Ok(Normalized::default());
    }

    if !rows.iter().any(|row| row.contains_key(&columns.timestamp)) {
        return Err(DashboardError::Schema(format!(
            "timestamp column `{}` is missing",
            columns.timestamp
        )));
    }

    let mut records = Vec::with_capacity(rows.len());
    let mut seen_ids = HashSet::new();
    let mut parsed_timestamps = 0usize;
    let mut dropped_rows = 0usize;

    for (position, row) in rows.iter().enumerate() {
        let Some(timestamp) = parse_timestamp(row.get(&columns.timestamp)) else {
            warn!(
                "row {position}: unparseable `{}` value {:?}, row dropped",
                columns.timestamp,
                row.get(&columns.timestamp)
            );
            dropped_rows += 1;
            continue;
        };
        parsed_timestamps += 1;

        let Some(id) = parse_id(row.get(&columns.id)) else {
            warn!("row {position}: missing or non-integer `{}`, row dropped", columns.id);
            dropped_rows += 1;
            continue;
        };

        if !seen_ids.insert(id) {
            warn!("row {position}: duplicate id {id}, keeping the first occurrence");
            dropped_rows += 1;
            continue;
        }

        records.push(normalize_row(row, columns, id, timestamp));
    }

    if parsed_timestamps == 0 {
        return Err(DashboardError::Schema(format!(
            "no row has a parseable `{}` value",
            columns.timestamp
        )));
    }

    debug!("normalized {} rows, dropped {dropped_rows}", records.len());
    Ok(Normalized {
        records,
        dropped_rows,
    })
}

fn normalize_row(
    row: &RawRow,
    columns: &ColumnMap,
    id: i64,
    timestamp: NaiveDateTime,
) -> ServiceRecord {
    let extra = row
        .iter()
        .filter(|(column, _)| !columns.is_mapped(column))
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect();

    ServiceRecord {
        id,
        timestamp,
        lead_name: text(row.get(&columns.lead_name)).unwrap_or_default(),
        agent_name: text(row.get(&columns.agent_name))
            .unwrap_or_else(|| UNASSIGNED_AGENT.to_string()),
        city: text(row.get(&columns.city)),
        project: text(row.get(&columns.project))
            .unwrap_or_else(|| UNSPECIFIED_PROJECT.to_string()),
        purchased_first_lot: parse_purchase(row.get(&columns.purchased_first_lot)),
        interest_level: parse_interest(row.get(&columns.interest_level)),
        was_attended: parse_attended(row.get(&columns.was_attended)),
        satisfaction_score: parse_score(row.get(&columns.satisfaction_score)),
        extra,
    }
}

/// Non-blank text content of a value. Numbers and booleans are rendered.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn parse_timestamp(value: Option<&Value>) -> Option<NaiveDateTime> {
    let Value::String(raw) = value? else {
        return None;
    };
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local());
    }
    for format in [TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn parse_id(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric coercion of a satisfaction score. Fractions truncate; anything
/// outside 0..=5 becomes 0 ("not rated").
pub fn parse_score(value: Option<&Value>) -> u8 {
    let numeric = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match numeric {
        Some(score) if score.is_finite() && (0.0..6.0).contains(&score) => score.trunc() as u8,
        _ => 0,
    }
}

fn parse_purchase(value: Option<&Value>) -> Purchase {
    match value {
        Some(Value::Bool(true)) => Purchase::Yes,
        Some(Value::Number(n)) if n.as_i64() == Some(1) => Purchase::Yes,
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "yes" | "y" | "sim" | "s" | "true" | "1" => Purchase::Yes,
            _ => Purchase::No,
        },
        _ => Purchase::No,
    }
}

fn parse_interest(value: Option<&Value>) -> InterestLevel {
    let Some(label) = text(value) else {
        return InterestLevel::Unclassified;
    };

    match label.to_lowercase().as_str() {
        "high" | "alto" | "alta" => InterestLevel::High,
        "medium" | "médio" | "medio" | "média" | "media" => InterestLevel::Medium,
        "low" | "baixo" | "baixa" => InterestLevel::Low,
        _ => InterestLevel::Unclassified,
    }
}

fn parse_attended(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "yes" | "sim" | "true" | "1" => Some(true),
            "no" | "não" | "nao" | "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
