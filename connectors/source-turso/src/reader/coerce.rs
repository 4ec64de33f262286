//! Raw value to canonical value coercion.
//!
//! Coercion is strict: a value that does not fit its column's canonical
//! type is an error, never a best-effort guess.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat};
use tursotap_types::catalog::{CanonicalType, ColumnSchema};
use tursotap_types::cursor::ReplicationValue;
use tursotap_types::record::FieldValue;

use crate::connection::SqlValue;

/// Julian day number of 1970-01-01T00:00:00Z.
const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Coerce one raw value to `column`'s canonical type.
pub(crate) fn coerce(value: &SqlValue, column: &ColumnSchema) -> Result<FieldValue, String> {
    if value.is_null() {
        return Ok(FieldValue::Null);
    }
    if let SqlValue::MalformedText(bytes) = value {
        if !column.is_base64_encoded {
            return Err(format!(
                "text value is not valid UTF-8 ({} bytes)",
                bytes.len()
            ));
        }
    }
    match column.canonical_type {
        CanonicalType::Integer => to_integer(value),
        CanonicalType::Number => to_number(value),
        CanonicalType::Boolean => to_boolean(value),
        CanonicalType::String if column.is_base64_encoded => to_base64(value),
        CanonicalType::String if column.is_temporal => to_timestamp(value),
        CanonicalType::String => to_string(value),
    }
}

fn to_integer(value: &SqlValue) -> Result<FieldValue, String> {
    match value {
        SqlValue::Integer(v) => Ok(FieldValue::Integer(*v)),
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        SqlValue::Real(v) if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64 => {
            Ok(FieldValue::Integer(*v as i64))
        }
        SqlValue::Real(v) => Err(format!("{v} is not an integer")),
        SqlValue::Text(s) => s
            .trim()
            .parse()
            .map(FieldValue::Integer)
            .map_err(|_| format!("'{s}' is not an integer")),
        other => Err(format!("{} value is not an integer", other.type_name())),
    }
}

fn to_number(value: &SqlValue) -> Result<FieldValue, String> {
    let n = match value {
        #[allow(clippy::cast_precision_loss)]
        SqlValue::Integer(v) => *v as f64,
        SqlValue::Real(v) => *v,
        SqlValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number"))?,
        other => return Err(format!("{} value is not a number", other.type_name())),
    };
    if n.is_finite() {
        Ok(FieldValue::Number(n))
    } else {
        Err(format!("{n} is not a finite number"))
    }
}

fn to_boolean(value: &SqlValue) -> Result<FieldValue, String> {
    match value {
        SqlValue::Integer(0) => Ok(FieldValue::Boolean(false)),
        SqlValue::Integer(1) => Ok(FieldValue::Boolean(true)),
        SqlValue::Real(v) if *v == 0.0 => Ok(FieldValue::Boolean(false)),
        SqlValue::Real(v) if *v == 1.0 => Ok(FieldValue::Boolean(true)),
        SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "t" => Ok(FieldValue::Boolean(true)),
            "0" | "false" | "f" => Ok(FieldValue::Boolean(false)),
            _ => Err(format!("'{s}' is not a boolean")),
        },
        SqlValue::Integer(v) => Err(format!("{v} is not a boolean (expected 0 or 1)")),
        other => Err(format!("{} value is not a boolean", other.type_name())),
    }
}

fn to_base64(value: &SqlValue) -> Result<FieldValue, String> {
    match value {
        SqlValue::Blob(bytes) => Ok(FieldValue::String(STANDARD.encode(bytes))),
        SqlValue::Text(s) => Ok(FieldValue::String(STANDARD.encode(s.as_bytes()))),
        SqlValue::MalformedText(bytes) => Ok(FieldValue::String(STANDARD.encode(bytes))),
        other => Err(format!("{} value in a blob column", other.type_name())),
    }
}

fn to_string(value: &SqlValue) -> Result<FieldValue, String> {
    Ok(FieldValue::String(match value {
        SqlValue::Text(s) => s.clone(),
        SqlValue::Integer(v) => v.to_string(),
        SqlValue::Real(v) => v.to_string(),
        SqlValue::Blob(bytes) => STANDARD.encode(bytes),
        SqlValue::Null => return Ok(FieldValue::Null),
        SqlValue::MalformedText(_) => return Err("text value is not valid UTF-8".to_string()),
    }))
}

/// Normalize date/time text to RFC 3339. Text without an offset is UTC,
/// as SQLite's own date functions assume.
fn normalize_temporal_text(s: &str) -> Option<String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(ndt.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn unix_seconds_to_iso(secs: i64, nanos: u32) -> Option<String> {
    DateTime::from_timestamp(secs, nanos).map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn to_timestamp(value: &SqlValue) -> Result<FieldValue, String> {
    let iso = match value {
        SqlValue::Text(s) => {
            normalize_temporal_text(s).ok_or_else(|| format!("'{s}' is not a date/time value"))?
        }
        SqlValue::Integer(v) => unix_seconds_to_iso(*v, 0)
            .ok_or_else(|| format!("{v} is out of range for a unix timestamp"))?,
        SqlValue::Real(jd) => {
            let secs = (jd - UNIX_EPOCH_JULIAN_DAY) * SECONDS_PER_DAY;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let converted = secs.is_finite().then(|| {
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
                unix_seconds_to_iso(whole as i64, nanos)
            });
            converted
                .flatten()
                .ok_or_else(|| format!("{jd} is out of range for a julian day"))?
        }
        other => return Err(format!("{} value is not a date/time", other.type_name())),
    };
    Ok(FieldValue::String(iso))
}

/// Raw replication key value for bookmarks, in the source's own encoding.
pub(crate) fn replication_value(value: &SqlValue) -> Result<Option<ReplicationValue>, String> {
    match value {
        SqlValue::Null => Ok(None),
        SqlValue::Integer(v) => Ok(Some(ReplicationValue::Integer(*v))),
        SqlValue::Real(v) => Ok(Some(ReplicationValue::Number(*v))),
        SqlValue::Text(s) => Ok(Some(ReplicationValue::Text(s.clone()))),
        SqlValue::Blob(_) => Err("blob values cannot be used as a replication key".to_string()),
        SqlValue::MalformedText(_) => {
            Err("replication key text is not valid UTF-8".to_string())
        }
    }
}
