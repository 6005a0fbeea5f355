//! Conversion of SQL Server column values into JSON scalars.
//!
//! Exact numerics (`decimal`, `numeric`, `money`) become strings holding the
//! exact decimal text so no precision is lost on the way to the client. The
//! driver hands `money` over as `f64`, so the column type decides which path
//! a value takes.
//! Temporal values become ISO-8601 strings; binary data becomes `0x` hex.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Number, Value};
use tiberius::numeric::Numeric;
use tiberius::{ColumnData, ColumnType, FromSql, Row};

use crate::error::{DbError, DbResult};
use crate::models::QueryRow;

/// Turn a result row into an ordered column-name → value map.
pub fn row_to_record(row: Row) -> DbResult<QueryRow> {
    let columns: Vec<(String, ColumnType)> = row
        .columns()
        .iter()
        .map(|column| (column.name().to_string(), column.column_type()))
        .collect();

    let mut record = Map::with_capacity(columns.len());
    for ((name, column_type), data) in columns.into_iter().zip(row) {
        record.insert(name, cell_to_json(column_type, &data)?);
    }

    Ok(record)
}

/// Convert one cell, using the declared column type where the driver's
/// value alone is ambiguous.
pub fn cell_to_json(column_type: ColumnType, data: &ColumnData<'static>) -> DbResult<Value> {
    match (column_type, data) {
        // money and smallmoney arrive as f64 with four implied decimals
        (ColumnType::Money | ColumnType::Money4, ColumnData::F64(v)) => Ok(money(*v)),
        _ => column_to_json(data),
    }
}

pub fn column_to_json(data: &ColumnData<'static>) -> DbResult<Value> {
    let value = match data {
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        ColumnData::U8(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::F32(v) => float(v.map(f64::from)),
        ColumnData::F64(v) => float(*v),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Guid(v) => v
            .as_ref()
            .map(|guid| Value::String(guid.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Numeric(v) => v
            .as_ref()
            .map(|numeric| Value::String(decimal_text(*numeric)))
            .unwrap_or(Value::Null),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|bytes| Value::String(to_hex(bytes)))
            .unwrap_or(Value::Null),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|xml| Value::String(xml.to_string()))
            .unwrap_or(Value::Null),
        _ => temporal_to_json(data)?,
    };

    Ok(value)
}

fn temporal_to_json(data: &ColumnData<'static>) -> DbResult<Value> {
    let text = match data {
        ColumnData::Date(_) => NaiveDate::from_sql(data)
            .map_err(conversion)?
            .map(|date| date.format("%Y-%m-%d").to_string()),
        ColumnData::Time(_) => NaiveTime::from_sql(data)
            .map_err(conversion)?
            .map(|time| time.format("%H:%M:%S%.f").to_string()),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)
            .map_err(conversion)?
            .map(|ts| ts.to_rfc3339()),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)
                .map_err(conversion)?
                .map(|ts| ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        other => return Err(DbError::Conversion(format!("{:?}", other))),
    };

    Ok(text.map(Value::String).unwrap_or(Value::Null))
}

fn float(v: Option<f64>) -> Value {
    v.and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Exact text of a scaled integer: one sign, no exponent, no dot at scale 0.
fn decimal_text(numeric: Numeric) -> String {
    let scale = numeric.scale() as u32;
    let sign = if numeric.value() < 0 { "-" } else { "" };
    let digits = numeric.value().unsigned_abs();

    if scale == 0 {
        return format!("{}{}", sign, digits);
    }

    let pow = 10u128.pow(scale);
    format!(
        "{}{}.{:0width$}",
        sign,
        digits / pow,
        digits % pow,
        width = scale as usize
    )
}

fn money(v: Option<f64>) -> Value {
    match v {
        Some(v) if v.is_finite() => {
            // Back to ten-thousandths; the cast saturates at the type's bounds
            let units = (v * 10_000.0).round() as i64;
            Value::String(decimal_text(Numeric::new_with_scale(units as i128, 4)))
        }
        _ => Value::Null,
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for byte in bytes {
        out.push_str(&format!("{:02X}", byte));
    }
    out
}

fn conversion(e: tiberius::error::Error) -> DbError {
    DbError::Conversion(e.to_string())
}
