//! Value and `DataType` definitions for rudu.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RuduError};

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Supported data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    String,
    /// Date (stored as days since epoch).
    Date,
    /// Timestamp (stored as microseconds since epoch).
    Timestamp,
}

impl DataType {
    /// Returns the canonical SQL name of the data type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int64 => "INT64",
            DataType::Float32 => "FLOAT32",
            DataType::Float64 => "FLOAT64",
            DataType::Bool => "BOOL",
            DataType::String => "STRING",
            DataType::Date => "DATE",
            DataType::Timestamp => "TIMESTAMP",
        }
    }

    /// Resolves a type name as written in SQL, including common aliases.
    ///
    /// Returns None for unknown type names.
    #[must_use]
    pub fn from_sql_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "INT64" | "INTEGER" | "BIGINT" | "INT" => Some(DataType::Int64),
            "FLOAT32" | "REAL" => Some(DataType::Float32),
            "FLOAT64" | "DOUBLE" | "FLOAT" => Some(DataType::Float64),
            "BOOL" | "BOOLEAN" => Some(DataType::Bool),
            "STRING" | "VARCHAR" | "TEXT" => Some(DataType::String),
            "DATE" => Some(DataType::Date),
            "TIMESTAMP" => Some(DataType::Timestamp),
            _ => None,
        }
    }

    /// Returns whether this type is numeric.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int64 | DataType::Float32 | DataType::Float64
        )
    }

    /// Returns whether values of the two types can be compared with each other.
    #[must_use]
    pub fn is_comparable_with(&self, other: DataType) -> bool {
        *self == other || (self.is_numeric() && other.is_numeric())
    }

    /// Converts to an Arrow data type.
    #[must_use]
    pub fn to_arrow(&self) -> arrow::datatypes::DataType {
        match self {
            DataType::Int64 => arrow::datatypes::DataType::Int64,
            DataType::Float32 => arrow::datatypes::DataType::Float32,
            DataType::Float64 => arrow::datatypes::DataType::Float64,
            DataType::Bool => arrow::datatypes::DataType::Boolean,
            DataType::String => arrow::datatypes::DataType::Utf8,
            DataType::Date => arrow::datatypes::DataType::Date32,
            DataType::Timestamp => {
                arrow::datatypes::DataType::Timestamp(arrow::datatypes::TimeUnit::Microsecond, None)
            }
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime value container for data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 64-bit signed integer value.
    Int64(i64),
    /// 32-bit floating point value.
    Float32(f32),
    /// 64-bit floating point value.
    Float64(f64),
    /// Boolean value.
    Bool(bool),
    /// String value.
    String(String),
    /// Date value (days since Unix epoch).
    Date(i32),
    /// Timestamp value (microseconds since Unix epoch).
    Timestamp(i64),
    /// Null value.
    Null,
}

impl Value {
    /// Returns true if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the data type of this value, or None for Null.
    #[must_use]
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float32(_) => Some(DataType::Float32),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Bool(_) => Some(DataType::Bool),
            Value::String(_) => Some(DataType::String),
            Value::Date(_) => Some(DataType::Date),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Null => None,
        }
    }

    /// Converts this value to `target` using the engine's cast rules.
    ///
    /// `NULL` casts to `NULL` of any type. Casts that would lose information
    /// (fractional floats to integers, out-of-range numbers, unparseable
    /// strings) fail instead of truncating.
    ///
    /// # Errors
    ///
    /// Returns [`RuduError::Cast`] if the value is not representable in `target`.
    pub fn cast_to(&self, target: DataType) -> Result<Value> {
        if self.data_type() == Some(target) || self.is_null() {
            return Ok(self.clone());
        }

        let fail = |reason: &str| RuduError::Cast {
            from: self.type_name().to_string(),
            to: target.name().to_string(),
            reason: reason.to_string(),
        };

        match (self, target) {
            (_, DataType::String) => Ok(Value::String(self.to_string())),

            (Value::Int64(i), DataType::Float32) => {
                let widened = *i as f32;
                if float_to_int(f64::from(widened)) != Some(*i) {
                    return Err(fail(&format!("{i} is not exactly representable as FLOAT32")));
                }
                Ok(Value::Float32(widened))
            }
            (Value::Int64(i), DataType::Float64) => {
                let widened = *i as f64;
                if float_to_int(widened) != Some(*i) {
                    return Err(fail(&format!("{i} is not exactly representable as FLOAT64")));
                }
                Ok(Value::Float64(widened))
            }
            (Value::Int64(i), DataType::Bool) => Ok(Value::Bool(*i != 0)),

            (Value::Float32(f), DataType::Int64) => {
                float_to_int(f64::from(*f)).map(Value::Int64).ok_or_else(|| {
                    fail(&format!("{f} is not an integral value in INT64 range"))
                })
            }
            (Value::Float32(f), DataType::Float64) => Ok(Value::Float64(f64::from(*f))),
            (Value::Float64(f), DataType::Int64) => {
                float_to_int(*f).map(Value::Int64).ok_or_else(|| {
                    fail(&format!("{f} is not an integral value in INT64 range"))
                })
            }
            (Value::Float64(f), DataType::Float32) => {
                let narrowed = *f as f32;
                if f.is_finite() && !narrowed.is_finite() {
                    return Err(fail(&format!("{f} is out of FLOAT32 range")));
                }
                // NaN never compares equal, so only finite values are checked.
                if f.is_finite() && f64::from(narrowed) != *f {
                    return Err(fail(&format!("{f} is not exactly representable as FLOAT32")));
                }
                Ok(Value::Float32(narrowed))
            }

            (Value::Bool(b), DataType::Int64) => Ok(Value::Int64(i64::from(*b))),
            (Value::Bool(b), DataType::Float32) => Ok(Value::Float32(if *b { 1.0 } else { 0.0 })),
            (Value::Bool(b), DataType::Float64) => Ok(Value::Float64(if *b { 1.0 } else { 0.0 })),

            (Value::String(s), DataType::Int64) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|e| fail(&format!("'{s}': {e}"))),
            (Value::String(s), DataType::Float32) => s
                .trim()
                .parse::<f32>()
                .map(Value::Float32)
                .map_err(|e| fail(&format!("'{s}': {e}"))),
            (Value::String(s), DataType::Float64) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float64)
                .map_err(|e| fail(&format!("'{s}': {e}"))),
            (Value::String(s), DataType::Bool) => parse_bool(s)
                .map(Value::Bool)
                .ok_or_else(|| fail(&format!("'{s}' is not a boolean"))),
            (Value::String(s), DataType::Date) => parse_date(s)
                .map(Value::Date)
                .ok_or_else(|| fail(&format!("'{s}' is not a date (expected YYYY-MM-DD)"))),
            (Value::String(s), DataType::Timestamp) => parse_timestamp(s)
                .map(Value::Timestamp)
                .ok_or_else(|| fail(&format!("'{s}' is not a timestamp"))),

            (Value::Date(d), DataType::Timestamp) => i64::from(*d)
                .checked_mul(MICROS_PER_DAY)
                .map(Value::Timestamp)
                .ok_or_else(|| fail("date out of TIMESTAMP range")),
            (Value::Timestamp(t), DataType::Date) => {
                i32::try_from(t.div_euclid(MICROS_PER_DAY))
                    .map(Value::Date)
                    .map_err(|_| fail("timestamp out of DATE range"))
            }

            _ => Err(fail("no cast defined")),
        }
    }

    fn type_name(&self) -> &'static str {
        self.data_type().map_or("NULL", |t| t.name())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Date(days) => match date_from_days(*days) {
                Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
                None => write!(f, "{days}"),
            },
            Value::Timestamp(micros) => match DateTime::from_timestamp_micros(*micros) {
                Some(ts) => write!(f, "{}", ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f")),
                None => write!(f, "{micros}"),
            },
            Value::Null => f.write_str("NULL"),
        }
    }
}

fn float_to_int(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn date_from_days(days: i32) -> Option<NaiveDate> {
    epoch().checked_add_signed(chrono::Duration::try_days(i64::from(days))?)
}

fn parse_date(s: &str) -> Option<i32> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()?;
    i32::try_from(date.signed_duration_since(epoch()).num_days()).ok()
}

fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    let parsed = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Some(parsed.and_utc().timestamp_micros())
}
