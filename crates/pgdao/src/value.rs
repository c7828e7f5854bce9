//! Dynamic values carried by conditions, bind slots and records.

use crate::error::{DaoError, DaoResult};
use crate::meta::ColumnKind;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::error::Error;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, WrongType, to_sql_checked};
use uuid::Uuid;

/// A dynamically typed value.
///
/// `List` only appears as the operand of IN / NOT IN conditions; the query
/// builder expands it into one bind slot per element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "json",
            Value::List(_) => "list",
        }
    }

    /// SQL-style comparison. `None` when either side is NULL or the kinds are
    /// not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Text(b)) => Some(a.to_string().cmp(b)),
            (Text(a), Value::Uuid(b)) => Some(a.cmp(&b.to_string())),
            (Json(a), Json(b)) => (a == b).then_some(Ordering::Equal),
            (a, b) => match (a.as_naive_datetime(), b.as_naive_datetime()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => None,
            },
        }
    }

    /// A wall-clock time in `tz`, typed for a column of `kind`.
    ///
    /// Time-zone aware columns get the matching instant; a time skipped by a
    /// DST jump resolves to the first instant after the gap. Other columns
    /// keep the naive value.
    pub fn wall_clock<Tz: TimeZone>(at: NaiveDateTime, kind: Option<ColumnKind>, tz: &Tz) -> Value {
        if kind != Some(ColumnKind::TimestampTz) {
            return Value::Timestamp(at);
        }
        let instant = tz
            .from_local_datetime(&at)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(at + TimeDelta::hours(1))).earliest())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&at));
        Value::TimestampTz(instant)
    }

    fn as_naive_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(d.and_time(NaiveTime::MIN)),
            Value::Timestamp(t) => Some(*t),
            Value::TimestampTz(t) => Some(t.naive_utc()),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    NaiveDate => Date,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    Uuid => Uuid,
    serde_json::Value => Json,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// Conversion from a stored [`Value`] back into a Rust field type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> DaoResult<Self>;
}

fn mismatch<T>(expected: &str, got: &Value) -> DaoResult<T> {
    Err(DaoError::infrastructure(format!(
        "Decode error: expected {expected}, got {}",
        got.type_name()
    )))
}

impl FromValue for Value {
    fn from_value(value: Value) -> DaoResult<Self> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> DaoResult<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => mismatch("bool", &other),
        }
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> DaoResult<Self> {
                    match value {
                        Value::Int(i) => <$ty>::try_from(i).map_err(|e| {
                            DaoError::infrastructure(format!("Decode error: {e}"))
                        }),
                        other => mismatch(stringify!($ty), &other),
                    }
                }
            }
        )*
    };
}

impl_from_value_int!(i16, i32, i64, u32);

impl FromValue for f64 {
    fn from_value(value: Value) -> DaoResult<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            other => mismatch("f64", &other),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> DaoResult<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> DaoResult<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => mismatch("text", &other),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> DaoResult<Self> {
        match value {
            Value::Date(d) => Ok(d),
            Value::Timestamp(t) => Ok(t.date()),
            other => mismatch("date", &other),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> DaoResult<Self> {
        match value {
            Value::Timestamp(t) => Ok(t),
            Value::TimestampTz(t) => Ok(t.naive_utc()),
            Value::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            other => mismatch("timestamp", &other),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> DaoResult<Self> {
        match value {
            Value::TimestampTz(t) => Ok(t),
            Value::Timestamp(t) => Ok(Utc.from_utc_datetime(&t)),
            other => mismatch("timestamptz", &other),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> DaoResult<Self> {
        match value {
            Value::Uuid(u) => Ok(u),
            Value::Text(s) => Uuid::parse_str(&s)
                .map_err(|e| DaoError::infrastructure(format!("Decode error: {e}"))),
            other => mismatch("uuid", &other),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> DaoResult<Self> {
        match value {
            Value::Json(j) => Ok(j),
            other => mismatch("json", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> DaoResult<Self> {
        match value {
            Value::Null => Ok(None),
            v => T::from_value(v).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> DaoResult<Self> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => mismatch("list", &other),
        }
    }
}

// ─── PostgreSQL wire conversions ────────────────────────────────────────────

/// Encode `v` as `ty`, refusing column types `T` has no encoding for.
fn bind<T: ToSql>(v: &T, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
    if !T::accepts(ty) {
        return Err(Box::new(WrongType::new::<T>(ty.clone())));
    }
    v.to_sql(ty, out)
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => bind(v, ty, out),
            Value::Int(v) => match *ty {
                Type::INT2 => bind(&i16::try_from(*v)?, ty, out),
                Type::INT4 => bind(&i32::try_from(*v)?, ty, out),
                Type::FLOAT4 => bind(&(*v as f32), ty, out),
                Type::FLOAT8 => bind(&(*v as f64), ty, out),
                _ => bind(v, ty, out),
            },
            Value::Float(v) => match *ty {
                Type::FLOAT4 => bind(&(*v as f32), ty, out),
                _ => bind(v, ty, out),
            },
            Value::Text(v) => bind(v, ty, out),
            Value::Date(v) => match *ty {
                Type::TIMESTAMP => bind(&v.and_time(NaiveTime::MIN), ty, out),
                Type::TIMESTAMPTZ => bind(
                    &Utc.from_utc_datetime(&v.and_time(NaiveTime::MIN)),
                    ty,
                    out,
                ),
                _ => bind(v, ty, out),
            },
            Value::Timestamp(v) => match *ty {
                Type::TIMESTAMPTZ => bind(&Utc.from_utc_datetime(v), ty, out),
                Type::DATE => bind(&v.date(), ty, out),
                _ => bind(v, ty, out),
            },
            Value::TimestampTz(v) => match *ty {
                Type::TIMESTAMP => bind(&v.naive_utc(), ty, out),
                _ => bind(v, ty, out),
            },
            Value::Uuid(v) => bind(v, ty, out),
            Value::Json(v) => bind(v, ty, out),
            Value::List(_) => {
                Err("list values must be expanded into individual parameters".into())
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::Int(i16::from_sql(ty, raw)?.into()),
            Type::INT4 => Value::Int(i32::from_sql(ty, raw)?.into()),
            Type::INT8 => Value::Int(i64::from_sql(ty, raw)?),
            Type::FLOAT4 => Value::Float(f32::from_sql(ty, raw)?.into()),
            Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
                Value::Text(String::from_sql(ty, raw)?)
            }
            Type::DATE => Value::Date(NaiveDate::from_sql(ty, raw)?),
            Type::TIMESTAMP => Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
            Type::TIMESTAMPTZ => Value::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?),
            Type::UUID => Value::Uuid(Uuid::from_sql(ty, raw)?),
            Type::JSON | Type::JSONB => Value::Json(serde_json::Value::from_sql(ty, raw)?),
            _ => return Err(format!("unsupported column type {ty}").into()),
        })
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(Value::Null)
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::BOOL
                | Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::DATE
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::UUID
                | Type::JSON
                | Type::JSONB
        )
    }
}
