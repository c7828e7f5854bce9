//! The `Entity` trait and the column/value `Record` it maps to.

use crate::error::{DaoError, DaoResult};
use crate::meta::EntityMeta;
use crate::value::{FromValue, Value};

/// An ordered set of `column -> value` pairs: one stored row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert or replace a column value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    /// Typed column access; a missing column decodes as `NULL`.
    pub fn get_as<T: FromValue>(&self, column: &str) -> DaoResult<T> {
        let value = self.get(column).cloned().unwrap_or(Value::Null);
        T::from_value(value).map_err(|e| match e {
            DaoError::Infrastructure(msg) => {
                DaoError::infrastructure(format!("column '{column}': {msg}"))
            }
            other => other,
        })
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(c, _)| c == column)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

/// A record type the DAO can persist.
///
/// Normally derived with `#[derive(Entity)]`:
///
/// ```ignore
/// use pgdao::Entity;
///
/// #[derive(Debug, Clone, Entity)]
/// #[dao(table = "users")]
/// struct User {
///     #[dao(id)]
///     id: Option<i64>,
///     #[dao(column = "first_name")]
///     first_name: String,
///     email: String,
/// }
/// ```
pub trait Entity: Sized + Send + Sync + 'static {
    fn meta() -> &'static EntityMeta;

    /// Current identifier; `Value::Null` before the entity has been created.
    fn id_value(&self) -> Value;

    /// Attach an identifier generated by the store.
    fn set_id(&mut self, id: Value) -> DaoResult<()>;

    /// All mapped columns, identifier included.
    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> DaoResult<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_existing_column() {
        let mut record = Record::new();
        record.set("name", "a");
        record.set("name", "b");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("name"), Some(&Value::Text("b".into())));
    }

    #[test]
    fn typed_access_reports_column() {
        let record: Record = [("age", Value::Text("x".into()))].into_iter().collect();
        let err = record.get_as::<i64>("age").unwrap_err();
        assert!(err.to_string().contains("column 'age'"));
        assert_eq!(record.get_as::<Option<i64>>("missing").unwrap(), None);
    }
}
