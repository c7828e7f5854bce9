//! Entity mapping metadata.
//!
//! Every [`Entity`](crate::Entity) exposes a static [`EntityMeta`] describing its
//! table, identifier column and attributes. `#[derive(Entity)]` also submits an
//! [`EntityRegistration`] through `inventory`, so metadata can be resolved at
//! runtime by type name via [`Registry`].

use crate::error::{DaoError, DaoResult};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Storage kind of a column, used to decide how condition values are coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
    Date,
    Timestamp,
    /// Instant stored with a time zone (`timestamptz`).
    TimestampTz,
    Uuid,
    Json,
    Other,
}

impl ColumnKind {
    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            ColumnKind::Date | ColumnKind::Timestamp | ColumnKind::TimestampTz
        )
    }
}

/// Maps a Rust field type to its [`ColumnKind`].
pub trait FieldType {
    const KIND: ColumnKind;
}

macro_rules! field_kind {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(impl FieldType for $ty { const KIND: ColumnKind = ColumnKind::$kind; })*
    };
}

field_kind! {
    bool => Bool,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    chrono::NaiveDate => Date,
    chrono::NaiveDateTime => Timestamp,
    chrono::DateTime<chrono::Utc> => TimestampTz,
    uuid::Uuid => Uuid,
    serde_json::Value => Json,
}

impl<T: FieldType> FieldType for Option<T> {
    const KIND: ColumnKind = T::KIND;
}

impl<T> FieldType for Vec<T> {
    const KIND: ColumnKind = ColumnKind::Other;
}

/// One mapped attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Attribute (Rust field) name, as used by callers in conditions.
    pub field: &'static str,
    /// Column name in the store.
    pub column: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
    /// Name of the entity this column references (foreign key), if any.
    pub references: Option<&'static str>,
}

/// Static description of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityMeta {
    /// Logical record-type name (the Rust type name unless overridden).
    pub name: &'static str,
    pub table: &'static str,
    /// Identifier column.
    pub id_column: &'static str,
    pub columns: &'static [ColumnMeta],
}

impl EntityMeta {
    /// Resolve a caller-supplied attribute name, accepting either the field or
    /// the column spelling.
    pub fn column(&self, name: &str) -> Option<&'static ColumnMeta> {
        self.columns
            .iter()
            .find(|c| c.field == name)
            .or_else(|| self.columns.iter().find(|c| c.column == name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.column)
    }

    /// The column in this entity that references `target`, if any.
    pub fn reference_to(&self, target: &str) -> Option<&'static ColumnMeta> {
        self.columns.iter().find(|c| c.references == Some(target))
    }
}

/// Registration entry submitted by `#[derive(Entity)]`.
pub struct EntityRegistration {
    pub meta: fn() -> &'static EntityMeta,
}

inventory::collect!(EntityRegistration);

/// Name-keyed lookup of entity metadata.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    by_name: HashMap<&'static str, &'static EntityMeta>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry built from every `inventory`-submitted entity in the binary.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let mut registry = Registry::new();
            for reg in inventory::iter::<EntityRegistration> {
                registry.register((reg.meta)());
            }
            registry
        })
    }

    pub fn register(&mut self, meta: &'static EntityMeta) {
        self.by_name.insert(meta.name, meta);
    }

    /// Builder-style registration.
    pub fn with(mut self, meta: &'static EntityMeta) -> Self {
        self.register(meta);
        self
    }

    pub fn get(&self, name: &str) -> Option<&'static EntityMeta> {
        self.by_name.get(name).copied()
    }

    /// Like [`Registry::get`] but reports an unknown name as a validation error.
    pub fn resolve(&self, name: &str) -> DaoResult<&'static EntityMeta> {
        self.get(name)
            .ok_or_else(|| DaoError::validation(format!("Unknown record type '{name}'")))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
