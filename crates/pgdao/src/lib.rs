//! # pgdao
//!
//! A generic, entity-agnostic data-access layer for PostgreSQL.
//!
//! ## Features
//!
//! - **One DAO for every entity**: [`RecordStore<T, E>`] gives typed CRUD for any `T: Entity`
//! - **Dynamic queries**: compose [`Condition`]s, sort and page; the [`QueryBuilder`] turns
//!   them into a parameterized [`QueryPlan`]
//! - **Bound parameters everywhere**: caller values never reach query text; field names are
//!   validated against entity metadata
//! - **Scoped units of work**: every call opens and closes its own session; writes commit on
//!   success and roll back on failure
//! - **Pluggable engines**: [`PgEngine`] (deadpool-postgres) or the in-process [`MemoryEngine`]
//!
//! ## Example
//!
//! ```ignore
//! use pgdao::prelude::*;
//!
//! #[derive(Debug, Clone, Entity)]
//! #[dao(table = "orders")]
//! struct Order {
//!     #[dao(id)]
//!     id: Option<i64>,
//!     status: String,
//!     #[dao(column = "order_date")]
//!     order_date: chrono::NaiveDateTime,
//! }
//!
//! let engine = PgEngine::connect(&PoolConfig::from_env()?)?;
//! let orders: RecordStore<Order, _> = RecordStore::new(engine);
//!
//! let open = orders
//!     .search([("status", Value::from("open"))], "order_date", SortDirection::Desc, None, Some(20))
//!     .await?;
//! ```

pub mod condition;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod executor;
pub mod ident;
pub mod memory;
pub mod meta;
pub mod plan;
pub mod prelude;
pub mod store;
pub mod value;

#[cfg(feature = "pool")]
pub mod pg;

pub use condition::{Condition, Operator};
pub use config::{DEFAULT_DATE_FORMAT, PoolConfig, StoreConfig};
pub use engine::{Engine, Session};
pub use entity::{Entity, Record};
pub use error::{
    CODE_CONFLICT, CODE_INFRASTRUCTURE, CODE_NO_DATA, CODE_VALIDATION, DaoError, DaoResult,
    ErrorKind, ErrorPayload,
};
pub use executor::Executor;
pub use ident::Ident;
pub use memory::{EngineStats, MemoryEngine, MemorySession};
pub use meta::{ColumnKind, ColumnMeta, EntityMeta, EntityRegistration, FieldType, Registry};
pub use plan::{Page, PgStatement, PlanRequest, QueryBuilder, QueryPlan, SortDirection};
pub use store::{RecordStore, SearchResponse};
pub use value::{FromValue, Value};

#[cfg(feature = "pool")]
pub use pg::{PgEngine, PgSession};

#[cfg(feature = "derive")]
pub use pgdao_derive::Entity;

// Re-export inventory for use by the derive macro
pub use inventory;
