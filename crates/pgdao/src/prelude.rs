//! Convenient imports for typical `pgdao` usage.
//!
//! ```ignore
//! use pgdao::prelude::*;
//! ```

pub use crate::{
    Condition, DaoError, DaoResult, Engine, Entity, MemoryEngine, PlanRequest, RecordStore,
    SearchResponse, SortDirection, StoreConfig, Value,
};

#[cfg(feature = "pool")]
pub use crate::{PgEngine, PoolConfig};
