//! Storage engine abstraction.
//!
//! An [`Engine`] hands out [`Session`]s: one unit of work each, never shared.
//! The executor drives the session lifecycle; stores only talk to these traits,
//! so the same DAO code runs against PostgreSQL ([`PgEngine`](crate::PgEngine))
//! or the in-process [`MemoryEngine`](crate::MemoryEngine).

use crate::entity::Record;
use crate::error::DaoResult;
use crate::meta::EntityMeta;
use crate::plan::QueryPlan;
use crate::value::Value;
use std::future::Future;

/// A source of sessions. Cheap to clone; clones share the underlying store.
pub trait Engine: Clone + Send + Sync + 'static {
    type Session: Session;

    /// Acquire a new session.
    fn open(&self) -> impl Future<Output = DaoResult<Self::Session>> + Send;
}

/// One unit of work against an engine.
///
/// At most one transaction is active at a time. Implementations discard an
/// open transaction when the session is dropped without [`Session::close`].
pub trait Session: Send {
    fn begin(&mut self) -> impl Future<Output = DaoResult<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = DaoResult<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = DaoResult<()>> + Send;

    /// Release the session. Further calls fail.
    fn close(&mut self) -> impl Future<Output = DaoResult<()>> + Send;

    fn in_transaction(&self) -> bool;

    /// Rows of the plan's primary source matching its predicates, sorted and paged.
    fn fetch(&mut self, plan: &QueryPlan) -> impl Future<Output = DaoResult<Vec<Record>>> + Send;

    /// Number of matching rows; pagination is ignored.
    fn count(&mut self, plan: &QueryPlan) -> impl Future<Output = DaoResult<u64>> + Send;

    fn get(
        &mut self,
        meta: &'static EntityMeta,
        id: &Value,
    ) -> impl Future<Output = DaoResult<Option<Record>>> + Send;

    /// Insert a row and return its identifier. A `NULL` identifier in `record`
    /// asks the engine to generate one.
    fn insert(
        &mut self,
        meta: &'static EntityMeta,
        record: &Record,
    ) -> impl Future<Output = DaoResult<Value>> + Send;

    /// Replace the non-identifier columns of row `id`; returns rows affected.
    fn update(
        &mut self,
        meta: &'static EntityMeta,
        id: &Value,
        record: &Record,
    ) -> impl Future<Output = DaoResult<u64>> + Send;

    /// Delete row `id`; returns rows affected.
    fn delete(
        &mut self,
        meta: &'static EntityMeta,
        id: &Value,
    ) -> impl Future<Output = DaoResult<u64>> + Send;
}
