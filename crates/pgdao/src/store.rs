//! The generic record store (DAO).
//!
//! A [`RecordStore<T, E>`] performs typed CRUD and dynamic, condition-driven
//! queries for one entity type `T` against any [`Engine`]. It holds only
//! immutable configuration and an engine handle; every call opens and closes
//! its own session.
//!
//! # Example
//!
//! ```ignore
//! use pgdao::{Condition, MemoryEngine, RecordStore, SortDirection};
//!
//! let store: RecordStore<Order, _> = RecordStore::new(MemoryEngine::new());
//! let order = store.create(Order::new("open", 42.0)).await?;
//!
//! let january = store
//!     .query(
//!         &pgdao::PlanRequest::new("Order")
//!             .condition(Condition::ge("orderDate", "01-Jan-24"))
//!             .condition(Condition::lt("orderDate", "01-Feb-24"))
//!             .order_by("orderDate", SortDirection::Desc),
//!     )
//!     .await?;
//! ```

use crate::condition::Condition;
use crate::config::StoreConfig;
use crate::engine::{Engine, Session};
use crate::entity::Entity;
use crate::error::{DaoError, DaoResult, ErrorPayload};
use crate::executor::Executor;
use crate::meta::{ColumnKind, Registry};
use crate::plan::{PlanRequest, QueryBuilder, QueryPlan, SortDirection};
use crate::value::Value;
use chrono::{Days, Local, NaiveDate, NaiveTime, TimeZone};
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Result of [`RecordStore::search_response`]: matching rows, or a structured
/// error payload.
///
/// Serializes untagged: either a JSON array of rows or
/// `{ "error_code": .., "error_description": .. }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchResponse<T> {
    Rows(Vec<T>),
    Error(ErrorPayload),
}

impl<T> SearchResponse<T> {
    pub fn rows(&self) -> Option<&[T]> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Error(_) => None,
        }
    }

    pub fn error_code(&self) -> Option<i32> {
        match self {
            Self::Rows(_) => None,
            Self::Error(payload) => Some(payload.error_code),
        }
    }
}

impl<T: Serialize> SearchResponse<T> {
    pub fn to_json(&self) -> DaoResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

type TodaySource = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Typed data access for entity `T` over engine `E`.
pub struct RecordStore<T: Entity, E: Engine> {
    executor: Executor<E>,
    config: Arc<StoreConfig>,
    registry: Arc<Registry>,
    today: TodaySource,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, E: Engine> Clone for RecordStore<T, E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            today: Arc::clone(&self.today),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity, E: Engine> std::fmt::Debug for RecordStore<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("entity", &T::meta().name)
            .field("config", &self.config)
            .finish()
    }
}

impl<T: Entity, E: Engine> RecordStore<T, E> {
    /// A store with default configuration and the global entity registry.
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, StoreConfig::default())
    }

    pub fn with_config(engine: E, config: StoreConfig) -> Self {
        Self {
            executor: Executor::new(engine),
            config: Arc::new(config),
            registry: Arc::new(Registry::global().clone()),
            today: Arc::new(|| Local::now().date_naive()),
            _entity: PhantomData,
        }
    }

    /// Resolve record-type names through `registry` instead of the global one.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Replace the local-calendar "today" used by [`RecordStore::find_created_today`].
    pub fn today_source(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Arc::new(today);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn executor(&self) -> &Executor<E> {
        &self.executor
    }

    /// Build the plan for `request` without running it.
    pub fn plan(&self, request: &PlanRequest) -> DaoResult<QueryPlan> {
        let meta = T::meta();
        let plan = QueryBuilder::new(&self.config, &self.registry)
            .with_primary(meta)
            .build(request)?;
        match &plan.root {
            Some(root) if root.meta.name != meta.name => Err(DaoError::validation(format!(
                "Query selects '{}' but this store holds '{}'",
                root.meta.name, meta.name
            ))),
            _ => Ok(plan),
        }
    }

    fn request(&self) -> PlanRequest {
        PlanRequest::new(T::meta().name)
    }

    async fn fetch(&self, plan: QueryPlan) -> DaoResult<Vec<T>> {
        plan.require_root()?;
        let records = self
            .executor
            .run_read(move |s| Box::pin(async move { s.fetch(&plan).await }))
            .await?;
        records.iter().map(T::from_record).collect()
    }

    async fn count_plan(&self, plan: QueryPlan) -> DaoResult<u64> {
        plan.require_root()?;
        self.executor
            .run_read(move |s| Box::pin(async move { s.count(&plan).await }))
            .await
    }

    fn require_id(entity: &T, action: &str) -> DaoResult<Value> {
        let id = entity.id_value();
        if id.is_null() {
            return Err(DaoError::validation(format!(
                "Cannot {action} {} without an identifier",
                T::meta().name
            )));
        }
        Ok(id)
    }

    fn absent(id: &Value) -> DaoError {
        let meta = T::meta();
        DaoError::not_found(format!("{} with {} = {id:?} does not exist", meta.name, meta.id_column))
    }

    // ==================== CRUD ====================

    /// Persist `entity` and return it with its generated identifier.
    pub async fn create(&self, mut entity: T) -> DaoResult<T> {
        let meta = T::meta();
        let record = entity.to_record();
        let id = self
            .executor
            .run_write(move |s| Box::pin(async move { s.insert(meta, &record).await }))
            .await?;
        tracing::debug!(target: "pgdao.store", entity = meta.name, ?id, "created");
        entity.set_id(id)?;
        Ok(entity)
    }

    pub async fn find_by_id(&self, id: impl Into<Value>) -> DaoResult<Option<T>> {
        let meta = T::meta();
        let id = id.into();
        let record = self
            .executor
            .run_read(move |s| Box::pin(async move { s.get(meta, &id).await }))
            .await?;
        record.as_ref().map(T::from_record).transpose()
    }

    pub async fn find_all(&self) -> DaoResult<Vec<T>> {
        let plan = self.plan(&self.request())?;
        self.fetch(plan).await
    }

    /// Write every column of `entity` and return the stored row.
    ///
    /// Fails with `Validation` when the entity has no identifier and with
    /// `NotFound` (nothing committed) when no row has that identifier.
    pub async fn update(&self, entity: T) -> DaoResult<T> {
        let meta = T::meta();
        let id = Self::require_id(&entity, "update")?;
        let record = entity.to_record();
        let stored = self
            .executor
            .run_write(move |s| {
                Box::pin(async move {
                    if s.update(meta, &id, &record).await? == 0 {
                        return Err(Self::absent(&id));
                    }
                    s.get(meta, &id).await?.ok_or_else(|| Self::absent(&id))
                })
            })
            .await?;
        T::from_record(&stored)
    }

    /// Remove `entity`'s row; `NotFound` (nothing committed) when absent.
    pub async fn delete(&self, entity: &T) -> DaoResult<()> {
        let meta = T::meta();
        let id = Self::require_id(entity, "delete")?;
        self.executor
            .run_write(move |s| {
                Box::pin(async move {
                    match s.delete(meta, &id).await? {
                        0 => Err(Self::absent(&id)),
                        _ => Ok(()),
                    }
                })
            })
            .await
    }

    /// Remove the row with `id`. Returns `false`, with the transaction rolled
    /// back, when no such row exists.
    pub async fn delete_by_id(&self, id: impl Into<Value>) -> DaoResult<bool> {
        let meta = T::meta();
        let id = id.into();
        let result = self
            .executor
            .run_write(move |s| {
                Box::pin(async move {
                    match s.delete(meta, &id).await? {
                        0 => Err(Self::absent(&id)),
                        _ => Ok(()),
                    }
                })
            })
            .await;
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove every row where `field = value` (`IS NULL` for a `NULL` value), in
    /// one transaction. Returns the number of rows removed.
    pub async fn delete_by_field(
        &self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> DaoResult<u64> {
        let meta = T::meta();
        let plan = self.plan(&self.request().condition(field_matches(field, value.into())))?;
        self.executor
            .run_write(move |s| {
                Box::pin(async move {
                    let mut removed = 0;
                    for row in s.fetch(&plan).await? {
                        let id = row.get(meta.id_column).cloned().unwrap_or(Value::Null);
                        removed += s.delete(meta, &id).await?;
                    }
                    Ok(removed)
                })
            })
            .await
    }

    // ==================== Queries ====================

    /// Run a full request: conditions, joins, sort and page.
    pub async fn query(&self, request: &PlanRequest) -> DaoResult<Vec<T>> {
        let plan = self.plan(request)?;
        self.fetch(plan).await
    }

    /// Rows where `field = value`; a `NULL` value matches `IS NULL`.
    pub async fn find_by_field(
        &self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> DaoResult<Vec<T>> {
        self.query(&self.request().condition(field_matches(field, value.into())))
            .await
    }

    /// The single row where `field = value`; `Conflict` when several match.
    pub async fn find_unique_by_field(
        &self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> DaoResult<Option<T>> {
        let mut plan = self.plan(&self.request().condition(field_matches(field, value.into())))?;
        // Two rows are enough to detect a duplicate; not subject to the page clamp.
        plan.page.limit = Some(2);
        let mut rows = self.fetch(plan).await?;
        match rows.len() {
            0 | 1 => Ok(rows.pop()),
            got => Err(DaoError::multiple_results(got)),
        }
    }

    /// Criteria search. Text values match as `LIKE %value%`, `NULL` as
    /// `IS NULL`, anything else by equality. An empty `sort_field` leaves the
    /// order unspecified.
    pub async fn search<F, I>(
        &self,
        criteria: I,
        sort_field: &str,
        direction: SortDirection,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> DaoResult<Vec<T>>
    where
        F: Into<String>,
        I: IntoIterator<Item = (F, Value)>,
    {
        let conditions = criteria.into_iter().map(|(field, value)| match value {
            Value::Text(text) => Condition::like(field, format!("%{text}%")),
            Value::Null => Condition::is_null(field),
            other => Condition::eq(field, other),
        });
        let mut request = self
            .request()
            .conditions(conditions)
            .order_by(sort_field, direction);
        if let Some(offset) = offset {
            request = request.offset(offset);
        }
        if let Some(limit) = limit {
            request = request.limit(limit);
        }
        self.query(&request).await
    }

    /// Condition search reported as a [`SearchResponse`].
    ///
    /// No rows gives code 7; failures give the error's code (8 for bad
    /// conditions, 9 for engine failures).
    pub async fn search_response(
        &self,
        target: &str,
        conditions: Vec<Condition>,
        sort_field: &str,
        direction: SortDirection,
    ) -> SearchResponse<T> {
        let request = PlanRequest::new(target)
            .conditions(conditions)
            .order_by(sort_field, direction);
        let table = if target.trim().is_empty() {
            T::meta().name
        } else {
            target
        };

        match self.query(&request).await {
            Ok(rows) if rows.is_empty() => SearchResponse::Error(ErrorPayload::no_data(table)),
            Ok(rows) => SearchResponse::Rows(rows),
            Err(e) => {
                tracing::warn!(target: "pgdao.store", target_type = table, error = %e, "search failed");
                SearchResponse::Error(e.to_payload())
            }
        }
    }

    pub async fn count(&self) -> DaoResult<u64> {
        let plan = self.plan(&self.request())?;
        self.count_plan(plan).await
    }

    pub async fn count_where(&self, conditions: Vec<Condition>) -> DaoResult<u64> {
        let plan = self.plan(&self.request().conditions(conditions))?;
        self.count_plan(plan).await
    }

    /// Rows whose `field` falls on today, local time.
    pub async fn find_created_today(&self, field: &str) -> DaoResult<Vec<T>> {
        self.find_created_on(field, (self.today)()).await
    }

    /// Rows whose `field` lies in `[day 00:00, next day 00:00)`, local time.
    pub async fn find_created_on(&self, field: &str, day: NaiveDate) -> DaoResult<Vec<T>> {
        let kind = T::meta().column(field).map(|c| c.kind);
        let (start, end) = day_bounds(day, kind, &Local)?;
        self.query(
            &self
                .request()
                .condition(Condition::ge(field, start))
                .condition(Condition::lt(field, end)),
        )
        .await
    }
}

fn field_matches(field: impl Into<String>, value: Value) -> Condition {
    match value {
        Value::Null => Condition::is_null(field),
        value => Condition::eq(field, value),
    }
}

/// `[day 00:00, next day 00:00)` in `tz`, typed for a column of `kind`.
fn day_bounds<Tz: TimeZone>(
    day: NaiveDate,
    kind: Option<ColumnKind>,
    tz: &Tz,
) -> DaoResult<(Value, Value)> {
    let next = day
        .checked_add_days(Days::new(1))
        .ok_or_else(|| DaoError::validation(format!("No day follows {day}")))?;
    Ok((
        Value::wall_clock(day.and_time(NaiveTime::MIN), kind, tz),
        Value::wall_clock(next.and_time(NaiveTime::MIN), kind, tz),
    ))
}
