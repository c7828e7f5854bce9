//! In-process storage engine.
//!
//! `MemoryEngine` evaluates [`QueryPlan`]s directly against rows held in
//! memory. A transaction reads and writes a private copy of the tables and
//! logs its writes; commit replays the log onto the shared tables under the
//! engine lock, all or nothing. Identifiers come from one engine-wide sequence
//! and are never reused, even after a rollback.

use crate::condition::Operator;
use crate::engine::{Engine, Session};
use crate::entity::Record;
use crate::error::{DaoError, DaoResult};
use crate::ident::Ident;
use crate::meta::EntityMeta;
use crate::plan::{Operand, Predicate, QueryPlan, SortDirection, Source};
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering as AtomicOrdering};
use tokio::sync::Mutex;

type Tables = HashMap<String, Vec<Record>>;

/// Lifecycle counters, for asserting on how sessions were used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub opened: u64,
    pub closed: u64,
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicU64,
    closed: AtomicU64,
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn snapshot(&self) -> EngineStats {
        EngineStats {
            opened: self.opened.load(AtomicOrdering::Relaxed),
            closed: self.closed.load(AtomicOrdering::Relaxed),
            begins: self.begins.load(AtomicOrdering::Relaxed),
            commits: self.commits.load(AtomicOrdering::Relaxed),
            rollbacks: self.rollbacks.load(AtomicOrdering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct Shared {
    tables: Mutex<Tables>,
    sequence: AtomicI64,
    counters: Counters,
    offline: AtomicBool,
    reject_commits: AtomicBool,
}

/// An engine backed by in-process tables.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::new()),
                sequence: AtomicI64::new(0),
                counters: Counters::default(),
                offline: AtomicBool::new(false),
                reject_commits: AtomicBool::new(false),
            }),
        }
    }

    pub fn stats(&self) -> EngineStats {
        self.shared.counters.snapshot()
    }

    /// Committed rows of `table`, in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Record> {
        let tables = self.shared.tables.lock().await;
        tables.get(table).cloned().unwrap_or_default()
    }

    /// Insert committed rows directly, bypassing sessions and counters.
    pub async fn seed(&self, meta: &EntityMeta, records: impl IntoIterator<Item = Record>) -> DaoResult<()> {
        let mut tables = self.shared.tables.lock().await;
        for record in records {
            insert_row(&mut tables, &self.shared.sequence, meta, record)?;
        }
        Ok(())
    }

    /// Make [`Engine::open`] fail, as if the store were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, AtomicOrdering::Relaxed);
    }

    /// Make every commit fail.
    pub fn set_reject_commits(&self, reject: bool) {
        self.shared.reject_commits.store(reject, AtomicOrdering::Relaxed);
    }
}

impl Engine for MemoryEngine {
    type Session = MemorySession;

    async fn open(&self) -> DaoResult<MemorySession> {
        if self.shared.offline.load(AtomicOrdering::Relaxed) {
            return Err(DaoError::infrastructure("Memory engine is offline"));
        }
        Counters::bump(&self.shared.counters.opened);
        Ok(MemorySession {
            shared: Arc::clone(&self.shared),
            tx: None,
            closed: false,
        })
    }
}

/// A write made inside a transaction.
#[derive(Debug, Clone)]
enum Write {
    Insert {
        meta: &'static EntityMeta,
        record: Record,
    },
    Update {
        meta: &'static EntityMeta,
        id: Value,
        record: Record,
    },
    Delete {
        meta: &'static EntityMeta,
        id: Value,
    },
}

impl Write {
    fn apply(&self, tables: &mut Tables, sequence: &AtomicI64) -> DaoResult<()> {
        match self {
            Write::Insert { meta, record } => {
                insert_row(tables, sequence, meta, record.clone())?;
            }
            Write::Update { meta, id, record } => {
                update_rows(tables, meta, id, record);
            }
            Write::Delete { meta, id } => {
                delete_rows(tables, meta, id);
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Transaction {
    staged: Tables,
    writes: Vec<Write>,
}

/// A session over a [`MemoryEngine`].
#[derive(Debug)]
pub struct MemorySession {
    shared: Arc<Shared>,
    tx: Option<Transaction>,
    closed: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> DaoResult<()> {
        if self.closed {
            return Err(DaoError::infrastructure("Session is closed"));
        }
        Ok(())
    }

    /// Run `f` over the tables this session currently sees.
    async fn with_tables<R>(&mut self, f: impl FnOnce(&mut Tables, &AtomicI64) -> R) -> DaoResult<R> {
        self.ensure_open()?;
        match self.tx.as_mut() {
            Some(tx) => Ok(f(&mut tx.staged, &self.shared.sequence)),
            None => {
                let mut tables = self.shared.tables.lock().await;
                Ok(f(&mut tables, &self.shared.sequence))
            }
        }
    }

    fn record_write(&mut self, write: Write) {
        if let Some(tx) = self.tx.as_mut() {
            tx.writes.push(write);
        }
    }
}

impl Session for MemorySession {
    async fn begin(&mut self) -> DaoResult<()> {
        self.ensure_open()?;
        if self.tx.is_some() {
            return Err(DaoError::infrastructure("Transaction already active"));
        }
        let staged = self.shared.tables.lock().await.clone();
        self.tx = Some(Transaction {
            staged,
            writes: Vec::new(),
        });
        Counters::bump(&self.shared.counters.begins);
        Ok(())
    }

    async fn commit(&mut self) -> DaoResult<()> {
        self.ensure_open()?;
        if self.shared.reject_commits.load(AtomicOrdering::Relaxed) {
            return Err(DaoError::infrastructure("Commit rejected by memory engine"));
        }
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DaoError::infrastructure("No active transaction"))?;
        if !tx.writes.is_empty() {
            let mut tables = self.shared.tables.lock().await;
            let mut next = tables.clone();
            for write in &tx.writes {
                write.apply(&mut next, &self.shared.sequence)?;
            }
            *tables = next;
        }
        Counters::bump(&self.shared.counters.commits);
        Ok(())
    }

    async fn rollback(&mut self) -> DaoResult<()> {
        self.ensure_open()?;
        if self.tx.take().is_none() {
            return Err(DaoError::infrastructure("No active transaction"));
        }
        Counters::bump(&self.shared.counters.rollbacks);
        Ok(())
    }

    async fn close(&mut self) -> DaoResult<()> {
        self.ensure_open()?;
        self.tx = None;
        self.closed = true;
        Counters::bump(&self.shared.counters.closed);
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn fetch(&mut self, plan: &QueryPlan) -> DaoResult<Vec<Record>> {
        plan.require_root()?;
        let mut rows = self.with_tables(|tables, _| select(tables, plan)).await??;

        if let Some(order) = &plan.order {
            rows.sort_by(|a, b| {
                let ord = nulls_last(a.lookup(&order.column), b.lookup(&order.column));
                match order.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }

        let offset = plan.page.offset.map_or(0, to_usize);
        let limit = plan.page.limit.map_or(usize::MAX, to_usize);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(JoinedRow::into_root)
            .collect())
    }

    async fn count(&mut self, plan: &QueryPlan) -> DaoResult<u64> {
        plan.require_root()?;
        let rows = self.with_tables(|tables, _| select(tables, plan)).await??;
        Ok(rows.len() as u64)
    }

    async fn get(&mut self, meta: &'static EntityMeta, id: &Value) -> DaoResult<Option<Record>> {
        self.with_tables(|tables, _| {
            tables
                .get(meta.table)
                .and_then(|rows| rows.iter().find(|r| has_id(r, meta, id)))
                .cloned()
        })
        .await
    }

    async fn insert(&mut self, meta: &'static EntityMeta, record: &Record) -> DaoResult<Value> {
        let staged = record.clone();
        let id = self
            .with_tables(|tables, sequence| insert_row(tables, sequence, meta, staged))
            .await??;
        let mut record = record.clone();
        record.set(meta.id_column, id.clone());
        self.record_write(Write::Insert { meta, record });
        Ok(id)
    }

    async fn update(&mut self, meta: &'static EntityMeta, id: &Value, record: &Record) -> DaoResult<u64> {
        let affected = self
            .with_tables(|tables, _| update_rows(tables, meta, id, record))
            .await?;
        if affected > 0 {
            self.record_write(Write::Update {
                meta,
                id: id.clone(),
                record: record.clone(),
            });
        }
        Ok(affected)
    }

    async fn delete(&mut self, meta: &'static EntityMeta, id: &Value) -> DaoResult<u64> {
        let affected = self
            .with_tables(|tables, _| delete_rows(tables, meta, id))
            .await?;
        if affected > 0 {
            self.record_write(Write::Delete {
                meta,
                id: id.clone(),
            });
        }
        Ok(affected)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(
                target: "pgdao.store",
                in_transaction = self.tx.is_some(),
                "memory session dropped without close; discarding open transaction"
            );
        }
    }
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

fn has_id(row: &Record, meta: &EntityMeta, id: &Value) -> bool {
    row.get(meta.id_column)
        .and_then(|v| v.compare(id))
        .is_some_and(Ordering::is_eq)
}

fn insert_row(
    tables: &mut Tables,
    sequence: &AtomicI64,
    meta: &EntityMeta,
    mut record: Record,
) -> DaoResult<Value> {
    let rows = tables.entry(meta.table.to_string()).or_default();
    let id = match record.get(meta.id_column) {
        Some(id) if !id.is_null() => {
            if rows.iter().any(|r| has_id(r, meta, id)) {
                return Err(DaoError::conflict(format!(
                    "duplicate key value violates unique constraint \"{}_pkey\"",
                    meta.table
                )));
            }
            id.clone()
        }
        _ => {
            let next = sequence.fetch_add(1, AtomicOrdering::Relaxed) + 1;
            Value::Int(next)
        }
    };
    record.set(meta.id_column, id.clone());
    rows.push(record);
    Ok(id)
}

fn update_rows(tables: &mut Tables, meta: &EntityMeta, id: &Value, record: &Record) -> u64 {
    let Some(rows) = tables.get_mut(meta.table) else {
        return 0;
    };
    let mut affected = 0;
    for row in rows.iter_mut().filter(|r| has_id(r, meta, id)) {
        for (column, value) in record.iter().filter(|(c, _)| *c != meta.id_column) {
            row.set(column, value.clone());
        }
        affected += 1;
    }
    affected
}

fn delete_rows(tables: &mut Tables, meta: &EntityMeta, id: &Value) -> u64 {
    let Some(rows) = tables.get_mut(meta.table) else {
        return 0;
    };
    let before = rows.len();
    rows.retain(|r| !has_id(r, meta, id));
    (before - rows.len()) as u64
}

// ─── Plan evaluation ────────────────────────────────────────────────────────

/// One candidate row: a record from each source, in plan source order.
#[derive(Debug, Clone)]
struct JoinedRow<'p> {
    sources: Vec<(&'p Source, Record)>,
}

impl JoinedRow<'_> {
    /// Value of a resolved column; unknown columns read as `NULL`.
    fn lookup(&self, column: &Ident) -> Value {
        let hit = match column.qualifier() {
            Some(q) => self
                .sources
                .iter()
                .find(|(s, _)| s.alias.as_deref() == Some(q))
                .and_then(|(_, r)| r.get(column.name())),
            None => self.sources.iter().find_map(|(_, r)| r.get(column.name())),
        };
        hit.cloned().unwrap_or(Value::Null)
    }

    fn into_root(self) -> Record {
        self.sources
            .into_iter()
            .next()
            .map(|(_, r)| r)
            .unwrap_or_default()
    }
}

fn select<'p>(tables: &Tables, plan: &'p QueryPlan) -> DaoResult<Vec<JoinedRow<'p>>> {
    let root = plan.require_root()?;
    let rows_of = |source: &Source| tables.get(source.meta.table).cloned().unwrap_or_default();

    let mut candidates: Vec<JoinedRow<'p>> = rows_of(root)
        .into_iter()
        .map(|r| JoinedRow {
            sources: vec![(root, r)],
        })
        .collect();

    for join in &plan.joins {
        let right_rows = rows_of(&join.source);
        let mut next = Vec::new();
        for candidate in &candidates {
            for row in &right_rows {
                let mut joined = candidate.clone();
                joined.sources.push((&join.source, row.clone()));
                if equal(&joined.lookup(&join.left), &joined.lookup(&join.right)) {
                    next.push(joined);
                }
            }
        }
        candidates = next;
    }

    let mut matched = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if matches_all(&candidate, plan)? {
            matched.push(candidate);
        }
    }
    Ok(matched)
}

fn matches_all(row: &JoinedRow<'_>, plan: &QueryPlan) -> DaoResult<bool> {
    for predicate in &plan.predicates {
        if !matches(row, plan, predicate)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn bound<'a>(plan: &'a QueryPlan, slot: &str) -> DaoResult<&'a Value> {
    plan.bind(slot)
        .ok_or_else(|| DaoError::infrastructure(format!("Missing bind value for :{slot}")))
}

fn matches(row: &JoinedRow<'_>, plan: &QueryPlan, predicate: &Predicate) -> DaoResult<bool> {
    let value = row.lookup(&predicate.column);
    let op = predicate.operator;

    Ok(match &predicate.operand {
        Operand::None => match op {
            Operator::IsNull => value.is_null(),
            _ => !value.is_null(),
        },
        Operand::Slot(slot) => {
            let arg = bound(plan, slot)?;
            match op {
                Operator::Like | Operator::NotLike => match (value.as_text(), arg.as_text()) {
                    (Some(text), Some(pattern)) => like(text, pattern) == (op == Operator::Like),
                    _ => false,
                },
                _ => value.compare(arg).is_some_and(|ord| match op {
                    Operator::Equals => ord.is_eq(),
                    Operator::NotEquals => ord.is_ne(),
                    Operator::Gt => ord.is_gt(),
                    Operator::Lt => ord.is_lt(),
                    Operator::Ge => ord.is_ge(),
                    Operator::Le => ord.is_le(),
                    _ => false,
                }),
            }
        }
        Operand::Pair(lo, hi) => {
            let lo = bound(plan, lo)?;
            let hi = bound(plan, hi)?;
            value.compare(lo).is_some_and(Ordering::is_ge)
                && value.compare(hi).is_some_and(Ordering::is_le)
        }
        Operand::List(slots) => {
            let mut found = false;
            for slot in slots {
                if equal(&value, bound(plan, slot)?) {
                    found = true;
                    break;
                }
            }
            match op {
                Operator::In => found,
                _ => !found && (slots.is_empty() || !value.is_null()),
            }
        }
    })
}

fn equal(a: &Value, b: &Value) -> bool {
    a.compare(b).is_some_and(Ordering::is_eq)
}

fn nulls_last(a: Value, b: Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.compare(&b).unwrap_or(Ordering::Equal),
    }
}

/// SQL `LIKE`: `%` matches any run, `_` one character.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('_') => {
                t += 1;
                p += 1;
            }
            Some(c) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((bp, bt)) => {
                    p = bp + 1;
                    t = bt + 1;
                    backtrack = Some((bp, bt + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}
