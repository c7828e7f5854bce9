//! Query builder: turns a [`PlanRequest`] into a parameter-safe [`QueryPlan`].
//!
//! Every caller value ends up in a named bind slot; only validated identifiers
//! and fixed operator spellings reach the query text.
//!
//! ```ignore
//! use pgdao::{Condition, PlanRequest, QueryBuilder, Registry, SortDirection, StoreConfig};
//!
//! let config = StoreConfig::default();
//! let plan = QueryBuilder::new(&config, Registry::global()).build(
//!     &PlanRequest::new("Order")
//!         .condition(Condition::gt("orderDate", "01-Jan-24"))
//!         .condition(Condition::lt("orderDate", "01-Feb-24"))
//!         .order_by("orderDate", SortDirection::Desc)
//!         .limit(20),
//! )?;
//!
//! // order_date > :orderDate AND order_date < :orderDate2
//! println!("{}", plan.where_clause());
//! ```

use crate::condition::{Arity, Condition, Operator};
use crate::config::StoreConfig;
use crate::error::{DaoError, DaoResult};
use crate::ident::Ident;
use crate::meta::{ColumnKind, EntityMeta, Registry};
use crate::value::Value;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

#[cfg(test)]
mod tests;

// ==================== Request ====================

/// Sort direction for `ORDER BY`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending { Self::Asc } else { Self::Desc }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for SortDirection {
    type Err = DaoError;

    fn from_str(s: &str) -> DaoResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(DaoError::validation(format!(
                "Sort direction must be ASC or DESC, got '{other}'"
            ))),
        }
    }
}

/// Offset/limit pagination, bound at execution time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl Page {
    pub fn new(offset: Option<u64>, limit: Option<u64>) -> Self {
        Self { offset, limit }
    }

    pub fn is_unbounded(&self) -> bool {
        self.offset.is_none() && self.limit.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct JoinRequest {
    entity: String,
    alias: Option<String>,
    left: String,
    right: String,
}

/// Everything a caller can ask of the query builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanRequest {
    target: String,
    conditions: Vec<Condition>,
    joins: Vec<JoinRequest>,
    sort: Option<(String, SortDirection)>,
    page: Page,
}

impl PlanRequest {
    /// Start a request against a record-type name.
    ///
    /// A comma-separated list (`"Order,Customer"`) selects the deprecated
    /// implicit-join form; prefer [`PlanRequest::join`].
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Add one condition (joined with `AND`).
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add several conditions.
    pub fn conditions(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    /// `INNER JOIN <entity> ON <left> = <right>`.
    ///
    /// `left`/`right` are alias-qualified fields (`ord.customerId`, `cus.id`). The
    /// joined entity's alias defaults to the first three letters of its name.
    pub fn join(
        mut self,
        entity: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.joins.push(JoinRequest {
            entity: entity.into(),
            alias: None,
            left: left.into(),
            right: right.into(),
        });
        self
    }

    /// Like [`PlanRequest::join`] with an explicit alias.
    pub fn join_as(
        mut self,
        entity: impl Into<String>,
        alias: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.joins.push(JoinRequest {
            entity: entity.into(),
            alias: Some(alias.into()),
            left: left.into(),
            right: right.into(),
        });
        self
    }

    /// Sort by one field. An empty field means no ordering.
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        let field = field.into();
        self.sort = (!field.is_empty()).then_some((field, direction));
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.page.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.page.limit = Some(limit);
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }
}

// ==================== Plan ====================

/// One record source in a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub meta: &'static EntityMeta,
    /// Alias used to qualify columns; only set when the plan joins.
    pub alias: Option<String>,
}

impl Source {
    fn qualify(&self, column: &str) -> Ident {
        Ident::trusted(self.alias.as_deref(), column)
    }

    fn from_sql(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} {alias}", self.meta.table),
            None => self.meta.table.to_string(),
        }
    }
}

/// `INNER JOIN source ON left = right`
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub source: Source,
    pub left: Ident,
    pub right: Ident,
}

/// Bind slots used by one predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    Slot(String),
    Pair(String, String),
    List(Vec<String>),
}

/// A resolved predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: Ident,
    pub operator: Operator,
    pub operand: Operand,
}

impl Predicate {
    /// Slot names referenced by this predicate, in bind order.
    pub fn slots(&self) -> Vec<&str> {
        match &self.operand {
            Operand::None => Vec::new(),
            Operand::Slot(s) => vec![s.as_str()],
            Operand::Pair(a, b) => vec![a.as_str(), b.as_str()],
            Operand::List(items) => items.iter().map(String::as_str).collect(),
        }
    }

    fn render(&self, placeholder: &mut impl FnMut(&str) -> String) -> String {
        let col = self.column.to_sql();
        let op = self.operator.symbol();
        match &self.operand {
            Operand::None => format!("{col} {op}"),
            Operand::Slot(s) => format!("{col} {op} {}", placeholder(s)),
            Operand::Pair(a, b) => {
                let lo = placeholder(a);
                let hi = placeholder(b);
                format!("{col} {op} {lo} AND {hi}")
            }
            Operand::List(items) if items.is_empty() => match self.operator {
                Operator::In => "1=0".to_string(),
                _ => "1=1".to_string(),
            },
            Operand::List(items) => {
                let list: Vec<String> = items.iter().map(|s| placeholder(s)).collect();
                format!("{col} {op} ({})", list.join(", "))
            }
        }
    }
}

/// A named bind value.
#[derive(Debug, Clone, PartialEq)]
pub struct Bind {
    pub slot: String,
    pub value: Value,
}

/// `ORDER BY column direction`
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: Ident,
    pub direction: SortDirection,
}

/// A statement ready for PostgreSQL: `$n` placeholders plus ordered values.
#[derive(Debug, Clone, PartialEq)]
pub struct PgStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// The built, parameterized query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub root: Option<Source>,
    pub joins: Vec<JoinClause>,
    pub predicates: Vec<Predicate>,
    pub binds: Vec<Bind>,
    pub order: Option<OrderBy>,
    pub page: Page,
}

impl QueryPlan {
    /// The primary source, or a validation error for a plan built from an
    /// empty target.
    pub fn require_root(&self) -> DaoResult<&Source> {
        self.root
            .as_ref()
            .ok_or_else(|| DaoError::validation("Query has no record type to select from"))
    }

    /// Value bound to `slot`.
    pub fn bind(&self, slot: &str) -> Option<&Value> {
        self.binds.iter().find(|b| b.slot == slot).map(|b| &b.value)
    }

    /// Predicates joined with `AND`, using `:slot` placeholders.
    pub fn where_clause(&self) -> String {
        self.render_where(&mut |slot| format!(":{slot}"))
    }

    fn render_where(&self, placeholder: &mut impl FnMut(&str) -> String) -> String {
        self.predicates
            .iter()
            .map(|p| p.render(placeholder))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn from_clause(&self, root: &Source) -> String {
        let mut sql = root.from_sql();
        for join in &self.joins {
            sql.push_str(&format!(
                " INNER JOIN {} ON {} = {}",
                join.source.from_sql(),
                join.left,
                join.right
            ));
        }
        sql
    }

    fn select_list(root: &Source) -> String {
        root.meta
            .column_names()
            .map(|c| root.qualify(c).to_sql())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render_select(&self, placeholder: &mut impl FnMut(&str) -> String) -> DaoResult<String> {
        let root = self.require_root()?;
        let mut sql = format!(
            "SELECT {} FROM {}",
            Self::select_list(root),
            self.from_clause(root)
        );
        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_where(placeholder));
        }
        if let Some(order) = &self.order {
            sql.push_str(&format!(" ORDER BY {} {}", order.column, order.direction));
        }
        Ok(sql)
    }

    /// Human-readable query text with named slots (pagination excluded).
    pub fn to_named_sql(&self) -> DaoResult<String> {
        self.render_select(&mut |slot| format!(":{slot}"))
    }

    fn positions(&self) -> HashMap<&str, usize> {
        self.binds
            .iter()
            .enumerate()
            .map(|(i, b)| (b.slot.as_str(), i + 1))
            .collect()
    }

    fn bound_values(&self) -> Vec<Value> {
        self.binds.iter().map(|b| b.value.clone()).collect()
    }

    /// Render for PostgreSQL, with pagination bound as `LIMIT`/`OFFSET` params.
    pub fn to_sql(&self) -> DaoResult<PgStatement> {
        let positions = self.positions();
        let mut sql = self.render_select(&mut |slot| positional(&positions, slot))?;
        let mut params = self.bound_values();

        if let Some(limit) = self.page.limit {
            params.push(Value::Int(clamp_i64(limit)));
            sql.push_str(&format!(" LIMIT ${}", params.len()));
        }
        if let Some(offset) = self.page.offset {
            params.push(Value::Int(clamp_i64(offset)));
            sql.push_str(&format!(" OFFSET ${}", params.len()));
        }
        Ok(PgStatement { sql, params })
    }

    /// `SELECT COUNT(*)` over the same sources and predicates.
    pub fn to_count_sql(&self) -> DaoResult<PgStatement> {
        let root = self.require_root()?;
        let positions = self.positions();
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.from_clause(root));
        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_where(&mut |slot| positional(&positions, slot)));
        }
        Ok(PgStatement {
            sql,
            params: self.bound_values(),
        })
    }
}

fn positional(positions: &HashMap<&str, usize>, slot: &str) -> String {
    match positions.get(slot) {
        Some(i) => format!("${i}"),
        None => "NULL".to_string(),
    }
}

fn clamp_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

// ==================== Builder ====================

/// Allocates unique bind-slot names within one plan.
#[derive(Debug, Default)]
struct SlotAllocator {
    used: HashSet<String>,
    occurrences: HashMap<String, usize>,
}

impl SlotAllocator {
    /// Slot for the n-th use of `base`: `base`, `base2`, `base3`, …
    fn next(&mut self, base: &str) -> String {
        let n = self.occurrences.entry(base.to_string()).or_insert(0);
        *n += 1;
        let candidate = if *n == 1 {
            base.to_string()
        } else {
            format!("{base}{n}")
        };
        self.claim(candidate)
    }

    fn claim(&mut self, candidate: String) -> String {
        let mut slot = candidate.clone();
        let mut suffix = 2;
        while self.used.contains(&slot) {
            slot = format!("{candidate}_{suffix}");
            suffix += 1;
        }
        self.used.insert(slot.clone());
        slot
    }
}

/// Translates [`PlanRequest`]s into [`QueryPlan`]s.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    config: &'a StoreConfig,
    registry: &'a Registry,
    primary: Option<&'static EntityMeta>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(config: &'a StoreConfig, registry: &'a Registry) -> Self {
        Self {
            config,
            registry,
            primary: None,
        }
    }

    /// Resolve `meta.name` to `meta` without consulting the registry.
    pub fn with_primary(mut self, meta: &'static EntityMeta) -> Self {
        self.primary = Some(meta);
        self
    }

    fn resolve(&self, name: &str) -> DaoResult<&'static EntityMeta> {
        match self.primary {
            Some(meta) if meta.name == name => Ok(meta),
            _ => self.registry.resolve(name),
        }
    }

    pub fn build(&self, request: &PlanRequest) -> DaoResult<QueryPlan> {
        let (root, joins) = self.resolve_sources(request)?;
        let mut sources: Vec<&Source> = Vec::with_capacity(1 + joins.len());
        if let Some(root) = &root {
            sources.push(root);
        }
        sources.extend(joins.iter().map(|j| &j.source));

        let mut slots = SlotAllocator::default();
        let mut predicates = Vec::with_capacity(request.conditions.len());
        let mut binds = Vec::new();

        for condition in &request.conditions {
            condition.check_shape()?;
            let caller_ident = Ident::parse(condition.field())?;
            let (column, kind) = self.resolve_field(&sources, &caller_ident)?;
            let base = caller_ident.slot_base();
            let coerce = |v: &Value| self.coerce(condition, kind, v);

            let operand = match condition.operator().arity() {
                Arity::None => Operand::None,
                Arity::Single => {
                    let slot = slots.next(&base);
                    let value = required(condition.value())?;
                    binds.push(Bind {
                        slot: slot.clone(),
                        value: coerce(value)?,
                    });
                    Operand::Slot(slot)
                }
                Arity::Pair => {
                    let slot = slots.next(&base);
                    let lo = slots.claim(format!("{slot}_lo"));
                    let hi = slots.claim(format!("{slot}_hi"));
                    binds.push(Bind {
                        slot: lo.clone(),
                        value: coerce(required(condition.value())?)?,
                    });
                    binds.push(Bind {
                        slot: hi.clone(),
                        value: coerce(required(condition.second_value())?)?,
                    });
                    Operand::Pair(lo, hi)
                }
                Arity::List => {
                    let slot = slots.next(&base);
                    let items = match condition.value() {
                        Some(Value::List(items)) => items,
                        _ => return Err(DaoError::validation("IN requires a list of values")),
                    };
                    let mut names = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        let name = slots.claim(format!("{slot}_{i}"));
                        binds.push(Bind {
                            slot: name.clone(),
                            value: coerce(item)?,
                        });
                        names.push(name);
                    }
                    Operand::List(names)
                }
            };

            predicates.push(Predicate {
                column,
                operator: condition.operator(),
                operand,
            });
        }

        let order = match &request.sort {
            Some((field, direction)) => {
                let ident = Ident::parse(field)?;
                let (column, _) = self.resolve_field(&sources, &ident)?;
                Some(OrderBy {
                    column,
                    direction: *direction,
                })
            }
            None => None,
        };

        let mut page = request.page;
        if let (Some(max), Some(limit)) = (self.config.max_page_size, page.limit) {
            page.limit = Some(limit.min(max));
        }

        Ok(QueryPlan {
            root,
            joins,
            predicates,
            binds,
            order,
            page,
        })
    }

    fn resolve_sources(&self, request: &PlanRequest) -> DaoResult<(Option<Source>, Vec<JoinClause>)> {
        let target = request.target.trim();
        if target.is_empty() {
            if !request.joins.is_empty() {
                return Err(DaoError::validation("Joins require a primary record type"));
            }
            return Ok((None, Vec::new()));
        }

        let names: Vec<&str> = target.split(',').map(str::trim).collect();
        if names.iter().any(|n| n.is_empty()) {
            return Err(DaoError::validation(format!("Malformed record type list '{target}'")));
        }

        let mut aliases = AliasSet::default();
        let root_meta = self.resolve(names[0])?;
        let joined = names.len() > 1 || !request.joins.is_empty();
        let root = Source {
            meta: root_meta,
            alias: joined.then(|| aliases.assign(root_meta.name)),
        };

        let mut joins: Vec<JoinClause> = Vec::new();
        if names.len() > 1 {
            if !self.config.legacy_joins {
                return Err(DaoError::validation(format!(
                    "Multi-type target '{target}' is disabled; use explicit joins"
                )));
            }
            tracing::warn!(
                target: "pgdao.store",
                target_types = target,
                "comma-separated record types are deprecated; use PlanRequest::join"
            );
            for name in &names[1..] {
                let meta = self.resolve(name)?;
                let source = Source {
                    meta,
                    alias: Some(aliases.assign(meta.name)),
                };
                let clause = implicit_join(&root, &joins, source)?;
                joins.push(clause);
            }
        }

        for join in &request.joins {
            let meta = self.resolve(&join.entity)?;
            let alias = match &join.alias {
                Some(alias) => {
                    Ident::parse(alias)?;
                    aliases.claim(alias)?
                }
                None => aliases.assign(meta.name),
            };
            let source = Source {
                meta,
                alias: Some(alias),
            };
            let mut all: Vec<&Source> = vec![&root];
            all.extend(joins.iter().map(|j| &j.source));
            all.push(&source);
            let (left, _) = self.resolve_field(&all, &Ident::parse(&join.left)?)?;
            let (right, _) = self.resolve_field(&all, &Ident::parse(&join.right)?)?;
            joins.push(JoinClause {
                source,
                left,
                right,
            });
        }

        Ok((Some(root), joins))
    }

    /// Map a caller field onto a source column.
    fn resolve_field(
        &self,
        sources: &[&Source],
        ident: &Ident,
    ) -> DaoResult<(Ident, Option<ColumnKind>)> {
        let found = match ident.qualifier() {
            Some(q) => sources
                .iter()
                .find(|s| s.alias.as_deref() == Some(q))
                .and_then(|s| s.meta.column(ident.name()).map(|c| (*s, c))),
            None => sources
                .iter()
                .find_map(|s| s.meta.column(ident.name()).map(|c| (*s, c))),
        };

        match found {
            Some((source, column)) => Ok((source.qualify(column.column), Some(column.kind))),
            None if self.config.strict_fields && !sources.is_empty() => {
                let target = sources[0].meta.name;
                Err(DaoError::validation(format!(
                    "Unknown field '{ident}' on record type '{target}'"
                )))
            }
            None => {
                if !sources.is_empty() {
                    tracing::warn!(
                        target: "pgdao.store",
                        field = %ident,
                        "field is not a mapped attribute; passing through unchecked"
                    );
                }
                Ok((ident.clone(), None))
            }
        }
    }

    /// Parse text literals bound to date-like fields.
    fn coerce(&self, condition: &Condition, kind: Option<ColumnKind>, value: &Value) -> DaoResult<Value> {
        if matches!(condition.operator(), Operator::Like | Operator::NotLike) {
            return Ok(value.clone());
        }
        let Value::Text(text) = value else {
            return Ok(value.clone());
        };
        let date_like = match kind {
            Some(kind) => kind.is_temporal(),
            None => condition.field().to_ascii_lowercase().contains("date"),
        };
        if !date_like {
            return Ok(value.clone());
        }

        let format = self.config.date_format.as_str();
        if let Ok(at) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Value::wall_clock(at, kind, &Local));
        }
        match NaiveDate::parse_from_str(text, format) {
            Ok(day) if kind == Some(ColumnKind::Date) => Ok(Value::Date(day)),
            Ok(day) => Ok(Value::wall_clock(day.and_time(NaiveTime::MIN), kind, &Local)),
            Err(e) => Err(DaoError::validation(format!(
                "Cannot parse '{text}' for '{}' with format '{format}': {e}",
                condition.field()
            ))),
        }
    }
}

fn required(value: Option<&Value>) -> DaoResult<&Value> {
    value.ok_or_else(|| DaoError::validation("Condition is missing a value"))
}

/// Join `source` to the root or an earlier join through a `references` column.
fn implicit_join(root: &Source, earlier: &[JoinClause], source: Source) -> DaoResult<JoinClause> {
    let candidates = std::iter::once(root).chain(earlier.iter().map(|j| &j.source));
    for prior in candidates {
        if let Some(fk) = prior.meta.reference_to(source.meta.name) {
            let left = prior.qualify(fk.column);
            let right = source.qualify(source.meta.id_column);
            return Ok(JoinClause { source, left, right });
        }
        if let Some(fk) = source.meta.reference_to(prior.meta.name) {
            let left = prior.qualify(prior.meta.id_column);
            let right = source.qualify(fk.column);
            return Ok(JoinClause { source, left, right });
        }
    }
    Err(DaoError::validation(format!(
        "No reference between '{}' and the preceding record types; use an explicit join",
        source.meta.name
    )))
}

/// Alias assignment: first three letters of the type name, de-duplicated.
#[derive(Debug, Default)]
struct AliasSet {
    used: HashSet<String>,
}

impl AliasSet {
    fn assign(&mut self, name: &str) -> String {
        let base: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
        let mut alias = base.clone();
        let mut n = 2;
        while self.used.contains(&alias) {
            alias = format!("{base}{n}");
            n += 1;
        }
        self.used.insert(alias.clone());
        alias
    }

    fn claim(&mut self, alias: &str) -> DaoResult<String> {
        if !self.used.insert(alias.to_string()) {
            return Err(DaoError::validation(format!("Duplicate alias '{alias}'")));
        }
        Ok(alias.to_string())
    }
}
