//! PostgreSQL engine over a `deadpool-postgres` pool.

use crate::config::PoolConfig;
use crate::engine::{Engine, Session};
use crate::entity::Record;
use crate::error::{DaoError, DaoResult};
use crate::meta::EntityMeta;
use crate::plan::{PgStatement, QueryPlan};
use crate::value::Value;
use deadpool_postgres::{Client, Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::types::ToSql;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::{NoTls, Row, Socket};

/// An [`Engine`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgEngine {
    pool: Pool,
}

impl std::fmt::Debug for PgEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEngine")
            .field("status", &self.pool.status())
            .finish()
    }
}

impl PgEngine {
    /// Build a pool without TLS (local/dev setups).
    ///
    /// ```ignore
    /// let engine = pgdao::PgEngine::connect(&pgdao::PoolConfig::from_env()?)?;
    /// ```
    pub fn connect(config: &PoolConfig) -> DaoResult<Self> {
        Self::connect_with_tls(config, NoTls)
    }

    /// Build a pool using a custom TLS connector.
    pub fn connect_with_tls<T>(config: &PoolConfig, tls: T) -> DaoResult<Self>
    where
        T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
        T::Stream: Sync + Send,
        T::TlsConnect: Sync + Send,
        <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
    {
        let pg_config: tokio_postgres::Config = config
            .database_url
            .parse()
            .map_err(|e: tokio_postgres::Error| DaoError::infrastructure(e.to_string()))?;

        let manager = Manager::from_config(
            pg_config,
            tls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(config.max_size)
            .build()
            .map_err(|e| DaoError::infrastructure(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl Engine for PgEngine {
    type Session = PgSession;

    async fn open(&self) -> DaoResult<PgSession> {
        let client = self.pool.get().await?;
        Ok(PgSession {
            client: Some(client),
            in_transaction: false,
        })
    }
}

/// One pooled connection.
pub struct PgSession {
    client: Option<Client>,
    in_transaction: bool,
}

impl PgSession {
    fn client(&self) -> DaoResult<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| DaoError::infrastructure("Session is closed"))
    }

    async fn control(&mut self, command: &str) -> DaoResult<()> {
        tracing::debug!(target: "pgdao.tx", command);
        self.client()?
            .batch_execute(command)
            .await
            .map_err(DaoError::from_db_error)
    }

    async fn query(&self, sql: &str, params: &[Value]) -> DaoResult<Vec<Row>> {
        tracing::debug!(target: "pgdao.sql", sql, params = params.len());
        let params = as_params(params);
        self.client()?
            .query(sql, &params)
            .await
            .map_err(DaoError::from_db_error)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> DaoResult<u64> {
        tracing::debug!(target: "pgdao.sql", sql, params = params.len());
        let params = as_params(params);
        self.client()?
            .execute(sql, &params)
            .await
            .map_err(DaoError::from_db_error)
    }

    async fn run(&self, statement: PgStatement) -> DaoResult<Vec<Row>> {
        self.query(&statement.sql, &statement.params).await
    }
}

impl Session for PgSession {
    async fn begin(&mut self) -> DaoResult<()> {
        if self.in_transaction {
            return Err(DaoError::infrastructure("Transaction already active"));
        }
        self.control("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> DaoResult<()> {
        if !self.in_transaction {
            return Err(DaoError::infrastructure("No active transaction"));
        }
        // The server ends the transaction on COMMIT whether or not it succeeds.
        self.in_transaction = false;
        self.control("COMMIT").await
    }

    async fn rollback(&mut self) -> DaoResult<()> {
        if !self.in_transaction {
            return Err(DaoError::infrastructure("No active transaction"));
        }
        self.control("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn close(&mut self) -> DaoResult<()> {
        let client = self
            .client
            .take()
            .ok_or_else(|| DaoError::infrastructure("Session is closed"))?;
        if self.in_transaction {
            // Never hand a connection with an open transaction back to the pool.
            self.in_transaction = false;
            drop(Object::take(client));
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn fetch(&mut self, plan: &QueryPlan) -> DaoResult<Vec<Record>> {
        let rows = self.run(plan.to_sql()?).await?;
        rows.iter().map(to_record).collect()
    }

    async fn count(&mut self, plan: &QueryPlan) -> DaoResult<u64> {
        let rows = self.run(plan.to_count_sql()?).await?;
        let count: i64 = rows
            .first()
            .ok_or_else(|| DaoError::infrastructure("COUNT returned no rows"))?
            .try_get(0)
            .map_err(DaoError::from_db_error)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn get(&mut self, meta: &'static EntityMeta, id: &Value) -> DaoResult<Option<Record>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            meta.column_names().collect::<Vec<_>>().join(", "),
            meta.table,
            meta.id_column
        );
        let rows = self.query(&sql, std::slice::from_ref(id)).await?;
        rows.first().map(to_record).transpose()
    }

    async fn insert(&mut self, meta: &'static EntityMeta, record: &Record) -> DaoResult<Value> {
        let (columns, values): (Vec<&str>, Vec<Value>) = record
            .iter()
            .filter(|(c, v)| is_mapped(meta, c) && !(*c == meta.id_column && v.is_null()))
            .map(|(c, v)| (c, v.clone()))
            .unzip();

        let sql = if columns.is_empty() {
            format!(
                "INSERT INTO {} DEFAULT VALUES RETURNING {}",
                meta.table, meta.id_column
            )
        } else {
            let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("${i}")).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                meta.table,
                columns.join(", "),
                placeholders.join(", "),
                meta.id_column
            )
        };

        let rows = self.query(&sql, &values).await?;
        let row = rows
            .first()
            .ok_or_else(|| DaoError::infrastructure("INSERT returned no identifier"))?;
        row.try_get::<_, Value>(0).map_err(DaoError::from_db_error)
    }

    async fn update(&mut self, meta: &'static EntityMeta, id: &Value, record: &Record) -> DaoResult<u64> {
        let (columns, mut values): (Vec<&str>, Vec<Value>) = record
            .iter()
            .filter(|(c, _)| is_mapped(meta, c) && *c != meta.id_column)
            .map(|(c, v)| (c, v.clone()))
            .unzip();

        let assignments = if columns.is_empty() {
            format!("{0} = {0}", meta.id_column)
        } else {
            columns
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{c} = ${}", i + 1))
                .collect::<Vec<_>>()
                .join(", ")
        };
        values.push(id.clone());
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {} = ${}",
            meta.table,
            meta.id_column,
            values.len()
        );
        self.execute(&sql, &values).await
    }

    async fn delete(&mut self, meta: &'static EntityMeta, id: &Value) -> DaoResult<u64> {
        let sql = format!("DELETE FROM {} WHERE {} = $1", meta.table, meta.id_column);
        self.execute(&sql, std::slice::from_ref(id)).await
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        tracing::warn!(
            target: "pgdao.store",
            in_transaction = self.in_transaction,
            "postgres session dropped without close"
        );
        if self.in_transaction {
            drop(Object::take(client));
        }
    }
}

fn as_params(values: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

fn is_mapped(meta: &EntityMeta, column: &str) -> bool {
    meta.columns.iter().any(|c| c.column == column)
}

fn to_record(row: &Row) -> DaoResult<Record> {
    let mut record = Record::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        let value: Value = row.try_get(i).map_err(DaoError::from_db_error)?;
        record.set(column.name(), value);
    }
    Ok(record)
}
