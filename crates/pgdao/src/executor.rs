//! Scoped sessions and transactions.
//!
//! Every unit of work opens its own session and closes it on all exit paths.
//! Writes run inside a transaction that is committed on `Ok` and rolled back
//! on `Err`:
//!
//! ```ignore
//! let removed = executor
//!     .run_write(move |session| {
//!         Box::pin(async move { session.delete(meta, &id).await })
//!     })
//!     .await?;
//! ```
//!
//! Closures receive the session by `&mut` and return a boxed future borrowing
//! it, so they must own whatever else they capture.

use crate::engine::{Engine, Session};
use crate::error::{DaoError, DaoResult};
use futures_core::future::BoxFuture;

/// Runs units of work against an [`Engine`].
#[derive(Debug, Clone)]
pub struct Executor<E: Engine> {
    engine: E,
}

impl<E: Engine> Executor<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Open a session, run `work`, close the session.
    pub async fn run_read<T, F>(&self, work: F) -> DaoResult<T>
    where
        T: Send + 'static,
        F: for<'s> FnOnce(&'s mut E::Session) -> BoxFuture<'s, DaoResult<T>> + Send,
    {
        let mut session = self.engine.open().await?;
        let result = work(&mut session).await;
        finish(session, result).await
    }

    /// Open a session, begin, run `work`, then commit on `Ok` or roll back on
    /// `Err`. The session is closed in all cases.
    pub async fn run_write<T, F>(&self, work: F) -> DaoResult<T>
    where
        T: Send + 'static,
        F: for<'s> FnOnce(&'s mut E::Session) -> BoxFuture<'s, DaoResult<T>> + Send,
    {
        let mut session = self.engine.open().await?;
        if let Err(e) = session.begin().await {
            return finish(session, Err(e)).await;
        }
        tracing::trace!(target: "pgdao.tx", "transaction started");

        let result = match work(&mut session).await {
            Ok(value) => match session.commit().await {
                Ok(()) => {
                    tracing::debug!(target: "pgdao.tx", "transaction committed");
                    Ok(value)
                }
                Err(e) => Err(DaoError::infrastructure(format!("Commit failed: {e}"))),
            },
            Err(error) => match session.rollback().await {
                Ok(()) => {
                    tracing::debug!(target: "pgdao.tx", %error, "transaction rolled back");
                    Err(error)
                }
                Err(rollback_err) => {
                    tracing::error!(target: "pgdao.tx", %error, %rollback_err, "rollback failed");
                    Err(error.with_rollback_failure(&rollback_err))
                }
            },
        };
        finish(session, result).await
    }
}

/// Close `session`; a close failure only surfaces when `result` is `Ok`.
async fn finish<S: Session, T>(mut session: S, result: DaoResult<T>) -> DaoResult<T> {
    let closed = session.close().await;
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            tracing::warn!(target: "pgdao.store", %close_err, "failed to close session after error");
            Err(e)
        }
    }
}
