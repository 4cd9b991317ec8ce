//! Transaction helpers: macros and Savepoint API.
//!
//! Prefer passing a transaction (`tokio_postgres::Transaction` or
//! `deadpool_postgres::Transaction`) into APIs that accept [`Executor`].
//! This keeps query code easy to compose with or without transactions.
//!
//! For ergonomic commit/rollback handling, use the [`transaction!`] macro or
//! [`Connection::transaction`](crate::Connection::transaction).
//!
//! # Example
//!
//! ```ignore
//! use fluentpg::{table, DbResult};
//! use tokio_postgres::NoTls;
//!
//! # async fn demo() -> DbResult<()> {
//! let (mut client, connection) = tokio_postgres::connect("postgres://...", NoTls).await?;
//! tokio::spawn(async move { let _ = connection.await; });
//!
//! fluentpg::transaction!(&mut client, tx, {
//!     table("accounts")
//!         .set_raw("balance", "balance - 100")
//!         .eq("id", 1i64)
//!         .update(&tx)
//!         .await?;
//!     table("accounts")
//!         .set_raw("balance", "balance + 100")
//!         .eq("id", 2i64)
//!         .update(&tx)
//!         .await?;
//!     Ok(())
//! })?;
//! # Ok(()) }
//! ```

use crate::error::{DbError, DbResult};
use crate::executor::Executor;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

/// Global counter for anonymous savepoint naming.
static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Runs the given block inside a database transaction.
///
/// - Begins a transaction via `$client.transaction().await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`.
///
/// The block must evaluate to `fluentpg::DbResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($client:expr, $tx:ident, $body:block) => {{
        let mut $tx = ($client)
            .transaction()
            .await
            .map_err($crate::DbError::from_tx_error)?;

        let __fluentpg_tx_body_result = async { $body }.await;
        match __fluentpg_tx_body_result {
            Ok(value) => {
                $tx.commit()
                    .await
                    .map_err($crate::DbError::from_tx_error)?;
                Ok(value)
            }
            Err(error) => match $tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::DbError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}

/// Runs the given block inside a savepoint within an existing transaction.
///
/// - Creates a savepoint on `$tx`.
/// - Releases (commits) on `Ok(_)`.
/// - Rolls back to savepoint on `Err(_)`.
///
/// The block must evaluate to `fluentpg::DbResult<T>`.
///
/// # Example
///
/// ```ignore
/// fluentpg::transaction!(&mut client, tx, {
///     let order_id: i64 = table("orders")
///         .set("user_id", 1i64)
///         .insert_get_id(&tx)
///         .await?;
///
///     // savepoint: audit failure won't affect the order
///     let audit_result = fluentpg::savepoint!(tx, "audit", sp, {
///         table("audit_log").set("order_id", order_id).insert(&sp).await?;
///         Ok(())
///     });
///
///     if let Err(e) = audit_result {
///         tracing::warn!("audit insert failed: {e}");
///     }
///
///     Ok(order_id)
/// })?;
/// ```
#[macro_export]
macro_rules! savepoint {
    // Named savepoint
    ($tx:expr, $name:expr, $sp:ident, $body:block) => {{
        let mut $sp = ($tx)
            .savepoint($name)
            .await
            .map_err($crate::DbError::from_tx_error)?;

        let __fluentpg_sp_body_result = async { $body }.await;
        match __fluentpg_sp_body_result {
            Ok(value) => {
                $sp.commit()
                    .await
                    .map_err($crate::DbError::from_tx_error)?;
                Ok(value)
            }
            Err(error) => match $sp.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::DbError::Other(format!(
                    "{error} (savepoint rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
    // Anonymous savepoint
    ($tx:expr, $sp:ident, $body:block) => {{
        let __fluentpg_sp_name = $crate::__next_savepoint_name();
        $crate::savepoint!($tx, &__fluentpg_sp_name, $sp, $body)
    }};
}

/// Runs the given block inside a nested transaction (savepoint).
///
/// Use this when you want a sub-transaction within an existing transaction:
/// the inner block gets its own savepoint that can be rolled back without
/// affecting the outer transaction.
#[macro_export]
macro_rules! nested_transaction {
    ($tx:expr, $inner:ident, $body:block) => {{
        let __fluentpg_sp_name = $crate::__next_savepoint_name();
        $crate::savepoint!($tx, &__fluentpg_sp_name, $inner, $body)
    }};
}

/// Generate a unique anonymous savepoint name.
///
/// This is a public helper used by the `savepoint!` and `nested_transaction!`
/// macros. Not intended for direct use.
#[doc(hidden)]
pub fn __next_savepoint_name() -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("fluentpg_sp_{n}")
}

// ─── Savepoint wrapper ──────────────────────────────────────────────────────

/// A named savepoint within a transaction.
///
/// Wraps a nested `tokio_postgres::Transaction` created via `savepoint()`.
/// Provides explicit `release()` and `rollback()` methods, and implements
/// [`Executor`] for query execution within the savepoint scope.
///
/// # Example
///
/// ```ignore
/// use fluentpg::TransactionExt;
///
/// fluentpg::transaction!(&mut client, tx, {
///     let mut tx = tx;
///     let sp = tx.savepoint_named("before_items").await?;
///
///     match table("order_items").set("order_id", 7i64).insert(&sp).await {
///         Ok(_) => sp.release().await?,
///         Err(e) => {
///             sp.rollback().await?;
///             tracing::warn!("failed to insert items: {e}");
///         }
///     }
///
///     Ok(())
/// })?;
/// ```
pub struct Savepoint<'a> {
    inner: Option<tokio_postgres::Transaction<'a>>,
    name: String,
}

impl<'a> Savepoint<'a> {
    fn new(inner: tokio_postgres::Transaction<'a>, name: String) -> Self {
        Self {
            inner: Some(inner),
            name,
        }
    }

    /// Returns the savepoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the savepoint (make changes permanent within the transaction).
    ///
    /// Equivalent to `RELEASE SAVEPOINT name`.
    pub async fn release(mut self) -> DbResult<()> {
        if let Some(tx) = self.inner.take() {
            tx.commit().await.map_err(DbError::from_tx_error)?;
        }
        Ok(())
    }

    /// Roll back to this savepoint (undo changes made since the savepoint).
    ///
    /// Equivalent to `ROLLBACK TO SAVEPOINT name`.
    pub async fn rollback(mut self) -> DbResult<()> {
        if let Some(tx) = self.inner.take() {
            tx.rollback().await.map_err(DbError::from_tx_error)?;
        }
        Ok(())
    }

    fn tx(&self) -> DbResult<&tokio_postgres::Transaction<'a>> {
        self.inner
            .as_ref()
            .ok_or_else(|| DbError::Other("savepoint already consumed".to_string()))
    }
}

impl Drop for Savepoint<'_> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            // tokio_postgres::Transaction::drop already handles rollback
            // when dropped without commit. We just log a warning.
            tracing::warn!(
                "Savepoint '{}' dropped without explicit release or rollback",
                self.name,
            );
        }
    }
}

impl Executor for Savepoint<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<Vec<Row>> {
        Executor::query(self.tx()?, sql, params).await
    }

    async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<Row> {
        Executor::query_one(self.tx()?, sql, params).await
    }

    async fn query_opt(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<Option<Row>> {
        Executor::query_opt(self.tx()?, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<u64> {
        Executor::execute(self.tx()?, sql, params).await
    }
}

// ─── TransactionExt ─────────────────────────────────────────────────────────

/// Extension trait adding savepoint support to transactions.
///
/// # Example
///
/// ```ignore
/// use fluentpg::TransactionExt;
///
/// let mut tx = client.transaction().await?;
/// let sp = tx.savepoint_named("before_risky_op").await?;
/// // ... do work ...
/// sp.release().await?;
/// tx.commit().await?;
/// ```
pub trait TransactionExt {
    /// Create a named savepoint within this transaction.
    fn savepoint_named(
        &mut self,
        name: &str,
    ) -> impl Future<Output = DbResult<Savepoint<'_>>> + Send;

    /// Create an anonymous savepoint (auto-numbered) within this transaction.
    fn savepoint_anon(&mut self) -> impl Future<Output = DbResult<Savepoint<'_>>> + Send;
}

impl TransactionExt for tokio_postgres::Transaction<'_> {
    async fn savepoint_named(&mut self, name: &str) -> DbResult<Savepoint<'_>> {
        let inner = self.savepoint(name).await.map_err(DbError::from_tx_error)?;
        Ok(Savepoint::new(inner, name.to_string()))
    }

    async fn savepoint_anon(&mut self) -> DbResult<Savepoint<'_>> {
        let name = __next_savepoint_name();
        let inner = self
            .savepoint(&name)
            .await
            .map_err(DbError::from_tx_error)?;
        Ok(Savepoint::new(inner, name))
    }
}

#[cfg(feature = "pool")]
impl TransactionExt for deadpool_postgres::Transaction<'_> {
    async fn savepoint_named(&mut self, name: &str) -> DbResult<Savepoint<'_>> {
        // Go through DerefMut so the savepoint is a plain
        // tokio_postgres::Transaction, not the deadpool wrapper.
        let inner_tx: &mut tokio_postgres::Transaction<'_> = std::ops::DerefMut::deref_mut(self);
        let inner = inner_tx
            .savepoint(name)
            .await
            .map_err(DbError::from_tx_error)?;
        Ok(Savepoint::new(inner, name.to_string()))
    }

    async fn savepoint_anon(&mut self) -> DbResult<Savepoint<'_>> {
        let name = __next_savepoint_name();
        let inner_tx: &mut tokio_postgres::Transaction<'_> = std::ops::DerefMut::deref_mut(self);
        let inner = inner_tx
            .savepoint(&name)
            .await
            .map_err(DbError::from_tx_error)?;
        Ok(Savepoint::new(inner, name))
    }
}
