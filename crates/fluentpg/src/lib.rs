//! # fluentpg
//!
//! A fluent, parameter-safe PostgreSQL query builder for Rust.
//!
//! ## Features
//!
//! - **Fluent chaining**: build SELECT/INSERT/UPDATE/DELETE with method chains
//! - **Parameter safety**: every value travels as a `$n` binding, never
//!   spliced into the SQL text; operators are allowlisted
//! - **Type-safe mapping**: Row → Struct via the `FromRow` trait
//! - **Transaction-friendly**: pass a transaction anywhere an `Executor`
//!   is expected; savepoints give nested rollback scopes
//! - **Safe defaults**: DELETE without WHERE is a no-op, UPDATE requires SET
//!
//! ## Query builder
//!
//! ```ignore
//! use fluentpg::table;
//!
//! // SELECT
//! let users = table("users")
//!     .eq("status", "active")
//!     .order_by("created_at DESC")
//!     .limit(10)
//!     .fetch_all::<User>(&client)
//!     .await?;
//!
//! // INSERT
//! table("users")
//!     .set("username", "alice")
//!     .set("email", "alice@example.com")
//!     .insert(&client)
//!     .await?;
//!
//! // UPDATE
//! table("users")
//!     .set("status", "inactive")
//!     .eq("id", user_id)
//!     .update(&client)
//!     .await?;
//!
//! // DELETE
//! table("users")
//!     .eq("id", user_id)
//!     .delete(&client)
//!     .await?;
//! ```

pub mod binding;
pub mod builder;
pub mod clause;
pub mod error;
pub mod executor;
pub mod grammar;
pub mod row;
pub mod transaction;

pub use binding::{Binding, Bindings};
pub use builder::{table, QueryBuilder};
pub use clause::{check_operator, Clause, ClauseGroup, Connector, DatePart};
pub use error::{DbError, DbResult};
pub use executor::Executor;
pub use row::{FromRow, RowExt};
pub use transaction::{Savepoint, TransactionExt};

#[doc(hidden)]
pub use transaction::__next_savepoint_name;

#[cfg(feature = "pool")]
pub mod connection;

#[cfg(feature = "pool")]
pub use connection::{Connection, TxFuture};
