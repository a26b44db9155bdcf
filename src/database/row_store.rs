//! # Row Store
//!
//! The execution seam between the model query layer and a database. The
//! core only ever hands a [`Statement`] to the store and receives JSON rows
//! back, so it holds no connections or locks of its own. Transactions are
//! owned by the handle that began them, never by the shared store.

use crate::error::StoreResult;
use crate::query_builder::Statement;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A single fetched row, keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Executes statements on behalf of the query layer.
///
/// A store handle is either shared or bound to one transaction. The shared
/// handle never runs statements inside a transaction, whatever other tasks
/// have open. `begin_transaction` on it returns a new handle that owns a
/// fresh transaction at level 1. On a bound handle it creates savepoint
/// `trans{n + 1}` and returns another handle to the same transaction.
/// `commit` and `rollback` at level `n > 1` release or roll back to
/// savepoint `trans{n}`; at level 1 they finish the transaction.
#[async_trait]
pub trait RowStore: Send + Sync + fmt::Debug {
    /// Execute a select (or aggregate) statement
    async fn select(&self, statement: &Statement) -> StoreResult<Vec<Row>>;

    /// Insert one row and return it as stored, including generated keys
    async fn insert(&self, table: &str, key_name: &str, attributes: Row) -> StoreResult<Row>;

    /// Open level of this handle's transaction, 0 for the shared handle
    fn transaction_level(&self) -> usize;

    async fn begin_transaction(&self) -> StoreResult<Arc<dyn RowStore>>;

    async fn commit(&self) -> StoreResult<()>;

    async fn rollback(&self) -> StoreResult<()>;
}
