//! # Database Operations
//!
//! Row stores that execute [`Statement`](crate::query_builder::Statement)s
//! on behalf of the model query layer.
//!
//! ## Key Components
//!
//! - [`row_store`] - The [`RowStore`] trait and the [`Row`] shape
//! - [`memory`] - [`MemoryRowStore`], an in-process store with a statement log
//! - [`postgres`] - [`PgRowStore`], sqlx-backed Postgres execution with savepoints
//!
//! ## Example Usage
//!
//! ```rust
//! use tasker_orm::database::{MemoryRowStore, RowStore};
//! use tasker_orm::query_builder::Statement;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryRowStore::new();
//! store.seed("users", vec![json!({"id": 1, "name": "Ada"})]);
//!
//! let mut statement = Statement::new("users");
//! statement.where_eq("id", 1);
//! let rows = store.select(&statement).await?;
//! assert_eq!(rows.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod postgres;
pub mod row_store;

pub use memory::{LoggedStatement, MemoryRowStore};
pub use postgres::PgRowStore;
pub use row_store::{Row, RowStore};
