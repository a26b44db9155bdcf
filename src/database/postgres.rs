//! # Postgres Row Store
//!
//! [`RowStore`] over a sqlx [`PgPool`]. Statements are rendered through the
//! same clause walk used for logging, but with every literal sent as a bound
//! parameter. Rows come back as `jsonb` so the hydrator sees the same shape
//! the in-memory store produces.

use super::row_store::{Row, RowStore};
use crate::config::OrmConfig;
use crate::error::{OrmError, OrmResult, StoreError, StoreResult};
use crate::query_builder::{SqlWriter, Statement};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, QueryBuilder, Row as _, Transaction};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Postgres row store.
///
/// A store built with [`PgRowStore::new`] runs every statement straight on
/// the pool. `begin_transaction` checks out a connection into a new handle
/// that owns the transaction, so only statements issued through that handle
/// (or the savepoint handles it hands out) run inside it.
pub struct PgRowStore {
    pool: PgPool,
    transaction: Option<Arc<PgTransaction>>,
}

crate::debug_with_pgpool!(PgRowStore { pool: PgPool, transaction });

/// A transaction shared by a handle and its savepoint handles
struct PgTransaction {
    connection: Mutex<Option<Transaction<'static, Postgres>>>,
    level: AtomicUsize,
}

impl fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgTransaction")
            .field("level", &self.level.load(Ordering::SeqCst))
            .finish()
    }
}

impl PgRowStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            transaction: None,
        }
    }

    /// Connect using the configured database URL and pool size
    pub async fn connect(config: &OrmConfig) -> OrmResult<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| OrmError::Configuration("DATABASE_URL is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
            .map_err(StoreError::from)?;

        info!(max_connections = config.max_connections, "Connected Postgres row store");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn handle(&self, transaction: Arc<PgTransaction>) -> Arc<dyn RowStore> {
        Arc::new(PgRowStore {
            pool: self.pool.clone(),
            transaction: Some(transaction),
        })
    }

    fn bound(&self) -> StoreResult<&Arc<PgTransaction>> {
        self.transaction.as_ref().ok_or_else(|| {
            StoreError::Transaction("no open transaction on the shared store".to_string())
        })
    }

    async fn execute_on_transaction(&self, sql: &str) -> StoreResult<()> {
        let mut guard = self.bound()?.connection.lock().await;
        let connection = guard.as_mut().ok_or_else(finished)?;
        sqlx::query(sql).execute(&mut **connection).await?;
        Ok(())
    }

    /// Fetch through the owned transaction, or the pool when unbound
    async fn fetch_all<'q>(&self, query: Query<'q, Postgres, PgArguments>) -> StoreResult<Vec<PgRow>> {
        match &self.transaction {
            None => Ok(query.fetch_all(&self.pool).await?),
            Some(transaction) => {
                let mut guard = transaction.connection.lock().await;
                let connection = guard.as_mut().ok_or_else(finished)?;
                Ok(query.fetch_all(&mut **connection).await?)
            }
        }
    }
}

fn finished() -> StoreError {
    StoreError::Transaction("transaction already finished".to_string())
}

impl SqlWriter for QueryBuilder<'static, Postgres> {
    fn push_sql(&mut self, sql: &str) {
        self.push(sql);
    }

    fn push_value(&mut self, value: &Value) {
        match value {
            Value::Null => self.push_bind(Option::<String>::None),
            Value::Bool(flag) => self.push_bind(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(integer) => self.push_bind(integer),
                None => self.push_bind(number.as_f64().unwrap_or_default()),
            },
            Value::String(text) => self.push_bind(text.clone()),
            other => self.push_bind(sqlx::types::Json(other.clone())),
        };
    }
}

fn into_row(value: Value) -> StoreResult<Row> {
    match value {
        Value::Object(row) => Ok(row),
        other => Err(StoreError::Database(format!(
            "expected a jsonb object row, got {other}"
        ))),
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn select(&self, statement: &Statement) -> StoreResult<Vec<Row>> {
        let mut builder = QueryBuilder::<'static, Postgres>::new("SELECT to_jsonb(q) AS row FROM (");
        statement.write_sql(&mut builder);
        builder.push(") q");

        let rows = self.fetch_all(builder.build()).await?;

        rows.iter()
            .map(|row| {
                let value: Value = row.try_get("row")?;
                into_row(value)
            })
            .collect()
    }

    async fn insert(&self, table: &str, _key_name: &str, attributes: Row) -> StoreResult<Row> {
        let mut builder = QueryBuilder::<'static, Postgres>::new(format!("INSERT INTO {table} AS t"));
        if attributes.is_empty() {
            builder.push(" DEFAULT VALUES");
        } else {
            let columns: Vec<&str> = attributes.keys().map(String::as_str).collect();
            builder.push(format!(" ({}) VALUES (", columns.join(", ")));
            for (index, value) in attributes.values().enumerate() {
                if index > 0 {
                    builder.push(", ");
                }
                builder.push_value(value);
            }
            builder.push(")");
        }
        builder.push(" RETURNING to_jsonb(t) AS row");

        let row = self
            .fetch_all(builder.build())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Database(format!("insert into {table} returned no row")))?;
        let value: Value = row.try_get("row")?;
        into_row(value)
    }

    fn transaction_level(&self) -> usize {
        self.transaction
            .as_ref()
            .map_or(0, |transaction| transaction.level.load(Ordering::SeqCst))
    }

    async fn begin_transaction(&self) -> StoreResult<Arc<dyn RowStore>> {
        let Some(transaction) = &self.transaction else {
            let connection = self.pool.begin().await?;
            debug!(level = 1, "Began transaction level");
            return Ok(self.handle(Arc::new(PgTransaction {
                connection: Mutex::new(Some(connection)),
                level: AtomicUsize::new(1),
            })));
        };

        let level = transaction.level.load(Ordering::SeqCst);
        if level == 0 {
            return Err(finished());
        }
        self.execute_on_transaction(&format!("SAVEPOINT trans{}", level + 1))
            .await?;
        transaction.level.store(level + 1, Ordering::SeqCst);
        debug!(level = level + 1, "Began transaction level");
        Ok(self.handle(Arc::clone(transaction)))
    }

    async fn commit(&self) -> StoreResult<()> {
        let transaction = self.bound()?;
        match transaction.level.load(Ordering::SeqCst) {
            0 => Err(finished()),
            1 => {
                let connection = transaction.connection.lock().await.take().ok_or_else(finished)?;
                transaction.level.store(0, Ordering::SeqCst);
                connection.commit().await?;
                Ok(())
            }
            level => {
                self.execute_on_transaction(&format!("RELEASE SAVEPOINT trans{level}"))
                    .await?;
                transaction.level.store(level - 1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn rollback(&self) -> StoreResult<()> {
        let transaction = self.bound()?;
        match transaction.level.load(Ordering::SeqCst) {
            0 => Err(finished()),
            1 => {
                let connection = transaction.connection.lock().await.take().ok_or_else(finished)?;
                transaction.level.store(0, Ordering::SeqCst);
                connection.rollback().await?;
                Ok(())
            }
            level => {
                self.execute_on_transaction(&format!("ROLLBACK TO SAVEPOINT trans{level}"))
                    .await?;
                transaction.level.store(level - 1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}
