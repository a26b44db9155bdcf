use super::Query;
use crate::database::Row;
use crate::error::OrmResult;
use crate::events::names;
use crate::logging::log_query_operation;
use crate::models::Model;
use crate::query_builder::{AggregateFunction, Statement, AGGREGATE_ALIAS};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

impl Query {
    /// Apply scopes, fetch and hydrate the matching models, then eager load
    /// the requested relations onto them
    #[instrument(skip(self), fields(model = %self.model.name()))]
    pub async fn get(&self) -> OrmResult<Vec<Model>> {
        let scoped = self.apply_scopes();
        let mut models = scoped.get_models().await?;

        if !models.is_empty() {
            scoped.eager_load_relations(&mut models).await?;
        }
        Ok(models)
    }

    /// Like [`Query::get`], selecting `columns` unless a selection is
    /// already set
    pub async fn get_columns(&self, columns: &[&str]) -> OrmResult<Vec<Model>> {
        let mut query = self.clone();
        if query.statement.columns().is_empty() {
            query.statement.select(columns);
        }
        query.get().await
    }

    /// Fetch and hydrate without scopes or eager loading
    pub async fn get_models(&self) -> OrmResult<Vec<Model>> {
        let rows = self.fetch_rows(&self.statement).await?;
        Ok(self.hydrate(rows))
    }

    async fn fetch_rows(&self, statement: &Statement) -> OrmResult<Vec<Row>> {
        let started = Instant::now();
        let rows = self.ctx.store().select(statement).await?;

        if self.ctx.config().log_queries {
            log_query_operation(
                self.model.name(),
                statement.table(),
                &statement.to_sql(),
                statement.raw_bindings().len(),
                rows.len(),
                started.elapsed(),
            );
        }
        Ok(rows)
    }

    /// Turn rows into models, firing `retrieved` for each. Models fetched as
    /// part of a multi-row result refuse lazy loading when the context is
    /// configured to prevent it.
    pub fn hydrate(&self, rows: Vec<Row>) -> Vec<Model> {
        let prevent_lazy_loading = rows.len() > 1 && self.ctx.config().prevent_lazy_loading;
        let events = self.ctx.events();

        rows.into_iter()
            .map(|row| {
                let mut model = Model::from_row(Arc::clone(&self.model), row);
                model.set_prevents_lazy_loading(prevent_lazy_loading);
                events.publish(
                    names::RETRIEVED,
                    self.model.name(),
                    model.key().cloned().unwrap_or(Value::Null),
                );
                model
            })
            .collect()
    }

    pub async fn first(&self) -> OrmResult<Option<Model>> {
        let mut query = self.clone();
        query.statement.limit(1);
        Ok(query.get().await?.into_iter().next())
    }

    pub async fn find(&self, id: impl Into<Value>) -> OrmResult<Option<Model>> {
        let mut query = self.clone();
        let key = self.model.qualified_key_name();
        query.statement.where_eq(&key, id);
        query.first().await
    }

    /// First model whose columns equal every entry of `attributes`
    pub async fn first_where(&self, attributes: &Row) -> OrmResult<Option<Model>> {
        let mut query = self.clone();
        for (column, value) in attributes {
            query.statement.where_eq(column, value.clone());
        }
        query.first().await
    }

    /// Run an aggregate over the scoped statement
    pub async fn aggregate(&self, function: AggregateFunction, column: &str) -> OrmResult<Value> {
        let scoped = self.apply_scopes();
        let statement = scoped.statement.to_aggregate(function, column);
        let rows = self.fetch_rows(&statement).await?;

        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove(AGGREGATE_ALIAS))
            .unwrap_or(Value::Null))
    }

    pub async fn count(&self) -> OrmResult<u64> {
        let value = self.aggregate(AggregateFunction::Count, "*").await?;
        Ok(match &value {
            Value::Number(number) => number.as_u64().unwrap_or_default(),
            Value::String(text) => text.parse().unwrap_or_default(),
            _ => 0,
        })
    }

    pub async fn exists(&self) -> OrmResult<bool> {
        let scoped = self.apply_scopes();
        let mut statement = scoped.statement.clone();
        statement.limit(1);
        Ok(!self.fetch_rows(&statement).await?.is_empty())
    }

    /// Insert a new record and fire `created`
    #[instrument(skip(self, attributes), fields(model = %self.model.name()))]
    pub async fn create(&self, attributes: Row) -> OrmResult<Model> {
        let row = self
            .ctx
            .store()
            .insert(self.model.table(), self.model.key_name(), attributes)
            .await?;

        let model = Model::from_row(Arc::clone(&self.model), row);
        self.ctx.events().publish(
            names::CREATED,
            self.model.name(),
            model.key().cloned().unwrap_or(Value::Null),
        );
        debug!(key = ?model.key(), "Created model");
        Ok(model)
    }

    /// Create a record unless a concurrent writer already created it.
    ///
    /// When this query's context is bound to a transaction the insert runs
    /// in a savepoint of that transaction, so a unique violation does not
    /// abort it. On a unique violation the record is looked up by
    /// `attributes`; if that finds nothing the original violation is
    /// returned.
    pub async fn create_or_first(&self, attributes: Row, values: Row) -> OrmResult<Model> {
        let mut merged = attributes.clone();
        merged.extend(values);

        match self.with_savepoint_if_needed(|| self.create(merged)).await {
            Ok(model) => Ok(model),
            Err(error) if error.is_unique_violation() => {
                warn!(
                    model = %self.model.name(),
                    "Unique violation during create, falling back to lookup"
                );
                match self.first_where(&attributes).await? {
                    Some(model) => Ok(model),
                    None => Err(error),
                }
            }
            Err(error) => Err(error),
        }
    }

    /// Return the first record matching `attributes`, creating it with
    /// `values` merged in when none exists
    pub async fn first_or_create(&self, attributes: Row, values: Row) -> OrmResult<Model> {
        if let Some(model) = self.first_where(&attributes).await? {
            return Ok(model);
        }
        self.create_or_first(attributes, values).await
    }

    async fn with_savepoint_if_needed<T, F, Fut>(&self, operation: F) -> OrmResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OrmResult<T>>,
    {
        let store = self.ctx.store();
        if store.transaction_level() == 0 {
            return operation().await;
        }

        // The savepoint handle shares this query's transaction, so the
        // operation's statements land inside the savepoint
        let savepoint = store.begin_transaction().await?;
        match operation().await {
            Ok(value) => {
                savepoint.commit().await?;
                Ok(value)
            }
            Err(error) => {
                savepoint.rollback().await?;
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::context::OrmContext;
    use crate::database::MemoryRowStore;
    use crate::models::ModelType;
    use crate::config::OrmConfig;
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> (Arc<MemoryRowStore>, Arc<OrmContext>) {
        let store = Arc::new(MemoryRowStore::new());
        store.seed(
            "users",
            vec![
                json!({"id": 1, "name": "Ada", "active": true}),
                json!({"id": 2, "name": "Grace", "active": false}),
                json!({"id": 3, "name": "Linus", "active": true}),
            ],
        );
        let ctx = OrmContext::new(store.clone(), OrmConfig::default());
        ctx.register(
            ModelType::builder("User")
                .global_scope("active", |query| {
                    query.where_eq("active", true);
                })
                .build(),
        );
        (store, ctx)
    }

    #[tokio::test]
    async fn test_get_applies_global_scopes() {
        let (_, ctx) = context();
        let users = ctx.query("User").unwrap().get().await.unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|user| user.exists()));
    }

    #[tokio::test]
    async fn test_count_and_exists_use_scoped_statement() {
        let (_, ctx) = context();
        let query = ctx.query("User").unwrap();
        assert_eq!(query.count().await.unwrap(), 2);

        let mut grace = ctx.query("User").unwrap();
        grace.where_eq("name", "Grace");
        assert!(!grace.exists().await.unwrap());
        grace.without_global_scope("active");
        assert!(grace.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_find_and_first() {
        let (_, ctx) = context();
        let query = ctx.query("User").unwrap();
        let user = query.find(3).await.unwrap().unwrap();
        assert_eq!(user.get("name"), Some(&json!("Linus")));
        assert!(query.find(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_fires_created_event() {
        let (store, ctx) = context();
        let mut events = ctx.events().subscribe();

        let mut attributes = crate::database::Row::new();
        attributes.insert("name".to_string(), json!("Barbara"));
        attributes.insert("active".to_string(), json!(true));
        let user = ctx.query("User").unwrap().create(attributes).await.unwrap();

        assert_eq!(user.key(), Some(&json!(4)));
        assert_eq!(store.rows("users").len(), 4);
        let event = events.recv().await.unwrap();
        assert_eq!(event.name, "created");
        assert_eq!(event.key, json!(4));
    }
}
