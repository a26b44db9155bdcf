//! # ORM Context
//!
//! Shared state every query is built from: the row store, registered model
//! types, global macros, the dispatch chain, the event publisher and the
//! configuration. A context is created once and shared behind an `Arc`.
//!
//! [`OrmContext::transaction`] derives a unit-of-work context that shares
//! every registry but owns its own transaction handle. Queries built from
//! it run inside that transaction; queries built from the shared context
//! (in this task or any other) never do.

use crate::config::OrmConfig;
use crate::database::{PgRowStore, RowStore};
use crate::error::{OrmError, OrmResult};
use crate::events::EventPublisher;
use crate::models::ModelType;
use crate::query::Query;
use crate::registry::{MacroRegistry, ResolverChain};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub struct OrmContext {
    store: Arc<dyn RowStore>,
    models: Arc<DashMap<String, Arc<ModelType>>>,
    macros: Arc<MacroRegistry>,
    dispatch: Arc<ResolverChain>,
    events: EventPublisher,
    config: OrmConfig,
}

impl OrmContext {
    pub fn new(store: Arc<dyn RowStore>, config: OrmConfig) -> Arc<Self> {
        Self::with_resolver_chain(store, config, ResolverChain::default_chain())
    }

    /// Build a context that dispatches dynamic calls through `dispatch`
    pub fn with_resolver_chain(
        store: Arc<dyn RowStore>,
        config: OrmConfig,
        dispatch: ResolverChain,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            models: Arc::new(DashMap::new()),
            macros: Arc::new(MacroRegistry::new()),
            dispatch: Arc::new(dispatch),
            events: EventPublisher::new(config.event_channel_capacity),
            config,
        })
    }

    /// Connect a Postgres row store from `config`
    pub async fn connect(config: OrmConfig) -> OrmResult<Arc<Self>> {
        config.validate()?;
        let store = PgRowStore::connect(&config).await?;
        info!(
            prevent_lazy_loading = config.prevent_lazy_loading,
            "ORM context connected"
        );
        Ok(Self::new(Arc::new(store), config))
    }

    /// Begin a transaction and return a context bound to it.
    ///
    /// Calling this on a context that is already bound opens a savepoint in
    /// the same transaction. Finish with [`OrmContext::commit`] or
    /// [`OrmContext::rollback`] on the returned context.
    pub async fn transaction(&self) -> OrmResult<Arc<Self>> {
        let store = self.store.begin_transaction().await?;
        debug!(level = store.transaction_level(), "Opened unit of work");
        Ok(Arc::new(Self {
            store,
            models: Arc::clone(&self.models),
            macros: Arc::clone(&self.macros),
            dispatch: Arc::clone(&self.dispatch),
            events: self.events.clone(),
            config: self.config.clone(),
        }))
    }

    pub async fn commit(&self) -> OrmResult<()> {
        Ok(self.store.commit().await?)
    }

    pub async fn rollback(&self) -> OrmResult<()> {
        Ok(self.store.rollback().await?)
    }

    /// Open level of this context's transaction, 0 for a shared context
    pub fn transaction_level(&self) -> usize {
        self.store.transaction_level()
    }

    /// Register a model type under its name, replacing any previous one
    pub fn register(&self, model_type: Arc<ModelType>) -> &Self {
        debug!(model = %model_type.name(), table = %model_type.table(), "Registering model type");
        self.models.insert(model_type.name().to_string(), model_type);
        self
    }

    pub fn model(&self, name: &str) -> OrmResult<Arc<ModelType>> {
        self.models
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| OrmError::ModelNotRegistered(name.to_string()))
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// A new query for the named model with its global scopes and default
    /// eager loads in place
    pub fn query(self: &Arc<Self>, name: &str) -> OrmResult<Query> {
        let model_type = self.model(name)?;
        Ok(self.query_for(model_type))
    }

    pub fn query_for(self: &Arc<Self>, model_type: Arc<ModelType>) -> Query {
        let mut query = Query::new(Arc::clone(self), Arc::clone(&model_type));
        for (id, scope) in model_type.global_scopes() {
            query.register_global_scope(id.clone(), scope.clone());
        }
        if !model_type.default_with().is_empty() {
            query.with(model_type.default_with().to_vec());
        }
        query
    }

    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    pub fn macros(&self) -> &MacroRegistry {
        &self.macros
    }

    pub fn dispatch_chain(&self) -> &ResolverChain {
        &self.dispatch
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }
}

impl fmt::Debug for OrmContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut models: Vec<String> = self.models.iter().map(|entry| entry.key().clone()).collect();
        models.sort();
        f.debug_struct("OrmContext")
            .field("store", &self.store)
            .field("models", &models)
            .field("macros", &self.macros)
            .field("dispatch", &self.dispatch.resolver_names())
            .field("config", &self.config)
            .finish()
    }
}
