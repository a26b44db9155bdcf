//! # Model Queries
//!
//! [`Query`] wraps a [`Statement`] for one model type together with the
//! query's scope registry, eager-load specification and local macros.
//!
//! A query is a per-operation value: it is never shared between tasks,
//! and cloning is the only way to derive one query from another. Scope
//! application clones the query and leaves the original untouched.
//!
//! ## Key Components
//!
//! - [`execution`] - Fetching, hydration, aggregates and create-or-fetch
//! - [`eager_loading`] - One statement per relation level, matched in memory
//! - [`dispatch`] - Dynamic method calls resolved through the context's resolver chain

pub mod dispatch;
pub mod eager_loading;
pub mod execution;

pub use dispatch::{Dispatched, PassthroughMethod};

use crate::context::OrmContext;
use crate::eager::{EagerLoadSpec, Include, NestedSpec};
use crate::error::{OrmError, OrmResult};
use crate::models::ModelType;
use crate::query_builder::{Boolean, Direction, Statement};
use crate::registry::Macro;
use crate::relations::Relation;
use crate::scopes::{add_new_wheres_within_group, scope_id, GlobalScope, Scope, ScopeRegistry};
use indexmap::IndexMap;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct Query {
    ctx: Arc<OrmContext>,
    model: Arc<ModelType>,
    statement: Statement,
    scopes: ScopeRegistry,
    eager_load: EagerLoadSpec,
    local_macros: IndexMap<String, Macro>,
}

impl Query {
    /// A bare query over `model`'s table with no scopes or eager loads.
    /// [`OrmContext::query`] is the usual entry point.
    pub fn new(ctx: Arc<OrmContext>, model: Arc<ModelType>) -> Self {
        let statement = Statement::new(model.table());
        Self {
            ctx,
            model,
            statement,
            scopes: ScopeRegistry::new(),
            eager_load: EagerLoadSpec::new(),
            local_macros: IndexMap::new(),
        }
    }

    pub fn context(&self) -> &Arc<OrmContext> {
        &self.ctx
    }

    pub fn model(&self) -> &Arc<ModelType> {
        &self.model
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn statement_mut(&mut self) -> &mut Statement {
        &mut self.statement
    }

    pub fn scopes(&self) -> &ScopeRegistry {
        &self.scopes
    }

    // Global scopes

    pub fn with_global_scope<F>(&mut self, id: &str, scope: F) -> &mut Self
    where
        F: Fn(&mut Query) + Send + Sync + 'static,
    {
        self.register_global_scope(id.to_string(), GlobalScope::function(scope))
    }

    /// Register an object scope under its type name and run its `extend` hook
    pub fn with_global_scope_object<S: Scope + 'static>(&mut self, scope: S) -> &mut Self {
        self.register_global_scope(scope_id::<S>(), GlobalScope::object(scope))
    }

    pub(crate) fn register_global_scope(&mut self, id: String, scope: GlobalScope) -> &mut Self {
        if let GlobalScope::Object(object) = &scope {
            object.extend(self);
        }
        self.scopes.insert(id, scope);
        self
    }

    pub fn without_global_scope(&mut self, id: &str) -> &mut Self {
        self.scopes.remove(id);
        self
    }

    pub fn without_global_scope_type<S: Scope + 'static>(&mut self) -> &mut Self {
        self.without_global_scope(&scope_id::<S>())
    }

    /// Remove the named scopes, or all of them for `None`
    pub fn without_global_scopes(&mut self, ids: Option<&[&str]>) -> &mut Self {
        self.scopes.remove_all(ids);
        self
    }

    pub fn without_global_scopes_except(&mut self, keep: &[&str]) -> &mut Self {
        self.scopes.remove_except(keep);
        self
    }

    pub fn removed_scopes(&self) -> &[String] {
        self.scopes.removed()
    }

    /// Apply every registered global scope to a clone of this query.
    ///
    /// Returns the query itself when no scopes are registered. Scopes run in
    /// registration order; one removed from the clone by an earlier scope is
    /// skipped. The returned query has no scopes left to apply.
    pub fn apply_scopes(&self) -> Cow<'_, Query> {
        if self.scopes.is_empty() {
            return Cow::Borrowed(self);
        }

        let mut scoped = self.clone();
        let model = Arc::clone(&self.model);
        for (id, scope) in self.scopes.iter() {
            if !scoped.scopes.contains(id) {
                continue;
            }
            scoped.call_scope(|query| scope.apply(query, &model));
        }
        // The scoped query carries its predicates; applying again must not duplicate them
        scoped.scopes = ScopeRegistry::new();

        debug!(
            model = %self.model.name(),
            scopes = self.scopes.len(),
            predicates = scoped.statement.wheres().len(),
            "Applied global scopes"
        );
        Cow::Owned(scoped)
    }

    /// Run `scope` and re-group any predicates it added against the ones
    /// already present
    pub fn call_scope<F, R>(&mut self, scope: F) -> R
    where
        F: FnOnce(&mut Query) -> R,
    {
        let original_count = self.statement.wheres().len();
        let result = scope(self);

        if self.statement.wheres().len() > original_count {
            add_new_wheres_within_group(self.statement.wheres_mut(), original_count);
        }
        result
    }

    /// Invoke a named scope of the model
    pub fn scope(&mut self, name: &str, args: &[Value]) -> OrmResult<&mut Self> {
        let scope = self
            .model
            .named_scope(name)
            .ok_or_else(|| self.bad_method_call(name))?;
        self.call_scope(|query| scope(query, args))?;
        Ok(self)
    }

    // Eager loads

    /// Add relations to eager load. Constraints for a path that is already
    /// present run after the existing ones.
    pub fn with(&mut self, spec: impl Into<NestedSpec>) -> &mut Self {
        self.eager_load.merge(EagerLoadSpec::parse(spec));
        self
    }

    pub fn with_constraint<F>(&mut self, path: &str, constraint: F) -> &mut Self
    where
        F: Fn(&mut Relation) + Send + Sync + 'static,
    {
        self.with(Include::constrained(path, constraint))
    }

    pub fn without(&mut self, paths: &[&str]) -> &mut Self {
        for path in paths {
            self.eager_load.remove(path);
        }
        self
    }

    /// Replace the eager-load specification
    pub fn with_only(&mut self, spec: impl Into<NestedSpec>) -> &mut Self {
        self.eager_load = EagerLoadSpec::new();
        self.with(spec)
    }

    pub fn eager_load(&self) -> &EagerLoadSpec {
        &self.eager_load
    }

    pub(crate) fn merge_eager_load(&mut self, spec: EagerLoadSpec) -> &mut Self {
        self.eager_load.merge(spec);
        self
    }

    // Local macros

    /// Register a macro visible only on this query and its clones
    pub fn local_macro<F>(&mut self, name: &str, body: F) -> &mut Self
    where
        F: Fn(Option<&mut Query>, &[Value]) -> OrmResult<Option<Value>> + Send + Sync + 'static,
    {
        self.local_macros.insert(name.to_string(), Arc::new(body));
        self
    }

    pub fn has_local_macro(&self, name: &str) -> bool {
        self.local_macros.contains_key(name)
    }

    pub fn local_macro_named(&self, name: &str) -> Option<Macro> {
        self.local_macros.get(name).cloned()
    }

    /// The query a macro was invoked on, or an error for static invocation
    pub fn bound_macro_target<'a>(query: Option<&'a mut Query>, name: &str) -> OrmResult<&'a mut Query> {
        query.ok_or_else(|| OrmError::invalid_argument(name, "macro requires a bound query"))
    }

    pub(crate) fn bad_method_call(&self, method: &str) -> OrmError {
        OrmError::BadMethodCall {
            query_type: format!("Query<{}>", self.model.name()),
            method: method.to_string(),
        }
    }

    // Statement builder

    pub fn select(&mut self, columns: &[&str]) -> &mut Self {
        self.statement.select(columns);
        self
    }

    pub fn add_select(&mut self, columns: &[&str]) -> &mut Self {
        self.statement.add_select(columns);
        self
    }

    pub fn where_eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.statement.where_eq(column, value);
        self
    }

    pub fn where_op(&mut self, column: &str, operator: &str, value: impl Into<Value>) -> &mut Self {
        self.statement.where_op(column, operator, value);
        self
    }

    pub fn or_where(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.statement.or_where(column, value);
        self
    }

    pub fn or_where_op(&mut self, column: &str, operator: &str, value: impl Into<Value>) -> &mut Self {
        self.statement.or_where_op(column, operator, value);
        self
    }

    pub fn where_not(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.statement.where_basic(column, "=", value, Boolean::AndNot);
        self
    }

    pub fn where_column(&mut self, first: &str, operator: &str, second: &str) -> &mut Self {
        self.statement.where_column(first, operator, second);
        self
    }

    pub fn where_in(&mut self, column: &str, values: Vec<Value>) -> &mut Self {
        self.statement.where_in(column, values);
        self
    }

    pub fn where_not_in(&mut self, column: &str, values: Vec<Value>) -> &mut Self {
        self.statement.where_not_in(column, values);
        self
    }

    pub fn where_null(&mut self, column: &str) -> &mut Self {
        self.statement.where_null(column);
        self
    }

    pub fn where_not_null(&mut self, column: &str) -> &mut Self {
        self.statement.where_not_null(column);
        self
    }

    pub fn where_between(&mut self, column: &str, start: impl Into<Value>, end: impl Into<Value>) -> &mut Self {
        self.statement.where_between(column, start, end);
        self
    }

    /// Group the predicates added by `build` in parentheses
    pub fn where_nested<F>(&mut self, build: F) -> &mut Self
    where
        F: FnOnce(&mut Statement),
    {
        self.statement.where_nested(Boolean::And, build);
        self
    }

    pub fn or_where_nested<F>(&mut self, build: F) -> &mut Self
    where
        F: FnOnce(&mut Statement),
    {
        self.statement.where_nested(Boolean::Or, build);
        self
    }

    pub fn inner_join(&mut self, table: &str, first: &str, operator: &str, second: &str) -> &mut Self {
        self.statement.inner_join(table, first, operator, second);
        self
    }

    pub fn order_by(&mut self, column: &str, direction: Direction) -> &mut Self {
        self.statement.order_by(column, direction);
        self
    }

    pub fn latest(&mut self) -> &mut Self {
        self.statement.latest("created_at");
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.statement.limit(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.statement.offset(offset);
        self
    }

    /// Rendered SQL of the scoped statement
    pub fn to_sql(&self) -> String {
        self.apply_scopes().statement.to_sql()
    }

    pub fn raw_bindings(&self) -> Vec<Value> {
        self.apply_scopes().statement.raw_bindings()
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("model", &self.model.name())
            .field("statement", &self.statement)
            .field("scopes", &self.scopes)
            .field("eager_load", &self.eager_load.keys())
            .field("local_macros", &self.local_macros.keys().collect::<Vec<_>>())
            .finish()
    }
}
