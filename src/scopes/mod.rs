//! # Query Scopes
//!
//! Reusable predicate-contributing units attached to a [`Query`] by
//! identifier.
//!
//! ## Key Components
//!
//! - [`Scope`] / [`GlobalScope`] - Function and object scopes as a tagged variant
//! - [`ScopeRegistry`] - Per-query, insertion-ordered scope map with removal markers
//! - [`grouping`] - Predicate re-grouping run after every scope application
//! - [`SoftDeletingScope`] - Hides soft-deleted rows and adds trash macros
//!
//! Scope application itself lives on [`Query::apply_scopes`], which clones
//! the query and runs each registered scope against the clone.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let users = ModelType::builder("User")
//!     .global_scope("active", |query| {
//!         query.where_eq("active", true);
//!     })
//!     .build();
//!
//! let mut query = ctx.query("User")?;
//! query.where_eq("role", "admin").or_where("role", "owner");
//! // SELECT * FROM users WHERE (role = 'admin' OR role = 'owner') AND active = true
//! let admins = query.get().await?;
//! ```

pub mod grouping;
pub mod registry;
pub mod soft_deletes;

pub use grouping::add_new_wheres_within_group;
pub use registry::ScopeRegistry;
pub use soft_deletes::SoftDeletingScope;

use crate::models::ModelType;
use crate::query::Query;
use std::fmt;
use std::sync::Arc;

/// An object scope applied to every query of a model type
pub trait Scope: Send + Sync {
    fn apply(&self, query: &mut Query, model: &ModelType);

    /// Hook run when the scope is registered on a query, typically to add
    /// local macros
    fn extend(&self, _query: &mut Query) {}
}

pub type ScopeFn = Arc<dyn Fn(&mut Query) + Send + Sync>;

/// A global scope is either a bare function or a [`Scope`] object
#[derive(Clone)]
pub enum GlobalScope {
    Function(ScopeFn),
    Object(Arc<dyn Scope>),
}

impl GlobalScope {
    pub fn function<F>(scope: F) -> Self
    where
        F: Fn(&mut Query) + Send + Sync + 'static,
    {
        GlobalScope::Function(Arc::new(scope))
    }

    pub fn object<S: Scope + 'static>(scope: S) -> Self {
        GlobalScope::Object(Arc::new(scope))
    }

    pub fn apply(&self, query: &mut Query, model: &ModelType) {
        match self {
            GlobalScope::Function(scope) => scope(query),
            GlobalScope::Object(scope) => scope.apply(query, model),
        }
    }
}

impl fmt::Debug for GlobalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlobalScope::Function(_) => f.write_str("GlobalScope::Function"),
            GlobalScope::Object(_) => f.write_str("GlobalScope::Object"),
        }
    }
}

/// Identifier under which an object scope of type `S` is registered
pub fn scope_id<S: ?Sized + 'static>() -> String {
    std::any::type_name::<S>().to_string()
}
