#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker ORM
//!
//! Active-Record style query composition for Tasker models: global scopes,
//! eager-load specifications, relation hydration and dynamic method dispatch.
//!
//! ## Overview
//!
//! A [`Query`] is built for one registered [`ModelType`] from a shared
//! [`OrmContext`]. Global scopes are applied when the query executes, with
//! the predicates each scope adds grouped so that an `OR` inside a scope can
//! never widen the caller's filter. Relations requested with
//! [`Query::with`] are loaded one statement per relation level, however many
//! models the parent level returned, and matched back in memory.
//!
//! ## Architecture
//!
//! ```text
//! OrmContext ──► Query ──► apply_scopes ──► Statement ──► RowStore
//!                  │                                         │
//!                  └── EagerLoadSpec ──► Relation ◄── rows ──┘
//!                                           │
//!                                      match_eager ──► Model.relations
//! ```
//!
//! ## Module Organization
//!
//! - [`query`] - Model queries: scopes, execution, eager loading, dispatch
//! - [`query_builder`] - The low-level SQL statement builder
//! - [`scopes`] - Global scope registry, predicate grouping and soft deletes
//! - [`eager`] - Eager-load specification parsing and constraints
//! - [`relations`] - Relation kinds, eager constraints and result matching
//! - [`models`] - Model types and hydrated model instances
//! - [`registry`] - Global macros, mixins and the method resolver chain
//! - [`database`] - Row stores (in-memory and Postgres)
//! - [`events`] - Model lifecycle events
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust
//! use tasker_orm::{MemoryRowStore, ModelType, OrmConfig, OrmContext};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryRowStore::new());
//! store.seed("users", vec![json!({"id": 1, "name": "Ada", "active": true})]);
//! store.seed("posts", vec![json!({"id": 10, "user_id": 1, "title": "Notes"})]);
//!
//! let ctx = OrmContext::new(store, OrmConfig::default());
//! ctx.register(
//!     ModelType::builder("User")
//!         .global_scope("active", |query| {
//!             query.where_eq("active", true);
//!         })
//!         .relation("posts", |user| user.has_many("Post", "user_id", "id"))
//!         .build(),
//! );
//! ctx.register(ModelType::builder("Post").build());
//!
//! let mut query = ctx.query("User")?;
//! query.with("posts");
//! let users = query.get().await?;
//! assert_eq!(users[0].relation("posts").map(|posts| posts.len()), Some(1));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod database;
pub mod eager;
pub mod error;
pub mod events;
pub mod logging;
pub mod macros;
pub mod models;
pub mod query;
pub mod query_builder;
pub mod registry;
pub mod relations;
pub mod scopes;

pub use config::OrmConfig;
pub use context::OrmContext;
pub use database::{MemoryRowStore, PgRowStore, Row, RowStore};
pub use eager::{Constraint, EagerLoadSpec, Include, NestedSpec};
pub use error::{OrmError, OrmResult, StoreError, StoreResult};
pub use events::{EventPublisher, ModelEvent};
pub use models::{Model, ModelType, ModelTypeBuilder, Related};
pub use query::{Dispatched, Query};
pub use query_builder::{Boolean, Direction, Statement};
pub use registry::{Macro, MacroRegistry, MethodHandler, MethodResolver, Mixin, ResolverChain};
pub use relations::{Relation, RelationDef, RelationKind};
pub use scopes::{GlobalScope, Scope, ScopeRegistry, SoftDeletingScope};
