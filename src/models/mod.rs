//! # Models
//!
//! Model type descriptors and hydrated model instances.
//!
//! A [`ModelType`] is built once per record type and registered with an
//! [`OrmContext`](crate::context::OrmContext). Queries hydrate fetched rows
//! into [`Model`]s, and the eager loader attaches [`Related`] values to
//! them by relation name.

pub mod model;
pub mod model_type;

pub use model::{Model, Related};
pub use model_type::{
    normalize_scope_name, snake_case, ModelType, ModelTypeBuilder, NamedScope, RelationAccessor,
};
