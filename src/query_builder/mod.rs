//! # Statement Builder
//!
//! The low-level statement builder the model query layer composes on.
//!
//! ## Key Components
//!
//! - [`builder`] - [`Statement`]: predicate list, selection, joins, ordering and limits
//! - [`conditions`] - WHERE predicate nodes with boolean connectors and nested groups
//! - [`joins`] - JOIN clauses used by pivot and through relations
//!
//! Rendering goes through [`SqlWriter`] so the same clause walk produces
//! inlined SQL for logging and bound parameters for Postgres.

pub mod builder;
pub mod conditions;
pub mod joins;

pub use builder::{
    forward_method, Aggregate, AggregateFunction, Direction, ForwardFn, OrderBy, Statement,
    AGGREGATE_ALIAS,
};
pub use conditions::{format_value, write_clauses, Boolean, Condition, SqlWriter, WhereClause};
pub use joins::{Join, JoinType};
