//! # Eager-Load Specifications
//!
//! Parses the relation specification given to `with(...)` into a flat map
//! from dot path to composed [`Constraint`].
//!
//! ```text
//! ["comments" => approved, "comments.author", "posts:id,title"]
//!
//! comments        -> approved
//! comments.author -> noop
//! posts           -> select(id, title)
//! ```

pub mod constraint;
pub mod spec;

pub use constraint::{Constraint, ConstraintFn};
pub use spec::{EagerLoadSpec, Include, NestedSpec};
