//! # Method Registries
//!
//! Runtime extension points for model queries.
//!
//! ## Architecture
//!
//! ```text
//! Method Registries
//! ├── MacroRegistry   (global macros and mixins, one per context)
//! └── ResolverChain   (priority-ordered method name resolution)
//!     ├── LocalMacroResolver
//!     ├── GlobalMacroResolver
//!     ├── NamedScopeResolver
//!     ├── PassthroughResolver
//!     └── StatementForwardResolver
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use serde_json::json;
//!
//! ctx.macros().register("published", |query, _args| {
//!     let query = Query::bound_macro_target(query, "published")?;
//!     query.where_not_null("published_at");
//!     Ok(None)
//! });
//!
//! let mut posts = ctx.query("Post")?;
//! posts.call("published", &[]).await?;
//! let total = posts.call("count", &[]).await?.into_value();
//! ```

pub mod macros;
pub mod resolver_chain;
pub mod resolvers;

pub use macros::{Macro, MacroRegistry, Mixin};
pub use resolver_chain::{MethodHandler, MethodResolver, ResolverChain};
pub use resolvers::{
    GlobalMacroResolver, LocalMacroResolver, NamedScopeResolver, PassthroughResolver,
    StatementForwardResolver,
};
