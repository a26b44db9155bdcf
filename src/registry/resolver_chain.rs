//! # Resolver Chain
//!
//! Priority-ordered chain of method resolvers used by dynamic dispatch.
//!
//! ## Resolution Flow
//!
//! ```text
//! Query::call("name", args)
//!          │
//!   ┌──────▼───────┐   match    ┌──────────────────┐
//!   │ resolver 10  ├───────────►│ MethodHandler    │
//!   └──────┬───────┘            └──────────────────┘
//!          │ none                        ▲
//!   ┌──────▼───────┐   match             │
//!   │ resolver 20  ├─────────────────────┤
//!   └──────┬───────┘                     │
//!          ⋮                             │
//!   ┌──────▼───────┐   match             │
//!   │ resolver 100 ├─────────────────────┘
//!   └──────┬───────┘
//!          │ none
//!          ▼
//!   OrmError::BadMethodCall
//! ```
//!
//! ## Priority System
//!
//! Resolvers are tried in priority order (lower = checked first):
//! - 10: [`LocalMacroResolver`] (macros registered on the query)
//! - 20: [`GlobalMacroResolver`] (macros registered on the context)
//! - 30: [`NamedScopeResolver`] (the model's named scopes)
//! - 40: [`PassthroughResolver`] (value-returning statement methods)
//! - 100: [`StatementForwardResolver`] (chainable statement methods)
//!
//! Custom resolvers slot in anywhere by priority.

use super::macros::Macro;
use super::resolvers::{
    GlobalMacroResolver, LocalMacroResolver, NamedScopeResolver, PassthroughResolver,
    StatementForwardResolver,
};
use crate::models::NamedScope;
use crate::query::{PassthroughMethod, Query};
use crate::query_builder::ForwardFn;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// What a resolved method name runs
#[derive(Clone)]
pub enum MethodHandler {
    LocalMacro(Macro),
    GlobalMacro(Macro),
    NamedScope(NamedScope),
    Passthrough(PassthroughMethod),
    Forward(ForwardFn),
}

impl MethodHandler {
    pub fn kind(&self) -> &'static str {
        match self {
            MethodHandler::LocalMacro(_) => "local_macro",
            MethodHandler::GlobalMacro(_) => "global_macro",
            MethodHandler::NamedScope(_) => "named_scope",
            MethodHandler::Passthrough(_) => "passthrough",
            MethodHandler::Forward(_) => "forward",
        }
    }
}

impl fmt::Debug for MethodHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodHandler::Passthrough(method) => write!(f, "Passthrough({method:?})"),
            other => write!(f, "{}(...)", other.kind()),
        }
    }
}

/// One link of the dispatch chain
pub trait MethodResolver: Send + Sync + fmt::Debug {
    fn resolver_name(&self) -> &str;

    /// Lower runs first
    fn priority(&self) -> u32;

    fn resolve(&self, query: &Query, method: &str) -> Option<MethodHandler>;
}

#[derive(Debug, Default)]
pub struct ResolverChain {
    /// Ordered by priority
    resolvers: Vec<Arc<dyn MethodResolver>>,
    resolvers_by_name: HashMap<String, Arc<dyn MethodResolver>>,
}

impl ResolverChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in resolution order: local macros, global macros, named
    /// scopes, passthrough methods, then statement forwarding
    #[must_use]
    pub fn default_chain() -> Self {
        Self::new()
            .with_resolver(Arc::new(LocalMacroResolver))
            .with_resolver(Arc::new(GlobalMacroResolver))
            .with_resolver(Arc::new(NamedScopeResolver))
            .with_resolver(Arc::new(PassthroughResolver))
            .with_resolver(Arc::new(StatementForwardResolver))
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn MethodResolver>) -> Self {
        self.add_resolver(resolver);
        self
    }

    pub fn add_resolver(&mut self, resolver: Arc<dyn MethodResolver>) {
        let name = resolver.resolver_name().to_string();
        self.resolvers_by_name.insert(name, Arc::clone(&resolver));
        self.resolvers.push(resolver);
        self.sort_by_priority();
    }

    // Stable, so equal priorities keep insertion order
    fn sort_by_priority(&mut self) {
        self.resolvers.sort_by_key(|r| r.priority());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    #[must_use]
    pub fn resolver_names(&self) -> Vec<&str> {
        self.resolvers.iter().map(|r| r.resolver_name()).collect()
    }

    #[must_use]
    pub fn has_resolver(&self, name: &str) -> bool {
        self.resolvers_by_name.contains_key(name)
    }

    /// First handler any resolver produces for `method`, with the name of
    /// the resolver that produced it
    pub fn resolve(&self, query: &Query, method: &str) -> Option<(String, MethodHandler)> {
        for resolver in &self.resolvers {
            if let Some(handler) = resolver.resolve(query, method) {
                trace!(
                    resolver = resolver.resolver_name(),
                    method = %method,
                    handler = handler.kind(),
                    "Resolved method"
                );
                return Some((resolver.resolver_name().to_string(), handler));
            }
            trace!(
                resolver = resolver.resolver_name(),
                method = %method,
                "Resolver returned None, trying next resolver"
            );
        }
        None
    }
}
