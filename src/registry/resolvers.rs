//! Built-in resolvers of the default dispatch chain

use super::resolver_chain::{MethodHandler, MethodResolver};
use crate::query::{PassthroughMethod, Query};
use crate::query_builder::forward_method;

/// Macros registered on the query itself. Priority 10.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalMacroResolver;

impl MethodResolver for LocalMacroResolver {
    fn resolver_name(&self) -> &str {
        "local_macro"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn resolve(&self, query: &Query, method: &str) -> Option<MethodHandler> {
        query.local_macro_named(method).map(MethodHandler::LocalMacro)
    }
}

/// Macros registered on the context. Priority 20.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalMacroResolver;

impl MethodResolver for GlobalMacroResolver {
    fn resolver_name(&self) -> &str {
        "global_macro"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn resolve(&self, query: &Query, method: &str) -> Option<MethodHandler> {
        query.context().macros().get(method).map(MethodHandler::GlobalMacro)
    }
}

/// Named scopes of the query's model. Priority 30.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamedScopeResolver;

impl MethodResolver for NamedScopeResolver {
    fn resolver_name(&self) -> &str {
        "named_scope"
    }

    fn priority(&self) -> u32 {
        30
    }

    fn resolve(&self, query: &Query, method: &str) -> Option<MethodHandler> {
        query.model().named_scope(method).map(MethodHandler::NamedScope)
    }
}

/// Statement methods whose result replaces the query. Priority 40.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughResolver;

impl MethodResolver for PassthroughResolver {
    fn resolver_name(&self) -> &str {
        "passthrough"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn resolve(&self, _query: &Query, method: &str) -> Option<MethodHandler> {
        PassthroughMethod::parse(method).map(MethodHandler::Passthrough)
    }
}

/// Chainable statement-builder methods. Priority 100, the fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementForwardResolver;

impl MethodResolver for StatementForwardResolver {
    fn resolver_name(&self) -> &str {
        "statement_forward"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn resolve(&self, _query: &Query, method: &str) -> Option<MethodHandler> {
        forward_method(method).map(MethodHandler::Forward)
    }
}
