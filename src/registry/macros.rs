//! # Macro Registry
//!
//! Query extension methods registered at runtime. One registry exists per
//! [`OrmContext`](crate::context::OrmContext) and is visible to every query
//! built from it. Registration is last-write-wins and needs no external
//! locking, so concurrent first registrations of the same name are safe as
//! long as they register equivalent bodies.

use crate::error::{OrmError, OrmResult};
use crate::query::Query;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A macro body. It receives the calling query (`None` for a static call)
/// and returns `Some(value)` to produce a value, or `None` to keep chaining
/// on the query.
pub type Macro = Arc<dyn Fn(Option<&mut Query>, &[Value]) -> OrmResult<Option<Value>> + Send + Sync>;

/// A helper object whose methods are imported as macros in bulk
pub trait Mixin {
    fn macros(&self) -> Vec<(String, Macro)>;
}

#[derive(Default)]
pub struct MacroRegistry {
    macros: DashMap<String, Macro>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: &str, body: F)
    where
        F: Fn(Option<&mut Query>, &[Value]) -> OrmResult<Option<Value>> + Send + Sync + 'static,
    {
        self.register_macro(name, Arc::new(body));
    }

    pub fn register_macro(&self, name: &str, body: Macro) {
        debug!(name = %name, "Registering global query macro");
        self.macros.insert(name.to_string(), body);
    }

    pub fn has(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Macro> {
        self.macros.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, name: &str) -> bool {
        self.macros.remove(name).is_some()
    }

    pub fn flush(&self) {
        self.macros.clear();
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.macros.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Invoke a macro with no bound query
    pub fn call_static(&self, name: &str, args: &[Value]) -> OrmResult<Option<Value>> {
        let body = self.get(name).ok_or_else(|| OrmError::BadMethodCall {
            query_type: "MacroRegistry".to_string(),
            method: name.to_string(),
        })?;
        body(None, args)
    }

    /// Import every macro of `mixin`. Existing names are kept unless
    /// `replace` is set.
    pub fn mixin(&self, mixin: &dyn Mixin, replace: bool) {
        for (name, body) in mixin.macros() {
            if replace || !self.has(&name) {
                self.register_macro(&name, body);
            }
        }
    }
}

impl fmt::Debug for MacroRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroRegistry")
            .field("macros", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Greetings;

    impl Mixin for Greetings {
        fn macros(&self) -> Vec<(String, Macro)> {
            let hello: Macro = Arc::new(|_, _| Ok(Some(json!("hello"))));
            let wave: Macro = Arc::new(|_, _| Ok(Some(json!("wave"))));
            vec![("greet".to_string(), hello), ("wave".to_string(), wave)]
        }
    }

    #[test]
    fn test_static_call_has_no_bound_query() {
        let registry = MacroRegistry::new();
        registry.register("bound", |query, _| Ok(Some(json!(query.is_some()))));
        assert_eq!(registry.call_static("bound", &[]).unwrap(), Some(json!(false)));
    }

    #[test]
    fn test_static_call_of_unknown_macro_fails() {
        let registry = MacroRegistry::new();
        assert!(matches!(
            registry.call_static("missing", &[]),
            Err(OrmError::BadMethodCall { .. })
        ));
    }

    #[test]
    fn test_mixin_respects_replace_flag() {
        let registry = MacroRegistry::new();
        registry.register("greet", |_, _| Ok(Some(json!("original"))));

        registry.mixin(&Greetings, false);
        assert_eq!(registry.call_static("greet", &[]).unwrap(), Some(json!("original")));
        assert!(registry.has("wave"));

        registry.mixin(&Greetings, true);
        assert_eq!(registry.call_static("greet", &[]).unwrap(), Some(json!("hello")));
        assert_eq!(registry.names(), vec!["greet", "wave"]);
    }

    #[test]
    fn test_remove_and_flush() {
        let registry = MacroRegistry::new();
        registry.register("a", |_, _| Ok(None));
        registry.register("b", |_, _| Ok(None));
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        registry.flush();
        assert!(registry.is_empty());
    }
}
