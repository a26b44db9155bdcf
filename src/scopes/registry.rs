use super::GlobalScope;
use indexmap::IndexMap;
use std::fmt;

/// Insertion-ordered map from scope identifier to global scope, plus the
/// identifiers removed from it.
///
/// Every operation is total: removing an identifier that was never
/// registered leaves the map untouched.
#[derive(Clone, Default)]
pub struct ScopeRegistry {
    scopes: IndexMap<String, GlobalScope>,
    removed: Vec<String>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scope. Re-registering an identifier replaces the scope in
    /// place and keeps its original position.
    pub fn insert(&mut self, id: impl Into<String>, scope: GlobalScope) {
        self.scopes.insert(id.into(), scope);
    }

    pub fn remove(&mut self, id: &str) {
        self.scopes.shift_remove(id);
        if !self.removed.iter().any(|removed| removed == id) {
            self.removed.push(id.to_string());
        }
    }

    /// Remove the given identifiers, or every registered scope for `None`
    pub fn remove_all(&mut self, ids: Option<&[&str]>) {
        match ids {
            Some(ids) => ids.iter().for_each(|id| self.remove(id)),
            None => {
                for id in self.ids() {
                    self.remove(&id);
                }
            }
        }
    }

    /// Remove every registered scope not named in `keep`
    pub fn remove_except(&mut self, keep: &[&str]) {
        let doomed: Vec<String> = self
            .scopes
            .keys()
            .filter(|id| !keep.contains(&id.as_str()))
            .cloned()
            .collect();
        for id in doomed {
            self.remove(&id);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scopes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&GlobalScope> {
        self.scopes.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.scopes.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &GlobalScope)> {
        self.scopes.iter()
    }

    pub fn removed(&self) -> &[String] {
        &self.removed
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("scopes", &self.scopes.keys().collect::<Vec<_>>())
            .field("removed", &self.removed)
            .finish()
    }
}
