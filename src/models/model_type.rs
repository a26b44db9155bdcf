use super::Model;
use crate::error::OrmResult;
use crate::query::Query;
use crate::relations::RelationDef;
use crate::scopes::{scope_id, GlobalScope, Scope, SoftDeletingScope};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Builds the relation definition for an accessor, given a fresh instance
/// of the owning model
pub type RelationAccessor = Arc<dyn Fn(&Model) -> RelationDef + Send + Sync>;

/// A caller-invoked predicate helper
pub type NamedScope = Arc<dyn Fn(&mut Query, &[Value]) -> OrmResult<()> + Send + Sync>;

/// Static description of a model type: its table, key, scopes, relations
/// and default eager loads.
pub struct ModelType {
    name: String,
    table: String,
    key_name: String,
    morph_class: String,
    global_scopes: Vec<(String, GlobalScope)>,
    named_scopes: IndexMap<String, NamedScope>,
    relations: IndexMap<String, RelationAccessor>,
    dynamic_relations: DashMap<String, RelationAccessor>,
    default_with: Vec<String>,
    soft_deletes: bool,
}

impl ModelType {
    pub fn builder(name: &str) -> ModelTypeBuilder {
        ModelTypeBuilder::new(name)
    }

    /// Descriptor for rows of an intermediate (pivot) table
    pub fn pivot(table: &str) -> Self {
        let mut model_type = Self::bare("Pivot");
        model_type.table = table.to_string();
        model_type
    }

    fn bare(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: format!("{}s", snake_case(name)),
            key_name: "id".to_string(),
            morph_class: name.to_string(),
            global_scopes: Vec::new(),
            named_scopes: IndexMap::new(),
            relations: IndexMap::new(),
            dynamic_relations: DashMap::new(),
            default_with: Vec::new(),
            soft_deletes: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn morph_class(&self) -> &str {
        &self.morph_class
    }

    pub fn qualify_column(&self, column: &str) -> String {
        if column.contains('.') {
            column.to_string()
        } else {
            format!("{}.{}", self.table, column)
        }
    }

    pub fn qualified_key_name(&self) -> String {
        self.qualify_column(&self.key_name)
    }

    pub fn global_scopes(&self) -> &[(String, GlobalScope)] {
        &self.global_scopes
    }

    pub fn named_scope(&self, name: &str) -> Option<NamedScope> {
        self.named_scopes.get(&normalize_scope_name(name)).cloned()
    }

    pub fn has_named_scope(&self, name: &str) -> bool {
        self.named_scopes.contains_key(&normalize_scope_name(name))
    }

    pub fn default_with(&self) -> &[String] {
        &self.default_with
    }

    pub fn soft_deletes(&self) -> bool {
        self.soft_deletes
    }

    /// Register a relation at runtime. Last write wins.
    pub fn resolve_relation_using<F>(&self, name: &str, accessor: F)
    where
        F: Fn(&Model) -> RelationDef + Send + Sync + 'static,
    {
        self.dynamic_relations
            .insert(name.to_string(), Arc::new(accessor));
    }

    pub fn has_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name) || self.dynamic_relations.contains_key(name)
    }

    pub fn relation_names(&self) -> Vec<String> {
        self.relations.keys().cloned().collect()
    }

    /// Invoke the named relation accessor on `instance`. Declared relations
    /// shadow dynamically resolved ones.
    pub fn relation_def(&self, instance: &Model, name: &str) -> Option<RelationDef> {
        if let Some(accessor) = self.relations.get(name) {
            return Some(accessor(instance));
        }
        let accessor = self
            .dynamic_relations
            .get(name)
            .map(|entry| Arc::clone(entry.value()))?;
        Some(accessor(instance))
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("key_name", &self.key_name)
            .field(
                "global_scopes",
                &self.global_scopes.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .field("named_scopes", &self.named_scopes.keys().collect::<Vec<_>>())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .field("default_with", &self.default_with)
            .finish()
    }
}

/// Builder for [`ModelType`]
pub struct ModelTypeBuilder {
    model_type: ModelType,
}

impl ModelTypeBuilder {
    fn new(name: &str) -> Self {
        Self {
            model_type: ModelType::bare(name),
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.model_type.table = table.to_string();
        self
    }

    pub fn key_name(mut self, key_name: &str) -> Self {
        self.model_type.key_name = key_name.to_string();
        self
    }

    pub fn morph_class(mut self, morph_class: &str) -> Self {
        self.model_type.morph_class = morph_class.to_string();
        self
    }

    pub fn global_scope<F>(mut self, id: &str, scope: F) -> Self
    where
        F: Fn(&mut Query) + Send + Sync + 'static,
    {
        self.push_global_scope(id.to_string(), GlobalScope::function(scope));
        self
    }

    /// Register an object scope, identified by its type name
    pub fn global_scope_object<S: Scope + 'static>(mut self, scope: S) -> Self {
        self.push_global_scope(scope_id::<S>(), GlobalScope::object(scope));
        self
    }

    fn push_global_scope(&mut self, id: String, scope: GlobalScope) {
        let scopes = &mut self.model_type.global_scopes;
        match scopes.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = scope,
            None => scopes.push((id, scope)),
        }
    }

    /// Register a named scope. `scopeOnlyActive`, `scope_only_active` and
    /// `only_active` all register as `only_active`.
    pub fn scope<F>(mut self, name: &str, scope: F) -> Self
    where
        F: Fn(&mut Query, &[Value]) -> OrmResult<()> + Send + Sync + 'static,
    {
        self.model_type
            .named_scopes
            .insert(normalize_scope_name(name), Arc::new(scope));
        self
    }

    pub fn relation<F>(mut self, name: &str, accessor: F) -> Self
    where
        F: Fn(&Model) -> RelationDef + Send + Sync + 'static,
    {
        self.model_type
            .relations
            .insert(name.to_string(), Arc::new(accessor));
        self
    }

    /// Relations eager loaded by every query of this type
    pub fn with(mut self, relations: &[&str]) -> Self {
        self.model_type
            .default_with
            .extend(relations.iter().map(|r| r.to_string()));
        self
    }

    pub fn soft_deletes(mut self) -> Self {
        self.model_type.soft_deletes = true;
        self.global_scope_object(SoftDeletingScope::default())
    }

    pub fn build(self) -> Arc<ModelType> {
        Arc::new(self.model_type)
    }
}

/// Strip the `scope` convention prefix and snake-case the remainder
pub fn normalize_scope_name(name: &str) -> String {
    let stripped = name
        .strip_prefix("scope_")
        .or_else(|| {
            name.strip_prefix("scope")
                .filter(|rest| rest.starts_with(|c: char| c.is_ascii_uppercase()))
        })
        .unwrap_or(name);
    snake_case(stripped)
}

pub fn snake_case(name: &str) -> String {
    let mut snake = String::with_capacity(name.len() + 4);
    for (index, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if index > 0 && !snake.ends_with('_') {
                snake.push('_');
            }
            snake.push(c.to_ascii_lowercase());
        } else {
            snake.push(c);
        }
    }
    snake
}
