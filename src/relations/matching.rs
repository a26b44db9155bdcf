//! In-memory matching of eager-loaded results back onto their owners.
//!
//! Keys are compared by their string rendering so an integer key on one
//! side matches the same integer on the other regardless of how each row
//! store types it.

use super::{PIVOT_PREFIX, PIVOT_RELATION};
use crate::database::Row;
use crate::models::{Model, ModelType, Related};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::sync::Arc;

/// Where a result's dictionary key is read from
#[derive(Debug, Clone, PartialEq)]
pub enum ResultKey {
    Attribute(String),
    /// Attribute of the attached `pivot` relation
    Pivot(String),
    /// Attribute removed from the result once read
    ConsumedAttribute(String),
}

/// String form of a key value. Null keys never match.
pub fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Distinct non-null values of `column` across `models`, in first-seen order
pub fn collect_keys(models: &[Model], column: &str) -> Vec<Value> {
    let mut seen = IndexSet::new();
    models
        .iter()
        .filter_map(|model| model.get(column))
        .filter(|value| match key_string(value) {
            Some(key) => seen.insert(key),
            None => false,
        })
        .cloned()
        .collect()
}

/// Move `pivot_*` attributes into a `pivot` relation
pub fn migrate_pivot_attributes(result: &mut Model, pivot_type: &Arc<ModelType>) {
    let pivot_columns: Vec<String> = result
        .attributes()
        .keys()
        .filter(|column| column.starts_with(PIVOT_PREFIX))
        .cloned()
        .collect();

    let mut pivot = Row::new();
    for column in pivot_columns {
        if let Some(value) = result.take_attribute(&column) {
            pivot.insert(column[PIVOT_PREFIX.len()..].to_string(), value);
        }
    }

    let pivot = Model::from_row(Arc::clone(pivot_type), pivot);
    result.set_relation(PIVOT_RELATION, Related::One(Some(Box::new(pivot))));
}

/// Group results by key
pub fn build_dictionary(results: Vec<Model>, key: &ResultKey) -> IndexMap<String, Vec<Model>> {
    let mut dictionary: IndexMap<String, Vec<Model>> = IndexMap::new();

    for mut result in results {
        let value = match key {
            ResultKey::Attribute(column) => result.get(column).cloned(),
            ResultKey::Pivot(column) => result
                .relation(PIVOT_RELATION)
                .and_then(Related::as_one)
                .and_then(|pivot| pivot.get(column))
                .cloned(),
            ResultKey::ConsumedAttribute(column) => result.take_attribute(column),
        };

        if let Some(key) = value.as_ref().and_then(key_string) {
            dictionary.entry(key).or_default().push(result);
        }
    }

    dictionary
}

/// Assign dictionary entries to owners by `owner_key`. Owners without a
/// match keep the default set by `init_relation`.
pub fn attach(
    models: &mut [Model],
    dictionary: &IndexMap<String, Vec<Model>>,
    owner_key: &str,
    name: &str,
    single: bool,
) {
    for model in models.iter_mut() {
        let Some(matched) = model
            .get(owner_key)
            .and_then(key_string)
            .and_then(|key| dictionary.get(&key))
        else {
            continue;
        };

        let related = if single {
            Related::One(matched.first().cloned().map(Box::new))
        } else {
            Related::Many(matched.clone())
        };
        model.set_relation(name, related);
    }
}
