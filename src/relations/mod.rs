//! # Relations
//!
//! Relation definitions and the per-invocation relation query used for
//! eager and lazy loading.
//!
//! A [`RelationDef`] is stateless: it names the related model type and the
//! keys joining the two tables. A [`Relation`] pairs a definition with a
//! query over the related model. Eager loading builds the relation in
//! "no constraints" mode, adds one key filter covering the whole record
//! set, runs exactly one statement, then matches the results back onto
//! their owners in memory.

pub mod matching;

use crate::context::OrmContext;
use crate::error::OrmResult;
use crate::models::{Model, ModelType, Related};
use crate::query::Query;
use serde_json::Value;
use std::sync::Arc;

pub use matching::key_string;

/// Column alias under which the intermediate key of a through relation is
/// selected
pub const THROUGH_KEY: &str = "through_key";

/// Prefix for pivot columns selected alongside many-to-many results
pub const PIVOT_PREFIX: &str = "pivot_";

/// Relation name under which pivot attributes are attached
pub const PIVOT_RELATION: &str = "pivot";

/// Keys of a relation through an intermediate model
#[derive(Debug, Clone, PartialEq)]
pub struct Through {
    /// Intermediate model type name
    pub through: String,
    /// Column on the intermediate table referencing the parent
    pub first_key: String,
    /// Column on the related table referencing the intermediate
    pub second_key: String,
    /// Parent column referenced by `first_key`
    pub local_key: String,
    /// Intermediate column referenced by `second_key`
    pub second_local_key: String,
}

/// Keys of a polymorphic relation
#[derive(Debug, Clone, PartialEq)]
pub struct Morph {
    pub morph_type: String,
    pub morph_id: String,
    /// Value stored in `morph_type` for the parent type
    pub morph_class: String,
    pub local_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationKind {
    HasOne {
        foreign_key: String,
        local_key: String,
    },
    HasMany {
        foreign_key: String,
        local_key: String,
    },
    BelongsTo {
        foreign_key: String,
        owner_key: String,
    },
    BelongsToMany {
        pivot_table: String,
        foreign_pivot_key: String,
        related_pivot_key: String,
        parent_key: String,
        related_key: String,
        pivot_columns: Vec<String>,
    },
    HasManyThrough(Through),
    HasOneThrough(Through),
    MorphOne(Morph),
    MorphMany(Morph),
}

impl RelationKind {
    /// Whether the relation resolves to a single model
    pub fn is_single(&self) -> bool {
        matches!(
            self,
            RelationKind::HasOne { .. }
                | RelationKind::BelongsTo { .. }
                | RelationKind::HasOneThrough(_)
                | RelationKind::MorphOne(_)
        )
    }

    pub fn is_pivot(&self) -> bool {
        matches!(self, RelationKind::BelongsToMany { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            RelationKind::HasOne { .. } => "HasOne",
            RelationKind::HasMany { .. } => "HasMany",
            RelationKind::BelongsTo { .. } => "BelongsTo",
            RelationKind::BelongsToMany { .. } => "BelongsToMany",
            RelationKind::HasManyThrough(_) => "HasManyThrough",
            RelationKind::HasOneThrough(_) => "HasOneThrough",
            RelationKind::MorphOne(_) => "MorphOne",
            RelationKind::MorphMany(_) => "MorphMany",
        }
    }
}

/// Stateless relation definition returned by a relation accessor
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDef {
    /// Related model type name
    pub related: String,
    pub kind: RelationKind,
}

impl RelationDef {
    pub fn new(related: &str, kind: RelationKind) -> Self {
        Self {
            related: related.to_string(),
            kind,
        }
    }

    /// Extra pivot columns to select for a many-to-many relation
    pub fn with_pivot(mut self, columns: &[&str]) -> Self {
        if let RelationKind::BelongsToMany { pivot_columns, .. } = &mut self.kind {
            pivot_columns.extend(columns.iter().map(|c| c.to_string()));
        }
        self
    }

    /// Override the related-side key of a many-to-many or through relation
    pub fn related_key(mut self, key: &str) -> Self {
        match &mut self.kind {
            RelationKind::BelongsToMany { related_key, .. } => *related_key = key.to_string(),
            RelationKind::HasManyThrough(through) | RelationKind::HasOneThrough(through) => {
                through.second_local_key = key.to_string()
            }
            _ => {}
        }
        self
    }
}

/// A relation definition bound to a query over the related model
#[derive(Debug, Clone)]
pub struct Relation {
    kind: RelationKind,
    parent: Arc<ModelType>,
    related: Arc<ModelType>,
    /// Intermediate table for through relations
    through_table: Option<String>,
    query: Query,
}

impl Relation {
    /// Build the relation without any per-parent constraint. The related
    /// model's global scopes and default eager loads still apply.
    pub fn for_eager_load(
        ctx: &Arc<OrmContext>,
        parent: Arc<ModelType>,
        definition: RelationDef,
    ) -> OrmResult<Self> {
        let related = ctx.model(&definition.related)?;
        let mut query = ctx.query_for(Arc::clone(&related));

        let through_table = match &definition.kind {
            RelationKind::BelongsToMany {
                pivot_table,
                related_pivot_key,
                related_key,
                ..
            } => {
                query.inner_join(
                    pivot_table,
                    &related.qualify_column(related_key),
                    "=",
                    &format!("{pivot_table}.{related_pivot_key}"),
                );
                None
            }
            RelationKind::HasManyThrough(through) | RelationKind::HasOneThrough(through) => {
                let through_table = ctx.model(&through.through)?.table().to_string();
                query.inner_join(
                    &through_table,
                    &format!("{through_table}.{}", through.second_local_key),
                    "=",
                    &related.qualify_column(&through.second_key),
                );
                Some(through_table)
            }
            _ => None,
        };

        Ok(Self {
            kind: definition.kind,
            parent,
            related,
            through_table,
            query,
        })
    }

    /// Build the relation constrained to a single parent model
    pub fn for_parent(ctx: &Arc<OrmContext>, parent: &Model, definition: RelationDef) -> OrmResult<Self> {
        let mut relation = Self::for_eager_load(ctx, Arc::clone(parent.model_type()), definition)?;
        relation.add_constraints(parent);
        Ok(relation)
    }

    pub fn kind(&self) -> &RelationKind {
        &self.kind
    }

    pub fn parent(&self) -> &Arc<ModelType> {
        &self.parent
    }

    pub fn related(&self) -> &Arc<ModelType> {
        &self.related
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut Query {
        &mut self.query
    }

    fn through_column(&self, column: &str) -> String {
        match &self.through_table {
            Some(table) => format!("{table}.{column}"),
            None => column.to_string(),
        }
    }

    fn add_constraints(&mut self, parent: &Model) {
        let value = |column: &str| parent.get(column).cloned().unwrap_or(Value::Null);

        match self.kind.clone() {
            RelationKind::HasOne {
                foreign_key,
                local_key,
            }
            | RelationKind::HasMany {
                foreign_key,
                local_key,
            } => {
                let foreign_key = self.related.qualify_column(&foreign_key);
                self.query
                    .where_eq(&foreign_key, value(&local_key))
                    .where_not_null(&foreign_key);
            }
            RelationKind::BelongsTo {
                foreign_key,
                owner_key,
            } => {
                let owner_key = self.related.qualify_column(&owner_key);
                self.query.where_eq(&owner_key, value(&foreign_key));
            }
            RelationKind::BelongsToMany {
                pivot_table,
                foreign_pivot_key,
                parent_key,
                ..
            } => {
                self.query
                    .where_eq(&format!("{pivot_table}.{foreign_pivot_key}"), value(&parent_key));
            }
            RelationKind::HasManyThrough(through) | RelationKind::HasOneThrough(through) => {
                let first_key = self.through_column(&through.first_key);
                self.query.where_eq(&first_key, value(&through.local_key));
            }
            RelationKind::MorphOne(morph) | RelationKind::MorphMany(morph) => {
                let morph_id = self.related.qualify_column(&morph.morph_id);
                self.query
                    .where_eq(&morph_id, value(&morph.local_key))
                    .where_not_null(&morph_id)
                    .where_eq(&self.related.qualify_column(&morph.morph_type), morph.morph_class);
            }
        }
    }

    /// Constrain the relation query to every owner in `models` with a
    /// single key filter
    pub fn add_eager_constraints(&mut self, models: &[Model]) {
        match self.kind.clone() {
            RelationKind::HasOne {
                foreign_key,
                local_key,
            }
            | RelationKind::HasMany {
                foreign_key,
                local_key,
            } => {
                let keys = matching::collect_keys(models, &local_key);
                self.query
                    .where_in(&self.related.qualify_column(&foreign_key), keys);
            }
            RelationKind::BelongsTo {
                foreign_key,
                owner_key,
            } => {
                let keys = matching::collect_keys(models, &foreign_key);
                self.query
                    .where_in(&self.related.qualify_column(&owner_key), keys);
            }
            RelationKind::BelongsToMany {
                pivot_table,
                foreign_pivot_key,
                parent_key,
                ..
            } => {
                let keys = matching::collect_keys(models, &parent_key);
                self.query
                    .where_in(&format!("{pivot_table}.{foreign_pivot_key}"), keys);
            }
            RelationKind::HasManyThrough(through) | RelationKind::HasOneThrough(through) => {
                let keys = matching::collect_keys(models, &through.local_key);
                let first_key = self.through_column(&through.first_key);
                self.query.where_in(&first_key, keys);
            }
            RelationKind::MorphOne(morph) | RelationKind::MorphMany(morph) => {
                let keys = matching::collect_keys(models, &morph.local_key);
                self.query
                    .where_in(&self.related.qualify_column(&morph.morph_id), keys)
                    .where_eq(&self.related.qualify_column(&morph.morph_type), morph.morph_class);
            }
        }
    }

    /// Give every owner an empty default for this relation
    pub fn init_relation(&self, models: &mut [Model], name: &str) {
        for model in models.iter_mut() {
            let empty = if self.kind.is_single() {
                Related::One(None)
            } else {
                Related::Many(Vec::new())
            };
            model.set_relation(name, empty);
        }
    }

    /// Add the join-table columns the matcher needs to the selection
    fn prepare_selection(&mut self) {
        let related_columns = format!("{}.*", self.related.table());

        match self.kind.clone() {
            RelationKind::BelongsToMany {
                pivot_table,
                foreign_pivot_key,
                related_pivot_key,
                pivot_columns,
                ..
            } => {
                if self.query.statement().columns().is_empty() {
                    self.query.select(&[related_columns.as_str()]);
                }
                let aliased: Vec<String> = [foreign_pivot_key, related_pivot_key]
                    .into_iter()
                    .chain(pivot_columns)
                    .map(|column| format!("{pivot_table}.{column} as {PIVOT_PREFIX}{column}"))
                    .collect();
                let aliased: Vec<&str> = aliased.iter().map(String::as_str).collect();
                self.query.add_select(&aliased);
            }
            RelationKind::HasManyThrough(through) | RelationKind::HasOneThrough(through) => {
                if self.query.statement().columns().is_empty() {
                    self.query.select(&[related_columns.as_str()]);
                }
                let through_key = format!("{} as {THROUGH_KEY}", self.through_column(&through.first_key));
                self.query.add_select(&[through_key.as_str()]);
            }
            _ => {}
        }
    }

    /// Execute the relation query once. Pivot columns are moved into a
    /// `pivot` relation on each result.
    pub async fn get_eager(&mut self) -> OrmResult<Vec<Model>> {
        self.prepare_selection();
        let mut results = self.query.get().await?;

        if let RelationKind::BelongsToMany { pivot_table, .. } = &self.kind {
            let pivot_type = Arc::new(ModelType::pivot(pivot_table));
            for result in results.iter_mut() {
                matching::migrate_pivot_attributes(result, &pivot_type);
            }
        }
        Ok(results)
    }

    /// Results for a relation built with [`Relation::for_parent`]
    pub async fn get_results(&mut self) -> OrmResult<Related> {
        let mut results = self.get_eager().await?;
        for result in results.iter_mut() {
            result.take_attribute(THROUGH_KEY);
        }

        if self.kind.is_single() {
            Ok(Related::One(results.into_iter().next().map(Box::new)))
        } else {
            Ok(Related::Many(results))
        }
    }

    /// Attach `results` to their owners under `name`
    pub fn match_eager(&self, models: &mut [Model], results: Vec<Model>, name: &str) {
        let (result_key, owner_key) = match &self.kind {
            RelationKind::HasOne {
                foreign_key,
                local_key,
            }
            | RelationKind::HasMany {
                foreign_key,
                local_key,
            } => (matching::ResultKey::Attribute(foreign_key.clone()), local_key.clone()),
            RelationKind::BelongsTo {
                foreign_key,
                owner_key,
            } => (matching::ResultKey::Attribute(owner_key.clone()), foreign_key.clone()),
            RelationKind::BelongsToMany {
                foreign_pivot_key,
                parent_key,
                ..
            } => (matching::ResultKey::Pivot(foreign_pivot_key.clone()), parent_key.clone()),
            RelationKind::HasManyThrough(through) | RelationKind::HasOneThrough(through) => (
                matching::ResultKey::ConsumedAttribute(THROUGH_KEY.to_string()),
                through.local_key.clone(),
            ),
            RelationKind::MorphOne(morph) | RelationKind::MorphMany(morph) => (
                matching::ResultKey::Attribute(morph.morph_id.clone()),
                morph.local_key.clone(),
            ),
        };

        let dictionary = matching::build_dictionary(results, &result_key);
        matching::attach(models, &dictionary, &owner_key, name, self.kind.is_single());
    }
}
