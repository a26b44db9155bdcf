use super::ModelType;
use crate::context::OrmContext;
use crate::database::Row;
use crate::error::{OrmError, OrmResult};
use crate::relations::{Relation, RelationDef, RelationKind};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A loaded relation value
#[derive(Clone, PartialEq)]
pub enum Related {
    One(Option<Box<Model>>),
    Many(Vec<Model>),
}

impl Related {
    pub fn as_one(&self) -> Option<&Model> {
        match self {
            Related::One(model) => model.as_deref(),
            Related::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> &[Model] {
        match self {
            Related::Many(models) => models,
            Related::One(_) => &[],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Related::One(model) => usize::from(model.is_some()),
            Related::Many(models) => models.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Related {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Related::One(model) => f.debug_tuple("One").field(model).finish(),
            Related::Many(models) => f.debug_tuple("Many").field(models).finish(),
        }
    }
}

impl Serialize for Related {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Related::One(model) => model.serialize(serializer),
            Related::Many(models) => models.serialize(serializer),
        }
    }
}

/// A hydrated record: attributes plus the relations attached to it
#[derive(Clone)]
pub struct Model {
    model_type: Arc<ModelType>,
    attributes: Row,
    relations: IndexMap<String, Related>,
    exists: bool,
    prevents_lazy_loading: bool,
}

impl Model {
    /// Fresh, unsaved instance with no attributes
    pub fn new_instance(model_type: Arc<ModelType>) -> Self {
        Self {
            model_type,
            attributes: Row::new(),
            relations: IndexMap::new(),
            exists: false,
            prevents_lazy_loading: false,
        }
    }

    /// Instance hydrated from a stored row
    pub fn from_row(model_type: Arc<ModelType>, row: Row) -> Self {
        Self {
            attributes: row,
            exists: true,
            ..Self::new_instance(model_type)
        }
    }

    pub fn model_type(&self) -> &Arc<ModelType> {
        &self.model_type
    }

    pub fn name(&self) -> &str {
        self.model_type.name()
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    pub fn set_attribute(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(column.to_string(), value.into());
        self
    }

    pub(crate) fn take_attribute(&mut self, column: &str) -> Option<Value> {
        self.attributes.shift_remove(column)
    }

    pub fn key(&self) -> Option<&Value> {
        self.get(self.model_type.key_name())
    }

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> &IndexMap<String, Related> {
        &self.relations
    }

    pub fn set_relation(&mut self, name: &str, related: Related) -> &mut Self {
        self.relations.insert(name.to_string(), related);
        self
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn unset_relation(&mut self, name: &str) -> &mut Self {
        self.relations.shift_remove(name);
        self
    }

    pub(crate) fn set_prevents_lazy_loading(&mut self, prevents: bool) {
        self.prevents_lazy_loading = prevents;
    }

    pub fn prevents_lazy_loading(&self) -> bool {
        self.prevents_lazy_loading
    }

    /// Convert attributes and loaded relations into a typed value
    pub fn deserialize<T: DeserializeOwned>(&self) -> OrmResult<T> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::from_value(value)?)
    }

    /// The loaded relation, lazy loading it on first access
    pub async fn related(&mut self, ctx: &Arc<OrmContext>, name: &str) -> OrmResult<&Related> {
        if !self.relation_loaded(name) {
            self.lazy_load(ctx, name).await?;
        }
        self.relations
            .get(name)
            .ok_or_else(|| OrmError::relation_not_found(self.name(), name))
    }

    /// Load a single relation for this model with its own query.
    ///
    /// Fails with [`OrmError::LazyLoadingViolation`] when the model was
    /// hydrated as part of a multi-row result and lazy loading is disabled.
    pub async fn lazy_load(&mut self, ctx: &Arc<OrmContext>, name: &str) -> OrmResult<&Related> {
        if self.prevents_lazy_loading {
            return Err(OrmError::LazyLoadingViolation {
                model: self.name().to_string(),
                relation: name.to_string(),
            });
        }

        let instance = Model::new_instance(Arc::clone(&self.model_type));
        let definition = self
            .model_type
            .relation_def(&instance, name)
            .ok_or_else(|| OrmError::relation_not_found(self.name(), name))?;

        debug!(model = %self.name(), relation = %name, "Lazy loading relation");
        let mut relation = Relation::for_parent(ctx, self, definition)?;
        let related = relation.get_results().await?;
        self.relations.insert(name.to_string(), related);
        self.relations
            .get(name)
            .ok_or_else(|| OrmError::relation_not_found(self.name(), name))
    }

    pub fn has_one(&self, related: &str, foreign_key: &str, local_key: &str) -> RelationDef {
        RelationDef::new(
            related,
            RelationKind::HasOne {
                foreign_key: foreign_key.to_string(),
                local_key: local_key.to_string(),
            },
        )
    }

    pub fn has_many(&self, related: &str, foreign_key: &str, local_key: &str) -> RelationDef {
        RelationDef::new(
            related,
            RelationKind::HasMany {
                foreign_key: foreign_key.to_string(),
                local_key: local_key.to_string(),
            },
        )
    }

    pub fn belongs_to(&self, related: &str, foreign_key: &str, owner_key: &str) -> RelationDef {
        RelationDef::new(
            related,
            RelationKind::BelongsTo {
                foreign_key: foreign_key.to_string(),
                owner_key: owner_key.to_string(),
            },
        )
    }

    /// Many-to-many through `pivot_table`. The parent side matches on this
    /// model's primary key; the related side on `id` unless overridden with
    /// [`RelationDef::related_key`].
    pub fn belongs_to_many(
        &self,
        related: &str,
        pivot_table: &str,
        foreign_pivot_key: &str,
        related_pivot_key: &str,
    ) -> RelationDef {
        RelationDef::new(
            related,
            RelationKind::BelongsToMany {
                pivot_table: pivot_table.to_string(),
                foreign_pivot_key: foreign_pivot_key.to_string(),
                related_pivot_key: related_pivot_key.to_string(),
                parent_key: self.model_type.key_name().to_string(),
                related_key: "id".to_string(),
                pivot_columns: Vec::new(),
            },
        )
    }

    /// Distant relation through an intermediate model: `first_key` lives on
    /// the intermediate table, `second_key` on the related table.
    pub fn has_many_through(
        &self,
        related: &str,
        through: &str,
        first_key: &str,
        second_key: &str,
    ) -> RelationDef {
        RelationDef::new(related, self.through_kind(through, first_key, second_key, true))
    }

    pub fn has_one_through(
        &self,
        related: &str,
        through: &str,
        first_key: &str,
        second_key: &str,
    ) -> RelationDef {
        RelationDef::new(related, self.through_kind(through, first_key, second_key, false))
    }

    fn through_kind(&self, through: &str, first_key: &str, second_key: &str, many: bool) -> RelationKind {
        let through = crate::relations::Through {
            through: through.to_string(),
            first_key: first_key.to_string(),
            second_key: second_key.to_string(),
            local_key: self.model_type.key_name().to_string(),
            second_local_key: "id".to_string(),
        };
        if many {
            RelationKind::HasManyThrough(through)
        } else {
            RelationKind::HasOneThrough(through)
        }
    }

    /// Polymorphic one-to-one: the related table carries `{name}_type` and
    /// `{name}_id` columns
    pub fn morph_one(&self, related: &str, name: &str) -> RelationDef {
        RelationDef::new(related, self.morph_kind(name, false))
    }

    pub fn morph_many(&self, related: &str, name: &str) -> RelationDef {
        RelationDef::new(related, self.morph_kind(name, true))
    }

    fn morph_kind(&self, name: &str, many: bool) -> RelationKind {
        let morph = crate::relations::Morph {
            morph_type: format!("{name}_type"),
            morph_id: format!("{name}_id"),
            morph_class: self.model_type.morph_class().to_string(),
            local_key: self.model_type.key_name().to_string(),
        };
        if many {
            RelationKind::MorphMany(morph)
        } else {
            RelationKind::MorphOne(morph)
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.model_type.name())
            .field("attributes", &self.attributes)
            .field("relations", &self.relations)
            .field("exists", &self.exists)
            .finish()
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.model_type.name() == other.model_type.name()
            && self.attributes == other.attributes
            && self.relations == other.relations
            && self.exists == other.exists
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.attributes.len() + self.relations.len()))?;
        for (column, value) in &self.attributes {
            map.serialize_entry(column, value)?;
        }
        for (name, related) in &self.relations {
            map.serialize_entry(name, related)?;
        }
        map.end()
    }
}
