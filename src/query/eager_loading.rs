use super::Query;
use crate::eager::{Constraint, EagerLoadSpec, NestedSpec};
use crate::error::{OrmError, OrmResult};
use crate::logging::log_eager_load_operation;
use crate::models::Model;
use crate::relations::Relation;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::instrument;

impl Query {
    /// Eager load every top-level relation of the specification onto
    /// `models`.
    ///
    /// Each top-level path issues exactly one statement regardless of how
    /// many models are loaded. Deeper paths are handed to the relation's own
    /// query and resolve after their parent level has been fetched.
    pub fn eager_load_relations<'a>(&'a self, models: &'a mut [Model]) -> BoxFuture<'a, OrmResult<()>> {
        async move {
            for (name, constraint) in self.eager_load.top_level() {
                self.eager_load_relation(models, &name, &constraint).await?;
            }
            Ok(())
        }
        .boxed()
    }

    #[instrument(skip(self, models, constraint), fields(model = %self.model.name(), owners = models.len()))]
    async fn eager_load_relation(
        &self,
        models: &mut [Model],
        name: &str,
        constraint: &Constraint,
    ) -> OrmResult<()> {
        let mut relation = self.get_relation(name)?;
        let nested: Vec<String> = relation
            .query()
            .eager_load()
            .keys()
            .into_iter()
            .map(str::to_string)
            .collect();

        relation.add_eager_constraints(models);
        constraint.apply(&mut relation);

        let results = relation.get_eager().await?;
        log_eager_load_operation(self.model.name(), name, models.len(), results.len(), &nested);

        relation.init_relation(models, name);
        relation.match_eager(models, results, name);
        Ok(())
    }

    /// Build the named relation in "no constraints" mode, with the paths
    /// nested under it attached to its query
    pub fn get_relation(&self, name: &str) -> OrmResult<Relation> {
        let instance = Model::new_instance(Arc::clone(&self.model));
        let definition = self
            .model
            .relation_def(&instance, name)
            .ok_or_else(|| OrmError::relation_not_found(self.model.name(), name))?;

        let mut relation = Relation::for_eager_load(&self.ctx, Arc::clone(&self.model), definition)?;

        let nested = self.relations_nested_under(name);
        if !nested.is_empty() {
            relation.query_mut().merge_eager_load(nested);
        }
        Ok(relation)
    }

    pub fn relations_nested_under(&self, name: &str) -> EagerLoadSpec {
        self.eager_load.nested_under(name)
    }

    /// Eager load `spec` onto models that were already fetched
    pub async fn load(&self, models: &mut [Model], spec: impl Into<NestedSpec>) -> OrmResult<()> {
        if models.is_empty() {
            return Ok(());
        }
        let mut query = self.clone();
        query.with_only(spec);
        query.eager_load_relations(models).await
    }
}
