use super::{scope_id, Scope};
use crate::models::ModelType;
use crate::query::Query;

pub const DELETED_AT: &str = "deleted_at";

/// Hides rows whose deletion timestamp is set.
///
/// Registering the scope adds three local macros to the query:
/// `with_trashed`, `without_trashed` and `only_trashed`.
#[derive(Debug, Clone)]
pub struct SoftDeletingScope {
    column: String,
}

impl SoftDeletingScope {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }
}

impl Default for SoftDeletingScope {
    fn default() -> Self {
        Self::new(DELETED_AT)
    }
}

impl Scope for SoftDeletingScope {
    fn apply(&self, query: &mut Query, model: &ModelType) {
        query.where_null(&model.qualify_column(&self.column));
    }

    fn extend(&self, query: &mut Query) {
        let qualified = query.model().qualify_column(&self.column);

        query.local_macro("with_trashed", {
            let qualified = qualified.clone();
            move |query, args| {
                let query = Query::bound_macro_target(query, "with_trashed")?;
                // with_trashed(false) behaves like without_trashed
                if args.first().and_then(|flag| flag.as_bool()) == Some(false) {
                    query
                        .without_global_scope(&scope_id::<SoftDeletingScope>())
                        .where_null(&qualified);
                } else {
                    query.without_global_scope(&scope_id::<SoftDeletingScope>());
                }
                Ok(None)
            }
        });

        query.local_macro("without_trashed", {
            let qualified = qualified.clone();
            move |query, _args| {
                Query::bound_macro_target(query, "without_trashed")?
                    .without_global_scope(&scope_id::<SoftDeletingScope>())
                    .where_null(&qualified);
                Ok(None)
            }
        });

        query.local_macro("only_trashed", move |query, _args| {
            Query::bound_macro_target(query, "only_trashed")?
                .without_global_scope(&scope_id::<SoftDeletingScope>())
                .where_not_null(&qualified);
            Ok(None)
        });
    }
}
