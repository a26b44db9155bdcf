use crate::relations::Relation;
use std::fmt;
use std::sync::Arc;

pub type ConstraintFn = Arc<dyn Fn(&mut Relation) + Send + Sync>;

/// Constraint run against a relation query before it executes.
///
/// A constraint is an ordered list of steps; the empty list is the no-op.
/// Composed constraints run every step, in registration order, against the
/// same relation.
#[derive(Clone, Default)]
pub struct Constraint {
    steps: Vec<ConstraintFn>,
}

impl Constraint {
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn new<F>(step: F) -> Self
    where
        F: Fn(&mut Relation) + Send + Sync + 'static,
    {
        Self {
            steps: vec![Arc::new(step)],
        }
    }

    /// Select only `columns` from the related table. For many-to-many
    /// relations unqualified columns are qualified with the related table,
    /// since the pivot table is joined into the same statement.
    pub fn select_columns(columns: Vec<String>) -> Self {
        Self::new(move |relation| {
            let qualify = relation.kind().is_pivot();
            let table = relation.related().table().to_string();
            let columns: Vec<String> = columns
                .iter()
                .map(|column| {
                    if qualify && !column.contains('.') {
                        format!("{table}.{column}")
                    } else {
                        column.clone()
                    }
                })
                .collect();
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            relation.query_mut().select(&columns);
        })
    }

    /// Sequential composition: `self`'s steps, then `next`'s.
    ///
    /// Every step receives the same `&mut Relation`. A step cannot hand a
    /// replacement relation to the steps after it; it can only mutate the
    /// one it is given.
    pub fn then(mut self, next: Constraint) -> Self {
        self.steps.extend(next.steps);
        self
    }

    pub fn apply(&self, relation: &mut Relation) {
        for step in &self.steps {
            step(relation);
        }
    }

    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_noop() {
            f.write_str("Constraint(noop)")
        } else {
            write!(f, "Constraint({} steps)", self.steps.len())
        }
    }
}
