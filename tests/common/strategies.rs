use proptest::prelude::*;

/// A single equality predicate over the two-column grid table, with the
/// connector that joins it to the previous predicate
#[derive(Debug, Clone)]
pub struct GridPredicate {
    pub column: &'static str,
    pub value: i64,
    pub or: bool,
}

/// Strategy for one predicate over columns `a` and `b` with values 0..4
pub fn grid_predicate_strategy() -> impl Strategy<Value = GridPredicate> {
    (prop_oneof![Just("a"), Just("b")], 0i64..4, any::<bool>())
        .prop_map(|(column, value, or)| GridPredicate { column, value, or })
}

/// Strategy for a predicate list as one caller or scope would build it
pub fn predicate_list_strategy() -> impl Strategy<Value = Vec<GridPredicate>> {
    prop::collection::vec(grid_predicate_strategy(), 0..4)
}

/// Evaluate a flat predicate list the way SQL does: AND binds tighter
/// than OR. An empty list matches every row.
pub fn matches_flat(predicates: &[GridPredicate], a: i64, b: i64) -> bool {
    if predicates.is_empty() {
        return true;
    }

    let mut groups: Vec<bool> = vec![true];
    for (index, predicate) in predicates.iter().enumerate() {
        let value = if predicate.column == "a" { a } else { b };
        let hit = value == predicate.value;
        if index > 0 && predicate.or {
            groups.push(hit);
        } else if let Some(current) = groups.last_mut() {
            *current = *current && hit;
        }
    }
    groups.into_iter().any(|group| group)
}

/// Strategy for a relation path segment
pub fn segment_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

/// Strategy for dotted eager-load paths one to four segments deep
pub fn dotted_path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(segment_strategy(), 1..=4).prop_map(|segments| segments.join("."))
}

/// Strategy for scope identifiers
pub fn scope_id_strategy() -> impl Strategy<Value = String> {
    "[a-z_]{1,12}"
}
