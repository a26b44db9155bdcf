//! Predicate re-grouping applied after each scope runs.
//!
//! When a scope appends predicates to a list the caller already composed,
//! the two halves are grouped independently so an `or` contributed by one
//! side cannot bind to the other side's predicates:
//!
//! ```text
//! caller: a = 1 OR b = 2      scope: active = true
//! flat:   a = 1 OR b = 2 AND active = true
//! grouped: (a = 1 OR b = 2) AND active = true
//! ```

use crate::query_builder::WhereClause;

/// Re-group `wheres` around `original_count`, the predicate count recorded
/// before the scope ran. Each slice containing an `or` connector becomes a
/// single nested group whose connector is the slice's first connector with
/// `not` stripped; other slices stay flat.
pub fn add_new_wheres_within_group(wheres: &mut Vec<WhereClause>, original_count: usize) {
    let original_count = original_count.min(wheres.len());
    let mut all_wheres = std::mem::take(wheres);
    let suffix = all_wheres.split_off(original_count);

    group_where_slice_for_scope(wheres, all_wheres);
    group_where_slice_for_scope(wheres, suffix);
}

fn group_where_slice_for_scope(wheres: &mut Vec<WhereClause>, slice: Vec<WhereClause>) {
    let Some(first) = slice.first() else {
        return;
    };

    if slice.iter().any(|clause| clause.boolean.contains_or()) {
        let boolean = first.boolean.without_not();
        wheres.push(WhereClause::nested(slice, boolean));
    } else {
        wheres.extend(slice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_builder::{Boolean, Statement};

    fn rendered(statement: &Statement) -> String {
        statement.to_sql()
    }

    #[test]
    fn test_or_prefix_is_grouped_before_scope_predicates() {
        let mut statement = Statement::new("users");
        statement.where_eq("a", 1).or_where("b", 2);
        statement.where_eq("active", true);

        add_new_wheres_within_group(statement.wheres_mut(), 2);
        assert_eq!(
            rendered(&statement),
            "SELECT * FROM users WHERE (a = 1 OR b = 2) AND active = true"
        );
    }

    #[test]
    fn test_or_suffix_is_grouped_after_caller_predicates() {
        let mut statement = Statement::new("users");
        statement.where_eq("a", 1);
        statement.where_eq("b", 2).or_where("c", 3);

        add_new_wheres_within_group(statement.wheres_mut(), 1);
        assert_eq!(
            rendered(&statement),
            "SELECT * FROM users WHERE a = 1 AND (b = 2 OR c = 3)"
        );
    }

    #[test]
    fn test_flat_slices_stay_flat() {
        let mut statement = Statement::new("users");
        statement.where_eq("a", 1).where_eq("b", 2);
        add_new_wheres_within_group(statement.wheres_mut(), 1);
        assert_eq!(statement.wheres().len(), 2);
        assert!(!statement.wheres()[0].is_nested());
    }

    #[test]
    fn test_group_connector_is_first_connector_without_not() {
        let mut statement = Statement::new("users");
        statement.where_eq("a", 1);
        statement
            .where_basic("b", "=", 2, Boolean::OrNot)
            .or_where("c", 3);

        add_new_wheres_within_group(statement.wheres_mut(), 1);
        let group = &statement.wheres()[1];
        assert!(group.is_nested());
        assert_eq!(group.boolean, Boolean::Or);
    }

    #[test]
    fn test_empty_prefix_produces_only_suffix() {
        let mut statement = Statement::new("users");
        statement.where_eq("x", 1).or_where("y", 2);
        add_new_wheres_within_group(statement.wheres_mut(), 0);
        assert_eq!(statement.wheres().len(), 1);
        assert_eq!(
            rendered(&statement),
            "SELECT * FROM users WHERE (x = 1 OR y = 2)"
        );
    }
}
