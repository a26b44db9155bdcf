use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Connector joining a predicate to the predicates before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boolean {
    And,
    Or,
    AndNot,
    OrNot,
}

impl Boolean {
    pub fn as_str(&self) -> &'static str {
        match self {
            Boolean::And => "and",
            Boolean::Or => "or",
            Boolean::AndNot => "and not",
            Boolean::OrNot => "or not",
        }
    }

    pub fn contains_or(&self) -> bool {
        matches!(self, Boolean::Or | Boolean::OrNot)
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, Boolean::AndNot | Boolean::OrNot)
    }

    /// The same connector with any "not" marker stripped
    pub fn without_not(&self) -> Boolean {
        match self {
            Boolean::And | Boolean::AndNot => Boolean::And,
            Boolean::Or | Boolean::OrNot => Boolean::Or,
        }
    }

    pub fn negate(&self) -> Boolean {
        match self {
            Boolean::And => Boolean::AndNot,
            Boolean::Or => Boolean::OrNot,
            other => *other,
        }
    }
}

impl fmt::Display for Boolean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents different types of SQL conditions
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Basic {
        column: String,
        operator: String,
        value: Value,
    },
    Column {
        first: String,
        operator: String,
        second: String,
    },
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    Null {
        column: String,
        negated: bool,
    },
    Between {
        column: String,
        start: Value,
        end: Value,
        negated: bool,
    },
    Raw {
        sql: String,
        bindings: Vec<Value>,
    },
    Nested(Vec<WhereClause>),
}

/// One node of a statement's predicate list
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub condition: Condition,
    pub boolean: Boolean,
}

impl WhereClause {
    pub fn new(condition: Condition, boolean: Boolean) -> Self {
        Self { condition, boolean }
    }

    pub fn basic(column: &str, operator: &str, value: Value, boolean: Boolean) -> Self {
        Self::new(
            Condition::Basic {
                column: column.to_string(),
                operator: operator.to_string(),
                value,
            },
            boolean,
        )
    }

    pub fn nested(clauses: Vec<WhereClause>, boolean: Boolean) -> Self {
        Self::new(Condition::Nested(clauses), boolean)
    }

    pub fn is_nested(&self) -> bool {
        matches!(self.condition, Condition::Nested(_))
    }

    /// Bound values of this clause, in rendering order
    pub fn bindings(&self) -> Vec<Value> {
        match &self.condition {
            Condition::Basic { value, .. } => vec![value.clone()],
            Condition::In { values, .. } => values.clone(),
            Condition::Between { start, end, .. } => vec![start.clone(), end.clone()],
            Condition::Raw { bindings, .. } => bindings.clone(),
            Condition::Nested(clauses) => clauses.iter().flat_map(|c| c.bindings()).collect(),
            Condition::Column { .. } | Condition::Null { .. } => Vec::new(),
        }
    }
}

/// Sink for rendered SQL. Literal rendering and parameter binding differ
/// per target; the clause walk is shared.
pub trait SqlWriter {
    fn push_sql(&mut self, sql: &str);
    fn push_value(&mut self, value: &Value);
}

impl SqlWriter for String {
    fn push_sql(&mut self, sql: &str) {
        self.push_str(sql);
    }

    fn push_value(&mut self, value: &Value) {
        self.push_str(&format_value(value));
    }
}

/// Render a predicate list, dropping the leading connector
pub fn write_clauses<W: SqlWriter + ?Sized>(clauses: &[WhereClause], writer: &mut W) {
    for (index, clause) in clauses.iter().enumerate() {
        if index > 0 {
            writer.push_sql(match clause.boolean.without_not() {
                Boolean::Or => " OR ",
                _ => " AND ",
            });
        }
        if clause.boolean.is_negated() {
            writer.push_sql("NOT ");
        }
        write_condition(&clause.condition, writer);
    }
}

fn write_condition<W: SqlWriter + ?Sized>(condition: &Condition, writer: &mut W) {
    match condition {
        Condition::Basic {
            column,
            operator,
            value,
        } => {
            writer.push_sql(&format!("{column} {operator} "));
            writer.push_value(value);
        }
        Condition::Column {
            first,
            operator,
            second,
        } => writer.push_sql(&format!("{first} {operator} {second}")),
        Condition::In {
            values, negated, ..
        } if values.is_empty() => {
            writer.push_sql(if *negated { "1 = 1" } else { "0 = 1" });
        }
        Condition::In {
            column,
            values,
            negated,
        } => {
            let keyword = if *negated { "NOT IN" } else { "IN" };
            writer.push_sql(&format!("{column} {keyword} ("));
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    writer.push_sql(", ");
                }
                writer.push_value(value);
            }
            writer.push_sql(")");
        }
        Condition::Null { column, negated } => {
            let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
            writer.push_sql(&format!("{column} {keyword}"));
        }
        Condition::Between {
            column,
            start,
            end,
            negated,
        } => {
            let keyword = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
            writer.push_sql(&format!("{column} {keyword} "));
            writer.push_value(start);
            writer.push_sql(" AND ");
            writer.push_value(end);
        }
        Condition::Raw { sql, bindings } => {
            // `?` placeholders are replaced by bound values in order
            let mut values = bindings.iter();
            let mut pieces = sql.split('?').peekable();
            while let Some(piece) = pieces.next() {
                writer.push_sql(piece);
                if pieces.peek().is_some() {
                    match values.next() {
                        Some(value) => writer.push_value(value),
                        None => writer.push_sql("?"),
                    }
                }
            }
        }
        Condition::Nested(clauses) => {
            writer.push_sql("(");
            write_clauses(clauses, writer);
            writer.push_sql(")");
        }
    }
}

/// Format a JSON value for SQL
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        _ => format!("'{}'", value.to_string().replace('\'', "''")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(clauses: &[WhereClause]) -> String {
        let mut sql = String::new();
        write_clauses(clauses, &mut sql);
        sql
    }

    #[test]
    fn test_leading_boolean_is_dropped() {
        let clauses = vec![
            WhereClause::basic("a", "=", json!(1), Boolean::Or),
            WhereClause::basic("b", "=", json!("x"), Boolean::And),
        ];
        assert_eq!(render(&clauses), "a = 1 AND b = 'x'");
    }

    #[test]
    fn test_nested_groups_are_parenthesised() {
        let clauses = vec![
            WhereClause::basic("a", "=", json!(1), Boolean::And),
            WhereClause::nested(
                vec![
                    WhereClause::basic("b", "=", json!(2), Boolean::And),
                    WhereClause::basic("c", "=", json!(3), Boolean::Or),
                ],
                Boolean::And,
            ),
        ];
        assert_eq!(render(&clauses), "a = 1 AND (b = 2 OR c = 3)");
    }

    #[test]
    fn test_negated_nested_group() {
        let clauses = vec![
            WhereClause::basic("a", "=", json!(1), Boolean::And),
            WhereClause::nested(
                vec![WhereClause::basic("b", "=", json!(2), Boolean::And)],
                Boolean::OrNot,
            ),
        ];
        assert_eq!(render(&clauses), "a = 1 OR NOT (b = 2)");
    }

    #[test]
    fn test_empty_in_list() {
        let clauses = vec![WhereClause::new(
            Condition::In {
                column: "id".to_string(),
                values: vec![],
                negated: false,
            },
            Boolean::And,
        )];
        assert_eq!(render(&clauses), "0 = 1");
    }

    #[test]
    fn test_raw_placeholders_and_quote_escaping() {
        let clauses = vec![WhereClause::new(
            Condition::Raw {
                sql: "lower(name) = ?".to_string(),
                bindings: vec![json!("o'brien")],
            },
            Boolean::And,
        )];
        assert_eq!(render(&clauses), "lower(name) = 'o''brien'");
    }

    #[test]
    fn test_without_not() {
        assert_eq!(Boolean::AndNot.without_not(), Boolean::And);
        assert_eq!(Boolean::OrNot.without_not(), Boolean::Or);
        assert!(Boolean::OrNot.contains_or());
        assert!(!Boolean::AndNot.contains_or());
    }
}
