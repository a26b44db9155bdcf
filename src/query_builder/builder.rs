use super::conditions::{write_clauses, Boolean, Condition, SqlWriter, WhereClause};
use super::joins::Join;
use crate::error::{OrmError, OrmResult};
use serde_json::Value;
use std::fmt;

/// Sort direction for ORDER BY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(direction: &str) -> Option<Self> {
        match direction.to_ascii_lowercase().as_str() {
            "asc" => Some(Direction::Asc),
            "desc" => Some(Direction::Desc),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => write!(f, "ASC"),
            Direction::Desc => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Min,
    Max,
    Sum,
    Avg,
}

impl AggregateFunction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub column: String,
}

/// Column name under which aggregate results are returned
pub const AGGREGATE_ALIAS: &str = "aggregate";

/// Low-level statement builder: the predicate accumulator plus the
/// selection, join, ordering and limit directives for a single table.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    table: String,
    columns: Vec<String>,
    joins: Vec<Join>,
    wheres: Vec<WhereClause>,
    orders: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    aggregate: Option<Aggregate>,
    distinct: bool,
}

impl Statement {
    /// Create a new statement for the given table
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            joins: Vec::new(),
            wheres: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            aggregate: None,
            distinct: false,
        }
    }

    /// Empty statement used to collect a nested predicate group
    pub fn for_nested_where(&self) -> Self {
        Self::new(&self.table)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn wheres(&self) -> &[WhereClause] {
        &self.wheres
    }

    pub fn wheres_mut(&mut self) -> &mut Vec<WhereClause> {
        &mut self.wheres
    }

    pub fn orders(&self) -> &[OrderBy] {
        &self.orders
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    pub fn aggregate_value(&self) -> Option<&Aggregate> {
        self.aggregate.as_ref()
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Replace the selected columns
    pub fn select(&mut self, columns: &[&str]) -> &mut Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Append to the selected columns
    pub fn add_select(&mut self, columns: &[&str]) -> &mut Self {
        self.columns.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    /// Push a single predicate onto the accumulator
    pub fn push_where(&mut self, clause: WhereClause) -> &mut Self {
        self.wheres.push(clause);
        self
    }

    pub fn where_basic(
        &mut self,
        column: &str,
        operator: &str,
        value: impl Into<Value>,
        boolean: Boolean,
    ) -> &mut Self {
        self.push_where(WhereClause::basic(column, operator, value.into(), boolean))
    }

    pub fn where_eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.where_basic(column, "=", value, Boolean::And)
    }

    pub fn where_op(&mut self, column: &str, operator: &str, value: impl Into<Value>) -> &mut Self {
        self.where_basic(column, operator, value, Boolean::And)
    }

    pub fn or_where(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.where_basic(column, "=", value, Boolean::Or)
    }

    pub fn or_where_op(
        &mut self,
        column: &str,
        operator: &str,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.where_basic(column, operator, value, Boolean::Or)
    }

    pub fn where_column(&mut self, first: &str, operator: &str, second: &str) -> &mut Self {
        self.push_where(WhereClause::new(
            Condition::Column {
                first: first.to_string(),
                operator: operator.to_string(),
                second: second.to_string(),
            },
            Boolean::And,
        ))
    }

    fn where_in_with(
        &mut self,
        column: &str,
        values: Vec<Value>,
        negated: bool,
        boolean: Boolean,
    ) -> &mut Self {
        self.push_where(WhereClause::new(
            Condition::In {
                column: column.to_string(),
                values,
                negated,
            },
            boolean,
        ))
    }

    pub fn where_in(&mut self, column: &str, values: Vec<Value>) -> &mut Self {
        self.where_in_with(column, values, false, Boolean::And)
    }

    pub fn where_not_in(&mut self, column: &str, values: Vec<Value>) -> &mut Self {
        self.where_in_with(column, values, true, Boolean::And)
    }

    pub fn or_where_in(&mut self, column: &str, values: Vec<Value>) -> &mut Self {
        self.where_in_with(column, values, false, Boolean::Or)
    }

    fn where_null_with(&mut self, column: &str, negated: bool, boolean: Boolean) -> &mut Self {
        self.push_where(WhereClause::new(
            Condition::Null {
                column: column.to_string(),
                negated,
            },
            boolean,
        ))
    }

    pub fn where_null(&mut self, column: &str) -> &mut Self {
        self.where_null_with(column, false, Boolean::And)
    }

    pub fn where_not_null(&mut self, column: &str) -> &mut Self {
        self.where_null_with(column, true, Boolean::And)
    }

    pub fn or_where_null(&mut self, column: &str) -> &mut Self {
        self.where_null_with(column, false, Boolean::Or)
    }

    pub fn where_between(
        &mut self,
        column: &str,
        start: impl Into<Value>,
        end: impl Into<Value>,
    ) -> &mut Self {
        self.push_where(WhereClause::new(
            Condition::Between {
                column: column.to_string(),
                start: start.into(),
                end: end.into(),
                negated: false,
            },
            Boolean::And,
        ))
    }

    pub fn where_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.push_where(WhereClause::new(
            Condition::Raw {
                sql: sql.to_string(),
                bindings,
            },
            Boolean::And,
        ))
    }

    pub fn or_where_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.push_where(WhereClause::new(
            Condition::Raw {
                sql: sql.to_string(),
                bindings,
            },
            Boolean::Or,
        ))
    }

    /// Collect predicates added by `build` into one parenthesised group.
    /// Empty groups are dropped.
    pub fn where_nested<F>(&mut self, boolean: Boolean, build: F) -> &mut Self
    where
        F: FnOnce(&mut Statement),
    {
        let mut nested = self.for_nested_where();
        build(&mut nested);
        self.push_nested(nested.wheres, boolean)
    }

    pub fn push_nested(&mut self, clauses: Vec<WhereClause>, boolean: Boolean) -> &mut Self {
        if !clauses.is_empty() {
            self.wheres.push(WhereClause::nested(clauses, boolean));
        }
        self
    }

    pub fn join(&mut self, join: Join) -> &mut Self {
        self.joins.push(join);
        self
    }

    pub fn inner_join(&mut self, table: &str, first: &str, operator: &str, second: &str) -> &mut Self {
        self.join(Join::inner(table, first, operator, second))
    }

    pub fn left_join(&mut self, table: &str, first: &str, operator: &str, second: &str) -> &mut Self {
        self.join(Join::left(table, first, operator, second))
    }

    pub fn order_by(&mut self, column: &str, direction: Direction) -> &mut Self {
        self.orders.push(OrderBy {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn latest(&mut self, column: &str) -> &mut Self {
        self.order_by(column, Direction::Desc)
    }

    pub fn oldest(&mut self, column: &str) -> &mut Self {
        self.order_by(column, Direction::Asc)
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Clone of this statement computing `function(column)` instead of rows
    pub fn to_aggregate(&self, function: AggregateFunction, column: &str) -> Statement {
        let mut statement = self.clone();
        statement.aggregate = Some(Aggregate {
            function,
            column: column.to_string(),
        });
        statement
    }

    /// Bound values in predicate order
    pub fn raw_bindings(&self) -> Vec<Value> {
        self.wheres.iter().flat_map(|clause| clause.bindings()).collect()
    }

    pub fn write_sql<W: SqlWriter + ?Sized>(&self, writer: &mut W) {
        writer.push_sql("SELECT ");
        if self.distinct {
            writer.push_sql("DISTINCT ");
        }

        match &self.aggregate {
            Some(aggregate) => writer.push_sql(&format!(
                "{}({}) AS {}",
                aggregate.function.as_sql(),
                aggregate.column,
                AGGREGATE_ALIAS
            )),
            None if self.columns.is_empty() => writer.push_sql("*"),
            None => writer.push_sql(&self.columns.join(", ")),
        }

        writer.push_sql(&format!(" FROM {}", self.table));

        for join in &self.joins {
            writer.push_sql(" ");
            writer.push_sql(&join.to_sql());
        }

        if !self.wheres.is_empty() {
            writer.push_sql(" WHERE ");
            write_clauses(&self.wheres, writer);
        }

        if self.aggregate.is_some() {
            return;
        }

        if !self.orders.is_empty() {
            let orders: Vec<String> = self
                .orders
                .iter()
                .map(|order| format!("{} {}", order.column, order.direction))
                .collect();
            writer.push_sql(&format!(" ORDER BY {}", orders.join(", ")));
        }

        if let Some(limit) = self.limit {
            writer.push_sql(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            writer.push_sql(&format!(" OFFSET {offset}"));
        }
    }

    /// Build the SQL with literals inlined (for logging and inspection)
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        self.write_sql(&mut sql);
        sql
    }
}

/// A statement-builder method reachable by name
pub type ForwardFn = fn(&mut Statement, &[Value]) -> OrmResult<()>;

/// Look up a statement-builder method by its dynamic name
pub fn forward_method(name: &str) -> Option<ForwardFn> {
    let method: ForwardFn = match name {
        "where" => |s, args| forward_basic(s, "where", args, Boolean::And),
        "or_where" => |s, args| forward_basic(s, "or_where", args, Boolean::Or),
        "where_in" => |s, args| {
            let (column, values) = column_and_list("where_in", args)?;
            s.where_in(column, values);
            Ok(())
        },
        "where_not_in" => |s, args| {
            let (column, values) = column_and_list("where_not_in", args)?;
            s.where_not_in(column, values);
            Ok(())
        },
        "or_where_in" => |s, args| {
            let (column, values) = column_and_list("or_where_in", args)?;
            s.or_where_in(column, values);
            Ok(())
        },
        "where_null" => |s, args| {
            s.where_null(str_arg("where_null", args, 0)?);
            Ok(())
        },
        "where_not_null" => |s, args| {
            s.where_not_null(str_arg("where_not_null", args, 0)?);
            Ok(())
        },
        "or_where_null" => |s, args| {
            s.or_where_null(str_arg("or_where_null", args, 0)?);
            Ok(())
        },
        "where_between" => |s, args| {
            let (column, values) = column_and_list("where_between", args)?;
            match values.as_slice() {
                [start, end] => {
                    s.where_between(column, start.clone(), end.clone());
                    Ok(())
                }
                _ => Err(OrmError::invalid_argument(
                    "where_between",
                    "expected exactly two bounds",
                )),
            }
        },
        "where_column" => |s, args| match args {
            [Value::String(first), Value::String(second)] => {
                s.where_column(first, "=", second);
                Ok(())
            }
            [Value::String(first), Value::String(operator), Value::String(second)] => {
                s.where_column(first, operator, second);
                Ok(())
            }
            _ => Err(OrmError::invalid_argument(
                "where_column",
                "expected (first, [operator,] second) column names",
            )),
        },
        "where_raw" => |s, args| {
            let sql = str_arg("where_raw", args, 0)?;
            s.where_raw(sql, optional_list(args, 1));
            Ok(())
        },
        "or_where_raw" => |s, args| {
            let sql = str_arg("or_where_raw", args, 0)?;
            s.or_where_raw(sql, optional_list(args, 1));
            Ok(())
        },
        "order_by" => |s, args| {
            let column = str_arg("order_by", args, 0)?;
            let direction = match args.get(1) {
                None => Direction::Asc,
                Some(Value::String(direction)) => Direction::parse(direction).ok_or_else(|| {
                    OrmError::invalid_argument(
                        "order_by",
                        "order direction must be \"asc\" or \"desc\"",
                    )
                })?,
                Some(_) => {
                    return Err(OrmError::invalid_argument(
                        "order_by",
                        "order direction must be a string",
                    ))
                }
            };
            s.order_by(column, direction);
            Ok(())
        },
        "latest" => |s, args| {
            s.latest(optional_str(args, 0).unwrap_or("created_at"));
            Ok(())
        },
        "oldest" => |s, args| {
            s.oldest(optional_str(args, 0).unwrap_or("created_at"));
            Ok(())
        },
        "limit" | "take" => |s, args| {
            s.limit(u64_arg("limit", args, 0)?);
            Ok(())
        },
        "offset" | "skip" => |s, args| {
            s.offset(u64_arg("offset", args, 0)?);
            Ok(())
        },
        "select" => |s, args| {
            let columns = string_args("select", args)?;
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            s.select(&columns);
            Ok(())
        },
        "add_select" => |s, args| {
            let columns = string_args("add_select", args)?;
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            s.add_select(&columns);
            Ok(())
        },
        "distinct" => |s, _args| {
            s.distinct();
            Ok(())
        },
        _ => return None,
    };
    Some(method)
}

fn forward_basic(
    statement: &mut Statement,
    method: &str,
    args: &[Value],
    boolean: Boolean,
) -> OrmResult<()> {
    match args {
        [Value::String(column), value] => {
            statement.where_basic(column, "=", value.clone(), boolean);
            Ok(())
        }
        [Value::String(column), Value::String(operator), value] => {
            statement.where_basic(column, operator, value.clone(), boolean);
            Ok(())
        }
        _ => Err(OrmError::invalid_argument(
            method,
            "expected (column, [operator,] value)",
        )),
    }
}

fn str_arg<'a>(method: &str, args: &'a [Value], index: usize) -> OrmResult<&'a str> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| OrmError::invalid_argument(method, format!("argument {index} must be a string")))
}

fn optional_str(args: &[Value], index: usize) -> Option<&str> {
    args.get(index).and_then(Value::as_str)
}

fn u64_arg(method: &str, args: &[Value], index: usize) -> OrmResult<u64> {
    args.get(index).and_then(Value::as_u64).ok_or_else(|| {
        OrmError::invalid_argument(method, format!("argument {index} must be a non-negative integer"))
    })
}

fn optional_list(args: &[Value], index: usize) -> Vec<Value> {
    match args.get(index) {
        Some(Value::Array(values)) => values.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(value) => vec![value.clone()],
    }
}

fn column_and_list<'a>(method: &str, args: &'a [Value]) -> OrmResult<(&'a str, Vec<Value>)> {
    match args {
        [Value::String(column), Value::Array(values)] => Ok((column.as_str(), values.clone())),
        _ => Err(OrmError::invalid_argument(method, "expected (column, [values])")),
    }
}

fn string_args(method: &str, args: &[Value]) -> OrmResult<Vec<String>> {
    let flattened: Vec<&Value> = args
        .iter()
        .flat_map(|arg| match arg {
            Value::Array(values) => values.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect();

    flattened
        .into_iter()
        .map(|value| {
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| OrmError::invalid_argument(method, "column names must be strings"))
        })
        .collect()
}
