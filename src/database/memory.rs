//! # In-Memory Row Store
//!
//! A process-local [`RowStore`] that evaluates statements directly against
//! JSON rows. Predicates follow SQL precedence (NOT, then AND, then OR), so
//! a mis-grouped predicate list produces the same wrong answer it would on
//! a real database. Every executed select is recorded in a statement log,
//! which makes query counts observable.

use super::row_store::{Row, RowStore};
use crate::error::{StoreError, StoreResult};
use crate::query_builder::{
    AggregateFunction, Boolean, Condition, Direction, Join, JoinType, Statement, WhereClause,
    AGGREGATE_ALIAS,
};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// A statement recorded by the in-memory store
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedStatement {
    pub table: String,
    pub sql: String,
}

#[derive(Debug, Default, Clone)]
struct Tables {
    rows: IndexMap<String, Vec<Row>>,
    sequences: HashMap<String, i64>,
}

impl Tables {
    /// Committed rows with `pending` inserts appended
    fn overlay(&self, pending: &[PendingInsert]) -> Tables {
        let mut tables = self.clone();
        for insert in pending {
            tables
                .rows
                .entry(insert.table.clone())
                .or_default()
                .push(insert.row.clone());
        }
        tables
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: Tables,
    unique_keys: HashMap<String, Vec<Vec<String>>>,
    log: Vec<LoggedStatement>,
}

/// Uncommitted work of one transaction. Inserts stay private to the handles
/// of this transaction until the outermost level commits.
#[derive(Debug)]
struct PendingInsert {
    table: String,
    key_name: String,
    row: Row,
}

#[derive(Debug, Default)]
struct PendingWork {
    inserts: Vec<PendingInsert>,
    /// Length of `inserts` when each level opened; empty once finished
    marks: Vec<usize>,
}

/// In-process row store.
///
/// The store returned by [`MemoryRowStore::new`] is shared: its statements
/// never run inside a transaction. `begin_transaction` returns a separate
/// handle over the same tables that owns the new transaction, so concurrent
/// tasks only see each other's committed rows.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    state: Arc<Mutex<MemoryState>>,
    transaction: Option<Arc<Mutex<PendingWork>>>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a unique key over `columns` for `table`
    pub fn with_unique(self, table: &str, columns: &[&str]) -> Self {
        self.state
            .lock()
            .unique_keys
            .entry(table.to_string())
            .or_default()
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Load rows without constraint checks. Non-object values are ignored.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut state = self.state.lock();
        let tables = &mut state.tables;
        for value in rows {
            if let Value::Object(row) = value {
                if let Some(id) = row.get("id").and_then(Value::as_i64) {
                    let sequence = tables.sequences.entry(table.to_string()).or_insert(0);
                    *sequence = (*sequence).max(id);
                }
                tables.rows.entry(table.to_string()).or_default().push(row);
            }
        }
    }

    /// Committed contents of a table
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .tables
            .rows
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn query_count(&self) -> usize {
        self.state.lock().log.len()
    }

    /// Number of logged selects issued against `table`
    pub fn query_count_for(&self, table: &str) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|entry| entry.table == table)
            .count()
    }

    pub fn queries(&self) -> Vec<LoggedStatement> {
        self.state.lock().log.clone()
    }

    pub fn flush_query_log(&self) {
        self.state.lock().log.clear();
    }

    /// A handle over the same tables bound to `work`
    fn handle(&self, work: Arc<Mutex<PendingWork>>) -> Arc<dyn RowStore> {
        Arc::new(MemoryRowStore {
            state: Arc::clone(&self.state),
            transaction: Some(work),
        })
    }

    fn open_work(&self) -> StoreResult<&Arc<Mutex<PendingWork>>> {
        match &self.transaction {
            Some(work) if !work.lock().marks.is_empty() => Ok(work),
            Some(_) => Err(finished()),
            None => Err(StoreError::Transaction(
                "no open transaction on the shared store".to_string(),
            )),
        }
    }

    fn execute_select(tables: &Tables, statement: &Statement) -> StoreResult<Vec<Row>> {
        let base = tables
            .rows
            .get(statement.table())
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut contexts: Vec<JoinedRow> = base
            .iter()
            .map(|row| JoinedRow::new(statement.table(), row.clone()))
            .collect();

        for join in statement.joins() {
            contexts = apply_join(contexts, join, tables)?;
        }

        let mut matched = Vec::with_capacity(contexts.len());
        for context in contexts {
            if eval_clauses(&context, statement.wheres())? {
                matched.push(context);
            }
        }

        if let Some(aggregate) = statement.aggregate_value() {
            let value = compute_aggregate(&matched, aggregate.function, &aggregate.column);
            let mut row = Row::new();
            row.insert(AGGREGATE_ALIAS.to_string(), value);
            return Ok(vec![row]);
        }

        if !statement.orders().is_empty() {
            matched.sort_by(|a, b| {
                for order in statement.orders() {
                    let ordering = compare_for_sort(a.resolve(&order.column), b.resolve(&order.column));
                    let ordering = match order.direction {
                        Direction::Asc => ordering,
                        Direction::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = statement.offset_value().unwrap_or(0) as usize;
        let limit = statement.limit_value().map(|l| l as usize).unwrap_or(usize::MAX);

        let mut rows: Vec<Row> = matched
            .iter()
            .skip(offset)
            .take(limit)
            .map(|context| context.project(statement.columns()))
            .collect();

        if statement.is_distinct() {
            let mut unique: Vec<Row> = Vec::with_capacity(rows.len());
            for row in rows {
                if !unique.contains(&row) {
                    unique.push(row);
                }
            }
            rows = unique;
        }

        Ok(rows)
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn select(&self, statement: &Statement) -> StoreResult<Vec<Row>> {
        let mut state = self.state.lock();
        let sql = statement.to_sql();
        trace!(sql = %sql, "memory store select");
        state.log.push(LoggedStatement {
            table: statement.table().to_string(),
            sql,
        });

        match &self.transaction {
            Some(work) => {
                let work = work.lock();
                if work.marks.is_empty() {
                    return Err(finished());
                }
                if work.inserts.is_empty() {
                    Self::execute_select(&state.tables, statement)
                } else {
                    Self::execute_select(&state.tables.overlay(&work.inserts), statement)
                }
            }
            None => Self::execute_select(&state.tables, statement),
        }
    }

    async fn insert(&self, table: &str, key_name: &str, attributes: Row) -> StoreResult<Row> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut pending = self.transaction.as_ref().map(|work| work.lock());
        if pending.as_ref().is_some_and(|work| work.marks.is_empty()) {
            return Err(finished());
        }

        let mut row = attributes;
        let mut existing: Vec<&Row> = state
            .tables
            .rows
            .get(table)
            .map(|rows| rows.iter().collect())
            .unwrap_or_default();
        if let Some(work) = &pending {
            existing.extend(
                work.inserts
                    .iter()
                    .filter(|insert| insert.table == table)
                    .map(|insert| &insert.row),
            );
        }
        if let Some(error) = unique_violation(&state.unique_keys, table, key_name, &row, &existing) {
            return Err(error);
        }

        // Keys are allocated from the shared sequence and never reused
        let sequence = state.tables.sequences.entry(table.to_string()).or_insert(0);
        match row.get(key_name).and_then(Value::as_i64) {
            Some(id) => *sequence = (*sequence).max(id),
            None if row.get(key_name).is_none_or(Value::is_null) => {
                *sequence += 1;
                row.insert(key_name.to_string(), json!(*sequence));
            }
            None => {}
        }

        match pending.as_mut() {
            Some(work) => work.inserts.push(PendingInsert {
                table: table.to_string(),
                key_name: key_name.to_string(),
                row: row.clone(),
            }),
            None => state
                .tables
                .rows
                .entry(table.to_string())
                .or_default()
                .push(row.clone()),
        }
        Ok(row)
    }

    fn transaction_level(&self) -> usize {
        self.transaction
            .as_ref()
            .map_or(0, |work| work.lock().marks.len())
    }

    async fn begin_transaction(&self) -> StoreResult<Arc<dyn RowStore>> {
        let work = match &self.transaction {
            None => Arc::new(Mutex::new(PendingWork {
                inserts: Vec::new(),
                marks: vec![0],
            })),
            Some(_) => {
                let work = self.open_work()?;
                let mut pending = work.lock();
                let mark = pending.inserts.len();
                pending.marks.push(mark);
                drop(pending);
                Arc::clone(work)
            }
        };
        debug!(level = work.lock().marks.len(), "Memory store began transaction level");
        Ok(self.handle(work))
    }

    async fn commit(&self) -> StoreResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut work = self.open_work()?.lock();

        if work.marks.len() > 1 {
            work.marks.pop();
            return Ok(());
        }

        let inserts = std::mem::take(&mut work.inserts);
        work.marks.clear();
        for insert in &inserts {
            let committed: Vec<&Row> = state
                .tables
                .rows
                .get(&insert.table)
                .map(|rows| rows.iter().collect())
                .unwrap_or_default();
            if let Some(error) = unique_violation(
                &state.unique_keys,
                &insert.table,
                &insert.key_name,
                &insert.row,
                &committed,
            ) {
                return Err(error);
            }
        }
        for insert in inserts {
            state.tables.rows.entry(insert.table).or_default().push(insert.row);
        }
        Ok(())
    }

    async fn rollback(&self) -> StoreResult<()> {
        let mut work = self.open_work()?.lock();
        let mark = work.marks.pop().unwrap_or_default();
        work.inserts.truncate(mark);
        Ok(())
    }
}

fn finished() -> StoreError {
    StoreError::Transaction("transaction already finished".to_string())
}

/// The first unique key of `table` (or its primary key, when set on `row`)
/// that `row` collides with among `existing`
fn unique_violation(
    unique_keys: &HashMap<String, Vec<Vec<String>>>,
    table: &str,
    key_name: &str,
    row: &Row,
    existing: &[&Row],
) -> Option<StoreError> {
    let mut keys: Vec<Vec<String>> = unique_keys.get(table).cloned().unwrap_or_default();
    if row.get(key_name).is_some_and(|v| !v.is_null()) {
        keys.push(vec![key_name.to_string()]);
    }

    keys.into_iter()
        .find(|columns| {
            existing.iter().any(|other| {
                columns.iter().all(|column| match (row.get(column), other.get(column)) {
                    (Some(a), Some(b)) if !a.is_null() => loosely_equal(a, b),
                    _ => false,
                })
            })
        })
        .map(|columns| StoreError::UniqueViolation {
            table: table.to_string(),
            detail: format!("duplicate key value for ({})", columns.join(", ")),
        })
}

/// A base row plus the rows joined onto it, each tagged with its table
#[derive(Debug, Clone)]
struct JoinedRow {
    segments: Vec<(String, Row)>,
}

impl JoinedRow {
    fn new(table: &str, row: Row) -> Self {
        Self {
            segments: vec![(table.to_string(), row)],
        }
    }

    fn with(&self, table: &str, row: Row) -> Self {
        let mut joined = self.clone();
        joined.segments.push((table.to_string(), row));
        joined
    }

    /// Resolve `table.column` or a bare `column` (first segment wins)
    fn resolve(&self, column: &str) -> Option<&Value> {
        match column.split_once('.') {
            Some((table, name)) => self
                .segments
                .iter()
                .find(|(t, _)| t == table)
                .and_then(|(_, row)| row.get(name)),
            None => self.segments.iter().find_map(|(_, row)| row.get(column)),
        }
    }

    fn project(&self, columns: &[String]) -> Row {
        let mut projected = Row::new();
        if columns.is_empty() {
            self.extend_all(&mut projected);
            return projected;
        }

        for column in columns {
            let column = column.trim();
            if column == "*" {
                self.extend_all(&mut projected);
            } else if let Some(table) = column.strip_suffix(".*") {
                if let Some((_, row)) = self.segments.iter().find(|(t, _)| t == table) {
                    for (key, value) in row {
                        projected.insert(key.clone(), value.clone());
                    }
                }
            } else if let Some((expression, alias)) = split_alias(column) {
                let value = self.resolve(expression).cloned().unwrap_or(Value::Null);
                projected.insert(alias.to_string(), value);
            } else {
                let name = column.rsplit('.').next().unwrap_or(column);
                let value = self.resolve(column).cloned().unwrap_or(Value::Null);
                projected.insert(name.to_string(), value);
            }
        }
        projected
    }

    fn extend_all(&self, projected: &mut Row) {
        for (_, row) in &self.segments {
            for (key, value) in row {
                projected.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
}

fn split_alias(column: &str) -> Option<(&str, &str)> {
    let lowered = column.to_ascii_lowercase();
    lowered
        .find(" as ")
        .map(|index| (column[..index].trim(), column[index + 4..].trim()))
}

fn apply_join(contexts: Vec<JoinedRow>, join: &Join, tables: &Tables) -> StoreResult<Vec<JoinedRow>> {
    let candidates = tables
        .rows
        .get(&join.table)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut joined = Vec::new();
    for context in contexts {
        let mut matched = false;
        for candidate in candidates {
            let extended = context.with(&join.table, candidate.clone());
            if compare(
                extended.resolve(&join.first),
                &join.operator,
                extended.resolve(&join.second),
            )? {
                joined.push(extended);
                matched = true;
            }
        }
        if !matched && join.join_type == JoinType::Left {
            joined.push(context.with(&join.table, Row::new()));
        }
    }
    Ok(joined)
}

/// Evaluate a predicate list with SQL precedence: AND binds tighter than OR
fn eval_clauses(context: &JoinedRow, clauses: &[WhereClause]) -> StoreResult<bool> {
    let mut any_group = false;
    let mut current: Option<bool> = None;

    for clause in clauses {
        let mut value = eval_condition(context, &clause.condition)?;
        if clause.boolean.is_negated() {
            value = !value;
        }
        current = Some(match current {
            None => value,
            Some(group) if clause.boolean.without_not() == Boolean::Or => {
                any_group |= group;
                value
            }
            Some(group) => group && value,
        });
    }

    Ok(any_group || current.unwrap_or(true))
}

fn eval_condition(context: &JoinedRow, condition: &Condition) -> StoreResult<bool> {
    match condition {
        Condition::Basic {
            column,
            operator,
            value,
        } => compare(context.resolve(column), operator, Some(value)),
        Condition::Column {
            first,
            operator,
            second,
        } => compare(context.resolve(first), operator, context.resolve(second)),
        Condition::In {
            column,
            values,
            negated,
        } => {
            let Some(lhs) = context.resolve(column).filter(|v| !v.is_null()) else {
                return Ok(false);
            };
            let found = values.iter().any(|candidate| loosely_equal(lhs, candidate));
            Ok(found != *negated)
        }
        Condition::Null { column, negated } => {
            let is_null = context.resolve(column).is_none_or(Value::is_null);
            Ok(is_null != *negated)
        }
        Condition::Between {
            column,
            start,
            end,
            negated,
        } => {
            let lhs = context.resolve(column);
            let within = compare(lhs, ">=", Some(start))? && compare(lhs, "<=", Some(end))?;
            Ok(within != *negated)
        }
        Condition::Raw { sql, .. } => Err(StoreError::Unsupported(format!(
            "raw predicate `{sql}` cannot be evaluated in memory"
        ))),
        Condition::Nested(clauses) => eval_clauses(context, clauses),
    }
}

fn compare(lhs: Option<&Value>, operator: &str, rhs: Option<&Value>) -> StoreResult<bool> {
    let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
        return Ok(false);
    };
    if lhs.is_null() || rhs.is_null() {
        return Ok(false);
    }

    let ordering = compare_values(lhs, rhs);
    let result = match operator.to_ascii_lowercase().as_str() {
        "=" | "==" => ordering == Some(Ordering::Equal),
        "!=" | "<>" => ordering.is_some_and(|o| o != Ordering::Equal),
        "<" => ordering == Some(Ordering::Less),
        "<=" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        ">" => ordering == Some(Ordering::Greater),
        ">=" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        "like" => like(lhs, rhs),
        "not like" => !like(lhs, rhs),
        other => {
            return Err(StoreError::Unsupported(format!(
                "operator `{other}` is not supported in memory"
            )))
        }
    };
    Ok(result)
}

fn like(lhs: &Value, pattern: &Value) -> bool {
    match (lhs.as_str(), pattern.as_str()) {
        (Some(text), Some(pattern)) => {
            let text: Vec<char> = text.chars().collect();
            let pattern: Vec<char> = pattern.chars().collect();
            wildcard_match(&text, &pattern)
        }
        _ => false,
    }
}

fn wildcard_match(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|skip| wildcard_match(&text[skip..], rest)),
        Some(('_', rest)) => !text.is_empty() && wildcard_match(&text[1..], rest),
        Some((c, rest)) => text.first() == Some(c) && wildcard_match(&text[1..], rest),
    }
}

fn compare_values(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::String(b)) => a.as_f64()?.partial_cmp(&b.parse::<f64>().ok()?),
        (Value::String(a), Value::Number(b)) => a.parse::<f64>().ok()?.partial_cmp(&b.as_f64()?),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

fn loosely_equal(lhs: &Value, rhs: &Value) -> bool {
    compare_values(lhs, rhs) == Some(Ordering::Equal)
}

fn compare_for_sort(lhs: Option<&Value>, rhs: Option<&Value>) -> Ordering {
    let lhs = lhs.filter(|v| !v.is_null());
    let rhs = rhs.filter(|v| !v.is_null());
    match (lhs, rhs) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

fn compute_aggregate(rows: &[JoinedRow], function: AggregateFunction, column: &str) -> Value {
    if function == AggregateFunction::Count && column == "*" {
        return json!(rows.len());
    }

    let values: Vec<&Value> = rows
        .iter()
        .filter_map(|row| row.resolve(column))
        .filter(|value| !value.is_null())
        .collect();

    match function {
        AggregateFunction::Count => json!(values.len()),
        AggregateFunction::Min | AggregateFunction::Max => {
            let wanted = if function == AggregateFunction::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            values
                .into_iter()
                .reduce(|best, candidate| {
                    if compare_values(candidate, best) == Some(wanted) {
                        candidate
                    } else {
                        best
                    }
                })
                .cloned()
                .unwrap_or(Value::Null)
        }
        AggregateFunction::Sum | AggregateFunction::Avg => {
            let numbers: Vec<&serde_json::Number> =
                values.iter().filter_map(|value| value.as_number()).collect();
            if numbers.is_empty() {
                return Value::Null;
            }
            if function == AggregateFunction::Sum && numbers.iter().all(|n| n.is_i64()) {
                return json!(numbers.iter().filter_map(|n| n.as_i64()).sum::<i64>());
            }
            let total: f64 = numbers.iter().filter_map(|n| n.as_f64()).sum();
            if function == AggregateFunction::Sum {
                json!(total)
            } else {
                json!(total / numbers.len() as f64)
            }
        }
    }
}
