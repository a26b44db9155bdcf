use std::fmt;

/// Supported join flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// A JOIN on a single column comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: String,
    pub first: String,
    pub operator: String,
    pub second: String,
}

impl Join {
    pub fn inner(table: &str, first: &str, operator: &str, second: &str) -> Self {
        Self::new(JoinType::Inner, table, first, operator, second)
    }

    pub fn left(table: &str, first: &str, operator: &str, second: &str) -> Self {
        Self::new(JoinType::Left, table, first, operator, second)
    }

    fn new(join_type: JoinType, table: &str, first: &str, operator: &str, second: &str) -> Self {
        Self {
            join_type,
            table: table.to_string(),
            first: first.to_string(),
            operator: operator.to_string(),
            second: second.to_string(),
        }
    }

    pub fn to_sql(&self) -> String {
        format!(
            "{} {} ON {} {} {}",
            self.join_type, self.table, self.first, self.operator, self.second
        )
    }
}
