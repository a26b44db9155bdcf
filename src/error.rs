//! Error types for the Tasker ORM layer.
//!

use thiserror::Error;

/// Errors raised by the query, scope, eager-load and dispatch layers.
///
/// Relation and dispatch errors are programmer errors (a typo'd relation
/// name, a misconfigured scope) and surface synchronously at the point of
/// execution. Row-store failures are wrapped unchanged in [`OrmError::Store`]
/// so the caller's own retry or transaction policy applies.
#[derive(Debug, Error)]
pub enum OrmError {
    #[error("Call to undefined relationship [{relation}] on model [{model}]")]
    RelationNotFound { model: String, relation: String },
    #[error("Model type [{0}] is not registered with this context")]
    ModelNotRegistered(String),
    #[error("Call to undefined method {query_type}::{method}()")]
    BadMethodCall { query_type: String, method: String },
    #[error("Invalid argument for {method}: {reason}")]
    InvalidArgument { method: String, reason: String },
    #[error("Attempted to lazy load [{relation}] on model [{model}] but lazy loading is disabled")]
    LazyLoadingViolation { model: String, relation: String },
    #[error("Hydration error: {0}")]
    Hydration(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrmError {
    pub fn relation_not_found(model: impl Into<String>, relation: impl Into<String>) -> Self {
        OrmError::RelationNotFound {
            model: model.into(),
            relation: relation.into(),
        }
    }

    pub fn invalid_argument(method: impl Into<String>, reason: impl Into<String>) -> Self {
        OrmError::InvalidArgument {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// True when the underlying row store reported a unique-key violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, OrmError::Store(StoreError::UniqueViolation { .. }))
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(error: serde_json::Error) -> Self {
        OrmError::Hydration(format!("JSON conversion error: {error}"))
    }
}

/// Errors reported by a [`RowStore`](crate::database::RowStore) implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Unique constraint violation on {table}: {detail}")]
    UniqueViolation { table: String, detail: String },
    #[error("Database error: {0}")]
    Database(String),
    #[error("Transaction error: {0}")]
    Transaction(String),
    #[error("Unsupported by this row store: {0}")]
    Unsupported(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::UniqueViolation {
                    table: db_err.table().unwrap_or("unknown").to_string(),
                    detail: db_err.message().to_string(),
                }
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

pub type OrmResult<T> = Result<T, OrmError>;
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_not_found_names_model_and_relation() {
        let error = OrmError::relation_not_found("User", "postz");
        assert_eq!(
            error.to_string(),
            "Call to undefined relationship [postz] on model [User]"
        );
    }

    #[test]
    fn store_errors_pass_through_transparently() {
        let error: OrmError = StoreError::Database("connection reset".to_string()).into();
        assert_eq!(error.to_string(), "Database error: connection reset");
        assert!(!error.is_unique_violation());

        let violation: OrmError = StoreError::UniqueViolation {
            table: "users".to_string(),
            detail: "email".to_string(),
        }
        .into();
        assert!(violation.is_unique_violation());
    }
}
