//! # Structured Logging Module
//!
//! Environment-aware structured logging for query execution, scope
//! application and eager loading.

use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = std::env::var("TASKER_ORM_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // A global subscriber may already be installed by the host application
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(environment = %environment, json = json, "Structured logging initialized");
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("TASKER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for an executed statement
pub fn log_query_operation(
    model: &str,
    table: &str,
    sql: &str,
    binding_count: usize,
    row_count: usize,
    duration: Duration,
) {
    tracing::debug!(
        model = %model,
        table = %table,
        sql = %sql,
        binding_count = binding_count,
        row_count = row_count,
        duration_ms = duration.as_millis() as u64,
        "QUERY_OPERATION"
    );
}

/// Log structured data for an eager-loaded relation level
pub fn log_eager_load_operation(
    model: &str,
    relation: &str,
    owner_count: usize,
    related_count: usize,
    nested: &[String],
) {
    tracing::debug!(
        model = %model,
        relation = %relation,
        owner_count = owner_count,
        related_count = related_count,
        nested = ?nested,
        "EAGER_LOAD_OPERATION"
    );
}
