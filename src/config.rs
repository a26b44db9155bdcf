//! # ORM Configuration
//!
//! Runtime settings for a [`OrmContext`](crate::context::OrmContext), loaded from
//! defaults, an optional TOML file and `TASKER_ORM_*` environment variables.

use crate::error::{OrmError, OrmResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrmConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Reject lazy relation loads so N+1 patterns fail loudly.
    pub prevent_lazy_loading: bool,
    pub event_channel_capacity: usize,
    pub log_queries: bool,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            prevent_lazy_loading: false,
            event_channel_capacity: 1000,
            log_queries: true,
        }
    }
}

impl OrmConfig {
    pub fn from_env() -> OrmResult<Self> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = Some(db_url);
        }

        if let Ok(max_connections) = std::env::var("TASKER_ORM_MAX_CONNECTIONS") {
            config.max_connections = max_connections.parse().map_err(|e| {
                OrmError::Configuration(format!("Invalid max_connections: {e}"))
            })?;
        }

        if let Ok(prevent) = std::env::var("TASKER_ORM_PREVENT_LAZY_LOADING") {
            config.prevent_lazy_loading = prevent.parse().map_err(|e| {
                OrmError::Configuration(format!("Invalid prevent_lazy_loading: {e}"))
            })?;
        }

        if let Ok(capacity) = std::env::var("TASKER_ORM_EVENT_CHANNEL_CAPACITY") {
            config.event_channel_capacity = capacity.parse().map_err(|e| {
                OrmError::Configuration(format!("Invalid event_channel_capacity: {e}"))
            })?;
        }

        if let Ok(log_queries) = std::env::var("TASKER_ORM_LOG_QUERIES") {
            config.log_queries = log_queries.parse().map_err(|e| {
                OrmError::Configuration(format!("Invalid log_queries: {e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Layer defaults, an optional TOML file, then `TASKER_ORM_*` variables.
    pub fn load(path: Option<&Path>) -> OrmResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("TASKER_ORM").try_parsing(true))
            .build()
            .map_err(|e| OrmError::Configuration(e.to_string()))?;

        let config: OrmConfig = settings
            .try_deserialize()
            .map_err(|e| OrmError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OrmResult<()> {
        if self.max_connections == 0 {
            return Err(OrmError::Configuration(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(OrmError::Configuration(
                "event_channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = OrmConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_connections, 10);
        assert!(!config.prevent_lazy_loading);
    }

    #[test]
    fn load_reads_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "max_connections = 4\nprevent_lazy_loading = true").unwrap();

        let config = OrmConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.max_connections, 4);
        assert!(config.prevent_lazy_loading);
        assert_eq!(config.event_channel_capacity, 1000);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = OrmConfig {
            event_channel_capacity: 0,
            ..OrmConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(OrmError::Configuration(_))
        ));
    }
}
