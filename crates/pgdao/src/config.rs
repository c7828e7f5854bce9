//! Store and connection-pool configuration.

use crate::error::{DaoError, DaoResult};
use serde::Deserialize;

/// Default textual format for date literals in conditions (`05-Jan-24`).
pub const DEFAULT_DATE_FORMAT: &str = "%d-%b-%y";

/// Behavior knobs for a [`RecordStore`](crate::RecordStore) and its query builder.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Reject condition/sort fields that are not mapped attributes of the target.
    ///
    /// When disabled, fields are still syntax-checked and a warning is logged.
    pub strict_fields: bool,
    /// `chrono` format used to parse text values bound to date/time columns.
    pub date_format: String,
    /// Accept comma-separated multi-type targets (`"Order,Customer"`).
    pub legacy_joins: bool,
    /// Upper bound applied to requested page sizes.
    pub max_page_size: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            strict_fields: true,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            legacy_joins: true,
            max_page_size: None,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle field-name validation against entity metadata.
    pub fn strict_fields(mut self, strict: bool) -> Self {
        self.strict_fields = strict;
        self
    }

    /// Set the date literal format.
    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    /// Toggle support for comma-separated multi-type targets.
    pub fn legacy_joins(mut self, enabled: bool) -> Self {
        self.legacy_joins = enabled;
        self
    }

    /// Clamp page sizes to `max`.
    pub fn max_page_size(mut self, max: u64) -> Self {
        self.max_page_size = Some(max);
        self
    }
}

/// Connection pool settings for [`PgEngine`](crate::PgEngine).
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub database_url: String,
    #[serde(default = "default_pool_size")]
    pub max_size: usize,
}

fn default_pool_size() -> usize {
    16
}

impl PoolConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_size: default_pool_size(),
        }
    }

    /// Set the maximum pool size.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Read `DATABASE_URL` and optionally `PGDAO_POOL_SIZE` from the environment.
    pub fn from_env() -> DaoResult<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| DaoError::infrastructure("DATABASE_URL is not set"))?;
        let mut config = Self::new(url);
        if let Ok(size) = std::env::var("PGDAO_POOL_SIZE") {
            config.max_size = size.parse().map_err(|_| {
                DaoError::infrastructure(format!("PGDAO_POOL_SIZE is not a number: {size}"))
            })?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert!(config.strict_fields);
        assert!(config.legacy_joins);
        assert_eq!(config.date_format, "%d-%b-%y");
        assert_eq!(config.max_page_size, None);
    }

    #[test]
    fn partial_deserialize_keeps_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{ "strict_fields": false, "max_page_size": 50 }"#).unwrap();
        assert!(!config.strict_fields);
        assert_eq!(config.max_page_size, Some(50));
        assert_eq!(config.date_format, DEFAULT_DATE_FORMAT);

        let pool: PoolConfig =
            serde_json::from_str(r#"{ "database_url": "postgres://localhost/db" }"#).unwrap();
        assert_eq!(pool.max_size, 16);
    }
}
