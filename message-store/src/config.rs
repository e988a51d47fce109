//! Store config: database location, pool size and write-lock sharding. Loaded from env.

use anyhow::Result;
use std::env;

/// Defaults used when the corresponding variable is unset.
pub const DEFAULT_DATABASE_URL: &str = "messages.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;
pub const DEFAULT_LOCK_SHARDS: usize = 64;

/// Message store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// MESSAGE_STORE_URL: SQLite file path, `sqlite://` URL, or `sqlite::memory:`
    pub database_url: String,
    /// MESSAGE_STORE_MAX_CONNECTIONS; ignored for in-memory databases (always 1)
    pub max_connections: u32,
    /// MESSAGE_STORE_LOCK_SHARDS: number of per-uuid write lock shards
    pub lock_shards: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            lock_shards: DEFAULT_LOCK_SHARDS,
        }
    }
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    /// Private in-memory database; contents vanish when the store is closed.
    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
    }

    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("MESSAGE_STORE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let max_connections = match env::var("MESSAGE_STORE_MAX_CONNECTIONS") {
            Ok(s) => s.parse().map_err(|e| {
                anyhow::anyhow!("MESSAGE_STORE_MAX_CONNECTIONS is not a number: {} ({})", s, e)
            })?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };
        let lock_shards = match env::var("MESSAGE_STORE_LOCK_SHARDS") {
            Ok(s) => s.parse().map_err(|e| {
                anyhow::anyhow!("MESSAGE_STORE_LOCK_SHARDS is not a number: {} ({})", s, e)
            })?,
            Err(_) => DEFAULT_LOCK_SHARDS,
        };

        Ok(Self {
            database_url,
            max_connections,
            lock_shards,
        })
    }

    /// Validate config. Call after load to fail fast before the store is opened.
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("MESSAGE_STORE_URL must not be empty");
        }
        if self.max_connections == 0 {
            anyhow::bail!("MESSAGE_STORE_MAX_CONNECTIONS must be at least 1");
        }
        if self.lock_shards == 0 {
            anyhow::bail!("MESSAGE_STORE_LOCK_SHARDS must be at least 1");
        }
        Ok(())
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        env::remove_var("MESSAGE_STORE_URL");
        env::remove_var("MESSAGE_STORE_MAX_CONNECTIONS");
        env::remove_var("MESSAGE_STORE_LOCK_SHARDS");
    }

    #[test]
    #[serial]
    fn test_load_config_with_defaults() {
        clear_env();

        let config = StoreConfig::from_env().unwrap();

        assert_eq!(config.database_url, "messages.db");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.lock_shards, 64);
        assert!(config.validate().is_ok());
        assert!(!config.is_in_memory());
    }

    #[test]
    #[serial]
    fn test_load_config_with_custom_values() {
        clear_env();
        env::set_var("MESSAGE_STORE_URL", "sqlite::memory:");
        env::set_var("MESSAGE_STORE_MAX_CONNECTIONS", "8");
        env::set_var("MESSAGE_STORE_LOCK_SHARDS", "16");

        let config = StoreConfig::from_env().unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.lock_shards, 16);
        assert!(config.is_in_memory());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_config_rejects_non_numeric() {
        clear_env();
        env::set_var("MESSAGE_STORE_MAX_CONNECTIONS", "many");

        assert!(StoreConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = StoreConfig::in_memory();
        config.lock_shards = 0;
        assert!(config.validate().is_err());

        let mut config = StoreConfig::in_memory();
        config.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
