//! Settings Storage Abstraction
//!
//! Key-value preference storage owned by the host. The core persists its
//! exclusion memory here as a serialized document between sync cycles.

use async_trait::async_trait;

use crate::error::Result;

/// Settings storage trait
///
/// Abstracts key-value storage for preferences:
/// - Desktop: JSON/TOML file or an embedded database
/// - Media-center plugins: the host's settings XML
/// - Mobile: UserDefaults / DataStore
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn remember_interval(store: &dyn SettingsStore) -> Result<()> {
///     store.set_i64("sync.interval_secs", 3600).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }
}
