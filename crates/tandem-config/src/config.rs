// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config service and storage port for Tandem nodes.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Storage port for raw config blobs (keyed by logical name).
pub trait ConfigStore {
    /// Load a raw config blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config operations and startup validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("not found")]
    NotFound,
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// A setting is out of range or inconsistent with the others.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending setting.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// Master and slave were started with different input device sets.
    #[error("device count mismatch: master has {master}, this node has {local}")]
    DeviceCountMismatch {
        /// Devices on the master.
        master: u32,
        /// Devices on this node.
        local: u32,
    },
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::Invalid`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Thin service that serializes config values and delegates storage to a `ConfigStore`.
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Create a new service using the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Consume the service and return the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Load and deserialize a config value for `key`. Returns `Ok(None)` if missing.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.store.load_raw(key) {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(None);
                }
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize and persist a config value for `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }

    /// Loads `key`, or saves and returns `T::default()` when it is absent.
    ///
    /// Returns the value and whether defaults were written.
    pub fn load_or_init<T>(&self, key: &str) -> Result<(T, bool), ConfigError>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        if let Some(value) = self.load(key)? {
            return Ok((value, false));
        }
        let value = T::default();
        self.save(key, &value)?;
        Ok((value, true))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryConfigStore;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        volume: u8,
    }

    #[test]
    fn missing_key_loads_as_none() {
        let svc = ConfigService::new(MemoryConfigStore::new());
        assert_eq!(svc.load::<Prefs>("absent").unwrap(), None);
    }

    #[test]
    fn load_or_init_persists_defaults_once() {
        let store = MemoryConfigStore::new();
        let svc = ConfigService::new(store.clone());
        let (first, wrote) = svc.load_or_init::<Prefs>("prefs").unwrap();
        assert!(wrote);
        assert_eq!(first, Prefs::default());
        svc.save("prefs", &Prefs { volume: 9 }).unwrap();
        let (second, wrote) = svc.load_or_init::<Prefs>("prefs").unwrap();
        assert!(!wrote);
        assert_eq!(second.volume, 9);
        assert_eq!(store.save_count(), 2);
    }

    #[test]
    fn store_failures_propagate() {
        let store = MemoryConfigStore::new();
        store.set_fail_on_load(true);
        let svc = ConfigService::new(store);
        assert!(matches!(
            svc.load::<Prefs>("prefs"),
            Err(ConfigError::Io(_))
        ));
    }
}
