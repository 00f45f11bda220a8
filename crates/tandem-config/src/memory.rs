// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory config store for tests and embedded nodes without a config dir.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::{ConfigError, ConfigStore};

/// Shared in-memory implementation of [`ConfigStore`].
///
/// Clones share the same map, so a test can hand one clone to a
/// [`crate::ConfigService`] and inspect the other.
#[derive(Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    data: HashMap<String, Vec<u8>>,
    save_count: usize,
    fail_on_load: bool,
}

impl MemoryConfigStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent load fail with an I/O error.
    pub fn set_fail_on_load(&self, fail: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.fail_on_load = fail;
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .save_count
    }

    /// Raw bytes stored under `key`, if any.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .data
            .get(key)
            .cloned()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.fail_on_load {
            return Err(ConfigError::Io(std::io::Error::other("simulated load failure")));
        }
        inner.data.get(key).cloned().ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.data.insert(key.to_owned(), data.to_vec());
        inner.save_count += 1;
        Ok(())
    }
}
