// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-frame callback registry.
//!
//! Entries run in registration order. An entry that returns
//! [`CallbackAction::Remove`] is removed by swapping the last entry into its
//! slot; the swapped-in entry runs next, so nothing is skipped or invoked
//! twice, but the order of the survivors changes.

use rustc_hash::FxHashMap;

/// Identity of a registration: a callback name plus opaque user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackKey {
    /// Stable name of the callback.
    pub callback: &'static str,
    /// Caller-chosen discriminator.
    pub user_data: u64,
}

impl CallbackKey {
    /// Builds a key.
    pub const fn new(callback: &'static str, user_data: u64) -> Self {
        Self {
            callback,
            user_data,
        }
    }
}

/// What a callback wants after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Run again next frame.
    Keep,
    /// Unregister.
    Remove,
}

/// Frame timing handed to every callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Frames completed before this one.
    pub frame_number: u64,
    /// Application time of this frame.
    pub frame_time: f64,
    /// Time since the previous frame.
    pub frame_delta: f64,
    /// Median of the recent frame deltas.
    pub median_frame_time: f64,
}

/// Boxed frame callback.
pub type FrameCallback = Box<dyn FnMut(&FrameInfo) -> CallbackAction + Send>;

struct Entry {
    key: CallbackKey,
    callback: FrameCallback,
}

/// Ordered, de-duplicated set of frame callbacks.
#[derive(Default)]
pub struct FrameCallbacks {
    entries: Vec<Entry>,
    index: FxHashMap<CallbackKey, usize>,
}

impl std::fmt::Debug for FrameCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.key))
            .finish()
    }
}

impl FrameCallbacks {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `key`. Returns `false` (and drops
    /// `callback`) when the key is already registered.
    pub fn add(&mut self, key: CallbackKey, callback: FrameCallback) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(Entry { key, callback });
        true
    }

    /// Unregisters `key`; `false` if it was not registered.
    pub fn remove(&mut self, key: &CallbackKey) -> bool {
        match self.index.get(key).copied() {
            Some(slot) => {
                self.remove_at(slot);
                true
            }
            None => false,
        }
    }

    /// True if `key` is registered.
    pub fn contains(&self, key: &CallbackKey) -> bool {
        self.index.contains_key(key)
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in current iteration order.
    pub fn keys(&self) -> impl Iterator<Item = CallbackKey> + '_ {
        self.entries.iter().map(|e| e.key)
    }

    /// Invokes every callback once. Returns how many asked to be removed.
    pub fn run_all(&mut self, info: &FrameInfo) -> usize {
        let mut removed = 0;
        let mut slot = 0;
        while slot < self.entries.len() {
            if (self.entries[slot].callback)(info) == CallbackAction::Remove {
                // The swapped-in entry has not run yet; stay on this slot.
                self.remove_at(slot);
                removed += 1;
            } else {
                slot += 1;
            }
        }
        removed
    }

    fn remove_at(&mut self, slot: usize) {
        let entry = self.entries.swap_remove(slot);
        self.index.remove(&entry.key);
        if let Some(moved) = self.entries.get(slot) {
            self.index.insert(moved.key, slot);
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const INFO: FrameInfo = FrameInfo {
        frame_number: 0,
        frame_time: 0.0,
        frame_delta: 0.0,
        median_frame_time: 1.0,
    };

    fn recorder(
        log: &Arc<Mutex<Vec<u64>>>,
        id: u64,
        action: CallbackAction,
    ) -> FrameCallback {
        let log = Arc::clone(log);
        Box::new(move |_| {
            log.lock().unwrap().push(id);
            action
        })
    }

    #[test]
    fn duplicate_keys_are_ignored() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = FrameCallbacks::new();
        let key = CallbackKey::new("tick", 1);
        assert!(reg.add(key, recorder(&log, 1, CallbackAction::Keep)));
        assert!(!reg.add(key, recorder(&log, 2, CallbackAction::Keep)));
        assert!(reg.add(CallbackKey::new("tick", 2), recorder(&log, 3, CallbackAction::Keep)));
        assert_eq!(reg.len(), 2);
        reg.run_all(&INFO);
        assert_eq!(*log.lock().unwrap(), vec![1, 3]);
    }

    #[test]
    fn removal_swaps_last_without_skipping() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = FrameCallbacks::new();
        reg.add(CallbackKey::new("a", 0), recorder(&log, 0, CallbackAction::Keep));
        reg.add(CallbackKey::new("b", 0), recorder(&log, 1, CallbackAction::Remove));
        reg.add(CallbackKey::new("c", 0), recorder(&log, 2, CallbackAction::Keep));
        reg.add(CallbackKey::new("d", 0), recorder(&log, 3, CallbackAction::Keep));

        assert_eq!(reg.run_all(&INFO), 1);
        // Every entry ran exactly once: 3 was swapped into slot 1 and ran there.
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 3, 2]);
        let order: Vec<_> = reg.keys().map(|k| k.callback).collect();
        assert_eq!(order, ["a", "d", "c"]);
    }

    #[test]
    fn consecutive_removals_at_the_tail() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = FrameCallbacks::new();
        for id in 0..4 {
            reg.add(
                CallbackKey::new("r", id),
                recorder(&log, id, CallbackAction::Remove),
            );
        }
        assert_eq!(reg.run_all(&INFO), 4);
        let mut seen = log.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert!(reg.is_empty());
    }

    #[test]
    fn explicit_remove_keeps_index_consistent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = FrameCallbacks::new();
        let a = CallbackKey::new("a", 0);
        let b = CallbackKey::new("b", 0);
        let c = CallbackKey::new("c", 0);
        reg.add(a, recorder(&log, 0, CallbackAction::Keep));
        reg.add(b, recorder(&log, 1, CallbackAction::Keep));
        reg.add(c, recorder(&log, 2, CallbackAction::Keep));
        assert!(reg.remove(&a));
        assert!(!reg.remove(&a));
        assert!(reg.remove(&c));
        assert!(reg.contains(&b));
        assert_eq!(reg.len(), 1);
    }
}
