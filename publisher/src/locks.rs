//! Per-key serialization of publish requests.
//!
//! Two publishes for the same key would otherwise both see "no row" and both
//! append. Holding a lock from the first read to the final write closes that
//! window inside one process; separate processes are not coordinated.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

type Slots = Mutex<HashMap<String, Slot>>;

#[derive(Default)]
struct Slot {
    lock: Arc<tokio::sync::Mutex<()>>,
    /// Guards and pending waiters for the key.
    users: usize,
}

#[derive(Clone, Default)]
pub struct KeyLocks {
    slots: Arc<Slots>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder of `key` remains and returns a guard. The
    /// slot for `key` is dropped once the last guard or waiter is gone.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let lock = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key.to_string()).or_default();
            slot.users += 1;
            slot.lock.clone()
        };

        // Built before waiting so a cancelled waiter still gives up its slot.
        let mut guard = KeyGuard {
            key: key.to_string(),
            slots: self.slots.clone(),
            guard: None,
        };
        guard.guard = Some(lock.lock_owned().await);
        guard
    }

    /// Number of keys currently locked or waited on.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct KeyGuard {
    key: String,
    slots: Arc<Slots>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(&self.key);
            }
        }
    }
}
