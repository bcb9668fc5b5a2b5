//! Per order item serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = HashMap<i64, Arc<Mutex<()>>>;

/// One async mutex per order item id. Outbound steps and inbound handlers hold
/// it across the whole read-modify-write of the item's status and `rawtx`.
///
/// An entry lives only while someone holds or waits for it.
#[derive(Debug, Default)]
pub struct ItemLocks {
    locks: Arc<StdMutex<LockMap>>,
}

/// Held for the duration of one step on an order item.
#[derive(Debug)]
pub struct ItemGuard {
    order_item_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<StdMutex<LockMap>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, order_item_id: i64) -> ItemGuard {
        // Cloned under the map lock, so a releasing guard sees this waiter.
        let lock = lock_map(&self.locks)
            .entry(order_item_id)
            .or_default()
            .clone();

        ItemGuard {
            order_item_id,
            guard: Some(lock.lock_owned().await),
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        lock_map(&self.locks).len()
    }
}

impl Drop for ItemGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = lock_map(&self.locks);
        let idle = locks
            .get(&self.order_item_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.order_item_id);
        }
    }
}

// The map is only touched in short sections that cannot panic midway.
fn lock_map(locks: &StdMutex<LockMap>) -> MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
