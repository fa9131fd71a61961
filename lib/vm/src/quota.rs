//! Resource quotas: element-count accounting shared between tables.

use std::sync::atomic::{AtomicU64, Ordering};

/// A counter charging allocations against a fixed budget.
#[derive(Debug)]
struct ResourceCounter {
    max: u64,
    used: AtomicU64,
}

impl ResourceCounter {
    fn new(max: u64) -> Self {
        Self {
            max,
            used: AtomicU64::new(0),
        }
    }

    fn allocate(&self, amount: u64) -> bool {
        let mut used = self.used.load(Ordering::Relaxed);
        loop {
            let new_used = match used.checked_add(amount) {
                Some(new_used) if new_used <= self.max => new_used,
                _ => return false,
            };
            match self.used.compare_exchange_weak(
                used,
                new_used,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(current) => used = current,
            }
        }
    }

    fn free(&self, amount: u64) {
        let previous = self.used.fetch_sub(amount, Ordering::Relaxed);
        debug_assert!(previous >= amount, "quota underflow");
    }
}

/// A resource quota shared (via `Arc`) by any number of tables, charged for
/// every element allocated and refunded on shrink-on-failure and on table
/// destruction.
#[derive(Debug)]
pub struct ResourceQuota {
    table_elems: ResourceCounter,
}

impl ResourceQuota {
    /// Create a quota permitting at most `max_table_elems` table elements in
    /// total across all tables sharing it.
    pub fn new(max_table_elems: u64) -> Self {
        Self {
            table_elems: ResourceCounter::new(max_table_elems),
        }
    }

    /// Try to charge `amount` table elements against the quota.
    pub fn allocate_table_elems(&self, amount: u64) -> bool {
        self.table_elems.allocate(amount)
    }

    /// Refund `amount` table elements to the quota.
    pub fn free_table_elems(&self, amount: u64) {
        self.table_elems.free(amount)
    }

    /// The number of table elements currently charged.
    pub fn table_elems_used(&self) -> u64 {
        self.table_elems.used.load(Ordering::Relaxed)
    }
}
