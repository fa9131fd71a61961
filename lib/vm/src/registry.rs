//! The process-wide list of live tables, used to resolve a faulting address
//! back to its owning table.
//!
//! When generated code touches a table's guard page or an uncommitted part
//! of its reservation, the host signal handler asks this registry which
//! table the faulting address belongs to and raises a typed out-of-bounds
//! trap on the guest stack. The registry is consulted only on that failure
//! path, so a linear scan under one mutex is sufficient.

use crate::table::{Table, ELEMENT_SIZE};
use std::sync::{Arc, Mutex, OnceLock, Weak};

struct Registration {
    start: usize,
    len: usize,
    table: Weak<Table>,
}

fn tables() -> &'static Mutex<Vec<Registration>> {
    static TABLES: OnceLock<Mutex<Vec<Registration>>> = OnceLock::new();
    TABLES.get_or_init(|| Mutex::new(Vec::new()))
}

/// Add a table to the registry. Called once per table, at creation.
pub(crate) fn register(table: &Arc<Table>) {
    let (start, len) = table.reserved_range();
    tables().lock().unwrap().push(Registration {
        start,
        len,
        table: Arc::downgrade(table),
    });
}

/// Remove the table whose reservation starts at `start`. Called once per
/// table, at destruction.
pub(crate) fn unregister(start: usize) {
    tables().lock().unwrap().retain(|entry| entry.start != start);
}

/// Locate the live table whose reserved address range (guard page included)
/// contains `address`, along with the element index the address falls in.
///
/// Returns `None` for addresses owned by no table and for tables that are
/// concurrently being destroyed.
pub fn is_address_owned_by_table(address: usize) -> Option<(Arc<Table>, u64)> {
    let tables = tables().lock().unwrap();
    for entry in tables.iter() {
        if address >= entry.start && address < entry.start + entry.len {
            if let Some(table) = entry.table.upgrade() {
                let element_index = ((address - entry.start) / ELEMENT_SIZE) as u64;
                return Some((table, element_index));
            }
        }
    }
    None
}
