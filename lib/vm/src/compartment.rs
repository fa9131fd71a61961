//! Compartments: the isolation boundary that owns tables and publishes
//! their base pointers for generated code.

use crate::funcref::Reference;
use crate::quota::ResourceQuota;
use crate::table::{Table, TableError, UNASSIGNED_ID};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Arc, Mutex};
use weft_types::TableType;

/// The number of table slots in a compartment's runtime data. Generated
/// code indexes the published base pointers by compartment-local table id,
/// so the array has a fixed layout.
pub const MAX_TABLES: usize = 128;

/// The per-compartment data generated code reads directly: one published
/// element-store base pointer per table id.
#[derive(Debug)]
pub struct CompartmentRuntimeData {
    table_bases: Box<[AtomicPtr<u8>]>,
}

impl CompartmentRuntimeData {
    fn new() -> Self {
        Self {
            table_bases: (0..MAX_TABLES).map(|_| AtomicPtr::new(ptr::null_mut())).collect(),
        }
    }

    /// The published base pointer for table `id`, or null if the slot is
    /// empty.
    pub fn table_base(&self, id: usize) -> *mut u8 {
        self.table_bases[id].load(Ordering::Acquire)
    }

    fn publish(&self, id: usize, base: *mut u8) {
        self.table_bases[id].store(base, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct CompartmentTables {
    tables: Vec<Option<Arc<Table>>>,
}

impl CompartmentTables {
    /// Claim the lowest free id.
    fn add(&mut self, table: Arc<Table>) -> Option<usize> {
        for (id, slot) in self.tables.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(table);
                return Some(id);
            }
        }
        if self.tables.len() < MAX_TABLES {
            self.tables.push(Some(table));
            return Some(self.tables.len() - 1);
        }
        None
    }

    /// Claim a specific id; fails if the slot is occupied.
    fn insert_or_fail(&mut self, id: usize, table: Arc<Table>) -> bool {
        if id >= MAX_TABLES {
            return false;
        }
        if self.tables.len() <= id {
            self.tables.resize(id + 1, None);
        }
        if self.tables[id].is_some() {
            return false;
        }
        self.tables[id] = Some(table);
        true
    }

    fn remove(&mut self, id: usize) -> Option<Arc<Table>> {
        self.tables.get_mut(id).and_then(Option::take)
    }

    fn get(&self, id: usize) -> Option<Arc<Table>> {
        self.tables.get(id).and_then(Clone::clone)
    }
}

/// An isolation boundary holding a set of tables that may reference each
/// other. Each table in a compartment has a compartment-local id, and its
/// element-store base pointer is published in the compartment's runtime
/// data under that id.
#[derive(Debug)]
pub struct Compartment {
    inner: Mutex<CompartmentTables>,
    runtime_data: CompartmentRuntimeData,
}

impl Compartment {
    /// Create an empty compartment.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(CompartmentTables::default()),
            runtime_data: CompartmentRuntimeData::new(),
        })
    }

    /// The runtime data generated code executes against.
    pub fn runtime_data(&self) -> &CompartmentRuntimeData {
        &self.runtime_data
    }

    /// Create a table owned by this compartment: reserve and register it,
    /// grow it to its type's minimum size filled with `init_value`, assign
    /// it a compartment-local id and publish its base pointer.
    ///
    /// Any sub-step failure undoes the preceding ones and surfaces as the
    /// returned error.
    pub fn create_table(
        self: &Arc<Self>,
        ty: TableType,
        init_value: Option<Reference>,
        debug_name: &str,
        quota: Option<Arc<ResourceQuota>>,
    ) -> Result<Arc<Table>, TableError> {
        let table = Table::new(ty, init_value, debug_name, quota)?;
        self.publish_table(table, None)
    }

    /// Create an independent copy of `table` in this compartment, occupying
    /// the same id slot the original occupies in its own compartment.
    ///
    /// See [`Table::clone_table`] for the snapshot semantics.
    pub fn clone_table(
        self: &Arc<Self>,
        table: &Arc<Table>,
    ) -> Result<Arc<Table>, TableError> {
        let new_table = Table::clone_table(table)?;
        self.publish_table(new_table, table.id())
    }

    fn publish_table(
        self: &Arc<Self>,
        table: Arc<Table>,
        id: Option<usize>,
    ) -> Result<Arc<Table>, TableError> {
        let mut inner = self.inner.lock().unwrap();
        let id = match id {
            Some(id) => {
                if !inner.insert_or_fail(id, table.clone()) {
                    return Err(TableError::CompartmentFull);
                }
                id
            }
            None => inner.add(table.clone()).ok_or(TableError::CompartmentFull)?,
        };
        table.set_id(id);
        self.runtime_data.publish(id, table.base_ptr().as_ptr());
        Ok(table)
    }

    /// Look up a table by compartment-local id.
    pub fn table(&self, id: usize) -> Option<Arc<Table>> {
        self.inner.lock().unwrap().get(id)
    }

    /// Remove the table with the given id from the compartment, clearing its
    /// published base pointer. Returns the removed table, which is destroyed
    /// once the last reference to it is dropped.
    pub fn remove_table(&self, id: usize) -> Option<Arc<Table>> {
        let mut inner = self.inner.lock().unwrap();
        let table = inner.remove(id)?;
        self.runtime_data.publish(id, ptr::null_mut());
        table.set_id(UNASSIGNED_ID);
        Some(table)
    }
}
