//! Runtime tables: the mutable, typed arrays of references that
//! `call_indirect` and the `table.*` instructions operate on.
//!
//! Each table owns one oversized reservation of address space, sized so that
//! generated code can index it with any 32-bit offset and no bounds check on
//! the hot path, plus one trailing guard page. Only a prefix of the
//! reservation is committed; committed pages past the current size hold the
//! zero word, which decodes to the out-of-bounds sentinel. Individual slots
//! are mutated with per-slot atomics and never under a lock; the resizing
//! mutex is taken only by operations that change the element count or the
//! committed prefix.

use crate::mmap::{round_up_to_page_size, Mmap};
use crate::quota::ResourceQuota;
use crate::registry;
use crate::sentinel::{uninitialized_element, BiasedRef};
use crate::funcref::Reference;
use crate::trap::Trap;
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::trace;
use weft_types::{TableStyle, TableType, Type, RESERVED_TABLE_ELEMENTS};

/// One element slot: a single atomic word holding a biased reference.
#[repr(transparent)]
struct Element(AtomicUsize);

/// Size in bytes of one element slot.
pub(crate) const ELEMENT_SIZE: usize = mem::size_of::<Element>();

const NUM_GUARD_PAGES: usize = 1;

/// The id a table carries before it is published in a compartment.
pub(crate) const UNASSIGNED_ID: usize = usize::MAX;

/// Error type describing things that can go wrong when operating on tables
/// from the host API.
#[derive(Error, Debug)]
pub enum TableError {
    /// The table description itself is unsatisfiable.
    #[error("the minimum ({minimum} elements) exceeds the maximum ({maximum} elements)")]
    InvalidTableType {
        /// Requested minimum size.
        minimum: u32,
        /// Declared maximum size.
        maximum: u32,
    },

    /// The initial element's type cannot be stored in the table.
    #[error("an element of type {found} cannot be stored in a table of type {expected}")]
    ElementTypeMismatch {
        /// The table's element type.
        expected: Type,
        /// The type of the offending element.
        found: Type,
    },

    /// The grow would exceed the declared maximum or the implementation
    /// limit.
    #[error("could not grow table of {current} elements by {attempted_delta} more")]
    CouldNotGrow {
        /// The current size, in elements.
        current: u32,
        /// The rejected delta, in elements.
        attempted_delta: u32,
    },

    /// The resource quota denied the allocation.
    #[error("the resource quota denied an allocation of {attempted_delta} table elements")]
    QuotaExceeded {
        /// The denied delta, in elements.
        attempted_delta: u32,
    },

    /// A virtual memory operation failed.
    #[error("a virtual memory operation failed: {0}")]
    Region(String),

    /// The compartment has no free table slot, or the requested slot is
    /// already occupied.
    #[error("no usable table slot in the compartment")]
    CompartmentFull,
}

/// State mutated only under the resizing mutex.
#[derive(Debug)]
struct GrowState {
    alloc: Mmap,
}

/// A runtime table.
///
/// Created through [`Compartment::create_table`](crate::Compartment::create_table)
/// or [`Table::new`], shared via `Arc`, and safe to read and write from any
/// number of threads concurrently.
#[derive(Debug)]
pub struct Table {
    ty: TableType,
    style: TableStyle,
    debug_name: Box<str>,
    // Cached base of the reservation; never moves after creation.
    base: NonNull<Element>,
    num_reserved_elements: usize,
    // Elements covered by committed pages. Paired with `num_elements`:
    // both are release-stored under the resizing mutex, committed first.
    num_committed_elements: AtomicUsize,
    num_elements: AtomicUsize,
    resizing: Mutex<GrowState>,
    quota: Option<Arc<ResourceQuota>>,
    // Compartment-local id; `UNASSIGNED_ID` until published.
    id: AtomicUsize,
}

// The base pointer is only dereferenced through per-slot atomics.
unsafe impl Send for Table {}
unsafe impl Sync for Table {}

impl Table {
    /// Create a table and grow it to its type's minimum size.
    ///
    /// If `init_value` is null every initial slot reads as null; otherwise
    /// every initial slot holds `init_value`, whose type must be storable in
    /// the table. The table is entered into the global registry but belongs
    /// to no compartment yet.
    pub fn new(
        ty: TableType,
        init_value: Option<Reference>,
        debug_name: &str,
        quota: Option<Arc<ResourceQuota>>,
    ) -> Result<Arc<Self>, TableError> {
        if let Some(maximum) = ty.maximum {
            if maximum < ty.minimum {
                return Err(TableError::InvalidTableType {
                    minimum: ty.minimum,
                    maximum,
                });
            }
        }

        // All references are function references; reject tables that cannot
        // hold them. The null case carries no type of its own.
        let fill = match init_value {
            Some(value) => {
                if !Type::FuncRef.is_subtype_of(ty.ty) {
                    return Err(TableError::ElementTypeMismatch {
                        expected: ty.ty,
                        found: Type::FuncRef,
                    });
                }
                value
            }
            None => uninitialized_element(),
        };

        let table = Self::new_reserved(ty, debug_name, quota)?;
        table.grow_impl(ty.minimum, true, fill)?;
        Ok(table)
    }

    /// Reserve the address space for a table of `ty` and register it, with
    /// zero elements.
    fn new_reserved(
        ty: TableType,
        debug_name: &str,
        quota: Option<Arc<ResourceQuota>>,
    ) -> Result<Arc<Self>, TableError> {
        let page_size = region::page::size();

        // Reserve enough address space to access any 32-bit element index
        // without bounds checking (a smaller fixed range on 32-bit hosts),
        // plus the trailing guard page.
        let num_reserved_elements = usize::try_from(RESERVED_TABLE_ELEMENTS)
            .map_err(|_| TableError::Region("reservation exceeds the address space".to_string()))?;
        let reserved_bytes = num_reserved_elements
            .checked_mul(ELEMENT_SIZE)
            .ok_or_else(|| TableError::Region("reservation exceeds the address space".to_string()))?;
        let mapping_size = reserved_bytes + NUM_GUARD_PAGES * page_size;

        let alloc = Mmap::reserved(mapping_size).map_err(TableError::Region)?;
        let base = NonNull::new(alloc.as_ptr() as *mut Element)
            .ok_or_else(|| TableError::Region("reservation has a null base".to_string()))?;

        let table = Arc::new(Self {
            ty,
            style: TableStyle::for_element(ty.ty),
            debug_name: debug_name.into(),
            base,
            num_reserved_elements,
            num_committed_elements: AtomicUsize::new(0),
            num_elements: AtomicUsize::new(0),
            resizing: Mutex::new(GrowState { alloc }),
            quota,
            id: AtomicUsize::new(UNASSIGNED_ID),
        });

        registry::register(&table);
        trace!(table = %table.debug_name, reserved_elements = num_reserved_elements, "created table");
        Ok(table)
    }

    /// Create an independent table with the same type, size and contents as
    /// `source`, in no compartment.
    ///
    /// The snapshot is consistent under the source's resizing mutex: growers
    /// are blocked while it is taken, but slot mutators are not, so a store
    /// racing with the clone may be present in some copied slots and absent
    /// from others. Single slots are never torn.
    pub fn clone_table(source: &Self) -> Result<Arc<Self>, TableError> {
        let _resizing = source.resizing.lock().unwrap();
        let num_elements = source.num_elements.load(Ordering::Acquire);

        let new = Self::new_reserved(source.ty, &source.debug_name, source.quota.clone())?;

        // Grow to the source's size without initializing the new slots; they
        // are all about to be overwritten.
        let delta = num_elements as u32;
        new.grow_impl(delta, false, uninitialized_element())?;

        for index in 0..num_elements {
            let word = unsafe { (*source.base.as_ptr().add(index)).0.load(Ordering::Acquire) };
            unsafe { (*new.base.as_ptr().add(index)).0.store(word, Ordering::Release) };
        }

        Ok(new)
    }

    /// The type the table was created with.
    pub fn ty(&self) -> &TableType {
        &self.ty
    }

    /// The implementation style of this table.
    pub fn style(&self) -> &TableStyle {
        &self.style
    }

    /// The table's diagnostic name.
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    /// The compartment-local id, if the table has been published in a
    /// compartment.
    pub fn id(&self) -> Option<usize> {
        match self.id.load(Ordering::Acquire) {
            UNASSIGNED_ID => None,
            id => Some(id),
        }
    }

    pub(crate) fn set_id(&self, id: usize) {
        self.id.store(id, Ordering::Release);
    }

    /// Base address of the element store, as published to generated code.
    pub fn base_ptr(&self) -> NonNull<u8> {
        self.base.cast()
    }

    pub(crate) fn reserved_range(&self) -> (usize, usize) {
        let start = self.base.as_ptr() as usize;
        let page_size = region::page::size();
        // Include the guard page, so faults just past the element store
        // still resolve to this table.
        let len = self.num_reserved_elements * ELEMENT_SIZE + NUM_GUARD_PAGES * page_size;
        (start, len)
    }

    /// The current size of the table, in elements.
    pub fn size(&self) -> u32 {
        self.num_elements.load(Ordering::Acquire) as u32
    }

    /// Grow the table by `delta` elements, filling the new slots with
    /// `init_value` (with null stored as the uninitialized element). Returns
    /// the previous size.
    ///
    /// Fails without any side effects - size, contents and quota consumption
    /// are unchanged - if the new size would exceed the declared maximum or
    /// the implementation limit, if the quota denies the allocation, or if
    /// committing pages fails.
    pub fn grow(&self, delta: u32, init_value: Option<Reference>) -> Result<u32, TableError> {
        let fill = init_value.unwrap_or_else(uninitialized_element);
        self.grow_impl(delta, true, fill)
    }

    fn grow_impl(&self, delta: u32, initialize: bool, fill: Reference) -> Result<u32, TableError> {
        if delta == 0 {
            return Ok(self.size());
        }

        // Check the table element quota.
        if let Some(quota) = &self.quota {
            if !quota.allocate_table_elems(u64::from(delta)) {
                return Err(TableError::QuotaExceeded {
                    attempted_delta: delta,
                });
            }
        }

        let result = self.grow_locked(delta, initialize, fill);

        if result.is_err() {
            if let Some(quota) = &self.quota {
                quota.free_table_elems(u64::from(delta));
            }
        }
        result
    }

    fn grow_locked(&self, delta: u32, initialize: bool, fill: Reference) -> Result<u32, TableError> {
        let mut state = self.resizing.lock().unwrap();

        let old_num_elements = self.num_elements.load(Ordering::Acquire);

        // Reject growth beyond the declared maximum, the implementation
        // limit, or the reservation.
        let limit = u64::min(
            self.ty.effective_maximum(),
            self.num_reserved_elements as u64,
        );
        if u64::from(delta) > limit || old_num_elements as u64 > limit - u64::from(delta) {
            return Err(TableError::CouldNotGrow {
                current: old_num_elements as u32,
                attempted_delta: delta,
            });
        }
        let new_num_elements = old_num_elements + delta as usize;

        // Commit pages for the new elements if the new size crosses a page
        // boundary.
        let page_size = region::page::size();
        let old_committed_bytes =
            round_up_to_page_size(old_num_elements * ELEMENT_SIZE, page_size);
        let new_committed_bytes =
            round_up_to_page_size(new_num_elements * ELEMENT_SIZE, page_size);
        if new_committed_bytes != old_committed_bytes {
            state
                .alloc
                .make_accessible(old_committed_bytes, new_committed_bytes - old_committed_bytes)
                .map_err(TableError::Region)?;
        }

        if initialize {
            let biased = BiasedRef::encode(fill).to_word();
            for index in old_num_elements..new_num_elements {
                unsafe { (*self.base.as_ptr().add(index)).0.store(biased, Ordering::Release) };
            }
        }

        // Publish the committed prefix before the new count: a reader that
        // observes the new count must be able to reach every new slot.
        self.num_committed_elements
            .store(new_committed_bytes / ELEMENT_SIZE, Ordering::Release);
        self.num_elements.store(new_num_elements, Ordering::Release);

        Ok(old_num_elements as u32)
    }

    /// Read the element at `index`, translating the uninitialized element to
    /// null.
    pub fn get(&self, index: u32) -> Result<Option<Reference>, Trap> {
        let element = self.get_element(u64::from(index))?;
        Ok(if element == uninitialized_element() {
            None
        } else {
            Some(element)
        })
    }

    /// Write `value` (null stored as the uninitialized element) at `index`,
    /// returning the previously held value.
    pub fn set(&self, index: u32, value: Option<Reference>) -> Result<Option<Reference>, Trap> {
        let new_value = value.unwrap_or_else(uninitialized_element);
        let old_value = self.set_element(u64::from(index), new_value)?;
        Ok(if old_value == uninitialized_element() {
            None
        } else {
            Some(old_value)
        })
    }

    /// The raw element read the code generator inlines: bounds-check against
    /// the reservation, saturated acquire-load, decode. May return the
    /// uninitialized element; never returns the out-of-bounds element.
    pub fn get_element(&self, index: u64) -> Result<Reference, Trap> {
        let biased = self.load_biased(index)?;
        if biased.is_out_of_bounds() {
            return Err(self.out_of_bounds(index));
        }
        Ok(biased.decode())
    }

    /// Store `new_value` at `index` in the sentinel domain, returning the
    /// replaced element. Used by `set`, `copy`, `fill` and `init`.
    pub(crate) fn set_element(&self, index: u64, new_value: Reference) -> Result<Reference, Trap> {
        let slot = self.slot(index)?;
        let biased = BiasedRef::encode(new_value).to_word();

        // Atomically replace the element, raising out-of-bounds before the
        // write if the element being replaced is the out-of-bounds sentinel.
        let mut current = slot.0.load(Ordering::Acquire);
        loop {
            if BiasedRef::from_word(current).is_out_of_bounds() {
                return Err(self.out_of_bounds(index));
            }
            match slot
                .0
                .compare_exchange_weak(current, biased, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(replaced) => current = replaced,
            }
        }

        Ok(BiasedRef::from_word(current).decode())
    }

    /// Copy `len` elements from `src_table[src_offset..]` to
    /// `dest_table[dest_offset..]`, element by element with full checks.
    ///
    /// When copying to higher indices the elements are copied in descending
    /// order, so that overlapping ranges within one table only overwrite
    /// source elements that have already been copied.
    pub fn copy(
        dest_table: &Self,
        src_table: &Self,
        dest_offset: u32,
        src_offset: u32,
        len: u32,
    ) -> Result<(), Trap> {
        if src_offset < dest_offset {
            for index in (0..u64::from(len)).rev() {
                let value = src_table.get_element(u64::from(src_offset) + index)?;
                dest_table.set_element(u64::from(dest_offset) + index, value)?;
            }
        } else {
            for index in 0..u64::from(len) {
                let value = src_table.get_element(u64::from(src_offset) + index)?;
                dest_table.set_element(u64::from(dest_offset) + index, value)?;
            }
        }
        Ok(())
    }

    /// Write `value` into the `len` slots starting at `dest_offset`.
    pub fn fill(&self, dest_offset: u32, value: Option<Reference>, len: u32) -> Result<(), Trap> {
        let fill_value = value.unwrap_or_else(uninitialized_element);
        for index in 0..u64::from(len) {
            self.set_element(u64::from(dest_offset) + index, fill_value)?;
        }
        Ok(())
    }

    fn load_biased(&self, index: u64) -> Result<BiasedRef, Trap> {
        let slot = self.slot(index)?;
        Ok(BiasedRef::from_word(slot.0.load(Ordering::Acquire)))
    }

    /// Resolve `index` to its slot, raising out-of-bounds for indices
    /// outside the reservation and treating uncommitted slots as holding the
    /// zero word.
    fn slot(&self, index: u64) -> Result<&Element, Trap> {
        if index >= self.num_reserved_elements as u64 {
            return Err(self.out_of_bounds(index));
        }

        // Use a saturated index to access the element store, so that it is
        // harmless for the CPU to speculate past the bounds check above.
        let saturated = usize::min(index as usize, self.num_reserved_elements - 1);

        // A slot on an uncommitted page would hold the zero word if its page
        // were committed; generated code reaching one faults and has the
        // fault translated to the same trap by the signal bridge. The host
        // API path must not fault, so the zero word's meaning is applied
        // here directly.
        if saturated >= self.num_committed_elements.load(Ordering::Acquire) {
            return Err(self.out_of_bounds(index));
        }

        Ok(unsafe { &*self.base.as_ptr().add(saturated) })
    }

    pub(crate) fn out_of_bounds(&self, index: u64) -> Trap {
        Trap::TableAccessOutOfBounds {
            table: self.debug_name.clone(),
            index,
        }
    }

    pub(crate) fn uninitialized(&self, index: u64) -> Trap {
        Trap::UninitializedElement {
            table: self.debug_name.clone(),
            index,
        }
    }

    pub(crate) fn bad_signature(&self, index: u64) -> Trap {
        Trap::BadSignature {
            table: self.debug_name.clone(),
            index,
        }
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        registry::unregister(self.base.as_ptr() as usize);

        if let Some(quota) = &self.quota {
            quota.free_table_elems(self.num_elements.load(Ordering::Acquire) as u64);
        }

        trace!(table = %self.debug_name, "destroyed table");
        // The reservation itself is returned by the `Mmap` in `resizing`.
    }
}
