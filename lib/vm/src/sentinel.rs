//! The reserved sentinel elements and the biased encoding of table slots.
//!
//! A table slot stores `reference_address - out_of_bounds_address`, so the
//! all-zero word a freshly committed page holds already decodes to the
//! out-of-bounds sentinel. Reserved-but-uncommitted parts of a table are
//! therefore valid "out of bounds" without a single write. The arithmetic
//! never leaves this module; everything else deals in [`BiasedRef`] and
//! [`Reference`] values.

use crate::funcref::{FuncData, Reference};
use crate::sig_registry::VMSharedSignatureIndex;
use std::ptr::NonNull;
use std::sync::OnceLock;

fn make_dummy_function(debug_name: &str) -> Reference {
    // Leaked so the sentinel outlives every table; sentinels are
    // process-scoped and never torn down.
    let data: &'static FuncData = Box::leak(Box::new(FuncData {
        debug_name: debug_name.into(),
        signature: VMSharedSignatureIndex::default(),
    }));
    Reference::from_func_data(data)
}

/// The element decoded from any table slot that is outside the table's
/// current bounds.
///
/// The code generator needs this element's address to emit the bias
/// arithmetic and the merged bounds-plus-signature compare for
/// `call_indirect`; it is not observable by guest code.
pub fn out_of_bounds_element() -> Reference {
    static ELEMENT: OnceLock<Reference> = OnceLock::new();
    *ELEMENT.get_or_init(|| make_dummy_function("out-of-bounds table element"))
}

/// The element stored in slots that are in bounds but hold no reference.
/// Translated to null at the API boundary.
pub(crate) fn uninitialized_element() -> Reference {
    static ELEMENT: OnceLock<Reference> = OnceLock::new();
    *ELEMENT.get_or_init(|| make_dummy_function("uninitialized table element"))
}

/// The bit-pattern actually stored in a table slot.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BiasedRef(usize);

impl BiasedRef {
    /// The encoding of the out-of-bounds sentinel: the all-zero word.
    pub const OUT_OF_BOUNDS: Self = Self(0);

    /// Encode a reference for storage in a table slot.
    pub fn encode(reference: Reference) -> Self {
        Self(reference.addr().wrapping_sub(out_of_bounds_element().addr()))
    }

    /// Decode a stored word back into a reference.
    pub fn decode(self) -> Reference {
        let addr = self.0.wrapping_add(out_of_bounds_element().addr());
        // Every stored word was produced by `encode` from a live reference,
        // or is the zero word, which decodes to the out-of-bounds sentinel.
        unsafe { Reference::from_raw(NonNull::new_unchecked(addr as *mut FuncData)) }
    }

    /// Whether this word decodes to the out-of-bounds sentinel, without
    /// decoding it.
    pub fn is_out_of_bounds(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn from_word(word: usize) -> Self {
        Self(word)
    }

    pub(crate) fn to_word(self) -> usize {
        self.0
    }
}
