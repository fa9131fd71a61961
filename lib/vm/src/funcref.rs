//! Function metadata and the opaque `Reference` handle stored in table
//! slots.

use crate::sig_registry::VMSharedSignatureIndex;
use std::fmt;
use std::ptr::NonNull;

/// Metadata about a callable runtime object.
///
/// Every reference a table can hold points at one of these. The two reserved
/// sentinel elements are `FuncData` values too, so the code generator can
/// fold the sentinel checks into the signature compare it already emits for
/// `call_indirect`.
#[derive(Debug)]
pub struct FuncData {
    /// Free-form name used in diagnostics.
    pub debug_name: Box<str>,
    /// The interned signature of the function, compared against the
    /// expected signature at every `call_indirect` site.
    pub signature: VMSharedSignatureIndex,
}

/// A reference to a runtime object: a single word that points to metadata
/// about a function.
///
/// References are compared by identity. Null is represented as the absence
/// of a `Reference` (`Option::None`) at the API boundary; a `Reference`
/// itself is never null.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reference(NonNull<FuncData>);

impl Reference {
    /// Create a reference from borrowed function metadata.
    ///
    /// The caller keeps `data` at a stable address for as long as the
    /// reference is reachable; module instances and the process-scoped
    /// sentinels both satisfy this by construction.
    pub(crate) fn from_func_data(data: &FuncData) -> Self {
        Self(NonNull::from(data))
    }

    /// Create a reference from a raw pointer to function metadata.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live `FuncData` that outlives every table slot
    /// and local the resulting reference is stored in.
    pub unsafe fn from_raw(ptr: NonNull<FuncData>) -> Self {
        Self(ptr)
    }

    /// The address of the referenced metadata, as a word.
    pub(crate) fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// The interned signature of the referenced function.
    pub fn signature(self) -> VMSharedSignatureIndex {
        self.data().signature
    }

    /// The diagnostic name of the referenced function.
    pub fn debug_name(&self) -> &str {
        &self.data().debug_name
    }

    fn data(&self) -> &FuncData {
        // The liveness contract is established at construction, either by
        // `from_func_data` or by the caller of `from_raw`.
        unsafe { self.0.as_ref() }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("addr", &self.0.as_ptr())
            .field("debug_name", &self.debug_name())
            .finish()
    }
}

// We use raw pointers but the data never moves, so it's not a problem.
unsafe impl Send for Reference {}
unsafe impl Sync for Reference {}
