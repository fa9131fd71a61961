//! Interning of function signatures.
//!
//! An indirect call checks the callee's signature with a single word
//! compare, so every signature in the process is interned here once and
//! identified by its slot index from then on.

use std::collections::HashMap;
use std::sync::RwLock;
use weft_types::FunctionType;

/// An index into the shared signature registry, usable for checking
/// signatures at indirect calls with a single word compare.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VMSharedSignatureIndex(u32);

impl VMSharedSignatureIndex {
    /// Create a new `VMSharedSignatureIndex`.
    pub fn new(value: u32) -> Self {
        Self(value)
    }
}

impl Default for VMSharedSignatureIndex {
    fn default() -> Self {
        Self(u32::MAX)
    }
}

/// A registry of every function signature in the process, shared by all
/// instances so equal signatures always intern to the same index.
///
/// Indexes are dense: slot `i` of the registry holds the signature that
/// interned to index `i`, and lookups are plain slot reads. Interior
/// mutability keeps registration callable from any thread.
#[derive(Debug, Default)]
pub struct SignatureRegistry {
    inner: RwLock<Registrations>,
}

#[derive(Debug, Default)]
struct Registrations {
    // Slot `i` holds the signature interned at index `i`.
    types: Vec<FunctionType>,
    index_of: HashMap<FunctionType, VMSharedSignatureIndex>,
}

impl SignatureRegistry {
    /// Create a new `SignatureRegistry`.
    pub fn new() -> Self {
        Default::default()
    }

    /// Intern a signature, returning the index every equal signature
    /// registered here resolves to.
    pub fn register(&self, sig: &FunctionType) -> VMSharedSignatureIndex {
        if let Some(&index) = self.inner.read().unwrap().index_of.get(sig) {
            return index;
        }

        let mut inner = self.inner.write().unwrap();
        // Another thread may have interned `sig` between the locks.
        if let Some(&index) = inner.index_of.get(sig) {
            return index;
        }

        // u32::MAX never becomes a slot: `VMSharedSignatureIndex::default()`
        // is the index the sentinel elements carry.
        assert!(
            inner.types.len() < u32::MAX as usize,
            "signature registry overflow"
        );
        let index = VMSharedSignatureIndex::new(inner.types.len() as u32);
        inner.types.push(sig.clone());
        inner.index_of.insert(sig.clone(), index);
        index
    }

    /// The signature interned at `index`, if any.
    pub fn lookup(&self, index: VMSharedSignatureIndex) -> Option<FunctionType> {
        self.inner.read().unwrap().types.get(index.0 as usize).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::Type;

    #[test]
    fn registration_is_idempotent() {
        let registry = SignatureRegistry::new();
        let sig = FunctionType::new(vec![Type::I32], vec![Type::I32]);
        let a = registry.register(&sig);
        let b = registry.register(&sig);
        assert_eq!(a, b);
        assert_eq!(registry.lookup(a), Some(sig));
    }

    #[test]
    fn indexes_are_dense_and_resolve_to_their_signature() {
        let registry = SignatureRegistry::new();
        let sigs = [
            FunctionType::new(vec![], vec![]),
            FunctionType::new(vec![Type::I32], vec![]),
            FunctionType::new(vec![Type::I64], vec![Type::I64]),
        ];
        let indexes: Vec<VMSharedSignatureIndex> =
            sigs.iter().map(|sig| registry.register(sig)).collect();
        for (slot, (sig, index)) in sigs.iter().zip(&indexes).enumerate() {
            assert_eq!(*index, VMSharedSignatureIndex::new(slot as u32));
            assert_eq!(registry.lookup(*index), Some(sig.clone()));
        }
    }

    #[test]
    fn distinct_signatures_get_distinct_indexes() {
        let registry = SignatureRegistry::new();
        let a = registry.register(&FunctionType::new(vec![Type::I32], vec![]));
        let b = registry.register(&FunctionType::new(vec![Type::I64], vec![]));
        assert_ne!(a, b);
    }

    #[test]
    fn the_default_index_is_never_registered() {
        let registry = SignatureRegistry::new();
        registry.register(&FunctionType::new(vec![], vec![]));
        assert_eq!(registry.lookup(VMSharedSignatureIndex::default()), None);
    }
}
