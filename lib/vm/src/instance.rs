//! Module instances, reduced to what the table subsystem needs from them:
//! the function index space and the passive element segments.

use crate::funcref::{FuncData, Reference};
use crate::sig_registry::SignatureRegistry;
use crate::table::Table;
use crate::trap::Trap;
use std::sync::{Arc, Mutex};
use weft_types::{Elem, ElemIndex, FunctionIndex, FunctionType};

/// An element segment's storage: immutable and reference counted, so that a
/// `table.init` that captured it keeps it alive across a racing `elem.drop`.
pub type ElemSegment = Arc<[Elem]>;

/// An instantiated module, owning its functions' metadata (at stable
/// addresses, for the life of the instance) and its passive element
/// segments.
#[derive(Debug)]
pub struct ModuleInstance {
    // Boxed slice so the `FuncData` addresses that published `Reference`s
    // point at never move.
    func_data: Box<[FuncData]>,
    elem_segments: Mutex<Vec<Option<ElemSegment>>>,
    signatures: Arc<SignatureRegistry>,
}

impl ModuleInstance {
    /// Create an instance from its functions (name and signature each) and
    /// its passive element segments. Signatures are interned in
    /// `signatures`, which `call_indirect` failure diagnostics consult.
    pub fn new(
        signatures: Arc<SignatureRegistry>,
        functions: Vec<(String, FunctionType)>,
        elem_segments: Vec<Vec<Elem>>,
    ) -> Arc<Self> {
        let func_data = functions
            .into_iter()
            .map(|(debug_name, ty)| FuncData {
                debug_name: debug_name.into(),
                signature: signatures.register(&ty),
            })
            .collect();
        let elem_segments = elem_segments
            .into_iter()
            .map(|elems| Some(ElemSegment::from(elems)))
            .collect();
        Arc::new(Self {
            func_data,
            elem_segments: Mutex::new(elem_segments),
            signatures,
        })
    }

    /// The signature registry this instance's functions are interned in.
    pub fn signatures(&self) -> &Arc<SignatureRegistry> {
        &self.signatures
    }

    /// A reference to the function at `index` in this instance's function
    /// index space.
    pub fn function(&self, index: FunctionIndex) -> Option<Reference> {
        self.func_data.get(index.index()).map(Reference::from_func_data)
    }

    /// Capture the element segment at `index` under the instance's segment
    /// mutex. The mutex is released on return, so callers iterate the
    /// captured storage while a concurrent `elem.drop` may empty the slot.
    pub(crate) fn elem_segment(&self, index: ElemIndex) -> Result<ElemSegment, Trap> {
        let segments = self.elem_segments.lock().unwrap();
        segments
            .get(index.index())
            .and_then(Clone::clone)
            .ok_or(Trap::InvalidArgument)
    }

    /// The `elem.drop` operation: release the instance's share of the
    /// segment. An `init` that has already captured the storage is
    /// unaffected; later `init`s on this segment raise `InvalidArgument`.
    pub fn drop_elem_segment(&self, index: ElemIndex) -> Result<(), Trap> {
        let mut segments = self.elem_segments.lock().unwrap();
        match segments.get_mut(index.index()) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => Err(Trap::InvalidArgument),
        }
    }

    /// The `table.init` operation: copy `len` entries of the element segment
    /// at `elem_index`, starting at `src_offset`, into `table` starting at
    /// `dest_offset`. `RefFunc` entries are resolved against this instance's
    /// function index space; `RefNull` entries store as null.
    pub fn init_elem_segment(
        &self,
        elem_index: ElemIndex,
        table: &Table,
        dest_offset: u32,
        src_offset: u32,
        len: u32,
    ) -> Result<(), Trap> {
        let elems = self.elem_segment(elem_index)?;
        self.init_from_segment(elem_index, &elems, table, dest_offset, src_offset, len)
    }

    fn init_from_segment(
        &self,
        elem_index: ElemIndex,
        elems: &[Elem],
        table: &Table,
        dest_offset: u32,
        src_offset: u32,
        len: u32,
    ) -> Result<(), Trap> {
        // Validate the whole source range up front: a bad range must not
        // modify any table slot. The arithmetic is in u64, so the
        // wrap-around a 32-bit sum could hit cannot occur.
        let segment_len = elems.len() as u64;
        let src_end = u64::from(src_offset) + u64::from(len);
        if src_end > segment_len {
            return Err(Trap::ElemSegmentAccessOutOfBounds {
                segment: elem_index,
                index: u64::max(u64::from(src_offset), segment_len),
            });
        }

        for index in 0..u64::from(len) {
            let value = match elems[(u64::from(src_offset) + index) as usize] {
                Elem::RefNull => crate::sentinel::uninitialized_element(),
                Elem::RefFunc(function_index) => {
                    // Validation guarantees in-range function indices; a
                    // segment referencing a function this instance does not
                    // have is malformed input.
                    self.function(function_index).ok_or(Trap::InvalidArgument)?
                }
            };
            table.set_element(u64::from(dest_offset) + index, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::{TableType, Type};

    fn instance_with_segment(elems: Vec<Elem>) -> Arc<ModuleInstance> {
        let signatures = Arc::new(SignatureRegistry::new());
        let functions = vec![
            ("f0".to_string(), FunctionType::new(vec![], vec![])),
            ("f1".to_string(), FunctionType::new(vec![Type::I32], vec![])),
        ];
        ModuleInstance::new(signatures, functions, vec![elems])
    }

    fn small_table() -> Arc<Table> {
        Table::new(TableType::new(Type::FuncRef, 4, None), None, "init target", None).unwrap()
    }

    #[test]
    fn an_init_that_captured_the_segment_survives_a_racing_drop() {
        let instance = instance_with_segment(vec![
            Elem::RefFunc(FunctionIndex::from_u32(0)),
            Elem::RefFunc(FunctionIndex::from_u32(1)),
        ]);
        let table = small_table();
        let segment_index = ElemIndex::from_u32(0);

        // One guest thread captures the segment storage, then another
        // completes `elem.drop` before the first starts writing.
        let captured = instance.elem_segment(segment_index).unwrap();
        instance.drop_elem_segment(segment_index).unwrap();

        instance
            .init_from_segment(segment_index, &captured, &table, 0, 0, 2)
            .unwrap();
        assert_eq!(table.get(0).unwrap(), instance.function(FunctionIndex::from_u32(0)));
        assert_eq!(table.get(1).unwrap(), instance.function(FunctionIndex::from_u32(1)));

        // A later init on the same segment index sees the dropped slot.
        assert_eq!(
            instance
                .init_elem_segment(segment_index, &table, 0, 0, 2)
                .unwrap_err(),
            Trap::InvalidArgument
        );
    }

    #[test]
    fn dropping_a_segment_twice_is_invalid() {
        let instance = instance_with_segment(vec![Elem::RefNull]);
        let segment_index = ElemIndex::from_u32(0);
        instance.drop_elem_segment(segment_index).unwrap();
        assert_eq!(
            instance.drop_elem_segment(segment_index).unwrap_err(),
            Trap::InvalidArgument
        );
    }

    #[test]
    fn dropping_an_unknown_segment_is_invalid() {
        let instance = instance_with_segment(vec![Elem::RefNull]);
        assert_eq!(
            instance
                .drop_elem_segment(ElemIndex::from_u32(7))
                .unwrap_err(),
            Trap::InvalidArgument
        );
    }
}
