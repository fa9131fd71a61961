//! Runtime library calls invoked by generated code for the `table.*` and
//! `elem.*` instructions and for `call_indirect` failure reporting.
//!
//! Generated code passes element-type-erased references, 32-bit guest
//! indices, and numeric table/segment ids that are resolved against the
//! calling context's runtime data. A returned `Err` is raised on the guest
//! stack by the trampoline that made the call; the raising machinery itself
//! lives with the exception bridge, not here.

use crate::compartment::Compartment;
use crate::funcref::Reference;
use crate::instance::ModuleInstance;
use crate::sentinel::{out_of_bounds_element, uninitialized_element};
use crate::sig_registry::VMSharedSignatureIndex;
use crate::table::Table;
use crate::trap::Trap;
use std::sync::Arc;
use tracing::debug;
use weft_types::{ElemIndex, TableStyle};

/// The calling context generated code executes in: the compartment whose
/// runtime data table ids resolve against, and the module instance whose
/// function index space and element segments `table.init` uses.
#[derive(Debug, Clone)]
pub struct VMContext {
    compartment: Arc<Compartment>,
    instance: Arc<ModuleInstance>,
}

impl VMContext {
    /// Create a context for calls made by code of `instance` running in
    /// `compartment`.
    pub fn new(compartment: Arc<Compartment>, instance: Arc<ModuleInstance>) -> Self {
        Self {
            compartment,
            instance,
        }
    }

    /// The compartment table ids resolve against.
    pub fn compartment(&self) -> &Arc<Compartment> {
        &self.compartment
    }

    /// The module instance segment and function ids resolve against.
    pub fn instance(&self) -> &Arc<ModuleInstance> {
        &self.instance
    }

    fn table(&self, table_id: u32) -> Result<Arc<Table>, Trap> {
        self.compartment
            .table(table_id as usize)
            .ok_or(Trap::InvalidArgument)
    }
}

/// The `table.grow` intrinsic. Returns the old element count, or `u32::MAX`
/// (the guest-visible `-1`) if the table cannot grow by `delta`.
pub fn table_grow(
    ctx: &VMContext,
    init_value: Option<Reference>,
    delta: u32,
    table_id: u32,
) -> Result<u32, Trap> {
    let table = ctx.table(table_id)?;
    Ok(match table.grow(delta, init_value) {
        Ok(old_num_elements) => old_num_elements,
        Err(_) => u32::MAX,
    })
}

/// The `table.size` intrinsic.
pub fn table_size(ctx: &VMContext, table_id: u32) -> Result<u32, Trap> {
    Ok(ctx.table(table_id)?.size())
}

/// The `table.get` intrinsic.
pub fn table_get(ctx: &VMContext, index: u32, table_id: u32) -> Result<Option<Reference>, Trap> {
    ctx.table(table_id)?.get(index)
}

/// The `table.set` intrinsic.
pub fn table_set(
    ctx: &VMContext,
    index: u32,
    value: Option<Reference>,
    table_id: u32,
) -> Result<(), Trap> {
    ctx.table(table_id)?.set(index, value)?;
    Ok(())
}

/// The `table.init` intrinsic.
pub fn table_init(
    ctx: &VMContext,
    dest_offset: u32,
    src_offset: u32,
    len: u32,
    table_id: u32,
    elem_segment_id: u32,
) -> Result<(), Trap> {
    let table = ctx.table(table_id)?;
    ctx.instance.init_elem_segment(
        ElemIndex::from_u32(elem_segment_id),
        &table,
        dest_offset,
        src_offset,
        len,
    )
}

/// The `elem.drop` intrinsic.
pub fn elem_drop(ctx: &VMContext, elem_segment_id: u32) -> Result<(), Trap> {
    ctx.instance
        .drop_elem_segment(ElemIndex::from_u32(elem_segment_id))
}

/// The `table.copy` intrinsic.
pub fn table_copy(
    ctx: &VMContext,
    dest_offset: u32,
    src_offset: u32,
    len: u32,
    src_table_id: u32,
    dest_table_id: u32,
) -> Result<(), Trap> {
    let src_table = ctx.table(src_table_id)?;
    let dest_table = ctx.table(dest_table_id)?;
    Table::copy(&dest_table, &src_table, dest_offset, src_offset, len)
}

/// The `table.fill` intrinsic.
pub fn table_fill(
    ctx: &VMContext,
    dest_offset: u32,
    value: Option<Reference>,
    len: u32,
    table_id: u32,
) -> Result<(), Trap> {
    ctx.table(table_id)?.fill(dest_offset, value, len)
}

/// The `call_indirect` failure diagnostic, invoked by generated code after
/// its merged sentinel-plus-signature compare failed on the element it
/// loaded from the table. Reports out-of-bounds, uninitialized element, or
/// signature mismatch depending on what `function` turns out to be.
pub fn call_indirect_fail(
    ctx: &VMContext,
    index: u32,
    table_id: u32,
    function: Reference,
    expected_signature: VMSharedSignatureIndex,
) -> Trap {
    let table = match ctx.table(table_id) {
        Ok(table) => table,
        Err(trap) => return trap,
    };
    if function == out_of_bounds_element() {
        debug!(index, "call_indirect: index is out-of-bounds");
        table.out_of_bounds(u64::from(index))
    } else if function == uninitialized_element() {
        debug!(index, "call_indirect: index is uninitialized");
        table.uninitialized(u64::from(index))
    } else {
        match table.style() {
            // The caller compared the element's signature id against the
            // expected one itself, so a live element landing here can only
            // be a mismatch.
            TableStyle::CallerChecksSignature => {
                let signatures = ctx.instance.signatures();
                let found = signatures
                    .lookup(function.signature())
                    .map(|sig| sig.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                let expected = signatures
                    .lookup(expected_signature)
                    .map(|sig| sig.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                debug!(
                    index,
                    callee = function.debug_name(),
                    %found,
                    %expected,
                    "call_indirect: signature mismatch"
                );
                table.bad_signature(u64::from(index))
            }
        }
    }
}
