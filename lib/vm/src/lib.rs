//! Runtime table support for Weft.
//!
//! This crate implements the runtime object `call_indirect`, the `table.*`
//! instructions and the `elem.*` instructions operate on: oversized virtual
//! reservations with lazily committed backing, per-slot atomic element
//! stores with a biased sentinel encoding, compartment-scoped publication
//! for generated code, and a global registry that resolves faulting
//! addresses back to their owning table.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]
#![cfg_attr(
    feature = "cargo-clippy",
    warn(
        clippy::float_arithmetic,
        clippy::mut_mut,
        clippy::nonminimal_bool,
        clippy::print_stdout,
        clippy::unicode_not_nfc,
        clippy::use_self
    )
)]

mod compartment;
mod funcref;
mod instance;
mod mmap;
mod quota;
mod registry;
mod sentinel;
mod sig_registry;
mod table;
mod trap;

pub mod libcalls;

pub use crate::compartment::{Compartment, CompartmentRuntimeData, MAX_TABLES};
pub use crate::funcref::{FuncData, Reference};
pub use crate::instance::{ElemSegment, ModuleInstance};
pub use crate::mmap::Mmap;
pub use crate::quota::ResourceQuota;
pub use crate::registry::is_address_owned_by_table;
pub use crate::sentinel::{out_of_bounds_element, BiasedRef};
pub use crate::sig_registry::{SignatureRegistry, VMSharedSignatureIndex};
pub use crate::table::{Table, TableError};
pub use crate::trap::Trap;
pub use weft_types::TrapCode;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
