//! These are the common types shared by the Weft runtime crates:
//! value and table types, typed index spaces, element-segment
//! initializers and the trap codes raised by generated code.

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

mod indexes;
mod initializers;
mod table;
mod trapcode;
mod types;
mod units;

pub use crate::indexes::{ElemIndex, FunctionIndex, LocalTableIndex, SignatureIndex, TableIndex};
pub use crate::initializers::Elem;
pub use crate::table::TableStyle;
pub use crate::trapcode::TrapCode;
pub use crate::types::{FunctionType, TableType, Type};
pub use crate::units::{MAX_TABLE_ELEMENTS, RESERVED_TABLE_ELEMENTS};

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
