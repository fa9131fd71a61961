//! Guest-visible traps raised by table operations.
//!
//! A `Trap` produced on a guest-invoked path is delivered by the runtime's
//! exception bridge, which unwinds to the nearest guest catch; the same
//! bridge translates hardware faults on a table's guard page into
//! [`Trap::TableAccessOutOfBounds`] by consulting the global table registry.
//! On the host API surface a `Trap` is just an error return with no side
//! effects on the table.

use thiserror::Error;
use weft_types::{ElemIndex, TrapCode};

/// The reason a table operation trapped, with the triggering table and
/// index where applicable. Tables are identified by their debug name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    /// The index was outside the table's reservation, or the slot decoded to
    /// the out-of-bounds sentinel.
    #[error("out of bounds access to table `{table}` at index {index}")]
    TableAccessOutOfBounds {
        /// Debug name of the accessed table.
        table: Box<str>,
        /// The faulting element index.
        index: u64,
    },

    /// An indirect call went through a slot that holds no reference.
    #[error("indirect call through uninitialized element of table `{table}` at index {index}")]
    UninitializedElement {
        /// Debug name of the accessed table.
        table: Box<str>,
        /// The faulting element index.
        index: u64,
    },

    /// The called function's signature did not match the `call_indirect`
    /// site's expectation.
    #[error("indirect call signature mismatch in table `{table}` at index {index}")]
    BadSignature {
        /// Debug name of the accessed table.
        table: Box<str>,
        /// The faulting element index.
        index: u64,
    },

    /// The operation referenced an element segment that has been dropped, or
    /// a table/segment id that does not resolve.
    #[error("invalid argument")]
    InvalidArgument,

    /// A `table.init` source range exceeded the segment's length.
    #[error("out of bounds access to element segment {segment:?} at index {index}")]
    ElemSegmentAccessOutOfBounds {
        /// The segment the source range was resolved against.
        segment: ElemIndex,
        /// The first source index outside the segment.
        index: u64,
    },
}

impl Trap {
    /// The trap code generated code reports for this trap.
    pub fn trap_code(&self) -> TrapCode {
        match self {
            Self::TableAccessOutOfBounds { .. } => TrapCode::TableAccessOutOfBounds,
            Self::UninitializedElement { .. } => TrapCode::UninitializedElement,
            Self::BadSignature { .. } => TrapCode::BadSignature,
            Self::InvalidArgument => TrapCode::InvalidArgument,
            Self::ElemSegmentAccessOutOfBounds { .. } => TrapCode::ElemSegmentAccessOutOfBounds,
        }
    }
}
