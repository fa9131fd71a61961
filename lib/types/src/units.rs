//! Implementation limits.

/// The hard cap on the number of elements in any table, independent of the
/// declared maximum. Keeps table sizes representable as a 32-bit guest value.
pub const MAX_TABLE_ELEMENTS: u64 = u32::MAX as u64;

/// The number of element slots each table reserves address space for.
///
/// On 64-bit hosts the reservation covers every 32-bit index so that
/// generated code can index with a 32-bit offset and no bounds check; 32-bit
/// hosts get a 4 Mi element reservation instead.
#[cfg(target_pointer_width = "64")]
pub const RESERVED_TABLE_ELEMENTS: u64 = 1 << 32;

/// The number of element slots each table reserves address space for.
#[cfg(target_pointer_width = "32")]
pub const RESERVED_TABLE_ELEMENTS: u64 = 1 << 22;
