use crate::types::Type;
#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// Implementation styles for WebAssembly tables.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum TableStyle {
    /// Signatures are stored in the table and checked in the caller.
    ///
    /// The code generator emits a single compare per `call_indirect`: the
    /// loaded element is checked against the expected signature id, and the
    /// same compare rejects the reserved sentinel elements.
    CallerChecksSignature,
}

impl TableStyle {
    /// Chooses an implementation style for a table holding elements of `ty`.
    pub fn for_element(_ty: Type) -> Self {
        Self::CallerChecksSignature
    }
}
