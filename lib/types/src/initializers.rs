//! Element-segment initializer entries.

use crate::indexes::FunctionIndex;
#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// One entry of a passive element segment.
///
/// Passive segments are immutable once a module is instantiated; `table.init`
/// resolves `RefFunc` entries against the instantiating module's function
/// index space at copy time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Elem {
    /// A null reference.
    RefNull,
    /// A reference to a function in the instantiating module.
    RefFunc(FunctionIndex),
}
