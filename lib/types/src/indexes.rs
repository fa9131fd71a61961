//! Typed index spaces shared between the parser, the code generator and
//! the runtime.

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

macro_rules! index_impl {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
        pub struct $name(u32);

        impl $name {
            /// Create a new index from a `u32`.
            pub const fn from_u32(index: u32) -> Self {
                Self(index)
            }

            /// Return the underlying `u32` value.
            pub const fn as_u32(self) -> u32 {
                self.0
            }

            /// Return the index as a `usize`, for container lookups.
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

index_impl! {
    /// Index type of a function (imported or local) inside a WebAssembly module.
    FunctionIndex
}

index_impl! {
    /// Index type of a table (imported or local) inside a WebAssembly module.
    TableIndex
}

index_impl! {
    /// Index type of a table defined locally inside a WebAssembly module.
    LocalTableIndex
}

index_impl! {
    /// Index type of a passive element segment inside a WebAssembly module.
    ElemIndex
}

index_impl! {
    /// Index type of a signature (as in a function type) inside a WebAssembly module.
    SignatureIndex
}
