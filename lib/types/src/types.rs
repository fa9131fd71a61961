//! Value, reference, table and function types.

use std::fmt;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// A list of all possible value types in WebAssembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Type {
    /// Signed 32 bit integer.
    I32,
    /// Signed 64 bit integer.
    I64,
    /// Floating point 32 bit integer.
    F32,
    /// Floating point 64 bit integer.
    F64,
    /// A 128 bit number.
    V128,
    /// A reference to opaque data in the Wasm instance.
    ExternRef,
    /// A reference to a Wasm function.
    FuncRef,
}

impl Type {
    /// Returns true if `Type` matches any of the numeric types. (e.g. `I32`,
    /// `I64`, `F32`, `F64`, `V128`).
    pub fn is_num(self) -> bool {
        matches!(
            self,
            Self::I32 | Self::I64 | Self::F32 | Self::F64 | Self::V128
        )
    }

    /// Returns true if `Type` matches either of the reference types.
    pub fn is_ref(self) -> bool {
        matches!(self, Self::ExternRef | Self::FuncRef)
    }

    /// Returns true if a value of type `self` may be stored where a value of
    /// type `other` is expected.
    ///
    /// The reference-type hierarchy here is flat: without the GC proposal the
    /// only subtyping is reflexivity.
    pub fn is_subtype_of(self, other: Self) -> bool {
        self == other
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A descriptor for a table in a WebAssembly module.
///
/// Tables are contiguous chunks of a specific element, typically a `funcref`
/// or an `externref`. The most common use for tables is a function table
/// through which `call_indirect` can invoke other functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct TableType {
    /// The type of data stored in elements of the table.
    pub ty: Type,
    /// The minimum number of elements in the table.
    pub minimum: u32,
    /// The maximum number of elements in the table.
    pub maximum: Option<u32>,
}

impl TableType {
    /// Creates a new table descriptor which will contain the specified
    /// `element` and have the `limits` applied to its length.
    pub fn new(ty: Type, minimum: u32, maximum: Option<u32>) -> Self {
        Self {
            ty,
            minimum,
            maximum,
        }
    }

    /// The largest size this table is ever allowed to reach, honoring both
    /// the declared maximum and the implementation limit.
    pub fn effective_maximum(&self) -> u64 {
        match self.maximum {
            Some(max) => u64::min(u64::from(max), crate::units::MAX_TABLE_ELEMENTS),
            None => crate::units::MAX_TABLE_ELEMENTS,
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(maximum) = self.maximum {
            write!(f, "{} ({}..{})", self.ty, self.minimum, maximum)
        } else {
            write!(f, "{} ({}..)", self.ty, self.minimum)
        }
    }
}

/// The signature of a function: its parameter and result types.
///
/// Indirect calls compare signatures by an interned index rather than
/// structurally; this type is what gets interned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct FunctionType {
    /// The parameters of the function.
    params: Box<[Type]>,
    /// The return values of the function.
    results: Box<[Type]>,
}

impl FunctionType {
    /// Creates a new function type with the given parameter and return types.
    pub fn new<Params, Returns>(params: Params, returns: Returns) -> Self
    where
        Params: Into<Box<[Type]>>,
        Returns: Into<Box<[Type]>>,
    {
        Self {
            params: params.into(),
            results: returns.into(),
        }
    }

    /// Parameter types.
    pub fn params(&self) -> &[Type] {
        &self.params
    }

    /// Return types.
    pub fn results(&self) -> &[Type] {
        &self.results
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let params = self
            .params
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let results = self
            .results
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{}] -> [{}]", params, results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtyping_is_reflexive_only() {
        assert!(Type::FuncRef.is_subtype_of(Type::FuncRef));
        assert!(Type::ExternRef.is_subtype_of(Type::ExternRef));
        assert!(!Type::FuncRef.is_subtype_of(Type::ExternRef));
        assert!(!Type::ExternRef.is_subtype_of(Type::FuncRef));
    }

    #[test]
    fn table_type_display() {
        let ty = TableType::new(Type::FuncRef, 2, Some(4));
        assert_eq!(ty.to_string(), "FuncRef (2..4)");
        let ty = TableType::new(Type::FuncRef, 0, None);
        assert_eq!(ty.to_string(), "FuncRef (0..)");
    }

    #[test]
    fn effective_maximum_honors_both_limits() {
        let capped = TableType::new(Type::FuncRef, 0, Some(10));
        assert_eq!(capped.effective_maximum(), 10);
        let uncapped = TableType::new(Type::FuncRef, 0, None);
        assert_eq!(uncapped.effective_maximum(), crate::MAX_TABLE_ELEMENTS);
    }
}
