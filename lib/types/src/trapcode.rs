//! Trap codes describing the reason for a runtime trap.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A trap code describing the reason for a trap raised by table operations.
///
/// All trap instruction sites in generated code and all trapping runtime
/// library calls map onto one of these codes before the trap is delivered
/// to the guest.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
#[repr(u32)]
pub enum TrapCode {
    /// A table access was outside the bounds of the table's reservation, or
    /// reached a slot past the table's current size.
    TableAccessOutOfBounds = 0,

    /// An indirect call went through a table slot that was never initialized.
    UninitializedElement = 1,

    /// The signature of the called function did not match the signature
    /// expected at the `call_indirect` site.
    BadSignature = 2,

    /// An operation referenced an element segment that has been dropped.
    InvalidArgument = 3,

    /// A `table.init` source range exceeded the length of the element segment.
    ElemSegmentAccessOutOfBounds = 4,
}

impl TrapCode {
    /// Returns a plain-english message for this trap code.
    pub fn message(&self) -> &str {
        match self {
            Self::TableAccessOutOfBounds => "out of bounds table access",
            Self::UninitializedElement => "uninitialized table element",
            Self::BadSignature => "indirect call signature mismatch",
            Self::InvalidArgument => "invalid argument",
            Self::ElemSegmentAccessOutOfBounds => "out of bounds element segment access",
        }
    }
}

impl fmt::Display for TrapCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let identifier = match *self {
            Self::TableAccessOutOfBounds => "table_oob",
            Self::UninitializedElement => "uninit_element",
            Self::BadSignature => "bad_sig",
            Self::InvalidArgument => "invalid_arg",
            Self::ElemSegmentAccessOutOfBounds => "elem_segment_oob",
        };
        f.write_str(identifier)
    }
}

/// Error returned when parsing an unknown trap-code identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown trap code: {0}")]
pub struct ParseTrapCodeError(String);

impl FromStr for TrapCode {
    type Err = ParseTrapCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table_oob" => Ok(Self::TableAccessOutOfBounds),
            "uninit_element" => Ok(Self::UninitializedElement),
            "bad_sig" => Ok(Self::BadSignature),
            "invalid_arg" => Ok(Self::InvalidArgument),
            "elem_segment_oob" => Ok(Self::ElemSegmentAccessOutOfBounds),
            _ => Err(ParseTrapCodeError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODES: [TrapCode; 5] = [
        TrapCode::TableAccessOutOfBounds,
        TrapCode::UninitializedElement,
        TrapCode::BadSignature,
        TrapCode::InvalidArgument,
        TrapCode::ElemSegmentAccessOutOfBounds,
    ];

    #[test]
    fn display_roundtrips_through_from_str() {
        for code in CODES {
            assert_eq!(code.to_string().parse::<TrapCode>(), Ok(code));
        }
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        assert!("not_a_trap".parse::<TrapCode>().is_err());
    }
}
