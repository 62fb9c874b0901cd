//! Static value classification.
//!
//! Every [`Encode`] type carries a [`ValueCategory`] as an associated
//! constant. The category is fixed at compile time by the impl that
//! applies to the type, so "which strategy encodes this value" is decided
//! by trait selection, never by inspecting values at runtime.

use std::fmt;

use crate::Encode;

/// The seven shapes the engine knows how to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueCategory {
    /// `bool`, one byte.
    Boolean,
    /// `Vec<bool>`: length prefix, one byte per element (not bit-packed).
    BooleanSequence,
    /// Fixed-width numbers in the stream's byte order.
    Primitive,
    /// Field-less enums, written as a 32-bit signed integer.
    Enumerator,
    /// `[T; N]`: elements in order, no length prefix.
    FixedArray,
    /// Owning or shared pointers: presence byte, then references or body.
    Pointer,
    /// Aggregates and containers (structs, sequences, maps, optionals,
    /// tagged unions).
    Serializable,
}

impl ValueCategory {
    /// `true` when every value of the category has the same encoded size.
    pub const fn is_fixed_width(self) -> bool {
        matches!(self, Self::Boolean | Self::Primitive | Self::Enumerator)
    }
}

impl fmt::Display for ValueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::BooleanSequence => "boolean-sequence",
            Self::Primitive => "primitive",
            Self::Enumerator => "enumerator",
            Self::FixedArray => "fixed-array",
            Self::Pointer => "pointer",
            Self::Serializable => "serializable",
        };
        f.write_str(name)
    }
}

/// Returns the category of `T`.
pub const fn classify<T: Encode + ?Sized>() -> ValueCategory {
    T::CATEGORY
}
