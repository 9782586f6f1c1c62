//! Variant tags for the tagged interchange value.

use crate::error::{IplError, Result};
use std::fmt;

/// Variant discriminator stored in the low 4 bits of an interchange value.
///
/// The set is closed: the ten codes below are the entire wire vocabulary,
/// and any other code is a decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// Absent value; the payload is zero.
    Void = 0,
    /// Boolean; payload bit 0.
    Bool = 1,
    /// 124-bit two's-complement signed integer.
    Int = 2,
    /// 124-bit unsigned integer.
    Uint = 3,
    /// IEEE-754 binary64 bit pattern in the low 64 payload bits.
    Float = 4,
    /// Raw byte buffer referenced by `(ptr, len)`.
    Bytes = 5,
    /// UTF-8 string referenced by `(ptr, len)`.
    String = 6,
    /// UTF-8 JSON document referenced by `(ptr, len)`.
    Json = 7,
    /// Function reference: trampoline address or callback key, plus origin.
    Function = 8,
    /// Contiguous run of 16-byte interchange values referenced by `(ptr, len)`.
    Array = 9,
}

impl Tag {
    /// Get the wire code for this tag.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Resolve a wire code to a tag.
    ///
    /// # Errors
    /// Returns [`IplError::UnknownVariant`] for codes outside `0..=9`.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Void),
            1 => Ok(Self::Bool),
            2 => Ok(Self::Int),
            3 => Ok(Self::Uint),
            4 => Ok(Self::Float),
            5 => Ok(Self::Bytes),
            6 => Ok(Self::String),
            7 => Ok(Self::Json),
            8 => Ok(Self::Function),
            9 => Ok(Self::Array),
            _ => Err(IplError::UnknownVariant { tag: code }),
        }
    }

    /// Check if this tag's payload is a `(ptr, len)` byte region.
    #[must_use]
    pub const fn is_bytes_like(self) -> bool {
        matches!(self, Self::Bytes | Self::String | Self::Json)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::Bytes => "bytes",
            Self::String => "string",
            Self::Json => "json",
            Self::Function => "function",
            Self::Array => "array",
        };
        write!(f, "{}", name)
    }
}
