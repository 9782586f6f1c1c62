//! Error types for the IPL bridge.
//!
//! This module provides strongly-typed errors with actionable context.
//! Errors carry the identifiers needed to debug a failed exchange (variant
//! tags, memory ranges, callback keys, export names).

use crate::ipl::Origin;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for IPL bridge operations.
#[derive(Error, Debug)]
pub enum IplError {
    // =========================================================================
    // Wire-format errors (E001-E099)
    // =========================================================================
    /// A host value has no representable variant tag.
    #[error("E001: Unsupported {type_name} value: {cause}")]
    UnsupportedType {
        /// Name of the offending host type.
        type_name: String,
        /// Reason the value cannot be encoded.
        cause: String,
    },

    /// The decoder saw a tag outside the closed variant set.
    #[error("E002: Unknown variant tag {tag} (expected 0..=9)")]
    UnknownVariant {
        /// The raw tag code.
        tag: u8,
    },

    /// A function value arrived from the wrong side of the boundary.
    #[error("E003: Wrong function origin: expected {expected}, found {found}")]
    WrongOrigin {
        /// The origin the operation requires.
        expected: Origin,
        /// The origin carried by the value.
        found: Origin,
    },

    /// A `(ptr, len)` pair straddles the current linear-memory bounds.
    #[error("E004: Memory fault: range [{ptr}, {ptr}+{len}) outside linear memory of {size} bytes")]
    MemoryFault {
        /// Start offset of the faulting range.
        ptr: u32,
        /// Length of the faulting range in bytes.
        len: u32,
        /// Current linear-memory size in bytes.
        size: usize,
    },

    /// The guest allocator returned a null pointer.
    #[error("E005: Guest allocation failed: requested {requested} bytes")]
    AllocationFailure {
        /// Number of bytes requested.
        requested: u32,
    },

    /// JSON serialisation or parsing failed.
    #[error("E006: JSON failure: {cause}")]
    JsonFailure {
        /// Reason for the failure.
        cause: String,
    },

    /// A bit-section layout does not fit in 128 bits.
    #[error("E007: Bit sections overflow: {total_bits} bits declared, 128 available")]
    SectionOverflow {
        /// Sum of the declared section widths.
        total_bits: u32,
    },

    /// A decoded string payload is not valid UTF-8.
    #[error("E008: Invalid string payload: {cause}")]
    InvalidString {
        /// Reason for the decode failure.
        cause: String,
    },

    /// Array nesting exceeded the decoder's recursion limit.
    #[error("E009: Array nesting exceeds {limit} levels")]
    NestingTooDeep {
        /// The recursion limit that was exceeded.
        limit: u32,
    },

    // =========================================================================
    // Guest module errors (E101-E199)
    // =========================================================================
    /// A wasm module failed to compile or instantiate.
    #[error("E101: Failed to load module '{module}': {cause}")]
    ModuleLoad {
        /// The module that failed to load.
        module: String,
        /// Reason for the failure.
        cause: String,
    },

    /// A guest export call failed.
    #[error("E102: Guest call '{export}' failed: {cause}")]
    GuestCall {
        /// The export being invoked.
        export: String,
        /// Reason for the failure.
        cause: String,
    },

    /// A required guest export is missing or has the wrong shape.
    #[error("E103: Guest module does not export '{export}'")]
    MissingExport {
        /// Name of the missing export.
        export: String,
    },

    /// A host callback key is no longer registered.
    #[error("E104: Host callback {key} is not registered")]
    CallbackGone {
        /// The stale callback key.
        key: u32,
    },

    // =========================================================================
    // I/O errors (E901-E999)
    // =========================================================================
    /// File I/O error.
    #[error("E901: I/O error at {path}: {cause}")]
    Io {
        /// The path where the I/O error occurred.
        path: PathBuf,
        /// Description of the I/O error.
        cause: String,
    },
}

impl IplError {
    /// Get the stable error code (e.g. "E001").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedType { .. } => "E001",
            Self::UnknownVariant { .. } => "E002",
            Self::WrongOrigin { .. } => "E003",
            Self::MemoryFault { .. } => "E004",
            Self::AllocationFailure { .. } => "E005",
            Self::JsonFailure { .. } => "E006",
            Self::SectionOverflow { .. } => "E007",
            Self::InvalidString { .. } => "E008",
            Self::NestingTooDeep { .. } => "E009",
            Self::ModuleLoad { .. } => "E101",
            Self::GuestCall { .. } => "E102",
            Self::MissingExport { .. } => "E103",
            Self::CallbackGone { .. } => "E104",
            Self::Io { .. } => "E901",
        }
    }

    /// Check if this error was produced while decoding guest data.
    ///
    /// Decode errors indicate the guest emitted a malformed value; the host
    /// side of the exchange is not at fault.
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownVariant { .. }
                | Self::MemoryFault { .. }
                | Self::JsonFailure { .. }
                | Self::InvalidString { .. }
                | Self::NestingTooDeep { .. }
                | Self::CallbackGone { .. }
        )
    }
}

/// Result type alias using `IplError`.
pub type Result<T> = std::result::Result<T, IplError>;
