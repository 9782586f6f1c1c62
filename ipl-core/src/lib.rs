//! IPL Core Library
//!
//! This crate provides the wire-format model for the IPL bridge: the tagged
//! 128-bit interchange value exchanged between a host and a WebAssembly
//! guest, and the dynamic host-side value it encodes.
//!
//! # Overview
//!
//! An interchange value is a 128-bit word carrying a 4-bit variant tag and a
//! 124-bit variant payload. It crosses the wasm call boundary as two `i64`
//! halves, so a guest export taking one logical argument takes two `i64`
//! parameters. Payloads that do not fit inline (byte buffers, strings, JSON
//! documents, arrays) live in guest linear memory and are referenced by a
//! `(ptr, len)` pair packed into the payload.
//!
//! # Key components
//!
//! - [`Tag`]: the closed set of ten variant tags
//! - [`bits`]: the bit-section codec used to pack and extract payload fields
//! - [`IplValue`]: the raw 128-bit tagged word
//! - [`Value`]: the decoded, host-side dynamic value
//! - [`IplError`]: strongly-typed errors with stable codes
//!
//! This crate is deliberately runtime-agnostic: nothing here depends on a
//! wasm engine. The `ipl-host` crate supplies the wasmtime embedding.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bits;
pub mod error;
pub mod ipl;
pub mod tag;
pub mod value;

pub use error::{IplError, Result};
pub use ipl::{IplValue, Origin, DETAIL_BITS, SLOT_BYTES, TAG_BITS};
pub use tag::Tag;
pub use value::{FuncValue, GuestFn, HostFn, Value};
