//! IPL Host Library
//!
//! Wasmtime embedding of the IPL value-interchange bridge. A [`Bridge`]
//! wraps one instantiated guest module and exposes its exports as callable
//! host-side methods taking and returning dynamic [`Value`]s, hiding the
//! linear-memory pointers, lengths, and two-`i64`-halves calling convention
//! the wire format prescribes.
//!
//! # Architecture
//!
//! - [`Runtime`]: engine configuration, module compilation, and caching
//! - [`MemoryBridge`]: data transfer through the guest allocator
//! - [`codec`]: encoding host values into linear memory and decoding them back
//! - [`CallbackRegistry`]: integer-keyed host callbacks invocable by the guest
//! - [`free`](free()): reclamation of the allocations a call produced
//! - [`Bridge`]: instance construction and the call wrapper
//!
//! # Guest ABI contract
//!
//! Guest modules must export:
//!
//! ```text
//! memory: Memory
//! alloc(len: i32) -> i32            // allocate, return ptr (0 on failure)
//! free(ptr: i32, len: i32)          // release a prior allocation
//! call(fn: 2xi64, args: 2xi64) -> 2xi64   // guest-side function dispatcher
//! ```
//!
//! Every other function export is callable through [`Bridge::invoke`] and
//! must take two `i64` parameters per logical argument and return two
//! `i64`s (zeroes for a void return).
//!
//! Guests can import from the `js` namespace:
//!
//! ```text
//! log(lo: i64, hi: i64)                       // write a value to the log sink
//! call(fn: 2xi64, args: 2xi64) -> 2xi64      // invoke a host callback
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ipl_host::{Bridge, Runtime, Value};
//!
//! let runtime = Runtime::with_defaults()?;
//! let mut bridge = Bridge::from_file(&runtime, "guest.wasm".as_ref())?;
//!
//! let reply = bridge.invoke("greet", &[Value::from("Daniel")])?;
//! assert_eq!(reply, Value::from("Hello Daniel!"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
mod free;
pub mod host;
pub mod instance;
pub mod memory;
pub mod registry;
pub mod runtime;

pub use free::free;
pub use host::{create_linker, register_host_imports, HostState, IMPORT_NAMESPACE};
pub use instance::{Bridge, RESERVED_EXPORTS};
pub use memory::{AllocStats, GuestSlice, MemoryBridge};
pub use registry::CallbackRegistry;
pub use runtime::{CompiledModule, Runtime, RuntimeConfig};

// Re-export the wire-format model so downstream code needs one import path.
pub use ipl_core::{
    FuncValue, GuestFn, HostFn, IplError, IplValue, Origin, Result, Tag, Value,
};
