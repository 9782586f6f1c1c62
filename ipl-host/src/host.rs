//! Host imports supplied to the guest.
//!
//! Guest modules import two entry points from the `js` namespace: `log`,
//! which writes a decoded value to the host log sink, and `call`, which
//! routes a function value back to a registered host callback. Both receive
//! interchange values as pairs of `i64` halves.

use crate::codec;
use crate::memory::{AllocStats, MemoryBridge};
use crate::registry::CallbackRegistry;
use ipl_core::{FuncValue, IplError, IplValue, Origin, Result, Value};
use wasmtime::{Caller, Engine, Linker};

/// Import namespace guest modules link their host entry points from.
pub const IMPORT_NAMESPACE: &str = "js";

/// State available to host imports during guest execution.
///
/// Lives in the wasmtime store, so every import invocation and every
/// encode/decode sees the same callback registry and allocator counters.
#[derive(Default)]
pub struct HostState {
    /// Host callbacks invocable from the guest.
    pub(crate) callbacks: CallbackRegistry,
    /// Allocator traffic driven through the memory bridge.
    pub(crate) stats: AllocStats,
}

impl HostState {
    /// Create fresh state for one bridge instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the callback registry.
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Get the allocator counters.
    pub fn stats(&self) -> AllocStats {
        self.stats
    }
}

/// Register the `js` namespace imports with a Wasmtime linker.
pub fn register_host_imports(linker: &mut Linker<HostState>) -> Result<()> {
    // log(lo, hi): decode one value and write it to the log sink. Strings
    // go through verbatim; other variants are stringified best-effort.
    linker
        .func_wrap(
            IMPORT_NAMESPACE,
            "log",
            |mut caller: Caller<'_, HostState>, lo: i64, hi: i64| -> wasmtime::Result<()> {
                let bridge = MemoryBridge::from_caller(&mut caller)?;
                let value = codec::decode(
                    &mut caller,
                    &bridge,
                    IplValue::from_halves(lo as u64, hi as u64),
                )?;
                match &value {
                    Value::String(msg) => tracing::info!("[guest] {}", msg),
                    other => tracing::info!("[guest] {}", other),
                }
                Ok(())
            },
        )
        .map_err(|e| IplError::ModuleLoad {
            module: "js.log".to_string(),
            cause: e.to_string(),
        })?;

    // call(fn_lo, fn_hi, args_lo, args_hi) -> (lo, hi): invoke a host
    // callback with a decoded argument array, returning the encoded result.
    linker
        .func_wrap(
            IMPORT_NAMESPACE,
            "call",
            |mut caller: Caller<'_, HostState>,
             fn_lo: i64,
             fn_hi: i64,
             args_lo: i64,
             args_hi: i64|
             -> wasmtime::Result<(i64, i64)> {
                let bridge = MemoryBridge::from_caller(&mut caller)?;

                let func = codec::decode(
                    &mut caller,
                    &bridge,
                    IplValue::from_halves(fn_lo as u64, fn_hi as u64),
                )?;
                let callback = match func {
                    Value::Function(FuncValue::Host(f)) => f,
                    Value::Function(FuncValue::Guest(_)) => {
                        return Err(IplError::WrongOrigin {
                            expected: Origin::Host,
                            found: Origin::Guest,
                        }
                        .into());
                    }
                    other => {
                        return Err(IplError::GuestCall {
                            export: "js.call".to_string(),
                            cause: format!("expected a function value, got {}", other.tag()),
                        }
                        .into());
                    }
                };

                let args = codec::decode(
                    &mut caller,
                    &bridge,
                    IplValue::from_halves(args_lo as u64, args_hi as u64),
                )?;
                let args = match args {
                    Value::Array(items) => items,
                    other => {
                        return Err(IplError::GuestCall {
                            export: "js.call".to_string(),
                            cause: format!("expected an argument array, got {}", other.tag()),
                        }
                        .into());
                    }
                };

                let result = callback.call(&args)?;

                // The encoded result lands in guest memory; the guest owns
                // it from here and must copy or free it itself.
                let encoded = codec::encode(&mut caller, &bridge, &result)?;
                let (lo, hi) = encoded.to_halves();
                Ok((lo as i64, hi as i64))
            },
        )
        .map_err(|e| IplError::ModuleLoad {
            module: "js.call".to_string(),
            cause: e.to_string(),
        })?;

    Ok(())
}

/// Create a linker with the host imports registered.
pub fn create_linker(engine: &Engine) -> Result<Linker<HostState>> {
    let mut linker = Linker::new(engine);
    register_host_imports(&mut linker)?;
    Ok(linker)
}
