//! Bridge instance construction and the host-side call wrapper.
//!
//! A [`Bridge`] wraps one instantiated guest module. Every function export
//! other than the reserved ABI surface (`alloc`, `free`, `memory`, `call`)
//! is callable through [`Bridge::invoke`] with ordinary [`Value`] arguments;
//! the wrapper encodes arguments, flattens them into `i64` halves, calls the
//! export, decodes the return, and frees every transient allocation.

use crate::codec;
use crate::free;
use crate::host::{create_linker, HostState};
use crate::memory::{AllocStats, MemoryBridge};
use crate::runtime::Runtime;
use ipl_core::{FuncValue, IplError, IplValue, Origin, Result, Value};
use std::path::Path;
use wasmtime::{ExternType, Instance, Module, Store, TypedFunc, Val, ValType};

/// Export names the bridge consumes internally; never exposed as methods.
pub const RESERVED_EXPORTS: [&str; 4] = ["alloc", "free", "memory", "call"];

/// One instantiated guest module with its call surface.
pub struct Bridge {
    store: Store<HostState>,
    instance: Instance,
    memory: MemoryBridge,
    /// The guest `call(fn, args)` dispatcher, if the module exports one.
    dispatch: Option<TypedFunc<(i64, i64, i64, i64), (i64, i64)>>,
    /// Non-reserved function exports, in module order.
    exports: Vec<String>,
}

impl Bridge {
    /// Instantiate a guest module from raw bytes.
    pub fn from_bytes(runtime: &Runtime, name: &str, bytes: &[u8]) -> Result<Self> {
        let module = runtime.compile(name, bytes)?;
        Self::instantiate(runtime, name, module.module())
    }

    /// Instantiate a guest module loaded from a file.
    pub fn from_file(runtime: &Runtime, path: &Path) -> Result<Self> {
        let module = runtime.compile_file(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("guest");
        Self::instantiate(runtime, name, module.module())
    }

    fn instantiate(runtime: &Runtime, name: &str, module: &Module) -> Result<Self> {
        let mut store = Store::new(runtime.engine(), HostState::new());
        let linker = create_linker(runtime.engine())?;

        let instance =
            linker
                .instantiate(&mut store, module)
                .map_err(|e| IplError::ModuleLoad {
                    module: name.to_string(),
                    cause: e.to_string(),
                })?;

        let memory = MemoryBridge::from_instance(&mut store, &instance)?;
        let dispatch = instance
            .get_typed_func::<(i64, i64, i64, i64), (i64, i64)>(&mut store, "call")
            .ok();

        let exports = module
            .exports()
            .filter(|e| {
                matches!(e.ty(), ExternType::Func(_)) && !RESERVED_EXPORTS.contains(&e.name())
            })
            .map(|e| e.name().to_string())
            .collect();

        Ok(Self {
            store,
            instance,
            memory,
            dispatch,
            exports,
        })
    }

    /// Names of the guest exports callable through [`Bridge::invoke`].
    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    /// Invoke a guest export with positional arguments.
    ///
    /// Arguments are encoded left to right, passed as two `i64` halves
    /// each, and freed once the call returns; the guest must copy anything
    /// it wants to keep. The decoded return value's allocations are freed
    /// after it is materialised.
    ///
    /// # Errors
    /// Surfaces encode and decode failures, guest traps as
    /// [`IplError::GuestCall`], and typed bridge errors raised inside host
    /// imports (e.g. [`IplError::WrongOrigin`]).
    pub fn invoke(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        if RESERVED_EXPORTS.contains(&name) {
            return Err(IplError::GuestCall {
                export: name.to_string(),
                cause: "reserved export".to_string(),
            });
        }

        let func = self
            .instance
            .get_func(&mut self.store, name)
            .ok_or_else(|| IplError::MissingExport {
                export: name.to_string(),
            })?;

        let ty = func.ty(&self.store);
        if ty.params().len() != args.len() * 2
            || ty.params().any(|t| !matches!(t, ValType::I64))
        {
            return Err(IplError::GuestCall {
                export: name.to_string(),
                cause: format!(
                    "export takes {} wasm parameters, {} arguments supplied",
                    ty.params().len(),
                    args.len()
                ),
            });
        }
        if ty.results().len() != 2 || ty.results().any(|t| !matches!(t, ValType::I64)) {
            return Err(IplError::GuestCall {
                export: name.to_string(),
                cause: "export must return two i64 halves".to_string(),
            });
        }

        // Encode arguments left to right; on failure free what landed.
        let mut encoded: Vec<IplValue> = Vec::with_capacity(args.len());
        for arg in args {
            match codec::encode(&mut self.store, &self.memory, arg) {
                Ok(v) => encoded.push(v),
                Err(e) => {
                    self.free_encoded(&encoded);
                    return Err(e);
                }
            }
        }

        let mut params = Vec::with_capacity(args.len() * 2);
        for v in &encoded {
            let (lo, hi) = v.to_halves();
            params.push(Val::I64(lo as i64));
            params.push(Val::I64(hi as i64));
        }

        tracing::debug!(export = name, args = args.len(), "invoking guest export");

        let mut results = [Val::I64(0), Val::I64(0)];
        if let Err(e) = func.call(&mut self.store, &params, &mut results) {
            self.free_encoded(&encoded);
            return Err(into_bridge_error(e, name));
        }

        let ret = match (&results[0], &results[1]) {
            (Val::I64(lo), Val::I64(hi)) => IplValue::from_halves(*lo as u64, *hi as u64),
            _ => {
                self.free_encoded(&encoded);
                return Err(IplError::GuestCall {
                    export: name.to_string(),
                    cause: "export returned non-i64 results".to_string(),
                });
            }
        };

        // Materialise the return first, then free the arguments, then the
        // return's own allocations. A return that fails to decode is left
        // in place: its bits cannot be trusted enough to walk.
        let decoded = codec::decode(&mut self.store, &self.memory, ret);
        self.free_encoded(&encoded);
        let decoded = decoded?;
        free::free(&mut self.store, &self.memory, ret)?;

        Ok(decoded)
    }

    /// Invoke a function value obtained from the guest (or a host callback).
    ///
    /// A guest-origin function routes through the guest's exported
    /// `call(fn, args)` dispatcher with the arguments packed as one array
    /// value; a host-origin function dispatches straight to the stored
    /// callback.
    pub fn call_function(&mut self, func: &FuncValue, args: &[Value]) -> Result<Value> {
        match func {
            FuncValue::Host(f) => f.call(args),
            FuncValue::Guest(g) => {
                let dispatch = self.dispatch.clone().ok_or_else(|| IplError::MissingExport {
                    export: "call".to_string(),
                })?;

                let fn_ipl = IplValue::from_function(Origin::Guest, g.ptr())?;
                let args_ipl =
                    codec::encode(&mut self.store, &self.memory, &Value::Array(args.to_vec()))?;

                let (fn_lo, fn_hi) = fn_ipl.to_halves();
                let (args_lo, args_hi) = args_ipl.to_halves();

                let ret = match dispatch.call(
                    &mut self.store,
                    (fn_lo as i64, fn_hi as i64, args_lo as i64, args_hi as i64),
                ) {
                    Ok((lo, hi)) => IplValue::from_halves(lo as u64, hi as u64),
                    Err(e) => {
                        self.free_encoded(&[args_ipl]);
                        return Err(into_bridge_error(e, "call"));
                    }
                };

                let decoded = codec::decode(&mut self.store, &self.memory, ret);
                self.free_encoded(&[args_ipl]);
                let decoded = decoded?;
                free::free(&mut self.store, &self.memory, ret)?;

                Ok(decoded)
            }
        }
    }

    /// Encode a host value into guest memory (low-level surface).
    ///
    /// The caller owns the result and must release it with
    /// [`Bridge::free_value`].
    pub fn encode_value(&mut self, value: &Value) -> Result<IplValue> {
        codec::encode(&mut self.store, &self.memory, value)
    }

    /// Decode an interchange value out of guest memory (low-level surface).
    pub fn decode_value(&mut self, value: IplValue) -> Result<Value> {
        codec::decode(&mut self.store, &self.memory, value)
    }

    /// Release everything an encoded value refers to (low-level surface).
    pub fn free_value(&mut self, value: IplValue) -> Result<()> {
        free::free(&mut self.store, &self.memory, value)
    }

    /// Allocator traffic the host has driven through the bridge.
    pub fn alloc_stats(&self) -> AllocStats {
        self.store.data().stats()
    }

    /// Number of live host-callback registrations.
    pub fn callback_count(&self) -> usize {
        self.store.data().callbacks().len()
    }

    fn free_encoded(&mut self, encoded: &[IplValue]) {
        for value in encoded {
            if let Err(e) = free::free(&mut self.store, &self.memory, *value) {
                tracing::warn!(error = %e, "failed to free encoded value");
            }
        }
    }
}

/// Map a wasmtime error back to a typed bridge error where possible.
fn into_bridge_error(err: wasmtime::Error, export: &str) -> IplError {
    match err.downcast::<IplError>() {
        Ok(e) => e,
        Err(e) => IplError::GuestCall {
            export: export.to_string(),
            cause: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names() {
        for name in ["alloc", "free", "memory", "call"] {
            assert!(RESERVED_EXPORTS.contains(&name));
        }
        assert!(!RESERVED_EXPORTS.contains(&"greet"));
    }
}
