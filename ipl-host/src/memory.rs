//! Memory bridge for host <-> guest data transfer.
//!
//! All payload bytes move through the guest's own allocator: the host calls
//! the exported `alloc`/`free` pair and copies through the exported linear
//! memory. Data read out of the guest is always copied, never aliased,
//! because the backing allocation may be freed once the call completes.

use crate::host::HostState;
use ipl_core::{IplError, Result};
use wasmtime::{AsContextMut, Caller, Extern, Instance, Memory, TypedFunc};

/// A `(ptr, len)` pair into guest linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestSlice {
    /// Byte offset within linear memory.
    pub ptr: u32,
    /// Length in bytes.
    pub len: u32,
}

impl GuestSlice {
    /// Create a new guest slice.
    pub const fn new(ptr: u32, len: u32) -> Self {
        Self { ptr, len }
    }

    /// Create the null slice (`ptr = 0, len = 0`), denoting no allocation.
    pub const fn null() -> Self {
        Self { ptr: 0, len: 0 }
    }

    /// Check if this is the null slice.
    pub const fn is_null(&self) -> bool {
        self.ptr == 0 && self.len == 0
    }

    /// Get the exclusive end offset, widened so it cannot wrap.
    pub const fn end(&self) -> u64 {
        self.ptr as u64 + self.len as u64
    }
}

/// Counters for allocator traffic driven through the bridge.
///
/// Guest-internal allocations (e.g. a return buffer the guest builds for
/// itself) do not pass through the bridge and are not counted here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Number of successful `alloc` calls issued by the host.
    pub allocs: u64,
    /// Number of `free` calls issued by the host.
    pub frees: u64,
}

impl AllocStats {
    /// Allocations the host has made and not yet released.
    pub fn outstanding(&self) -> i64 {
        self.allocs as i64 - self.frees as i64
    }
}

/// Bridge for memory operations between host and guest.
///
/// Holds handles to the guest's `memory`, `alloc`, and `free` exports; the
/// handles are store-independent, so one bridge serves both direct calls
/// and reentrant calls made from inside a host import.
#[derive(Clone)]
pub struct MemoryBridge {
    /// Guest linear memory.
    memory: Memory,
    /// Guest allocation function: `alloc(len: u32) -> u32`.
    alloc: TypedFunc<u32, u32>,
    /// Guest release function: `free(ptr: u32, len: u32)`.
    free: TypedFunc<(u32, u32), ()>,
}

impl MemoryBridge {
    /// Resolve the bridge from an instantiated guest module.
    pub fn from_instance(
        mut ctx: impl AsContextMut<Data = HostState>,
        instance: &Instance,
    ) -> Result<Self> {
        let memory = instance
            .get_memory(&mut ctx, "memory")
            .ok_or_else(|| IplError::MissingExport {
                export: "memory".to_string(),
            })?;

        let alloc = instance
            .get_typed_func::<u32, u32>(&mut ctx, "alloc")
            .map_err(|_| IplError::MissingExport {
                export: "alloc".to_string(),
            })?;

        let free = instance
            .get_typed_func::<(u32, u32), ()>(&mut ctx, "free")
            .map_err(|_| IplError::MissingExport {
                export: "free".to_string(),
            })?;

        Ok(Self {
            memory,
            alloc,
            free,
        })
    }

    /// Resolve the bridge from inside a host import.
    pub fn from_caller(caller: &mut Caller<'_, HostState>) -> Result<Self> {
        let memory = match caller.get_export("memory") {
            Some(Extern::Memory(m)) => m,
            _ => {
                return Err(IplError::MissingExport {
                    export: "memory".to_string(),
                })
            }
        };

        let alloc = match caller.get_export("alloc") {
            Some(Extern::Func(f)) => {
                f.typed::<u32, u32>(&mut *caller)
                    .map_err(|_| IplError::MissingExport {
                        export: "alloc".to_string(),
                    })?
            }
            _ => {
                return Err(IplError::MissingExport {
                    export: "alloc".to_string(),
                })
            }
        };

        let free = match caller.get_export("free") {
            Some(Extern::Func(f)) => f.typed::<(u32, u32), ()>(&mut *caller).map_err(|_| {
                IplError::MissingExport {
                    export: "free".to_string(),
                }
            })?,
            _ => {
                return Err(IplError::MissingExport {
                    export: "free".to_string(),
                })
            }
        };

        Ok(Self {
            memory,
            alloc,
            free,
        })
    }

    /// Get the guest linear memory.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Allocate `len` bytes in guest memory via the guest allocator.
    ///
    /// # Errors
    /// Returns [`IplError::AllocationFailure`] if the allocator traps or
    /// returns a null pointer.
    pub fn allocate(&self, mut ctx: impl AsContextMut<Data = HostState>, len: u32) -> Result<u32> {
        let ptr = self
            .alloc
            .call(&mut ctx, len)
            .map_err(|_| IplError::AllocationFailure { requested: len })?;

        if ptr == 0 {
            return Err(IplError::AllocationFailure { requested: len });
        }

        ctx.as_context_mut().data_mut().stats.allocs += 1;
        Ok(ptr)
    }

    /// Release a prior allocation via the guest allocator.
    ///
    /// # Errors
    /// Returns [`IplError::GuestCall`] if the guest `free` traps.
    pub fn release(
        &self,
        mut ctx: impl AsContextMut<Data = HostState>,
        ptr: u32,
        len: u32,
    ) -> Result<()> {
        self.free
            .call(&mut ctx, (ptr, len))
            .map_err(|e| IplError::GuestCall {
                export: "free".to_string(),
                cause: e.to_string(),
            })?;

        ctx.as_context_mut().data_mut().stats.frees += 1;
        Ok(())
    }

    /// Allocate space in guest memory and copy `data` there.
    ///
    /// Empty data short-circuits to the null slice without allocating.
    pub fn copy_to_guest(
        &self,
        mut ctx: impl AsContextMut<Data = HostState>,
        data: &[u8],
    ) -> Result<GuestSlice> {
        if data.is_empty() {
            return Ok(GuestSlice::null());
        }

        let len = data.len() as u32;
        let ptr = self.allocate(&mut ctx, len)?;
        self.write_at(&mut ctx, ptr, data)?;
        Ok(GuestSlice::new(ptr, len))
    }

    /// Copy a slice of guest memory out into a fresh host buffer.
    ///
    /// The null slice yields an empty buffer without touching memory.
    pub fn copy_from_guest(
        &self,
        ctx: impl AsContextMut<Data = HostState>,
        slice: GuestSlice,
    ) -> Result<Vec<u8>> {
        if slice.is_null() {
            return Ok(Vec::new());
        }

        let data = self.memory.data(&ctx);
        let src = data
            .get(slice.ptr as usize..slice.end() as usize)
            .ok_or(IplError::MemoryFault {
                ptr: slice.ptr,
                len: slice.len,
                size: data.len(),
            })?;

        Ok(src.to_vec())
    }

    /// Write bytes at a specific offset (no allocation).
    pub fn write_at(
        &self,
        mut ctx: impl AsContextMut<Data = HostState>,
        ptr: u32,
        data: &[u8],
    ) -> Result<()> {
        let mem = self.memory.data_mut(&mut ctx);
        let size = mem.len();
        let dest = mem
            .get_mut(ptr as usize..ptr as usize + data.len())
            .ok_or(IplError::MemoryFault {
                ptr,
                len: data.len() as u32,
                size,
            })?;

        dest.copy_from_slice(data);
        Ok(())
    }

    /// Read bytes from a specific offset.
    pub fn read_at(
        &self,
        ctx: impl AsContextMut<Data = HostState>,
        ptr: u32,
        len: u32,
    ) -> Result<Vec<u8>> {
        self.copy_from_guest(ctx, GuestSlice::new(ptr, len))
    }

    /// Get the current size of guest linear memory in bytes.
    pub fn data_size(&self, ctx: impl AsContextMut<Data = HostState>) -> usize {
        self.memory.data_size(&ctx)
    }
}
