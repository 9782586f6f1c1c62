//! Reclamation of allocations produced by encoding.

use crate::host::HostState;
use crate::memory::MemoryBridge;
use ipl_core::{IplError, IplValue, Origin, Result, Tag, SLOT_BYTES};
use wasmtime::AsContextMut;

/// Recursively reclaim everything an interchange value refers to.
///
/// Scalars carry no allocation; bytes-like values release their payload;
/// host-origin functions drop their registry slot; arrays free each element
/// and then the body. The walk interprets nothing beyond what the tag
/// prescribes, so it is safe to run after a failed guest call as long as
/// the value is one the encoder emitted.
///
/// # Errors
/// Returns [`IplError::GuestCall`] if the guest `free` export traps, and
/// decode-side errors if an array body cannot be read back.
pub fn free<C: AsContextMut<Data = HostState>>(
    ctx: &mut C,
    bridge: &MemoryBridge,
    value: IplValue,
) -> Result<()> {
    match value.tag()? {
        Tag::Void | Tag::Bool | Tag::Int | Tag::Uint | Tag::Float => Ok(()),
        Tag::Bytes | Tag::String | Tag::Json => {
            let (ptr, len) = value.ptr_len()?;
            if len > 0 {
                bridge.release(&mut *ctx, ptr, len)?;
            }
            Ok(())
        }
        Tag::Function => {
            let (origin, key) = value.function_parts()?;
            if origin == Origin::Host
                && ctx
                    .as_context_mut()
                    .data_mut()
                    .callbacks
                    .remove(key)
                    .is_none()
            {
                tracing::debug!(key, "freed function value had no live registration");
            }
            Ok(())
        }
        Tag::Array => {
            if value.detail() == 0 {
                return Ok(());
            }
            let (ptr, len) = value.ptr_len()?;
            if len == 0 {
                return Ok(());
            }

            let total = len.checked_mul(SLOT_BYTES).ok_or(IplError::MemoryFault {
                ptr,
                len,
                size: bridge.data_size(&mut *ctx),
            })?;

            let raw = bridge.read_at(&mut *ctx, ptr, total)?;
            for slot in raw.chunks_exact(SLOT_BYTES as usize) {
                let mut lo = [0u8; 8];
                let mut hi = [0u8; 8];
                lo.copy_from_slice(&slot[..8]);
                hi.copy_from_slice(&slot[8..]);
                free(
                    ctx,
                    bridge,
                    IplValue::from_halves(u64::from_le_bytes(lo), u64::from_le_bytes(hi)),
                )?;
            }
            bridge.release(&mut *ctx, ptr, total)
        }
    }
}
