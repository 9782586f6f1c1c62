//! Value codec: host values to interchange values and back.
//!
//! Encoding may allocate in guest linear memory (bytes-like payloads and
//! array bodies) and may register host callbacks; everything it produces is
//! reclaimed later by [`crate::free`]. Encoding is transactional: if a
//! compound value fails partway, the parts already encoded are freed before
//! the error is returned.
//!
//! Decoding always copies payload bytes out of linear memory; a decoded
//! buffer never aliases the guest allocation, which may be freed as soon as
//! the call completes.

use crate::free;
use crate::host::HostState;
use crate::memory::{GuestSlice, MemoryBridge};
use ipl_core::{
    FuncValue, GuestFn, IplError, IplValue, Origin, Result, Tag, Value, SLOT_BYTES,
};
use wasmtime::AsContextMut;

/// Maximum array nesting the decoder will follow before giving up.
const MAX_ARRAY_DEPTH: u32 = 64;

/// Required alignment of an array body in linear memory.
const ARRAY_ALIGN: u32 = 8;

/// Encode a host value into an interchange value.
///
/// Bytes-like payloads and array bodies are copied into guest memory via
/// the guest allocator; host callbacks are registered and travel as keys.
///
/// # Errors
/// Returns [`IplError::UnsupportedType`] for out-of-range integers,
/// [`IplError::AllocationFailure`] if the guest allocator fails, and
/// [`IplError::JsonFailure`] if JSON serialisation fails.
pub fn encode<C: AsContextMut<Data = HostState>>(
    ctx: &mut C,
    bridge: &MemoryBridge,
    value: &Value,
) -> Result<IplValue> {
    match value {
        Value::Void => Ok(IplValue::VOID),
        Value::Bool(v) => Ok(IplValue::from_bool(*v)),
        Value::Int(v) => IplValue::from_int(*v),
        Value::Uint(v) => IplValue::from_uint(*v),
        Value::Float(v) => Ok(IplValue::from_float(*v)),
        Value::Bytes(data) => encode_payload(ctx, bridge, Tag::Bytes, data),
        Value::String(s) => encode_payload(ctx, bridge, Tag::String, s.as_bytes()),
        Value::Json(json) => {
            let data = serde_json::to_vec(json).map_err(|e| IplError::JsonFailure {
                cause: e.to_string(),
            })?;
            encode_payload(ctx, bridge, Tag::Json, &data)
        }
        Value::Function(FuncValue::Guest(g)) => {
            // A function previously decoded from the guest keeps its
            // original wire bits; no registration happens.
            IplValue::from_function(Origin::Guest, g.ptr())
        }
        Value::Function(FuncValue::Host(f)) => {
            let key = ctx.as_context_mut().data_mut().callbacks.insert(f.clone());
            IplValue::from_function(Origin::Host, key)
        }
        Value::Array(items) => encode_array(ctx, bridge, items),
    }
}

/// Copy a bytes-like payload into guest memory and wrap it under `tag`.
fn encode_payload<C: AsContextMut<Data = HostState>>(
    ctx: &mut C,
    bridge: &MemoryBridge,
    tag: Tag,
    data: &[u8],
) -> Result<IplValue> {
    let slice = bridge.copy_to_guest(&mut *ctx, data)?;
    IplValue::from_ptr_len(tag, slice.ptr, slice.len)
}

fn encode_array<C: AsContextMut<Data = HostState>>(
    ctx: &mut C,
    bridge: &MemoryBridge,
    items: &[Value],
) -> Result<IplValue> {
    // An empty array carries no allocation at all.
    if items.is_empty() {
        return Ok(IplValue::from_parts(Tag::Array, 0));
    }

    let count = u32::try_from(items.len()).map_err(|_| IplError::UnsupportedType {
        type_name: "array".to_string(),
        cause: format!("{} elements exceed the length field", items.len()),
    })?;
    let total = count
        .checked_mul(SLOT_BYTES)
        .ok_or_else(|| IplError::UnsupportedType {
            type_name: "array".to_string(),
            cause: format!("{} elements exceed the length field", items.len()),
        })?;

    let ptr = bridge.allocate(&mut *ctx, total)?;
    if ptr % ARRAY_ALIGN != 0 {
        let size = bridge.data_size(&mut *ctx);
        let _ = bridge.release(&mut *ctx, ptr, total);
        return Err(IplError::MemoryFault {
            ptr,
            len: total,
            size,
        });
    }

    let mut encoded: Vec<IplValue> = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let element = match encode(ctx, bridge, item) {
            Ok(v) => v,
            Err(e) => {
                roll_back(ctx, bridge, &encoded, ptr, total);
                return Err(e);
            }
        };

        let (lo, hi) = element.to_halves();
        let mut slot = [0u8; SLOT_BYTES as usize];
        slot[..8].copy_from_slice(&lo.to_le_bytes());
        slot[8..].copy_from_slice(&hi.to_le_bytes());

        if let Err(e) = bridge.write_at(&mut *ctx, ptr + i as u32 * SLOT_BYTES, &slot) {
            let _ = free::free(ctx, bridge, element);
            roll_back(ctx, bridge, &encoded, ptr, total);
            return Err(e);
        }
        encoded.push(element);
    }

    IplValue::from_ptr_len(Tag::Array, ptr, count)
}

/// Undo a partially encoded array: free landed elements, then the body.
fn roll_back<C: AsContextMut<Data = HostState>>(
    ctx: &mut C,
    bridge: &MemoryBridge,
    encoded: &[IplValue],
    ptr: u32,
    total: u32,
) {
    for element in encoded {
        if let Err(e) = free::free(ctx, bridge, *element) {
            tracing::warn!(error = %e, "failed to roll back encoded array element");
        }
    }
    if let Err(e) = bridge.release(&mut *ctx, ptr, total) {
        tracing::warn!(error = %e, "failed to roll back array body");
    }
}

/// Decode an interchange value into a host value.
///
/// Payload bytes are copied out of guest memory; the result owns its data.
///
/// # Errors
/// Returns [`IplError::UnknownVariant`] for tags outside the variant set,
/// [`IplError::MemoryFault`] for out-of-bounds payloads,
/// [`IplError::InvalidString`] / [`IplError::JsonFailure`] for malformed
/// text payloads, and [`IplError::CallbackGone`] for a stale callback key.
pub fn decode<C: AsContextMut<Data = HostState>>(
    ctx: &mut C,
    bridge: &MemoryBridge,
    value: IplValue,
) -> Result<Value> {
    decode_at_depth(ctx, bridge, value, 0)
}

fn decode_at_depth<C: AsContextMut<Data = HostState>>(
    ctx: &mut C,
    bridge: &MemoryBridge,
    value: IplValue,
    depth: u32,
) -> Result<Value> {
    match value.tag()? {
        Tag::Void => Ok(Value::Void),
        Tag::Bool => Ok(Value::Bool(value.as_bool())),
        Tag::Int => Ok(Value::Int(value.as_int())),
        Tag::Uint => Ok(Value::Uint(value.as_uint())),
        Tag::Float => Ok(Value::Float(value.as_float())),
        Tag::Bytes => Ok(Value::Bytes(read_payload(ctx, bridge, value)?)),
        Tag::String => {
            let bytes = read_payload(ctx, bridge, value)?;
            String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|e| IplError::InvalidString {
                    cause: e.to_string(),
                })
        }
        Tag::Json => {
            let bytes = read_payload(ctx, bridge, value)?;
            serde_json::from_slice(&bytes)
                .map(Value::Json)
                .map_err(|e| IplError::JsonFailure {
                    cause: e.to_string(),
                })
        }
        Tag::Function => {
            let (origin, ptr) = value.function_parts()?;
            match origin {
                Origin::Guest => Ok(Value::Function(FuncValue::Guest(GuestFn::new(ptr)))),
                Origin::Host => {
                    let callback = ctx
                        .as_context()
                        .data()
                        .callbacks
                        .get(ptr)
                        .cloned()
                        .ok_or(IplError::CallbackGone { key: ptr })?;
                    Ok(Value::Function(FuncValue::Host(callback)))
                }
            }
        }
        Tag::Array => decode_array(ctx, bridge, value, depth),
    }
}

fn decode_array<C: AsContextMut<Data = HostState>>(
    ctx: &mut C,
    bridge: &MemoryBridge,
    value: IplValue,
    depth: u32,
) -> Result<Value> {
    // An empty array never touches memory, even at offset 0.
    if value.detail() == 0 {
        return Ok(Value::Array(Vec::new()));
    }
    if depth >= MAX_ARRAY_DEPTH {
        return Err(IplError::NestingTooDeep {
            limit: MAX_ARRAY_DEPTH,
        });
    }

    let (ptr, len) = value.ptr_len()?;
    if len == 0 {
        return Ok(Value::Array(Vec::new()));
    }

    let size = bridge.data_size(&mut *ctx);
    if ptr % ARRAY_ALIGN != 0 {
        return Err(IplError::MemoryFault { ptr, len, size });
    }
    let total = len
        .checked_mul(SLOT_BYTES)
        .ok_or(IplError::MemoryFault { ptr, len, size })?;

    let raw = bridge.read_at(&mut *ctx, ptr, total)?;
    let mut items = Vec::with_capacity(len as usize);
    for slot in raw.chunks_exact(SLOT_BYTES as usize) {
        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        lo.copy_from_slice(&slot[..8]);
        hi.copy_from_slice(&slot[8..]);
        let element = IplValue::from_halves(u64::from_le_bytes(lo), u64::from_le_bytes(hi));
        items.push(decode_at_depth(ctx, bridge, element, depth + 1)?);
    }
    Ok(Value::Array(items))
}

fn read_payload<C: AsContextMut<Data = HostState>>(
    ctx: &mut C,
    bridge: &MemoryBridge,
    value: IplValue,
) -> Result<Vec<u8>> {
    let (ptr, len) = value.ptr_len()?;
    bridge.copy_from_guest(&mut *ctx, GuestSlice::new(ptr, len))
}
