//! Dynamic host-side values.
//!
//! A [`Value`] is what host code hands to the bridge and what a decoded
//! interchange value materialises into. The variant set mirrors the wire
//! tags one-to-one.

use crate::error::Result;
use crate::tag::Tag;
use std::fmt;
use std::sync::Arc;

/// A dynamic value exchanged with the guest.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Void,
    /// Boolean.
    Bool(bool),
    /// Signed integer, representable in 124 bits of two's complement.
    Int(i128),
    /// Unsigned integer, representable in 124 bits.
    Uint(u128),
    /// IEEE-754 binary64 float.
    Float(f64),
    /// Raw byte buffer.
    Bytes(Vec<u8>),
    /// UTF-8 string.
    String(String),
    /// Structured data carried as canonical JSON.
    Json(serde_json::Value),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Callable reference, guest- or host-owned.
    Function(FuncValue),
}

impl Value {
    /// Get the wire tag this value encodes under.
    #[must_use]
    pub fn tag(&self) -> Tag {
        match self {
            Self::Void => Tag::Void,
            Self::Bool(_) => Tag::Bool,
            Self::Int(_) => Tag::Int,
            Self::Uint(_) => Tag::Uint,
            Self::Float(_) => Tag::Float,
            Self::Bytes(_) => Tag::Bytes,
            Self::String(_) => Tag::String,
            Self::Json(_) => Tag::Json,
            Self::Array(_) => Tag::Array,
            Self::Function(_) => Tag::Function,
        }
    }

    /// Wrap a host closure as a callable value.
    ///
    /// The closure is registered with the guest-facing callback registry
    /// when the value is encoded, and released again when the encoded value
    /// is freed after the call completes.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Function(FuncValue::Host(HostFn::new(f)))
    }

    /// Check if this is the absent value.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }
}

impl fmt::Display for Value {
    /// Best-effort stringification, used by the guest-visible log sink.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Uint(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::String(s) => write!(f, "{}", s),
            Self::Json(j) => write!(f, "{}", j),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Function(func) => write!(f, "{}", func),
        }
    }
}

/// A callable reference carried by a [`Value::Function`].
#[derive(Debug, Clone)]
pub enum FuncValue {
    /// A guest function; re-encoding emits the original wire bits.
    Guest(GuestFn),
    /// A host callback, shared so a decoded copy stays callable.
    Host(HostFn),
}

impl PartialEq for FuncValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Guest(a), Self::Guest(b)) => a == b,
            (Self::Host(a), Self::Host(b)) => a.same(b),
            _ => false,
        }
    }
}

impl fmt::Display for FuncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guest(g) => write!(f, "<guest fn @{}>", g.ptr()),
            Self::Host(_) => write!(f, "<host fn>"),
        }
    }
}

/// Reference to a guest function trampoline in linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuestFn {
    ptr: u32,
}

impl GuestFn {
    /// Create a reference from a trampoline address.
    #[must_use]
    pub const fn new(ptr: u32) -> Self {
        Self { ptr }
    }

    /// Get the trampoline address.
    #[must_use]
    pub const fn ptr(self) -> u32 {
        self.ptr
    }
}

/// A host callback invocable from the guest.
#[derive(Clone)]
pub struct HostFn(Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>);

impl HostFn {
    /// Wrap a closure as a host callback.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the callback with positional arguments.
    ///
    /// # Errors
    /// Propagates whatever the callback returns.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.0)(args)
    }

    /// Check if two handles share one underlying callback.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostFn")
    }
}

// Conversions from native host types. Signed integers route on sign so the
// full 124-bit payload range stays available in each direction.

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::from(v as i128)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::from(v as i128)
    }
}

impl From<i128> for Value {
    fn from(v: i128) -> Self {
        if v < 0 {
            Self::Int(v)
        } else {
            Self::Uint(v as u128)
        }
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Uint(v as u128)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Uint(v as u128)
    }
}

impl From<u128> for Value {
    fn from(v: u128) -> Self {
        Self::Uint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}
