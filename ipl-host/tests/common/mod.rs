//! Shared test guest for bridge integration tests.
//!
//! The guest is assembled from WAT so the tests exercise real linear
//! memory and the real two-halves calling convention without shipping a
//! prebuilt module. Its allocator is a bump allocator with a live-count
//! global surfaced through the `liveAllocs` export, which the memory
//! hygiene tests read back through the bridge itself.

#![allow(dead_code)]

use ipl_host::{Bridge, Runtime, Value};

/// Test guest implementing the full ABI surface.
///
/// Wire constants used below (tag in the low 4 bits, payload above it):
/// - uint `n` encodes as `lo = n << 4 | 3`
/// - a `(ptr, len)` payload puts `ptr` at value bits 4-35 and `len` at
///   value bits 36-67, so `len` straddles into the high half
/// - a function value puts its trampoline pointer at value bits 4-35 and
///   the origin bit at value bit 36
pub const GUEST_WAT: &str = r#"
(module
  (import "js" "log" (func $log (param i64 i64)))
  (import "js" "call" (func $host_call (param i64 i64 i64 i64) (result i64 i64)))

  (memory (export "memory") 4)

  (global $heap (mut i32) (i32.const 4096))
  (global $live (mut i32) (i32.const 0))

  (data (i32.const 64) "Hello ")
  (data (i32.const 80) "{\"message\":\"Greetings\"}")
  (data (i32.const 112) "Hello")
  (data (i32.const 120) "World")

  ;; Bump allocator, 8-byte aligned, counting live allocations.
  (func $alloc (export "alloc") (param $len i32) (result i32)
    (local $p i32)
    (local.set $p (global.get $heap))
    (global.set $heap
      (i32.add (global.get $heap)
               (i32.and (i32.add (local.get $len) (i32.const 7)) (i32.const -8))))
    (global.set $live (i32.add (global.get $live) (i32.const 1)))
    (local.get $p))

  (func (export "free") (param $ptr i32) (param $len i32)
    (global.set $live (i32.sub (global.get $live) (i32.const 1))))

  ;; Payload pointer of a (ptr,len) value: value bits 4-35.
  (func $ptr_of (param $lo i64) (result i32)
    (i32.wrap_i64 (i64.shr_u (local.get $lo) (i64.const 4))))

  ;; Payload length of a (ptr,len) value: value bits 36-67.
  (func $len_of (param $lo i64) (param $hi i64) (result i32)
    (i32.or
      (i32.wrap_i64 (i64.shr_u (local.get $lo) (i64.const 36)))
      (i32.shl (i32.wrap_i64 (local.get $hi)) (i32.const 28))))

  ;; Assemble a (ptr,len) value of the given tag.
  (func $mk_ptr_len (param $tag i64) (param $ptr i32) (param $len i32) (result i64 i64)
    (i64.or
      (i64.or (local.get $tag)
              (i64.shl (i64.extend_i32_u (local.get $ptr)) (i64.const 4)))
      (i64.shl (i64.extend_i32_u (local.get $len)) (i64.const 36)))
    (i64.shr_u (i64.extend_i32_u (local.get $len)) (i64.const 28)))

  ;; Allocate and copy a region, returning it as a (ptr,len) value.
  (func $emit (param $tag i64) (param $src i32) (param $len i32) (result i64 i64)
    (local $p i32)
    (local.set $p (call $alloc (local.get $len)))
    (memory.copy (local.get $p) (local.get $src) (local.get $len))
    (call $mk_ptr_len (local.get $tag) (local.get $p) (local.get $len)))

  ;; Guest-side function dispatcher. Trampoline 7 ignores its arguments
  ;; and returns uint 42.
  (func (export "call") (param $fn_lo i64) (param $fn_hi i64) (param $args_lo i64) (param $args_hi i64) (result i64 i64)
    (if (i32.wrap_i64 (i64.and (i64.shr_u (local.get $fn_lo) (i64.const 36)) (i64.const 1)))
      (then unreachable))
    (if (i32.eq (call $ptr_of (local.get $fn_lo)) (i32.const 7))
      (then (return (i64.const 0x2a3) (i64.const 0))))
    unreachable)

  ;; Scalar echo (aliases its input, so only safe for non-allocating tags).
  (func (export "echo") (param $lo i64) (param $hi i64) (result i64 i64)
    (local.get $lo) (local.get $hi))

  ;; Copying duplicate of any bytes-like value, tag preserved.
  (func (export "dup") (param $lo i64) (param $hi i64) (result i64 i64)
    (local $len i32)
    (local.set $len (call $len_of (local.get $lo) (local.get $hi)))
    (if (i32.eqz (local.get $len))
      (then (return (i64.and (local.get $lo) (i64.const 15)) (i64.const 0))))
    (call $emit
      (i64.and (local.get $lo) (i64.const 15))
      (call $ptr_of (local.get $lo))
      (local.get $len)))

  ;; Fresh two-element array [7, 9].
  (func (export "makePair") (result i64 i64)
    (local $p i32)
    (local.set $p (call $alloc (i32.const 32)))
    (i64.store (local.get $p) (i64.const 0x73))
    (i64.store (i32.add (local.get $p) (i32.const 8)) (i64.const 0))
    (i64.store (i32.add (local.get $p) (i32.const 16)) (i64.const 0x93))
    (i64.store (i32.add (local.get $p) (i32.const 24)) (i64.const 0))
    (call $mk_ptr_len (i64.const 9) (local.get $p) (i32.const 2)))

  (func (export "badTag") (result i64 i64)
    (i64.const 12) (i64.const 0))

  ;; Bytes value pointing far outside linear memory.
  (func (export "badPtr") (result i64 i64)
    (call $mk_ptr_len (i64.const 5) (i32.const 0x4000000) (i32.const 8)))

  ;; Function value with host origin and an unregistered key (99).
  (func (export "fakeHostFn") (result i64 i64)
    (i64.const 0x1000000638) (i64.const 0))

  (func (export "testFloat") (result i64 i64)
    (i64.or
      (i64.shl (i64.reinterpret_f64 (f64.const 1.2345)) (i64.const 4))
      (i64.const 4))
    (i64.shr_u (i64.reinterpret_f64 (f64.const 1.2345)) (i64.const 60)))

  (func (export "testJSON") (result i64 i64)
    (call $emit (i64.const 7) (i32.const 80) (i32.const 23)))

  ;; greet(name) -> "Hello <name>!"
  (func (export "greet") (param $lo i64) (param $hi i64) (result i64 i64)
    (local $ptr i32) (local $len i32) (local $total i32) (local $p i32)
    (local.set $ptr (call $ptr_of (local.get $lo)))
    (local.set $len (call $len_of (local.get $lo) (local.get $hi)))
    (local.set $total (i32.add (local.get $len) (i32.const 7)))
    (local.set $p (call $alloc (local.get $total)))
    (memory.copy (local.get $p) (i32.const 64) (i32.const 6))
    (memory.copy (i32.add (local.get $p) (i32.const 6)) (local.get $ptr) (local.get $len))
    (i32.store8 (i32.add (i32.add (local.get $p) (i32.const 6)) (local.get $len)) (i32.const 33))
    (call $mk_ptr_len (i64.const 6) (local.get $p) (local.get $total)))

  ;; Live allocation count as a uint value.
  (func (export "liveAllocs") (result i64 i64)
    (i64.or (i64.shl (i64.extend_i32_u (global.get $live)) (i64.const 4)) (i64.const 3))
    (i64.const 0))

  ;; Guest function value: trampoline 7.
  (func (export "answerFn") (result i64 i64)
    (i64.const 120) (i64.const 0))

  ;; Bool: is the argument a guest function with trampoline 7?
  (func (export "isSeven") (param $lo i64) (param $hi i64) (result i64 i64)
    (i64.or
      (i64.shl
        (i64.extend_i32_u
          (i32.and
            (i32.and
              (i64.eq (i64.and (local.get $lo) (i64.const 15)) (i64.const 8))
              (i32.eqz (i32.wrap_i64 (i64.and (i64.shr_u (local.get $lo) (i64.const 36)) (i64.const 1)))))
            (i32.eq (call $ptr_of (local.get $lo)) (i32.const 7))))
        (i64.const 4))
      (i64.const 1))
    (i64.const 0))

  ;; Call the supplied host function with ["Hello", "World"].
  (func (export "applyConcat") (param $fn_lo i64) (param $fn_hi i64) (result i64 i64)
    (i64.store (i32.const 128) (i64.const 0x5000000706))
    (i64.store (i32.const 136) (i64.const 0))
    (i64.store (i32.const 144) (i64.const 0x5000000786))
    (i64.store (i32.const 152) (i64.const 0))
    (call $host_call
      (local.get $fn_lo) (local.get $fn_hi)
      (i64.const 0x2000000809) (i64.const 0)))

  ;; Forward a host function and an argument array to the host dispatcher.
  (func (export "relay") (param $fn_lo i64) (param $fn_hi i64) (param $args_lo i64) (param $args_hi i64) (result i64 i64)
    (call $host_call (local.get $fn_lo) (local.get $fn_hi) (local.get $args_lo) (local.get $args_hi)))

  ;; Misroute a guest function through the host dispatcher.
  (func (export "badCall") (result i64 i64)
    (call $host_call (i64.const 120) (i64.const 0) (i64.const 9) (i64.const 0)))

  ;; Forward one value to the host log sink.
  (func (export "logIt") (param $lo i64) (param $hi i64) (result i64 i64)
    (call $log (local.get $lo) (local.get $hi))
    (i64.const 0) (i64.const 0))
)
"#;

/// Compile and instantiate the test guest.
pub fn guest_bridge() -> Bridge {
    let runtime = Runtime::with_defaults().expect("failed to create runtime");
    let bytes = wat::parse_str(GUEST_WAT).expect("test guest WAT is valid");
    Bridge::from_bytes(&runtime, "test_guest", &bytes).expect("failed to instantiate test guest")
}

/// Read the guest allocator's live-allocation count.
pub fn live_allocs(bridge: &mut Bridge) -> u128 {
    match bridge.invoke("liveAllocs", &[]).expect("liveAllocs failed") {
        Value::Uint(n) => n,
        other => panic!("liveAllocs returned {:?}", other),
    }
}
