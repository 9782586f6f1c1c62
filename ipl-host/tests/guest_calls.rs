//! End-to-end guest invocation through the call wrapper.
//!
//! Covers the wrapped-call scenarios: string and JSON returns, float
//! returns, guest-constructed arrays, callback dispatch in both directions,
//! origin enforcement, and allocator hygiene after each call.

mod common;

use common::{guest_bridge, live_allocs};
use ipl_host::{FuncValue, Value};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn exports_skip_reserved_names() {
    let bridge = guest_bridge();
    let exports = bridge.exports();

    assert!(exports.iter().any(|e| e == "greet"));
    assert!(exports.iter().any(|e| e == "echo"));
    for reserved in ["alloc", "free", "memory", "call"] {
        assert!(!exports.iter().any(|e| e == reserved));
    }
}

#[test]
fn greet_round_trip() {
    let mut bridge = guest_bridge();

    let reply = bridge
        .invoke("greet", &[Value::from("Daniel")])
        .expect("greet failed");
    assert_eq!(reply, Value::from("Hello Daniel!"));

    // Argument and response buffers are both reclaimed.
    assert_eq!(live_allocs(&mut bridge), 0);
}

#[test]
fn float_return_is_bit_exact() {
    let mut bridge = guest_bridge();

    let value = bridge.invoke("testFloat", &[]).expect("testFloat failed");
    assert_eq!(value, Value::Float(1.2345));
}

#[test]
fn json_return_is_structural() {
    let mut bridge = guest_bridge();

    let value = bridge.invoke("testJSON", &[]).expect("testJSON failed");
    assert_eq!(value, Value::Json(json!({"message": "Greetings"})));
    assert_eq!(live_allocs(&mut bridge), 0);
}

#[test]
fn scalars_echo_through_the_wire() {
    let mut bridge = guest_bridge();

    let values = [
        Value::Void,
        Value::Bool(true),
        Value::Int(-42),
        Value::Uint(42),
        Value::Float(-0.5),
        Value::Array(Vec::new()),
    ];

    for value in values {
        let back = bridge.invoke("echo", &[value.clone()]).expect("echo failed");
        assert_eq!(back, value);
    }

    // Nothing above allocates, so the bridge counters stay untouched.
    assert_eq!(bridge.alloc_stats().allocs, 0);
    assert_eq!(bridge.alloc_stats().frees, 0);
}

#[test]
fn bytes_like_values_survive_a_guest_copy() {
    let mut bridge = guest_bridge();

    let values = [
        Value::from("round trip"),
        Value::Bytes(vec![1, 2, 3, 4, 5]),
        Value::Json(json!({"k": [1, 2, 3]})),
        Value::from(""),
    ];

    for value in values {
        let back = bridge.invoke("dup", &[value.clone()]).expect("dup failed");
        assert_eq!(back, value);
    }

    assert_eq!(live_allocs(&mut bridge), 0);
}

#[test]
fn guest_built_array_decodes() {
    let mut bridge = guest_bridge();

    let value = bridge.invoke("makePair", &[]).expect("makePair failed");
    assert_eq!(value, Value::Array(vec![Value::Uint(7), Value::Uint(9)]));
    assert_eq!(live_allocs(&mut bridge), 0);
}

#[test]
fn guest_callback_with_guest_supplied_args() {
    let mut bridge = guest_bridge();

    let concat = Value::callback(|args| {
        let mut out = String::new();
        for arg in args {
            match arg {
                Value::String(s) => out.push_str(s),
                other => panic!("expected strings, got {:?}", other),
            }
        }
        Ok(Value::String(out))
    });

    let value = bridge
        .invoke("applyConcat", &[concat])
        .expect("applyConcat failed");
    assert_eq!(value, Value::from("HelloWorld"));

    // The callback registration is released with the argument.
    assert_eq!(bridge.callback_count(), 0);
    assert_eq!(live_allocs(&mut bridge), 0);
}

#[test]
fn guest_callback_with_host_supplied_args() {
    let mut bridge = guest_bridge();
    let seen = Arc::new(AtomicUsize::new(0));

    let seen_in_callback = Arc::clone(&seen);
    let check = Value::callback(move |args| {
        seen_in_callback.store(args.len(), Ordering::SeqCst);
        let expected = [Value::Uint(1), Value::Bool(true), Value::from("x")];
        assert_eq!(args, &expected[..]);
        Ok(Value::Array(args.to_vec()))
    });

    let args = Value::Array(vec![Value::Uint(1), Value::Bool(true), Value::from("x")]);
    let value = bridge
        .invoke("relay", &[check, args.clone()])
        .expect("relay failed");

    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert_eq!(value, args);
    assert_eq!(bridge.callback_count(), 0);
    assert_eq!(live_allocs(&mut bridge), 0);
}

#[test]
fn decoded_guest_function_is_callable() {
    let mut bridge = guest_bridge();

    let func = match bridge.invoke("answerFn", &[]).expect("answerFn failed") {
        Value::Function(f) => f,
        other => panic!("expected a function, got {:?}", other),
    };

    let result = bridge
        .call_function(&func, &[Value::from("ignored")])
        .expect("guest dispatch failed");
    assert_eq!(result, Value::Uint(42));
    assert_eq!(live_allocs(&mut bridge), 0);
}

#[test]
fn guest_function_identity_survives_reencoding() {
    let mut bridge = guest_bridge();

    let func = bridge.invoke("answerFn", &[]).expect("answerFn failed");
    assert!(matches!(func, Value::Function(FuncValue::Guest(_))));

    // Passing the decoded function back transmits its original bits; the
    // guest verifies tag, origin, and trampoline pointer.
    let verdict = bridge.invoke("isSeven", &[func]).expect("isSeven failed");
    assert_eq!(verdict, Value::Bool(true));
}

#[test]
fn host_callbacks_dispatch_directly() {
    let mut bridge = guest_bridge();

    let double = FuncValue::Host(ipl_host::HostFn::new(|args| match args {
        [Value::Uint(n)] => Ok(Value::Uint(n * 2)),
        _ => Ok(Value::Void),
    }));

    let result = bridge
        .call_function(&double, &[Value::Uint(21)])
        .expect("host dispatch failed");
    assert_eq!(result, Value::Uint(42));
}

#[test]
fn wrong_origin_is_rejected() {
    let mut bridge = guest_bridge();

    // The guest routes one of its own functions through the host `call`
    // import, which only accepts host-origin functions.
    let err = bridge.invoke("badCall", &[]).unwrap_err();
    assert_eq!(err.code(), "E003");
}

#[test]
fn unknown_variant_from_guest() {
    let mut bridge = guest_bridge();

    let err = bridge.invoke("badTag", &[]).unwrap_err();
    assert_eq!(err.code(), "E002");
}

#[test]
fn out_of_bounds_payload_is_a_memory_fault() {
    let mut bridge = guest_bridge();

    let err = bridge.invoke("badPtr", &[]).unwrap_err();
    assert_eq!(err.code(), "E004");
}

#[test]
fn stale_callback_key_is_reported() {
    let mut bridge = guest_bridge();

    let err = bridge.invoke("fakeHostFn", &[]).unwrap_err();
    assert_eq!(err.code(), "E104");
}

#[test]
fn reserved_exports_are_not_invocable() {
    let mut bridge = guest_bridge();

    for name in ["alloc", "free", "memory", "call"] {
        let err = bridge.invoke(name, &[]).unwrap_err();
        assert_eq!(err.code(), "E102");
    }
}

#[test]
fn missing_export_is_reported() {
    let mut bridge = guest_bridge();

    let err = bridge.invoke("nonexistent", &[]).unwrap_err();
    assert_eq!(err.code(), "E103");
}

#[test]
fn arity_mismatch_is_rejected() {
    let mut bridge = guest_bridge();

    // `greet` takes one logical argument (two i64 halves).
    let err = bridge
        .invoke("greet", &[Value::from("a"), Value::from("b")])
        .unwrap_err();
    assert_eq!(err.code(), "E102");

    // The failed call must not leak the encoded arguments.
    assert_eq!(bridge.alloc_stats().outstanding(), 0);
}

#[test]
fn guest_logging_accepts_any_value() {
    let mut bridge = guest_bridge();

    for value in [
        Value::from("a log line"),
        Value::Uint(7),
        Value::Array(vec![Value::Bool(false)]),
    ] {
        let out = bridge.invoke("logIt", &[value]).expect("logIt failed");
        assert_eq!(out, Value::Void);
    }

    assert_eq!(live_allocs(&mut bridge), 0);
}

#[test]
fn sequential_callback_registrations_do_not_collide() {
    let mut bridge = guest_bridge();

    // Each call registers a callback and releases it again; a later
    // registration must keep working after earlier keys were retired.
    for round in 0..3u128 {
        let cb = Value::callback(move |_| Ok(Value::Uint(round)));
        let args = Value::Array(Vec::new());
        let value = bridge.invoke("relay", &[cb, args]).expect("relay failed");
        assert_eq!(value, Value::Uint(round));
        assert_eq!(bridge.callback_count(), 0);
    }
}
