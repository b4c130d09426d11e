// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! fibffi native library
//!
//! Fibonacci routines exported over the C ABI. Every string returned by this
//! library is allocated here and must be handed back to [`release`] exactly
//! once by the caller.
//!
//! # Exported symbols
//!
//! - `compute_and_greet(name, n)`: greeting line with the value and the
//!   internal time (`internal time: <ms> ms`).
//! - `compute_batch(values, count)`: JSON `{"results": [...], "time_ms": <ms>}`.
//! - `release(ptr)`: frees a string returned by either of the above.

use std::ffi::{CStr, CString};
use std::time::Instant;

use libc::{c_char, c_int};
use serde::Serialize;

/// Largest index whose Fibonacci number fits in a `u128`.
pub const MAX_INDEX: u32 = 186;

/// Payload returned by `compute_batch`.
#[derive(Debug, Serialize)]
struct BatchPayload {
    results: Vec<u128>,
    time_ms: f64,
}

/// Compute a Fibonacci number and build a greeting around it.
///
/// Returns null if `name` is null or the greeting cannot be encoded.
///
/// # Safety
///
/// * `name` must be null or point to a valid NUL-terminated C string that
///   stays readable for the duration of the call.
/// * The returned pointer must be released with [`release`] exactly once.
#[no_mangle]
pub unsafe extern "C" fn compute_and_greet(name: *const c_char, n: c_int) -> *mut c_char {
    if name.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: non-null and NUL-terminated per the contract above.
    let name = unsafe { CStr::from_ptr(name) }.to_string_lossy();

    let start = Instant::now();
    let value = fibonacci(n);
    let time_ms = start.elapsed().as_secs_f64() * 1000.0;

    let greeting = format!(
        "Hello {}! The {}th Fibonacci number is: {}\ninternal time: {:.6} ms\n",
        name, n, value, time_ms
    );

    into_owned_c_string(greeting)
}

/// Compute Fibonacci numbers for every element of `values`.
///
/// Returns null for a null array, a negative count, or an encoding failure.
///
/// # Safety
///
/// * `values` must point to `count` consecutive, initialised and properly
///   aligned `c_int`s that are not mutated during the call.
/// * The returned pointer must be released with [`release`] exactly once.
#[no_mangle]
pub unsafe extern "C" fn compute_batch(values: *const c_int, count: c_int) -> *mut c_char {
    if values.is_null() || count < 0 {
        return std::ptr::null_mut();
    }
    // SAFETY: pointer and length validated by the caller per the contract above.
    let values = unsafe { std::slice::from_raw_parts(values, count as usize) };

    let start = Instant::now();
    let results: Vec<u128> = values.iter().map(|&n| fibonacci(n)).collect();
    let time_ms = start.elapsed().as_secs_f64() * 1000.0;

    match serde_json::to_string(&BatchPayload { results, time_ms }) {
        Ok(json) => into_owned_c_string(json),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Free a string previously returned by this library.
///
/// # Safety
///
/// * `ptr` must be null or a pointer returned by [`compute_and_greet`] or
///   [`compute_batch`] that has not been released yet.
/// * `ptr` must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn release(ptr: *mut c_char) {
    if !ptr.is_null() {
        // SAFETY: ptr came from CString::into_raw in this library.
        drop(unsafe { CString::from_raw(ptr) });
    }
}

/// Iterative Fibonacci over `u128`. Non-positive input yields 0; input above
/// [`MAX_INDEX`] saturates at F(MAX_INDEX).
pub fn fibonacci(n: c_int) -> u128 {
    if n <= 0 {
        return 0;
    }
    let mut n = n as u32;
    if n > MAX_INDEX {
        tracing::warn!(n, max = MAX_INDEX, "Index exceeds u128 range, saturating");
        n = MAX_INDEX;
    }

    let (mut a, mut b) = (0u128, 1u128);
    for _ in 1..n {
        let next = a + b;
        a = b;
        b = next;
    }
    b
}

fn into_owned_c_string(text: String) -> *mut c_char {
    match CString::new(text) {
        Ok(c) => c.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}
