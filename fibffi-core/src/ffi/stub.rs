// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Allocation-tracking in-process stand-in for the native library.
//!
//! Implements [`NativeApi`] with the same output formats as `fibffi-native`
//! while recording every allocation and release, so tests can prove that each
//! callee-owned buffer is released exactly once.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::time::{Duration, Instant};

use libc::{c_char, c_int};
use serde::Serialize;

use crate::ffi::binding::NativeApi;
use crate::reference::fibonacci;

/// Allocation counters observed by a [`TrackingStub`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStats {
    pub allocations: u64,
    pub releases: u64,
    /// Releases of a pointer that was already released.
    pub double_releases: u64,
    /// Releases of a pointer this stub never handed out.
    pub foreign_releases: u64,
    /// Allocations not released yet.
    pub live: usize,
}

#[derive(Serialize)]
struct StubBatchPayload {
    results: Vec<u128>,
    time_ms: f64,
}

/// In-process [`NativeApi`] that tracks buffer ownership.
#[derive(Debug, Default)]
pub struct TrackingStub {
    live: RefCell<HashSet<usize>>,
    released: RefCell<HashSet<usize>>,
    stats: Cell<AllocationStats>,
    calls: Cell<u64>,
    corrupt_every: Option<u64>,
    return_null: bool,
    reported_internal: Option<Duration>,
}

impl TrackingStub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a malformed payload on every `k`-th call (1-based).
    pub fn corrupt_every(mut self, k: u64) -> Self {
        self.corrupt_every = Some(k.max(1));
        self
    }

    /// Return null from both compute calls.
    pub fn return_null(mut self, enabled: bool) -> Self {
        self.return_null = enabled;
        self
    }

    /// Report this internal time instead of the measured one.
    pub fn reported_internal(mut self, internal: Duration) -> Self {
        self.reported_internal = Some(internal);
        self
    }

    /// Current counters.
    pub fn stats(&self) -> AllocationStats {
        AllocationStats {
            live: self.live.borrow().len(),
            ..self.stats.get()
        }
    }

    /// Panic unless every allocation was released exactly once and nothing
    /// else was released.
    pub fn assert_balanced(&self) {
        let stats = self.stats();
        assert_eq!(stats.double_releases, 0, "double release detected: {:?}", stats);
        assert_eq!(
            stats.foreign_releases, 0,
            "release of unknown pointer detected: {:?}",
            stats
        );
        assert_eq!(stats.live, 0, "leaked native buffers: {:?}", stats);
        assert_eq!(stats.allocations, stats.releases, "unbalanced: {:?}", stats);
    }

    fn next_call_is_corrupt(&self) -> bool {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        self.corrupt_every.is_some_and(|k| call % k == 0)
    }

    fn internal_ms(&self, measured: Duration) -> f64 {
        self.reported_internal.unwrap_or(measured).as_secs_f64() * 1000.0
    }

    fn allocate(&self, text: String) -> *mut c_char {
        let ptr = match CString::new(text) {
            Ok(c) => c.into_raw(),
            Err(_) => return std::ptr::null_mut(),
        };
        let addr = ptr as usize;
        self.live.borrow_mut().insert(addr);
        self.released.borrow_mut().remove(&addr);
        self.update(|s| s.allocations += 1);
        ptr
    }

    fn update(&self, f: impl FnOnce(&mut AllocationStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl NativeApi for TrackingStub {
    unsafe fn compute_and_greet(&self, name: *const c_char, n: c_int) -> *mut c_char {
        if self.return_null || name.is_null() {
            return std::ptr::null_mut();
        }
        if self.next_call_is_corrupt() {
            return self.allocate("Hello! corrupted".to_string());
        }
        let name = CStr::from_ptr(name).to_string_lossy();

        let start = Instant::now();
        let value = fibonacci(n.max(0) as u32);
        let measured = start.elapsed();

        self.allocate(format!(
            "Hello {}! The {}th Fibonacci number is: {}\ninternal time: {:.6} ms\n",
            name,
            n,
            value,
            self.internal_ms(measured)
        ))
    }

    unsafe fn compute_batch(&self, values: *const c_int, count: c_int) -> *mut c_char {
        if self.return_null || values.is_null() || count < 0 {
            return std::ptr::null_mut();
        }
        if self.next_call_is_corrupt() {
            return self.allocate("{\"results\": [".to_string());
        }
        let values = std::slice::from_raw_parts(values, count as usize);

        let start = Instant::now();
        let results = values.iter().map(|&n| fibonacci(n.max(0) as u32)).collect();
        let measured = start.elapsed();

        let payload = StubBatchPayload {
            results,
            time_ms: self.internal_ms(measured),
        };
        match serde_json::to_string(&payload) {
            Ok(json) => self.allocate(json),
            Err(_) => std::ptr::null_mut(),
        }
    }

    unsafe fn release(&self, ptr: *mut c_char) {
        if ptr.is_null() {
            return;
        }
        let addr = ptr as usize;

        if self.live.borrow_mut().remove(&addr) {
            drop(CString::from_raw(ptr));
            self.released.borrow_mut().insert(addr);
            self.update(|s| s.releases += 1);
        } else if self.released.borrow().contains(&addr) {
            tracing::error!(addr, "Double release of native buffer");
            self.update(|s| s.double_releases += 1);
        } else {
            tracing::error!(addr, "Release of a pointer never handed out");
            self.update(|s| s.foreign_releases += 1);
        }
    }
}

impl Drop for TrackingStub {
    fn drop(&mut self) {
        for addr in self.live.get_mut().drain() {
            // SAFETY: still-live pointers came from CString::into_raw above.
            drop(unsafe { CString::from_raw(addr as *mut c_char) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_after_many_calls() {
        let stub = TrackingStub::new();
        let name = CString::new("n").unwrap();
        for i in 0..50 {
            let ptr = unsafe { stub.compute_and_greet(name.as_ptr(), i) };
            unsafe { stub.release(ptr) };
        }
        stub.assert_balanced();
        assert_eq!(stub.stats().allocations, 50);
    }

    #[test]
    fn test_leak_is_visible() {
        let stub = TrackingStub::new();
        let name = CString::new("n").unwrap();
        let _leaked = unsafe { stub.compute_and_greet(name.as_ptr(), 1) };
        assert_eq!(stub.stats().live, 1);
    }

    #[test]
    #[should_panic(expected = "double release detected")]
    fn test_double_release_is_detected() {
        let stub = TrackingStub::new();
        let name = CString::new("n").unwrap();
        let ptr = unsafe { stub.compute_and_greet(name.as_ptr(), 5) };

        unsafe {
            stub.release(ptr);
            stub.release(ptr);
        }

        assert_eq!(stub.stats().double_releases, 1);
        stub.assert_balanced();
    }

    #[test]
    #[should_panic(expected = "release of unknown pointer detected")]
    fn test_foreign_release_is_detected() {
        let stub = TrackingStub::new();
        let mut local = [0 as c_char; 4];
        unsafe { stub.release(local.as_mut_ptr()) };
        stub.assert_balanced();
    }

    #[test]
    fn test_corrupt_every_second_call() {
        let stub = TrackingStub::new().corrupt_every(2);
        let values = [3 as c_int];
        let first = unsafe { stub.compute_batch(values.as_ptr(), 1) };
        let second = unsafe { stub.compute_batch(values.as_ptr(), 1) };

        let read = |p: *mut c_char| unsafe { CStr::from_ptr(p) }.to_str().unwrap().to_owned();
        assert!(read(first).contains("\"time_ms\""));
        assert!(!read(second).contains("\"time_ms\""));

        unsafe {
            stub.release(first);
            stub.release(second);
        }
        stub.assert_balanced();
    }
}
