// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Marshaling across the native call boundary.
//!
//! Ownership protocol: the callee allocates result strings and the caller
//! always frees them; the caller allocates batch input buffers and always
//! frees them. [`NativeString`] releases its pointer exactly once, from
//! `Drop`, so every exit path (success, parse error, early return) frees it
//! and nothing can read it afterwards.

use std::ffi::{CStr, CString};
use std::ptr::NonNull;
use std::time::Duration;

use libc::{c_char, c_int};
use serde::Deserialize;

use crate::error::MarshalingError;
use crate::ffi::binding::{symbols, NativeApi};

/// Phrase preceding the callee's self-measured time in a greeting.
pub const INTERNAL_TIME_MARKER: &str = "internal time: ";

/// Phrase preceding the computed value in a greeting.
const VALUE_MARKER: &str = "number is: ";

/// A callee-owned string, released through its originating API on drop.
///
/// Deliberately neither `Clone` nor `Copy`: one guard per pointer.
pub struct NativeString<'api, A: NativeApi + ?Sized> {
    ptr: NonNull<c_char>,
    api: &'api A,
    call: &'static str,
}

impl<'api, A: NativeApi + ?Sized> NativeString<'api, A> {
    /// Take ownership of a pointer just returned by `api`.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a NUL-terminated string returned by `call` on
    /// `api` that nothing else will release.
    pub unsafe fn from_raw(
        api: &'api A,
        ptr: *mut c_char,
        call: &'static str,
    ) -> Result<Self, MarshalingError> {
        let ptr = NonNull::new(ptr).ok_or(MarshalingError::NullResult { call })?;
        Ok(Self { ptr, api, call })
    }

    /// Copy the contents into a caller-owned `String`.
    pub fn to_owned_string(&self) -> Result<String, MarshalingError> {
        // SAFETY: the pointer is live until drop and NUL-terminated per the
        // from_raw contract.
        let text = unsafe { CStr::from_ptr(self.ptr.as_ptr()) };
        text.to_str()
            .map(str::to_owned)
            .map_err(|e| MarshalingError::InvalidUtf8 {
                call: self.call,
                reason: e.to_string(),
            })
    }
}

impl<A: NativeApi + ?Sized> Drop for NativeString<'_, A> {
    fn drop(&mut self) {
        // SAFETY: obtained from this api and released only here.
        unsafe { self.api.release(self.ptr.as_ptr()) };
    }
}

/// Caller-owned contiguous `c_int` array for a batch call.
#[derive(Debug)]
pub struct BatchBuffer {
    values: Vec<c_int>,
}

impl BatchBuffer {
    /// Allocate a buffer holding `values` in order.
    pub fn from_values(values: &[u32]) -> Result<Self, MarshalingError> {
        if values.is_empty() {
            return Err(MarshalingError::InvalidBatch {
                len: 0,
                reason: "batch must contain at least one value".to_string(),
            });
        }
        if c_int::try_from(values.len()).is_err() {
            return Err(MarshalingError::InvalidBatch {
                len: values.len(),
                reason: format!("count exceeds {}", c_int::MAX),
            });
        }

        let values = values
            .iter()
            .map(|&v| to_c_int(v))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { values })
    }

    pub fn as_ptr(&self) -> *const c_int {
        self.values.as_ptr()
    }

    /// Element count as passed to the callee.
    pub fn count(&self) -> c_int {
        // Bounded by the check in from_values.
        self.values.len() as c_int
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Decoded result of a scalar call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub text: String,
    pub value: u128,
    /// Self-reported by the callee, when present.
    pub internal: Option<Duration>,
}

/// Decoded result of a batch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPayload {
    pub results: Vec<u128>,
    pub internal: Duration,
}

#[derive(Debug, Deserialize)]
struct RawBatchPayload {
    results: Vec<u128>,
    time_ms: f64,
}

/// Scalar call: compute F(n) natively and decode the greeting.
pub fn call_scalar<A: NativeApi + ?Sized>(
    api: &A,
    label: &str,
    n: u32,
) -> Result<Greeting, MarshalingError> {
    let n = to_c_int(n)?;
    let label =
        CString::new(label).map_err(|_| MarshalingError::InteriorNul { argument: "name" })?;

    // SAFETY: label outlives the call; the result is wrapped immediately.
    let text = unsafe {
        let raw = api.compute_and_greet(label.as_ptr(), n);
        NativeString::from_raw(api, raw, symbols::COMPUTE_AND_GREET)?
    }
    .to_owned_string()?;

    parse_greeting(text)
}

/// Batch call: compute F(v) natively for every value and decode the payload.
pub fn call_batch<A: NativeApi + ?Sized>(
    api: &A,
    values: &[u32],
) -> Result<BatchPayload, MarshalingError> {
    let buffer = BatchBuffer::from_values(values)?;

    // SAFETY: buffer holds `count` initialised c_ints and outlives the call.
    let json = unsafe {
        let raw = api.compute_batch(buffer.as_ptr(), buffer.count());
        NativeString::from_raw(api, raw, symbols::COMPUTE_BATCH)?
    }
    .to_owned_string()?;
    drop(buffer);

    let payload = parse_batch(&json)?;
    if payload.results.len() != values.len() {
        return Err(MarshalingError::MalformedPayload {
            call: symbols::COMPUTE_BATCH,
            reason: format!(
                "expected {} results, got {}",
                values.len(),
                payload.results.len()
            ),
        });
    }
    Ok(payload)
}

/// Decode a greeting line: the value after `number is: ` and, if present,
/// the float between `internal time: ` and ` ms`.
///
/// The greeting starts with the caller's label, so both phrases are looked up
/// in the callee-written tail only: the last `number is: ` and what follows it.
pub fn parse_greeting(text: String) -> Result<Greeting, MarshalingError> {
    let malformed = |reason: &str| MarshalingError::MalformedPayload {
        call: symbols::COMPUTE_AND_GREET,
        reason: reason.to_string(),
    };

    let after_value = text
        .rfind(VALUE_MARKER)
        .map(|i| &text[i + VALUE_MARKER.len()..])
        .ok_or_else(|| malformed("missing computed value"))?;
    let digits_end = after_value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(after_value.len());
    let value = after_value[..digits_end]
        .parse::<u128>()
        .map_err(|e| malformed(&format!("invalid computed value: {}", e)))?;

    let tail = &after_value[digits_end..];
    let internal = match tail.find(INTERNAL_TIME_MARKER) {
        None => None,
        Some(i) => {
            let rest = &tail[i + INTERNAL_TIME_MARKER.len()..];
            let ms = rest
                .split_once(" ms")
                .map(|(ms, _)| ms)
                .ok_or_else(|| malformed("internal time without unit"))?;
            let ms = ms
                .trim()
                .parse::<f64>()
                .map_err(|e| malformed(&format!("invalid internal time: {}", e)))?;
            Some(millis_to_duration(ms).ok_or_else(|| malformed("negative internal time"))?)
        }
    };

    Ok(Greeting {
        text,
        value,
        internal,
    })
}

/// Decode a batch payload: `{"results": [...], "time_ms": <float>}`.
pub fn parse_batch(json: &str) -> Result<BatchPayload, MarshalingError> {
    let raw: RawBatchPayload =
        serde_json::from_str(json).map_err(|e| MarshalingError::MalformedPayload {
            call: symbols::COMPUTE_BATCH,
            reason: e.to_string(),
        })?;

    let internal =
        millis_to_duration(raw.time_ms).ok_or_else(|| MarshalingError::MalformedPayload {
            call: symbols::COMPUTE_BATCH,
            reason: format!("invalid time_ms: {}", raw.time_ms),
        })?;

    Ok(BatchPayload {
        results: raw.results,
        internal,
    })
}

fn millis_to_duration(ms: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(ms / 1000.0).ok()
}

fn to_c_int(value: u32) -> Result<c_int, MarshalingError> {
    c_int::try_from(value).map_err(|_| MarshalingError::ValueOutOfRange {
        value: value as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::stub::TrackingStub;

    fn assert_close(actual: Duration, expected: Duration) {
        let diff = actual.as_nanos().abs_diff(expected.as_nanos());
        assert!(diff <= 1, "{:?} != {:?}", actual, expected);
    }

    #[test]
    fn test_parse_greeting() {
        let greeting = parse_greeting(
            "Hello friend! The 10th Fibonacci number is: 55\ninternal time: 0.001500 ms\n"
                .to_string(),
        )
        .unwrap();

        assert_eq!(greeting.value, 55);
        assert_close(greeting.internal.unwrap(), Duration::from_nanos(1500));
    }

    #[test]
    fn test_parse_greeting_without_internal_time() {
        let greeting =
            parse_greeting("Hello x! The 3th Fibonacci number is: 2\n".to_string()).unwrap();
        assert_eq!(greeting.value, 2);
        assert_eq!(greeting.internal, None);
    }

    #[test]
    fn test_parse_greeting_ignores_markers_in_label() {
        let greeting = parse_greeting(
            "Hello number is: 7! The 10th Fibonacci number is: 55\ninternal time: 0.001500 ms\n"
                .to_string(),
        )
        .unwrap();
        assert_eq!(greeting.value, 55);
        assert_close(greeting.internal.unwrap(), Duration::from_nanos(1500));

        let greeting = parse_greeting(
            "Hello internal time: 60000 ms! The 10th Fibonacci number is: 55\ninternal time: 0.001500 ms\n"
                .to_string(),
        )
        .unwrap();
        assert_eq!(greeting.value, 55);
        assert_close(greeting.internal.unwrap(), Duration::from_nanos(1500));

        let greeting =
            parse_greeting("Hello number is: x! The 3th Fibonacci number is: 2\n".to_string())
                .unwrap();
        assert_eq!(greeting.value, 2);
        assert_eq!(greeting.internal, None);
    }

    #[test]
    fn test_scalar_call_with_marker_labels() {
        let stub = TrackingStub::new().reported_internal(Duration::from_micros(3));
        for label in ["number is: 7", "internal time: 60000 ms", "number is: x"] {
            let greeting = call_scalar(&stub, label, 10).unwrap();
            assert_eq!(greeting.value, 55, "label {:?}", label);
            assert_close(greeting.internal.unwrap(), Duration::from_micros(3));
        }
        stub.assert_balanced();
    }

    #[test]
    fn test_parse_greeting_malformed() {
        assert!(matches!(
            parse_greeting("garbage".to_string()),
            Err(MarshalingError::MalformedPayload { .. })
        ));
        assert!(parse_greeting("number is: 5\ninternal time: abc ms".to_string()).is_err());
        assert!(parse_greeting("number is: 5\ninternal time: -1.0 ms".to_string()).is_err());
    }

    #[test]
    fn test_parse_batch() {
        let payload = parse_batch(r#"{"results": [5, 5, 5], "time_ms": 0.25}"#).unwrap();
        assert_eq!(payload.results, vec![5, 5, 5]);
        assert_close(payload.internal, Duration::from_micros(250));
    }

    #[test]
    fn test_parse_batch_large_values() {
        let payload = parse_batch(
            r#"{"results": [332825110087067562321196029789634457848], "time_ms": 0.0}"#,
        )
        .unwrap();
        assert_eq!(
            payload.results,
            vec![332_825_110_087_067_562_321_196_029_789_634_457_848u128]
        );
    }

    #[test]
    fn test_parse_batch_missing_time() {
        assert!(matches!(
            parse_batch(r#"{"results": [1]}"#),
            Err(MarshalingError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_batch_buffer_rejects_empty_and_oversized_values() {
        assert!(matches!(
            BatchBuffer::from_values(&[]),
            Err(MarshalingError::InvalidBatch { len: 0, .. })
        ));
        assert!(matches!(
            BatchBuffer::from_values(&[1, u32::MAX]),
            Err(MarshalingError::ValueOutOfRange { .. })
        ));

        let buffer = BatchBuffer::from_values(&[3, 1, 2]).unwrap();
        assert_eq!(buffer.count(), 3);
        let written = unsafe { std::slice::from_raw_parts(buffer.as_ptr(), buffer.len()) };
        assert_eq!(written, &[3, 1, 2]);
    }

    #[test]
    fn test_scalar_call_releases_once() {
        let stub = TrackingStub::new();
        let greeting = call_scalar(&stub, "friend", 10).unwrap();

        assert_eq!(greeting.value, 55);
        assert!(greeting.internal.is_some());
        stub.assert_balanced();
        assert_eq!(stub.stats().allocations, 1);
        assert_eq!(stub.stats().releases, 1);
    }

    #[test]
    fn test_label_with_nul_never_crosses() {
        let stub = TrackingStub::new();
        assert!(matches!(
            call_scalar(&stub, "bad\0label", 1),
            Err(MarshalingError::InteriorNul { .. })
        ));
        assert_eq!(stub.stats().allocations, 0);
    }

    #[test]
    fn test_batch_call_three_fives() {
        let stub = TrackingStub::new();
        let payload = call_batch(&stub, &[5, 5, 5]).unwrap();

        assert_eq!(payload.results, vec![5, 5, 5]);
        assert!(payload.internal >= Duration::ZERO);
        stub.assert_balanced();
    }

    #[test]
    fn test_malformed_payload_still_released() {
        let stub = TrackingStub::new().corrupt_every(1);

        assert!(matches!(
            call_batch(&stub, &[1, 2]),
            Err(MarshalingError::MalformedPayload { .. })
        ));
        assert!(matches!(
            call_scalar(&stub, "friend", 2),
            Err(MarshalingError::MalformedPayload { .. })
        ));

        stub.assert_balanced();
        assert_eq!(stub.stats().releases, 2);
    }

    #[test]
    fn test_null_result_is_marshaling_error() {
        let stub = TrackingStub::new().return_null(true);
        assert!(matches!(
            call_scalar(&stub, "friend", 2),
            Err(MarshalingError::NullResult { .. })
        ));
        stub.assert_balanced();
    }
}
