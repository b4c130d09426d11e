// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Implementations under test.
//!
//! Both the in-process reference and the native library are driven through
//! [`Implementation`], so the harness times them under the same contract.

use std::fmt;
use std::hint::black_box;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MarshalingError;
use crate::ffi::{marshal, NativeApi};
use crate::reference::fibonacci;

/// Which implementation produced a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplementationKind {
    /// In-process reference algorithm.
    Reference,
    /// Native library reached through the C ABI.
    Native,
}

impl ImplementationKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Native => "native",
        }
    }
}

impl fmt::Display for ImplementationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Output of one call to an implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Computation {
    /// One value per input, in input order.
    pub values: Vec<u128>,
    /// Time the callee measured for itself, if it reports one.
    pub internal: Option<Duration>,
}

/// A computation the harness can time.
pub trait Implementation {
    fn kind(&self) -> ImplementationKind;

    /// Compute F(n) once.
    fn compute_scalar(&self, label: &str, n: u32) -> Result<Computation, MarshalingError>;

    /// Compute F(v) for every value in one call.
    fn compute_batch(&self, values: &[u32]) -> Result<Computation, MarshalingError>;
}

/// The in-process reference algorithm. Never reports internal time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceImplementation;

impl Implementation for ReferenceImplementation {
    fn kind(&self) -> ImplementationKind {
        ImplementationKind::Reference
    }

    fn compute_scalar(&self, _label: &str, n: u32) -> Result<Computation, MarshalingError> {
        Ok(Computation {
            values: vec![fibonacci(black_box(n))],
            internal: None,
        })
    }

    fn compute_batch(&self, values: &[u32]) -> Result<Computation, MarshalingError> {
        Ok(Computation {
            values: values.iter().map(|&n| fibonacci(black_box(n))).collect(),
            internal: None,
        })
    }
}

/// The native library, reached through the marshaling layer.
pub struct NativeImplementation<'lib, A: NativeApi + ?Sized> {
    api: &'lib A,
}

impl<'lib, A: NativeApi + ?Sized> NativeImplementation<'lib, A> {
    pub fn new(api: &'lib A) -> Self {
        Self { api }
    }
}

impl<A: NativeApi + ?Sized> Implementation for NativeImplementation<'_, A> {
    fn kind(&self) -> ImplementationKind {
        ImplementationKind::Native
    }

    fn compute_scalar(&self, label: &str, n: u32) -> Result<Computation, MarshalingError> {
        let greeting = marshal::call_scalar(self.api, label, n)?;
        Ok(Computation {
            values: vec![greeting.value],
            internal: greeting.internal,
        })
    }

    fn compute_batch(&self, values: &[u32]) -> Result<Computation, MarshalingError> {
        let payload = marshal::call_batch(self.api, values)?;
        Ok(Computation {
            values: payload.results,
            internal: Some(payload.internal),
        })
    }
}
