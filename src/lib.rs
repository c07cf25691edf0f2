//! # accelr
//!
//! **Device-resident numeric operator kernels with asynchronous queue
//! execution.**
//!
//! accelr is the operator execution engine of a tensor-computation stack:
//! it takes a runtime element type and a set of tensor descriptors with
//! arbitrary shapes and strides, resolves broadcasting and aliasing,
//! instantiates a type-specialized kernel, and schedules it onto an
//! ordered execution queue with buffer-lifetime guarantees.
//!
//! ## What's inside
//!
//! - **Type dispatch**: per-operator declared dtype sets with
//!   monomorphized kernel instantiation; unsupported types fail before
//!   any submission
//! - **Iteration plans**: broadcast resolution, overlap checking with an
//!   in-place exemption, canonical row-major linearization
//! - **Elementwise launchers**: partitioned parallel groups submitted to
//!   a FIFO execution queue (ELU forward/backward, conditional select)
//! - **Index expansion**: scan-based repeat-interleave scatter
//! - **GEMM**: rank-2/3 matrix multiply through the vendor primitive,
//!   with output-scale and sum-accumulate post-ops and bias broadcasting
//! - **Buffer lifetimes**: a recorder that defers storage reclamation
//!   behind outstanding queue work
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use accelr::prelude::*;
//! use accelr::ops::{ActivationOps, BlasOps};
//!
//! let device = CpuRuntime::default_device();
//! let client = CpuRuntime::default_client(&device);
//!
//! let x = Tensor::<CpuRuntime>::from_slice(&[-1.0f32, 0.0, 2.0], &[3], &device);
//! let y = client.elu(&x, 1.0, 1.0, 1.0)?;          // asynchronous
//! client.synchronize()?;                            // errors surface here
//! let host: Vec<f32> = y.to_vec();
//! ```
//!
//! ## Concurrency model
//!
//! Host-side submission is synchronous and cheap; kernels execute
//! asynchronously and in FIFO order per queue. No locks are taken around
//! kernel execution; correctness relies on queue ordering plus the
//! lifetime recorder's bookkeeping.
//!
//! ## Feature Flags
//!
//! - `f16` (default): half-precision dtypes (F16, BF16) via the `half` crate
//! - `rayon` (default): data-parallel group execution inside kernels

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod dtype;
pub mod error;
pub mod iter;
pub mod ops;
pub mod runtime;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dtype::DType;
    pub use crate::error::{Error, Result};
    pub use crate::runtime::cpu::CpuRuntime;
    pub use crate::runtime::{Device, ExecQueue, Runtime, RuntimeClient};
    pub use crate::tensor::{Layout, Tensor};
}

/// Default runtime
pub type DefaultRuntime = runtime::cpu::CpuRuntime;
