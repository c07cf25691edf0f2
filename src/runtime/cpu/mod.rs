//! CPU queue backend
//!
//! The host-memory backend with a real asynchronous execution queue:
//! submissions return immediately and execute on a dedicated worker in
//! FIFO order, with data-parallel group execution inside each kernel.
//!
//! - `CpuDevice` - the (single) host device
//! - `CpuClient` - owns the execution queue, implements the operator traits
//! - `CpuRuntime` - implements the generic `Runtime` trait

mod client;
mod device;
pub(crate) mod launch;
mod runtime;

pub use client::CpuClient;
pub use device::CpuDevice;
pub use runtime::{live_bytes, CpuRuntime};
