//! Runtime backends for kernel execution
//!
//! This module defines the `Runtime` trait and provides the CPU-queue
//! backend implementation.
//!
//! # Architecture
//!
//! ```text
//! Runtime (backend identity)
//! ├── Device   (identifies a specific compute unit)
//! ├── Client   (dispatches operations, owns the execution queue)
//! └── ExecQueue (ordered asynchronous submission channel)
//! ```
//!
//! Execution queues and device handles are shared, reference-counted
//! resources; operators reference them, never create or destroy them.
//! The buffer-lifetime [`recorder`] gates storage reclamation against
//! outstanding queue work.

pub mod cpu;
mod queue;
pub mod recorder;

pub use queue::ExecQueue;

use crate::error::Result;

/// Core trait for compute backends
///
/// `Runtime` abstracts over compute devices. It uses static dispatch via
/// generics for zero-cost abstraction.
///
/// # Associated Types
///
/// - `Device`: Identifies a specific compute unit
/// - `Client`: Handles operation dispatch and synchronization
pub trait Runtime: Clone + Send + Sync + 'static {
    /// Device identifier type
    type Device: Device;

    /// Client for dispatching operations
    type Client: RuntimeClient<Self>;

    /// Human-readable name of this runtime
    fn name() -> &'static str;

    /// Allocate device memory
    ///
    /// Returns a device pointer (u64) that can be used for operations.
    /// Returns `Err(OutOfMemory)` if allocation fails.
    fn allocate(size_bytes: usize, device: &Self::Device) -> Result<u64>;

    /// Deallocate device memory
    ///
    /// Callers route reclamation through the lifetime recorder first;
    /// this is the final, unconditional free.
    fn deallocate(ptr: u64, size_bytes: usize, device: &Self::Device);

    /// Copy data from host to device
    fn copy_to_device(src: &[u8], dst: u64, device: &Self::Device) -> Result<()>;

    /// Copy data from device to host
    ///
    /// Implementations wait for the device's default queue to drain first,
    /// so previously submitted kernels are observed.
    fn copy_from_device(src: u64, dst: &mut [u8], device: &Self::Device) -> Result<()>;

    /// Get the default device
    fn default_device() -> Self::Device;

    /// Get the default client for a device
    ///
    /// Clients are cached per device: every caller shares one execution
    /// queue, which is what makes cross-operator FIFO ordering hold.
    fn default_client(device: &Self::Device) -> Self::Client;
}

/// Trait for device identification
pub trait Device: Clone + Send + Sync + 'static {
    /// Unique identifier for this device
    fn id(&self) -> usize;

    /// Check if two devices are the same
    fn is_same(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    /// Human-readable name
    fn name(&self) -> String {
        format!("Device({})", self.id())
    }
}

/// Trait for runtime clients that handle operation dispatch
pub trait RuntimeClient<R: Runtime>: Clone + Send + Sync {
    /// Get the device this client operates on
    fn device(&self) -> &R::Device;

    /// The execution queue all of this client's kernels launch on
    ///
    /// All submissions through one client execute in FIFO order.
    fn queue(&self) -> &ExecQueue;

    /// Wait for all pending operations and surface any deferred
    /// device-side failure
    fn synchronize(&self) -> Result<()>;
}
