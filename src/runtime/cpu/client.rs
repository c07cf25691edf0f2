//! CPU client: operation dispatch against the shared execution queue

use super::device::CpuDevice;
use super::runtime::CpuRuntime;
use crate::error::Result;
use crate::runtime::{ExecQueue, RuntimeClient};

/// CPU runtime client
///
/// Owns the execution queue all of its kernels launch on. All operator
/// launches MUST go through `self.queue()` for correct ordering; work on
/// two different clients' queues is unordered.
///
/// `CpuRuntime::default_client` returns a cached client, so every caller
/// shares one queue per device. `CpuClient::new` creates a client with its
/// own fresh queue, useful when independent submission ordering (or an
/// isolated submission counter) is wanted.
#[derive(Clone, Debug)]
pub struct CpuClient {
    pub(crate) device: CpuDevice,
    queue: ExecQueue,
}

impl CpuClient {
    /// Create a new client with a dedicated execution queue
    pub fn new(device: CpuDevice) -> Self {
        Self {
            device,
            queue: ExecQueue::new(),
        }
    }
}

impl RuntimeClient<CpuRuntime> for CpuClient {
    fn device(&self) -> &CpuDevice {
        &self.device
    }

    fn queue(&self) -> &ExecQueue {
        &self.queue
    }

    fn synchronize(&self) -> Result<()> {
        self.queue.synchronize()
    }
}
