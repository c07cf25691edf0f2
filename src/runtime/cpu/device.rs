//! CPU device identification

use crate::runtime::Device;

/// The host CPU device
///
/// There is exactly one; it exists so the `Runtime` machinery treats the
/// CPU like any other device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuDevice;

impl CpuDevice {
    /// Create a handle to the CPU device
    pub fn new() -> Self {
        Self
    }
}

impl Device for CpuDevice {
    fn id(&self) -> usize {
        0
    }

    fn name(&self) -> String {
        "cpu".to_string()
    }
}
