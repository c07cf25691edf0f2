//! CPU runtime implementation

use super::client::CpuClient;
use super::device::CpuDevice;
use crate::error::{Error, Result};
use crate::runtime::{Runtime, RuntimeClient};
use std::alloc::{alloc_zeroed, dealloc, Layout as AllocLayout};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Alignment for device buffers (AVX-512 friendly)
const ALLOC_ALIGN: usize = 64;

/// Live allocation accounting, in bytes.
///
/// Decremented only when a buffer is actually freed, so a deferred free
/// behind pending queue work is observable here.
static LIVE_BYTES: AtomicUsize = AtomicUsize::new(0);

/// Bytes currently allocated by the CPU runtime
pub fn live_bytes() -> usize {
    LIVE_BYTES.load(Ordering::Acquire)
}

/// Cached default client: one queue per device, shared by every caller.
///
/// This is what makes cross-operator FIFO ordering hold for code that goes
/// through `default_client`, and what host-side reads synchronize against.
static DEFAULT_CLIENT: OnceLock<CpuClient> = OnceLock::new();

fn get_or_create_client(device: &CpuDevice) -> CpuClient {
    DEFAULT_CLIENT
        .get_or_init(|| CpuClient::new(device.clone()))
        .clone()
}

/// CPU compute runtime
///
/// Memory is allocated on the heap with the system allocator; kernels run
/// asynchronously on the client's queue worker.
#[derive(Clone, Debug, Default)]
pub struct CpuRuntime;

impl Runtime for CpuRuntime {
    type Device = CpuDevice;
    type Client = CpuClient;

    fn name() -> &'static str {
        "cpu"
    }

    fn allocate(size_bytes: usize, _device: &Self::Device) -> Result<u64> {
        if size_bytes == 0 {
            return Ok(0);
        }

        let layout = AllocLayout::from_size_align(size_bytes, ALLOC_ALIGN)
            .map_err(|_| Error::OutOfMemory { size: size_bytes })?;
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(Error::OutOfMemory { size: size_bytes });
        }

        LIVE_BYTES.fetch_add(size_bytes, Ordering::AcqRel);
        Ok(ptr as u64)
    }

    fn deallocate(ptr: u64, size_bytes: usize, _device: &Self::Device) {
        if ptr == 0 || size_bytes == 0 {
            return;
        }

        let layout = AllocLayout::from_size_align(size_bytes, ALLOC_ALIGN)
            .expect("invalid allocation layout");
        unsafe {
            dealloc(ptr as *mut u8, layout);
        }
        LIVE_BYTES.fetch_sub(size_bytes, Ordering::AcqRel);
    }

    fn copy_to_device(src: &[u8], dst: u64, _device: &Self::Device) -> Result<()> {
        if src.is_empty() || dst == 0 {
            return Ok(());
        }

        // Destinations of host uploads are freshly allocated buffers with no
        // pending queue work, so a plain copy is safe.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len());
        }
        Ok(())
    }

    fn copy_from_device(src: u64, dst: &mut [u8], device: &Self::Device) -> Result<()> {
        if dst.is_empty() || src == 0 {
            return Ok(());
        }

        // Drain the default queue so previously submitted kernels are
        // observed. Work on a non-default client's queue must be
        // synchronized by the caller.
        if let Some(client) = DEFAULT_CLIENT.get() {
            if client.device() == device {
                client.queue().wait_idle();
            }
        }

        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    fn default_device() -> Self::Device {
        CpuDevice::new()
    }

    fn default_client(device: &Self::Device) -> Self::Client {
        get_or_create_client(device)
    }
}
