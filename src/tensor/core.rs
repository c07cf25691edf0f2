//! Core Tensor type

use super::{Layout, Storage};
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::runtime::{recorder, ExecQueue, Runtime};

/// N-dimensional array stored on a compute device
///
/// `Tensor` is the descriptor operators consume. It consists of:
/// - **Storage**: Reference-counted device memory
/// - **Layout**: Shape, strides, and offset defining the view into storage
///
/// # Zero-Copy Views
///
/// Operations like `transpose`, `narrow`, and `broadcast_to` create new
/// tensors that share the same underlying storage through Arc-wrapped
/// storage and a modified layout.
///
/// # Asynchronous use
///
/// Kernels launched against a tensor run asynchronously on an execution
/// queue. Submissions record the storage with the buffer-lifetime recorder,
/// so dropping a tensor never reclaims memory a queue is still reading or
/// writing. When handing a tensor's buffer to a queue outside the operator
/// surface, call [`Tensor::record_queue`] first.
pub struct Tensor<R: Runtime> {
    /// Device memory
    storage: Storage<R>,
    /// Shape, strides, offset
    layout: Layout,
}

impl<R: Runtime> Tensor<R> {
    /// Create a tensor from storage and layout
    pub fn from_parts(storage: Storage<R>, layout: Layout) -> Self {
        Self { storage, layout }
    }

    /// Create a tensor from a slice of data
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` does not equal the product of the `shape`
    /// dimensions. For a fallible alternative, use [`Self::try_from_slice`].
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize], device: &R::Device) -> Self {
        Self::try_from_slice(data, shape, device).expect("Tensor::from_slice failed")
    }

    /// Create a tensor from a slice of data (fallible version)
    ///
    /// Returns an error if `data.len()` does not equal the product of the
    /// `shape` dimensions, or if memory allocation fails.
    pub fn try_from_slice<T: Element>(
        data: &[T],
        shape: &[usize],
        device: &R::Device,
    ) -> Result<Self> {
        let expected_len: usize = shape.iter().product();
        if data.len() != expected_len {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }

        let storage = Storage::from_slice(data, device)?;
        let layout = Layout::contiguous(shape);

        Ok(Self { storage, layout })
    }

    /// Create a tensor from raw bytes with an explicit dtype
    ///
    /// This is the construction path for dtypes without an `Element`
    /// representation, notably `Bool` (one byte per element, non-zero means
    /// true).
    pub fn from_bytes(data: &[u8], dtype: DType, shape: &[usize], device: &R::Device) -> Self {
        Self::try_from_bytes(data, dtype, shape, device).expect("Tensor::from_bytes failed")
    }

    /// Create a tensor from raw bytes (fallible version)
    pub fn try_from_bytes(
        data: &[u8],
        dtype: DType,
        shape: &[usize],
        device: &R::Device,
    ) -> Result<Self> {
        let expected_len: usize = shape.iter().product();
        if data.len() != expected_len * dtype.size_in_bytes() {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len() / dtype.size_in_bytes().max(1)],
            });
        }

        let storage = Storage::from_bytes(data, dtype, device)?;
        let layout = Layout::contiguous(shape);

        Ok(Self { storage, layout })
    }

    /// Create an uninitialized tensor
    ///
    /// The contents are unspecified; kernels are expected to write every
    /// element before it is read.
    pub fn empty(shape: &[usize], dtype: DType, device: &R::Device) -> Self {
        Self::try_empty(shape, dtype, device).expect("Tensor::empty failed")
    }

    /// Create an uninitialized tensor (fallible version)
    pub fn try_empty(shape: &[usize], dtype: DType, device: &R::Device) -> Result<Self> {
        let len: usize = shape.iter().product();
        let storage = Storage::new(len, dtype, device)?;
        let layout = Layout::contiguous(shape);

        Ok(Self { storage, layout })
    }

    // ===== Accessors =====

    /// Get the storage
    #[inline]
    pub fn storage(&self) -> &Storage<R> {
        &self.storage
    }

    /// Get the layout
    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Get the shape
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Get the strides
    #[inline]
    pub fn strides(&self) -> &[isize] {
        self.layout.strides()
    }

    /// Get the number of dimensions (rank)
    #[inline]
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Get the total number of elements
    #[inline]
    pub fn numel(&self) -> usize {
        self.layout.elem_count()
    }

    /// Get the element type
    #[inline]
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Get the device
    #[inline]
    pub fn device(&self) -> &R::Device {
        self.storage.device()
    }

    /// Check if the tensor is contiguous in memory
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.layout.is_contiguous()
    }

    /// Check if this is a scalar (0-dimensional tensor)
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.layout.is_scalar()
    }

    /// Get size along a dimension (supports negative indexing)
    pub fn dim(&self, d: isize) -> Result<usize> {
        self.layout.dim(d).ok_or(Error::InvalidDimension {
            dim: d,
            ndim: self.ndim(),
        })
    }

    // ===== Views (zero-copy) =====

    /// Narrow: view of `len` indices along `dim` starting at `start`
    pub fn narrow(&self, dim: isize, start: usize, len: usize) -> Result<Self> {
        let layout = self
            .layout
            .narrow(dim, start, len)
            .ok_or_else(|| Error::invalid_argument("narrow", format!(
                "range [{start}, {}) out of bounds for dim {dim} of {:?}",
                start + len,
                self.shape()
            )))?;
        Ok(Self {
            storage: self.storage.clone(),
            layout,
        })
    }

    /// Transpose: swap two dimensions
    pub fn transpose(&self, dim0: isize, dim1: isize) -> Result<Self> {
        let ndim = self.ndim();
        let layout = self
            .layout
            .transpose(dim0, dim1)
            .ok_or(Error::InvalidDimension { dim: dim0, ndim })?;
        Ok(Self {
            storage: self.storage.clone(),
            layout,
        })
    }

    /// Squeeze: remove a size-1 dimension, or all of them when `dim` is None
    pub fn squeeze(&self, dim: Option<isize>) -> Self {
        Self {
            storage: self.storage.clone(),
            layout: self.layout.squeeze(dim),
        }
    }

    /// Unsqueeze: insert a size-1 dimension at `dim`
    pub fn unsqueeze(&self, dim: isize) -> Result<Self> {
        let ndim = self.ndim();
        let layout = self
            .layout
            .unsqueeze(dim)
            .ok_or(Error::InvalidDimension { dim, ndim })?;
        Ok(Self {
            storage: self.storage.clone(),
            layout,
        })
    }

    /// Broadcast to a target shape (size-1 dimensions repeat with stride 0)
    pub fn broadcast_to(&self, target: &[usize]) -> Result<Self> {
        let layout = self
            .layout
            .broadcast_to(target)
            .ok_or_else(|| Error::broadcast(self.shape(), target))?;
        Ok(Self {
            storage: self.storage.clone(),
            layout,
        })
    }

    // ===== Asynchronous lifetime =====

    /// Record that `queue` has outstanding work touching this tensor's
    /// storage
    ///
    /// Reclamation of the storage is deferred until the queue drains past
    /// its current submission watermark. Idempotent and non-blocking; the
    /// operator surface records automatically, this is for callers that hand
    /// the raw buffer to a queue themselves.
    pub fn record_queue(&self, queue: &ExecQueue) {
        recorder::record(self.storage.ptr(), queue, queue.submissions());
    }

    // ===== Host transfer =====

    /// Copy the underlying storage to a host `Vec`
    ///
    /// Elements are returned in storage order; for a non-contiguous view,
    /// materialize with the client's `ensure_contiguous` first. Waits for
    /// pending queue work so previously submitted kernels are observed.
    pub fn to_vec<T: bytemuck::Pod>(&self) -> Vec<T> {
        self.storage.to_vec()
    }
}

impl<R: Runtime> Clone for Tensor<R> {
    /// Clone shares storage (zero-copy)
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            layout: self.layout.clone(),
        }
    }
}

impl<R: Runtime> std::fmt::Debug for Tensor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .field("strides", &self.strides())
            .field("dtype", &self.dtype())
            .field("storage", &self.storage)
            .finish()
    }
}
