//! CPU implementations of the operation traits

mod activation;
mod blas;
mod conditional;
mod indexing;

use crate::dispatch_dtype;
use crate::error::{Error, Result};
use crate::iter::IterBuilder;
use crate::runtime::cpu::launch::launch_unary;
use crate::runtime::cpu::{CpuClient, CpuRuntime};
use crate::runtime::RuntimeClient;
use crate::tensor::Tensor;

impl CpuClient {
    /// Elementwise copy of `src` into `dst`, broadcasting `src` as needed
    ///
    /// Asynchronous like every kernel; `dst` must have the broadcast shape
    /// and share `src`'s dtype.
    pub fn copy_into(&self, dst: &Tensor<CpuRuntime>, src: &Tensor<CpuRuntime>) -> Result<()> {
        if dst.dtype() != src.dtype() {
            return Err(Error::DTypeMismatch {
                lhs: dst.dtype(),
                rhs: src.dtype(),
            });
        }

        let plan = IterBuilder::new("copy_")
            .check_overlap(true)
            .output(dst)
            .input(src)
            .build()?;

        dispatch_dtype!(dst.dtype(), T => {
            launch_unary::<T, _>(self.queue(), &plan, |x| x)
        }, "copy_")
    }

    /// Return a contiguous tensor with `t`'s contents
    ///
    /// Zero-copy when `t` is already contiguous; otherwise the strided view
    /// is materialized through an asynchronous copy submission (not a
    /// host-blocking wait).
    pub fn ensure_contiguous(&self, t: &Tensor<CpuRuntime>) -> Result<Tensor<CpuRuntime>> {
        if t.is_contiguous() {
            return Ok(t.clone());
        }
        let out = Tensor::<CpuRuntime>::try_empty(t.shape(), t.dtype(), &self.device)?;
        self.copy_into(&out, t)?;
        Ok(out)
    }

    /// Copy that ignores output/input overlap hazards.
    ///
    /// Deliberately unimplemented; fails loudly instead of computing a
    /// wrong result.
    pub fn copy_ignoring_overlaps(
        &self,
        _dst: &Tensor<CpuRuntime>,
        _src: &Tensor<CpuRuntime>,
    ) -> Result<()> {
        Err(Error::NotImplemented {
            feature: "overlap-ignoring copy",
        })
    }
}
