//! CPU implementation of conditional select.

use crate::dispatch_dtype;
use crate::error::{Error, Result};
use crate::iter::IterBuilder;
use crate::ops::dispatch::ensure_supported;
use crate::ops::{broadcast_shape, ConditionalOps, WHERE_COND_DTYPES, WHERE_VALUE_DTYPES};
use crate::runtime::cpu::launch::launch_select;
use crate::runtime::cpu::{CpuClient, CpuRuntime};
use crate::runtime::RuntimeClient;
use crate::tensor::Tensor;

impl ConditionalOps<CpuRuntime> for CpuClient {
    fn where_cond(
        &self,
        cond: &Tensor<CpuRuntime>,
        x: &Tensor<CpuRuntime>,
        y: &Tensor<CpuRuntime>,
    ) -> Result<Tensor<CpuRuntime>> {
        ensure_supported(cond.dtype(), WHERE_COND_DTYPES, "where")?;
        ensure_supported(x.dtype(), WHERE_VALUE_DTYPES, "where")?;
        if x.dtype() != y.dtype() {
            return Err(Error::DTypeMismatch {
                lhs: x.dtype(),
                rhs: y.dtype(),
            });
        }

        let xy_shape = broadcast_shape(x.shape(), y.shape())
            .ok_or_else(|| Error::broadcast(x.shape(), y.shape()))?;
        let out_shape = broadcast_shape(cond.shape(), &xy_shape)
            .ok_or_else(|| Error::broadcast(cond.shape(), &xy_shape))?;

        let out = Tensor::<CpuRuntime>::try_empty(&out_shape, x.dtype(), &self.device)?;

        let plan = IterBuilder::new("where")
            .check_overlap(true)
            .output(&out)
            .input(cond)
            .input(x)
            .input(y)
            .build()?;

        // Bool and U8 conditions share a bytewise storage format; the
        // kernel reads the condition as bytes either way, so both yield
        // identical results.
        dispatch_dtype!(x.dtype(), T => {
            launch_select::<T>(self.queue(), &plan)
        }, "where")?;

        Ok(out)
    }
}
