//! Iteration-space builder for elementwise kernels
//!
//! Given one output tensor and one or more input tensors, [`IterBuilder`]
//! computes the broadcast iteration shape, validates aliasing between the
//! output and the inputs, and produces an [`IterPlan`]: a normalized,
//! immutable description of the linearized index space with per-operand
//! strides. Launchers consume the plan and walk it in canonical row-major
//! order, so multi-operand kernels always see operand-aligned elements.
//!
//! ```ignore
//! let plan = IterBuilder::new("elu")
//!     .check_overlap(true)
//!     .output(&out)
//!     .input(&a)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::ops::broadcast_shape;
use crate::runtime::Runtime;
use crate::tensor::{Shape, Strides, Tensor};
use smallvec::SmallVec;

/// One operand's access pattern within an iteration plan
///
/// Strides are broadcast-aligned to the plan's shape: a dimension the
/// operand does not vary over carries stride 0.
#[derive(Clone, Debug)]
pub struct OperandAccess {
    /// Base device pointer of the operand's storage
    pub ptr: u64,
    /// Element offset of the view into the storage
    pub offset: isize,
    /// Per-dimension element strides, length equal to the plan's rank
    pub strides: Strides,
}

/// A normalized iteration plan over a broadcast element space
///
/// Created per call, immutable, discarded after kernel submission.
#[derive(Clone, Debug)]
pub struct IterPlan {
    shape: Shape,
    numel: usize,
    operands: SmallVec<[OperandAccess; 4]>,
}

impl IterPlan {
    /// The broadcast output shape
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of elements in the iteration space
    #[inline]
    pub fn numel(&self) -> usize {
        self.numel
    }

    /// Number of operands (output first, then inputs)
    #[inline]
    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    /// Access pattern of operand `i`; index 0 is the output
    #[inline]
    pub fn operand(&self, i: usize) -> &OperandAccess {
        &self.operands[i]
    }
}

/// Builder for [`IterPlan`]
///
/// Mirrors the configuration surface of the original tensor-iterator:
/// add one output, add inputs, optionally enable the memory-overlap check,
/// then `build`.
pub struct IterBuilder<'a, R: Runtime> {
    op: &'static str,
    check_overlap: bool,
    output: Option<&'a Tensor<R>>,
    inputs: SmallVec<[&'a Tensor<R>; 3]>,
}

impl<'a, R: Runtime> IterBuilder<'a, R> {
    /// Start a plan for the named operation (used in error messages)
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            check_overlap: false,
            output: None,
            inputs: SmallVec::new(),
        }
    }

    /// Enable or disable the output/input aliasing check
    ///
    /// When enabled, an output that aliases an input's memory fails with
    /// [`Error::MemoryOverlap`] unless output and input are the *same*
    /// descriptor (true in-place, which elementwise kernels support).
    pub fn check_overlap(mut self, check: bool) -> Self {
        self.check_overlap = check;
        self
    }

    /// Set the output tensor
    pub fn output(mut self, t: &'a Tensor<R>) -> Self {
        self.output = Some(t);
        self
    }

    /// Add an input tensor
    pub fn input(mut self, t: &'a Tensor<R>) -> Self {
        self.inputs.push(t);
        self
    }

    /// Validate and produce the iteration plan
    ///
    /// Fails with `BroadcastError` if the inputs cannot broadcast together,
    /// `ShapeMismatch` if the output shape does not equal the broadcast
    /// shape, and `MemoryOverlap` per [`Self::check_overlap`].
    pub fn build(self) -> Result<IterPlan> {
        let out = self
            .output
            .ok_or_else(|| Error::Internal(format!("{}: iteration plan without output", self.op)))?;

        // Common shape: right-aligned broadcast over the output and every input.
        let mut common: Vec<usize> = out.shape().to_vec();
        for inp in &self.inputs {
            common = broadcast_shape(&common, inp.shape())
                .ok_or_else(|| Error::broadcast(&common, inp.shape()))?;
        }

        // The output must already have the broadcast shape; operators
        // allocate it, callers of `_out` variants must size it correctly.
        if out.shape() != common.as_slice() {
            return Err(Error::shape_mismatch(&common, out.shape()));
        }

        let numel: usize = common.iter().product();

        if self.check_overlap && numel > 0 {
            for inp in &self.inputs {
                check_operand_overlap(self.op, out, inp)?;
            }
        }

        let mut operands: SmallVec<[OperandAccess; 4]> = SmallVec::new();
        operands.push(OperandAccess {
            ptr: out.storage().ptr(),
            offset: out.layout().offset() as isize,
            strides: out.strides().iter().copied().collect(),
        });
        for inp in &self.inputs {
            let bcast = inp
                .layout()
                .broadcast_to(&common)
                .ok_or_else(|| Error::broadcast(inp.shape(), &common))?;
            operands.push(OperandAccess {
                ptr: inp.storage().ptr(),
                offset: bcast.offset() as isize,
                strides: bcast.strides().iter().copied().collect(),
            });
        }

        Ok(IterPlan {
            shape: common.into_iter().collect(),
            numel,
            operands,
        })
    }
}

/// Reject unsafe aliasing between the output and one input.
///
/// Exemption: output and input being the same descriptor (same storage,
/// same view) is in-place execution, which the canonical element ordering
/// makes safe. Anything else that touches intersecting bytes is not.
fn check_operand_overlap<R: Runtime>(
    op: &'static str,
    out: &Tensor<R>,
    inp: &Tensor<R>,
) -> Result<()> {
    let same_storage = out.storage().ptr() == inp.storage().ptr();
    if same_storage && out.layout() == inp.layout() {
        return Ok(());
    }

    let (out_range, inp_range) = match (byte_range(out), byte_range(inp)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(()), // an empty view touches nothing
    };

    if out_range.0 <= inp_range.1 && inp_range.0 <= out_range.1 {
        return Err(Error::MemoryOverlap { op });
    }
    Ok(())
}

/// Absolute inclusive byte range a tensor view can touch.
fn byte_range<R: Runtime>(t: &Tensor<R>) -> Option<(i128, i128)> {
    let (lo, hi) = t.layout().offset_range()?;
    let esize = t.dtype().size_in_bytes() as i128;
    let base = t.storage().ptr() as i128;
    Some((base + lo as i128 * esize, base + hi as i128 * esize + esize - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::runtime::cpu::CpuRuntime;

    fn device() -> <CpuRuntime as Runtime>::Device {
        CpuRuntime::default_device()
    }

    #[test]
    fn test_plan_broadcast_strides() {
        let device = device();
        let out = Tensor::<CpuRuntime>::empty(&[2, 3], DType::F32, &device);
        let a = Tensor::<CpuRuntime>::from_slice(&[1.0f32, 2.0, 3.0], &[3], &device);
        let b = Tensor::<CpuRuntime>::from_slice(&[1.0f32, 2.0], &[2, 1], &device);

        let plan = IterBuilder::new("test")
            .output(&out)
            .input(&a)
            .input(&b)
            .build()
            .unwrap();

        assert_eq!(plan.shape(), &[2, 3]);
        assert_eq!(plan.numel(), 6);
        assert_eq!(plan.operand(1).strides.as_slice(), &[0, 1]);
        assert_eq!(plan.operand(2).strides.as_slice(), &[1, 0]);
    }

    #[test]
    fn test_output_shape_must_match_broadcast() {
        let device = device();
        let out = Tensor::<CpuRuntime>::empty(&[3], DType::F32, &device);
        let a = Tensor::<CpuRuntime>::empty(&[2, 3], DType::F32, &device);

        let err = IterBuilder::new("test")
            .output(&out)
            .input(&a)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_incompatible_inputs_fail() {
        let device = device();
        let out = Tensor::<CpuRuntime>::empty(&[3], DType::F32, &device);
        let a = Tensor::<CpuRuntime>::empty(&[3], DType::F32, &device);
        let b = Tensor::<CpuRuntime>::empty(&[4], DType::F32, &device);

        let err = IterBuilder::new("test")
            .output(&out)
            .input(&a)
            .input(&b)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::BroadcastError { .. }));
    }

    #[test]
    fn test_inplace_exempt_from_overlap_check() {
        let device = device();
        let a = Tensor::<CpuRuntime>::from_slice(&[1.0f32; 8], &[8], &device);

        let plan = IterBuilder::new("test")
            .check_overlap(true)
            .output(&a)
            .input(&a)
            .build();
        assert!(plan.is_ok());
    }

    #[test]
    fn test_partial_overlap_rejected() {
        let device = device();
        let base = Tensor::<CpuRuntime>::from_slice(&[0.0f32; 10], &[10], &device);
        let inp = base.narrow(0, 0, 6).unwrap();
        let out = base.narrow(0, 2, 6).unwrap();

        let err = IterBuilder::new("test")
            .check_overlap(true)
            .output(&out)
            .input(&inp)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::MemoryOverlap { .. }));
    }

    #[test]
    fn test_disjoint_views_of_one_storage_allowed() {
        let device = device();
        let base = Tensor::<CpuRuntime>::from_slice(&[0.0f32; 10], &[10], &device);
        let inp = base.narrow(0, 0, 5).unwrap();
        let out = base.narrow(0, 5, 5).unwrap();

        let plan = IterBuilder::new("test")
            .check_overlap(true)
            .output(&out)
            .input(&inp)
            .build();
        assert!(plan.is_ok());
    }
}
