//! Matrix-multiply primitive builder
//!
//! Constructs a vendor-primitive execution plan for rank-2 and rank-3
//! (batched) matrix multiply: operand layout bindings plus the
//! scale/accumulate attributes. Validation happens here, synchronously;
//! execution is a backend concern (the CPU backend hands the plan to the
//! `matrixmultiply` GEMM primitive on its queue).
//!
//! Layout bindings are zero-copy wrappers over existing buffers. Callers
//! materialize non-contiguous operands into contiguous storage before
//! building the plan; the vendor primitive requires simple strides, so the
//! contiguity fallback is a correctness requirement rather than a tuning
//! choice.

use crate::dtype::{DType, DTypeSet};
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::tensor::Tensor;

/// Element types the GEMM primitive is built for.
pub const GEMM_DTYPES: DTypeSet = DTypeSet::FLOATS;

/// Scale and accumulate attributes of one GEMM execution
///
/// `alpha != 1` becomes the primitive's output-scale; `beta != 0` its sum
/// post-op: `C = alpha * (A @ B) + beta * C`.
#[derive(Copy, Clone, Debug)]
pub struct GemmAttr {
    /// Product scale
    pub alpha: f64,
    /// Accumulate coefficient applied to the destination's prior contents
    pub beta: f64,
}

/// Validated GEMM dimensions
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GemmDims {
    /// Batch count (1 for rank-2)
    pub batch: usize,
    /// Result rows
    pub m: usize,
    /// Result columns
    pub n: usize,
    /// Contraction dimension
    pub k: usize,
}

/// Zero-copy layout binding of one operand buffer
#[derive(Copy, Clone, Debug)]
pub struct GemmOperand {
    /// Base device pointer of the storage
    pub ptr: u64,
    /// Element offset of the view
    pub offset: isize,
    /// Element stride between rows
    pub row_stride: isize,
    /// Element stride between columns
    pub col_stride: isize,
    /// Element stride between batches (0 for rank-2)
    pub batch_stride: isize,
}

/// A complete vendor-primitive execution plan
///
/// Built once per call and submitted to the queue; no caching across
/// calls.
#[derive(Copy, Clone, Debug)]
pub struct GemmPlan {
    /// Validated dimensions
    pub dims: GemmDims,
    /// Element type of all three operands
    pub dtype: DType,
    /// Left operand binding (batch x m x k)
    pub a: GemmOperand,
    /// Right operand binding (batch x k x n)
    pub b: GemmOperand,
    /// Destination binding (batch x m x n); also the accumulate source
    /// when `attr.beta != 0`
    pub c: GemmOperand,
    /// Scale/accumulate attributes
    pub attr: GemmAttr,
}

/// Right-aligned broadcast compatibility of `src` against `target`
///
/// Trailing dimensions align; each source size must be 1 or equal to the
/// target size. A rank-0 source or a source of higher rank than the target
/// is not compatible.
pub fn check_broadcast(src: &[usize], target: &[usize]) -> bool {
    if src.is_empty() || src.len() > target.len() {
        return false;
    }
    let skip = target.len() - src.len();
    src.iter()
        .zip(&target[skip..])
        .all(|(&s, &t)| s == 1 || s == t)
}

/// Result shape of `a @ b` at the given rank (2 or 3)
pub fn gemm_result_shape(a_shape: &[usize], b_shape: &[usize]) -> Vec<usize> {
    if a_shape.len() == 2 {
        vec![a_shape[0], b_shape[1]]
    } else {
        vec![a_shape[0], a_shape[1], b_shape[2]]
    }
}

/// Validate ranks, batch, and contraction dimensions; returns the GEMM
/// dimensions.
///
/// Ranks must all equal 2 or all equal 3; for rank 3 the leading (batch)
/// dimension must agree across both operands and the result; the
/// contraction dimension of the operands must match; the result must have
/// the operand-derived shape. Everything else is `ShapeMismatch`.
pub fn validate_gemm_shapes(
    result_shape: &[usize],
    a_shape: &[usize],
    b_shape: &[usize],
) -> Result<GemmDims> {
    let rank = result_shape.len();
    if rank != 2 && rank != 3 {
        return Err(Error::InvalidArgument {
            arg: "result",
            reason: format!("matmul works with 2-D or 3-D tensors, got rank {rank}"),
        });
    }
    if a_shape.len() != rank || b_shape.len() != rank {
        return Err(Error::shape_mismatch(a_shape, b_shape));
    }

    let m = result_shape[rank - 2];
    let n = result_shape[rank - 1];
    let k = a_shape[rank - 1];

    if k != b_shape[rank - 2] {
        return Err(Error::shape_mismatch(a_shape, b_shape));
    }

    let batch = if rank == 3 {
        let mb = result_shape[0];
        if mb != a_shape[0] || mb != b_shape[0] {
            return Err(Error::shape_mismatch(a_shape, b_shape));
        }
        mb
    } else {
        1
    };

    if a_shape[rank - 2] != m || b_shape[rank - 1] != n {
        return Err(Error::shape_mismatch(
            &gemm_result_shape(a_shape, b_shape),
            result_shape,
        ));
    }

    Ok(GemmDims { batch, m, n, k })
}

/// Bind a contiguous rank-2/3 tensor view as a GEMM operand.
fn bind_operand<R: Runtime>(t: &Tensor<R>) -> GemmOperand {
    let strides = t.strides();
    let rank = strides.len();
    GemmOperand {
        ptr: t.storage().ptr(),
        offset: t.layout().offset() as isize,
        row_stride: strides[rank - 2],
        col_stride: strides[rank - 1],
        batch_stride: if rank == 3 { strides[0] } else { 0 },
    }
}

/// Build the vendor-primitive execution plan
///
/// All three tensors must be contiguous (callers materialize first), share
/// a dtype in [`GEMM_DTYPES`], and have shapes already validated by
/// [`validate_gemm_shapes`].
pub fn build_gemm_plan<R: Runtime>(
    result: &Tensor<R>,
    a: &Tensor<R>,
    b: &Tensor<R>,
    dims: GemmDims,
    attr: GemmAttr,
) -> GemmPlan {
    debug_assert!(result.is_contiguous() && a.is_contiguous() && b.is_contiguous());
    GemmPlan {
        dims,
        dtype: result.dtype(),
        a: bind_operand(a),
        b: bind_operand(b),
        c: bind_operand(result),
        attr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_broadcast() {
        assert!(check_broadcast(&[5], &[3, 5]));
        assert!(check_broadcast(&[3, 5], &[3, 5]));
        assert!(check_broadcast(&[1, 5], &[3, 5]));
        assert!(check_broadcast(&[3, 1], &[3, 5]));
        assert!(!check_broadcast(&[3], &[3, 5]));
        assert!(!check_broadcast(&[2, 3, 5], &[3, 5]));
        assert!(!check_broadcast(&[], &[3, 5]));
    }

    #[test]
    fn test_validate_gemm_shapes_rank2() {
        let dims = validate_gemm_shapes(&[3, 5], &[3, 4], &[4, 5]).unwrap();
        assert_eq!(
            dims,
            GemmDims {
                batch: 1,
                m: 3,
                n: 5,
                k: 4
            }
        );

        // Contraction mismatch
        assert!(validate_gemm_shapes(&[3, 5], &[3, 4], &[2, 5]).is_err());
        // Rank mismatch between operands
        assert!(validate_gemm_shapes(&[3, 5], &[1, 3, 4], &[4, 5]).is_err());
    }

    #[test]
    fn test_validate_gemm_shapes_rank3() {
        let dims = validate_gemm_shapes(&[2, 3, 5], &[2, 3, 4], &[2, 4, 5]).unwrap();
        assert_eq!(
            dims,
            GemmDims {
                batch: 2,
                m: 3,
                n: 5,
                k: 4
            }
        );

        // Batch mismatch
        assert!(validate_gemm_shapes(&[2, 3, 5], &[2, 3, 4], &[3, 4, 5]).is_err());
    }

    #[test]
    fn test_gemm_result_shape() {
        assert_eq!(gemm_result_shape(&[3, 4], &[4, 5]), vec![3, 5]);
        assert_eq!(gemm_result_shape(&[2, 3, 4], &[2, 4, 5]), vec![2, 3, 5]);
    }
}
