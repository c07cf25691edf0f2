//! Operator surface
//!
//! Operations are defined as traits implemented by runtime clients, giving
//! each operator access to the device and the execution queue:
//!
//! ```text
//! RuntimeClient<R>
//!   ├── ActivationOps   (elu, elu_, elu_out, elu_backward, ...)
//!   ├── ConditionalOps  (where_cond)
//!   ├── IndexingOps     (repeat_interleave)
//!   └── BlasOps         (mm, addmm, bmm, baddbmm, ... via the vendor GEMM)
//! ```
//!
//! Every operator declares the dtype set its kernels are instantiated for;
//! [`dispatch::ensure_supported`] rejects anything else with
//! `UnsupportedDType` before any queue submission.

pub mod blas;
mod cpu;
pub mod dispatch;
mod traits;

pub use dispatch::ensure_supported;
pub use traits::{
    ActivationOps, BlasOps, ConditionalOps, IndexingOps, ELU_BACKWARD_DTYPES, ELU_DTYPES,
    REPEAT_DTYPES, WHERE_COND_DTYPES, WHERE_VALUE_DTYPES,
};

/// Compute the broadcast shape of two shapes
///
/// Trailing dimensions align right; a size of 1 broadcasts against any
/// size; anything else must match. Returns `None` for incompatible shapes.
/// Exposed for callers building new N-ary operators; the iteration-space
/// builder folds this over all operands.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let max_ndim = a.len().max(b.len());
    let mut result = vec![0usize; max_ndim];

    for i in 0..max_ndim {
        let a_dim = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let b_dim = if i < b.len() { b[b.len() - 1 - i] } else { 1 };

        result[max_ndim - 1 - i] = if a_dim == b_dim {
            a_dim
        } else if a_dim == 1 {
            b_dim
        } else if b_dim == 1 {
            a_dim
        } else {
            return None;
        };
    }

    Some(result)
}
