//! Dense matrix-multiply operations trait.

use crate::error::Result;
use crate::runtime::Runtime;
use crate::tensor::Tensor;

/// Dense matrix multiply, unbatched (rank 2) and batched (rank 3), with
/// optional scale and accumulate:
///
/// ```text
/// result = alpha * (a @ b) + beta * accumulate_source
/// ```
///
/// Execution delegates to the vendor GEMM primitive; `alpha` becomes the
/// primitive's output-scale attribute and a non-zero `beta` its sum
/// post-op. The accumulate source is broadcast-resolved under the
/// right-aligned rule and materialized into the destination before the
/// primitive runs, since accumulation is expressed to the vendor as "add
/// into destination". With `beta == 0` the accumulate source is never
/// read.
///
/// Non-contiguous operands are materialized into contiguous storage first;
/// the primitive requires simple strides. Destinations of `_out` and
/// in-place variants must already be contiguous.
pub trait BlasOps<R: Runtime> {
    /// Matrix multiply: `a @ b` for rank-2 operands
    fn mm(&self, a: &Tensor<R>, b: &Tensor<R>) -> Result<Tensor<R>>;

    /// Matrix multiply into a caller-provided rank-2 output
    fn mm_out(&self, out: &Tensor<R>, a: &Tensor<R>, b: &Tensor<R>) -> Result<Tensor<R>>;

    /// Batched matrix multiply: `a @ b` per batch for rank-3 operands
    /// with equal leading (batch) dimension
    fn bmm(&self, a: &Tensor<R>, b: &Tensor<R>) -> Result<Tensor<R>>;

    /// Batched matrix multiply into a caller-provided rank-3 output
    fn bmm_out(&self, out: &Tensor<R>, a: &Tensor<R>, b: &Tensor<R>) -> Result<Tensor<R>>;

    /// `alpha * (a @ b) + beta * input` for rank-2 operands
    ///
    /// `input` must broadcast to the result shape when `beta != 0`, else
    /// `BroadcastError`.
    fn addmm(
        &self,
        input: &Tensor<R>,
        a: &Tensor<R>,
        b: &Tensor<R>,
        beta: f64,
        alpha: f64,
    ) -> Result<Tensor<R>>;

    /// In-place `addmm`: `self_t = alpha * (a @ b) + beta * self_t`
    ///
    /// `self_t` is both the accumulate source and the destination; its
    /// shape must equal the result shape exactly.
    fn addmm_(
        &self,
        self_t: &Tensor<R>,
        a: &Tensor<R>,
        b: &Tensor<R>,
        beta: f64,
        alpha: f64,
    ) -> Result<Tensor<R>>;

    /// `alpha * (a @ b) + beta * input` per batch for rank-3 operands
    fn baddbmm(
        &self,
        input: &Tensor<R>,
        a: &Tensor<R>,
        b: &Tensor<R>,
        beta: f64,
        alpha: f64,
    ) -> Result<Tensor<R>>;

    /// In-place batched `addmm`
    fn baddbmm_(
        &self,
        self_t: &Tensor<R>,
        a: &Tensor<R>,
        b: &Tensor<R>,
        beta: f64,
        alpha: f64,
    ) -> Result<Tensor<R>>;

    /// Batched `addmm` into a caller-provided rank-3 output
    #[allow(clippy::too_many_arguments)]
    fn baddbmm_out(
        &self,
        out: &Tensor<R>,
        input: &Tensor<R>,
        a: &Tensor<R>,
        b: &Tensor<R>,
        beta: f64,
        alpha: f64,
    ) -> Result<Tensor<R>>;
}
