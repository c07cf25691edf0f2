//! Activation operations trait.

use crate::dtype::{DType, DTypeSet};
use crate::error::Result;
use crate::runtime::Runtime;
use crate::tensor::Tensor;

/// Element types the ELU forward kernels are instantiated for:
/// full floating precision plus both reduced-precision types.
pub const ELU_DTYPES: DTypeSet = DTypeSet::FLOATS;

/// Element types the ELU backward kernels are instantiated for; no F16
/// instantiation exists for the gradient.
pub const ELU_BACKWARD_DTYPES: DTypeSet =
    DTypeSet::FLOATS.difference(DTypeSet::single(DType::F16));

/// ELU activation, in the full PyTorch-style parameterization:
///
/// forward:  `x <= 0  ->  (exp(x * input_scale) - 1) * alpha * scale`
///           `x >  0  ->  x * scale`
///
/// backward, computed from the *forward output* rather than the input:
///           `out <= 0  ->  grad_out * input_scale * (out + alpha * scale)`
///           `out >  0  ->  grad_out * scale`
///
/// Both branches are data-parallel and side-effect-free; every variant is
/// an asynchronous queue submission.
pub trait ActivationOps<R: Runtime> {
    /// ELU into a fresh tensor
    fn elu(&self, a: &Tensor<R>, alpha: f64, scale: f64, input_scale: f64) -> Result<Tensor<R>>;

    /// ELU into a caller-provided output
    ///
    /// `out` must match `a` in shape and dtype. Passing the same tensor as
    /// `a` and `out` is the supported in-place form; any other aliasing
    /// between them fails with `MemoryOverlap`.
    fn elu_out(
        &self,
        a: &Tensor<R>,
        alpha: f64,
        scale: f64,
        input_scale: f64,
        out: &Tensor<R>,
    ) -> Result<Tensor<R>>;

    /// In-place ELU: `elu_out` with output aliased to the input
    fn elu_(&self, a: &Tensor<R>, alpha: f64, scale: f64, input_scale: f64) -> Result<Tensor<R>>;

    /// ELU gradient into a fresh tensor
    ///
    /// `output` is the tensor the forward pass produced.
    fn elu_backward(
        &self,
        grad_output: &Tensor<R>,
        alpha: f64,
        scale: f64,
        input_scale: f64,
        output: &Tensor<R>,
    ) -> Result<Tensor<R>>;

    /// ELU gradient into a caller-provided output
    fn elu_backward_out(
        &self,
        grad_output: &Tensor<R>,
        alpha: f64,
        scale: f64,
        input_scale: f64,
        output: &Tensor<R>,
        grad_input: &Tensor<R>,
    ) -> Result<Tensor<R>>;
}
