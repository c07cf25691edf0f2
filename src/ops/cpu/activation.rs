//! CPU implementation of the ELU activation family.

use crate::dispatch_dtype;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::iter::IterBuilder;
use crate::ops::dispatch::ensure_supported;
use crate::ops::{ActivationOps, ELU_BACKWARD_DTYPES, ELU_DTYPES};
use crate::runtime::cpu::launch::{launch_binary, launch_unary};
use crate::runtime::cpu::{CpuClient, CpuRuntime};
use crate::runtime::RuntimeClient;
use crate::tensor::Tensor;

impl ActivationOps<CpuRuntime> for CpuClient {
    fn elu(
        &self,
        a: &Tensor<CpuRuntime>,
        alpha: f64,
        scale: f64,
        input_scale: f64,
    ) -> Result<Tensor<CpuRuntime>> {
        ensure_supported(a.dtype(), ELU_DTYPES, "elu")?;
        let out = Tensor::<CpuRuntime>::try_empty(a.shape(), a.dtype(), &self.device)?;
        self.elu_out(a, alpha, scale, input_scale, &out)
    }

    fn elu_out(
        &self,
        a: &Tensor<CpuRuntime>,
        alpha: f64,
        scale: f64,
        input_scale: f64,
        out: &Tensor<CpuRuntime>,
    ) -> Result<Tensor<CpuRuntime>> {
        ensure_supported(a.dtype(), ELU_DTYPES, "elu")?;
        if out.dtype() != a.dtype() {
            return Err(Error::DTypeMismatch {
                lhs: out.dtype(),
                rhs: a.dtype(),
            });
        }

        let plan = IterBuilder::new("elu")
            .check_overlap(true)
            .output(out)
            .input(a)
            .build()?;

        let negcoef = alpha * scale;
        let poscoef = scale;
        let negiptocoef = input_scale;

        dispatch_dtype!(a.dtype(), T => {
            launch_unary::<T, _>(self.queue(), &plan, move |x| {
                let x = x.to_f64();
                let y = if x <= 0.0 {
                    (f64::exp(x * negiptocoef) - 1.0) * negcoef
                } else {
                    x * poscoef
                };
                T::from_f64(y)
            })
        }, "elu")?;

        Ok(out.clone())
    }

    fn elu_(
        &self,
        a: &Tensor<CpuRuntime>,
        alpha: f64,
        scale: f64,
        input_scale: f64,
    ) -> Result<Tensor<CpuRuntime>> {
        self.elu_out(a, alpha, scale, input_scale, a)
    }

    fn elu_backward(
        &self,
        grad_output: &Tensor<CpuRuntime>,
        alpha: f64,
        scale: f64,
        input_scale: f64,
        output: &Tensor<CpuRuntime>,
    ) -> Result<Tensor<CpuRuntime>> {
        ensure_supported(grad_output.dtype(), ELU_BACKWARD_DTYPES, "elu_backward")?;
        let grad_input =
            Tensor::<CpuRuntime>::try_empty(grad_output.shape(), grad_output.dtype(), &self.device)?;
        self.elu_backward_out(grad_output, alpha, scale, input_scale, output, &grad_input)
    }

    fn elu_backward_out(
        &self,
        grad_output: &Tensor<CpuRuntime>,
        alpha: f64,
        scale: f64,
        input_scale: f64,
        output: &Tensor<CpuRuntime>,
        grad_input: &Tensor<CpuRuntime>,
    ) -> Result<Tensor<CpuRuntime>> {
        ensure_supported(grad_output.dtype(), ELU_BACKWARD_DTYPES, "elu_backward")?;
        for t in [output, grad_input] {
            if t.dtype() != grad_output.dtype() {
                return Err(Error::DTypeMismatch {
                    lhs: grad_output.dtype(),
                    rhs: t.dtype(),
                });
            }
        }

        let plan = IterBuilder::new("elu_backward")
            .check_overlap(true)
            .output(grad_input)
            .input(grad_output)
            .input(output)
            .build()?;

        let negcoef = alpha * scale;
        let poscoef = scale;
        let negiptocoef = input_scale;

        // The gradient is reconstructed from the forward *output*: its sign
        // carries the branch taken by the forward pass.
        dispatch_dtype!(grad_output.dtype(), T => {
            launch_binary::<T, _>(self.queue(), &plan, move |go, out| {
                let go = go.to_f64();
                let out = out.to_f64();
                let y = if out <= 0.0 {
                    go * negiptocoef * (out + negcoef)
                } else {
                    go * poscoef
                };
                T::from_f64(y)
            })
        }, "elu_backward")?;

        Ok(grad_input.clone())
    }
}
