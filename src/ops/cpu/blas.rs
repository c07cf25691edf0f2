//! CPU implementation of the dense matrix-multiply surface.
//!
//! Plans are built by `ops::blas` and executed on the queue by the
//! `matrixmultiply` GEMM primitive, whose `alpha`/`beta` arguments carry
//! the scale and accumulate attributes directly. Half-precision operands
//! are promoted to f32 for the primitive and demoted on store.

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::ops::blas::{
    build_gemm_plan, check_broadcast, gemm_result_shape, validate_gemm_shapes, GemmAttr, GemmPlan,
    GEMM_DTYPES,
};
use crate::ops::dispatch::ensure_supported;
use crate::ops::BlasOps;
use crate::runtime::cpu::{CpuClient, CpuRuntime};
use crate::runtime::{recorder, ExecQueue, RuntimeClient};
use crate::tensor::Tensor;

fn validate_gemm_dtype(dtype: DType, op: &'static str) -> Result<()> {
    ensure_supported(dtype, GEMM_DTYPES, op)?;
    #[cfg(not(feature = "f16"))]
    if matches!(dtype, DType::F16 | DType::BF16) {
        return Err(Error::FeatureRequired {
            dtype,
            feature: "f16",
        });
    }
    Ok(())
}

fn validate_operand_dtypes(op: &'static str, tensors: &[&Tensor<CpuRuntime>]) -> Result<DType> {
    let dtype = tensors[0].dtype();
    validate_gemm_dtype(dtype, op)?;
    for t in &tensors[1..] {
        if t.dtype() != dtype {
            return Err(Error::DTypeMismatch {
                lhs: dtype,
                rhs: t.dtype(),
            });
        }
    }
    Ok(dtype)
}

fn expect_rank(t: &Tensor<CpuRuntime>, rank: usize, arg: &'static str) -> Result<()> {
    if t.ndim() != rank {
        return Err(Error::invalid_argument(
            arg,
            format!("expected a {rank}-D tensor, got shape {:?}", t.shape()),
        ));
    }
    Ok(())
}

impl CpuClient {
    /// Validate, materialize, and submit one GEMM into `result`.
    ///
    /// Validation is complete before anything is submitted; the operand
    /// materialization copies and the primitive itself are asynchronous
    /// queue submissions in FIFO order.
    fn gemm_into(
        &self,
        result: &Tensor<CpuRuntime>,
        a: &Tensor<CpuRuntime>,
        b: &Tensor<CpuRuntime>,
        attr: GemmAttr,
        op: &'static str,
    ) -> Result<()> {
        let dims = validate_gemm_shapes(result.shape(), a.shape(), b.shape())?;
        if !result.is_contiguous() {
            return Err(Error::invalid_argument(
                "out",
                format!("{op} destination must be contiguous"),
            ));
        }
        if dims.batch * dims.m * dims.n == 0 {
            return Ok(());
        }

        let a = self.ensure_contiguous(a)?;
        let b = self.ensure_contiguous(b)?;
        let plan = build_gemm_plan(result, &a, &b, dims, attr);
        log::debug!(
            "{op}: batch={} m={} n={} k={} dtype={} alpha={} beta={}",
            plan.dims.batch,
            plan.dims.m,
            plan.dims.n,
            plan.dims.k,
            plan.dtype,
            attr.alpha,
            attr.beta
        );
        submit_gemm(self.queue(), plan)
    }
}

fn submit_gemm(queue: &ExecQueue, plan: GemmPlan) -> Result<()> {
    let ticket = queue.submit(move || execute_gemm(&plan))?;
    for ptr in [plan.a.ptr, plan.b.ptr, plan.c.ptr] {
        recorder::record(ptr, queue, ticket);
    }
    Ok(())
}

fn execute_gemm(plan: &GemmPlan) {
    match plan.dtype {
        // SAFETY: the plan binds contiguous buffers whose extents were
        // validated against the plan dimensions before submission.
        DType::F32 => unsafe { gemm_f32(plan) },
        DType::F64 => unsafe { gemm_f64(plan) },
        #[cfg(feature = "f16")]
        DType::F16 => unsafe { gemm_promoted::<half::f16>(plan) },
        #[cfg(feature = "f16")]
        DType::BF16 => unsafe { gemm_promoted::<half::bf16>(plan) },
        _ => unreachable!("gemm dtype validated at plan construction"),
    }
}

unsafe fn gemm_f32(plan: &GemmPlan) {
    let dims = plan.dims;
    let alpha = plan.attr.alpha as f32;
    let beta = plan.attr.beta as f32;
    for batch in 0..dims.batch as isize {
        let a = (plan.a.ptr as *const f32).offset(plan.a.offset + batch * plan.a.batch_stride);
        let b = (plan.b.ptr as *const f32).offset(plan.b.offset + batch * plan.b.batch_stride);
        let c = (plan.c.ptr as *mut f32).offset(plan.c.offset + batch * plan.c.batch_stride);
        if dims.k == 0 {
            // Empty contraction: the primitive has nothing to add, but the
            // accumulate attribute still applies to the destination.
            scale_destination(c, dims.m * dims.n, beta);
            continue;
        }
        matrixmultiply::sgemm(
            dims.m,
            dims.k,
            dims.n,
            alpha,
            a,
            plan.a.row_stride,
            plan.a.col_stride,
            b,
            plan.b.row_stride,
            plan.b.col_stride,
            beta,
            c,
            plan.c.row_stride,
            plan.c.col_stride,
        );
    }
}

unsafe fn gemm_f64(plan: &GemmPlan) {
    let dims = plan.dims;
    let alpha = plan.attr.alpha;
    let beta = plan.attr.beta;
    for batch in 0..dims.batch as isize {
        let a = (plan.a.ptr as *const f64).offset(plan.a.offset + batch * plan.a.batch_stride);
        let b = (plan.b.ptr as *const f64).offset(plan.b.offset + batch * plan.b.batch_stride);
        let c = (plan.c.ptr as *mut f64).offset(plan.c.offset + batch * plan.c.batch_stride);
        if dims.k == 0 {
            scale_destination(c, dims.m * dims.n, beta);
            continue;
        }
        matrixmultiply::dgemm(
            dims.m,
            dims.k,
            dims.n,
            alpha,
            a,
            plan.a.row_stride,
            plan.a.col_stride,
            b,
            plan.b.row_stride,
            plan.b.col_stride,
            beta,
            c,
            plan.c.row_stride,
            plan.c.col_stride,
        );
    }
}

unsafe fn scale_destination<T: Element>(c: *mut T, len: usize, beta: T) {
    for i in 0..len {
        let v = *c.add(i);
        *c.add(i) = v * beta;
    }
}

/// Reduced-precision GEMM: promote both operands (and the destination when
/// accumulating) to f32, run the primitive, demote on store.
#[cfg(feature = "f16")]
unsafe fn gemm_promoted<T: Element>(plan: &GemmPlan) {
    let dims = plan.dims;
    let alpha = plan.attr.alpha as f32;
    let beta = plan.attr.beta as f32;
    for batch in 0..dims.batch as isize {
        let a = (plan.a.ptr as *const T).offset(plan.a.offset + batch * plan.a.batch_stride);
        let b = (plan.b.ptr as *const T).offset(plan.b.offset + batch * plan.b.batch_stride);
        let c = (plan.c.ptr as *mut T).offset(plan.c.offset + batch * plan.c.batch_stride);

        // Operands are contiguous per plan construction, so the promotion
        // reads them linearly.
        let a32: Vec<f32> = std::slice::from_raw_parts(a, dims.m * dims.k)
            .iter()
            .map(|v| v.to_f64() as f32)
            .collect();
        let b32: Vec<f32> = std::slice::from_raw_parts(b, dims.k * dims.n)
            .iter()
            .map(|v| v.to_f64() as f32)
            .collect();
        let c_out = std::slice::from_raw_parts_mut(c, dims.m * dims.n);
        let mut c32: Vec<f32> = if beta != 0.0 {
            c_out.iter().map(|v| v.to_f64() as f32).collect()
        } else {
            vec![0.0; dims.m * dims.n]
        };

        if dims.k == 0 {
            for v in &mut c32 {
                *v *= beta;
            }
        } else {
            matrixmultiply::sgemm(
                dims.m,
                dims.k,
                dims.n,
                alpha,
                a32.as_ptr(),
                dims.k as isize,
                1,
                b32.as_ptr(),
                dims.n as isize,
                1,
                beta,
                c32.as_mut_ptr(),
                dims.n as isize,
                1,
            );
        }

        for (dst, &v) in c_out.iter_mut().zip(&c32) {
            *dst = T::from_f64(v as f64);
        }
    }
}

impl BlasOps<CpuRuntime> for CpuClient {
    fn mm(&self, a: &Tensor<CpuRuntime>, b: &Tensor<CpuRuntime>) -> Result<Tensor<CpuRuntime>> {
        let dtype = validate_operand_dtypes("mm", &[a, b])?;
        expect_rank(a, 2, "a")?;
        expect_rank(b, 2, "b")?;

        let out =
            Tensor::<CpuRuntime>::try_empty(&gemm_result_shape(a.shape(), b.shape()), dtype, &self.device)?;
        self.gemm_into(&out, a, b, GemmAttr { alpha: 1.0, beta: 0.0 }, "mm")?;
        Ok(out)
    }

    fn mm_out(
        &self,
        out: &Tensor<CpuRuntime>,
        a: &Tensor<CpuRuntime>,
        b: &Tensor<CpuRuntime>,
    ) -> Result<Tensor<CpuRuntime>> {
        validate_operand_dtypes("mm_out", &[out, a, b])?;
        expect_rank(a, 2, "a")?;
        expect_rank(b, 2, "b")?;

        self.gemm_into(out, a, b, GemmAttr { alpha: 1.0, beta: 0.0 }, "mm_out")?;
        Ok(out.clone())
    }

    fn bmm(&self, a: &Tensor<CpuRuntime>, b: &Tensor<CpuRuntime>) -> Result<Tensor<CpuRuntime>> {
        let dtype = validate_operand_dtypes("bmm", &[a, b])?;
        expect_rank(a, 3, "a")?;
        expect_rank(b, 3, "b")?;

        let out =
            Tensor::<CpuRuntime>::try_empty(&gemm_result_shape(a.shape(), b.shape()), dtype, &self.device)?;
        self.gemm_into(&out, a, b, GemmAttr { alpha: 1.0, beta: 0.0 }, "bmm")?;
        Ok(out)
    }

    fn bmm_out(
        &self,
        out: &Tensor<CpuRuntime>,
        a: &Tensor<CpuRuntime>,
        b: &Tensor<CpuRuntime>,
    ) -> Result<Tensor<CpuRuntime>> {
        validate_operand_dtypes("bmm_out", &[out, a, b])?;
        expect_rank(a, 3, "a")?;
        expect_rank(b, 3, "b")?;

        self.gemm_into(out, a, b, GemmAttr { alpha: 1.0, beta: 0.0 }, "bmm_out")?;
        Ok(out.clone())
    }

    fn addmm(
        &self,
        input: &Tensor<CpuRuntime>,
        a: &Tensor<CpuRuntime>,
        b: &Tensor<CpuRuntime>,
        beta: f64,
        alpha: f64,
    ) -> Result<Tensor<CpuRuntime>> {
        let dtype = validate_operand_dtypes("addmm", &[input, a, b])?;
        expect_rank(a, 2, "a")?;
        expect_rank(b, 2, "b")?;

        let result_shape = gemm_result_shape(a.shape(), b.shape());
        validate_gemm_shapes(&result_shape, a.shape(), b.shape())?;
        if beta != 0.0 && !check_broadcast(input.shape(), &result_shape) {
            return Err(Error::broadcast(input.shape(), &result_shape));
        }

        let out = Tensor::<CpuRuntime>::try_empty(&result_shape, dtype, &self.device)?;
        if beta != 0.0 {
            // The accumulate source is materialized (expanded) into the
            // destination; the primitive's sum post-op then scales it.
            self.copy_into(&out, input)?;
        }
        self.gemm_into(&out, a, b, GemmAttr { alpha, beta }, "addmm")?;
        Ok(out)
    }

    fn addmm_(
        &self,
        self_t: &Tensor<CpuRuntime>,
        a: &Tensor<CpuRuntime>,
        b: &Tensor<CpuRuntime>,
        beta: f64,
        alpha: f64,
    ) -> Result<Tensor<CpuRuntime>> {
        validate_operand_dtypes("addmm_", &[self_t, a, b])?;
        expect_rank(self_t, 2, "self")?;
        expect_rank(a, 2, "a")?;
        expect_rank(b, 2, "b")?;

        // Accumulate source and destination share identity, so the
        // materialization step is skipped; the destination already holds
        // the correct post-accumulate contents once the primitive ran.
        self.gemm_into(self_t, a, b, GemmAttr { alpha, beta }, "addmm_")?;
        Ok(self_t.clone())
    }

    fn baddbmm(
        &self,
        input: &Tensor<CpuRuntime>,
        a: &Tensor<CpuRuntime>,
        b: &Tensor<CpuRuntime>,
        beta: f64,
        alpha: f64,
    ) -> Result<Tensor<CpuRuntime>> {
        let dtype = validate_operand_dtypes("baddbmm", &[input, a, b])?;
        expect_rank(a, 3, "a")?;
        expect_rank(b, 3, "b")?;

        let result_shape = gemm_result_shape(a.shape(), b.shape());
        validate_gemm_shapes(&result_shape, a.shape(), b.shape())?;
        if beta != 0.0 && !check_broadcast(input.shape(), &result_shape) {
            return Err(Error::broadcast(input.shape(), &result_shape));
        }

        let out = Tensor::<CpuRuntime>::try_empty(&result_shape, dtype, &self.device)?;
        if beta != 0.0 {
            self.copy_into(&out, input)?;
        }
        self.gemm_into(&out, a, b, GemmAttr { alpha, beta }, "baddbmm")?;
        Ok(out)
    }

    fn baddbmm_(
        &self,
        self_t: &Tensor<CpuRuntime>,
        a: &Tensor<CpuRuntime>,
        b: &Tensor<CpuRuntime>,
        beta: f64,
        alpha: f64,
    ) -> Result<Tensor<CpuRuntime>> {
        validate_operand_dtypes("baddbmm_", &[self_t, a, b])?;
        expect_rank(self_t, 3, "self")?;
        expect_rank(a, 3, "a")?;
        expect_rank(b, 3, "b")?;

        self.gemm_into(self_t, a, b, GemmAttr { alpha, beta }, "baddbmm_")?;
        Ok(self_t.clone())
    }

    fn baddbmm_out(
        &self,
        out: &Tensor<CpuRuntime>,
        input: &Tensor<CpuRuntime>,
        a: &Tensor<CpuRuntime>,
        b: &Tensor<CpuRuntime>,
        beta: f64,
        alpha: f64,
    ) -> Result<Tensor<CpuRuntime>> {
        validate_operand_dtypes("baddbmm_out", &[out, input, a, b])?;
        expect_rank(a, 3, "a")?;
        expect_rank(b, 3, "b")?;

        validate_gemm_shapes(out.shape(), a.shape(), b.shape())?;
        if beta != 0.0 && !check_broadcast(input.shape(), out.shape()) {
            return Err(Error::broadcast(input.shape(), out.shape()));
        }

        if beta != 0.0 {
            self.copy_into(out, input)?;
        }
        self.gemm_into(out, a, b, GemmAttr { alpha, beta }, "baddbmm_out")?;
        Ok(out.clone())
    }
}
