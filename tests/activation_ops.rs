//! Tests for the ELU activation family: forward, in-place, backward, and
//! the overlap/type validation around them.

mod common;

use accelr::dtype::DType;
use accelr::error::Error;
use accelr::ops::ActivationOps;
use accelr::runtime::cpu::CpuRuntime;
use accelr::runtime::RuntimeClient;
use accelr::tensor::Tensor;
use common::{assert_allclose_f64, create_cpu_client, create_isolated_client};

/// Host reference for the forward formula.
fn elu_ref(x: f64, alpha: f64, scale: f64, input_scale: f64) -> f64 {
    if x <= 0.0 {
        ((x * input_scale).exp() - 1.0) * alpha * scale
    } else {
        x * scale
    }
}

#[test]
fn test_elu_forward_both_branches() {
    let (client, device) = create_cpu_client();

    let xs = [-2.0f64, -0.5, 0.0, 0.7, 3.0];
    let x = Tensor::<CpuRuntime>::from_slice(&xs, &[xs.len()], &device);

    let y = client.elu(&x, 1.0, 1.0, 1.0).unwrap();
    client.synchronize().unwrap();

    let got: Vec<f64> = y.to_vec();
    let want: Vec<f64> = xs.iter().map(|&v| elu_ref(v, 1.0, 1.0, 1.0)).collect();
    assert_allclose_f64(&got, &want, 1e-12, 1e-14, "elu f64");
}

#[test]
fn test_elu_forward_nondefault_coefficients() {
    let (client, device) = create_cpu_client();

    let xs = [-3.0f32, -1.0, 0.0, 0.5, 2.0];
    let x = Tensor::<CpuRuntime>::from_slice(&xs, &[xs.len()], &device);

    let (alpha, scale, input_scale) = (0.5, 1.5, 2.0);
    let y = client.elu(&x, alpha, scale, input_scale).unwrap();
    client.synchronize().unwrap();

    let got: Vec<f32> = y.to_vec();
    for (g, &v) in got.iter().zip(xs.iter()) {
        let want = elu_ref(v as f64, alpha, scale, input_scale) as f32;
        assert!((g - want).abs() < 1e-6, "elu({v}) = {g}, want {want}");
    }
}

#[test]
fn test_elu_zero_boundary() {
    let (client, device) = create_cpu_client();

    let x = Tensor::<CpuRuntime>::from_slice(&[0.0f32], &[1], &device);
    let y = client.elu(&x, 1.0, 1.0, 1.0).unwrap();
    client.synchronize().unwrap();

    // x == 0 takes the negative branch: (exp(0) - 1) * alpha * scale == 0.
    let got: Vec<f32> = y.to_vec();
    assert_eq!(got, vec![0.0]);
}

#[test]
fn test_elu_inplace_bit_identical() {
    let (client, device) = create_cpu_client();

    let xs: Vec<f32> = (-8..8).map(|i| i as f32 * 0.37).collect();
    let x1 = Tensor::<CpuRuntime>::from_slice(&xs, &[xs.len()], &device);
    let x2 = Tensor::<CpuRuntime>::from_slice(&xs, &[xs.len()], &device);

    let out = client.elu(&x1, 1.3, 0.9, 1.1).unwrap();
    let inplace = client.elu_(&x2, 1.3, 0.9, 1.1).unwrap();
    client.synchronize().unwrap();

    // Same kernel, same input: results are bit-identical.
    let a: Vec<u32> = out.to_vec();
    let b: Vec<u32> = inplace.to_vec();
    assert_eq!(a, b);
    // And the in-place result landed in x2's storage.
    assert_eq!(inplace.storage().ptr(), x2.storage().ptr());
}

#[test]
fn test_elu_out_preallocated() {
    let (client, device) = create_cpu_client();

    let x = Tensor::<CpuRuntime>::from_slice(&[-1.0f32, 1.0], &[2], &device);
    let out = Tensor::<CpuRuntime>::empty(&[2], DType::F32, &device);

    client.elu_out(&x, 1.0, 1.0, 1.0, &out).unwrap();
    client.synchronize().unwrap();

    let got: Vec<f32> = out.to_vec();
    assert!((got[0] - ((-1.0f64).exp() - 1.0) as f32).abs() < 1e-6);
    assert_eq!(got[1], 1.0);
}

#[test]
fn test_elu_out_shape_mismatch() {
    let (client, device) = create_cpu_client();

    let x = Tensor::<CpuRuntime>::from_slice(&[1.0f32, 2.0], &[2], &device);
    let out = Tensor::<CpuRuntime>::empty(&[3], DType::F32, &device);

    let err = client.elu_out(&x, 1.0, 1.0, 1.0, &out).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
}

#[test]
fn test_elu_out_partial_overlap_rejected() {
    let (client, device) = create_cpu_client();

    let base = Tensor::<CpuRuntime>::from_slice(&[1.0f32; 10], &[10], &device);
    let input = base.narrow(0, 0, 6).unwrap();
    let out = base.narrow(0, 2, 6).unwrap();

    let err = client.elu_out(&input, 1.0, 1.0, 1.0, &out).unwrap_err();
    assert!(matches!(err, Error::MemoryOverlap { .. }));
}

#[test]
fn test_elu_backward_both_branches() {
    let (client, device) = create_cpu_client();

    // With alpha = scale = input_scale = 1 the analytic gradient is
    // exp(x) for x <= 0 and 1 for x > 0, and the backward formula
    // reconstructs it from the forward output as `output + alpha`.
    let xs = [-2.0f64, -0.5, 0.0, 0.7, 3.0];
    let x = Tensor::<CpuRuntime>::from_slice(&xs, &[xs.len()], &device);
    let output = client.elu(&x, 1.0, 1.0, 1.0).unwrap();

    let ones = vec![1.0f64; xs.len()];
    let grad_out = Tensor::<CpuRuntime>::from_slice(&ones, &[xs.len()], &device);

    let grad_in = client
        .elu_backward(&grad_out, 1.0, 1.0, 1.0, &output)
        .unwrap();
    client.synchronize().unwrap();

    let got: Vec<f64> = grad_in.to_vec();
    let want: Vec<f64> = xs
        .iter()
        .map(|&v| if v <= 0.0 { v.exp() } else { 1.0 })
        .collect();
    assert_allclose_f64(&got, &want, 1e-12, 1e-14, "elu backward f64");
}

#[test]
fn test_elu_backward_scales_grad_output() {
    let (client, device) = create_cpu_client();

    let xs = [-1.0f64, 2.0];
    let x = Tensor::<CpuRuntime>::from_slice(&xs, &[2], &device);
    let output = client.elu(&x, 1.0, 1.0, 1.0).unwrap();
    let grad_out = Tensor::<CpuRuntime>::from_slice(&[0.5f64, -2.0], &[2], &device);

    let grad_in = client
        .elu_backward(&grad_out, 1.0, 1.0, 1.0, &output)
        .unwrap();
    client.synchronize().unwrap();

    let got: Vec<f64> = grad_in.to_vec();
    assert_allclose_f64(
        &got,
        &[0.5 * (-1.0f64).exp(), -2.0],
        1e-12,
        1e-14,
        "elu backward grad scaling",
    );
}

#[test]
fn test_elu_unsupported_dtype_no_submission() {
    let (client, device) = create_isolated_client();

    let x = Tensor::<CpuRuntime>::from_slice(&[1i64, 2, 3], &[3], &device);
    let before = client.queue().submissions();

    let err = client.elu(&x, 1.0, 1.0, 1.0).unwrap_err();
    assert!(matches!(
        err,
        Error::UnsupportedDType {
            dtype: DType::I64,
            ..
        }
    ));
    // Validation failed before anything reached the queue.
    assert_eq!(client.queue().submissions(), before);
}

#[cfg(feature = "f16")]
#[test]
fn test_elu_backward_rejects_f16() {
    let (client, device) = create_isolated_client();

    let go = Tensor::<CpuRuntime>::from_slice(
        &[half::f16::from_f32(1.0), half::f16::from_f32(1.0)],
        &[2],
        &device,
    );
    let out = Tensor::<CpuRuntime>::from_slice(
        &[half::f16::from_f32(0.5), half::f16::from_f32(-0.5)],
        &[2],
        &device,
    );

    let before = client.queue().submissions();
    let err = client.elu_backward(&go, 1.0, 1.0, 1.0, &out).unwrap_err();
    assert!(matches!(
        err,
        Error::UnsupportedDType {
            dtype: DType::F16,
            ..
        }
    ));
    assert_eq!(client.queue().submissions(), before);
}

#[cfg(feature = "f16")]
#[test]
fn test_elu_reduced_precision_forward() {
    let (client, device) = create_cpu_client();

    let xs = [-1.0f32, 0.5, 2.0];

    let x16: Vec<half::f16> = xs.iter().map(|&v| half::f16::from_f32(v)).collect();
    let x = Tensor::<CpuRuntime>::from_slice(&x16, &[3], &device);
    let y = client.elu(&x, 1.0, 1.0, 1.0).unwrap();
    client.synchronize().unwrap();

    let got: Vec<half::f16> = y.to_vec();
    for (g, &v) in got.iter().zip(xs.iter()) {
        let want = elu_ref(v as f64, 1.0, 1.0, 1.0) as f32;
        assert!(
            (g.to_f32() - want).abs() < 0.01,
            "elu f16({v}) = {}, want {want}",
            g.to_f32()
        );
    }

    let xb: Vec<half::bf16> = xs.iter().map(|&v| half::bf16::from_f32(v)).collect();
    let x = Tensor::<CpuRuntime>::from_slice(&xb, &[3], &device);
    let y = client.elu(&x, 1.0, 1.0, 1.0).unwrap();
    client.synchronize().unwrap();

    let got: Vec<half::bf16> = y.to_vec();
    for (g, &v) in got.iter().zip(xs.iter()) {
        let want = elu_ref(v as f64, 1.0, 1.0, 1.0) as f32;
        assert!(
            (g.to_f32() - want).abs() < 0.05,
            "elu bf16({v}) = {}, want {want}",
            g.to_f32()
        );
    }
}

#[test]
fn test_elu_empty_tensor() {
    let (client, device) = create_cpu_client();

    let x = Tensor::<CpuRuntime>::empty(&[0], DType::F32, &device);
    let y = client.elu(&x, 1.0, 1.0, 1.0).unwrap();
    client.synchronize().unwrap();
    assert_eq!(y.numel(), 0);
}

#[test]
fn test_elu_strided_input() {
    let (client, device) = create_cpu_client();

    // Read through a transposed view: the plan carries the view's strides.
    let x = Tensor::<CpuRuntime>::from_slice(&[-1.0f32, 2.0, -3.0, 4.0], &[2, 2], &device);
    let xt = x.transpose(0, 1).unwrap();
    let y = client.elu(&xt, 1.0, 1.0, 1.0).unwrap();
    client.synchronize().unwrap();

    let got: Vec<f32> = y.to_vec();
    let want: Vec<f32> = [-1.0f32, -3.0, 2.0, 4.0]
        .iter()
        .map(|&v| elu_ref(v as f64, 1.0, 1.0, 1.0) as f32)
        .collect();
    for (g, w) in got.iter().zip(want.iter()) {
        assert!((g - w).abs() < 1e-6, "got {g}, want {w}");
    }
}
