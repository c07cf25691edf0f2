//! Common test utilities
#![allow(dead_code)]

use accelr::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime};
use accelr::runtime::Runtime;

/// Create the shared CPU client and device for testing
///
/// The default client is cached: every test using it shares one queue.
pub fn create_cpu_client() -> (CpuClient, CpuDevice) {
    let device = CpuRuntime::default_device();
    let client = CpuRuntime::default_client(&device);
    (client, device)
}

/// Create a client with its own private queue
///
/// Use this for tests that observe the submission counter or buffer
/// lifetimes; the shared default queue sees traffic from other tests.
pub fn create_isolated_client() -> (CpuClient, CpuDevice) {
    let device = CpuRuntime::default_device();
    let client = CpuClient::new(device.clone());
    (client, device)
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Assert two f32 slices are close within tolerance
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, atol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Host-side reference matmul: C[m,n] = sum_k A[m,k] * B[k,n]
pub fn matmul_ref(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0f32;
            for p in 0..k {
                acc += a[i * k + p] * b[p * n + j];
            }
            c[i * n + j] = acc;
        }
    }
    c
}
