//! Tests for asynchronous queue ordering and buffer-lifetime tracking:
//! dropping a tensor with in-flight work must not reclaim its memory
//! until the recorded queues drain past the submission.

mod common;

use std::time::Duration;

use accelr::dtype::DType;
use accelr::ops::{ActivationOps, BlasOps};
use accelr::runtime::cpu::{live_bytes, CpuRuntime};
use accelr::runtime::{recorder, RuntimeClient};
use accelr::tensor::Tensor;
use common::{create_cpu_client, create_isolated_client};

/// Large enough to dominate any concurrent test allocation noise.
const SENTINEL_BYTES: usize = 16 << 20;

/// The byte-accounting tests read the global counter; run them one at a
/// time.
fn accounting_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();
    LOCK.get_or_init(|| std::sync::Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

#[test]
fn test_drop_defers_free_until_queue_drains() {
    let _guard = accounting_lock();
    let (client, device) = create_isolated_client();
    let queue = client.queue().clone();

    let before = live_bytes();
    {
        let elems = SENTINEL_BYTES / 8;
        let t = Tensor::<CpuRuntime>::empty(&[elems], DType::F64, &device);
        let ptr = t.storage().ptr();

        // Simulate an in-flight kernel reading the buffer.
        queue
            .submit(move || std::thread::sleep(Duration::from_millis(200)))
            .unwrap();
        t.record_queue(&queue);
        assert!(recorder::has_pending(ptr));

        // `t` drops here with the kernel still running.
    }

    // The buffer must survive the drop while work is pending.
    assert!(
        live_bytes() >= before + SENTINEL_BYTES / 2,
        "buffer reclaimed under in-flight work"
    );

    queue.synchronize().unwrap();

    // The deferred free ran once the queue drained.
    assert!(
        live_bytes() < before + SENTINEL_BYTES / 2,
        "deferred free never executed"
    );
}

#[test]
fn test_drop_without_pending_work_frees_immediately() {
    let _guard = accounting_lock();
    let (client, device) = create_isolated_client();
    let queue = client.queue().clone();

    let before = live_bytes();
    {
        let elems = SENTINEL_BYTES / 8;
        let t = Tensor::<CpuRuntime>::empty(&[elems], DType::F64, &device);
        // Recorded, but the queue drains past the ticket before the drop.
        queue.submit(|| {}).unwrap();
        t.record_queue(&queue);
        queue.synchronize().unwrap();
    }
    // No deferral: the free happened on the spot.
    assert!(live_bytes() < before + SENTINEL_BYTES / 2);
}

#[test]
fn test_record_is_idempotent_per_queue() {
    let (client, device) = create_isolated_client();
    let queue = client.queue();

    let t = Tensor::<CpuRuntime>::from_slice(&[1.0f32; 64], &[64], &device);
    queue
        .submit(|| std::thread::sleep(Duration::from_millis(50)))
        .unwrap();

    t.record_queue(queue);
    t.record_queue(queue);
    t.record_queue(queue);
    assert!(recorder::has_pending(t.storage().ptr()));

    client.synchronize().unwrap();
    assert!(!recorder::has_pending(t.storage().ptr()));
}

#[test]
fn test_operator_records_operands() {
    let (client, device) = create_isolated_client();

    let x = Tensor::<CpuRuntime>::from_slice(&[-1.0f32, 2.0], &[2], &device);
    let ptr = x.storage().ptr();

    // Hold the queue busy so the elu submission stays pending.
    client
        .queue()
        .submit(|| std::thread::sleep(Duration::from_millis(100)))
        .unwrap();
    let y = client.elu(&x, 1.0, 1.0, 1.0).unwrap();

    // The launcher recorded both operand buffers.
    assert!(recorder::has_pending(ptr));
    assert!(recorder::has_pending(y.storage().ptr()));

    client.synchronize().unwrap();
    assert!(!recorder::has_pending(ptr));
}

#[test]
fn test_chained_submissions_execute_in_order() {
    let (client, device) = create_cpu_client();

    // elu twice in sequence: the second kernel reads the first's output
    // before any synchronization. FIFO ordering makes this correct.
    let x = Tensor::<CpuRuntime>::from_slice(&[-1.0f32, 0.0, 1.0, 2.0], &[4], &device);
    let y = client.elu(&x, 1.0, 1.0, 1.0).unwrap();
    let z = client.elu(&y, 1.0, 1.0, 1.0).unwrap();
    client.synchronize().unwrap();

    let got: Vec<f32> = z.to_vec();
    let elu = |x: f64| {
        if x <= 0.0 {
            x.exp() - 1.0
        } else {
            x
        }
    };
    for (g, &v) in got.iter().zip([-1.0f32, 0.0, 1.0, 2.0].iter()) {
        let want = elu(elu(v as f64)) as f32;
        assert!((g - want).abs() < 1e-6, "got {g}, want {want}");
    }
}

#[test]
fn test_temporary_survives_async_consumption() {
    let (client, device) = create_isolated_client();

    // mm on a transposed operand materializes a contiguous temporary that
    // drops inside the call, while the GEMM reading it is still queued
    // behind a sleeping job; the recorder keeps its buffer alive.
    client
        .queue()
        .submit(|| std::thread::sleep(Duration::from_millis(100)))
        .unwrap();

    let a = Tensor::<CpuRuntime>::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[2, 2], &device);
    let bt = Tensor::<CpuRuntime>::from_slice(&[5.0f32, 7.0, 6.0, 8.0], &[2, 2], &device);
    let b = bt.transpose(0, 1).unwrap();

    let c = client.mm(&a, &b).unwrap();
    client.synchronize().unwrap();

    let got: Vec<f32> = c.to_vec();
    assert_eq!(got, vec![19.0, 22.0, 43.0, 50.0]);
}
