//! Asynchronous execution queue
//!
//! An [`ExecQueue`] is an ordered submission channel to one device worker.
//! Submission is cheap and non-blocking; jobs execute asynchronously,
//! strictly in submission order (FIFO). Submissions to different queues are
//! unordered relative to each other.
//!
//! A submission that the queue cannot accept fails synchronously with
//! `DeviceSubmission`. A failure *inside* a job is deferred: it is captured
//! on the worker and surfaces as `DeviceExecution` at the next
//! [`ExecQueue::synchronize`] call, never silently swallowed.
//!
//! All operator launches for one client go through that client's queue;
//! correct cross-kernel ordering relies on this, not on locks.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

/// A unit of work executed on the queue's worker
type Job = Box<dyn FnOnce() + Send + 'static>;

static QUEUE_IDS: AtomicU64 = AtomicU64::new(1);

/// Shared, order-preserving submission channel to one device worker
///
/// Cloning the handle shares the queue; the worker shuts down when the last
/// handle is dropped (after draining already-submitted work).
#[derive(Clone)]
pub struct ExecQueue {
    inner: Arc<QueueInner>,
}

pub(crate) struct QueueInner {
    id: u64,
    sender: Mutex<Option<Sender<Job>>>,
    submitted: AtomicU64,
    state: Arc<WorkerState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct WorkerState {
    completed: AtomicU64,
    failure: Mutex<Option<Error>>,
}

impl QueueInner {
    /// Has the worker finished executing the job with this ticket?
    pub(crate) fn reached(&self, ticket: u64) -> bool {
        self.state.completed.load(Ordering::Acquire) >= ticket
    }
}

impl ExecQueue {
    /// Create a queue with a dedicated worker thread
    pub fn new() -> Self {
        let id = QUEUE_IDS.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(WorkerState {
            completed: AtomicU64::new(0),
            failure: Mutex::new(None),
        });
        let (tx, rx) = channel::<Job>();
        let worker_state = Arc::clone(&state);
        let worker = std::thread::Builder::new()
            .name(format!("accelr-queue-{id}"))
            .spawn(move || worker_loop(id, rx, worker_state))
            .expect("failed to spawn queue worker thread");

        Self {
            inner: Arc::new(QueueInner {
                id,
                sender: Mutex::new(Some(tx)),
                submitted: AtomicU64::new(0),
                state,
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    /// Queue identity, unique within the process
    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Submit a job; returns its ticket (1-based submission index)
    ///
    /// The job runs after every previously submitted job has finished.
    /// Fails with `DeviceSubmission` if the queue has been shut down.
    pub fn submit<F>(&self, job: F) -> Result<u64>
    where
        F: FnOnce() + Send + 'static,
    {
        // The lock serializes ticket assignment with channel order, so
        // ticket N is always the N-th job the worker sees.
        let guard = self.inner.sender.lock();
        let sender = guard.as_ref().ok_or_else(|| Error::DeviceSubmission {
            reason: format!("queue {} is shut down", self.inner.id),
        })?;
        let ticket = self.inner.submitted.fetch_add(1, Ordering::AcqRel) + 1;
        sender
            .send(Box::new(job))
            .map_err(|_| Error::DeviceSubmission {
                reason: format!("queue {} worker is gone", self.inner.id),
            })?;
        log::trace!("queue {}: submitted ticket {}", self.inner.id, ticket);
        Ok(ticket)
    }

    /// Total number of submissions accepted so far
    ///
    /// This is the submission watermark the lifetime recorder records, and
    /// what tests use to prove that failed validation submitted nothing.
    #[inline]
    pub fn submissions(&self) -> u64 {
        self.inner.submitted.load(Ordering::Acquire)
    }

    /// Has the worker drained work up to and including `ticket`?
    #[inline]
    pub fn reached(&self, ticket: u64) -> bool {
        self.inner.reached(ticket)
    }

    /// Block until every currently submitted job has executed
    ///
    /// Does not consume a deferred failure; use [`Self::synchronize`] to
    /// both drain and observe errors.
    pub fn wait_idle(&self) {
        let (tx, rx) = channel::<()>();
        if self
            .submit(move || {
                let _ = tx.send(());
            })
            .is_ok()
        {
            let _ = rx.recv();
        }
    }

    /// Drain the queue and surface any deferred device-side failure
    pub fn synchronize(&self) -> Result<()> {
        self.wait_idle();
        if let Some(err) = self.inner.state.failure.lock().take() {
            return Err(err);
        }
        Ok(())
    }

    /// Shut the queue down: refuse further submissions and join the worker
    /// after it drains already-accepted work
    pub fn shutdown(&self) {
        self.inner.sender.lock().take();
        if let Some(handle) = self.inner.worker.lock().take() {
            let _ = handle.join();
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<QueueInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<QueueInner>) -> Self {
        Self { inner }
    }
}

impl Default for ExecQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecQueue")
            .field("id", &self.inner.id)
            .field("submitted", &self.submissions())
            .field(
                "completed",
                &self.inner.state.completed.load(Ordering::Acquire),
            )
            .finish()
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        // Close the channel, then wait for the worker to drain. Dropping a
        // queue therefore behaves like destroying a device stream: pending
        // work still runs.
        self.sender.get_mut().take();
        if let Some(handle) = self.worker.get_mut().take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(id: u64, rx: Receiver<Job>, state: Arc<WorkerState>) {
    while let Ok(job) = rx.recv() {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));
        if let Err(payload) = outcome {
            let reason = panic_message(payload);
            log::warn!("queue {id}: kernel failed: {reason}");
            let mut slot = state.failure.lock();
            if slot.is_none() {
                *slot = Some(Error::DeviceExecution { reason });
            }
        }
        state.completed.fetch_add(1, Ordering::Release);
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "kernel panicked".to_string()
    }
}
