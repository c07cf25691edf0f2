//! Buffer-lifetime recorder
//!
//! Kernel submission is asynchronous: a tensor can go out of scope on the
//! host while the device is still reading or writing its buffer. The
//! recorder is the single source of truth for "is this buffer still in
//! use": it maps a storage pointer to the queues with outstanding work on
//! it, keyed by the submission ticket current at record time.
//!
//! Recording is idempotent and non-blocking. Storage reclamation consults
//! the recorder; when work is pending, the free is handed to every such
//! queue and the last one to drain performs it (stream-ordered free).
//!
//! This registry is the one piece of process-wide mutable state in the
//! crate.

use crate::runtime::queue::{ExecQueue, QueueInner};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

struct Usage {
    queue: Weak<QueueInner>,
    queue_id: u64,
    ticket: u64,
}

impl Usage {
    /// True once the recorded queue no longer holds work for this buffer,
    /// either because it drained past the ticket or because it is gone.
    fn drained(&self) -> bool {
        match self.queue.upgrade() {
            Some(inner) => inner.reached(self.ticket),
            None => true,
        }
    }
}

type Registry = Mutex<HashMap<u64, SmallVec<[Usage; 2]>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register that `queue` has outstanding work touching the buffer at `ptr`,
/// up to submission `ticket`.
///
/// Re-recording the same pair keeps the later ticket. A ticket of zero
/// (nothing submitted yet) records nothing.
pub(crate) fn record(ptr: u64, queue: &ExecQueue, ticket: u64) {
    if ptr == 0 || ticket == 0 {
        return;
    }
    let mut map = registry().lock();
    let entry = map.entry(ptr).or_default();
    entry.retain(|u| !u.drained());
    if let Some(usage) = entry.iter_mut().find(|u| u.queue_id == queue.id()) {
        if ticket > usage.ticket {
            usage.ticket = ticket;
            usage.queue = queue.downgrade();
        }
    } else {
        entry.push(Usage {
            queue: queue.downgrade(),
            queue_id: queue.id(),
            ticket,
        });
    }
}

/// Does any queue still have outstanding work recorded on this buffer?
pub fn has_pending(ptr: u64) -> bool {
    let mut map = registry().lock();
    match map.get_mut(&ptr) {
        Some(entry) => {
            entry.retain(|u| !u.drained());
            if entry.is_empty() {
                map.remove(&ptr);
                false
            } else {
                true
            }
        }
        None => false,
    }
}

/// Take the buffer's record on release; returns the queues that still have
/// work pending on it.
pub(crate) fn on_release(ptr: u64) -> SmallVec<[ExecQueue; 2]> {
    if ptr == 0 {
        return SmallVec::new();
    }
    let entry = match registry().lock().remove(&ptr) {
        Some(entry) => entry,
        None => return SmallVec::new(),
    };
    entry
        .into_iter()
        .filter(|u| !u.drained())
        .filter_map(|u| u.queue.upgrade().map(ExecQueue::from_inner))
        .collect()
}

/// Run `free` after every queue in `pending` has drained its current work.
///
/// A no-op marker holding a shared guard is submitted to each queue; the
/// guard runs `free` when the last clone drops. If a queue refuses the
/// submission (shut down), its work is already done and the clone drops
/// immediately.
pub(crate) fn defer_release(
    pending: SmallVec<[ExecQueue; 2]>,
    free: Box<dyn FnOnce() + Send>,
) {
    let guard = Arc::new(DeferredFree {
        free: Mutex::new(Some(free)),
    });
    for queue in pending {
        let g = Arc::clone(&guard);
        let _ = queue.submit(move || drop(g));
    }
}

struct DeferredFree {
    free: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Drop for DeferredFree {
    fn drop(&mut self) {
        if let Some(free) = self.free.get_mut().take() {
            free();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_record_is_idempotent() {
        let queue = ExecQueue::new();
        let ptr = 0xdead_0000u64;
        queue.submit(|| {}).unwrap();

        record(ptr, &queue, queue.submissions());
        record(ptr, &queue, queue.submissions());
        assert!(registry().lock().get(&ptr).unwrap().len() == 1);

        queue.synchronize().unwrap();
        assert!(!has_pending(ptr));
    }

    #[test]
    fn test_pending_until_drained() {
        let queue = ExecQueue::new();
        let ptr = 0xbeef_0000u64;

        queue
            .submit(|| std::thread::sleep(Duration::from_millis(50)))
            .unwrap();
        record(ptr, &queue, queue.submissions());
        assert!(has_pending(ptr));

        queue.synchronize().unwrap();
        assert!(!has_pending(ptr));
    }

    #[test]
    fn test_deferred_release_runs_after_work() {
        let queue = ExecQueue::new();
        let ptr = 0xfeed_0000u64;
        let freed = Arc::new(AtomicBool::new(false));

        queue
            .submit(|| std::thread::sleep(Duration::from_millis(50)))
            .unwrap();
        record(ptr, &queue, queue.submissions());

        let pending = on_release(ptr);
        assert_eq!(pending.len(), 1);
        let flag = Arc::clone(&freed);
        defer_release(pending, Box::new(move || flag.store(true, Ordering::SeqCst)));

        queue.synchronize().unwrap();
        assert!(freed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_release_with_no_record_is_empty() {
        assert!(on_release(0x1234_5678).is_empty());
    }
}
