//! Elementwise kernel launchers for the CPU queue backend
//!
//! A launcher takes an [`IterPlan`] and a type-specialized per-element
//! function, submits one kernel job to the execution queue, and records
//! every operand buffer with the lifetime recorder. Inside the job, the
//! index space is partitioned into parallel execution groups of
//! [`GROUP_SIZE`] elements; the final group clips to the remaining count.
//! Groups share no mutable state, so they execute data-parallel.
//!
//! Each operand is walked through a [`Indexer`] that maps the canonical
//! row-major linear index to the operand's storage offset; contiguous
//! operands take a direct linear path.

use crate::dtype::Element;
use crate::error::Result;
use crate::iter::{IterPlan, OperandAccess};
use crate::runtime::recorder;
use crate::runtime::ExecQueue;
use crate::tensor::Layout;
use smallvec::SmallVec;

/// Preferred concurrency granularity: elements per parallel execution group
pub(crate) const GROUP_SIZE: usize = 1024;

/// Maps the canonical linear index to one operand's element offset
#[derive(Clone)]
struct Indexer {
    offset: isize,
    /// (divisor, size, stride) per non-degenerate dimension
    axes: SmallVec<[(usize, usize, isize); 4]>,
    /// Contiguous fast path: offset + i
    linear: bool,
}

impl Indexer {
    fn build(shape: &[usize], access: &OperandAccess) -> Self {
        let canonical = Layout::compute_contiguous_strides(shape);
        let linear = access.strides.as_slice() == canonical.as_slice();

        let mut axes = SmallVec::new();
        if !linear {
            for ((&size, &stride), &div) in shape
                .iter()
                .zip(access.strides.iter())
                .zip(canonical.iter())
            {
                // Size-1 and stride-0 dimensions contribute nothing.
                if size > 1 && stride != 0 {
                    axes.push((div as usize, size, stride));
                }
            }
        }

        Self {
            offset: access.offset,
            axes,
            linear,
        }
    }

    #[inline]
    fn at(&self, i: usize) -> isize {
        if self.linear {
            return self.offset + i as isize;
        }
        let mut off = self.offset;
        for &(div, size, stride) in &self.axes {
            off += ((i / div) % size) as isize * stride;
        }
        off
    }
}

/// Run `body(start, end)` over clipped groups of the index space.
fn for_each_group<F>(numel: usize, body: F)
where
    F: Fn(usize, usize) + Send + Sync,
{
    let groups = numel.div_ceil(GROUP_SIZE);

    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        (0..groups).into_par_iter().for_each(|g| {
            let start = g * GROUP_SIZE;
            let end = (start + GROUP_SIZE).min(numel);
            body(start, end);
        });
    }

    #[cfg(not(feature = "rayon"))]
    for g in 0..groups {
        let start = g * GROUP_SIZE;
        let end = (start + GROUP_SIZE).min(numel);
        body(start, end);
    }
}

/// Record every operand buffer of the plan as in use by `queue` up to
/// `ticket`, so reclamation defers behind the submitted kernel.
fn record_operands(plan: &IterPlan, queue: &ExecQueue, ticket: u64) {
    for i in 0..plan.num_operands() {
        recorder::record(plan.operand(i).ptr, queue, ticket);
    }
}

/// Launch a unary elementwise kernel: `out[i] = f(a[i])`
///
/// Plan operands: `[out, a]`, both of element type `T`.
pub(crate) fn launch_unary<T, F>(queue: &ExecQueue, plan: &IterPlan, f: F) -> Result<()>
where
    T: Element,
    F: Fn(T) -> T + Send + Sync + 'static,
{
    let numel = plan.numel();
    if numel == 0 {
        return Ok(());
    }
    debug_assert_eq!(plan.num_operands(), 2);

    let out_ptr = plan.operand(0).ptr;
    let a_ptr = plan.operand(1).ptr;
    let out_ix = Indexer::build(plan.shape(), plan.operand(0));
    let a_ix = Indexer::build(plan.shape(), plan.operand(1));

    let ticket = queue.submit(move || {
        for_each_group(numel, |start, end| {
            let out = out_ptr as *mut T;
            let a = a_ptr as *const T;
            for i in start..end {
                // SAFETY: the iteration plan guarantees every computed
                // offset lies inside the operand's storage, and groups
                // write disjoint output ranges.
                unsafe {
                    *out.offset(out_ix.at(i)) = f(*a.offset(a_ix.at(i)));
                }
            }
        });
    })?;

    record_operands(plan, queue, ticket);
    Ok(())
}

/// Launch a binary elementwise kernel: `out[i] = f(a[i], b[i])`
///
/// Plan operands: `[out, a, b]`, all of element type `T`.
pub(crate) fn launch_binary<T, F>(queue: &ExecQueue, plan: &IterPlan, f: F) -> Result<()>
where
    T: Element,
    F: Fn(T, T) -> T + Send + Sync + 'static,
{
    let numel = plan.numel();
    if numel == 0 {
        return Ok(());
    }
    debug_assert_eq!(plan.num_operands(), 3);

    let out_ptr = plan.operand(0).ptr;
    let a_ptr = plan.operand(1).ptr;
    let b_ptr = plan.operand(2).ptr;
    let out_ix = Indexer::build(plan.shape(), plan.operand(0));
    let a_ix = Indexer::build(plan.shape(), plan.operand(1));
    let b_ix = Indexer::build(plan.shape(), plan.operand(2));

    let ticket = queue.submit(move || {
        for_each_group(numel, |start, end| {
            let out = out_ptr as *mut T;
            let a = a_ptr as *const T;
            let b = b_ptr as *const T;
            for i in start..end {
                // SAFETY: offsets validated by the iteration plan; output
                // ranges of distinct groups are disjoint.
                unsafe {
                    *out.offset(out_ix.at(i)) = f(*a.offset(a_ix.at(i)), *b.offset(b_ix.at(i)));
                }
            }
        });
    })?;

    record_operands(plan, queue, ticket);
    Ok(())
}

/// Launch a conditional-select kernel: `out[i] = cond[i] != 0 ? x[i] : y[i]`
///
/// Plan operands: `[out, cond, x, y]`. The condition is read bytewise
/// (`Bool` and `U8` tensors have identical storage), values are `T`.
pub(crate) fn launch_select<T>(queue: &ExecQueue, plan: &IterPlan) -> Result<()>
where
    T: Element,
{
    let numel = plan.numel();
    if numel == 0 {
        return Ok(());
    }
    debug_assert_eq!(plan.num_operands(), 4);

    let out_ptr = plan.operand(0).ptr;
    let cond_ptr = plan.operand(1).ptr;
    let x_ptr = plan.operand(2).ptr;
    let y_ptr = plan.operand(3).ptr;
    let out_ix = Indexer::build(plan.shape(), plan.operand(0));
    let cond_ix = Indexer::build(plan.shape(), plan.operand(1));
    let x_ix = Indexer::build(plan.shape(), plan.operand(2));
    let y_ix = Indexer::build(plan.shape(), plan.operand(3));

    let ticket = queue.submit(move || {
        for_each_group(numel, |start, end| {
            let out = out_ptr as *mut T;
            let cond = cond_ptr as *const u8;
            let x = x_ptr as *const T;
            let y = y_ptr as *const T;
            for i in start..end {
                // SAFETY: offsets validated by the iteration plan.
                unsafe {
                    *out.offset(out_ix.at(i)) = if *cond.offset(cond_ix.at(i)) != 0 {
                        *x.offset(x_ix.at(i))
                    } else {
                        *y.offset(y_ix.at(i))
                    };
                }
            }
        });
    })?;

    record_operands(plan, queue, ticket);
    Ok(())
}

/// Launch the repeat-interleave scatter kernel.
///
/// Each parallel group strides over its assigned rows of `[0, rows)`; row
/// `i` writes the value `i` into output slots
/// `[prefix[i] - repeats[i], prefix[i])`. Ranges are disjoint by
/// construction of the inclusive prefix sum, so no two groups ever write
/// the same slot. A repeat count of zero writes nothing. Counts are
/// validated non-negative by the operator before the prefix sum; the
/// kernel does not re-validate.
pub(crate) fn launch_repeat_scatter(
    queue: &ExecQueue,
    repeats_ptr: u64,
    prefix_ptr: u64,
    out_ptr: u64,
    rows: usize,
) -> Result<()> {
    if rows == 0 {
        return Ok(());
    }

    let ticket = queue.submit(move || {
        for_each_group(rows, |start, end| {
            let repeats = repeats_ptr as *const i64;
            let prefix = prefix_ptr as *const i64;
            let out = out_ptr as *mut i64;
            for i in start..end {
                // SAFETY: prefix sums bound every write to [0, total);
                // ranges of distinct rows are disjoint.
                unsafe {
                    let run_end = *prefix.add(i);
                    let run_start = run_end - *repeats.add(i);
                    for slot in run_start..run_end {
                        *out.offset(slot as isize) = i as i64;
                    }
                }
            }
        });
    })?;

    for ptr in [repeats_ptr, prefix_ptr, out_ptr] {
        recorder::record(ptr, queue, ticket);
    }
    Ok(())
}
