//! CPU implementation of repeat-interleave.

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::ops::dispatch::ensure_supported;
use crate::ops::{IndexingOps, REPEAT_DTYPES};
use crate::runtime::cpu::launch::launch_repeat_scatter;
use crate::runtime::cpu::{CpuClient, CpuRuntime};
use crate::runtime::RuntimeClient;
use crate::tensor::Tensor;

/// Inclusive prefix sum of repeat counts: `prefix[i] = sum(counts[..=i])`.
///
/// This is the reduction utility the scatter kernel consumes; row `i`'s
/// output range is `[prefix[i] - counts[i], prefix[i])`.
pub(crate) fn inclusive_prefix_sum(counts: &[i64]) -> Vec<i64> {
    let mut acc = 0i64;
    counts
        .iter()
        .map(|&c| {
            acc += c;
            acc
        })
        .collect()
}

impl IndexingOps<CpuRuntime> for CpuClient {
    fn repeat_interleave(&self, repeats: &Tensor<CpuRuntime>) -> Result<Tensor<CpuRuntime>> {
        ensure_supported(repeats.dtype(), REPEAT_DTYPES, "repeat_interleave")?;
        if repeats.ndim() != 1 {
            return Err(Error::invalid_argument(
                "repeats",
                format!("expected a 1-D tensor, got shape {:?}", repeats.shape()),
            ));
        }

        let repeats = self.ensure_contiguous(repeats)?;

        // The prefix sum needs the counts on the host; this read is the
        // synchronization point that also fixes the output length.
        self.queue().wait_idle();
        let counts: Vec<i64> = repeats.to_vec();

        if counts.iter().any(|&c| c < 0) {
            return Err(Error::invalid_argument(
                "repeats",
                "repeat counts must be non-negative",
            ));
        }

        let prefix = inclusive_prefix_sum(&counts);
        let total = prefix.last().copied().unwrap_or(0) as usize;

        let prefix_t = Tensor::<CpuRuntime>::try_from_slice(&prefix, &[prefix.len()], &self.device)?;
        let out = Tensor::<CpuRuntime>::try_empty(&[total], DType::I64, &self.device)?;

        // `prefix_t` drops at the end of this call; the launcher records
        // its buffer with the lifetime recorder so the scatter still reads
        // valid memory.
        launch_repeat_scatter(
            self.queue(),
            repeats.storage().ptr(),
            prefix_t.storage().ptr(),
            out.storage().ptr(),
            counts.len(),
        )?;

        Ok(out)
    }
}
