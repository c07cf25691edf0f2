//! Index-expansion operations trait.

use crate::dtype::{DType, DTypeSet};
use crate::error::Result;
use crate::runtime::Runtime;
use crate::tensor::Tensor;

/// Element type of repeat counts (and of the produced index tensor).
pub const REPEAT_DTYPES: DTypeSet = DTypeSet::single(DType::I64);

/// Index-expansion operations
pub trait IndexingOps<R: Runtime> {
    /// Repeat-interleave: expand per-row repeat counts into row indices
    ///
    /// For a 1-D tensor of non-negative counts, produces a 1-D I64 tensor
    /// of length `sum(repeats)` in which row index `i` appears contiguously
    /// `repeats[i]` times:
    ///
    /// ```text
    /// repeat_interleave([2, 0, 3]) == [0, 0, 2, 2, 2]
    /// ```
    ///
    /// The inclusive prefix sum of the counts determines each row's output
    /// range; the device kernel scatters row indices into those disjoint
    /// ranges in parallel. Negative counts fail with `InvalidArgument`.
    fn repeat_interleave(&self, repeats: &Tensor<R>) -> Result<Tensor<R>>;
}
