//! Conditional operations trait.

use crate::dtype::{DType, DTypeSet};
use crate::error::Result;
use crate::runtime::Runtime;
use crate::tensor::Tensor;

/// Value element types `where_cond` selects between: all numeric + Bool.
pub const WHERE_VALUE_DTYPES: DTypeSet = DTypeSet::NUMERIC.union(DTypeSet::BOOL);

/// Condition element types: boolean or byte masks. Both store one byte per
/// element and yield identical results (non-zero selects `x`).
pub const WHERE_COND_DTYPES: DTypeSet =
    DTypeSet::BOOL.union(DTypeSet::single(DType::U8));

/// Conditional operations
pub trait ConditionalOps<R: Runtime> {
    /// Conditional select: `where(cond, x, y) = cond ? x : y`
    ///
    /// For each position of the broadcast shape, returns the element of `x`
    /// where the condition is non-zero, otherwise the element of `y`.
    /// `x` and `y` must share a dtype; the condition must be `Bool` or `U8`.
    fn where_cond(&self, cond: &Tensor<R>, x: &Tensor<R>, y: &Tensor<R>) -> Result<Tensor<R>>;
}
