//! Operation traits implemented by runtime clients

mod activation;
mod blas;
mod conditional;
mod indexing;

pub use activation::{ActivationOps, ELU_BACKWARD_DTYPES, ELU_DTYPES};
pub use blas::BlasOps;
pub use conditional::{ConditionalOps, WHERE_COND_DTYPES, WHERE_VALUE_DTYPES};
pub use indexing::{IndexingOps, REPEAT_DTYPES};
