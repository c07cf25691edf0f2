//! Runtime dtype dispatch: the type-dispatch resolver
//!
//! Two halves:
//!
//! 1. [`ensure_supported`] gates the runtime dtype against the operator's
//!    declared [`DTypeSet`]; failure is synchronous, before any submission.
//! 2. [`dispatch_dtype!`] maps the tag to a concrete Rust type and
//!    monomorphizes the kernel body for it.
//!
//! ```ignore
//! ensure_supported(dtype, ELU_DTYPES, "elu")?;
//! dispatch_dtype!(dtype, T => {
//!     launch_unary::<T, _>(queue, &plan, move |x| ...)
//! }, "elu")?;
//! ```
//!
//! `Bool` dispatches to its `u8` storage representation; operators that do
//! not accept booleans exclude `Bool` from their declared set.

use crate::dtype::{DType, DTypeSet};
use crate::error::{Error, Result};

/// Check a runtime dtype against an operator's declared supported set
///
/// Returns `UnsupportedDType` when the tag is outside the set. No implicit
/// promotion is performed; operands must already share the instantiation's
/// type.
#[inline]
pub fn ensure_supported(dtype: DType, set: DTypeSet, op: &'static str) -> Result<()> {
    if set.contains(dtype) {
        Ok(())
    } else {
        Err(Error::unsupported_dtype(dtype, op))
    }
}

/// Internal helper to dispatch the half-precision types behind the "f16"
/// feature.
#[macro_export]
#[doc(hidden)]
macro_rules! dispatch_half_type {
    ($T:ident, $body:block, $dtype:expr, $type:ty) => {{
        #[cfg(feature = "f16")]
        {
            type $T = $type;
            $body
        }
        #[cfg(not(feature = "f16"))]
        {
            return Err($crate::error::Error::FeatureRequired {
                dtype: $dtype,
                feature: "f16",
            });
        }
    }};
}

/// Macro for runtime dtype dispatch to typed kernel instantiations.
///
/// Takes a `DType` value and executes the block with `$T` bound to the
/// corresponding Rust type. `Bool` binds `u8` (its storage type). The
/// half-precision arms require the "f16" feature and fail with
/// `FeatureRequired` otherwise.
#[macro_export]
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:block, $error_op:expr) => {
        match $dtype {
            $crate::dtype::DType::F64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::F16 => {
                $crate::dispatch_half_type!($T, $body, $dtype, half::f16)
            }
            $crate::dtype::DType::BF16 => {
                $crate::dispatch_half_type!($T, $body, $dtype, half::bf16)
            }
            $crate::dtype::DType::I64 => {
                type $T = i64;
                $body
            }
            $crate::dtype::DType::I32 => {
                type $T = i32;
                $body
            }
            $crate::dtype::DType::I16 => {
                type $T = i16;
                $body
            }
            $crate::dtype::DType::I8 => {
                type $T = i8;
                $body
            }
            $crate::dtype::DType::U64 => {
                type $T = u64;
                $body
            }
            $crate::dtype::DType::U32 => {
                type $T = u32;
                $body
            }
            $crate::dtype::DType::U16 => {
                type $T = u16;
                $body
            }
            $crate::dtype::DType::U8 => {
                type $T = u8;
                $body
            }
            $crate::dtype::DType::Bool => {
                // Bool tensors store one byte per element.
                type $T = u8;
                $body
            }
        }
    };
}

pub use dispatch_dtype;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_supported() {
        assert!(ensure_supported(DType::F32, DTypeSet::FLOATS, "op").is_ok());
        let err = ensure_supported(DType::I32, DTypeSet::FLOATS, "op").unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedDType {
                dtype: DType::I32,
                op: "op"
            }
        ));
    }

    #[test]
    fn test_dispatch_binds_concrete_type() {
        fn elem_size(dtype: DType) -> Result<usize> {
            dispatch_dtype!(dtype, T => {
                Ok(std::mem::size_of::<T>())
            }, "elem_size")
        }

        assert_eq!(elem_size(DType::F64).unwrap(), 8);
        assert_eq!(elem_size(DType::I16).unwrap(), 2);
        assert_eq!(elem_size(DType::Bool).unwrap(), 1);
        #[cfg(feature = "f16")]
        assert_eq!(elem_size(DType::BF16).unwrap(), 2);
    }
}
