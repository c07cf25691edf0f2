//! Tensor types: layout, storage, and the core tensor

mod core;
mod layout;
mod storage;

pub use self::core::Tensor;
pub use layout::{Layout, Shape, Strides};
pub use storage::Storage;
