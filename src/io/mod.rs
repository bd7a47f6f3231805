//! Input/output helpers.
//!
//! - randomness-analysis JSON read/write (`randomness`)

pub mod randomness;

pub use randomness::*;
