//! Production-function fitting.
//!
//! A single free parameter (`a0`) is fitted by weighted Gauss-Newton on the
//! log-density; see `fitter`.

pub mod fitter;

pub use fitter::*;
