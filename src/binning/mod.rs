//! Crater-count binning and presentation.
//!
//! - bin boundary generation and the binning-bias correction (`bins`)
//! - crater counts, their binned view and plot series (`count`)
//! - area-to-linear coverage fraction transform (`fractional`)

pub mod bins;
pub mod count;
pub mod fractional;

pub use bins::*;
pub use count::*;
pub use fractional::*;
