//! Mathematical utilities: interpolation, quadrature, Poisson/normal
//! densities and weighted least squares.

pub mod interp;
pub mod ols;
pub mod poisson;

pub use interp::*;
pub use ols::*;
pub use poisson::*;
