//! Spatial randomness of crater positions.
//!
//! - spherical polygons, counting areas and box sampling (`geometry`)
//! - equal-area cell grid and neighbour queries (`index`)
//! - non-overlapping random placement (`sprinkle`)
//! - `m2cnd` and `sdaa` statistics (`measures`)
//! - craters with positions (`count`)
//! - per-bin Monte-Carlo comparison against random configurations (`montecarlo`)

pub mod count;
pub mod geometry;
pub mod index;
pub mod measures;
pub mod montecarlo;
pub mod sprinkle;

pub use count::*;
pub use geometry::*;
pub use index::*;
pub use measures::*;
pub use montecarlo::*;
pub use sprinkle::*;
