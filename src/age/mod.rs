//! Surface ages from crater counts.

pub mod estimate;
pub mod posterior;

pub use estimate::*;
pub use posterior::*;
