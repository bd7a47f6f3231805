//! Configuration: model definitions and runtime settings.

pub mod definitions;
pub mod settings;

pub use definitions::*;
pub use settings::*;
