//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - presentation and binning enums (`Presentation`, `Binning`, `Resurfacing`)
//! - per-bin statistics (`Binned`)
//! - series exchanged with fitting and presentation layers (`PlotData`, `ObservedSeries`)

pub mod types;

pub use types::*;
