//! `crater-age` library crate.
//!
//! Estimates surface ages from crater size-frequency distributions:
//!
//! - crater counts and their binned presentations (`binning`)
//! - production and chronology functions (`models`, `config`)
//! - least-squares fits of a production function to a count (`fit`)
//! - Poisson age likelihoods and age estimates (`age`)
//! - spatial randomness analysis of crater positions (`spatial`, `io`)

pub mod age;
pub mod binning;
pub mod config;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod spatial;
