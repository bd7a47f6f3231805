//! Transform between the area fraction of a crater inside a counting area and
//! the linear fraction of its diameter crossing the boundary.
//!
//! Area overlap is what a polygon intersection measures; the statistics want
//! the linear fraction.

use std::f64::consts::PI;

use crate::math::{interp, linspace};

const TABLE_SIZE: usize = 100;

/// Area fraction of a circle cut by a chord at linear fraction `lf` of its diameter.
pub fn area_fraction(lf: f64) -> f64 {
    let theta = 2.0 * (1.0 - 2.0 * lf).clamp(-1.0, 1.0).acos();
    (theta - theta.sin()) / (2.0 * PI)
}

/// Tabulated inverse of [`area_fraction`].
#[derive(Debug, Clone)]
pub struct FractionalCraterFn {
    lf: Vec<f64>,
    af: Vec<f64>,
}

impl FractionalCraterFn {
    pub fn new() -> Self {
        let lf = linspace(0.0, 1.0, TABLE_SIZE);
        let af = lf.iter().map(|&v| area_fraction(v)).collect();
        Self { lf, af }
    }

    pub fn linear_fraction(&self, af: f64) -> f64 {
        interp(af, &self.af, &self.lf)
    }

    /// Convert a list of measured area fractions.
    pub fn linear_fractions(&self, af: &[f64]) -> Vec<f64> {
        af.iter().map(|&a| self.linear_fraction(a)).collect()
    }
}

impl Default for FractionalCraterFn {
    fn default() -> Self {
        Self::new()
    }
}
