//! Crater counts with positions.

use serde::{Deserialize, Serialize};

use super::geometry::{CountingArea, UnitVector, to_unit};
use crate::binning::CraterCount;
use crate::error::CraterError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacedCrater {
    /// Degrees.
    pub lon: f64,
    /// Degrees.
    pub lat: f64,
    /// Kilometres.
    pub diameter: f64,
    pub fraction: f64,
}

impl PlacedCrater {
    pub fn position(&self) -> UnitVector {
        to_unit(self.lon, self.lat)
    }
}

/// Craters located inside a counting polygon on a body of known radius.
#[derive(Debug, Clone)]
pub struct SpatialCount {
    source: String,
    craters: Vec<PlacedCrater>,
    area: CountingArea,
}

impl SpatialCount {
    pub fn new(source: impl Into<String>, craters: Vec<PlacedCrater>, area: CountingArea) -> Result<Self, CraterError> {
        if let Some(c) = craters.iter().find(|c| {
            !(c.lon.is_finite() && c.lat.is_finite() && c.lat.abs() <= 90.0 && c.diameter > 0.0 && c.fraction > 0.0)
        }) {
            return Err(CraterError::invalid_input(format!(
                "Invalid crater at ({}, {}) with diameter {}.",
                c.lon, c.lat, c.diameter
            )));
        }
        Ok(Self {
            source: source.into(),
            craters,
            area,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn craters(&self) -> &[PlacedCrater] {
        &self.craters
    }

    pub fn area(&self) -> &CountingArea {
        &self.area
    }

    /// Plain count over the polygon's area and perimeter.
    pub fn crater_count(&self) -> Result<CraterCount, CraterError> {
        CraterCount::new(
            self.craters.iter().map(|c| c.diameter).collect(),
            self.craters.iter().map(|c| c.fraction).collect(),
            self.area.area(),
            Some(self.area.perimeter()),
        )
    }
}
