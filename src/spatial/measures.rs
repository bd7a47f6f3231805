//! Spatial randomness statistics of a point configuration.
//!
//! - `m2cnd`: mean distance to the second-closest neighbour (km)
//! - `sdaa`: standard deviation of the Voronoi-cell areas clipped to the
//!   counting polygon (km²)
//!
//! Voronoi cells are measured on a fixed equal-area raster of the polygon:
//! each raster sample belongs to its nearest point, so a cell's clipped area
//! is its sample count times the area per sample.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::geometry::{CountingArea, UnitVector};
use super::index::PointIndex;
use crate::error::CraterError;
use crate::math::mean_sd;

/// Fewest points for which either statistic is evaluated.
pub const MIN_POINTS: usize = 3;
const NEIGHBOUR_ORDER: usize = 2;
/// Fewest raster samples inside the polygon.
pub const RASTER_SAMPLES: usize = 20_000;
/// Raster samples per point of the largest configuration, so each Voronoi
/// cell spans about sixteen samples a side.
pub const RASTER_SAMPLES_PER_POINT: usize = 256;
/// Cap on the raster's lon/lat grid, relative to the target.
const MAX_RASTER_OVERDRAW: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    M2cnd,
    Sdaa,
}

impl Measure {
    pub const ALL: [Measure; 2] = [Measure::M2cnd, Measure::Sdaa];

    pub fn name(self) -> &'static str {
        match self {
            Measure::M2cnd => "m2cnd",
            Measure::Sdaa => "sdaa",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Measure::M2cnd => "km",
            Measure::Sdaa => "km²",
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Measure {
    type Err = CraterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Measure::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| CraterError::invalid_input(format!("Unknown randomness measure: {s}")))
    }
}

/// Geometry behind a statistic, kept for the real configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Auxiliary {
    /// Index of each point's second-closest neighbour.
    Neighbours(Vec<usize>),
    /// Clipped Voronoi-cell area of each point (km²).
    CellAreas(Vec<f64>),
}

/// Equal-area sample positions inside a counting polygon.
#[derive(Debug, Clone)]
pub struct SampleRaster {
    samples: Vec<UnitVector>,
    /// Area represented by each sample (km²).
    sample_area: f64,
}

impl SampleRaster {
    /// About `target` samples on a grid uniform in longitude and `sin(lat)`.
    pub fn new(area: &CountingArea, target: usize) -> Result<Self, CraterError> {
        let b = area.bounds();
        let (lon0, lon1) = (b.lon.0.to_radians(), b.lon.1.to_radians());
        let (lat0, lat1) = (b.lat.0.to_radians(), b.lat.1.to_radians());
        let width = (lon1 - lon0) * (0.5 * (lat0 + lat1)).cos().max(1e-6);
        let height = lat1 - lat0;
        if !(width > 0.0 && height > 0.0) {
            return Err(CraterError::invalid_input("Counting area has no extent to rasterise."));
        }

        let n_box = (target.max(1) as f64 / area.hit_rate()).min(MAX_RASTER_OVERDRAW * target as f64);
        let n_lon = ((n_box * width / height).sqrt().round() as usize).max(1);
        let n_lat = ((n_box / n_lon as f64).ceil() as usize).max(1);
        let (s0, s1) = (lat0.sin(), lat1.sin());

        let mut samples = Vec::new();
        for j in 0..n_lat {
            let s = s0 + (j as f64 + 0.5) * (s1 - s0) / n_lat as f64;
            let c = (1.0 - s * s).max(0.0).sqrt();
            for i in 0..n_lon {
                let lon = lon0 + (i as f64 + 0.5) * (lon1 - lon0) / n_lon as f64;
                let v = UnitVector::new(c * lon.cos(), c * lon.sin(), s);
                if area.polygon().contains(&v) {
                    samples.push(v);
                }
            }
        }
        if samples.is_empty() {
            return Err(CraterError::invalid_input("Counting area too small to rasterise."));
        }
        let sample_area = area.area() / samples.len() as f64;
        debug!(samples = samples.len(), n_lon, n_lat, "built Voronoi raster");
        Ok(Self { samples, sample_area })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_area(&self) -> f64 {
        self.sample_area
    }
}

/// Raster size for configurations of up to `n_points` points.
pub fn raster_samples_for(n_points: usize) -> usize {
    RASTER_SAMPLES.max(RASTER_SAMPLES_PER_POINT.saturating_mul(n_points))
}

/// Evaluate `measure` on the points of `index`; `None` below [`MIN_POINTS`].
pub fn evaluate(
    measure: Measure,
    index: &PointIndex,
    area: &CountingArea,
    raster: &SampleRaster,
) -> Option<(f64, Auxiliary)> {
    if index.len() < MIN_POINTS {
        return None;
    }
    match measure {
        Measure::M2cnd => {
            let (m, nb) = mean_kth_neighbour_distance(index, NEIGHBOUR_ORDER)?;
            Some((m * area.radius(), Auxiliary::Neighbours(nb)))
        }
        Measure::Sdaa => {
            let areas = clipped_cell_areas(index, raster)?;
            let (_, sd) = mean_sd(&areas);
            Some((sd, Auxiliary::CellAreas(areas)))
        }
    }
}

/// Mean angular distance to each point's `k`-th nearest neighbour.
pub fn mean_kth_neighbour_distance(index: &PointIndex, k: usize) -> Option<(f64, Vec<usize>)> {
    let mut total = 0.0;
    let mut neighbours = Vec::with_capacity(index.len());
    for (i, p) in index.points().iter().enumerate() {
        let (j, d) = index.kth_nearest(p, k, Some(i))?;
        total += d;
        neighbours.push(j);
    }
    Some((total / index.len() as f64, neighbours))
}

/// Clipped Voronoi-cell area (km²) of every point.
pub fn clipped_cell_areas(index: &PointIndex, raster: &SampleRaster) -> Option<Vec<f64>> {
    let mut counts = vec![0usize; index.len()];
    for s in &raster.samples {
        let (owner, _) = index.kth_nearest(s, 1, None)?;
        counts[owner] += 1;
    }
    Some(counts.iter().map(|&c| c as f64 * raster.sample_area).collect())
}
