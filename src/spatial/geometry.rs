//! Spherical geometry on the unit sphere.
//!
//! Points are unit vectors; longitudes and latitudes are in degrees. Polygon
//! edges are great-circle arcs, so containment is tested in the gnomonic
//! projection about the polygon centre, where those arcs become straight
//! lines.

use std::f64::consts::PI;

use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::CraterError;

pub type UnitVector = Vector3<f64>;

pub fn to_unit(lon: f64, lat: f64) -> UnitVector {
    let (lon, lat) = (lon.to_radians(), lat.to_radians());
    Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
}

pub fn to_lonlat(v: &UnitVector) -> (f64, f64) {
    (v.y.atan2(v.x).to_degrees(), v.z.clamp(-1.0, 1.0).asin().to_degrees())
}

/// Central angle (radians) between two unit vectors.
pub fn angular_distance(a: &UnitVector, b: &UnitVector) -> f64 {
    a.cross(b).norm().atan2(a.dot(b))
}

/// Signed spherical excess of the triangle `abc`.
fn triangle_excess(a: &UnitVector, b: &UnitVector, c: &UnitVector) -> f64 {
    2.0 * a.dot(&b.cross(c)).atan2(1.0 + a.dot(b) + b.dot(c) + c.dot(a))
}

/// `z` range covered by the minor arc from `a` to `b`.
fn arc_z_range(a: &UnitVector, b: &UnitVector) -> (f64, f64) {
    let mut range = (a.z.min(b.z), a.z.max(b.z));
    let n = a.cross(b);
    if n.norm() < 1e-15 {
        return range;
    }
    let n = n.normalize();
    let top = Vector3::z() - n * n.z;
    if top.norm() < 1e-15 {
        return range;
    }
    let top = top.normalize();
    for p in [top, -top] {
        if a.cross(&p).dot(&n) >= 0.0 && p.cross(b).dot(&n) >= 0.0 {
            range = (range.0.min(p.z), range.1.max(p.z));
        }
    }
    range
}

#[derive(Debug, Clone)]
struct Ring {
    vertices: Vec<UnitVector>,
}

impl Ring {
    fn from_lonlat(points: &[(f64, f64)]) -> Result<Self, CraterError> {
        let mut points = points.to_vec();
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        if points.len() < 3 {
            return Err(CraterError::invalid_input("Polygon ring needs at least three vertices."));
        }
        if points
            .iter()
            .any(|&(lon, lat)| !(lon.is_finite() && lat.is_finite() && lat.abs() <= 90.0))
        {
            return Err(CraterError::invalid_input("Polygon vertex outside the lon/lat domain."));
        }
        Ok(Self {
            vertices: points.iter().map(|&(lon, lat)| to_unit(lon, lat)).collect(),
        })
    }

    fn edges(&self) -> impl Iterator<Item = (&UnitVector, &UnitVector)> {
        self.vertices.iter().zip(self.vertices.iter().cycle().skip(1))
    }

    /// Enclosed solid angle (steradians).
    fn area(&self) -> f64 {
        let v0 = &self.vertices[0];
        self.vertices
            .windows(2)
            .skip(1)
            .map(|w| triangle_excess(v0, &w[0], &w[1]))
            .sum::<f64>()
            .abs()
    }

    fn length(&self) -> f64 {
        self.edges().map(|(a, b)| angular_distance(a, b)).sum()
    }
}

/// Even-odd test of `p` against a planar ring.
fn crosses(ring: &[(f64, f64)], p: (f64, f64)) -> bool {
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > p.1) != (yj > p.1) && p.0 < (xj - xi) * (p.1 - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Polygon with one or more outer rings and any number of holes.
///
/// All vertices must lie in the open hemisphere around the polygon centre.
#[derive(Debug, Clone)]
pub struct SphericalPolygon {
    shells: Vec<Ring>,
    holes: Vec<Ring>,
    centre: UnitVector,
    basis: (UnitVector, UnitVector),
    projected: Vec<Vec<(f64, f64)>>,
}

impl SphericalPolygon {
    pub fn new(shells: &[Vec<(f64, f64)>], holes: &[Vec<(f64, f64)>]) -> Result<Self, CraterError> {
        if shells.is_empty() {
            return Err(CraterError::invalid_input("Polygon needs at least one outer ring."));
        }
        let shells = shells
            .iter()
            .map(|r| Ring::from_lonlat(r))
            .collect::<Result<Vec<_>, _>>()?;
        let holes = holes
            .iter()
            .map(|r| Ring::from_lonlat(r))
            .collect::<Result<Vec<_>, _>>()?;

        let sum: UnitVector = shells.iter().flat_map(|r| r.vertices.iter()).sum();
        if sum.norm() < 1e-12 {
            return Err(CraterError::invalid_input("Polygon has no well-defined centre."));
        }
        let centre = sum.normalize();
        if shells
            .iter()
            .chain(&holes)
            .flat_map(|r| r.vertices.iter())
            .any(|v| v.dot(&centre) <= 1e-9)
        {
            return Err(CraterError::invalid_input("Polygon must lie within a hemisphere."));
        }

        let axis = if centre.z.abs() < 0.9 { Vector3::z() } else { Vector3::x() };
        let e1 = axis.cross(&centre).normalize();
        let e2 = centre.cross(&e1);
        let project = |v: &UnitVector| {
            let s = v.dot(&centre);
            (v.dot(&e1) / s, v.dot(&e2) / s)
        };
        let projected = shells
            .iter()
            .chain(&holes)
            .map(|r| r.vertices.iter().map(project).collect())
            .collect();

        Ok(Self {
            shells,
            holes,
            centre,
            basis: (e1, e2),
            projected,
        })
    }

    /// Single ring without holes.
    pub fn simple(vertices: &[(f64, f64)]) -> Result<Self, CraterError> {
        Self::new(&[vertices.to_vec()], &[])
    }

    pub fn centre(&self) -> UnitVector {
        self.centre
    }

    pub fn contains(&self, v: &UnitVector) -> bool {
        let s = v.dot(&self.centre);
        if s <= 0.0 {
            return false;
        }
        let p = (v.dot(&self.basis.0) / s, v.dot(&self.basis.1) / s);
        self.projected.iter().fold(false, |acc, ring| acc ^ crosses(ring, p))
    }

    pub fn contains_lonlat(&self, lon: f64, lat: f64) -> bool {
        self.contains(&to_unit(lon, lat))
    }

    /// Solid angle (steradians).
    pub fn area(&self) -> f64 {
        self.shells.iter().map(Ring::area).sum::<f64>() - self.holes.iter().map(Ring::area).sum::<f64>()
    }

    /// Total boundary length (radians), holes included.
    pub fn perimeter(&self) -> f64 {
        self.shells.iter().chain(&self.holes).map(Ring::length).sum()
    }

    /// Smallest lon/lat box holding the polygon, widened to full longitude
    /// when it covers a pole.
    pub fn bounds(&self) -> LonLatBox {
        let (lon_c, _) = to_lonlat(&self.centre);
        let mut lon = (f64::INFINITY, f64::NEG_INFINITY);
        let mut z = (1.0f64, -1.0f64);
        for ring in &self.shells {
            for (a, b) in ring.edges() {
                let (lon_a, _) = to_lonlat(a);
                let rel = (lon_a - lon_c + 180.0).rem_euclid(360.0) - 180.0;
                lon = (lon.0.min(rel), lon.1.max(rel));
                let (z0, z1) = arc_z_range(a, b);
                z = (z.0.min(z0), z.1.max(z1));
            }
        }
        let mut bounds = LonLatBox {
            lon: (lon_c + lon.0, lon_c + lon.1),
            lat: (z.0.asin().to_degrees(), z.1.asin().to_degrees()),
        };
        if self.contains(&Vector3::z()) {
            bounds.lon = (-180.0, 180.0);
            bounds.lat.1 = 90.0;
        }
        if self.contains(&-Vector3::z()) {
            bounds.lon = (-180.0, 180.0);
            bounds.lat.0 = -90.0;
        }
        bounds
    }
}

/// Longitude/latitude box (degrees). Longitudes may run past ±180 when the
/// box straddles the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLatBox {
    pub lon: (f64, f64),
    pub lat: (f64, f64),
}

impl LonLatBox {
    /// Solid angle (steradians).
    pub fn area(&self) -> f64 {
        (self.lon.1 - self.lon.0).to_radians() * (self.lat.1.to_radians().sin() - self.lat.0.to_radians().sin())
    }

    /// Sampler uniform over the box's surface: longitude uniform and
    /// `sin(latitude)` uniform.
    pub fn sampler(&self) -> BoxSampler {
        let (s0, s1) = (
            self.lat.0.to_radians().sin().clamp(-1.0, 1.0),
            self.lat.1.to_radians().sin().clamp(-1.0, 1.0),
        );
        BoxSampler {
            lon: Uniform::new_inclusive(self.lon.0.to_radians(), self.lon.1.to_radians()),
            sin_lat: Uniform::new_inclusive(s0, s1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoxSampler {
    lon: Uniform<f64>,
    sin_lat: Uniform<f64>,
}

impl Distribution<UnitVector> for BoxSampler {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> UnitVector {
        let lon = self.lon.sample(rng);
        let s = self.sin_lat.sample(rng);
        let c = (1.0 - s * s).max(0.0).sqrt();
        Vector3::new(c * lon.cos(), c * lon.sin(), s)
    }
}

/// Counting polygon on a body of given radius.
#[derive(Debug, Clone)]
pub struct CountingArea {
    polygon: SphericalPolygon,
    radius: f64,
    bounds: LonLatBox,
}

impl CountingArea {
    /// `radius` is the planetary radius in km.
    pub fn new(polygon: SphericalPolygon, radius: f64) -> Result<Self, CraterError> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(CraterError::invalid_input(format!("Invalid planetary radius: {radius}")));
        }
        if !(polygon.area() > 0.0) {
            return Err(CraterError::invalid_input("Counting polygon has no area."));
        }
        let bounds = polygon.bounds();
        Ok(Self {
            polygon,
            radius,
            bounds,
        })
    }

    pub fn polygon(&self) -> &SphericalPolygon {
        &self.polygon
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn bounds(&self) -> &LonLatBox {
        &self.bounds
    }

    /// Area in km².
    pub fn area(&self) -> f64 {
        self.polygon.area() * self.radius * self.radius
    }

    /// Perimeter in km.
    pub fn perimeter(&self) -> f64 {
        self.polygon.perimeter() * self.radius
    }

    /// Area of the enclosing lon/lat box in km².
    pub fn enclosing_area(&self) -> f64 {
        self.bounds.area() * self.radius * self.radius
    }

    /// Fraction of uniformly sampled box points expected inside the polygon.
    pub fn hit_rate(&self) -> f64 {
        (self.polygon.area() / self.bounds.area()).min(1.0)
    }

    /// Surface distance (km) to angle (radians).
    pub fn to_angle(&self, distance: f64) -> f64 {
        (distance / self.radius).min(PI)
    }
}
