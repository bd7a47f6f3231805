//! Equal-area sphere tessellation and a point index built on it.
//!
//! The sphere is cut into `2·nside` bands of equal height in `z` and each
//! band into `6·nside` longitude sectors. By Archimedes' hat-box theorem every
//! cell has the same area, `4π / (12·nside²)`.

use std::collections::{HashMap, HashSet};
use std::f64::consts::{FRAC_PI_2, TAU};

use super::geometry::{UnitVector, angular_distance};

const MAX_NSIDE: u64 = 1 << 13;
/// Cells per expected point when sizing a grid.
const CELLS_PER_POINT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EqualAreaGrid {
    nside: u64,
}

impl EqualAreaGrid {
    pub fn new(nside: u64) -> Self {
        Self {
            nside: nside.clamp(1, MAX_NSIDE),
        }
    }

    /// Grid giving about ten cells per point for `n` points spread over
    /// `area` steradians. `nside` is rounded to a power of two.
    pub fn for_points(area: f64, n: usize) -> Self {
        let cell_area = area / (n.max(1) as f64 * CELLS_PER_POINT);
        let n_cells = 4.0 * std::f64::consts::PI / cell_area;
        let exponent = (n_cells / 12.0).sqrt().log2().round();
        if !exponent.is_finite() || exponent <= 0.0 {
            return Self::new(1);
        }
        Self::new(1u64 << (exponent as u32).min(MAX_NSIDE.trailing_zeros()))
    }

    pub fn nside(&self) -> u64 {
        self.nside
    }

    pub fn n_cells(&self) -> u64 {
        12 * self.nside * self.nside
    }

    fn n_bands(&self) -> u64 {
        2 * self.nside
    }

    fn n_cols(&self) -> u64 {
        6 * self.nside
    }

    fn band_of_z(&self, z: f64) -> u64 {
        let nb = self.n_bands();
        (((z + 1.0) / 2.0 * nb as f64).floor().max(0.0) as u64).min(nb - 1)
    }

    fn col_of_lon(&self, lon: f64) -> u64 {
        let nc = self.n_cols();
        ((lon.rem_euclid(TAU) / TAU * nc as f64).floor() as u64).min(nc - 1)
    }

    pub fn cell_of(&self, v: &UnitVector) -> u64 {
        self.band_of_z(v.z) * self.n_cols() + self.col_of_lon(v.y.atan2(v.x))
    }

    /// Cells that may hold points within `radius` (radians) of `v`. The
    /// result may include cells lying wholly outside the cone.
    pub fn cone_search(&self, v: &UnitVector, radius: f64) -> Vec<u64> {
        let r = radius.max(0.0);
        let lat = v.z.clamp(-1.0, 1.0).asin();
        let b0 = self.band_of_z((lat - r).max(-FRAC_PI_2).sin());
        let b1 = self.band_of_z((lat + r).min(FRAC_PI_2).sin());

        let nc = self.n_cols() as i64;
        let cols: Vec<u64> = if lat + r >= FRAC_PI_2 || lat - r <= -FRAC_PI_2 {
            (0..nc as u64).collect()
        } else {
            let half = (r.sin() / lat.cos()).min(1.0).asin();
            let lon = v.y.atan2(v.x);
            let c0 = ((lon - half) / TAU * nc as f64).floor() as i64;
            let c1 = ((lon + half) / TAU * nc as f64).floor() as i64;
            if c1 - c0 + 1 >= nc {
                (0..nc as u64).collect()
            } else {
                (c0..=c1).map(|c| c.rem_euclid(nc) as u64).collect()
            }
        };

        (b0..=b1)
            .flat_map(|b| cols.iter().map(move |&c| b * nc as u64 + c))
            .collect()
    }

    /// Cells sharing an edge or corner with `cell`. Cells of a polar band
    /// all meet at the pole.
    pub fn neighbours(&self, cell: u64) -> Vec<u64> {
        let (nb, nc) = (self.n_bands() as i64, self.n_cols() as i64);
        let (band, col) = ((cell as i64) / nc, (cell as i64) % nc);
        let mut out = Vec::with_capacity(9);
        for b in (band - 1)..=(band + 1) {
            if b < 0 || b >= nb {
                continue;
            }
            for c in (col - 1)..=(col + 1) {
                out.push((b * nc + c.rem_euclid(nc)) as u64);
            }
        }
        if band == 0 || band == nb - 1 {
            out.extend((0..nc).map(|c| (band * nc + c) as u64));
        }
        out.sort_unstable();
        out.dedup();
        out.retain(|&c| c != cell);
        out
    }
}

/// Points bucketed by grid cell.
#[derive(Debug, Clone)]
pub struct PointIndex {
    grid: EqualAreaGrid,
    points: Vec<UnitVector>,
    cells: HashMap<u64, Vec<usize>>,
}

impl PointIndex {
    pub fn new(grid: EqualAreaGrid) -> Self {
        Self {
            grid,
            points: Vec::new(),
            cells: HashMap::new(),
        }
    }

    pub fn from_points(grid: EqualAreaGrid, points: impl IntoIterator<Item = UnitVector>) -> Self {
        let mut index = Self::new(grid);
        for p in points {
            index.insert(p);
        }
        index
    }

    pub fn insert(&mut self, v: UnitVector) -> usize {
        let i = self.points.len();
        self.cells.entry(self.grid.cell_of(&v)).or_default().push(i);
        self.points.push(v);
        i
    }

    pub fn grid(&self) -> &EqualAreaGrid {
        &self.grid
    }

    pub fn points(&self) -> &[UnitVector] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn members(&self, cells: impl IntoIterator<Item = u64>) -> impl Iterator<Item = usize> {
        cells
            .into_iter()
            .filter_map(|c| self.cells.get(&c))
            .flatten()
            .copied()
    }

    /// Whether any point lies within `radius` (radians) of `v`.
    pub fn any_within(&self, v: &UnitVector, radius: f64) -> bool {
        self.members(self.grid.cone_search(v, radius))
            .any(|i| angular_distance(v, &self.points[i]) <= radius)
    }

    /// The `k`-th nearest point to `v` (`k ≥ 1`) and its angular distance,
    /// ignoring point `skip`. `None` when fewer than `k` candidates exist.
    pub fn kth_nearest(&self, v: &UnitVector, k: usize, skip: Option<usize>) -> Option<(usize, f64)> {
        let skipped = skip.is_some_and(|s| s < self.points.len());
        if k == 0 || self.points.len() - usize::from(skipped) < k {
            return None;
        }

        // Grow a block of cells until it holds k candidates; the k-th among
        // them bounds the true k-th distance.
        let mut locality: HashSet<u64> = HashSet::new();
        let mut outer = vec![self.grid.cell_of(v)];
        loop {
            locality.extend(outer.iter().copied());
            let found = self
                .members(locality.iter().copied())
                .filter(|&i| Some(i) != skip)
                .count();
            if found >= k {
                break;
            }
            let next: HashSet<u64> = outer
                .iter()
                .flat_map(|&c| self.grid.neighbours(c))
                .filter(|c| !locality.contains(c))
                .collect();
            if next.is_empty() {
                return None;
            }
            outer = next.into_iter().collect();
        }
        let (_, bound) = self.kth_among(v, k, skip, locality.iter().copied())?;

        // Every point within the bound lies in the cone, edge cells included.
        let cone = self.grid.cone_search(v, bound * (1.0 + 1e-9) + 1e-12);
        self.kth_among(v, k, skip, cone)
    }

    fn kth_among(
        &self,
        v: &UnitVector,
        k: usize,
        skip: Option<usize>,
        cells: impl IntoIterator<Item = u64>,
    ) -> Option<(usize, f64)> {
        let mut found: Vec<(f64, usize)> = self
            .members(cells)
            .filter(|&i| Some(i) != skip)
            .map(|i| (angular_distance(v, &self.points[i]), i))
            .collect();
        found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        found.get(k - 1).map(|&(d, i)| (i, d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::geometry::to_unit;
    use rand::prelude::*;
    use rand::rngs::StdRng;

    fn brute_kth(points: &[UnitVector], v: &UnitVector, k: usize, skip: Option<usize>) -> (usize, f64) {
        let mut d: Vec<(f64, usize)> = points
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .map(|(i, p)| (angular_distance(v, p), i))
            .collect();
        d.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        (d[k - 1].1, d[k - 1].0)
    }

    fn random_points(n: usize, seed: u64, lon: (f64, f64), lat: (f64, f64)) -> Vec<UnitVector> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| to_unit(rng.gen_range(lon.0..lon.1), rng.gen_range(lat.0..lat.1)))
            .collect()
    }

    #[test]
    fn cells_partition_the_sphere() {
        let grid = EqualAreaGrid::new(4);
        assert_eq!(grid.n_cells(), 192);
        let pts = random_points(2000, 1, (-180.0, 180.0), (-90.0, 90.0));
        assert!(pts.iter().all(|p| grid.cell_of(p) < grid.n_cells()));
        assert_eq!(grid.cell_of(&to_unit(0.0, -90.0)), 0);
        assert_eq!(grid.cell_of(&to_unit(-1e-9, 90.0)) / 24, 7);
    }

    #[test]
    fn nside_targets_ten_cells_per_point() {
        // A tenth of the sphere with 100 points wants 10000 cells globally:
        // sqrt(10000 / 12) ≈ 28.9, so nside = 32.
        let grid = EqualAreaGrid::for_points(0.4 * std::f64::consts::PI, 100);
        assert_eq!(grid.nside(), 32);
        assert_eq!(EqualAreaGrid::for_points(4.0 * std::f64::consts::PI, 1).nside(), 1);
    }

    #[test]
    fn cone_search_is_conservative() {
        let grid = EqualAreaGrid::new(16);
        let pts = random_points(3000, 2, (-180.0, 180.0), (-90.0, 90.0));
        for (j, centre) in random_points(40, 3, (-180.0, 180.0), (-89.0, 89.0)).iter().enumerate() {
            let radius = 0.02 + 0.01 * j as f64;
            let cells: HashSet<u64> = grid.cone_search(centre, radius).into_iter().collect();
            for p in &pts {
                if angular_distance(centre, p) <= radius {
                    assert!(cells.contains(&grid.cell_of(p)));
                }
            }
        }
    }

    #[test]
    fn neighbours_wrap_in_longitude() {
        let grid = EqualAreaGrid::new(2);
        // Band 1, column 0: the row of 12 columns wraps to column 11.
        let nb = grid.neighbours(12);
        assert!(nb.contains(&23));
        assert!(nb.contains(&11) && nb.contains(&35));
        assert!(!nb.contains(&12));
        // Polar band cells touch every cell of their band.
        assert!(grid.neighbours(0).contains(&6));
    }

    #[test]
    fn kth_nearest_matches_brute_force() {
        let pts = random_points(300, 4, (10.0, 20.0), (-5.0, 5.0));
        let grid = EqualAreaGrid::for_points(0.03, pts.len());
        let index = PointIndex::from_points(grid, pts.iter().copied());
        for i in (0..pts.len()).step_by(7) {
            for k in [1, 2, 5] {
                let got = index.kth_nearest(&pts[i], k, Some(i)).unwrap();
                let want = brute_kth(&pts, &pts[i], k, Some(i));
                assert_eq!(got.0, want.0);
                assert!((got.1 - want.1).abs() < 1e-15);
            }
        }
        let probe = to_unit(15.0, 0.0);
        assert_eq!(index.kth_nearest(&probe, 1, None).unwrap().0, brute_kth(&pts, &probe, 1, None).0);
    }

    #[test]
    fn kth_nearest_needs_enough_points() {
        let grid = EqualAreaGrid::new(8);
        let index = PointIndex::from_points(grid, [to_unit(0.0, 0.0), to_unit(1.0, 0.0)]);
        assert!(index.kth_nearest(&to_unit(0.0, 0.0), 2, Some(0)).is_none());
        assert_eq!(index.kth_nearest(&to_unit(0.0, 0.0), 1, Some(0)).unwrap().0, 1);
    }

    #[test]
    fn any_within_uses_exact_distance() {
        let grid = EqualAreaGrid::new(64);
        let index = PointIndex::from_points(grid, [to_unit(0.0, 0.0)]);
        let r = 1f64.to_radians();
        assert!(index.any_within(&to_unit(0.99, 0.0), r));
        assert!(!index.any_within(&to_unit(1.01, 0.0), r));
    }
}
