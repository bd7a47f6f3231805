//! Random non-overlapping crater placement.
//!
//! Candidates are drawn uniformly over the counting area's lon/lat box in
//! batches sized to the current shortfall. A candidate is kept when it falls
//! inside the polygon and lies farther than one crater diameter from every
//! point already kept.

use rand::Rng;
use rand_distr::Distribution;
use tracing::trace;

use super::geometry::CountingArea;
use super::index::{EqualAreaGrid, PointIndex};
use crate::error::{CraterError, ErrorKind};

/// Over-draw factor on the expected number of candidates needed.
const BATCH_MARGIN: f64 = 1.2;
const BATCH_EXTRA: usize = 10;
/// Consecutive batches without a single acceptance before giving up.
const MAX_STALLED_BATCHES: usize = 20;

/// Place `n` points with minimum separation `diameter` (km) in `area`.
pub fn sprinkle_discs<R: Rng + ?Sized>(
    area: &CountingArea,
    grid: EqualAreaGrid,
    n: usize,
    diameter: f64,
    rng: &mut R,
) -> Result<PointIndex, CraterError> {
    let separation = area.to_angle(diameter.max(0.0));
    let hit_rate = area.hit_rate();
    if !(hit_rate > 0.0) {
        return Err(CraterError::invalid_input("Counting area has no extent to sample."));
    }
    let sampler = area.bounds().sampler();
    let mut index = PointIndex::new(grid);
    let mut stalled = 0;

    while index.len() < n {
        let shortfall = n - index.len();
        let batch = (BATCH_MARGIN * shortfall as f64 / hit_rate) as usize + BATCH_EXTRA;
        let before = index.len();
        for _ in 0..batch {
            let v = sampler.sample(rng);
            if !area.polygon().contains(&v) || index.any_within(&v, separation) {
                continue;
            }
            index.insert(v);
            if index.len() == n {
                break;
            }
        }
        trace!(batch, accepted = index.len() - before, total = index.len(), "sprinkle batch");

        if index.len() == before {
            stalled += 1;
            if stalled >= MAX_STALLED_BATCHES {
                return Err(CraterError::new(
                    ErrorKind::Sampling,
                    format!(
                        "Could only place {} of {n} craters of {diameter} km; the area is saturated.",
                        index.len()
                    ),
                ));
            }
        } else {
            stalled = 0;
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::geometry::{SphericalPolygon, angular_distance};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const MOON_RADIUS: f64 = 1737.4;

    /// L-shaped strip filling about a tenth of its 10°×10° box.
    fn l_shape() -> CountingArea {
        let ring = [(0.0, 0.0), (10.0, 0.0), (10.0, 0.5), (0.5, 0.5), (0.5, 10.0), (0.0, 10.0)];
        CountingArea::new(SphericalPolygon::simple(&ring).unwrap(), MOON_RADIUS).unwrap()
    }

    #[test]
    fn places_exactly_n_separated_points() {
        let area = l_shape();
        assert!((area.hit_rate() - 0.1).abs() < 0.01, "hit rate {}", area.hit_rate());
        let diameter = 2.0;
        let grid = EqualAreaGrid::for_points(area.polygon().area(), 50);
        let mut rng = StdRng::seed_from_u64(11);
        let index = sprinkle_discs(&area, grid, 50, diameter, &mut rng).unwrap();
        assert_eq!(index.len(), 50);
        let pts = index.points();
        assert!(pts.iter().all(|p| area.polygon().contains(p)));
        for i in 0..pts.len() {
            for j in (i + 1)..pts.len() {
                assert!(angular_distance(&pts[i], &pts[j]) * MOON_RADIUS > diameter);
            }
        }
    }

    #[test]
    fn same_seed_same_points() {
        let area = l_shape();
        let grid = EqualAreaGrid::for_points(area.polygon().area(), 20);
        let a = sprinkle_discs(&area, grid, 20, 1.0, &mut StdRng::seed_from_u64(5)).unwrap();
        let b = sprinkle_discs(&area, grid, 20, 1.0, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(a.points(), b.points());
    }

    #[test]
    fn saturated_area_fails() {
        let ring = [(0.0, 0.0), (0.1, 0.0), (0.1, 0.1), (0.0, 0.1)];
        let area = CountingArea::new(SphericalPolygon::simple(&ring).unwrap(), MOON_RADIUS).unwrap();
        let grid = EqualAreaGrid::for_points(area.polygon().area(), 10);
        // A 3 km square cannot hold ten points 5 km apart.
        let err = sprinkle_discs(&area, grid, 10, 5.0, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Sampling);
    }

    #[test]
    fn zero_points_is_empty() {
        let area = l_shape();
        let grid = EqualAreaGrid::new(8);
        let index = sprinkle_discs(&area, grid, 0, 1.0, &mut StdRng::seed_from_u64(1)).unwrap();
        assert!(index.is_empty());
    }
}
