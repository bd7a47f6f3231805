//! Crater counts and their binned presentations.
//!
//! A [`CraterCount`] holds raw diameters with coverage fractions (or a
//! prebinned table) and produces plottable series in any presentation.
//! The binned view is a derived cache keyed by binning policy and offset: it is
//! recomputed only when a different policy is requested.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binning::bins::{bin_bias_correction, generate_bins};
use crate::domain::{Binned, Binning, ObservedSeries, PlotData, Presentation, RangeBound, Resurfacing};
use crate::error::CraterError;
use crate::fit::fit_a0;
use crate::math::reverse_cumsum;
use crate::models::ProductionFunction;

/// Convergence threshold of the resurfacing offset.
const RESURFACING_TOL: f64 = 1e-4;
const RESURFACING_MAX_ITERS: usize = 20;

/// Fallback cumulative slope for the binning-bias correction when no model is given.
const DEFAULT_CUMULATIVE_SLOPE: f64 = -3.0;

/// Derived binning cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinCache {
    pub binning: Binning,
    pub offset: f64,
    pub binned: Binned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CraterCount {
    /// Diameters (km), sorted descending. Empty for prebinned counts.
    diam: Vec<f64>,
    fraction: Vec<f64>,
    area: f64,
    perimeter: Option<f64>,
    buffered: bool,
    prebinned: bool,
    cache: Option<BinCache>,
}

impl CraterCount {
    /// Standard count: diameters (km), coverage fractions in `[0, 1]`, area (km²).
    pub fn new(
        diameters: Vec<f64>,
        fractions: Vec<f64>,
        area: f64,
        perimeter: Option<f64>,
    ) -> Result<Self, CraterError> {
        if fractions.iter().any(|f| !(0.0..=1.0).contains(f)) {
            return Err(CraterError::invalid_input("Crater list has invalid crater fractions."));
        }
        Self::from_parts(diameters, fractions, area, perimeter, false)
    }

    /// Standard count with every crater fully inside the area.
    pub fn with_full_coverage(diameters: Vec<f64>, area: f64) -> Result<Self, CraterError> {
        let fractions = vec![1.0; diameters.len()];
        Self::new(diameters, fractions, area, None)
    }

    /// Buffered count: densities are expressed relative to a nominal 1 km² and
    /// each crater is weighted by the inverse of its reference area.
    pub fn buffered(
        diameters: Vec<f64>,
        reference_areas: &[f64],
        perimeter: Option<f64>,
    ) -> Result<Self, CraterError> {
        if reference_areas.iter().any(|a| !(a.is_finite() && *a > 0.0)) {
            return Err(CraterError::invalid_input("Buffered crater list has invalid reference areas."));
        }
        let area = 1.0;
        let fractions = reference_areas.iter().map(|a| area / a).collect();
        Self::from_parts(diameters, fractions, area, perimeter, true)
    }

    fn from_parts(
        diameters: Vec<f64>,
        fractions: Vec<f64>,
        area: f64,
        perimeter: Option<f64>,
        buffered: bool,
    ) -> Result<Self, CraterError> {
        if diameters.len() != fractions.len() {
            return Err(CraterError::invalid_input(format!(
                "Crater list has {} diameters but {} fractions.",
                diameters.len(),
                fractions.len()
            )));
        }
        if !(area.is_finite() && area > 0.0) {
            return Err(CraterError::invalid_input("Crater list has undefined area."));
        }
        if diameters.iter().any(|d| !(d.is_finite() && *d > 0.0)) {
            return Err(CraterError::invalid_input("Crater list has non-positive diameters."));
        }
        if let Some(p) = perimeter {
            if !(p.is_finite() && p >= 0.0) {
                return Err(CraterError::invalid_input("Crater list has invalid perimeter."));
            }
        }

        let mut pairs: Vec<(f64, f64)> = diameters.into_iter().zip(fractions).collect();
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.total_cmp(&a.1)));
        let (diam, fraction) = pairs.into_iter().unzip();

        Ok(Self {
            diam,
            fraction,
            area,
            perimeter,
            buffered,
            prebinned: false,
            cache: None,
        })
    }

    /// Prebinned count from bin minima with weighted and event counts.
    ///
    /// The last bin's upper boundary is extrapolated with the ratio of the
    /// previous two minima.
    pub fn from_binned(
        d_min: Vec<f64>,
        n: Vec<f64>,
        n_event: Vec<f64>,
        area: f64,
    ) -> Result<Self, CraterError> {
        if d_min.len() != n.len() || d_min.len() != n_event.len() {
            return Err(CraterError::invalid_input("Binned table columns differ in length."));
        }
        if d_min.len() < 2 {
            return Err(CraterError::invalid_input("Binned table needs at least two bins."));
        }
        if !(area.is_finite() && area > 0.0) {
            return Err(CraterError::invalid_input("Binned table has undefined area."));
        }
        let mut rows: Vec<(f64, f64, f64)> = d_min
            .into_iter()
            .zip(n)
            .zip(n_event)
            .map(|((d, n), e)| (d, n, e))
            .collect();
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));
        if rows.windows(2).any(|w| w[1].0 <= w[0].0) || rows[0].0 <= 0.0 {
            return Err(CraterError::invalid_input("Binned diameters must be positive and distinct."));
        }

        let d_min: Vec<f64> = rows.iter().map(|r| r.0).collect();
        let n: Vec<f64> = rows.iter().map(|r| r.1).collect();
        let n_event: Vec<f64> = rows.iter().map(|r| r.2).collect();

        let last = d_min.len() - 1;
        let mut d_max: Vec<f64> = d_min[1..].to_vec();
        d_max.push(d_min[last] * (d_min[last] / d_min[last - 1]));
        let d_mean = d_min.iter().zip(&d_max).map(|(a, b)| (a * b).sqrt()).collect();
        let bin_width = d_min.iter().zip(&d_max).map(|(a, b)| b - a).collect();

        let binned = Binned {
            ncum: reverse_cumsum(&n),
            ncum_event: reverse_cumsum(&n_event),
            d_min,
            d_max,
            d_mean,
            bin_width,
            n,
            n_event,
        };

        Ok(Self {
            diam: Vec::new(),
            fraction: Vec::new(),
            area,
            perimeter: None,
            buffered: false,
            prebinned: true,
            cache: Some(BinCache {
                binning: Binning::PseudoLog,
                offset: 0.0,
                binned,
            }),
        })
    }

    /// Merge raw counts: crater lists are concatenated, areas and perimeters summed.
    pub fn merge(counts: &[CraterCount]) -> Result<Self, CraterError> {
        if counts.len() < 2 {
            return Err(CraterError::invalid_input("Specify at least two crater counts to merge."));
        }
        let mut diam = Vec::new();
        let mut fraction = Vec::new();
        let mut area = 0.0;
        let mut perimeter = 0.0;
        for c in counts {
            if c.prebinned {
                return Err(CraterError::invalid_input("Cannot merge a prebinned crater count."));
            }
            diam.extend_from_slice(&c.diam);
            fraction.extend_from_slice(&c.fraction);
            area += c.area;
            perimeter += c.perimeter.unwrap_or(0.0);
        }
        let perimeter = counts.iter().any(|c| c.perimeter.is_some()).then_some(perimeter);
        Self::from_parts(diam, fraction, area, perimeter, false)
    }

    pub fn diameters(&self) -> &[f64] {
        &self.diam
    }

    pub fn fractions(&self) -> &[f64] {
        &self.fraction
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn perimeter(&self) -> Option<f64> {
        self.perimeter
    }

    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    pub fn is_prebinned(&self) -> bool {
        self.prebinned
    }

    /// Current binning policy, if any binning has been applied.
    pub fn binning(&self) -> Option<Binning> {
        self.cache.as_ref().map(|c| c.binning)
    }

    /// Current binned view, if any binning has been applied.
    pub fn binned(&self) -> Option<&Binned> {
        self.cache.as_ref().map(|c| &c.binned)
    }

    /// Bin the count with `binning`, reusing the cache when policy and offset match.
    ///
    /// Prebinned counts keep their original bins.
    pub fn apply_binning(&mut self, binning: Binning, offset: f64) -> &Binned {
        let stale = match &self.cache {
            Some(c) => !self.prebinned && (c.binning != binning || c.offset != offset),
            None => true,
        };
        if stale {
            self.cache = None;
        }
        let cache = self.cache.get_or_insert_with(|| {
            debug!(binning = %binning, offset, craters = self.diam.len(), "rebinning crater count");
            BinCache {
                binning,
                offset,
                binned: bin_diameters(binning, &self.diam, &self.fraction, offset),
            }
        });
        &cache.binned
    }

    /// Bin boundaries for `binning` over `d` (see [`generate_bins`]).
    pub fn generate_bins(&self, binning: Binning, d: &[f64], offset: f64, expand: bool) -> Vec<f64> {
        generate_bins(binning, d, offset, expand)
    }

    /// Number of craters with `d_min ≤ d < d_max`.
    ///
    /// Prebinned counts sum `n_event` over bins wholly inside the range.
    pub fn count_in_range(&self, range: (f64, f64)) -> f64 {
        if self.prebinned {
            return self
                .binned()
                .map(|b| {
                    (0..b.len())
                        .filter(|&i| b.d_min[i] >= range.0 && b.d_max[i] <= range.1)
                        .map(|i| b.n_event[i])
                        .sum()
                })
                .unwrap_or(0.0);
        }
        self.diam.iter().filter(|&&d| range.0 <= d && d < range.1).count() as f64
    }

    /// Plottable series for `presentation` under `binning`.
    ///
    /// - `range` keeps bins whose geometric centre lies strictly inside it and
    ///   snaps the reported `bin_range` outward to bin boundaries.
    /// - `resurfacing` (cumulative only) shifts the series by the iteratively
    ///   fitted resurfacing offset; it requires `pf`.
    /// - `pf` also supplies the local slope for the differential binning-bias
    ///   correction.
    pub fn plot_data(
        &mut self,
        presentation: Presentation,
        binning: Binning,
        range: Option<(f64, f64)>,
        resurfacing: Option<Resurfacing>,
        pf: Option<&ProductionFunction>,
    ) -> Result<PlotData, CraterError> {
        self.apply_binning(binning, 0.0);

        let adj = match resurfacing {
            Some(_) if presentation == Presentation::Cumulative => {
                let pf = pf.ok_or_else(|| {
                    CraterError::invalid_input("Resurfacing correction requires a production function.")
                })?;
                self.resurfacing_offset(pf, range)?
            }
            _ => 0.0,
        };

        let area = self.area;
        let b = self.binned().ok_or_else(|| CraterError::invalid_input("Crater count is not binned."))?;
        let mut q: Vec<usize> = (0..b.len()).filter(|&i| b.n[i] > 0.0).collect();
        if q.is_empty() {
            return Err(CraterError::invalid_input("Crater count has no populated bins."));
        }

        let mut d = Vec::with_capacity(q.len());
        let mut y = Vec::with_capacity(q.len());
        let mut err = Vec::with_capacity(q.len());

        for &i in &q {
            let (di, yi, ei) = match presentation {
                Presentation::Cumulative => {
                    let yi = b.ncum[i] / area + adj;
                    (b.d_min[i], yi, yi / b.ncum_event[i].sqrt())
                }
                Presentation::Incremental => {
                    let yi = b.n[i] / area;
                    (b.d_mean[i], yi, yi / b.n_event[i].sqrt())
                }
                Presentation::Differential => {
                    let dm = b.d_mean[i];
                    let f_bin = b.n[i] / b.bin_width[i] / area;
                    let err = f_bin / b.n_event[i].sqrt();
                    let beta = (dm / b.d_min[i]).powi(2);
                    let k = match pf {
                        Some(pf) => {
                            let s = beta.sqrt();
                            (pf.cumulative(dm * s, None) / pf.cumulative(dm / s, None)).log10() / beta.log10()
                        }
                        None => DEFAULT_CUMULATIVE_SLOPE,
                    };
                    (dm, f_bin / bin_bias_correction(beta, k), err)
                }
                Presentation::Hartmann => {
                    let dm = b.d_mean[i];
                    let yi = b.n[i] / b.bin_width[i] / area * dm * (2f64.sqrt() - 1.0 / 2f64.sqrt());
                    (dm, yi, yi / b.n_event[i].sqrt())
                }
                Presentation::RPlot => {
                    let dm = b.d_mean[i];
                    let yi = dm.powi(3) * b.n[i] / b.bin_width[i] / area;
                    (dm, yi, yi / b.n_event[i].sqrt())
                }
            };
            d.push(di);
            y.push(yi);
            err.push(ei);
        }

        let bin_range = match range {
            Some(r) => {
                let keep: Vec<usize> = (0..q.len())
                    .filter(|&j| r.0 < b.d_mean[q[j]] && b.d_mean[q[j]] < r.1)
                    .collect();
                d = keep.iter().map(|&j| d[j]).collect();
                y = keep.iter().map(|&j| y[j]).collect();
                err = keep.iter().map(|&j| err[j]).collect();
                q = keep.iter().map(|&j| q[j]).collect();

                let mut r1 = [r.0, r.1];
                if resurfacing == Some(Resurfacing::ShowAll) {
                    r1[0] = 0.0;
                }
                if r1[0] == 0.0 {
                    r1[0] = b.d_min[0];
                }
                if r1[1].is_infinite() {
                    r1[1] = b.d_max[b.len() - 1];
                }
                let binning = self.binning().unwrap_or(binning);
                let snapped = generate_bins(binning, &r1, 0.0, false);
                match (snapped.first(), snapped.last()) {
                    (Some(&lo), Some(&hi)) => (lo, hi),
                    _ => (r1[0], r1[1]),
                }
            }
            None => (b.d_min[q[0]], b.d_max[q[q.len() - 1]]),
        };

        let n = q.iter().map(|&i| b.n[i]).sum();
        let n_event = q.iter().map(|&i| b.n_event[i]).sum();

        Ok(PlotData {
            presentation,
            d,
            y,
            err,
            n,
            n_event,
            bin_range,
        })
    }

    /// Resolve a pair of range bounds to absolute diameters under `binning`.
    ///
    /// With `snap` the bounds are widened outward to the nearest bin boundaries.
    pub fn decode_range(
        &mut self,
        bounds: [RangeBound; 2],
        binning: Binning,
        snap: bool,
    ) -> Result<(f64, f64), CraterError> {
        let b = self.apply_binning(binning, 0.0);
        let populated: Vec<usize> = (0..b.len()).filter(|&i| b.n[i] > 0.0).collect();

        let resolve = |bound: RangeBound| -> Result<f64, CraterError> {
            match bound {
                RangeBound::Diameter(d) => Ok(d),
                RangeBound::Bin(k) => {
                    let m = populated.len() as i64;
                    let idx = if k >= 0 { k } else { m + k };
                    if idx < 0 || idx >= m {
                        return Err(CraterError::invalid_input(format!(
                            "Bin index b{k} outside the {m} populated bins."
                        )));
                    }
                    let i = populated[idx as usize];
                    Ok(if k >= 0 { b.d_min[i] } else { b.d_max[i] })
                }
            }
        };
        let mut lo = resolve(bounds[0])?;
        let mut hi = resolve(bounds[1])?;
        if hi <= lo {
            return Err(CraterError::invalid_input(format!("Empty diameter range: {lo} to {hi}")));
        }

        if snap && binning != Binning::None {
            if lo <= 0.0 {
                lo = b.d_min.first().copied().unwrap_or(lo);
            }
            if hi.is_infinite() {
                hi = b.d_max.last().copied().unwrap_or(hi);
            }
            let bounds = generate_bins(binning, &[lo, hi], 0.0, true);
            if let Some(&v) = bounds.iter().rev().find(|&&v| v <= lo * (1.0 + 1e-12)) {
                lo = v;
            }
            if let Some(&v) = bounds.iter().find(|&&v| v >= hi * (1.0 - 1e-12)) {
                hi = v;
            }
        }
        Ok((lo, hi))
    }

    /// Additive cumulative-density offset correcting for partial resurfacing.
    ///
    /// The production function is refitted to the shifted data until the offset
    /// changes by less than 1e-4 or 20 iterations have run.
    pub fn resurfacing_offset(
        &mut self,
        pf: &ProductionFunction,
        range: Option<(f64, f64)>,
    ) -> Result<f64, CraterError> {
        let binning = self.binning().unwrap_or(Binning::PseudoLog);
        let p0 = self.plot_data(Presentation::Cumulative, binning, range, None, None)?;
        let n = p0.d.len();
        let mut adj = 0.0;
        if n > 1 {
            let mut series = ObservedSeries::from(&p0);
            let mut count = 0;
            loop {
                let adj0 = adj;
                series.y = p0.y.iter().map(|v| v + adj).collect();
                let fit = fit_a0(pf, &series)?;
                adj = pf.cumulative(p0.d[n - 1], Some(fit.a0)) - p0.y[n - 1];
                count += 1;
                debug!(iteration = count, offset = adj, "resurfacing correction");
                if (adj0 - adj).abs() < RESURFACING_TOL || count > RESURFACING_MAX_ITERS {
                    break;
                }
            }
        }
        Ok(adj)
    }
}

/// Histogram `d` (weighted by `fraction`, and unweighted) over `binning`.
fn bin_diameters(binning: Binning, d: &[f64], fraction: &[f64], offset: f64) -> Binned {
    if binning == Binning::None {
        let mut pairs: Vec<(f64, f64)> = d.iter().copied().zip(fraction.iter().copied()).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        let bins: Vec<f64> = pairs.iter().map(|p| p.0).collect();
        let n: Vec<f64> = pairs.iter().map(|p| p.1).collect();
        let n_event = vec![1.0; bins.len()];
        return Binned {
            d_min: bins.clone(),
            d_max: bins.clone(),
            d_mean: bins.clone(),
            bin_width: vec![0.0; bins.len()],
            ncum: reverse_cumsum(&n),
            ncum_event: reverse_cumsum(&n_event),
            n,
            n_event,
        };
    }

    let bounds = generate_bins(binning, d, offset, true);
    let nb = bounds.len().saturating_sub(1);
    let mut n = vec![0.0; nb];
    let mut n_event = vec![0.0; nb];
    for (&di, &fi) in d.iter().zip(fraction) {
        if let Some(i) = histogram_index(&bounds, di) {
            n[i] += fi;
            n_event[i] += 1.0;
        }
    }

    let d_min: Vec<f64> = bounds.iter().take(nb).copied().collect();
    let d_max: Vec<f64> = bounds.iter().skip(1).copied().collect();
    let d_mean = d_min.iter().zip(&d_max).map(|(a, b)| (a * b).sqrt()).collect();
    let bin_width = d_min.iter().zip(&d_max).map(|(a, b)| b - a).collect();

    Binned {
        ncum: reverse_cumsum(&n),
        ncum_event: reverse_cumsum(&n_event),
        d_min,
        d_max,
        d_mean,
        bin_width,
        n,
        n_event,
    }
}

/// Bin of `x` with half-open bins `[b_i, b_{i+1})`; the last bin is closed.
fn histogram_index(bounds: &[f64], x: f64) -> Option<usize> {
    let nb = bounds.len().checked_sub(1)?;
    if nb == 0 || x < bounds[0] || x > bounds[nb] {
        return None;
    }
    if x == bounds[nb] {
        return Some(nb - 1);
    }
    Some(bounds.partition_point(|&b| b <= x) - 1)
}
