//! Poisson age posterior.
//!
//! The age grid is uniform in an additive offset `x ∈ [-10, 5]` to the 1 Ga
//! reference `a0`, mapped to ages through the chronology inverse. This packs
//! samples where the density changes fastest. At each grid age the expected
//! count is `λ·10^x` and the likelihood of the observed count `k` is its
//! Poisson mass; normalising against the non-uniform spacing gives the pdf.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::binning::CraterCount;
use crate::error::{CraterError, ErrorKind};
use crate::math::{gaussian_percentiles, interp, linspace, poisson_pmf, simpson};
use crate::models::{ChronologyFunction, ProductionFunction};

const OFFSET_RANGE: (f64, f64) = (-10.0, 5.0);
/// Samples of the production function for the buffered integral.
const BUFFER_SAMPLES: usize = 500;
/// Age at which the reference `a0` is taken (Ga).
const REFERENCE_AGE: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct PosteriorOptions {
    /// Observed count; derived from the crater count when `None`.
    pub k: Option<u64>,
    /// Integrate over the rim-intersection buffer (needs a perimeter).
    pub buffered: bool,
    pub n_samples: usize,
}

impl Default for PosteriorOptions {
    fn default() -> Self {
        Self {
            k: None,
            buffered: false,
            n_samples: crate::config::DEFAULT_PDF_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgePosterior {
    /// Ages (Ga), ascending.
    pub ts: Vec<f64>,
    pub dt: Vec<f64>,
    pub pdf: Vec<f64>,
    pub cdf: Vec<f64>,
    /// Observed crater count.
    pub k: u64,
    /// Expected count at the 1 Ga reference.
    pub lambda: f64,
}

impl AgePosterior {
    /// Posterior for the craters of `cc` in `d_range` (km).
    pub fn new(
        pf: &ProductionFunction,
        cf: &ChronologyFunction,
        cc: &CraterCount,
        d_range: (f64, f64),
        opts: &PosteriorOptions,
    ) -> Result<Self, CraterError> {
        if opts.n_samples < 2 {
            return Err(CraterError::invalid_input("Age posterior needs at least two samples."));
        }
        if !(d_range.0 > 0.0 && d_range.1 > d_range.0) {
            return Err(CraterError::invalid_input(format!(
                "Invalid diameter range for age posterior: {} to {}",
                d_range.0, d_range.1
            )));
        }

        let x = linspace(OFFSET_RANGE.0, OFFSET_RANGE.1, opts.n_samples);
        let a0 = cf.a0(REFERENCE_AGE);
        let ts: Vec<f64> = x.iter().map(|v| cf.t(a0 + v)).collect();
        let mut dt: Vec<f64> = (0..ts.len())
            .map(|i| if i == 0 { 0.0 } else { ts[i] - ts[i - 1] })
            .collect();
        dt[0] = dt[1];

        let k = opts
            .k
            .unwrap_or_else(|| cc.count_in_range(d_range).round().max(0.0) as u64);

        let lambda = if opts.buffered {
            let perimeter = cc.perimeter().ok_or_else(|| {
                CraterError::new(
                    ErrorKind::BufferedCountMissingPerimeter,
                    "Buffered Poisson calculation requires the counting area perimeter.",
                )
            })?;
            let d = linspace(d_range.0, d_range.1, BUFFER_SAMPLES);
            let y: Vec<f64> = d
                .iter()
                .map(|&d| (cc.area() + d * perimeter / 2.0 + PI * d * d / 8.0) * pf.differential(d, Some(a0)))
                .collect();
            simpson(&y, &d)
        } else {
            (pf.cumulative(d_range.0, Some(a0)) - pf.cumulative(d_range.1, Some(a0))) * cc.area()
        };

        let mut pdf: Vec<f64> = x.iter().map(|v| poisson_pmf(k, lambda * 10f64.powf(*v))).collect();
        let norm: f64 = pdf.iter().zip(&dt).map(|(p, d)| p * d).sum();
        if norm > 0.0 && norm.is_finite() {
            for p in &mut pdf {
                *p /= norm;
            }
        } else {
            // Likelihood underflowed everywhere: put all mass at the grid point
            // whose expected count is closest to k.
            let target = k as f64;
            let best = (0..x.len())
                .filter(|&i| dt[i] > 0.0)
                .min_by(|&i, &j| {
                    let ei = (lambda * 10f64.powf(x[i]) - target).abs();
                    let ej = (lambda * 10f64.powf(x[j]) - target).abs();
                    ei.total_cmp(&ej)
                })
                .ok_or_else(|| CraterError::invalid_input("Age grid is degenerate."))?;
            warn!(k, lambda, index = best, "age likelihood underflowed; using delta posterior");
            pdf = vec![0.0; x.len()];
            pdf[best] = 1.0 / dt[best];
        }

        let mut acc = 0.0;
        let cdf: Vec<f64> = pdf
            .iter()
            .zip(&dt)
            .map(|(p, d)| {
                acc += p * d;
                acc
            })
            .collect();
        debug!(k, lambda, samples = ts.len(), "built age posterior");

        Ok(Self {
            ts,
            dt,
            pdf,
            cdf,
            k,
            lambda,
        })
    }

    /// Age (Ga) at cumulative probability `fraction`.
    pub fn t(&self, fraction: f64) -> f64 {
        interp(fraction, &self.cdf, &self.ts)
    }

    /// Median and Gaussian-equivalent ±1σ ages `[median, -1σ, +1σ]`.
    pub fn median1sigma(&self) -> [f64; 3] {
        let g = gaussian_percentiles(1);
        [self.t(g[1]), self.t(g[0]), self.t(g[2])]
    }

    /// Probability that this surface is older than `other`.
    ///
    /// The other cdf is averaged with its one-step-shifted copy to evaluate it
    /// at interval midpoints. Different grids are reconciled by interpolation.
    pub fn sequence_probability(&self, other: &AgePosterior) -> f64 {
        let cdf_b: Vec<f64> = if other.ts == self.ts {
            other.cdf.clone()
        } else {
            self.ts.iter().map(|&t| interp(t, &other.ts, &other.cdf)).collect()
        };
        let mid: Vec<f64> = (0..cdf_b.len())
            .map(|i| (cdf_b[i] + if i == 0 { 0.0 } else { cdf_b[i - 1] }) / 2.0)
            .collect();
        (0..self.ts.len())
            .map(|i| self.dt[i] * self.pdf[i] * mid[i])
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Definitions;

    fn moon() -> (ProductionFunction, ChronologyFunction) {
        let defs = Definitions::builtin().unwrap();
        (
            ProductionFunction::load(&defs, "Moon, Neukum (1983)").unwrap(),
            ChronologyFunction::load(&defs, "Moon, Neukum (1983)").unwrap(),
        )
    }

    /// Count whose expected number of craters ≥ 1 km at `age` is about `k`.
    fn count_for_age(pf: &ProductionFunction, cf: &ChronologyFunction, age: f64, k: usize) -> CraterCount {
        let density = pf.cumulative(1.0, Some(cf.a0(age)));
        let area = k as f64 / density;
        let diam: Vec<f64> = (0..k).map(|i| 1.0 + 0.01 * i as f64).collect();
        CraterCount::new(diam, vec![1.0; k], area, Some(4.0 * area.sqrt())).unwrap()
    }

    #[test]
    fn pdf_is_normalised_and_cdf_monotone() {
        let (pf, cf) = moon();
        let cc = count_for_age(&pf, &cf, 3.0, 40);
        let post = AgePosterior::new(&pf, &cf, &cc, (1.0, 100.0), &PosteriorOptions::default()).unwrap();
        let total: f64 = post.pdf.iter().zip(&post.dt).map(|(p, d)| p * d).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(post.cdf.windows(2).all(|w| w[1] >= w[0]));
        assert!((post.cdf[post.cdf.len() - 1] - 1.0).abs() < 1e-6);
        assert_eq!(post.k, 40);
    }

    #[test]
    fn median_is_near_the_generating_age() {
        let (pf, cf) = moon();
        let cc = count_for_age(&pf, &cf, 3.0, 200);
        let post = AgePosterior::new(&pf, &cf, &cc, (1.0, 100.0), &PosteriorOptions::default()).unwrap();
        let [median, lo, hi] = post.median1sigma();
        assert!(lo < median && median < hi);
        assert!((median - 3.0).abs() < 0.1, "median {median}");
    }

    #[test]
    fn sequence_probability_is_antisymmetric() {
        let (pf, cf) = moon();
        let young = count_for_age(&pf, &cf, 1.0, 50);
        let old = count_for_age(&pf, &cf, 3.5, 50);
        let opts = PosteriorOptions::default();
        let a = AgePosterior::new(&pf, &cf, &young, (1.0, 100.0), &opts).unwrap();
        let b = AgePosterior::new(&pf, &cf, &old, (1.0, 100.0), &opts).unwrap();
        let p_ab = a.sequence_probability(&b);
        let p_ba = b.sequence_probability(&a);
        assert!(p_ba > 0.99);
        assert!((p_ab + p_ba - 1.0).abs() < 1e-3);
    }

    #[test]
    fn underflow_falls_back_to_delta() {
        let (pf, cf) = moon();
        let cc = count_for_age(&pf, &cf, 3.0, 10);
        let opts = PosteriorOptions {
            k: Some(100_000_000),
            ..PosteriorOptions::default()
        };
        let post = AgePosterior::new(&pf, &cf, &cc, (1.0, 100.0), &opts).unwrap();
        let nonzero = post.pdf.iter().filter(|&&p| p > 0.0).count();
        assert_eq!(nonzero, 1);
        let total: f64 = post.pdf.iter().zip(&post.dt).map(|(p, d)| p * d).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn buffered_requires_perimeter() {
        let (pf, cf) = moon();
        let cc = CraterCount::with_full_coverage(vec![1.0, 2.0], 1000.0).unwrap();
        let opts = PosteriorOptions {
            buffered: true,
            ..PosteriorOptions::default()
        };
        let err = AgePosterior::new(&pf, &cf, &cc, (1.0, 10.0), &opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferedCountMissingPerimeter);
    }

    #[test]
    fn buffered_lambda_exceeds_area_only_lambda() {
        let (pf, cf) = moon();
        let cc = count_for_age(&pf, &cf, 3.0, 40);
        let plain = AgePosterior::new(&pf, &cf, &cc, (1.0, 10.0), &PosteriorOptions::default()).unwrap();
        let opts = PosteriorOptions {
            buffered: true,
            ..PosteriorOptions::default()
        };
        let buffered = AgePosterior::new(&pf, &cf, &cc, (1.0, 10.0), &opts).unwrap();
        assert!(buffered.lambda > plain.lambda);
        // Without the buffer terms the integral reproduces the cumulative difference.
        let no_buffer = CraterCount::new(cc.diameters().to_vec(), cc.fractions().to_vec(), cc.area(), Some(0.0))
            .unwrap();
        let integral = AgePosterior::new(&pf, &cf, &no_buffer, (1.0, 10.0), &opts).unwrap();
        assert!((integral.lambda / plain.lambda - 1.0).abs() < 1e-3);
    }
}
