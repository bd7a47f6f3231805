//! Age estimation entry point.
//!
//! Four methods share one result shape:
//!
//! - `CumulativeFit` / `DifferentialFit`: fit `a0` to the binned series, then
//!   map the fit and its bounds through the chronology inverse
//! - `Poisson` / `BufferedPoisson`: build the age posterior and read its median
//!   and Gaussian-equivalent ±1σ percentiles

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::age::{AgePosterior, PosteriorOptions};
use crate::binning::CraterCount;
use crate::config::DEFAULT_PDF_SAMPLES;
use crate::domain::{Binning, ObservedSeries, Presentation, Resurfacing};
use crate::error::CraterError;
use crate::models::{ChronologyFunction, ProductionFunction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeMethod {
    #[serde(rename = "c-fit")]
    CumulativeFit,
    #[serde(rename = "d-fit")]
    DifferentialFit,
    #[serde(rename = "poisson")]
    Poisson,
    #[serde(rename = "b-poisson")]
    BufferedPoisson,
}

impl AgeMethod {
    pub fn name(self) -> &'static str {
        match self {
            AgeMethod::CumulativeFit => "c-fit",
            AgeMethod::DifferentialFit => "d-fit",
            AgeMethod::Poisson => "poisson",
            AgeMethod::BufferedPoisson => "b-poisson",
        }
    }
}

impl fmt::Display for AgeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AgeMethod {
    type Err = CraterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AgeMethod::CumulativeFit,
            AgeMethod::DifferentialFit,
            AgeMethod::Poisson,
            AgeMethod::BufferedPoisson,
        ]
        .into_iter()
        .find(|m| m.name() == s)
        .ok_or_else(|| CraterError::invalid_input(format!("Unknown age method: {s}")))
    }
}

/// Parameters of an age estimate.
#[derive(Debug, Clone)]
pub struct AgeOptions {
    /// Diameter range (km). The fit methods snap `0` and `∞` to the data
    /// extent; the Poisson methods clamp both ends to the production
    /// function's validity range.
    pub range: (f64, f64),
    /// Binning of the fitted series (fit methods only).
    pub binning: Binning,
    /// Resurfacing correction (cumulative fit only).
    pub resurfacing: Option<Resurfacing>,
    /// Diameter (km) at which the fitted cumulative density is reported.
    pub ref_diameter: f64,
    pub n_samples: usize,
    /// Observed count override for the Poisson methods.
    pub k: Option<u64>,
}

impl Default for AgeOptions {
    fn default() -> Self {
        Self {
            range: (0.0, f64::INFINITY),
            binning: Binning::PseudoLog,
            resurfacing: None,
            ref_diameter: 1.0,
            n_samples: DEFAULT_PDF_SAMPLES,
            k: None,
        }
    }
}

/// Median and ±1σ ages with the offsets they correspond to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeSummary {
    /// `[median, -1σ, +1σ]` in Ga.
    pub t: [f64; 3],
    /// `a0` of each age.
    pub a0: [f64; 3],
    pub n: f64,
    pub n_event: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeEstimate {
    pub method: AgeMethod,
    pub summary: AgeSummary,
    /// Diameter range actually used (km).
    pub bin_range: (f64, f64),
    /// Cumulative density at the reference diameter for the fitted `a0`.
    pub n_ref: f64,
    pub posterior: Option<AgePosterior>,
}

/// Estimate the age of the surface counted in `cc`.
pub fn estimate_age(
    method: AgeMethod,
    cc: &mut CraterCount,
    pf: &ProductionFunction,
    cf: &ChronologyFunction,
    opts: &AgeOptions,
) -> Result<AgeEstimate, CraterError> {
    let (summary, bin_range, posterior) = match method {
        AgeMethod::CumulativeFit | AgeMethod::DifferentialFit => {
            let (presentation, resurfacing) = if method == AgeMethod::CumulativeFit {
                (Presentation::Cumulative, opts.resurfacing)
            } else {
                (Presentation::Differential, None)
            };
            let p0 = cc.plot_data(presentation, opts.binning, Some(opts.range), resurfacing, Some(pf))?;
            let fit = pf.fit(&ObservedSeries::from(&p0))?;
            let a0 = [fit.a0, fit.lower, fit.upper];
            let summary = AgeSummary {
                t: a0.map(|a| cf.t(a)),
                a0,
                n: p0.n,
                n_event: p0.n_event,
            };
            (summary, p0.bin_range, None)
        }
        AgeMethod::Poisson | AgeMethod::BufferedPoisson => {
            let (lo, hi) = pf.range();
            let r0 = (opts.range.0.clamp(lo, hi), opts.range.1.clamp(lo, hi));
            let post_opts = PosteriorOptions {
                k: opts.k,
                buffered: method == AgeMethod::BufferedPoisson,
                n_samples: opts.n_samples,
            };
            let post = AgePosterior::new(pf, cf, cc, r0, &post_opts)?;
            let t = post.median1sigma();
            let summary = AgeSummary {
                t,
                a0: t.map(|t| cf.a0(t)),
                n: post.k as f64,
                n_event: post.k as f64,
            };
            (summary, r0, Some(post))
        }
    };

    let n_ref = pf.cumulative(opts.ref_diameter, Some(summary.a0[0]));
    info!(
        method = %method,
        age = summary.t[0],
        minus = summary.t[0] - summary.t[1],
        plus = summary.t[2] - summary.t[0],
        n = summary.n,
        "age estimate"
    );
    Ok(AgeEstimate {
        method,
        summary,
        bin_range,
        n_ref,
        posterior,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Definitions;
    use crate::error::ErrorKind;

    fn moon() -> (ProductionFunction, ChronologyFunction) {
        let defs = Definitions::builtin().unwrap();
        (
            ProductionFunction::load(&defs, "Moon, Neukum (1983)").unwrap(),
            ChronologyFunction::load(&defs, "Moon, Neukum (1983)").unwrap(),
        )
    }

    /// Diameters placed at the quantiles of the production function, so the
    /// count follows the model for `a0` closely.
    fn synthetic_count(pf: &ProductionFunction, a0: f64, n: usize) -> CraterCount {
        let area = n as f64 / pf.cumulative(1.0, Some(a0));
        let diam: Vec<f64> = (0..n)
            .map(|i| {
                let target = (i as f64 + 0.5) / area;
                let (mut lo, mut hi) = (0.0f64, 2.0f64);
                for _ in 0..100 {
                    let mid = 0.5 * (lo + hi);
                    if pf.cumulative(10f64.powf(mid), Some(a0)) > target {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                10f64.powf(0.5 * (lo + hi))
            })
            .collect();
        CraterCount::new(diam, vec![1.0; n], area, Some(4.0 * area.sqrt())).unwrap()
    }

    #[test]
    fn method_names_parse() {
        assert_eq!("b-poisson".parse::<AgeMethod>().unwrap(), AgeMethod::BufferedPoisson);
        assert!("x-fit".parse::<AgeMethod>().is_err());
    }

    #[test]
    fn cumulative_fit_recovers_age() {
        let (pf, cf) = moon();
        let a0 = cf.a0(3.0);
        let mut cc = synthetic_count(&pf, a0, 500);
        let opts = AgeOptions {
            range: (1.0, f64::INFINITY),
            ..AgeOptions::default()
        };
        let est = estimate_age(AgeMethod::CumulativeFit, &mut cc, &pf, &cf, &opts).unwrap();
        assert!((est.summary.a0[0] - a0).abs() < 0.05, "a0 {}", est.summary.a0[0]);
        assert!(est.summary.t[1] < est.summary.t[0] && est.summary.t[0] < est.summary.t[2]);
        assert!((est.summary.t[0] - 3.0).abs() < 0.3);
        assert!((est.bin_range.0 - 1.0).abs() < 1e-12);
        assert!((est.n_ref - pf.cumulative(1.0, Some(est.summary.a0[0]))).abs() < 1e-15);
        assert!(est.posterior.is_none());
    }

    #[test]
    fn differential_fit_recovers_age() {
        let (pf, cf) = moon();
        let a0 = cf.a0(3.0);
        let mut cc = synthetic_count(&pf, a0, 500);
        let opts = AgeOptions {
            range: (1.0, 10.0),
            binning: Binning::Root2,
            ..AgeOptions::default()
        };
        let est = estimate_age(AgeMethod::DifferentialFit, &mut cc, &pf, &cf, &opts).unwrap();
        assert!((est.summary.a0[0] - a0).abs() < 0.1, "a0 {}", est.summary.a0[0]);
    }

    #[test]
    fn poisson_estimate_matches_count() {
        let (pf, cf) = moon();
        let a0 = cf.a0(3.0);
        let mut cc = synthetic_count(&pf, a0, 300);
        let opts = AgeOptions {
            range: (1.0, 1000.0),
            ..AgeOptions::default()
        };
        let est = estimate_age(AgeMethod::Poisson, &mut cc, &pf, &cf, &opts).unwrap();
        assert_eq!(est.summary.n, 300.0);
        assert_eq!(est.bin_range, (1.0, 300.0));
        assert!((est.summary.t[0] - 3.0).abs() < 0.1, "t {}", est.summary.t[0]);
        assert!(est.posterior.is_some());
    }

    #[test]
    fn poisson_range_is_clamped_to_production_validity() {
        let (pf, cf) = moon();
        let mut cc = synthetic_count(&pf, cf.a0(3.0), 300);
        let est = estimate_age(AgeMethod::Poisson, &mut cc, &pf, &cf, &AgeOptions::default()).unwrap();
        assert_eq!(est.bin_range, pf.range());
        assert_eq!(est.summary.n, 300.0);
    }

    #[test]
    fn buffered_poisson_without_perimeter_fails() {
        let (pf, cf) = moon();
        let mut cc = CraterCount::with_full_coverage(vec![1.0, 1.5, 2.0], 1e4).unwrap();
        let err = estimate_age(AgeMethod::BufferedPoisson, &mut cc, &pf, &cf, &AgeOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferedCountMissingPerimeter);
    }

    #[test]
    fn fit_over_empty_range_fails() {
        let (pf, cf) = moon();
        let mut cc = CraterCount::with_full_coverage(vec![1.0, 1.5, 2.0], 1e4).unwrap();
        let opts = AgeOptions {
            range: (50.0, 100.0),
            ..AgeOptions::default()
        };
        let err = estimate_age(AgeMethod::CumulativeFit, &mut cc, &pf, &cf, &opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyFitRange);
    }

    #[test]
    fn resurfacing_correction_is_small_for_model_population() {
        let (pf, cf) = moon();
        let a0 = cf.a0(3.0);
        let mut cc = synthetic_count(&pf, a0, 500);
        let opts = AgeOptions {
            range: (2.0, f64::INFINITY),
            resurfacing: Some(Resurfacing::ShowAll),
            ..AgeOptions::default()
        };
        let est = estimate_age(AgeMethod::CumulativeFit, &mut cc, &pf, &cf, &opts).unwrap();
        assert!((est.bin_range.0 - 1.0).abs() < 0.05);
        let adj = cc.resurfacing_offset(&pf, Some((2.0, f64::INFINITY))).unwrap();
        assert!(adj.abs() < 0.1 * pf.cumulative(2.0, Some(a0)), "adj {adj}");
    }
}
