//! Production-function offset fitting.
//!
//! Given an observed series (`d_i`, `y_i`, `err_i`) in cumulative or
//! differential presentation, we fit the single offset `a0` so that the
//! production function matches `log10 y` against `log10 d`:
//!
//! - per-point sigma is `1/√y` (cumulative) or `1/√err` (differential)
//! - the weighted residuals are minimised by Gauss-Newton, each step solved by
//!   SVD least squares on the weighted Jacobian
//!
//! The reported bounds come from the first point only: the offsets that make
//! the curve pass through `y_0 ∓ 0.98·err_0`.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::domain::{A0Fit, ObservedSeries, Presentation};
use crate::error::{CraterError, ErrorKind};
use crate::math::solve_weighted_least_squares;
use crate::models::ProductionFunction;

/// Fraction of the first point's error used for the bounds.
const BOUND_ERROR_FRACTION: f64 = 0.98;
/// Step for the numerical derivative with respect to `a0`.
const JACOBIAN_STEP: f64 = 1e-6;

/// Options controlling the Gauss-Newton iteration.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Stop once the update to `a0` is smaller than this.
    pub tolerance: f64,
    pub max_iters: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iters: 50,
        }
    }
}

/// Fit `a0` of `pf` to `series` with default options.
pub fn fit_a0(pf: &ProductionFunction, series: &ObservedSeries) -> Result<A0Fit, CraterError> {
    fit_a0_with(pf, series, &FitOptions::default())
}

pub fn fit_a0_with(
    pf: &ProductionFunction,
    series: &ObservedSeries,
    opts: &FitOptions,
) -> Result<A0Fit, CraterError> {
    let n = series.y.len();
    if n == 0 {
        return Err(CraterError::new(ErrorKind::EmptyFitRange, "Cannot fit to empty range."));
    }
    if series.d.len() != n || series.err.len() != n {
        return Err(CraterError::invalid_input("Fit series columns differ in length."));
    }
    if !matches!(series.presentation, Presentation::Cumulative | Presentation::Differential) {
        return Err(CraterError::invalid_input(format!(
            "Cannot fit in {} presentation; use cumulative or differential.",
            series.presentation
        )));
    }
    if series.y.iter().any(|v| !(v.is_finite() && *v > 0.0)) || series.d.iter().any(|v| !(*v > 0.0)) {
        return Err(CraterError::invalid_input("Fit series needs positive diameters and densities."));
    }

    // A single point is duplicated so the fit is well posed.
    let (d, y, err) = if n == 1 {
        (vec![series.d[0]; 2], vec![series.y[0]; 2], vec![series.err[0]; 2])
    } else {
        (series.d.clone(), series.y.clone(), series.err.clone())
    };

    let x: Vec<f64> = d.iter().map(|v| v.log10()).collect();
    let z: Vec<f64> = y.iter().map(|v| v.log10()).collect();
    let mut w: Vec<f64> = match series.presentation {
        Presentation::Differential => err.iter().map(|e| e.sqrt()).collect(),
        _ => y.iter().map(|v| v.sqrt()).collect(),
    };
    if w.iter().all(|v| !(v.is_finite() && *v > 0.0)) {
        w = vec![1.0; w.len()];
    }

    let presentation = series.presentation;
    let mut a0 = pf.default_a0();
    let m = x.len();
    for iter in 0..opts.max_iters {
        let mut jac = DMatrix::<f64>::zeros(m, 1);
        let mut res = DVector::<f64>::zeros(m);
        for i in 0..m {
            let model = pf.log_model(presentation, x[i], a0)?;
            let up = pf.log_model(presentation, x[i], a0 + JACOBIAN_STEP)?;
            let dn = pf.log_model(presentation, x[i], a0 - JACOBIAN_STEP)?;
            jac[(i, 0)] = (up - dn) / (2.0 * JACOBIAN_STEP);
            res[i] = z[i] - model;
        }
        let step = solve_weighted_least_squares(&jac, &res, &w)
            .and_then(|s| s.get(0).copied())
            .filter(|s| s.is_finite())
            .ok_or_else(|| CraterError::invalid_input("Fit of a0 failed to converge."))?;
        a0 += step;
        debug!(iter, a0, step, "a0 fit iteration");
        if step.abs() < opts.tolerance {
            break;
        }
    }

    let (y0, e0) = (y[0], err[0]);
    let lower = a0 - (y0.log10() - (y0 - BOUND_ERROR_FRACTION * e0).log10());
    let upper = a0 - (y0.log10() - (y0 + BOUND_ERROR_FRACTION * e0).log10());
    Ok(A0Fit { a0, lower, upper })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Definitions, ProductionDef, ProductionKind};

    fn neukum() -> ProductionFunction {
        ProductionFunction::load(&Definitions::builtin().unwrap(), "Moon, Neukum (1983)").unwrap()
    }

    fn tabular() -> ProductionFunction {
        let h: Vec<f64> = (0..40).map(|i| 0.6f64.powi(i) * (1.0 + 0.1 * (i as f64).sin())).collect();
        ProductionFunction::from_definition(&ProductionDef {
            name: "table".to_string(),
            kind: ProductionKind::Tabular { h, index_1km: 12 },
            range: None,
            reference: None,
        })
        .unwrap()
    }

    fn synthetic(pf: &ProductionFunction, presentation: Presentation, a0: f64) -> ObservedSeries {
        let c = pf.curve(presentation, Some(a0), None);
        ObservedSeries {
            presentation,
            err: vec![1.0; c.y.len()],
            d: c.d,
            y: c.y,
        }
    }

    #[test]
    fn recovers_known_a0() {
        for pf in [neukum(), tabular()] {
            for presentation in [Presentation::Cumulative, Presentation::Differential] {
                let fit = fit_a0(&pf, &synthetic(&pf, presentation, 1.5)).unwrap();
                assert!((fit.a0 - 1.5).abs() < 1e-7, "{} {presentation}: {}", pf.name(), fit.a0);
            }
        }
    }

    #[test]
    fn single_point_fit_passes_through_point() {
        let pf = neukum();
        let series = ObservedSeries {
            presentation: Presentation::Cumulative,
            d: vec![1.0],
            y: vec![1e-3],
            err: vec![0.0],
        };
        let fit = fit_a0(&pf, &series).unwrap();
        assert!((fit.a0 + 3.0).abs() < 1e-9);
        assert_eq!(fit.lower, fit.a0);
        assert_eq!(fit.upper, fit.a0);
    }

    #[test]
    fn bounds_bracket_the_fit() {
        let pf = neukum();
        let series = ObservedSeries {
            presentation: Presentation::Cumulative,
            d: vec![1.0, 2.0],
            y: vec![1e-3, 2e-4],
            err: vec![3e-4, 1e-4],
        };
        let fit = fit_a0(&pf, &series).unwrap();
        assert!(fit.lower < fit.a0 && fit.a0 < fit.upper);
        let expected = fit.a0 - (1e-3f64.log10() - (1e-3f64 - 0.98 * 3e-4).log10());
        assert!((fit.lower - expected).abs() < 1e-12);
    }

    #[test]
    fn empty_series_is_empty_fit_range() {
        let series = ObservedSeries {
            presentation: Presentation::Cumulative,
            d: vec![],
            y: vec![],
            err: vec![],
        };
        assert_eq!(fit_a0(&neukum(), &series).unwrap_err().kind(), ErrorKind::EmptyFitRange);
    }

    #[test]
    fn other_presentations_are_rejected() {
        let mut series = synthetic(&neukum(), Presentation::Cumulative, -3.0);
        series.presentation = Presentation::RPlot;
        assert_eq!(fit_a0(&neukum(), &series).unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
