//! Production (and equilibrium) functions.
//!
//! A production function gives crater density against diameter for a surface
//! of a given exposure, parameterised by the single offset `a0`
//! (`log10` of the cumulative density at 1 km). Two representations:
//!
//! - polynomial in `log10 D` for the cumulative density, differentiated
//!   analytically
//! - tabulated incremental counts on a root-2 diameter grid, interpolated in
//!   log-log space with a binning-bias corrected differential form
//!
//! In both, `a0` enters additively in log space.

use serde::Serialize;

use crate::binning::bin_bias_correction;
use crate::config::{Definitions, ProductionDef, ProductionKind};
use crate::domain::{A0Fit, ObservedSeries, Presentation};
use crate::error::CraterError;
use crate::fit::fit_a0;
use crate::math::{interp, linspace, reverse_cumsum};

/// Validity range used when a definition gives none (km).
pub const DEFAULT_RANGE: (f64, f64) = (1e-4, 2e3);
const CURVE_POINTS: usize = 400;
/// Isochrons are cut where they reach this fraction of the equilibrium density.
const EQUILIBRIUM_FRACTION: f64 = 0.8;

/// Relative width of a root-2 bin about its geometric centre.
fn root2_bin_width() -> f64 {
    2f64.powf(0.25) - 2f64.powf(-0.25)
}

#[derive(Debug, Clone, PartialEq)]
enum Model {
    Polynomial { a: Vec<f64> },
    Tabular(Table),
}

/// Tabulated function, precomputed at `a0 = 0`.
#[derive(Debug, Clone, PartialEq)]
struct Table {
    d_min10: Vec<f64>,
    d_mean10: Vec<f64>,
    /// Cumulative density at each bin minimum, relative to the 1 km bin.
    c10: Vec<f64>,
    h10: Vec<f64>,
    f10: Vec<f64>,
    r10: Vec<f64>,
}

impl Table {
    fn new(h: &[f64], index_1km: usize) -> Result<Self, CraterError> {
        if h.len() < 2 || index_1km >= h.len() {
            return Err(CraterError::invalid_definition(
                "Tabular production function needs at least two bins and a valid 1 km index.",
            ));
        }
        if h.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(CraterError::invalid_definition(
                "Tabular production function values must be positive.",
            ));
        }
        let n = h.len();
        let cum = reverse_cumsum(h);
        let ref10 = cum[index_1km].log10();
        let c10: Vec<f64> = cum.iter().map(|c| c.log10() - ref10).collect();

        let d_min10: Vec<f64> = (0..n)
            .map(|i| (i as f64 - index_1km as f64) / 2.0 * std::f64::consts::LOG10_2)
            .collect();
        let d_mean10: Vec<f64> = d_min10.iter().map(|v| v + 0.25 * std::f64::consts::LOG10_2).collect();

        let c: Vec<f64> = c10.iter().map(|v| 10f64.powf(*v)).collect();
        let inc: Vec<f64> = (0..n)
            .map(|i| c[i] - if i + 1 < n { c[i + 1] } else { 0.0 })
            .collect();

        let beta = 2f64.sqrt();
        let mut k: Vec<f64> = (0..n)
            .map(|i| if i + 1 < n { (c10[i] - c10[i + 1]) / beta.log10() } else { 0.0 })
            .collect();
        k[n - 1] = k[n - 2];

        let mut h10 = Vec::with_capacity(n);
        let mut f10 = Vec::with_capacity(n);
        let mut r10 = Vec::with_capacity(n);
        for i in 0..n {
            let d_mean = 10f64.powf(d_mean10[i]);
            let f_bin = inc[i] / d_mean / root2_bin_width();
            let f = f_bin / bin_bias_correction(beta, k[i]);
            h10.push(inc[i].log10());
            f10.push(f.log10());
            r10.push((f * d_mean.powi(3)).log10());
        }

        Ok(Self {
            d_min10,
            d_mean10,
            c10,
            h10,
            f10,
            r10,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductionFunction {
    name: String,
    model: Model,
    range: (f64, f64),
}

/// Sampled production-function curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCurve {
    pub presentation: Presentation,
    pub d: Vec<f64>,
    pub y: Vec<f64>,
}

impl ProductionFunction {
    /// Look up a named production function.
    pub fn load(defs: &Definitions, name: &str) -> Result<Self, CraterError> {
        let def = defs
            .production
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| CraterError::config_not_found("Production function", name))?;
        Self::from_definition(def)
    }

    /// Look up a named equilibrium function.
    pub fn load_equilibrium(defs: &Definitions, name: &str) -> Result<Self, CraterError> {
        let def = defs
            .equilibrium
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| CraterError::config_not_found("Equilibrium function", name))?;
        Self::from_definition(def)
    }

    pub fn from_definition(def: &ProductionDef) -> Result<Self, CraterError> {
        let (model, range) = match &def.kind {
            ProductionKind::Polynomial { coefficients } => {
                if coefficients.len() < 2 {
                    return Err(CraterError::invalid_definition(format!(
                        "Polynomial production function {} needs at least two coefficients.",
                        def.name
                    )));
                }
                let range = def.range.map(|r| (r[0], r[1])).unwrap_or(DEFAULT_RANGE);
                (Model::Polynomial { a: coefficients.clone() }, range)
            }
            ProductionKind::Tabular { h, index_1km } => {
                let table = Table::new(h, *index_1km)?;
                let n = table.d_mean10.len();
                let range = (10f64.powf(table.d_mean10[0]), 10f64.powf(table.d_mean10[n - 1]));
                (Model::Tabular(table), range)
            }
        };
        if !(range.0 > 0.0 && range.1 > range.0) {
            return Err(CraterError::invalid_definition(format!(
                "Production function {} has an invalid range.",
                def.name
            )));
        }
        Ok(Self {
            name: def.name.clone(),
            model,
            range,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Diameter range (km) over which the function is valid.
    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    /// The offset the definition itself carries (`a[0]`, or 0 for tables).
    pub fn default_a0(&self) -> f64 {
        match &self.model {
            Model::Polynomial { a } => a[0],
            Model::Tabular(_) => 0.0,
        }
    }

    /// Density at diameter `d` (km) in the given presentation.
    pub fn evaluate(&self, presentation: Presentation, d: f64, a0: Option<f64>) -> f64 {
        let a0 = a0.unwrap_or_else(|| self.default_a0());
        match presentation {
            Presentation::Cumulative => self.cumulative(d, Some(a0)),
            Presentation::Differential => 10f64.powf(self.log_differential(d.log10(), a0)),
            Presentation::Incremental => {
                let s = 2f64.powf(0.25);
                self.cumulative(d / s, Some(a0)) - self.cumulative(d * s, Some(a0))
            }
            Presentation::RPlot => match &self.model {
                Model::Polynomial { .. } => self.polynomial_differential(d, a0) * d.powi(3),
                Model::Tabular(t) => 10f64.powf(interp(d.log10(), &t.d_mean10, &t.r10) + a0),
            },
            Presentation::Hartmann => match &self.model {
                Model::Polynomial { .. } => self.polynomial_differential(d, a0) * d * root2_bin_width(),
                Model::Tabular(t) => 10f64.powf(interp(d.log10(), &t.d_mean10, &t.h10) + a0),
            },
        }
    }

    /// Cumulative density of craters ≥ `d` km (km⁻²).
    pub fn cumulative(&self, d: f64, a0: Option<f64>) -> f64 {
        let a0 = a0.unwrap_or_else(|| self.default_a0());
        10f64.powf(self.log_cumulative(d.log10(), a0))
    }

    /// Differential density `-dN/dD` at `d` km (km⁻³).
    pub fn differential(&self, d: f64, a0: Option<f64>) -> f64 {
        self.evaluate(Presentation::Differential, d, a0)
    }

    /// `log10` cumulative density at `log10` diameter `d10`.
    pub fn log_cumulative(&self, d10: f64, a0: f64) -> f64 {
        match &self.model {
            Model::Polynomial { a } => a0 + poly(&a[1..], d10) * d10,
            Model::Tabular(t) => interp(d10, &t.d_min10, &t.c10) + a0,
        }
    }

    /// `log10` differential density at `log10` diameter `d10`.
    pub fn log_differential(&self, d10: f64, a0: f64) -> f64 {
        match &self.model {
            Model::Polynomial { .. } => self.polynomial_differential(10f64.powf(d10), a0).log10(),
            Model::Tabular(t) => interp(d10, &t.d_mean10, &t.f10) + a0,
        }
    }

    /// `log10` of the fitted presentation, for the a0 fitter.
    pub(crate) fn log_model(&self, presentation: Presentation, d10: f64, a0: f64) -> Result<f64, CraterError> {
        match presentation {
            Presentation::Cumulative => Ok(self.log_cumulative(d10, a0)),
            Presentation::Differential => Ok(self.log_differential(d10, a0)),
            other => Err(CraterError::invalid_input(format!(
                "Cannot fit in {other} presentation; use cumulative or differential."
            ))),
        }
    }

    fn polynomial_differential(&self, d: f64, a0: f64) -> f64 {
        let Model::Polynomial { a } = &self.model else {
            return f64::NAN;
        };
        let x = d.log10();
        let p = a0 + poly(&a[1..], x) * x;
        // dp/dx of Σ a_i x^i
        let dpdx = a[1..]
            .iter()
            .enumerate()
            .rev()
            .fold(0.0, |acc, (i, c)| acc * x + (i as f64 + 1.0) * c);
        -10f64.powf(p) * dpdx / d
    }

    /// Fit `a0` to an observed cumulative or differential series.
    pub fn fit(&self, series: &ObservedSeries) -> Result<A0Fit, CraterError> {
        fit_a0(self, series)
    }

    /// 400 log-spaced samples over `range` clipped to the validity range.
    pub fn curve(&self, presentation: Presentation, a0: Option<f64>, range: Option<(f64, f64)>) -> ModelCurve {
        let (lo, hi) = range.unwrap_or(self.range);
        let lo = lo.clamp(self.range.0, self.range.1);
        let hi = hi.clamp(self.range.0, self.range.1);
        let d: Vec<f64> = linspace(lo.log10(), hi.log10(), CURVE_POINTS)
            .into_iter()
            .map(|v| 10f64.powf(v))
            .collect();
        let y = d.iter().map(|&d| self.evaluate(presentation, d, a0)).collect();
        ModelCurve { presentation, d, y }
    }

    /// Isochron for `a0`, cut where it reaches 80% of the equilibrium density.
    pub fn isochron(
        &self,
        presentation: Presentation,
        a0: f64,
        equilibrium: Option<&ProductionFunction>,
    ) -> ModelCurve {
        let iso = self.curve(presentation, Some(a0), None);
        let Some(ef) = equilibrium else {
            return iso;
        };
        let e = ef.curve(presentation, None, None);
        let keep: Vec<usize> = (0..iso.d.len())
            .filter(|&i| {
                let j = e.d.partition_point(|&v| v <= iso.d[i]).saturating_sub(1);
                iso.y[i] < e.y[j] * EQUILIBRIUM_FRACTION
            })
            .collect();
        ModelCurve {
            presentation,
            d: keep.iter().map(|&i| iso.d[i]).collect(),
            y: keep.iter().map(|&i| iso.y[i]).collect(),
        }
    }
}

/// `Σ c_i x^i` by Horner's rule.
fn poly(c: &[f64], x: f64) -> f64 {
    c.iter().rev().fold(0.0, |acc, v| acc * x + v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn power_law_table() -> ProductionFunction {
        // Cumulative slope -2 on a root-2 grid: each bin holds half the craters
        // of the one below.
        let h: Vec<f64> = (0..60).map(|i| 0.5f64.powi(i)).collect();
        ProductionFunction::from_definition(&ProductionDef {
            name: "power law".to_string(),
            kind: ProductionKind::Tabular { h, index_1km: 10 },
            range: None,
            reference: None,
        })
        .unwrap()
    }

    fn neukum() -> ProductionFunction {
        ProductionFunction::load(&Definitions::builtin().unwrap(), "Moon, Neukum (1983)").unwrap()
    }

    #[test]
    fn polynomial_definition_and_range() {
        let pf = neukum();
        assert_eq!(pf.range(), (0.01, 300.0));
        assert_eq!(pf.default_a0(), -2.5339);
        assert!((pf.cumulative(1.0, None) - 10f64.powf(-2.5339)).abs() < 1e-15);
    }

    #[test]
    fn missing_name_is_config_not_found() {
        let err = ProductionFunction::load(&Definitions::builtin().unwrap(), "Venus").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConfigNotFound);
    }

    #[test]
    fn equilibrium_function_is_a_power_law() {
        let ef = ProductionFunction::load_equilibrium(
            &Definitions::builtin().unwrap(),
            "Lunar equilibrium (Trask, 1966)",
        )
        .unwrap();
        assert!((ef.cumulative(1.0, None) - 10f64.powf(-1.1)).abs() < 1e-15);
        assert!((ef.cumulative(10.0, None) - 10f64.powf(-3.1)).abs() < 1e-15);
        assert_eq!(ef.range(), DEFAULT_RANGE);
    }

    #[test]
    fn analytic_differential_matches_numerical_derivative() {
        let pf = neukum();
        for d in [0.1, 1.0, 12.0] {
            let h = d * 1e-6;
            let numeric = (pf.cumulative(d - h, None) - pf.cumulative(d + h, None)) / (2.0 * h);
            let analytic = pf.differential(d, None);
            assert!((numeric / analytic - 1.0).abs() < 1e-6, "d={d}");
        }
    }

    #[test]
    fn derived_presentations_rescale_differential() {
        let pf = neukum();
        let d = 2.0;
        let f = pf.differential(d, None);
        assert!((pf.evaluate(Presentation::RPlot, d, None) / (f * 8.0) - 1.0).abs() < 1e-12);
        let h = pf.evaluate(Presentation::Hartmann, d, None);
        assert!((h / (f * d * root2_bin_width()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn a0_shifts_log_density() {
        let pf = neukum();
        let y0 = pf.cumulative(3.0, Some(-3.0));
        let y1 = pf.cumulative(3.0, Some(-2.0));
        assert!((y1 / y0 - 10.0).abs() < 1e-9);
    }

    #[test]
    fn tabular_cumulative_is_normalised_at_one_km() {
        let pf = power_law_table();
        assert!((pf.cumulative(1.0, Some(0.0)) - 1.0).abs() < 1e-12);
        assert!((pf.cumulative(2.0, Some(0.0)) - 0.25).abs() < 1e-12);
        assert!((pf.cumulative(1.0, Some(-2.0)) - 0.01).abs() < 1e-12);
        let (lo, hi) = pf.range();
        assert!((lo - 2f64.powf(-5.0 + 0.25)).abs() < 1e-12);
        assert!((hi / 2f64.powf(24.5 + 0.25) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tabular_differential_recovers_power_law() {
        // N(>D) = D^-2 gives dN/dD = 2 D^-3 after removing the binning bias.
        let pf = power_law_table();
        for d in [0.5, 1.0, 4.0] {
            let dm = d * 2f64.powf(0.25);
            let f = pf.differential(dm, Some(0.0));
            assert!((f / (2.0 * dm.powi(-3)) - 1.0).abs() < 1e-9, "d={d}: {f}");
        }
    }

    #[test]
    fn curve_is_clipped_to_validity_range() {
        let pf = neukum();
        let c = pf.curve(Presentation::Cumulative, None, Some((1e-3, 1e4)));
        assert_eq!(c.d.len(), 400);
        assert!((c.d[0] - 0.01).abs() < 1e-12);
        assert!((c.d[399] - 300.0).abs() < 1e-9);
    }

    #[test]
    fn isochron_is_truncated_by_equilibrium() {
        let defs = Definitions::builtin().unwrap();
        let pf = neukum();
        let ef = ProductionFunction::load_equilibrium(&defs, "Lunar equilibrium (Trask, 1966)").unwrap();
        let full = pf.isochron(Presentation::Cumulative, -2.0, None);
        let cut = pf.isochron(Presentation::Cumulative, -2.0, Some(&ef));
        assert_eq!(full.d.len(), 400);
        assert!(!cut.d.is_empty() && cut.d.len() < full.d.len());
        assert!(cut.d.iter().all(|&d| d > 0.3));
    }

    #[test]
    fn rejects_non_fit_presentations() {
        assert!(neukum().log_model(Presentation::RPlot, 0.0, 0.0).is_err());
    }
}
