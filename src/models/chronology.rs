//! Chronology functions: cumulative 1 km crater density `N1(t)` against age.

use serde::Serialize;

use crate::config::{ChronologyDef, ChronologyKind, Definitions};
use crate::error::CraterError;
use crate::math::{interp, linspace};
use crate::models::expr::Formula;

/// Upper end of the age axis (Ga).
pub const MAX_AGE: f64 = 5.0;
const TABLE_STEPS: usize = 1000;
const CURVE_STEPS: usize = 1000;
/// Youngest age of the logarithmic chronology curve (Ga).
const LOG_CURVE_START: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
enum N1Form {
    /// `N1 = p0·(exp(p1·t) − 1) + p3·t`
    Standard([f64; 4]),
    Formula(Formula),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChronologyFunction {
    name: String,
    form: N1Form,
    /// Lookup table for inversion, `ts` ascending.
    ts: Vec<f64>,
    n1s: Vec<f64>,
}

/// Sampled chronology curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChronologyCurve {
    pub t: Vec<f64>,
    pub y: Vec<f64>,
}

impl ChronologyFunction {
    /// Look up a named chronology system.
    pub fn load(defs: &Definitions, name: &str) -> Result<Self, CraterError> {
        let def = defs
            .chronology
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| CraterError::config_not_found("Chronology function", name))?;
        Self::from_definition(def)
    }

    pub fn from_definition(def: &ChronologyDef) -> Result<Self, CraterError> {
        let form = match &def.kind {
            ChronologyKind::Standard { coefficients } => N1Form::Standard(*coefficients),
            ChronologyKind::Formula { n1_code } => N1Form::Formula(Formula::parse(n1_code)?),
        };
        let mut cf = Self {
            name: def.name.clone(),
            form,
            ts: linspace(0.0, MAX_AGE, TABLE_STEPS),
            n1s: Vec::new(),
        };
        cf.n1s = cf.ts.iter().map(|&t| cf.n1(t)).collect();
        if cf.n1s.iter().any(|v| !v.is_finite()) {
            return Err(CraterError::invalid_definition(format!(
                "Chronology function {} is not finite over 0-{MAX_AGE} Ga",
                def.name
            )));
        }
        if cf.n1s.windows(2).any(|w| w[1] <= w[0]) {
            return Err(CraterError::invalid_definition(format!(
                "Chronology function {} must increase strictly over 0-{MAX_AGE} Ga",
                def.name
            )));
        }
        Ok(cf)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cumulative density of craters ≥ 1 km (km⁻²) accumulated over `t` Ga.
    pub fn n1(&self, t: f64) -> f64 {
        match &self.form {
            N1Form::Standard(p) => p[0] * ((p[1] * t).exp() - 1.0) + p[3] * t,
            N1Form::Formula(f) => f.eval(t),
        }
    }

    pub fn a0(&self, t: f64) -> f64 {
        self.n1(t).log10()
    }

    /// Impact rate `dN1/dt` (km⁻² Ga⁻¹).
    pub fn phi(&self, t: f64) -> f64 {
        match &self.form {
            N1Form::Standard(p) => p[1] * p[0] * (p[1] * t).exp() + p[3],
            N1Form::Formula(_) => {
                let dt = (t * 1e-4).max(1e-8);
                (self.n1(t + dt) - self.n1(t - dt)) / (2.0 * dt)
            }
        }
    }

    /// Age (Ga) at which the cumulative 1 km density reaches `10^a0`.
    ///
    /// Values beyond the table are clamped to 0 or 5 Ga.
    pub fn t(&self, a0: f64) -> f64 {
        self.t_of_n1(10f64.powf(a0))
    }

    pub fn t_of_n1(&self, n1: f64) -> f64 {
        interp(n1, &self.n1s, &self.ts)
    }

    /// `N1` (or `phi`) sampled over 0-5 Ga, linearly or log-spaced from 1e-9 Ga.
    pub fn curve(&self, phi: bool, linear: bool) -> ChronologyCurve {
        let t = if linear {
            linspace(0.0, MAX_AGE, CURVE_STEPS)
        } else {
            linspace(LOG_CURVE_START.log10(), MAX_AGE.log10(), CURVE_STEPS)
                .into_iter()
                .map(|v| 10f64.powf(v))
                .collect()
        };
        let y = t
            .iter()
            .map(|&t| if phi { self.phi(t) } else { self.n1(t) })
            .collect();
        ChronologyCurve { t, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neukum_1983() -> ChronologyFunction {
        ChronologyFunction::load(&Definitions::builtin().unwrap(), "Moon, Neukum (1983)").unwrap()
    }

    fn user_defined() -> ChronologyFunction {
        ChronologyFunction::from_definition(&ChronologyDef {
            name: "user_function".to_string(),
            kind: ChronologyKind::Formula {
                n1_code: "a=5.44E-14 * (exp(6.93*t)-1)\nb=8.38E-4 * t\nn1=a+b".to_string(),
            },
        })
        .unwrap()
    }

    #[test]
    fn standard_form_values() {
        let cf = neukum_1983();
        assert_eq!(cf.n1(0.0), 0.0);
        let n1 = 5.44e-14 * ((6.93f64 * 3.0).exp() - 1.0) + 8.38e-4 * 3.0;
        assert_eq!(cf.n1(3.0), n1);
        assert_eq!(cf.a0(3.0), n1.log10());
        assert!((cf.phi(0.0) - 8.38e-4).abs() < 1e-7);
        assert!((cf.t_of_n1(n1) - 3.0).abs() < 1e-4);
        assert!((cf.t(n1.log10()) - 3.0).abs() < 1e-4);
    }

    #[test]
    fn user_formula_matches_standard_form() {
        let cf = neukum_1983();
        let user = user_defined();
        let n1 = 5.44e-14 * ((6.93f64 * 3.0).exp() - 1.0) + 8.38e-4 * 3.0;
        assert!((user.n1(3.0) - n1).abs() < 1e-18);
        for linear in [false, true] {
            let a = cf.curve(false, linear);
            let b = user.curve(false, linear);
            for (x, y) in a.y.iter().zip(&b.y) {
                assert!((x - y).abs() <= 1e-12 * x.abs().max(1e-12));
            }
            let a = cf.curve(true, linear);
            let b = user.curve(true, linear);
            for (x, y) in a.y.iter().zip(&b.y) {
                assert!((x - y).abs() <= 1e-5 * x.abs());
            }
        }
    }

    #[test]
    fn non_monotone_formula_is_rejected() {
        let def = |code: &str| ChronologyDef {
            name: "bumpy".to_string(),
            kind: ChronologyKind::Formula { n1_code: code.to_string() },
        };
        let err = ChronologyFunction::from_definition(&def("n1 = 1e-3 * t + 2e-4 * sin(10 * t)")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidDefinition);
        assert!(ChronologyFunction::from_definition(&def("n1 = 1e-3")).is_err());
        assert!(ChronologyFunction::from_definition(&def("n1 = 1e-3 * t")).is_ok());
    }

    #[test]
    fn inversion_clamps_outside_table() {
        let cf = neukum_1983();
        assert_eq!(cf.t_of_n1(-1.0), 0.0);
        assert!(cf.t(-10.0) < 1e-6);
        assert_eq!(cf.t(10.0), MAX_AGE);
    }

    #[test]
    fn log_curve_spans_full_age_range() {
        let c = neukum_1983().curve(false, false);
        assert_eq!(c.t.len(), 1000);
        assert!((c.t[0] - 1e-9).abs() < 1e-20);
        assert!((c.t[999] - 5.0).abs() < 1e-9);
    }
}
