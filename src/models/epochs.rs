//! Named epoch systems: geological periods delimited by absolute ages.

use serde::Serialize;
use tracing::debug;

use crate::config::{Definitions, EpochDef};
use crate::domain::{ObservedSeries, Presentation};
use crate::error::CraterError;
use crate::models::{ChronologyFunction, ProductionFunction};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochSystem {
    pub name: String,
    /// Epoch names, youngest first.
    pub epochs: Vec<String>,
    /// Start age (Ga) of each epoch; begins with 0.
    pub time: Vec<f64>,
    pub reference: Option<String>,
}

impl EpochSystem {
    /// Look up a named epoch system; boundary densities are converted to ages
    /// with `pf` and `cf`.
    pub fn load(
        defs: &Definitions,
        name: &str,
        pf: &ProductionFunction,
        cf: &ChronologyFunction,
    ) -> Result<Self, CraterError> {
        let def = defs
            .epochs
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| CraterError::config_not_found("Epoch system", name))?;
        Self::from_definition(def, pf, cf)
    }

    pub fn from_definition(
        def: &EpochDef,
        pf: &ProductionFunction,
        cf: &ChronologyFunction,
    ) -> Result<Self, CraterError> {
        let time = match (&def.time, &def.ref_diameter, &def.density) {
            (Some(time), _, _) => time.clone(),
            (None, Some(ref_d), Some(density)) => {
                if ref_d.len() != density.len() {
                    return Err(CraterError::invalid_definition(format!(
                        "Epoch system {}: ref_diameter and density differ in length.",
                        def.name
                    )));
                }
                let mut time = vec![0.0];
                for (&d, &n) in ref_d.iter().zip(density) {
                    let point = ObservedSeries {
                        presentation: Presentation::Cumulative,
                        d: vec![d],
                        y: vec![n / 1e6],
                        err: vec![0.0],
                    };
                    let a0 = pf.fit(&point)?.a0;
                    time.push(cf.t(a0));
                }
                debug!(system = %def.name, ?time, "derived epoch boundaries");
                time
            }
            _ => {
                return Err(CraterError::invalid_definition(format!(
                    "Epoch system {} needs either time or ref_diameter/density.",
                    def.name
                )));
            }
        };
        if time.len() != def.epoch.len() {
            return Err(CraterError::invalid_definition(format!(
                "Epoch system {} has {} epochs but {} boundaries.",
                def.name,
                def.epoch.len(),
                time.len()
            )));
        }
        Ok(Self {
            name: def.name.clone(),
            epochs: def.epoch.clone(),
            time,
            reference: def.reference.clone(),
        })
    }

    /// Epoch containing age `t` (Ga); the oldest epoch is open-ended.
    pub fn epoch_at(&self, t: f64) -> Option<&str> {
        if !(t >= 0.0) {
            return None;
        }
        let i = self.time.partition_point(|&b| b <= t).checked_sub(1)?;
        self.epochs.get(i).map(String::as_str)
    }
}
