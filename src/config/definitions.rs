//! Production, equilibrium, chronology and epoch definitions.
//!
//! Definitions are a JSON document with one array per kind; every entry is
//! looked up by its `name`. A built-in document is compiled into the crate and
//! can be replaced by an external file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CraterError;

const BUILTIN: &str = include_str!("../../config/functions.json");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    pub production: Vec<ProductionDef>,
    #[serde(default)]
    pub equilibrium: Vec<ProductionDef>,
    #[serde(default)]
    pub chronology: Vec<ChronologyDef>,
    #[serde(default)]
    pub epochs: Vec<EpochDef>,
}

/// Production or equilibrium function definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionDef {
    pub name: String,
    #[serde(flatten)]
    pub kind: ProductionKind,
    /// Validity range (km).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductionKind {
    /// `log10 N(D) = Σ a_i (log10 D)^i`.
    Polynomial { coefficients: Vec<f64> },
    /// Incremental counts on a root-2 grid; bin `index_1km` starts at 1 km.
    #[serde(rename = "tabular incremental root-2", alias = "tabular")]
    Tabular {
        #[serde(rename = "H")]
        h: Vec<f64>,
        index_1km: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChronologyDef {
    pub name: String,
    #[serde(flatten)]
    pub kind: ChronologyKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChronologyKind {
    /// `N1 = p0·(exp(p1·t) − 1) + p3·t`.
    Standard { coefficients: [f64; 4] },
    /// Assignment program evaluated by the expression evaluator.
    Formula { n1_code: String },
}

/// Epoch system: names plus either boundary ages or boundary densities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochDef {
    pub name: String,
    pub epoch: Vec<String>,
    /// Epoch start ages (Ga), beginning with 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Vec<f64>>,
    /// Reference diameters (km) of the boundary densities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_diameter: Option<Vec<f64>>,
    /// Cumulative densities at the boundaries, per 10^6 km².
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Definitions {
    /// The compiled-in definitions.
    pub fn builtin() -> Result<Self, CraterError> {
        Self::from_json(BUILTIN)
    }

    pub fn from_json(text: &str) -> Result<Self, CraterError> {
        serde_json::from_str(text)
            .map_err(|e| CraterError::invalid_definition(format!("Invalid function definitions: {e}")))
    }

    /// Read definitions from a JSON file.
    pub fn read(path: &Path) -> Result<Self, CraterError> {
        let file = File::open(path).map_err(|e| {
            CraterError::config_not_found("Function definitions", &format!("{} ({e})", path.display()))
        })?;
        let defs: Definitions = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            CraterError::invalid_definition(format!("Invalid function definitions '{}': {e}", path.display()))
        })?;
        debug!(
            path = %path.display(),
            production = defs.production.len(),
            chronology = defs.chronology.len(),
            "loaded function definitions"
        );
        Ok(defs)
    }

    /// Definitions from `path` when given, else the built-in document.
    pub fn load(path: Option<&Path>) -> Result<Self, CraterError> {
        match path {
            Some(p) => Self::read(p),
            None => Self::builtin(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn builtin_definitions_parse() {
        let defs = Definitions::builtin().unwrap();
        assert_eq!(defs.production.len(), 3);
        assert_eq!(defs.chronology.len(), 2);
        let neukum = defs.production.iter().find(|d| d.name == "Moon, Neukum (1983)").unwrap();
        assert_eq!(neukum.range, Some([0.01, 300.0]));
        match &neukum.kind {
            ProductionKind::Polynomial { coefficients } => assert_eq!(coefficients.len(), 12),
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(defs.epochs[0].epoch.len(), 8);
    }

    #[test]
    fn tabular_and_formula_entries_parse() {
        let json = r#"{
            "production": [{"name": "tab", "type": "tabular incremental root-2", "H": [4, 2, 1], "index_1km": 1}],
            "chronology": [{"name": "user", "type": "formula", "n1_code": "n1 = t"}]
        }"#;
        let defs = Definitions::from_json(json).unwrap();
        assert!(matches!(defs.production[0].kind, ProductionKind::Tabular { index_1km: 1, .. }));
        assert!(matches!(defs.chronology[0].kind, ChronologyKind::Formula { .. }));
        assert!(defs.epochs.is_empty());
    }

    #[test]
    fn malformed_document_is_a_definition_error() {
        let err = Definitions::from_json("{\"production\": 3}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDefinition);
    }

    #[test]
    fn missing_file_is_config_not_found() {
        let err = Definitions::read(Path::new("/nonexistent/functions.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigNotFound);
    }
}
