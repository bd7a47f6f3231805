//! Runtime settings.
//!
//! Defaults live in code; each can be overridden from the environment (an
//! optional `.env` file is read first):
//!
//! - `CRATER_THREADS`: Monte-Carlo worker count (default: cores − 1, at least 1)
//! - `CRATER_TRIALS`: Monte-Carlo trials per bin
//! - `CRATER_SEED`: base RNG seed
//! - `CRATER_PDF_SAMPLES`: age posterior grid size
//! - `CRATER_FUNCTIONS`: path of an external definitions file

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CraterError;

pub const DEFAULT_TRIALS: usize = 100;
pub const DEFAULT_SEED: u64 = 0x5EED_C4A7_E85u64;
pub const DEFAULT_PDF_SAMPLES: usize = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub threads: usize,
    pub trials: usize,
    pub seed: u64,
    pub pdf_samples: usize,
    pub functions: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            trials: DEFAULT_TRIALS,
            seed: DEFAULT_SEED,
            pdf_samples: DEFAULT_PDF_SAMPLES,
            functions: None,
        }
    }
}

/// One worker fewer than the available cores, but at least one.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

impl Settings {
    /// Defaults overridden by `.env` and process environment variables.
    pub fn from_env() -> Result<Self, CraterError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CraterError> {
        let mut s = Self::default();
        if let Some(v) = parse_var::<usize>(&lookup, "CRATER_THREADS")? {
            s.threads = v.max(1);
        }
        if let Some(v) = parse_var::<usize>(&lookup, "CRATER_TRIALS")? {
            s.trials = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "CRATER_SEED")? {
            s.seed = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "CRATER_PDF_SAMPLES")? {
            if v < 2 {
                return Err(CraterError::invalid_input("CRATER_PDF_SAMPLES must be at least 2."));
            }
            s.pdf_samples = v;
        }
        if let Some(v) = lookup("CRATER_FUNCTIONS").filter(|v| !v.trim().is_empty()) {
            s.functions = Some(PathBuf::from(v.trim()));
        }
        Ok(s)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, CraterError> {
    match lookup(key) {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CraterError::invalid_input(format!("Invalid value for {key}: {v}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s.trials, DEFAULT_TRIALS);
        assert_eq!(s.pdf_samples, 5000);
        assert!(s.threads >= 1);
        assert!(s.functions.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let s = Settings::from_lookup(lookup(&[
            ("CRATER_THREADS", "0"),
            ("CRATER_TRIALS", "250"),
            ("CRATER_SEED", "42"),
            ("CRATER_FUNCTIONS", "/tmp/functions.json"),
        ]))
        .unwrap();
        assert_eq!(s.threads, 1);
        assert_eq!(s.trials, 250);
        assert_eq!(s.seed, 42);
        assert_eq!(s.functions, Some(PathBuf::from("/tmp/functions.json")));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(Settings::from_lookup(lookup(&[("CRATER_TRIALS", "many")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("CRATER_PDF_SAMPLES", "1")])).is_err());
    }
}
