//! Read/write randomness-analysis JSON files.
//!
//! The file keeps the raw Monte-Carlo trial values per measure and bin, so a
//! later session can recompute statistics without re-running the trials.
//! `n_sigma` is stored for convenience and ignored on read.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CraterError, ErrorKind};
use crate::spatial::Measure;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomnessState {
    pub tool: String,
    /// Crater count the trials were run for.
    pub source: String,
    pub generated: DateTime<Utc>,
    pub measures: BTreeMap<Measure, MeasureState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureState {
    pub n_trials: usize,
    pub bins: Vec<BinRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinRecord {
    /// `log2(d_min)` to three significant figures.
    pub bin: String,
    pub d_min: f64,
    /// Absent when the spread of the trials is zero.
    pub n_sigma: Option<f64>,
    pub trials: Vec<f64>,
}

impl RandomnessState {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME").to_string(),
            source: source.into(),
            generated: Utc::now(),
            measures: BTreeMap::new(),
        }
    }
}

/// Write a randomness-analysis JSON file.
pub fn write_randomness_json(path: &Path, state: &RandomnessState) -> Result<(), CraterError> {
    let file = File::create(path).map_err(|e| {
        CraterError::new(
            ErrorKind::Io,
            format!("Failed to create randomness JSON '{}': {e}", path.display()),
        )
    })?;
    serde_json::to_writer_pretty(file, state)
        .map_err(|e| CraterError::new(ErrorKind::Io, format!("Failed to write randomness JSON: {e}")))?;
    Ok(())
}

/// Read a randomness-analysis JSON file.
pub fn read_randomness_json(path: &Path) -> Result<RandomnessState, CraterError> {
    let file = File::open(path).map_err(|e| {
        CraterError::new(
            ErrorKind::Io,
            format!("Failed to open randomness JSON '{}': {e}", path.display()),
        )
    })?;
    let state: RandomnessState = serde_json::from_reader(file)
        .map_err(|e| CraterError::new(ErrorKind::Io, format!("Invalid randomness JSON: {e}")))?;
    Ok(state)
}
