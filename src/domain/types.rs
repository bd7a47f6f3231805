//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during binning, fitting and age estimation
//! - handed to a presentation layer as-is
//! - persisted and reloaded without recomputation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CraterError, ErrorKind};

/// How a crater population (or a production function) is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presentation {
    Cumulative,
    Incremental,
    Differential,
    #[serde(rename = "Hartmann")]
    Hartmann,
    #[serde(rename = "R-plot")]
    RPlot,
}

impl Presentation {
    pub fn name(self) -> &'static str {
        match self {
            Presentation::Cumulative => "cumulative",
            Presentation::Incremental => "incremental",
            Presentation::Differential => "differential",
            Presentation::Hartmann => "Hartmann",
            Presentation::RPlot => "R-plot",
        }
    }
}

impl fmt::Display for Presentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Presentation {
    type Err = CraterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cumulative" => Ok(Presentation::Cumulative),
            "incremental" => Ok(Presentation::Incremental),
            "differential" => Ok(Presentation::Differential),
            "Hartmann" | "hartmann" => Ok(Presentation::Hartmann),
            "R-plot" | "r-plot" | "relative" => Ok(Presentation::RPlot),
            other => Err(CraterError::invalid_input(format!("Unknown presentation: {other}"))),
        }
    }
}

/// Diameter binning policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Binning {
    #[serde(rename = "pseudo-log")]
    PseudoLog,
    #[serde(rename = "20/decade")]
    TwentyPerDecade,
    #[serde(rename = "10/decade")]
    TenPerDecade,
    #[serde(rename = "x2")]
    X2,
    #[serde(rename = "root-2")]
    Root2,
    #[serde(rename = "4th root-2")]
    FourthRoot2,
    #[serde(rename = "none")]
    None,
}

impl Binning {
    pub const ALL: [Binning; 7] = [
        Binning::PseudoLog,
        Binning::TwentyPerDecade,
        Binning::TenPerDecade,
        Binning::X2,
        Binning::Root2,
        Binning::FourthRoot2,
        Binning::None,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Binning::PseudoLog => "pseudo-log",
            Binning::TwentyPerDecade => "20/decade",
            Binning::TenPerDecade => "10/decade",
            Binning::X2 => "x2",
            Binning::Root2 => "root-2",
            Binning::FourthRoot2 => "4th root-2",
            Binning::None => "none",
        }
    }

    /// Bins per decade for the geometric policies; `None` for pseudo-log and none.
    pub fn bins_per_decade(self) -> Option<f64> {
        let log2 = std::f64::consts::LOG10_2;
        match self {
            Binning::X2 => Some(1.0 / log2),
            Binning::Root2 => Some(2.0 / log2),
            Binning::FourthRoot2 => Some(4.0 / log2),
            Binning::TenPerDecade => Some(10.0),
            Binning::TwentyPerDecade => Some(20.0),
            Binning::PseudoLog | Binning::None => None,
        }
    }
}

impl fmt::Display for Binning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Binning {
    type Err = CraterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Binning::ALL
            .iter()
            .copied()
            .find(|b| b.name() == s)
            .ok_or_else(|| CraterError::new(ErrorKind::InvalidBinningPolicy, format!("Invalid binning: {s}")))
    }
}

/// Per-bin statistics of a crater count.
///
/// `d_min` is strictly increasing; cumulative columns are right-to-left running
/// totals of their incremental counterparts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Binned {
    pub d_min: Vec<f64>,
    pub d_max: Vec<f64>,
    pub d_mean: Vec<f64>,
    pub bin_width: Vec<f64>,
    /// Fraction-weighted count.
    pub n: Vec<f64>,
    /// Unweighted count.
    pub n_event: Vec<f64>,
    pub ncum: Vec<f64>,
    pub ncum_event: Vec<f64>,
}

impl Binned {
    pub fn len(&self) -> usize {
        self.d_min.len()
    }

    pub fn is_empty(&self) -> bool {
        self.d_min.is_empty()
    }
}

/// Resurfacing correction mode for cumulative presentations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resurfacing {
    /// Apply the correction; report only points inside the requested range.
    ShowRange,
    /// Apply the correction; report all corrected points down to the first bin.
    ShowAll,
}

/// One end of a diameter range: an absolute diameter (km) or a populated-bin index.
///
/// `b<k>` with `k ≥ 0` is the lower boundary of the k-th populated bin counted
/// from the small end; `b-<k>` is the upper boundary of the k-th populated bin
/// counted from the large end (`b-1` is the top of the largest bin).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RangeBound {
    Diameter(f64),
    Bin(i64),
}

impl FromStr for RangeBound {
    type Err = CraterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || CraterError::invalid_input(format!("Invalid diameter range bound: {s}"));
        if let Some(rest) = s.strip_prefix('b') {
            let k: i64 = rest.parse().map_err(|_| bad())?;
            return Ok(RangeBound::Bin(k));
        }
        let d: f64 = match s {
            "inf" | "Inf" | "infinity" => f64::INFINITY,
            _ => s.parse().map_err(|_| bad())?,
        };
        if d.is_nan() || d < 0.0 {
            return Err(bad());
        }
        Ok(RangeBound::Diameter(d))
    }
}

/// Plottable series derived from a crater count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotData {
    pub presentation: Presentation,
    pub d: Vec<f64>,
    pub y: Vec<f64>,
    pub err: Vec<f64>,
    /// Fraction-weighted crater count in the reported bins.
    pub n: f64,
    /// Unweighted crater count in the reported bins.
    pub n_event: f64,
    /// Diameter range actually covered, snapped to bin boundaries.
    pub bin_range: (f64, f64),
}

/// Observed points handed to the production-function fitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedSeries {
    pub presentation: Presentation,
    pub d: Vec<f64>,
    pub y: Vec<f64>,
    pub err: Vec<f64>,
}

impl From<&PlotData> for ObservedSeries {
    fn from(p: &PlotData) -> Self {
        Self {
            presentation: p.presentation,
            d: p.d.clone(),
            y: p.y.clone(),
            err: p.err.clone(),
        }
    }
}

/// Fitted offset with its single-point ±1σ bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct A0Fit {
    pub a0: f64,
    pub lower: f64,
    pub upper: f64,
}
