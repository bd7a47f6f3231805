//! Bin boundary generation and the binning-bias correction.

use crate::domain::Binning;
use crate::math::min_max;

/// Per-decade multipliers of the pseudo-log binning.
const PSEUDO_LOG_STEPS: [f64; 18] = [
    1.0, 1.1, 1.2, 1.3, 1.4, 1.5, 1.7, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 5.0, 6.0, 7.0, 8.0, 9.0,
];

/// Small compared with the narrowest bin factor (in log10 units).
const RANGE_EPS: f64 = 0.001;

/// Generate bin boundaries covering the range of `d`.
///
/// - `offset` shifts geometric bins by a fraction of a bin (0.5 = half bin).
/// - `expand` adds one boundary beyond the data (for overlays); without it the
///   outermost boundaries are trimmed to lie within the range.
///
/// For [`Binning::None`] the diameters themselves are returned. An empty `d`
/// yields an empty boundary list (the range is NaN).
pub fn generate_bins(binning: Binning, d: &[f64], offset: f64, expand: bool) -> Vec<f64> {
    if binning == Binning::None {
        return d.to_vec();
    }
    let (lo, hi) = min_max(d);
    let mut r10 = [lo.log10(), hi.log10()];
    if !(r10[0].is_finite() && r10[1].is_finite()) {
        return Vec::new();
    }
    if expand {
        r10[1] += RANGE_EPS;
    } else {
        r10[0] += RANGE_EPS;
        r10[1] -= RANGE_EPS;
    }

    let bins: Vec<f64> = match binning.bins_per_decade() {
        None => {
            // If above .9 of a decade make sure the next decade is included.
            let first = r10[0].floor() as i32;
            let last = (r10[1] + 0.1).ceil() as i32;
            (first..last)
                .flat_map(|e| {
                    let decade = 10f64.powi(e);
                    PSEUDO_LOG_STEPS.iter().map(move |a| decade * a)
                })
                .collect()
        }
        Some(bpd) => {
            let b0 = (r10[0] * bpd + offset).floor() - offset;
            let b1 = (r10[1] * bpd + offset).ceil() - offset;
            let count = (b1 - b0).round() as i64 + 1;
            (0..count.max(0))
                .map(|i| 10f64.powf((b0 + i as f64) / bpd))
                .collect()
        }
    };

    let q0 = bins.partition_point(|&b| b < 10f64.powf(r10[0]));
    let q1 = bins.partition_point(|&b| b < 10f64.powf(r10[1]));
    let start = q0.saturating_sub(1);
    let end = (q1 + 1).min(bins.len());
    if start >= end {
        return Vec::new();
    }
    bins[start..end].to_vec()
}

/// Ratio between the binned and true differential density for a power law.
///
/// `beta` is the ratio between adjacent bin boundaries (e.g. √2) and `k` the
/// log-log slope of the cumulative distribution, including its sign. The
/// factor tends to 1 as `k → 0`.
pub fn bin_bias_correction(beta: f64, k: f64) -> f64 {
    if k.abs() < 1e-5 {
        return 1.0;
    }
    let g = beta.sqrt() - 1.0 / beta.sqrt();
    (beta.powf(k / 2.0) - beta.powf(-k / 2.0)) / (g * k)
}
