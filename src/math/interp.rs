//! Array helpers shared by the numeric engines.

/// Piecewise-linear interpolation of `x` against increasing knots `xp`.
///
/// Values outside the knot range are clamped to the end values. Returns NaN when
/// there are no knots.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 || x.is_nan() {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    // First knot strictly greater than x.
    let hi = xp[..n].partition_point(|&v| v <= x);
    let lo = hi - 1;
    let dx = xp[hi] - xp[lo];
    if dx <= 0.0 {
        return fp[lo];
    }
    let u = (x - xp[lo]) / dx;
    fp[lo] + u * (fp[hi] - fp[lo])
}

/// `n` evenly spaced values from `a` to `b` inclusive.
pub fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![a],
        _ => {
            let step = (b - a) / (n as f64 - 1.0);
            (0..n).map(|i| a + step * i as f64).collect()
        }
    }
}

/// Right-to-left running total: `out[i] = Σ v[j] for j ≥ i`.
pub fn reverse_cumsum(v: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; v.len()];
    let mut acc = 0.0;
    for i in (0..v.len()).rev() {
        acc += v[i];
        out[i] = acc;
    }
    out
}

/// `(min, max)` of a sequence; `(NaN, NaN)` when empty.
pub fn min_max(v: &[f64]) -> (f64, f64) {
    if v.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    v.iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)))
}

/// Composite Simpson integration of samples `y` at abscissae `x`.
///
/// With an even number of samples the final interval is closed with the
/// trapezoid rule.
pub fn simpson(y: &[f64], x: &[f64]) -> f64 {
    let n = y.len().min(x.len());
    if n < 2 {
        return 0.0;
    }
    let last = if n % 2 == 1 { n - 1 } else { n - 2 };
    let mut total = 0.0;
    let mut i = 0;
    while i + 2 <= last {
        let h0 = x[i + 1] - x[i];
        let h1 = x[i + 2] - x[i + 1];
        let hs = h0 + h1;
        // Non-uniform Simpson panel.
        total += hs / 6.0
            * (y[i] * (2.0 - h1 / h0) + y[i + 1] * hs * hs / (h0 * h1) + y[i + 2] * (2.0 - h0 / h1));
        i += 2;
    }
    if last < n - 1 {
        total += 0.5 * (x[n - 1] - x[n - 2]) * (y[n - 1] + y[n - 2]);
    }
    total
}

/// Mean and population standard deviation.
pub fn mean_sd(v: &[f64]) -> (f64, f64) {
    if v.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = v.len() as f64;
    let mean = v.iter().sum::<f64>() / n;
    let var = v.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}
