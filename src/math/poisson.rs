//! Poisson and normal probability helpers.

/// Poisson probability mass `P(k; λ)`, evaluated in log space.
///
/// The result may underflow to zero when `λ` is far from `k`; callers that
/// normalise over many `λ` must handle an all-zero sum.
pub fn poisson_pmf(k: u64, lambda: f64) -> f64 {
    if !(lambda.is_finite()) || lambda < 0.0 {
        return 0.0;
    }
    if lambda == 0.0 {
        return if k == 0 { 1.0 } else { 0.0 };
    }
    let kf = k as f64;
    (kf * lambda.ln() - lambda - libm::lgamma(kf + 1.0)).exp()
}

/// Normal density (or cumulative distribution) at `x`.
pub fn normal(mean: f64, sd: f64, x: f64, cumulative: bool) -> f64 {
    if cumulative {
        0.5 * (1.0 + libm::erf((x - mean) / (sd * std::f64::consts::SQRT_2)))
    } else {
        let z = (x - mean) / sd;
        (-0.5 * z * z).exp() / (sd * (2.0 * std::f64::consts::PI).sqrt())
    }
}

/// Ordered cumulative fractions of the Gaussian ±1σ … ±nσ points around the median.
///
/// For `n = 1` this is `[0.1587, 0.5, 0.8413]`.
pub fn gaussian_percentiles(n: usize) -> Vec<f64> {
    let mut g = vec![0.5];
    for i in 1..=n {
        let f = (1.0 - libm::erf(i as f64 / std::f64::consts::SQRT_2)) / 2.0;
        g.insert(0, f);
        g.push(1.0 - f);
    }
    g
}
