//! Weighted linear least squares.
//!
//! Solves `min Σ w_i² (y_i − X_i β)²` by scaling each row with its weight and
//! taking the SVD pseudo-inverse. The a0 fitter's Gauss-Newton steps are
//! tall single-column problems, for which SVD is the robust choice.

use nalgebra::{DMatrix, DVector};

/// Singular-value cut-offs, tried from strictest to loosest.
const SVD_TOLERANCES: [f64; 3] = [1e-12, 1e-10, 1e-8];

/// Solve the weighted problem; `None` when it is too ill-conditioned.
///
/// `weights` are `1/σ_i`, one per row of `x`.
pub fn solve_weighted_least_squares(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    weights: &[f64],
) -> Option<DVector<f64>> {
    if weights.len() != x.nrows() || y.len() != x.nrows() {
        return None;
    }
    let mut xw = x.clone();
    let mut yw = y.clone();
    for (i, &w) in weights.iter().enumerate() {
        xw.row_mut(i).scale_mut(w);
        yw[i] *= w;
    }
    let svd = xw.svd(true, true);
    SVD_TOLERANCES
        .iter()
        .filter_map(|&tol| svd.solve(&yw, tol).ok())
        .find(|beta| beta.iter().all(|v| v.is_finite()))
}
