//! Quadrature-based norms over sampling grids.
//!
//! All integrals are approximated by weighted sums over an existing grid with
//! the weights of the grid's node kind (Clenshaw-Curtis for Chebyshev nodes,
//! trapezoidal for uniform nodes), so no function is sampled again.

use nalgebra::DVector;

use crate::grid::TensorGrid;

/// Approximates the integral of the function given by its values in the grid
/// points.
pub fn integrate(weights: &DVector<f64>, values: &DVector<f64>) -> f64 {
    weights.dot(values)
}

/// Approximates the L2 norm `sqrt(int r^2)` of the function given by its
/// values in the grid points.
pub fn l2_norm(weights: &DVector<f64>, values: &DVector<f64>) -> f64 {
    weights
        .iter()
        .zip(values.iter())
        .map(|(w, r)| w * r * r)
        .sum::<f64>()
        .max(0.0)
        .sqrt()
}

/// Approximates the L2 norm of the difference of two functions given by their
/// values in the grid points.
pub fn l2_distance(weights: &DVector<f64>, a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    l2_norm(weights, &(a - b))
}

/// Approximates the L2 norm of a function given by a closure in canonical
/// coordinates over the grid.
pub fn l2_norm_on<G>(grid: &TensorGrid, g: G) -> f64
where
    G: Fn(&DVector<f64>) -> f64,
{
    let values = DVector::from_iterator(grid.len(), grid.canonical().iter().map(g));
    l2_norm(grid.weights(), &values)
}
