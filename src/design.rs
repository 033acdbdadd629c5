//! Design (generalized Vandermonde) matrices of tensor-product bases.

use log::trace;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::{
    basis::BasisKind,
    error::ApproximationError,
    support::{MultiIndex, SupportSet},
};

/// Matrix of basis function values in the sample points.
///
/// Entry `(i, j)` is the value of the tensor-product basis function given by
/// the `j`-th multi-index of the support set in the `i`-th sample point, i.e.,
/// `prod_k phi(e_j[k], x_i[k])`.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    matrix: DMatrix<f64>,
    basis: BasisKind,
}

impl DesignMatrix {
    /// Builds the design matrix for points given in canonical coordinates.
    ///
    /// Fails with [`ApproximationError::InsufficientSamples`] if there are
    /// fewer points than basis terms.
    pub fn new(
        points: &[DVector<f64>],
        support: &SupportSet,
        basis: BasisKind,
        parallel: bool,
    ) -> Result<Self, ApproximationError> {
        let samples = points.len();
        let terms = support.len();

        if samples < terms {
            return Err(ApproximationError::InsufficientSamples { samples, terms });
        }

        if let Some(point) = points.iter().find(|x| x.nrows() != support.dim()) {
            return Err(ApproximationError::DimensionMismatch {
                expected: support.dim(),
                actual: point.nrows(),
            });
        }

        let degree = support.degree();
        let indices = support.indices();

        let rows: Vec<Vec<f64>> = if parallel {
            points
                .par_iter()
                .map(|x| row(x, indices, basis, degree))
                .collect()
        } else {
            points
                .iter()
                .map(|x| row(x, indices, basis, degree))
                .collect()
        };

        trace!("design matrix {} x {} ({:?})", samples, terms, basis);

        Ok(Self {
            matrix: DMatrix::from_fn(samples, terms, |i, j| rows[i][j]),
            basis,
        })
    }

    /// Gets the underlying matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Gets the basis family.
    pub fn basis(&self) -> BasisKind {
        self.basis
    }

    /// Gets the number of samples (rows).
    pub fn samples(&self) -> usize {
        self.matrix.nrows()
    }

    /// Gets the number of basis terms (columns).
    pub fn terms(&self) -> usize {
        self.matrix.ncols()
    }

    /// Unwraps the underlying matrix.
    pub fn into_inner(self) -> DMatrix<f64> {
        self.matrix
    }
}

/// Evaluates all basis functions of the support set in a single point.
///
/// The one-dimensional values are computed once per axis with the recurrence
/// and the tensor-product values are their products.
pub fn row(x: &DVector<f64>, indices: &[MultiIndex], basis: BasisKind, degree: u32) -> Vec<f64> {
    let tables: Vec<Vec<f64>> = x.iter().map(|xk| basis.evaluate(*xk, degree)).collect();

    indices
        .iter()
        .map(|e| {
            e.exponents()
                .iter()
                .zip(tables.iter())
                .map(|(ek, table)| table[*ek as usize])
                .product()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::Domain,
        grid::{NodeKind, TensorGrid},
    };

    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    #[test]
    fn insufficient_samples() {
        let support = SupportSet::total_degree(2, 2);
        let points = vec![dvector![0.0, 0.0], dvector![0.5, 0.5], dvector![-0.5, 1.0]];

        assert_eq!(support.len(), 6);
        assert_eq!(
            DesignMatrix::new(&points, &support, BasisKind::Chebyshev, false).unwrap_err(),
            ApproximationError::InsufficientSamples {
                samples: 3,
                terms: 6
            }
        );
    }

    #[test]
    fn entries_are_products() {
        let support = SupportSet::total_degree(2, 2);
        let points = vec![dvector![0.5, -0.25]; 6];
        let design = DesignMatrix::new(&points, &support, BasisKind::Chebyshev, false).unwrap();

        let t = |k: u32, x: f64| BasisKind::Chebyshev.evaluate(x, 2)[k as usize];

        for (j, e) in support.iter().enumerate() {
            let expected = t(e.get(0), 0.5) * t(e.get(1), -0.25);
            assert_abs_diff_eq!(design.matrix()[(0, j)], expected, epsilon = 1e-15);
        }

        // (1, 1) term: T_1(0.5) * T_1(-0.25).
        assert_abs_diff_eq!(design.matrix()[(5, 4)], -0.125, epsilon = 1e-15);
    }

    #[test]
    fn parallel_rows_are_ordered() {
        let dom = Domain::cube(vec![0.0, 0.0, 0.0], 1.0).unwrap();
        let grid = TensorGrid::new(&dom, 4, NodeKind::Chebyshev).unwrap();
        let support = SupportSet::total_degree(3, 3);

        let seq = DesignMatrix::new(grid.canonical(), &support, BasisKind::Legendre, false).unwrap();
        let par = DesignMatrix::new(grid.canonical(), &support, BasisKind::Legendre, true).unwrap();

        assert_eq!(seq.samples(), 125);
        assert_eq!(seq.terms(), 20);
        assert_eq!(seq.matrix(), par.matrix());
    }
}
