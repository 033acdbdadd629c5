//! Error types of the approximation pipeline.
//!
//! Errors are split by the scope they affect. [`ApproximationError`] is local
//! to a single polynomial degree and is recorded in the sweep outcome of that
//! degree, while [`SweepError`] aborts the whole sweep. Failures of the
//! polynomial system solver are described by
//! [`SolverFailure`](crate::solve::SolverFailure).

use thiserror::Error;

use crate::core::InvalidDomainError;

/// Error returned when constructing a polynomial approximant fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApproximationError {
    /// The domain specification is not valid.
    #[error("invalid domain: {0}")]
    InvalidDomain(#[from] InvalidDomainError),
    /// There are fewer samples than basis terms, the least-squares problem is
    /// underdetermined.
    #[error("insufficient samples ({samples}) for {terms} basis terms")]
    InsufficientSamples {
        /// Number of sample points.
        samples: usize,
        /// Number of basis terms.
        terms: usize,
    },
    /// The normal equations are not positive definite or too badly
    /// conditioned.
    #[error("numerically unstable fit (condition number {condition:e})")]
    NumericalInstability {
        /// Condition number of the Gram matrix.
        condition: f64,
    },
    /// The number of grid points does not fit into `usize`.
    #[error("grid with {nodes_per_axis} nodes per axis in {dim} dimensions is too large")]
    GridTooLarge {
        /// Number of nodes per axis.
        nodes_per_axis: usize,
        /// Dimension of the domain.
        dim: usize,
    },
    /// The objective returned a non-finite value in a sample point.
    #[error("objective value in sample {index} is not finite")]
    NonFiniteSample {
        /// Index of the sample in the grid.
        index: usize,
    },
    /// Dimensions of the inputs do not agree.
    #[error("dimension mismatch ({expected} != {actual})")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },
}

/// Error that makes a whole degree sweep impossible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SweepError {
    /// The search domain is not valid.
    #[error("invalid domain: {0}")]
    InvalidDomain(#[from] InvalidDomainError),
    /// No degree was requested.
    #[error("empty range of degrees")]
    EmptyDegreeRange,
    /// Dimension of the domain does not match the dimension of the objective.
    #[error("dimension mismatch ({expected} != {actual})")]
    DimensionMismatch {
        /// Dimension of the objective.
        expected: usize,
        /// Dimension of the domain.
        actual: usize,
    },
}
