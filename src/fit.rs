//! Least-squares polynomial approximation on an orthogonal basis.
//!
//! The approximant of degree `d` is the combination of tensor-product basis
//! functions of total degree at most `d` that minimizes the discrete L2 error
//! over a sampling grid. The error is weighted by the quadrature weights of
//! the grid, which makes the discrete problem a faithful image of the
//! continuous one:
//!
//! ```text
//! (V^T W V) c = V^T W f
//! ```
//!
//! where `V` is the [design matrix](crate::design::DesignMatrix), `W` the
//! diagonal matrix of quadrature weights and `f` the sampled values. Since the
//! reported error is measured in the same weighted norm, the error of nested
//! support sets on the same grid never increases with the degree.

use getset::{CopyGetters, Getters, Setters};
use log::{debug, warn};
use nalgebra::{Cholesky, DMatrix, DVector};

use crate::{
    basis::BasisKind,
    core::{Domain, Function},
    design::{self, DesignMatrix},
    error::ApproximationError,
    grid::{NodeKind, SampleGrid},
    monomial::{self, Coefficient, MonomialPolynomial},
    quadrature,
    support::SupportSet,
};

/// Arithmetic used for basis conversion, sparsification and differentiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrecisionMode {
    /// Standard double precision floating point.
    #[default]
    Float64,
    /// Exact rational arithmetic. Fitted coefficients are converted exactly
    /// from their binary floating point values.
    Rational,
}

/// Weighting of the residuals in the least-squares problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitWeighting {
    /// Residuals weighted by the quadrature weights of the grid.
    #[default]
    Quadrature,
    /// Plain (unweighted) least squares.
    Uniform,
}

/// Number of samples of the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleCount {
    /// Fixed number of intervals `GN` per axis, giving `(GN + 1)^n` samples.
    Fixed(usize),
    /// The smallest number of intervals per axis such that the number of
    /// samples is at least `oversampling` times the number of basis terms,
    /// but never less than `2(d + 1)`.
    ///
    /// On Chebyshev-Lobatto nodes with `GN` intervals, `T_{2GN - k}` and `T_k`
    /// coincide. The lower bound keeps every basis function up to degree
    /// `2d + 2` distinct from the fitted ones, so the residual norm sees the
    /// terms just above the fitted degree.
    Auto {
        /// Ratio of samples to basis terms.
        oversampling: f64,
    },
}

impl SampleCount {
    /// Determines the number of intervals per axis for given dimension and
    /// degree.
    pub fn intervals(&self, dim: usize, degree: u32) -> usize {
        match *self {
            SampleCount::Fixed(gn) => gn,
            SampleCount::Auto { oversampling } => {
                let terms = SupportSet::size(dim, degree) as f64;
                let required = (oversampling.max(1.0) * terms).ceil();

                let mut gn = 2 * (degree as usize + 1);
                while ((gn + 1) as f64).powi(dim as i32) < required {
                    gn += 1;
                }
                gn
            }
        }
    }
}

impl Default for SampleCount {
    fn default() -> Self {
        SampleCount::Auto { oversampling: 2.0 }
    }
}

/// Options for the polynomial approximation.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct FitOptions {
    /// Orthogonal polynomial family. Default: Chebyshev.
    basis: BasisKind,
    /// One-dimensional nodes of the grid. Default: Chebyshev.
    nodes: NodeKind,
    /// Number of samples. Default: automatic with oversampling `2`.
    samples: SampleCount,
    /// Arithmetic of the basis conversion. Default: `Float64`.
    precision: PrecisionMode,
    /// Weighting of the least-squares residuals. Default: quadrature.
    weighting: FitWeighting,
    /// Maximum accepted condition number of the normal equations. Default:
    /// `1e12`.
    condition_limit: f64,
    /// Whether sampling and design matrix construction run in parallel.
    /// Default: `true`.
    parallel: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            basis: BasisKind::default(),
            nodes: NodeKind::default(),
            samples: SampleCount::default(),
            precision: PrecisionMode::default(),
            weighting: FitWeighting::default(),
            condition_limit: 1e12,
            parallel: true,
        }
    }
}

/// Polynomial approximant of a function over a box.
///
/// The approximant lives in the canonical coordinates `[-1, 1]^n` of its
/// domain. It keeps the sampled grid, so that derived quantities (norms of
/// sparsified versions, errors) can be computed without resampling.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct PolynomialApproximant {
    /// Coefficients in the orthogonal basis, ordered as the support set.
    #[getset(get = "pub")]
    coefficients: DVector<f64>,
    /// Support set of the basis functions.
    #[getset(get = "pub")]
    support: SupportSet,
    /// Sampled grid the approximant was fitted on.
    #[getset(get = "pub")]
    samples: SampleGrid,
    /// Total degree.
    #[getset(get_copy = "pub")]
    degree: u32,
    /// Orthogonal polynomial family.
    #[getset(get_copy = "pub")]
    basis: BasisKind,
    /// Precision mode of derived polynomials.
    #[getset(get_copy = "pub")]
    precision: PrecisionMode,
    /// Quadrature estimate of the L2 norm of the approximation error.
    #[getset(get_copy = "pub")]
    l2_error: f64,
    /// L2 error relative to the L2 norm of the function.
    #[getset(get_copy = "pub")]
    relative_error: f64,
    /// Condition number of the normal equations matrix.
    #[getset(get_copy = "pub")]
    condition: f64,
}

impl PolynomialApproximant {
    /// Fits the approximant of given degree to the samples.
    pub fn fit(
        samples: SampleGrid,
        degree: u32,
        options: &FitOptions,
    ) -> Result<Self, ApproximationError> {
        let dim = samples.domain().dim();
        let support = SupportSet::total_degree(dim, degree);
        let basis = options.basis();

        let design = DesignMatrix::new(
            samples.grid().canonical(),
            &support,
            basis,
            options.parallel(),
        )?;

        let v = design.into_inner();
        let f = samples.values();

        let weights = match options.weighting() {
            FitWeighting::Quadrature => samples.weights().clone(),
            FitWeighting::Uniform => DVector::from_element(samples.len(), 1.0),
        };

        let wv = DMatrix::from_fn(v.nrows(), v.ncols(), |i, j| weights[i] * v[(i, j)]);
        let gram = v.tr_mul(&wv);
        let rhs = wv.tr_mul(f);

        let condition = condition_number(&gram);

        debug!(
            "fit: degree = {}, samples = {}, terms = {}, condition = {:e}",
            degree,
            samples.len(),
            support.len(),
            condition
        );

        if !(condition <= options.condition_limit()) {
            return Err(ApproximationError::NumericalInstability { condition });
        }

        let chol =
            Cholesky::new(gram).ok_or(ApproximationError::NumericalInstability { condition })?;
        let coefficients = chol.solve(&rhs);

        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ApproximationError::NumericalInstability { condition });
        }

        let residual = &v * &coefficients - f;
        let l2_error = quadrature::l2_norm(samples.weights(), &residual);
        let l2_norm = quadrature::l2_norm(samples.weights(), f);
        let relative_error = if l2_norm > 0.0 {
            l2_error / l2_norm
        } else {
            l2_error
        };

        debug!(
            "fit: degree = {}, L2 error = {:e} (relative {:e})",
            degree, l2_error, relative_error
        );

        Ok(Self {
            coefficients,
            support,
            samples,
            degree,
            basis,
            precision: options.precision(),
            l2_error,
            relative_error,
            condition,
        })
    }

    /// Gets the domain of the approximant.
    pub fn domain(&self) -> &Domain<f64> {
        self.samples.domain()
    }

    /// Gets the number of variables.
    pub fn dim(&self) -> usize {
        self.support.dim()
    }

    /// Evaluates the approximant in a point given in canonical coordinates.
    pub fn eval_canonical(&self, u: &DVector<f64>) -> f64 {
        let row = design::row(u, self.support.indices(), self.basis, self.degree);
        row.iter()
            .zip(self.coefficients.iter())
            .map(|(phi, c)| phi * c)
            .sum()
    }

    /// Evaluates the approximant in a point given in domain coordinates.
    pub fn eval(&self, x: &DVector<f64>) -> f64 {
        self.eval_canonical(&self.domain().to_canonical(x))
    }

    /// Converts the approximant into the monomial basis in canonical
    /// coordinates.
    pub fn to_monomial<C: Coefficient>(&self) -> MonomialPolynomial<C> {
        monomial::to_monomial(self)
    }
}

/// Computes the ratio of extreme eigenvalues of a symmetric matrix.
///
/// Infinity is returned when the matrix is not positive definite.
fn condition_number(gram: &DMatrix<f64>) -> f64 {
    let eigenvalues = gram.clone().symmetric_eigenvalues();

    let max = eigenvalues.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min);

    if min > 0.0 && max.is_finite() {
        max / min
    } else {
        f64::INFINITY
    }
}

/// Samples the function over the domain and fits the approximant of given
/// degree.
pub fn approximate<F>(
    f: &F,
    domain: &Domain<f64>,
    degree: u32,
    options: &FitOptions,
) -> Result<PolynomialApproximant, ApproximationError>
where
    F: Function<Field = f64> + Sync,
{
    let expected = f.domain().dim();
    if domain.dim() != expected {
        return Err(ApproximationError::DimensionMismatch {
            expected,
            actual: domain.dim(),
        });
    }

    let gn = options.samples().intervals(domain.dim(), degree);
    let samples = SampleGrid::sample(f, domain, gn, options.nodes(), options.parallel())?;

    PolynomialApproximant::fit(samples, degree, options)
}

/// Result of [`approximate_until`].
#[derive(Debug, Clone)]
pub struct DegreeSearch {
    /// The last successfully constructed approximant.
    pub approximant: PolynomialApproximant,
    /// Whether the approximant meets the tolerance.
    pub reached: bool,
    /// Degrees tried so far with their L2 errors.
    pub history: Vec<(u32, f64)>,
    /// Degree at which the search was stopped by an error, if any.
    pub failure: Option<(u32, ApproximationError)>,
}

/// Constructs approximants of increasing degree, starting at `start`, until
/// the L2 error drops to `tolerance` or `max_degree` is reached.
///
/// Every degree produces a new, independent approximant. If `start` is
/// greater than `max_degree`, only `start` is tried. An error at some degree
/// stops the search with the approximant of the previous degree and records
/// the error in [`DegreeSearch::failure`]. The error is returned only if the
/// first degree fails.
pub fn approximate_until<F>(
    f: &F,
    domain: &Domain<f64>,
    start: u32,
    max_degree: u32,
    tolerance: f64,
    options: &FitOptions,
) -> Result<DegreeSearch, ApproximationError>
where
    F: Function<Field = f64> + Sync,
{
    let mut history = Vec::new();
    let mut degree = start;
    let mut last = approximate(f, domain, degree, options)?;

    loop {
        let error = last.l2_error();
        history.push((degree, error));

        let reached = error <= tolerance;

        if reached || degree >= max_degree {
            debug!(
                "degree search finished at degree {} (error = {:e}, reached = {})",
                degree, error, reached
            );

            return Ok(DegreeSearch {
                approximant: last,
                reached,
                history,
                failure: None,
            });
        }

        degree += 1;

        match approximate(f, domain, degree, options) {
            Ok(approximant) => last = approximant,
            Err(err) => {
                warn!("degree search stopped at degree {}: {}", degree, err);

                return Ok(DegreeSearch {
                    approximant: last,
                    reached: false,
                    history,
                    failure: Some((degree, err)),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{HalfWidth, Problem},
        testing::*,
    };

    use approx::assert_abs_diff_eq;
    use nalgebra::{dvector, storage::Storage, Dyn, IsContiguous, Vector};

    #[test]
    fn auto_sample_count() {
        let auto = SampleCount::default();

        // 6 terms need 12 samples, the degree bound dominates.
        assert_eq!(auto.intervals(2, 2), 6);
        assert_eq!(auto.intervals(1, 5), 12);
        // 3 terms need 300 samples.
        let dense = SampleCount::Auto {
            oversampling: 100.0,
        };
        assert_eq!(dense.intervals(1, 2), 299);
        assert_eq!(SampleCount::Fixed(7).intervals(3, 10), 7);
    }

    #[test]
    fn quadratic_is_reproduced() {
        let f = Sphere::new(2);
        let dom = Domain::cube(vec![0.0, 0.0], 1.0).unwrap();

        let approx = approximate(&f, &dom, 2, &FitOptions::default()).unwrap();

        assert_eq!(approx.coefficients().len(), 6);
        assert!(approx.l2_error() < 1e-12);
        assert_abs_diff_eq!(approx.eval(&dvector![0.3, -0.7]), 0.58, epsilon = 1e-12);
    }

    #[test]
    fn shifted_domain() {
        let f = Sphere::new(2);
        let dom = Domain::new(vec![1.0, -2.0], HalfWidth::PerAxis(vec![0.5, 2.0])).unwrap();

        let mut options = FitOptions::default();
        options.set_basis(BasisKind::Legendre);

        let approx = approximate(&f, &dom, 2, &options).unwrap();
        assert_abs_diff_eq!(approx.eval(&dvector![1.2, -3.0]), 10.44, epsilon = 1e-10);
    }

    #[test]
    fn error_decreases_for_nested_supports() {
        let f = Himmelblau::new();
        let dom = Domain::cube(vec![0.0, 0.0], 5.0).unwrap();

        for nodes in [NodeKind::Chebyshev, NodeKind::Uniform] {
            let mut options = FitOptions::default();
            options.set_samples(SampleCount::Fixed(12)).set_nodes(nodes);

            let errors: Vec<f64> = (0..=6)
                .map(|d| approximate(&f, &dom, d, &options).unwrap().l2_error())
                .collect();

            for pair in errors.windows(2) {
                assert!(
                    pair[1] <= pair[0] * (1.0 + 1e-10) + 1e-10,
                    "{:?} ({:?})",
                    errors,
                    nodes
                );
            }

            // Himmelblau is a quartic.
            assert!(errors[4] < 1e-8 * errors[0]);
        }
    }

    #[test]
    fn insufficient_samples_on_fixed_grid() {
        let f = Sphere::new(2);
        let dom = Domain::cube(vec![0.0, 0.0], 1.0).unwrap();

        let mut options = FitOptions::default();
        options.set_samples(SampleCount::Fixed(1));

        assert_eq!(
            approximate(&f, &dom, 2, &options).unwrap_err(),
            ApproximationError::InsufficientSamples {
                samples: 4,
                terms: 6
            }
        );
    }

    #[test]
    fn rank_deficient_fit_is_rejected() {
        // With two nodes per axis, T_2(x_i) = T_0 on every sample, so the
        // 15 columns of degree 2 in 4 variables are linearly dependent even
        // though there are 16 samples.
        let f = Sphere::new(4);
        let dom = Domain::cube(vec![0.0; 4], 1.0).unwrap();

        let mut options = FitOptions::default();
        options.set_samples(SampleCount::Fixed(1));

        assert!(matches!(
            approximate(&f, &dom, 2, &options),
            Err(ApproximationError::NumericalInstability { .. })
        ));

        // Degree 1 on the same grid is fine.
        assert!(approximate(&f, &dom, 1, &options).is_ok());
    }

    #[test]
    fn dimension_mismatch() {
        let f = Sphere::new(3);
        let dom = Domain::cube(vec![0.0, 0.0], 1.0).unwrap();

        assert_eq!(
            approximate(&f, &dom, 2, &FitOptions::default()).unwrap_err(),
            ApproximationError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn degree_search_stops_at_tolerance() {
        let f = Sphere::new(2);
        let dom = Domain::cube(vec![0.0, 0.0], 2.0).unwrap();

        let search = approximate_until(&f, &dom, 0, 8, 1e-9, &FitOptions::default()).unwrap();

        assert!(search.reached);
        assert_eq!(search.approximant.degree(), 2);
        assert_eq!(search.history.len(), 3);
    }

    #[test]
    fn constant_fit_sees_curvature() {
        let f = Sphere::new(2);
        let dom = Domain::cube(vec![0.0, 0.0], 2.0).unwrap();

        let approx = approximate(&f, &dom, 0, &FitOptions::default()).unwrap();

        assert!(approx.samples().grid().gn() >= 2);
        assert!(approx.l2_error() > 1.0);

        let search = approximate_until(&f, &dom, 0, 8, 1e-9, &FitOptions::default()).unwrap();
        assert_eq!(search.history[0].0, 0);
        assert!(search.history[0].1 > 1.0);
    }

    struct Ripple;

    impl Problem for Ripple {
        type Field = f64;

        fn domain(&self) -> Domain<f64> {
            Domain::cube(vec![0.0, 0.0], 1.0).unwrap()
        }
    }

    impl Function for Ripple {
        fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
        where
            Sx: Storage<f64, Dyn> + IsContiguous,
        {
            (3.0 * x[0]).sin() * (3.0 * x[1]).sin() + x[0]
        }
    }

    #[test]
    fn degree_search_keeps_last_success() {
        let f = Ripple;
        let dom = f.domain();

        // Four nodes per axis alias T_4 onto T_2, degree 4 is rank deficient.
        let mut options = FitOptions::default();
        options.set_samples(SampleCount::Fixed(3));

        let search = approximate_until(&f, &dom, 1, 6, 1e-12, &options).unwrap();

        assert!(!search.reached);
        assert_eq!(search.approximant.degree(), 3);
        assert_eq!(search.history.len(), 3);
        assert!(matches!(
            search.failure,
            Some((4, ApproximationError::NumericalInstability { .. }))
        ));

        // Nothing to fall back to.
        assert!(matches!(
            approximate_until(&f, &dom, 4, 6, 1e-12, &options),
            Err(ApproximationError::NumericalInstability { .. })
        ));
    }

    #[test]
    fn degree_search_exhausted() {
        let f = Himmelblau::new();
        let dom = Domain::cube(vec![0.0, 0.0], 5.0).unwrap();

        let search = approximate_until(&f, &dom, 1, 2, 1e-9, &FitOptions::default()).unwrap();

        assert!(!search.reached);
        assert_eq!(search.approximant.degree(), 2);
        assert!(search.failure.is_none());
    }
}
