//! High-level API for the critical point search.
//!
//! The [`SweepDriver`] runs the whole pipeline for every degree of a sweep:
//! polynomial approximation, conversion to monomials (and optional
//! sparsification), construction of the gradient system, polynomial solve,
//! local refinement and classification. The degrees are independent and run
//! in parallel.
//!
//! The simplest way of using the driver is to specify the degrees only. The
//! search box is then taken from [`Problem::domain`]:
//!
//! ```rust
//! use polycrit::SweepDriver;
//! # use polycrit::nalgebra as na;
//! # use polycrit::{Domain, Function, Problem};
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct Himmelblau;
//! #
//! # impl Problem for Himmelblau {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::cube(vec![0.0, 0.0], 5.0).unwrap()
//! #     }
//! # }
//! #
//! # impl Function for Himmelblau {
//! #     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #     {
//! #         (x[0].powi(2) + x[1] - 11.0).powi(2) + (x[0] + x[1].powi(2) - 7.0).powi(2)
//! #     }
//! # }
//!
//! let f = Himmelblau;
//!
//! let driver = SweepDriver::builder(&f)
//!     .with_degrees(4..=6)
//!     .build()
//!     .expect("valid sweep");
//! ```
//!
//! If you need to specify additional settings, use the other builder
//! methods:
//!
//! ```rust
//! use polycrit::{FitOptions, PrecisionMode, SparsifyMode, SweepDriver};
//! use polycrit::solve::MultistartSolver;
//! # use polycrit::nalgebra as na;
//! # use polycrit::{Domain, Function, Problem};
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct Himmelblau;
//! #
//! # impl Problem for Himmelblau {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::cube(vec![0.0, 0.0], 5.0).unwrap()
//! #     }
//! # }
//! #
//! # impl Function for Himmelblau {
//! #     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #     {
//! #         (x[0].powi(2) + x[1] - 11.0).powi(2) + (x[0] + x[1].powi(2) - 7.0).powi(2)
//! #     }
//! # }
//!
//! # let f = Himmelblau;
//! let mut fit = FitOptions::default();
//! fit.set_precision(PrecisionMode::Rational);
//!
//! let driver = SweepDriver::builder(&f)
//!     .with_domain(Domain::rect(vec![0.0, 0.0], vec![5.0, 5.0]).unwrap())
//!     .with_degrees([4, 8])
//!     .with_fit_options(fit)
//!     .with_sparsify(1e-12, SparsifyMode::Relative)
//!     .with_solver(MultistartSolver::new())
//!     .build()
//!     .expect("valid sweep");
//! ```
//!
//! Once you have the driver, run the sweep and inspect the outcome of every
//! degree:
//!
//! ```rust
//! # use polycrit::SweepDriver;
//! # use polycrit::nalgebra as na;
//! # use polycrit::{Domain, Function, Problem};
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct Himmelblau;
//! #
//! # impl Problem for Himmelblau {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::cube(vec![0.0, 0.0], 5.0).unwrap()
//! #     }
//! # }
//! #
//! # impl Function for Himmelblau {
//! #     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #     {
//! #         (x[0].powi(2) + x[1] - 11.0).powi(2) + (x[0] + x[1].powi(2) - 7.0).powi(2)
//! #     }
//! # }
//! #
//! # let f = Himmelblau;
//! # let driver = SweepDriver::builder(&f).with_degrees([4]).build().unwrap();
//! let report = driver.run();
//!
//! for outcome in report.outcomes() {
//!     println!("degree {}: {}", outcome.degree, outcome.status);
//! }
//!
//! for point in report.minima() {
//!     println!("minimum {:?} = {}", point.point().as_slice(), point.refined.value);
//! }
//! ```
//!
//! Failures local to a degree (an ill-conditioned fit, a solver timeout) are
//! recorded in [`DegreeOutcome::status`] and do not affect other degrees.

use std::{fmt, time::Duration};

use log::{debug, warn};
use num_rational::BigRational;
use rayon::prelude::*;

use crate::{
    classify::{
        classify_all, ClassifiedCriticalPoint, ClassifyOptions, CriticalPointKind,
        CriticalPointRecord,
    },
    core::{Domain, Function, InvalidDomainError, Problem},
    error::{ApproximationError, SweepError},
    fit::{approximate, FitOptions, PolynomialApproximant, PrecisionMode},
    monomial::{Coefficient, SparsifyMode},
    refine::{refine_all, RefineOptions},
    solve::{
        find_candidates, CriticalPointCandidate, MultistartSolver, PolynomialSolver,
        SolveOptions, SolverFailure,
    },
    system::{GradientSystem, Variables},
};

/// Builder for the [`SweepDriver`].
pub struct SweepBuilder<'a, F: Problem, S> {
    f: &'a F,
    domain: Domain<f64>,
    degrees: Vec<u32>,
    variables: Option<Variables>,
    solver: S,
    fit: FitOptions,
    sparsify: Option<(f64, SparsifyMode)>,
    solve: SolveOptions,
    refine: RefineOptions,
    classify: ClassifyOptions,
    parallel: bool,
}

impl<'a, F: Problem<Field = f64>> SweepBuilder<'a, F, MultistartSolver> {
    fn new(f: &'a F) -> Self {
        Self {
            f,
            domain: f.domain(),
            degrees: Vec::new(),
            variables: None,
            solver: MultistartSolver::new(),
            fit: FitOptions::default(),
            sparsify: None,
            solve: SolveOptions::default(),
            refine: RefineOptions::default(),
            classify: ClassifyOptions::default(),
            parallel: true,
        }
    }
}

impl<'a, F: Problem<Field = f64>, S> SweepBuilder<'a, F, S> {
    /// Sets the degrees of the sweep. Duplicates are removed and the degrees
    /// are processed in ascending order.
    pub fn with_degrees<I>(mut self, degrees: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        self.degrees = degrees.into_iter().collect();
        self.degrees.sort_unstable();
        self.degrees.dedup();
        self
    }

    /// Sets the search box. Default: the domain of the objective.
    pub fn with_domain(mut self, domain: Domain<f64>) -> Self {
        self.domain = domain;
        self
    }

    /// Sets the names of the variables. Default: `x1, ..., xn`.
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Sets the polynomial system solver. Default: [`MultistartSolver`].
    pub fn with_solver<S2>(self, solver: S2) -> SweepBuilder<'a, F, S2> {
        SweepBuilder {
            f: self.f,
            domain: self.domain,
            degrees: self.degrees,
            variables: self.variables,
            solver,
            fit: self.fit,
            sparsify: self.sparsify,
            solve: self.solve,
            refine: self.refine,
            classify: self.classify,
            parallel: self.parallel,
        }
    }

    /// Sets the options of the polynomial approximation.
    pub fn with_fit_options(mut self, options: FitOptions) -> Self {
        self.fit = options;
        self
    }

    /// Enables sparsification of the monomial polynomial before
    /// differentiation. Default: disabled.
    pub fn with_sparsify(mut self, threshold: f64, mode: SparsifyMode) -> Self {
        self.sparsify = Some((threshold, mode));
        self
    }

    /// Sets the options of the polynomial solve.
    pub fn with_solve_options(mut self, options: SolveOptions) -> Self {
        self.solve = options;
        self
    }

    /// Sets the options of the local refinement.
    pub fn with_refine_options(mut self, options: RefineOptions) -> Self {
        self.refine = options;
        self
    }

    /// Sets the options of the classification.
    pub fn with_classify_options(mut self, options: ClassifyOptions) -> Self {
        self.classify = options;
        self
    }

    /// Sets whether the degrees are processed in parallel. Default: `true`.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Validates the settings and builds the [`SweepDriver`].
    pub fn build(self) -> Result<SweepDriver<'a, F, S>, SweepError> {
        let expected = self.f.domain().dim();
        let dim = self.domain.dim();

        if dim != expected {
            return Err(SweepError::DimensionMismatch {
                expected,
                actual: dim,
            });
        }

        if let Some(axis) = self.domain.half_width().iter().position(|r| !r.is_finite()) {
            return Err(InvalidDomainError::InvalidHalfWidth { axis }.into());
        }

        if self.degrees.is_empty() {
            return Err(SweepError::EmptyDegreeRange);
        }

        let variables = self.variables.unwrap_or_else(|| Variables::indexed(dim));
        if variables.len() != dim {
            return Err(SweepError::DimensionMismatch {
                expected: dim,
                actual: variables.len(),
            });
        }

        Ok(SweepDriver {
            f: self.f,
            domain: self.domain,
            degrees: self.degrees,
            variables,
            solver: self.solver,
            fit: self.fit,
            sparsify: self.sparsify,
            solve: self.solve,
            refine: self.refine,
            classify: self.classify,
            parallel: self.parallel,
        })
    }
}

/// The driver of the degree sweep.
///
/// Use [`SweepDriver::builder`] to create it. For the usage of the driver, see
/// [module](self) documentation.
pub struct SweepDriver<'a, F: Problem, S> {
    f: &'a F,
    domain: Domain<f64>,
    degrees: Vec<u32>,
    variables: Variables,
    solver: S,
    fit: FitOptions,
    sparsify: Option<(f64, SparsifyMode)>,
    solve: SolveOptions,
    refine: RefineOptions,
    classify: ClassifyOptions,
    parallel: bool,
}

impl<'a, F: Problem<Field = f64>> SweepDriver<'a, F, MultistartSolver> {
    /// Returns the builder for specifying the sweep.
    pub fn builder(f: &'a F) -> SweepBuilder<'a, F, MultistartSolver> {
        SweepBuilder::new(f)
    }
}

impl<'a, F, S> SweepDriver<'a, F, S>
where
    F: Function<Field = f64> + Sync,
    S: PolynomialSolver,
{
    /// Gets the search box.
    pub fn domain(&self) -> &Domain<f64> {
        &self.domain
    }

    /// Gets the degrees of the sweep in ascending order.
    pub fn degrees(&self) -> &[u32] {
        &self.degrees
    }

    /// Runs the pipeline for all degrees.
    pub fn run(&self) -> SweepReport {
        let outcomes = if self.parallel {
            self.degrees
                .par_iter()
                .map(|degree| self.run_degree(*degree))
                .collect()
        } else {
            self.degrees
                .iter()
                .map(|degree| self.run_degree(*degree))
                .collect()
        };

        SweepReport { outcomes }
    }

    /// Runs the pipeline for a single degree.
    pub fn run_degree(&self, degree: u32) -> DegreeOutcome {
        let approximant = match approximate(self.f, &self.domain, degree, &self.fit) {
            Ok(approximant) => approximant,
            Err(error) => {
                warn!("degree {}: approximation failed: {}", degree, error);
                return DegreeOutcome::failed(degree, DegreeStatus::ApproximationFailed(error));
            }
        };

        let built = match approximant.precision() {
            PrecisionMode::Float64 => self.gradient_system::<f64>(&approximant),
            PrecisionMode::Rational => self.gradient_system::<BigRational>(&approximant),
        };

        let (system, (dropped_terms, removed_l2, relative_degradation)) = match built {
            Ok(built) => built,
            Err(error) => {
                warn!("degree {}: gradient system failed: {}", degree, error);
                return DegreeOutcome::failed(degree, DegreeStatus::ApproximationFailed(error));
            }
        };

        let search = find_candidates(&system, &self.domain, degree, &self.solver, &self.solve);

        let mut outcome = DegreeOutcome {
            degree,
            status: DegreeStatus::Completed,
            l2_error: Some(approximant.l2_error()),
            relative_error: Some(approximant.relative_error()),
            condition: Some(approximant.condition()),
            dropped_terms,
            removed_l2,
            relative_degradation,
            raw_solutions: search.raw,
            solve_time: search.elapsed,
            candidates: Vec::new(),
            points: Vec::new(),
        };

        if let Some(failure) = search.failure {
            outcome.status = DegreeStatus::SolverFailed(failure);
            return outcome;
        }

        let refined = refine_all(self.f, &self.domain, &search.candidates, &self.refine);
        let points = classify_all(self.f, refined, &self.classify);

        debug!(
            "degree {}: {} candidates, {} minima",
            degree,
            search.candidates.len(),
            points
                .iter()
                .filter(|p| p.kind() == CriticalPointKind::Minimum)
                .count()
        );

        outcome.candidates = search.candidates;
        outcome.points = points;
        outcome
    }

    /// Builds the gradient system together with the number of dropped terms
    /// and the absolute and relative L2 norms of the dropped part.
    fn gradient_system<C: Coefficient>(
        &self,
        approximant: &PolynomialApproximant,
    ) -> Result<(GradientSystem<f64>, (usize, f64, f64)), ApproximationError> {
        let poly = approximant.to_monomial::<C>();

        let (poly, sparsified) = match self.sparsify {
            Some((threshold, mode)) => {
                let sparse = poly.sparsify(threshold, mode, approximant.samples().grid());
                let sparsified = (
                    sparse.dropped(),
                    sparse.removed_l2(),
                    sparse.relative_degradation(),
                );
                (sparse.into_polynomial(), sparsified)
            }
            None => (poly, (0, 0.0, 0.0)),
        };

        let system = GradientSystem::new(&poly, self.variables.clone())?;
        Ok((system.to_f64(), sparsified))
    }
}

/// Status of a single degree of the sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum DegreeStatus {
    /// All stages finished.
    Completed,
    /// The approximation could not be constructed.
    ApproximationFailed(ApproximationError),
    /// The polynomial solver failed or timed out.
    SolverFailed(SolverFailure),
}

impl DegreeStatus {
    /// Returns `true` if all stages finished.
    pub fn is_completed(&self) -> bool {
        matches!(self, DegreeStatus::Completed)
    }
}

impl fmt::Display for DegreeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegreeStatus::Completed => write!(f, "completed"),
            DegreeStatus::ApproximationFailed(error) => write!(f, "{}", error),
            DegreeStatus::SolverFailed(failure) => write!(f, "{}", failure),
        }
    }
}

/// Outcome of a single degree of the sweep.
#[derive(Debug, Clone)]
pub struct DegreeOutcome {
    /// Degree of the approximant.
    pub degree: u32,
    /// Status of the pipeline.
    pub status: DegreeStatus,
    /// L2 error of the approximant, if constructed.
    pub l2_error: Option<f64>,
    /// Relative L2 error of the approximant, if constructed.
    pub relative_error: Option<f64>,
    /// Condition number of the fit, if constructed.
    pub condition: Option<f64>,
    /// Number of monomial terms removed by sparsification.
    pub dropped_terms: usize,
    /// L2 norm of the part removed by sparsification over the box.
    pub removed_l2: f64,
    /// `removed_l2` relative to the L2 norm of the polynomial before
    /// sparsification.
    pub relative_degradation: f64,
    /// Number of solutions returned by the polynomial solver.
    pub raw_solutions: usize,
    /// Time spent in the polynomial solver.
    pub solve_time: Duration,
    /// Critical points of the approximant in the box.
    pub candidates: Vec<CriticalPointCandidate>,
    /// Refined and classified critical points.
    pub points: Vec<ClassifiedCriticalPoint>,
}

impl DegreeOutcome {
    fn failed(degree: u32, status: DegreeStatus) -> Self {
        Self {
            degree,
            status,
            l2_error: None,
            relative_error: None,
            condition: None,
            dropped_terms: 0,
            removed_l2: 0.0,
            relative_degradation: 0.0,
            raw_solutions: 0,
            solve_time: Duration::ZERO,
            candidates: Vec::new(),
            points: Vec::new(),
        }
    }
}

/// Results of all degrees of the sweep.
#[derive(Debug, Clone)]
pub struct SweepReport {
    outcomes: Vec<DegreeOutcome>,
}

impl SweepReport {
    /// Gets the outcomes in ascending order of degrees.
    pub fn outcomes(&self) -> &[DegreeOutcome] {
        &self.outcomes
    }

    /// Gets the outcome of given degree.
    pub fn outcome(&self, degree: u32) -> Option<&DegreeOutcome> {
        self.outcomes.iter().find(|o| o.degree == degree)
    }

    /// Iterates over classified points of all degrees.
    pub fn points(&self) -> impl Iterator<Item = &ClassifiedCriticalPoint> {
        self.outcomes.iter().flat_map(|o| o.points.iter())
    }

    /// Iterates over converged minima in the search box of all degrees.
    pub fn minima(&self) -> impl Iterator<Item = &ClassifiedCriticalPoint> {
        self.points().filter(|p| {
            p.kind() == CriticalPointKind::Minimum && p.refined.converged && p.refined.in_domain
        })
    }

    /// Gets the converged point in the search box with the lowest objective
    /// value.
    pub fn best(&self) -> Option<&ClassifiedCriticalPoint> {
        self.points()
            .filter(|p| p.refined.converged && p.refined.in_domain)
            .min_by(|a, b| a.refined.value.total_cmp(&b.refined.value))
    }

    /// Flattens all classified points into export records.
    pub fn records(&self) -> Vec<CriticalPointRecord> {
        self.points().map(ClassifiedCriticalPoint::record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fit::SampleCount,
        solve::SolveRequest,
        testing::*,
    };

    use approx::assert_abs_diff_eq;
    use nalgebra::{dvector, Complex};

    #[test]
    fn himmelblau_sweep() {
        let f = Himmelblau::new();
        let driver = SweepDriver::builder(&f)
            .with_degrees([6, 4])
            .build()
            .unwrap();

        assert_eq!(driver.degrees(), &[4, 6]);

        let report = driver.run();
        assert_eq!(report.outcomes().len(), 2);

        for outcome in report.outcomes() {
            assert!(outcome.status.is_completed(), "{}", outcome.status);
            assert!(outcome.relative_error.unwrap() < 1e-8);
            assert_eq!(outcome.dropped_terms, 0);
            assert_eq!(outcome.removed_l2, 0.0);

            let minima: Vec<_> = outcome
                .points
                .iter()
                .filter(|p| p.kind() == CriticalPointKind::Minimum && p.refined.converged)
                .map(|p| p.point().clone())
                .collect();

            for expected in f.minima() {
                assert!(
                    is_near_any(&expected, &minima, 1e-5),
                    "degree {}: {:?} not found",
                    outcome.degree,
                    expected.as_slice()
                );
            }

            for point in &outcome.points {
                assert!(point.refined.in_domain);
                assert!(f
                    .critical_points()
                    .iter()
                    .any(|(x, kind)| *kind == point.kind() && (x - point.point()).norm() < 1e-4));
            }
        }

        let best = report.best().unwrap();
        assert!(best.refined.value < 1e-12);
        assert_eq!(report.records().len(), report.points().count());
    }

    #[test]
    fn rational_precision_with_sparsification() {
        let f = ThreeHumpCamel::new();

        let mut fit = FitOptions::default();
        fit.set_precision(PrecisionMode::Rational);

        let report = SweepDriver::builder(&f)
            .with_degrees([6])
            .with_fit_options(fit)
            .with_sparsify(1e-10, SparsifyMode::Relative)
            .with_parallel(false)
            .build()
            .unwrap()
            .run();

        let outcome = report.outcome(6).unwrap();
        assert!(outcome.status.is_completed(), "{}", outcome.status);

        // The approximant reproduces the sextic, the other basis terms vanish.
        assert!(outcome.dropped_terms > 0);
        assert!(outcome.removed_l2 >= 0.0);
        assert!(outcome.relative_degradation < 1e-8);

        // In canonical coordinates the sextic is
        // 8u^2 - 16.8u^4 + 10.67u^6 + 4uv + 4v^2, a threshold of 0.3 times
        // 16.8 removes the last two terms.
        let mut fit = FitOptions::default();
        fit.set_precision(PrecisionMode::Rational);

        let coarse = SweepDriver::builder(&f)
            .with_degrees([6])
            .with_fit_options(fit)
            .with_sparsify(0.3, SparsifyMode::Relative)
            .with_parallel(false)
            .build()
            .unwrap()
            .run();

        let outcome = coarse.outcome(6).unwrap();
        assert!(outcome.dropped_terms >= 2);
        assert!(outcome.removed_l2 > 1.0);
        assert!(outcome.relative_degradation > 0.1);

        let minima: Vec<_> = report.minima().map(|p| p.point().clone()).collect();
        for expected in f.minima() {
            assert!(is_near_any(&expected, &minima, 1e-5));
        }
    }

    #[test]
    fn failed_degree_does_not_abort_sweep() {
        let f = Sphere::new(2);

        let mut fit = FitOptions::default();
        fit.set_samples(SampleCount::Fixed(3));

        // Degree 6 has 28 basis terms, the grid has 16 points.
        let report = SweepDriver::builder(&f)
            .with_degrees([2, 6])
            .with_fit_options(fit)
            .build()
            .unwrap()
            .run();

        assert!(report.outcome(2).unwrap().status.is_completed());
        assert_eq!(
            report.outcome(6).unwrap().status,
            DegreeStatus::ApproximationFailed(ApproximationError::InsufficientSamples {
                samples: 16,
                terms: 28
            })
        );

        let minimum = report.minima().next().unwrap();
        assert_abs_diff_eq!(minimum.point(), &dvector![0.0, 0.0], epsilon = 1e-8);
        assert_abs_diff_eq!(
            minimum.analysis.eigenvalues,
            dvector![2.0, 2.0],
            epsilon = 1e-4
        );
    }

    struct Failing;

    impl PolynomialSolver for Failing {
        fn solve(
            &self,
            _: &GradientSystem<f64>,
            request: &SolveRequest,
        ) -> Result<Vec<Vec<Complex<f64>>>, SolverFailure> {
            Err(SolverFailure::Timeout {
                elapsed: request.remaining(),
            })
        }
    }

    #[test]
    fn solver_failure_is_recorded() {
        let f = Sphere::new(2);
        let report = SweepDriver::builder(&f)
            .with_degrees([2])
            .with_solver(Failing)
            .build()
            .unwrap()
            .run();

        let outcome = report.outcome(2).unwrap();
        assert!(matches!(
            outcome.status,
            DegreeStatus::SolverFailed(SolverFailure::Timeout { .. })
        ));
        assert!(outcome.l2_error.is_some());
        assert!(outcome.points.is_empty());
    }

    #[test]
    fn invalid_sweeps() {
        let f = Sphere::new(2);

        assert!(matches!(
            SweepDriver::builder(&f).build(),
            Err(SweepError::EmptyDegreeRange)
        ));

        assert!(matches!(
            SweepDriver::builder(&f)
                .with_degrees([2])
                .with_domain(Domain::cube(vec![0.0; 3], 1.0).unwrap())
                .build(),
            Err(SweepError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));

        assert!(matches!(
            SweepDriver::builder(&f)
                .with_degrees([2])
                .with_domain(Domain::unconstrained(2))
                .build(),
            Err(SweepError::InvalidDomain(
                InvalidDomainError::InvalidHalfWidth { axis: 0 }
            ))
        ));

        assert!(matches!(
            SweepDriver::builder(&f)
                .with_degrees([2])
                .with_variables(Variables::indexed(1))
                .build(),
            Err(SweepError::DimensionMismatch { .. })
        ));
    }
}
