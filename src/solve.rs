//! Interface to polynomial system solvers.
//!
//! Finding all roots of a polynomial system is delegated to a
//! [`PolynomialSolver`], which returns complex solution vectors. The interface
//! in [`find_candidates`] turns them into critical point candidates:
//!
//! 1. real solutions are requested if the solver supports it, and solutions
//!    with non-negligible imaginary parts are discarded in any case,
//! 2. solutions outside of the canonical box `[-1, 1]^n` are discarded,
//! 3. solutions closer than a tolerance to an already accepted one are
//!    discarded.
//!
//! The solver gets a deadline. A failure or a result that arrives after the
//! deadline produces no candidates, and the failure is kept in
//! [`CandidateSearch`] so that the caller can report it.
//!
//! [`MultistartSolver`] is a solver that runs the [trust
//! region](crate::algo::TrustRegion) method from a grid of starting points.
//! It finds real roots only and gives no guarantee that all roots are found.

use std::{
    f64::consts::PI,
    time::{Duration, Instant},
};

use getset::{CopyGetters, Setters};
use log::{debug, warn};
use nalgebra::{Complex, DVector};
use rayon::prelude::*;
use thiserror::Error;

use crate::{
    algo::TrustRegion,
    core::{Domain, Problem, Solver, System},
    system::GradientSystem,
};

/// Parameters of a single solver invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveRequest {
    /// Only real solutions are requested.
    pub real_only: bool,
    /// The solver should give up when this instant passes.
    pub deadline: Instant,
}

impl SolveRequest {
    /// Returns `true` if the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Gets the time remaining to the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Failure of a polynomial system solver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverFailure {
    /// The solver did not finish before the deadline.
    #[error("solver timed out after {elapsed:?}")]
    Timeout {
        /// Time spent in the solver.
        elapsed: Duration,
    },
    /// The solver reported an error.
    #[error("solver failed: {0}")]
    Failed(String),
    /// A returned solution has wrong number of components.
    #[error("solution dimension mismatch ({expected} != {actual})")]
    DimensionMismatch {
        /// Number of variables of the system.
        expected: usize,
        /// Number of components of the solution.
        actual: usize,
    },
}

/// Solver of polynomial systems.
pub trait PolynomialSolver: Sync {
    /// Returns `true` if the solver can restrict the result to real
    /// solutions.
    fn supports_real_only(&self) -> bool {
        false
    }

    /// Finds the solutions of the system in canonical coordinates.
    ///
    /// Implementations should return [`SolverFailure::Timeout`] once the
    /// deadline of the request passes.
    fn solve(
        &self,
        system: &GradientSystem<f64>,
        request: &SolveRequest,
    ) -> Result<Vec<Vec<Complex<f64>>>, SolverFailure>;
}

/// Options for [`find_candidates`].
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct SolveOptions {
    /// Time limit of a single solver invocation. Default: 60 seconds.
    timeout: Duration,
    /// Maximum magnitude of imaginary parts of a real solution. Default:
    /// `1e-8`.
    imag_tol: f64,
    /// Tolerance for the canonical box, a solution is kept if all its
    /// components satisfy `|u_i| <= 1 + domain_tol`. Kept solutions are
    /// clamped onto `[-1, 1]^n`, so every candidate lies in the domain.
    /// Default: `1e-8`.
    domain_tol: f64,
    /// Solutions closer than this (in canonical coordinates) are considered
    /// identical. Default: `1e-6`.
    dedup_tol: f64,
    /// Whether to request real solutions only from solvers that support it.
    /// Default: `true`.
    real_only: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            imag_tol: 1e-8,
            domain_tol: 1e-8,
            dedup_tol: 1e-6,
            real_only: true,
        }
    }
}

/// Critical point of a polynomial approximant.
#[derive(Debug, Clone, PartialEq)]
pub struct CriticalPointCandidate {
    /// Coordinates in the canonical box.
    pub canonical: DVector<f64>,
    /// Coordinates in the domain.
    pub point: DVector<f64>,
    /// Degree of the approximant.
    pub degree: u32,
}

/// Result of [`find_candidates`].
#[derive(Debug, Clone)]
pub struct CandidateSearch {
    /// Accepted candidates.
    pub candidates: Vec<CriticalPointCandidate>,
    /// Failure of the solver, in which case there are no candidates.
    pub failure: Option<SolverFailure>,
    /// Number of solutions returned by the solver before filtering.
    pub raw: usize,
    /// Time spent in the solver.
    pub elapsed: Duration,
}

impl CandidateSearch {
    fn failed(failure: SolverFailure, elapsed: Duration) -> Self {
        warn!("polynomial solve failed: {}", failure);

        Self {
            candidates: Vec::new(),
            failure: Some(failure),
            raw: 0,
            elapsed,
        }
    }
}

/// Solves the gradient system and converts the solutions in the box into
/// critical point candidates in the coordinates of given domain.
pub fn find_candidates<S>(
    system: &GradientSystem<f64>,
    domain: &Domain<f64>,
    degree: u32,
    solver: &S,
    options: &SolveOptions,
) -> CandidateSearch
where
    S: PolynomialSolver + ?Sized,
{
    let n = system.dim();

    if domain.dim() != n {
        return CandidateSearch::failed(
            SolverFailure::DimensionMismatch {
                expected: n,
                actual: domain.dim(),
            },
            Duration::ZERO,
        );
    }

    let start = Instant::now();
    let request = SolveRequest {
        real_only: options.real_only() && solver.supports_real_only(),
        deadline: start + options.timeout(),
    };

    let result = solver.solve(system, &request);
    let elapsed = start.elapsed();

    let solutions = match result {
        Ok(_) if elapsed > options.timeout() => {
            return CandidateSearch::failed(SolverFailure::Timeout { elapsed }, elapsed);
        }
        Ok(solutions) => solutions,
        Err(failure) => return CandidateSearch::failed(failure, elapsed),
    };

    if let Some(bad) = solutions.iter().find(|s| s.len() != n) {
        return CandidateSearch::failed(
            SolverFailure::DimensionMismatch {
                expected: n,
                actual: bad.len(),
            },
            elapsed,
        );
    }

    let raw = solutions.len();
    let bound = 1.0 + options.domain_tol();

    let mut canonical: Vec<DVector<f64>> = Vec::new();
    let (mut complex, mut outside) = (0, 0);

    for solution in solutions {
        if solution
            .iter()
            .any(|z| !z.im.is_finite() || z.im.abs() > options.imag_tol())
        {
            complex += 1;
            continue;
        }

        let u = DVector::from_iterator(n, solution.iter().map(|z| z.re));

        if !u.iter().all(|ui| ui.is_finite() && ui.abs() <= bound) {
            outside += 1;
            continue;
        }

        let u = u.map(|ui| ui.clamp(-1.0, 1.0));

        if canonical
            .iter()
            .any(|v| (v - &u).norm() < options.dedup_tol())
        {
            continue;
        }

        canonical.push(u);
    }

    debug!(
        "degree {}: {} solutions, {} complex, {} outside of the box, {} candidates",
        degree,
        raw,
        complex,
        outside,
        canonical.len()
    );

    let candidates = canonical
        .into_iter()
        .map(|u| CriticalPointCandidate {
            point: domain.from_canonical(&u),
            canonical: u,
            degree,
        })
        .collect();

    CandidateSearch {
        candidates,
        failure: None,
        raw,
        elapsed,
    }
}

/// Options for [`MultistartSolver`].
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct MultistartOptions {
    /// Number of starting points per axis. Default: two per degree of the
    /// system plus two.
    starts_per_axis: Option<usize>,
    /// Upper limit of the total number of starting points. Default: `4096`.
    max_starts: usize,
    /// Maximum number of iterations from a single starting point. Default:
    /// `100`.
    max_iters: usize,
    /// Residual norm that is considered a root, relative to `1 + max |c|`
    /// where `c` are the coefficients of the system. Default: `1e-10`.
    tolerance: f64,
    /// Whether the starting points are processed in parallel. Default:
    /// `true`.
    parallel: bool,
}

impl Default for MultistartOptions {
    fn default() -> Self {
        Self {
            starts_per_axis: None,
            max_starts: 4096,
            max_iters: 100,
            tolerance: 1e-10,
            parallel: true,
        }
    }
}

/// Polynomial solver running trust region method from a grid of starting
/// points.
///
/// The starting points are the tensor product of Chebyshev-Gauss nodes in
/// the canonical box. Iterates are kept in the box, so only real roots in
/// the box are found. The deadline is checked between iterations.
#[derive(Debug, Clone, Default)]
pub struct MultistartSolver {
    options: MultistartOptions,
}

enum StartOutcome {
    Root(DVector<f64>),
    NotConverged,
    Expired,
}

impl MultistartSolver {
    /// Creates the solver with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the solver with given options.
    pub fn with_options(options: MultistartOptions) -> Self {
        Self { options }
    }

    /// Gets the options.
    pub fn options(&self) -> &MultistartOptions {
        &self.options
    }

    fn starts(&self, system: &GradientSystem<f64>) -> Vec<DVector<f64>> {
        let n = system.dim();
        let mut k = self
            .options
            .starts_per_axis()
            .unwrap_or(2 * system.degree() as usize + 2)
            .max(1);

        while k > 1 && (k as f64).powi(n as i32) > self.options.max_starts() as f64 {
            k -= 1;
        }

        let nodes: Vec<f64> = (0..k)
            .map(|i| ((2 * i + 1) as f64 * PI / (2 * k) as f64).cos())
            .collect();

        let total = k.pow(n as u32);
        (0..total)
            .map(|mut index| {
                let mut x = DVector::zeros(n);
                for axis in (0..n).rev() {
                    x[axis] = nodes[index % k];
                    index /= k;
                }
                x
            })
            .collect()
    }

    fn run_from(
        &self,
        system: &GradientSystem<f64>,
        dom: &Domain<f64>,
        mut x: DVector<f64>,
        tolerance: f64,
        request: &SolveRequest,
    ) -> StartOutcome {
        let mut solver = TrustRegion::new(system, dom);
        let mut rx = x.clone_owned();
        system.eval(&x, &mut rx);

        for _ in 0..self.options.max_iters() {
            if rx.norm() <= tolerance {
                return StartOutcome::Root(x);
            }

            if request.is_expired() {
                return StartOutcome::Expired;
            }

            if solver.solve_next(system, dom, &mut x, &mut rx).is_err() {
                break;
            }
        }

        if rx.norm() <= tolerance {
            StartOutcome::Root(x)
        } else {
            StartOutcome::NotConverged
        }
    }
}

impl PolynomialSolver for MultistartSolver {
    fn supports_real_only(&self) -> bool {
        true
    }

    fn solve(
        &self,
        system: &GradientSystem<f64>,
        request: &SolveRequest,
    ) -> Result<Vec<Vec<Complex<f64>>>, SolverFailure> {
        let start = Instant::now();
        let dom = system.domain();

        let magnitude = system
            .equations()
            .iter()
            .map(|eq| eq.max_magnitude())
            .fold(0.0, f64::max);
        let tolerance = self.options.tolerance() * (1.0 + magnitude);

        let starts = self.starts(system);
        debug!(
            "multistart: {} starting points, tolerance = {:e}",
            starts.len(),
            tolerance
        );

        let outcomes: Vec<StartOutcome> = if self.options.parallel() {
            starts
                .into_par_iter()
                .map(|x| self.run_from(system, &dom, x, tolerance, request))
                .collect()
        } else {
            starts
                .into_iter()
                .map(|x| self.run_from(system, &dom, x, tolerance, request))
                .collect()
        };

        let mut roots = Vec::new();
        for outcome in outcomes {
            match outcome {
                StartOutcome::Root(x) => {
                    roots.push(x.iter().map(|xi| Complex::new(*xi, 0.0)).collect())
                }
                StartOutcome::NotConverged => {}
                StartOutcome::Expired => {
                    return Err(SolverFailure::Timeout {
                        elapsed: start.elapsed(),
                    })
                }
            }
        }

        debug!("multistart: {} converged runs", roots.len());
        Ok(roots)
    }
}
