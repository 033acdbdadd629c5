//! Local refinement of critical point candidates.
//!
//! Candidates are critical points of the approximant, not of the objective.
//! Each one is refined by the [BFGS](crate::algo::Bfgs) method started in the
//! candidate and run against the objective itself. The refinement is not
//! restricted to the search box, the final position is only reported.
//!
//! The gradient tolerance is relative to the magnitude of the objective in
//! the candidate,
//!
//! ```text
//! || grad f(x) || <= g_tol * max(|f(x0)|, floor)
//! ```
//!
//! so that it is tight near zero and loose for large values. Running out of
//! iterations is not an error, the point is reported as not converged.

use getset::{CopyGetters, Setters};
use log::debug;
use nalgebra::DVector;
use rayon::prelude::*;

use crate::{
    algo::Bfgs,
    core::{Domain, Function, Optimizer},
    solve::CriticalPointCandidate,
};

/// Options for the local refinement.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct RefineOptions {
    /// Gradient norm tolerance relative to the function magnitude. Default:
    /// `1e-6`.
    g_tol: f64,
    /// Lower bound of the function magnitude in the tolerance. Default:
    /// `1e-2`.
    floor: f64,
    /// Relative decrease of the function value in a single iteration that is
    /// considered a convergence. Default: `1e-14`.
    f_tol: f64,
    /// Maximum number of iterations. Default: `200`.
    max_iters: usize,
    /// Whether candidates are refined in parallel. Default: `true`.
    parallel: bool,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            g_tol: 1e-6,
            floor: 1e-2,
            f_tol: 1e-14,
            max_iters: 200,
            parallel: true,
        }
    }
}

/// Candidate refined against the objective.
#[derive(Debug, Clone)]
pub struct RefinedCriticalPoint {
    /// The candidate the refinement started from.
    pub candidate: CriticalPointCandidate,
    /// Refined point.
    pub point: DVector<f64>,
    /// Objective value in the refined point.
    pub value: f64,
    /// Gradient norm in the refined point.
    pub gradient_norm: f64,
    /// Distance between the candidate and the refined point.
    pub distance: f64,
    /// Whether the stopping criteria were met.
    pub converged: bool,
    /// Number of performed iterations.
    pub iterations: usize,
    /// Whether the refined point lies in the search domain.
    pub in_domain: bool,
}

/// Refines a single candidate.
pub fn refine<F>(
    f: &F,
    domain: &Domain<f64>,
    candidate: &CriticalPointCandidate,
    options: &RefineOptions,
) -> RefinedCriticalPoint
where
    F: Function<Field = f64>,
{
    let n = candidate.point.len();
    let dom = Domain::unconstrained(n);

    let mut x = candidate.point.clone();
    let mut grad = DVector::zeros(n);

    let f0 = f.apply(&x);
    f.gradient(&x, &mut grad);

    let floor = options.floor();
    let tolerance = options.g_tol() * f0.abs().max(floor);

    let mut fx = f0;
    let mut converged = f0.is_finite() && grad.norm() <= tolerance;
    let mut iterations = 0;

    if f0.is_finite() {
        let mut optimizer = Bfgs::new(f, &dom);

        while !converged && iterations < options.max_iters() {
            match optimizer.opt_next(f, &dom, &mut x) {
                Ok(fx_next) => {
                    iterations += 1;

                    let decrease = fx - fx_next;
                    fx = fx_next;

                    if optimizer.gradient_norm() <= tolerance
                        || decrease.abs() <= options.f_tol() * fx.abs().max(floor)
                    {
                        converged = true;
                    }
                }
                Err(error) => {
                    debug!("refinement stopped after {} iterations: {}", iterations, error);
                    break;
                }
            }
        }
    }

    f.gradient(&x, &mut grad);
    let gradient_norm = grad.norm();
    converged = converged || gradient_norm <= tolerance;

    if !converged {
        debug!(
            "refinement from {:?} did not converge (|| grad || = {:e}, tolerance = {:e})",
            candidate.point.as_slice(),
            gradient_norm,
            tolerance
        );
    }

    RefinedCriticalPoint {
        distance: (&x - &candidate.point).norm(),
        in_domain: domain.contains(&x, 0.0),
        value: fx,
        gradient_norm,
        converged,
        iterations,
        point: x,
        candidate: candidate.clone(),
    }
}

/// Refines all candidates, in parallel if enabled in the options.
///
/// The order of the result corresponds to the order of the candidates.
pub fn refine_all<F>(
    f: &F,
    domain: &Domain<f64>,
    candidates: &[CriticalPointCandidate],
    options: &RefineOptions,
) -> Vec<RefinedCriticalPoint>
where
    F: Function<Field = f64> + Sync,
{
    if options.parallel() {
        candidates
            .par_iter()
            .map(|c| refine(f, domain, c, options))
            .collect()
    } else {
        candidates
            .iter()
            .map(|c| refine(f, domain, c, options))
            .collect()
    }
}
