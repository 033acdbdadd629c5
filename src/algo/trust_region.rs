//! Trust region method for square systems of equations.
//!
//! The method combines [Powell's dogleg
//! step](https://en.wikipedia.org/wiki/Powell%27s_dog_leg_method) with a
//! [Levenberg-Marquardt](https://en.wikipedia.org/wiki/Levenberg%E2%80%93Marquardt_algorithm)
//! step used when the Jacobian matrix is singular and the Newton direction is
//! not available. The Jacobian matrix is taken from [`System::jacobian`], so
//! systems with analytic derivatives (such as gradient systems of
//! polynomials) are solved without finite differences.
//!
//! # References
//!
//! \[1\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)
//!
//! \[2\] [Methods for Non-Linear Least Squares
//! Problems](https://api.semanticscholar.org/CorpusID:64217935)
//!
//! \[3\] [A Modified Two Steps Levenberg-Marquardt Method for Nonlinear
//! Equations](https://www.sciencedirect.com/science/article/pii/S0377042715002666)

use getset::{CopyGetters, Setters};
use log::debug;
use nalgebra::{
    convert, storage::StorageMut, ComplexField, DimName, Dyn, IsContiguous, OMatrix, OVector,
    RealField, Vector, U1,
};
use thiserror::Error;

use crate::core::{Domain, Problem, RealField as _, Solver, System};

/// Specification for initial value of trust region size.
#[derive(Debug, Clone, Copy)]
pub enum DeltaInit<S> {
    /// Fixed value.
    Fixed(S),
    /// Estimated from Jacobian matrix in the initial point.
    Estimated,
}

/// Options for [`TrustRegion`] solver.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct TrustRegionOptions<P: Problem> {
    /// Minimum allowed trust region size. Default: `f64::EPSILON.sqrt()`.
    delta_min: P::Field,
    /// Maximum allowed trust region size. Default: `1e9`.
    delta_max: P::Field,
    /// Initial trust region size. Default: estimated (see [`DeltaInit`]).
    delta_init: DeltaInit<P::Field>,
    /// Minimum scaling factor for lambda in Levenberg-Marquardt step. Default:
    /// `1e-10`.
    mu_min: P::Field,
    /// Threshold for gain ratio to shrink trust region size if lower. Default:
    /// `0.25`.
    shrink_thresh: P::Field,
    /// Threshold for gain ratio to expand trust region size if higher. Default:
    /// `0.75`.
    expand_thresh: P::Field,
    /// Threshold for gain ratio that needs to be exceeded to accept the
    /// calculated step. Default: `0.0001`.
    accept_thresh: P::Field,
    /// Number of step rejections that are allowed to happen before returning
    /// [`TrustRegionError::NoProgress`] error. Default: `10`.
    rejections_thresh: usize,
    /// Determines whether steps that increase the error can be accepted.
    /// Default: `true`.
    allow_ascent: bool,
}

impl<P: Problem> Default for TrustRegionOptions<P> {
    fn default() -> Self {
        Self {
            delta_min: P::Field::EPSILON_SQRT,
            delta_max: convert(1e9),
            delta_init: DeltaInit::Estimated,
            mu_min: convert(1e-10),
            shrink_thresh: convert(0.25),
            expand_thresh: convert(0.75),
            accept_thresh: convert(0.0001),
            rejections_thresh: 10,
            allow_ascent: true,
        }
    }
}

/// Trust region solver.
///
/// See [module](self) documentation for more details.
pub struct TrustRegion<P: Problem> {
    options: TrustRegionOptions<P>,
    delta: P::Field,
    mu: P::Field,
    scale: OVector<P::Field, Dyn>,
    jac: OMatrix<P::Field, Dyn, Dyn>,
    q_tr_rx_neg: OVector<P::Field, Dyn>,
    newton: OVector<P::Field, Dyn>,
    grad_neg: OVector<P::Field, Dyn>,
    cauchy: OVector<P::Field, Dyn>,
    jac_tr_jac: OMatrix<P::Field, Dyn, Dyn>,
    p: OVector<P::Field, Dyn>,
    temp: OVector<P::Field, Dyn>,
    iter: usize,
    rejections_cnt: usize,
}

impl<P: Problem> TrustRegion<P> {
    /// Initializes trust region solver with default options.
    pub fn new(p: &P, dom: &Domain<P::Field>) -> Self {
        Self::with_options(p, dom, TrustRegionOptions::default())
    }

    /// Initializes trust region solver with given options.
    pub fn with_options(_: &P, dom: &Domain<P::Field>, options: TrustRegionOptions<P>) -> Self {
        let dim = Dyn(dom.dim());

        Self {
            delta: initial_delta(&options),
            options,
            mu: convert(0.5),
            scale: dom.scale_or_ones(),
            jac: OMatrix::zeros_generic(dim, dim),
            q_tr_rx_neg: OVector::zeros_generic(dim, U1::name()),
            newton: OVector::zeros_generic(dim, U1::name()),
            grad_neg: OVector::zeros_generic(dim, U1::name()),
            cauchy: OVector::zeros_generic(dim, U1::name()),
            jac_tr_jac: OMatrix::zeros_generic(dim, dim),
            p: OVector::zeros_generic(dim, U1::name()),
            temp: OVector::zeros_generic(dim, U1::name()),
            iter: 1,
            rejections_cnt: 0,
        }
    }

    /// Resets the internal state of the solver.
    ///
    /// This is needed when the solver is reused from a different initial
    /// point.
    pub fn reset(&mut self) {
        self.delta = initial_delta(&self.options);
        self.mu = convert(0.5);
        self.iter = 1;
        self.rejections_cnt = 0;
    }
}

// Zero is recognized in `solve_next` as a request for estimation.
fn initial_delta<P: Problem>(options: &TrustRegionOptions<P>) -> P::Field {
    match options.delta_init {
        DeltaInit::Fixed(fixed) => fixed,
        DeltaInit::Estimated => convert(0.0),
    }
}

/// Error returned from [`TrustRegion`] solver.
#[derive(Debug, Error)]
pub enum TrustRegionError {
    /// Could not take any valid step.
    #[error("neither newton nor steepest descent step can be taken from the point")]
    NoValidStep,
    /// Maximum number of step rejections exceeded.
    #[error("cannot make progress")]
    NoProgress,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StepType {
    FullNewton,
    ScaledNewton,
    LevenbergMarquardt,
    ScaledCauchy,
    Dogleg,
}

impl<P: Problem> TrustRegion<P> {
    /// Computes the step `p` for the current Jacobian matrix and residuals.
    fn compute_step<Srx>(
        &mut self,
        dim: usize,
        rx: &Vector<P::Field, Dyn, Srx>,
        rx_norm: P::Field,
    ) -> Result<StepType, TrustRegionError>
    where
        Srx: nalgebra::storage::Storage<P::Field, Dyn>,
    {
        let one: P::Field = convert(1.0);
        let zero: P::Field = convert(0.0);

        let Self {
            delta,
            mu,
            scale,
            jac,
            q_tr_rx_neg,
            newton,
            grad_neg,
            cauchy,
            jac_tr_jac,
            p,
            temp,
            iter,
            ..
        } = self;

        // J = QR, the Newton step solves R newton = -Q^T r(x).
        let (qr_q, qr_r) = jac.clone_owned().qr().unpack();
        qr_q.tr_mul_to(rx, q_tr_rx_neg);
        q_tr_rx_neg.neg_mut();

        newton.copy_from(q_tr_rx_neg);
        let is_newton_valid = qr_r.solve_upper_triangular_mut(newton);

        if !is_newton_valid {
            debug!("singular Jacobian, Newton step is not available");
        }

        temp.copy_from(newton);
        temp.component_mul_assign(scale);
        let newton_scaled_norm = temp.norm();

        if is_newton_valid && newton_scaled_norm <= *delta {
            p.copy_from(newton);
            debug!("take full Newton: {:?}", p.as_slice());
            return Ok(StepType::FullNewton);
        }

        // -grad 1/2 ||r||^2 = -J^T r(x) = -R^T Q^T r(x).
        qr_r.tr_mul_to(q_tr_rx_neg, grad_neg);

        if grad_neg.norm() == zero {
            if !is_newton_valid {
                return Err(TrustRegionError::NoValidStep);
            }

            p.copy_from(newton);
            *p *= *delta / newton_scaled_norm;
            debug!("take scaled Newton: {:?}", p.as_slice());
            return Ok(StepType::ScaledNewton);
        }

        // Steepest descent in the scaled space, g = -D^(-2) grad.
        cauchy.copy_from(scale);
        cauchy.apply(|s| *s = one / (*s * *s));
        cauchy.component_mul_assign(grad_neg);

        // Cauchy point is tau g with tau = -grad^T g / ||J g||^2.
        jac.mul_to(cauchy, temp);
        let tau = grad_neg.dot(cauchy) / temp.norm_squared();
        *cauchy *= tau;

        temp.copy_from(scale);
        temp.component_mul_assign(cauchy);
        let cauchy_scaled_norm = temp.norm();

        if cauchy_scaled_norm >= *delta {
            p.copy_from(cauchy);
            *p *= *delta / cauchy_scaled_norm;
            debug!("take scaled Cauchy: {:?}", p.as_slice());
            return Ok(StepType::ScaledCauchy);
        }

        if is_newton_valid {
            // Find alpha in (0, 1) with ||D (cauchy + alpha (newton - cauchy))|| = delta,
            // that is, the positive root of a alpha^2 + 2b alpha + c = 0 with
            //
            //     a = ||D (newton - cauchy)||^2
            //     b = cauchy^T D^2 (newton - cauchy)
            //     c = ||D cauchy||^2 - delta^2 < 0
            newton.sub_to(cauchy, p);
            p.component_mul_assign(scale);
            let a = p.norm_squared();

            temp.copy_from(p);
            temp.component_mul_assign(scale);
            let b = cauchy.dot(temp);

            let c_neg = *delta * *delta - cauchy_scaled_norm * cauchy_scaled_norm;

            #[allow(clippy::suspicious_operation_groupings)]
            let d = (b * b + a * c_neg).sqrt();
            // Muller's formula avoids cancellation for positive b.
            let alpha = if b <= zero {
                (-b + d) / a
            } else {
                c_neg / (b + d)
            };

            newton.sub_to(cauchy, p);
            *p *= alpha;
            *p += &*cauchy;
            debug!("take dogleg (alpha = {}): {:?}", alpha, p.as_slice());
            return Ok(StepType::Dogleg);
        }

        // Levenberg-Marquardt step (J^T J + lambda I) p = -grad with
        // lambda = mu ||r||^d, d = 1 / ||r|| for large residuals and
        // 1 + 1 / k near the solution.
        let d = if rx_norm >= one {
            one / rx_norm
        } else {
            one + one / convert(*iter as f64)
        };
        let lambda = *mu * rx_norm.powf(d);

        jac.tr_mul_to(jac, jac_tr_jac);
        for i in 0..dim {
            jac_tr_jac[(i, i)] += lambda;
        }

        p.copy_from(grad_neg);
        if !jac_tr_jac.clone_owned().qr().solve_mut(p) {
            debug!("Levenberg-Marquardt matrix is singular (lambda = {})", lambda);
        }

        temp.copy_from(scale);
        temp.component_mul_assign(p);
        let p_scaled_norm = temp.norm();

        if p_scaled_norm > *delta {
            *p *= *delta / p_scaled_norm;
        }

        debug!(
            "take Levenberg-Marquardt (lambda = {}): {:?}",
            lambda,
            p.as_slice()
        );
        Ok(StepType::LevenbergMarquardt)
    }
}

impl<R: System> Solver<R> for TrustRegion<R> {
    const NAME: &'static str = "Trust-region";

    type Error = TrustRegionError;

    fn solve_next<Sx, Srx>(
        &mut self,
        r: &R,
        dom: &Domain<R::Field>,
        x: &mut Vector<R::Field, Dyn, Sx>,
        rx: &mut Vector<R::Field, Dyn, Srx>,
    ) -> Result<(), Self::Error>
    where
        Sx: StorageMut<R::Field, Dyn> + IsContiguous,
        Srx: StorageMut<R::Field, Dyn>,
    {
        let TrustRegionOptions {
            delta_min,
            delta_max,
            mu_min,
            shrink_thresh,
            expand_thresh,
            accept_thresh,
            rejections_thresh,
            allow_ascent,
            ..
        } = self.options;

        let zero: R::Field = convert(0.0);

        r.eval(x, rx);
        let jac = r.jacobian(x, rx);
        self.jac.copy_from(&jac);

        let rx_norm = rx.norm();

        if self.delta == zero {
            // Initial delta is K ||diag(d) x|| (or K if zero) with K = 100 and
            // d_j the norm of the j-th Jacobian column (or 1 if zero).
            for (j, col) in self.jac.column_iter().enumerate() {
                let norm = col.norm();
                self.temp[j] = if norm == zero { convert(1.0) } else { norm };
            }
            self.temp.component_mul_assign(x);

            let factor = convert(100.0);
            self.delta = self.temp.norm() * factor;

            if self.delta == zero {
                self.delta = factor;
            }
        }

        let step_type = self.compute_step(dom.dim(), rx, rx_norm)?;

        let Self {
            delta,
            mu,
            scale,
            jac,
            newton,
            cauchy,
            p,
            temp,
            iter,
            rejections_cnt,
            ..
        } = self;

        // Newton and Cauchy buffers are free now.
        let x_trial = newton;
        let rx_trial = cauchy;

        x.add_to(p, x_trial);

        if dom.project(x_trial) {
            debug!("trial point is not feasible, projecting into the domain");
            x_trial.sub_to(x, p);
        }

        r.eval(x_trial, rx_trial);
        let is_trial_valid = rx_trial.iter().all(|rix| rix.is_finite());
        let rx_trial_norm = rx_trial.norm();

        let gain_ratio = if is_trial_valid {
            jac.mul_to(p, temp);
            *temp += &*rx;
            let predicted = rx_norm - temp.norm();

            let deny = if allow_ascent {
                predicted == zero
            } else {
                predicted <= zero
            };

            if deny {
                debug!("predicted gain = {}, step denied", predicted);
                zero
            } else {
                let actual = rx_norm - rx_trial_norm;
                let gain_ratio = actual / predicted;
                debug!("gain ratio = {} / {} = {}", actual, predicted, gain_ratio);
                gain_ratio
            }
        } else {
            debug!("trial residuals are not finite, gain ratio = 0");
            zero
        };

        if gain_ratio > accept_thresh {
            x.copy_from(x_trial);
            rx.copy_from(rx_trial);
            debug!("step accepted, || rx || = {}", rx_trial_norm);

            *rejections_cnt = 0;
        } else {
            *rejections_cnt += 1;
            debug!("step rejected ({} in a row)", rejections_cnt);

            if *rejections_cnt == rejections_thresh {
                return Err(TrustRegionError::NoProgress);
            }
        }

        p.component_mul_assign(scale);
        let p_scaled_norm = p.norm();

        let delta_old = *delta;
        if gain_ratio < shrink_thresh {
            *delta = (delta_old * convert(0.25))
                .min(p_scaled_norm * convert(0.25))
                .max(delta_min);
            debug!("shrink delta from {} to {}", delta_old, *delta);
        } else if gain_ratio > expand_thresh {
            *delta = (delta_old * convert(2.0))
                .max(p_scaled_norm * convert(3.0))
                .min(delta_max);
            debug!("expand delta from {} to {}", delta_old, *delta);
        }

        // mu moves opposite to delta: good steps trust the Jacobian more.
        if step_type == StepType::LevenbergMarquardt {
            let mu_old = *mu;

            if gain_ratio < shrink_thresh {
                *mu = mu_old * convert(4.0);
            } else if gain_ratio > expand_thresh {
                *mu = (mu_old * convert(0.25)).max(mu_min);
            }

            debug!("mu updated from {} to {}", mu_old, *mu);
        }

        *iter += 1;

        Ok(())
    }
}
