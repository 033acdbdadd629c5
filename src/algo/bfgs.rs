//! BFGS quasi-Newton method for unconstrained minimization.
//!
//! The method maintains an approximation `H` of the inverse Hessian matrix,
//! takes the direction `p = -H grad f(x)` and finds the step length by
//! backtracking line search with Armijo condition. After every step, `H` is
//! updated by the BFGS formula
//!
//! ```text
//! H+ = (I - rho s y^T) H (I - rho y s^T) + rho s s^T,   rho = 1 / (y^T s)
//! ```
//!
//! where `s` is the step and `y` the change of the gradient. The update is
//! skipped when the curvature condition `y^T s > 0` does not hold, which keeps
//! `H` positive definite.
//!
//! Gradients are taken from [`Function::gradient`], so functions with analytic
//! gradients are minimized without finite differences.
//!
//! # References
//!
//! \[1\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)

use getset::{CopyGetters, Setters};
use log::debug;
use nalgebra::{
    convert, storage::StorageMut, ComplexField, DimName, Dyn, IsContiguous, OMatrix, OVector,
    Vector, U1,
};
use thiserror::Error;

use crate::core::{Domain, Function, Optimizer, Problem};

/// Options for [`Bfgs`] optimizer.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct BfgsOptions<P: Problem> {
    /// Sufficient decrease parameter of the Armijo condition. Default: `1e-4`.
    armijo: P::Field,
    /// Factor by which the step length is shortened in line search. Default:
    /// `0.5`.
    backtrack_factor: P::Field,
    /// Maximum number of step length reductions. Default: `50`.
    max_backtracks: usize,
}

impl<P: Problem> Default for BfgsOptions<P> {
    fn default() -> Self {
        Self {
            armijo: convert(1e-4),
            backtrack_factor: convert(0.5),
            max_backtracks: 50,
        }
    }
}

/// BFGS optimizer.
///
/// See [module](self) documentation for more details.
pub struct Bfgs<P: Problem> {
    options: BfgsOptions<P>,
    h_inv: OMatrix<P::Field, Dyn, Dyn>,
    grad: OVector<P::Field, Dyn>,
    grad_trial: OVector<P::Field, Dyn>,
    p: OVector<P::Field, Dyn>,
    s: OVector<P::Field, Dyn>,
    y: OVector<P::Field, Dyn>,
    h_y: OVector<P::Field, Dyn>,
    x_trial: OVector<P::Field, Dyn>,
    fx: Option<P::Field>,
    iter: usize,
}

impl<P: Problem> Bfgs<P> {
    /// Initializes BFGS optimizer with default options.
    pub fn new(p: &P, dom: &Domain<P::Field>) -> Self {
        Self::with_options(p, dom, BfgsOptions::default())
    }

    /// Initializes BFGS optimizer with given options.
    pub fn with_options(_: &P, dom: &Domain<P::Field>, options: BfgsOptions<P>) -> Self {
        let dim = Dyn(dom.dim());

        Self {
            options,
            h_inv: OMatrix::identity_generic(dim, dim),
            grad: OVector::zeros_generic(dim, U1::name()),
            grad_trial: OVector::zeros_generic(dim, U1::name()),
            p: OVector::zeros_generic(dim, U1::name()),
            s: OVector::zeros_generic(dim, U1::name()),
            y: OVector::zeros_generic(dim, U1::name()),
            h_y: OVector::zeros_generic(dim, U1::name()),
            x_trial: OVector::zeros_generic(dim, U1::name()),
            fx: None,
            iter: 0,
        }
    }

    /// Resets the internal state of the optimizer.
    pub fn reset(&mut self) {
        self.h_inv.fill_with_identity();
        self.fx = None;
        self.iter = 0;
    }

    /// Gets the gradient norm in the current point.
    ///
    /// Zero is returned before the first iteration.
    pub fn gradient_norm(&self) -> P::Field {
        self.grad.norm()
    }

    /// Gets the number of performed iterations.
    pub fn iter(&self) -> usize {
        self.iter
    }
}

/// Error returned from [`Bfgs`] optimizer.
#[derive(Debug, Error)]
pub enum BfgsError {
    /// Line search could not find a point with sufficient decrease.
    #[error("line search failed to find sufficient decrease")]
    LineSearchFailed,
    /// Function value or gradient is not finite.
    #[error("function value or gradient is not finite")]
    NotFinite,
}

impl<F: Function> Optimizer<F> for Bfgs<F> {
    const NAME: &'static str = "BFGS";

    type Error = BfgsError;

    fn opt_next<Sx>(
        &mut self,
        f: &F,
        dom: &Domain<F::Field>,
        x: &mut Vector<F::Field, Dyn, Sx>,
    ) -> Result<F::Field, Self::Error>
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
    {
        let BfgsOptions {
            armijo,
            backtrack_factor,
            max_backtracks,
        } = self.options;

        let Self {
            h_inv,
            grad,
            grad_trial,
            p,
            s,
            y,
            h_y,
            x_trial,
            fx,
            iter,
            ..
        } = self;

        let zero: F::Field = convert(0.0);
        let one: F::Field = convert(1.0);

        let fx_cur = match *fx {
            Some(fx) => fx,
            None => {
                let fx0 = f.apply(x);
                f.gradient(x, grad);

                if !fx0.is_finite() || grad.iter().any(|g| !g.is_finite()) {
                    return Err(BfgsError::NotFinite);
                }

                *fx = Some(fx0);
                fx0
            }
        };

        if grad.norm() == zero {
            debug!("gradient vanished, nothing to do");
            return Ok(fx_cur);
        }

        // Direction p = -H grad. Fall back to steepest descent if it is not a
        // descent direction.
        h_inv.mul_to(grad, p);
        p.neg_mut();

        let mut slope = grad.dot(p);
        if slope >= zero {
            debug!("not a descent direction, resetting the inverse Hessian");
            h_inv.fill_with_identity();
            p.copy_from(grad);
            p.neg_mut();
            slope = grad.dot(p);
        }

        let mut alpha = one;
        let mut backtracks = 0;

        let fx_trial = loop {
            x_trial.copy_from(x);
            x_trial.axpy(alpha, p, one);
            dom.project(x_trial);

            let fx_trial = f.apply(x_trial);

            // Armijo condition f(x + alpha p) <= f(x) + c alpha grad^T p.
            if fx_trial.is_finite() && fx_trial <= fx_cur + armijo * alpha * slope {
                break fx_trial;
            }

            backtracks += 1;
            if backtracks > max_backtracks {
                debug!("line search failed after {} backtracks", max_backtracks);
                return Err(BfgsError::LineSearchFailed);
            }

            alpha *= backtrack_factor;
        };

        f.gradient(x_trial, grad_trial);
        if grad_trial.iter().any(|g| !g.is_finite()) {
            return Err(BfgsError::NotFinite);
        }

        x_trial.sub_to(x, s);
        grad_trial.sub_to(grad, y);

        let sy = s.dot(y);

        if sy > zero {
            if *iter == 0 {
                // Scale the initial approximation by y^T s / y^T y.
                let scale = sy / y.norm_squared();
                h_inv.fill_with_identity();
                *h_inv *= scale;
            }

            let rho = one / sy;
            h_inv.mul_to(y, h_y);
            let y_h_y = y.dot(h_y);

            // H+ = H - rho (H y s^T + s y^T H) + (rho^2 y^T H y + rho) s s^T.
            h_inv.ger(-rho, h_y, s, one);
            h_inv.ger(-rho, s, h_y, one);
            h_inv.ger(rho * rho * y_h_y + rho, s, s, one);
        } else {
            debug!("curvature condition violated (s^T y = {}), skipping update", sy);
        }

        x.copy_from(x_trial);
        grad.copy_from(grad_trial);
        *fx = Some(fx_trial);
        *iter += 1;

        debug!(
            "step accepted (alpha = {}, backtracks = {}), f = {}, || grad || = {}",
            alpha,
            backtracks,
            fx_trial,
            grad.norm()
        );

        Ok(fx_trial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::*;

    #[test]
    fn sphere() {
        let f = Sphere::new(3);
        let dom = Domain::unconstrained(3);

        for x in f.initials() {
            let optimizer = Bfgs::new(&f, &dom);
            let x = optimize(&f, &dom, optimizer, x, 0.0, 25, 1e-12).unwrap();
            assert!(x.norm() < 1e-5);
        }
    }

    #[test]
    fn rosenbrock() {
        let f = ExtendedRosenbrock::new(2);
        let dom = Domain::unconstrained(2);

        for x in f.initials() {
            let optimizer = Bfgs::new(&f, &dom);
            optimize(&f, &dom, optimizer, x, 0.0, 500, 1e-9).unwrap();
        }
    }

    #[test]
    fn gradient_norm_decreases_to_zero() {
        let f = Himmelblau::new();
        let dom = Domain::unconstrained(2);

        let mut optimizer = Bfgs::new(&f, &dom);
        let mut x = nalgebra::dvector![2.8, 2.2];

        for _ in 0..100 {
            if optimizer.opt_next(&f, &dom, &mut x).is_err() || optimizer.gradient_norm() < 1e-8 {
                break;
            }
        }

        assert!(optimizer.gradient_norm() < 1e-6);
        assert!((x[0] - 3.0).abs() < 1e-6 && (x[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn stationary_start() {
        let f = Sphere::new(2);
        let dom = Domain::unconstrained(2);

        let mut optimizer = Bfgs::new(&f, &dom);
        let mut x = nalgebra::dvector![0.0, 0.0];

        assert_eq!(optimizer.opt_next(&f, &dom, &mut x).unwrap(), 0.0);
        assert_eq!(optimizer.iter(), 0);
    }
}
