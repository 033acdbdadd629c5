//! Finite difference approximations of derivatives.
//!
//! These are the default differentiation services for objective functions
//! ([`Function::gradient`], [`Function::hessian`]) and systems
//! ([`System::jacobian`]) that do not provide analytic derivatives.

use std::ops::Deref;

use nalgebra::{
    storage::{Storage, StorageMut},
    ComplexField, DimName, Dyn, IsContiguous, OMatrix, OVector, Vector, U1,
};

use crate::core::{Function, Problem, RealField, System};

/// Jacobian matrix of a system.
#[derive(Debug)]
pub struct Jacobian<F: Problem> {
    jac: OMatrix<F::Field, Dyn, Dyn>,
}

impl<F: Problem> Jacobian<F> {
    /// Initializes the Jacobian matrix with zeros.
    pub fn zeros(f: &F) -> Self {
        let dim = Dyn(f.domain().dim());
        Self {
            jac: OMatrix::zeros_generic(dim, dim),
        }
    }

    /// Unwraps the underlying matrix.
    pub fn into_inner(self) -> OMatrix<F::Field, Dyn, Dyn> {
        self.jac
    }
}

impl<F: System> Jacobian<F> {
    /// Computes the Jacobian matrix of the system in given point with given
    /// scale of variables. See [`compute`](Jacobian::compute) for more
    /// details.
    pub fn new<Sx, Sscale, Srx>(
        f: &F,
        x: &mut Vector<F::Field, Dyn, Sx>,
        scale: &Vector<F::Field, Dyn, Sscale>,
        rx: &Vector<F::Field, Dyn, Srx>,
        eps_rel: F::Field,
    ) -> Self
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
        Sscale: Storage<F::Field, Dyn>,
        Srx: Storage<F::Field, Dyn>,
    {
        let mut jac = Self {
            jac: OMatrix::zeros_generic(Dyn(x.nrows()), Dyn(x.nrows())),
        };
        jac.compute(f, x, scale, rx, eps_rel);
        jac
    }

    /// Computes the Jacobian matrix of the system in given point with given
    /// scale of variables using forward differences.
    ///
    /// The parameter `x` is mutable to allow temporary mutations avoiding
    /// unnecessary allocations, but after this method ends, the content of the
    /// vector is exactly the same as before.
    ///
    /// Information about variable scale is useful for problematic cases of
    /// finite differentiation (e.g., when the value is near zero).
    pub fn compute<Sx, Sscale, Srx>(
        &mut self,
        f: &F,
        x: &mut Vector<F::Field, Dyn, Sx>,
        scale: &Vector<F::Field, Dyn, Sscale>,
        rx: &Vector<F::Field, Dyn, Srx>,
        eps_rel: F::Field,
    ) -> &mut Self
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
        Sscale: Storage<F::Field, Dyn>,
        Srx: Storage<F::Field, Dyn>,
    {
        for (j, mut col) in self.jac.column_iter_mut().enumerate() {
            let xj = x[j];
            let step = step_size(xj, scale[j], eps_rel);

            // Update the point.
            x[j] = xj + step;
            f.eval(x, &mut col);

            // Compute the derivative approximation: J[i, j] = (r(x + e_j * step_j) - r(x)) / step_j.
            col -= rx;
            col /= step;

            // Restore the original value.
            x[j] = xj;
        }

        self
    }
}

impl<F: Problem> Deref for Jacobian<F> {
    type Target = OMatrix<F::Field, Dyn, Dyn>;

    fn deref(&self) -> &Self::Target {
        &self.jac
    }
}

/// Gradient vector of a function.
#[derive(Debug)]
pub struct Gradient<F: Problem> {
    grad: OVector<F::Field, Dyn>,
}

impl<F: Problem> Gradient<F> {
    /// Initializes the gradient vector with zeros.
    pub fn zeros(f: &F) -> Self {
        Self {
            grad: OVector::zeros_generic(Dyn(f.domain().dim()), U1::name()),
        }
    }

    /// Unwraps the underlying vector.
    pub fn into_inner(self) -> OVector<F::Field, Dyn> {
        self.grad
    }
}

impl<F: Function> Gradient<F> {
    /// Computes the gradient vector of the function in given point with given
    /// scale of variables. See [`compute`](Gradient::compute) for more
    /// details.
    pub fn new<Sx, Sscale>(
        f: &F,
        x: &mut Vector<F::Field, Dyn, Sx>,
        scale: &Vector<F::Field, Dyn, Sscale>,
        eps_rel: F::Field,
    ) -> Self
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
        Sscale: Storage<F::Field, Dyn>,
    {
        let mut grad = Self {
            grad: OVector::zeros_generic(Dyn(x.nrows()), U1::name()),
        };
        grad.compute(f, x, scale, eps_rel);
        grad
    }

    /// Computes the gradient vector of the function in given point with given
    /// scale of variables using central differences.
    ///
    /// Central differences are exact for quadratic functions up to rounding,
    /// which matters near critical points where the gradient vanishes and a
    /// forward difference would be dominated by its truncation error. The
    /// relative epsilon should be around the cubic root of machine epsilon.
    ///
    /// The parameter `x` is mutable to allow temporary mutations avoiding
    /// unnecessary allocations, but after this method ends, the content of the
    /// vector is exactly the same as before.
    pub fn compute<Sx, Sscale>(
        &mut self,
        f: &F,
        x: &mut Vector<F::Field, Dyn, Sx>,
        scale: &Vector<F::Field, Dyn, Sscale>,
        eps_rel: F::Field,
    ) -> &mut Self
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
        Sscale: Storage<F::Field, Dyn>,
    {
        for i in 0..x.nrows() {
            let xi = x[i];
            let step = step_size(xi, scale[i], eps_rel).abs();

            x[i] = xi + step;
            let fx_forward = f.apply(x);

            x[i] = xi - step;
            let fx_backward = f.apply(x);

            // grad[i] = (f(x + e_i * step_i) - f(x - e_i * step_i)) / (2 step_i).
            self.grad[i] = (fx_forward - fx_backward) / (step + step);

            // Restore the original value.
            x[i] = xi;
        }

        self
    }
}

impl<F: Problem> Deref for Gradient<F> {
    type Target = OVector<F::Field, Dyn>;

    fn deref(&self) -> &Self::Target {
        &self.grad
    }
}

/// Hessian matrix of a function.
#[derive(Debug)]
pub struct Hessian<F: Problem> {
    hes: OMatrix<F::Field, Dyn, Dyn>,
    steps: OVector<F::Field, Dyn>,
    neighbors: OVector<F::Field, Dyn>,
}

impl<F: Problem> Hessian<F> {
    /// Initializes the Hessian matrix with zeros.
    pub fn zeros(f: &F) -> Self {
        let dim = Dyn(f.domain().dim());
        Self {
            hes: OMatrix::zeros_generic(dim, dim),
            steps: OVector::zeros_generic(dim, U1::name()),
            neighbors: OVector::zeros_generic(dim, U1::name()),
        }
    }

    /// Unwraps the underlying matrix.
    pub fn into_inner(self) -> OMatrix<F::Field, Dyn, Dyn> {
        self.hes
    }
}

impl<F: Function> Hessian<F> {
    /// Computes the Hessian matrix of the function in given point with given
    /// scale of variables. See [`compute`](Hessian::compute) for more details.
    pub fn new<Sx, Sscale>(
        f: &F,
        x: &mut Vector<F::Field, Dyn, Sx>,
        scale: &Vector<F::Field, Dyn, Sscale>,
        fx: F::Field,
        eps_rel: F::Field,
    ) -> Self
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
        Sscale: Storage<F::Field, Dyn>,
    {
        let dim = Dyn(x.nrows());
        let mut hes = Self {
            hes: OMatrix::zeros_generic(dim, dim),
            steps: OVector::zeros_generic(dim, U1::name()),
            neighbors: OVector::zeros_generic(dim, U1::name()),
        };
        hes.compute(f, x, scale, fx, eps_rel);
        hes
    }

    /// Computes the Hessian matrix of the function in given point with given
    /// scale of variables.
    ///
    /// The parameter `x` is mutable to allow temporary mutations avoiding
    /// unnecessary allocations, but after this method ends, the content of the
    /// vector is exactly the same as before.
    pub fn compute<Sx, Sscale>(
        &mut self,
        f: &F,
        x: &mut Vector<F::Field, Dyn, Sx>,
        scale: &Vector<F::Field, Dyn, Sscale>,
        fx: F::Field,
        eps_rel: F::Field,
    ) -> &mut Self
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
        Sscale: Storage<F::Field, Dyn>,
    {
        let n = x.nrows();

        for i in 0..n {
            let xi = x[i];
            let step = step_size(xi, scale[i], eps_rel);

            // Store the step for Hessian calculation.
            self.steps[i] = step;

            // Update the point and store the function output.
            x[i] = xi + step;
            self.neighbors[i] = f.apply(x);

            // Restore the original value.
            x[i] = xi;
        }

        for i in 0..n {
            let xi = x[i];
            let stepi = self.steps[i];

            // Prepare x_i + 2 * e_i.
            x[i] = xi + stepi + stepi;

            let fxi = f.apply(x);
            let fni = self.neighbors[i];

            x[i] = xi + stepi;

            self.hes[(i, i)] = ((fx - fni) + (fxi - fni)) / (stepi * stepi);

            for j in (i + 1)..n {
                let xj = x[j];
                let stepj = self.steps[j];

                x[j] = xj + stepj;

                let fxj = f.apply(x);
                let fnj = self.neighbors[j];

                let hij = ((fx - fni) + (fxj - fnj)) / (stepi * stepj);
                self.hes[(i, j)] = hij;
                self.hes[(j, i)] = hij;

                x[j] = xj;
            }

            x[i] = xi;
        }

        self
    }
}

impl<F: Problem> Deref for Hessian<F> {
    type Target = OMatrix<F::Field, Dyn, Dyn>;

    fn deref(&self) -> &Self::Target {
        &self.hes
    }
}

// Compute the step size. We would like to have the step as small as possible
// (to be as close to the real derivative as possible). But at the same time,
// very small step could cause F(x + e_j * step_j) ~= F(x) with very small
// number of good digits.
//
// A reasonable way to balance these competing needs is to scale each
// component by x_j itself. To avoid problems when x_j is close to zero, it is
// modified to take the typical magnitude instead.
fn step_size<T: RealField>(xj: T, scale_j: T, eps_rel: T) -> T {
    let magnitude = T::one() / scale_j;
    let step = eps_rel * xj.abs().max(magnitude) * T::one().copysign(xj);

    let step = if step == T::zero() { eps_rel } else { step };

    // Make the step exactly representable as the difference of the shifted
    // and the original point.
    (xj + step) - xj
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Domain;

    use approx::assert_abs_diff_eq;
    use nalgebra::{dmatrix, dvector};

    struct MixedVars;

    impl Problem for MixedVars {
        type Field = f64;

        fn domain(&self) -> Domain<Self::Field> {
            Domain::unconstrained(2)
        }
    }

    impl Function for MixedVars {
        fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
        where
            Sx: Storage<Self::Field, Dyn> + IsContiguous,
        {
            // A simple, arbitrary function that produces Hessian matrix with
            // non-zero corners.
            let x1 = x[0];
            let x2 = x[1];

            x1.powi(2) + x1 * x2 + x2.powi(3)
        }
    }

    struct Parabola;

    impl Problem for Parabola {
        type Field = f64;

        fn domain(&self) -> Domain<Self::Field> {
            Domain::unconstrained(2)
        }
    }

    impl System for Parabola {
        fn eval<Sx, Srx>(&self, x: &Vector<f64, Dyn, Sx>, rx: &mut Vector<f64, Dyn, Srx>)
        where
            Sx: Storage<f64, Dyn> + IsContiguous,
            Srx: StorageMut<f64, Dyn>,
        {
            rx[0] = x[0].powi(2) - x[1];
            rx[1] = 3.0 * x[0] + x[1];
        }
    }

    #[test]
    fn parabola_jacobian() {
        let mut x = dvector![2.0, 2.0];
        let scale = dvector![1.0, 1.0];
        let mut rx = dvector![0.0, 0.0];

        let r = Parabola;
        r.eval(&x, &mut rx);
        let jac = Jacobian::new(&r, &mut x, &scale, &rx, f64::EPSILON_SQRT);

        let expected = dmatrix![4.0, -1.0; 3.0, 1.0];
        assert_abs_diff_eq!(&*jac, &expected, epsilon = 10e-6);
        assert_eq!(x, dvector![2.0, 2.0]);
    }

    #[test]
    fn mixed_vars_gradient() {
        let mut x = dvector![3.0, -3.0];
        let scale = dvector![1.0, 1.0];

        let f = MixedVars;
        let grad = Gradient::new(&f, &mut x, &scale, f64::EPSILON_CBRT);

        let expected = dvector![3.0, 30.0];
        assert_abs_diff_eq!(&*grad, &expected, epsilon = 10e-6);
    }

    #[test]
    fn gradient_vanishes_at_stationary_point() {
        let mut x = dvector![0.0, 0.0];
        let scale = dvector![1.0, 1.0];

        let f = MixedVars;
        let grad = Gradient::new(&f, &mut x, &scale, f64::EPSILON_CBRT);

        assert_abs_diff_eq!(&*grad, &dvector![0.0, 0.0], epsilon = 1e-10);
    }

    #[test]
    fn mixed_vars_hessian() {
        let mut x = dvector![3.0, -3.0];
        let scale = dvector![1.0, 1.0];

        let f = MixedVars;
        let fx = f.apply(&x);
        let hes = Hessian::new(&f, &mut x, &scale, fx, f64::EPSILON_CBRT);

        let expected = dmatrix![2.0, 1.0; 1.0, -18.0];
        assert_abs_diff_eq!(&*hes, &expected, epsilon = 10e-3);
    }

    #[test]
    fn default_trait_derivatives() {
        let f = MixedVars;
        let x = dvector![1.0, 2.0];

        let mut grad = dvector![0.0, 0.0];
        f.gradient(&x, &mut grad);
        assert_abs_diff_eq!(grad, dvector![4.0, 13.0], epsilon = 10e-6);

        let hes = f.hessian(&x);
        assert_abs_diff_eq!(hes, dmatrix![2.0, 1.0; 1.0, 12.0], epsilon = 10e-3);
    }
}
