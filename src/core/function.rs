use nalgebra::{
    storage::{Storage, StorageMut},
    Dyn, IsContiguous, OMatrix, Vector,
};

use super::base::{Problem, RealField};
use crate::derivatives::{Gradient, Hessian};

/// Definition of an objective function.
///
/// ## Defining a function
///
/// A function is any type that implements [`Function`] and [`Problem`] traits.
/// Only the function value is required. Gradient and Hessian are computed by
/// [finite differences](crate::derivatives) unless the implementation provides
/// them analytically by overriding [`Function::gradient`] and
/// [`Function::hessian`].
///
/// ```rust
/// use polycrit::nalgebra as na;
/// use polycrit::{Domain, Function, Problem};
/// use na::{Dyn, IsContiguous};
///
/// struct Himmelblau;
///
/// impl Problem for Himmelblau {
///     type Field = f64;
///
///     fn domain(&self) -> Domain<Self::Field> {
///         Domain::cube(vec![0.0, 0.0], 5.0).unwrap()
///     }
/// }
///
/// impl Function for Himmelblau {
///     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
///     where
///         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
///     {
///         (x[0].powi(2) + x[1] - 11.0).powi(2) + (x[0] + x[1].powi(2) - 7.0).powi(2)
///     }
/// }
/// ```
///
/// Functions must be deterministic: the approximation samples the function on
/// a grid and the refinement evaluates it again in the same points.
pub trait Function: Problem {
    /// Calculates the function value in given point.
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous;

    /// Calculates the gradient of the function in given point.
    ///
    /// The default implementation uses central finite differences.
    fn gradient<Sx, Sg>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        grad: &mut Vector<Self::Field, Dyn, Sg>,
    ) where
        Self: Sized,
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sg: StorageMut<Self::Field, Dyn>,
    {
        let mut x = x.clone_owned();
        let scale = self.domain().scale_or_ones();
        let g = Gradient::new(self, &mut x, &scale, Self::Field::EPSILON_CBRT);
        grad.copy_from(&*g);
    }

    /// Calculates the Hessian matrix of the function in given point.
    ///
    /// The default implementation uses finite differences.
    fn hessian<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> OMatrix<Self::Field, Dyn, Dyn>
    where
        Self: Sized,
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        let mut x = x.clone_owned();
        let scale = self.domain().scale_or_ones();
        let fx = self.apply(&x);
        let hes = Hessian::new(self, &mut x, &scale, fx, Self::Field::EPSILON_CBRT);
        hes.into_inner()
    }
}
