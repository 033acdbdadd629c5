use nalgebra::{
    storage::{Storage, StorageMut},
    Dyn, IsContiguous, OMatrix, Vector,
};

use super::base::{Problem, RealField};
use crate::derivatives::Jacobian;

/// Definition of a system of equations.
///
/// ## Defining a system
///
/// A system is any type that implements [`System`] and [`Problem`] traits.
/// The gradient systems of polynomial approximants
/// ([`GradientSystem`](crate::system::GradientSystem)) are the primary
/// implementors in this crate.
///
/// ```rust
/// use polycrit::nalgebra as na;
/// use polycrit::{Domain, Problem, System};
/// use na::{Dyn, IsContiguous};
///
/// struct Circle;
///
/// impl Problem for Circle {
///     type Field = f64;
///
///     fn domain(&self) -> Domain<Self::Field> {
///         Domain::cube(vec![0.0, 0.0], 1.0).unwrap()
///     }
/// }
///
/// impl System for Circle {
///     fn eval<Sx, Srx>(
///         &self,
///         x: &na::Vector<Self::Field, Dyn, Sx>,
///         rx: &mut na::Vector<Self::Field, Dyn, Srx>,
///     ) where
///         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
///         Srx: na::storage::StorageMut<Self::Field, Dyn>,
///     {
///         rx[0] = x[0].powi(2) + x[1].powi(2) - 0.5;
///         rx[1] = x[0] - x[1];
///     }
/// }
/// ```
pub trait System: Problem {
    /// Calculates the system residuals in given point.
    fn eval<Sx, Srx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        rx: &mut Vector<Self::Field, Dyn, Srx>,
    ) where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Srx: StorageMut<Self::Field, Dyn>;

    /// Calculates the system residuals vector norm.
    ///
    /// The default implementation allocates a temporary vector for the
    /// residuals on every call.
    fn norm<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        let mut rx = x.clone_owned();
        self.eval(x, &mut rx);
        rx.norm()
    }

    /// Calculates the Jacobian matrix of the system in given point.
    ///
    /// The default implementation uses forward finite differences.
    fn jacobian<Sx, Srx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        rx: &Vector<Self::Field, Dyn, Srx>,
    ) -> OMatrix<Self::Field, Dyn, Dyn>
    where
        Self: Sized,
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Srx: Storage<Self::Field, Dyn>,
    {
        let mut x = x.clone_owned();
        let scale = self.domain().scale_or_ones();
        let jac = Jacobian::new(self, &mut x, &scale, rx, Self::Field::EPSILON_SQRT);
        jac.into_inner()
    }
}
