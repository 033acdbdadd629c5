use nalgebra::{storage::StorageMut, Dyn, IsContiguous, Vector};

use super::{domain::Domain, system::System};

/// Interface of an iterative solver of systems of equations.
///
/// A solver is an iterative algorithm which takes a point _x_ and computes the
/// next step in the solving process. Repeated calls to the next step should
/// eventually converge into a solution _x'_ in successful cases. The
/// reference [polynomial system solver](crate::solve::MultistartSolver) runs
/// a solver of this kind from many starting points.
///
/// ## Implementing a solver
///
/// Here is an implementation of a damped fixed-point "solver" for systems
/// whose residual is a contraction.
///
/// ```rust
/// use polycrit::nalgebra as na;
/// use polycrit::{Domain, Solver, System};
/// use na::{storage::StorageMut, Dyn, IsContiguous, Vector};
///
/// struct Damped {
///     factor: f64,
/// }
///
/// impl<R: System<Field = f64>> Solver<R> for Damped {
///     const NAME: &'static str = "Damped";
///     type Error = std::convert::Infallible;
///
///     fn solve_next<Sx, Srx>(
///         &mut self,
///         r: &R,
///         dom: &Domain<f64>,
///         x: &mut Vector<f64, Dyn, Sx>,
///         rx: &mut Vector<f64, Dyn, Srx>,
///     ) -> Result<(), Self::Error>
///     where
///         Sx: StorageMut<f64, Dyn> + IsContiguous,
///         Srx: StorageMut<f64, Dyn>,
///     {
///         r.eval(x, rx);
///         x.axpy(-self.factor, rx, 1.0);
///         dom.project(x);
///
///         // We must compute the residuals of the new point.
///         r.eval(x, rx);
///
///         Ok(())
///     }
/// }
/// ```
pub trait Solver<R: System> {
    /// Name of the solver.
    const NAME: &'static str;

    /// Error while computing the next step.
    type Error;

    /// Computes the next step in the solving process.
    ///
    /// The value of `x` is the current point. After the method returns, `x`
    /// should hold the variable values of the performed step and `rx` _must_
    /// contain residuals of that step as computed by [`System::eval`].
    ///
    /// The implementations _can_ assume that subsequent calls to `solve_next`
    /// pass the value of `x` as was returned in the previous iteration.
    fn solve_next<Sx, Srx>(
        &mut self,
        r: &R,
        dom: &Domain<R::Field>,
        x: &mut Vector<R::Field, Dyn, Sx>,
        rx: &mut Vector<R::Field, Dyn, Srx>,
    ) -> Result<(), Self::Error>
    where
        Sx: StorageMut<R::Field, Dyn> + IsContiguous,
        Srx: StorageMut<R::Field, Dyn>;
}
