use nalgebra::{storage::StorageMut, Dyn, IsContiguous, Vector};

use super::{domain::Domain, function::Function};

/// Interface of a local optimizer.
///
/// An optimizer is an iterative algorithm which takes a point _x_ and computes
/// the next step in the optimization process. Repeated calls to the next step
/// should eventually converge into a local minimum _x'_. The
/// [refinement](crate::refine) of critical point candidates is driven through
/// this trait.
///
/// ## Implementing an optimizer
///
/// Here is an implementation of a plain gradient descent with fixed step
/// length.
///
/// ```rust
/// use polycrit::nalgebra as na;
/// use polycrit::{Domain, Function, Optimizer};
/// use na::{storage::StorageMut, Dyn, IsContiguous, Vector};
///
/// struct GradientDescent {
///     step: f64,
/// }
///
/// impl<F: Function<Field = f64>> Optimizer<F> for GradientDescent {
///     const NAME: &'static str = "Gradient descent";
///     type Error = std::convert::Infallible;
///
///     fn opt_next<Sx>(
///         &mut self,
///         f: &F,
///         dom: &Domain<f64>,
///         x: &mut Vector<f64, Dyn, Sx>,
///     ) -> Result<f64, Self::Error>
///     where
///         Sx: StorageMut<f64, Dyn> + IsContiguous,
///     {
///         let mut grad = x.clone_owned();
///         f.gradient(x, &mut grad);
///
///         x.axpy(-self.step, &grad, 1.0);
///         dom.project(x);
///
///         Ok(f.apply(x))
///     }
/// }
/// ```
pub trait Optimizer<F: Function> {
    /// Name of the optimizer.
    const NAME: &'static str;

    /// Error while computing the next step.
    type Error;

    /// Computes the next step in the optimization process.
    ///
    /// The value of `x` is the current point. After the method returns, `x`
    /// should hold the variable values of the performed step and the return
    /// value _must_ be the function value of that step as computed by
    /// [`Function::apply`].
    ///
    /// The implementations _can_ assume that subsequent calls to `opt_next`
    /// pass the value of `x` as was returned in the previous iteration.
    fn opt_next<Sx>(
        &mut self,
        f: &F,
        dom: &Domain<F::Field>,
        x: &mut Vector<F::Field, Dyn, Sx>,
    ) -> Result<F::Field, Self::Error>
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous;
}
