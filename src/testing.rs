//! Testing functions and utilities useful for benchmarking, debugging and
//! smoke testing.
//!
//! [`Sphere`] and [`Himmelblau`] are recommended for first tests. Functions
//! implementing [`TestFunction`] know all their critical points in the
//! domain, which makes them suitable for testing the whole approximation
//! pipeline.
//!
//! # References
//!
//! \[1\] [A Literature Survey of Benchmark Functions For Global Optimization
//! Problems](https://arxiv.org/abs/1308.4008)
//!
//! \[2\] [Numerical Methods for Unconstrained Optimization and Nonlinear
//! Equations](https://epubs.siam.org/doi/book/10.1137/1.9781611971200)

#![allow(unused)]

use std::error::Error as StdError;

use nalgebra::{
    dvector,
    storage::{Storage, StorageMut},
    DVector, Dyn, IsContiguous, OMatrix, OVector, Vector,
};
use thiserror::Error;

use crate::{
    classify::CriticalPointKind,
    core::{Domain, Function, Optimizer, Problem, Solver, System},
};

/// Extension of the [`Problem`] trait that provides additional information
/// that is useful for testing algorithms.
pub trait TestProblem: Problem {
    /// Standard initial values for the problem. Using the same initial values
    /// is essential for fair comparison of methods.
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>>;
}

/// Extension of the [`System`] trait that provides additional information that
/// is useful for testing solvers.
pub trait TestSystem: System + TestProblem {
    /// A set of roots (if known and finite). For testing if a given point is
    /// root, [`TestSystem::is_root`] should be used.
    fn roots(&self) -> Vec<OVector<Self::Field, Dyn>> {
        Vec::new()
    }

    /// Test if given point is a root of the system, given the tolerance `eps`.
    fn is_root<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>, eps: Self::Field) -> bool
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        let mut rx = x.clone_owned();
        self.eval(x, &mut rx);
        rx.norm() <= eps
    }
}

/// Extension of the [`Function`] trait that provides additional information
/// that is useful for testing optimizers and the critical point search.
pub trait TestFunction: Function + TestProblem {
    /// All critical points in the domain with their kinds (if known).
    fn critical_points(&self) -> Vec<(OVector<Self::Field, Dyn>, CriticalPointKind)> {
        Vec::new()
    }

    /// Local minima in the domain (if known).
    fn minima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        self.critical_points()
            .into_iter()
            .filter(|(_, kind)| *kind == CriticalPointKind::Minimum)
            .map(|(x, _)| x)
            .collect()
    }

    /// Test if given point is a global optimum, given the tolerance `eps`.
    fn is_optimum<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>, eps: Self::Field) -> bool
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous;
}

/// [Extended Rosenbrock
/// function](https://en.wikipedia.org/wiki/Rosenbrock_function) \[1,2\] (also
/// known as Rosenbrock's valley or banana function).
///
/// It is available both as a system of residuals and as a function (sum of
/// squares of the residuals). The global minimum is inside a long, narrow,
/// parabolic shaped flat valley.
#[derive(Debug, Clone, Copy)]
pub struct ExtendedRosenbrock {
    n: usize,
    alpha: f64,
}

impl ExtendedRosenbrock {
    /// Initializes the system with given dimension.
    ///
    /// The dimension **must** be a multiple of 2.
    pub fn new(n: usize) -> Self {
        Self::with_scaling(n, 1.0)
    }

    /// Initializes the system with given dimension and scaling factor.
    ///
    /// The dimension **must** be a multiple of 2. The higher the scaling
    /// factor is, the more difficult the system is.
    pub fn with_scaling(n: usize, alpha: f64) -> Self {
        assert!(n > 0, "n must be greater than zero");
        assert!(n % 2 == 0, "n must be a multiple of 2");
        assert!(alpha > 0.0, "alpha must be greater than zero");
        Self { n, alpha }
    }

    fn residuals<'a, Sx>(&self, x: &'a Vector<f64, Dyn, Sx>) -> impl Iterator<Item = f64> + 'a
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        let alpha = self.alpha;
        (0..(self.n / 2)).flat_map(move |i| {
            let x1 = x[2 * i] * alpha;
            let x2 = x[2 * i + 1] / alpha;

            [10.0 * (x2 - x1 * x1), 1.0 - x1].into_iter()
        })
    }
}

impl Default for ExtendedRosenbrock {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Problem for ExtendedRosenbrock {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        (0..self.n)
            .map(|i| {
                if i % 2 == 0 {
                    self.alpha
                } else {
                    1.0 / self.alpha
                }
            })
            .collect()
    }
}

impl System for ExtendedRosenbrock {
    fn eval<Sx, Srx>(&self, x: &Vector<f64, Dyn, Sx>, rx: &mut Vector<f64, Dyn, Srx>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Srx: StorageMut<f64, Dyn>,
    {
        rx.iter_mut()
            .zip(self.residuals(x))
            .for_each(|(rxi, r)| *rxi = r);
    }

    fn norm<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        self.apply(x).sqrt()
    }

    fn jacobian<Sx, Srx>(
        &self,
        x: &Vector<f64, Dyn, Sx>,
        _rx: &Vector<f64, Dyn, Srx>,
    ) -> OMatrix<f64, Dyn, Dyn>
    where
        Self: Sized,
        Sx: Storage<f64, Dyn> + IsContiguous,
        Srx: Storage<f64, Dyn>,
    {
        // Forward differences lose the x2 column for large residuals when
        // the scaling is high.
        let alpha = self.alpha;
        let mut jac = OMatrix::zeros_generic(Dyn(self.n), Dyn(self.n));

        for i in 0..(self.n / 2) {
            let (i1, i2) = (2 * i, 2 * i + 1);

            jac[(i1, i1)] = -20.0 * alpha * alpha * x[i1];
            jac[(i1, i2)] = 10.0 / alpha;
            jac[(i2, i1)] = -alpha;
        }

        jac
    }
}

impl Function for ExtendedRosenbrock {
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        self.residuals(x).map(|r| r * r).sum()
    }
}

impl TestProblem for ExtendedRosenbrock {
    fn initials(&self) -> Vec<OVector<f64, Dyn>> {
        let init1 = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { -1.2 } else { 1.0 }),
        );

        let init2 = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { 6.39 } else { -0.221 }),
        );

        vec![init1, init2]
    }
}

impl TestSystem for ExtendedRosenbrock {
    fn roots(&self) -> Vec<OVector<f64, Dyn>> {
        let root = (0..self.n).map(|i| {
            if i % 2 == 0 {
                1.0 / self.alpha
            } else {
                self.alpha
            }
        });

        vec![DVector::from_iterator(self.n, root)]
    }
}

impl TestFunction for ExtendedRosenbrock {
    fn critical_points(&self) -> Vec<(OVector<f64, Dyn>, CriticalPointKind)> {
        self.roots()
            .into_iter()
            .map(|x| (x, CriticalPointKind::Minimum))
            .collect()
    }

    fn is_optimum<Sx>(&self, x: &Vector<f64, Dyn, Sx>, eps: f64) -> bool
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        self.apply(x) <= eps
    }
}

/// [Sphere
/// function](https://en.wikipedia.org/wiki/Test_functions_for_optimization)
/// \[1\] `f(x) = sum x_i^2` on `[-1, 1]^n`.
///
/// A simple paraboloid for sanity checking. The gradient is provided
/// analytically.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    n: usize,
}

impl Sphere {
    /// Initializes the function with given dimension.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self { n }
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Problem for Sphere {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        (0..self.n).map(|_| (-1.0, 1.0)).collect()
    }
}

impl Function for Sphere {
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        x.norm_squared()
    }

    fn gradient<Sx, Sg>(&self, x: &Vector<f64, Dyn, Sx>, grad: &mut Vector<f64, Dyn, Sg>)
    where
        Self: Sized,
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        grad.iter_mut()
            .zip(x.iter())
            .for_each(|(gi, xi)| *gi = 2.0 * xi);
    }
}

impl TestProblem for Sphere {
    fn initials(&self) -> Vec<OVector<f64, Dyn>> {
        let init = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { 10.0 } else { -10.0 }),
        );

        vec![init]
    }
}

impl TestFunction for Sphere {
    fn critical_points(&self) -> Vec<(OVector<f64, Dyn>, CriticalPointKind)> {
        vec![(DVector::zeros(self.n), CriticalPointKind::Minimum)]
    }

    fn is_optimum<Sx>(&self, x: &Vector<f64, Dyn, Sx>, eps: f64) -> bool
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        self.apply(x).abs() <= eps
    }
}

/// Saddle `f(x, y) = x^2 - y^2` on `[-1, 1]^2`.
///
/// The only critical point is the saddle in the origin. The function is
/// unbounded below, so minimization from any point leaves the domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct Saddle(());

impl Saddle {
    /// Initializes the function.
    pub fn new() -> Self {
        Self(())
    }
}

impl Problem for Saddle {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        [(-1.0, 1.0), (-1.0, 1.0)].into_iter().collect()
    }
}

impl Function for Saddle {
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        x[0] * x[0] - x[1] * x[1]
    }
}

impl TestProblem for Saddle {
    fn initials(&self) -> Vec<OVector<f64, Dyn>> {
        vec![dvector![0.5, 0.0]]
    }
}

impl TestFunction for Saddle {
    fn critical_points(&self) -> Vec<(OVector<f64, Dyn>, CriticalPointKind)> {
        vec![(dvector![0.0, 0.0], CriticalPointKind::Saddle)]
    }

    fn is_optimum<Sx>(&self, _: &Vector<f64, Dyn, Sx>, _: f64) -> bool
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        false
    }
}

/// [Himmelblau's function](https://en.wikipedia.org/wiki/Himmelblau%27s_function)
/// \[1\] on `[-5, 5]^2`.
///
/// A quartic with four global minima of value zero, one local maximum and
/// four saddle points in the domain. Derivatives are computed by finite
/// differences.
#[derive(Debug, Clone, Copy, Default)]
pub struct Himmelblau(());

impl Himmelblau {
    /// Initializes the function.
    pub fn new() -> Self {
        Self(())
    }
}

impl Problem for Himmelblau {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        [(-5.0, 5.0), (-5.0, 5.0)].into_iter().collect()
    }
}

impl Function for Himmelblau {
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        let (x, y) = (x[0], x[1]);
        (x * x + y - 11.0).powi(2) + (x + y * y - 7.0).powi(2)
    }
}

impl TestProblem for Himmelblau {
    fn initials(&self) -> Vec<OVector<f64, Dyn>> {
        vec![dvector![1.0, 1.0], dvector![-1.0, 4.0], dvector![-4.0, -4.0]]
    }
}

impl TestFunction for Himmelblau {
    fn critical_points(&self) -> Vec<(OVector<f64, Dyn>, CriticalPointKind)> {
        use CriticalPointKind::*;

        vec![
            (dvector![3.0, 2.0], Minimum),
            (dvector![-2.805118086952745, 3.131312518250573], Minimum),
            (dvector![-3.779310253377747, -3.2831859912861696], Minimum),
            (dvector![3.5844283403304917, -1.8481265269644034], Minimum),
            (dvector![-0.2708445906673476, -0.9230385564799813], Maximum),
            (dvector![0.08667750455539648, 2.8842547011747763], Saddle),
            (dvector![-3.0730257507643897, -0.08135304428796747], Saddle),
            (dvector![3.385154183607021, 0.07385187983774917], Saddle),
            (dvector![-0.1279613467306801, -1.9537149802445763], Saddle),
        ]
    }

    fn is_optimum<Sx>(&self, x: &Vector<f64, Dyn, Sx>, eps: f64) -> bool
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        self.apply(x) <= eps
    }
}

/// [Three-hump camel
/// function](https://www.sfu.ca/~ssurjano/camel3.html) \[1\] on `[-2, 2]^2`.
///
/// A sextic with a global minimum in the origin, two other local minima and
/// two saddle points. The gradient is provided analytically.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeHumpCamel(());

impl ThreeHumpCamel {
    /// Initializes the function.
    pub fn new() -> Self {
        Self(())
    }
}

impl Problem for ThreeHumpCamel {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        [(-2.0, 2.0), (-2.0, 2.0)].into_iter().collect()
    }
}

impl Function for ThreeHumpCamel {
    fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        let (x, y) = (x[0], x[1]);
        2.0 * x.powi(2) - 1.05 * x.powi(4) + x.powi(6) / 6.0 + x * y + y * y
    }

    fn gradient<Sx, Sg>(&self, x: &Vector<f64, Dyn, Sx>, grad: &mut Vector<f64, Dyn, Sg>)
    where
        Self: Sized,
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        let (x, y) = (x[0], x[1]);
        grad[0] = 4.0 * x - 4.2 * x.powi(3) + x.powi(5) + y;
        grad[1] = x + 2.0 * y;
    }
}

impl TestProblem for ThreeHumpCamel {
    fn initials(&self) -> Vec<OVector<f64, Dyn>> {
        vec![dvector![1.5, 1.5], dvector![-1.0, 0.5]]
    }
}

impl TestFunction for ThreeHumpCamel {
    fn critical_points(&self) -> Vec<(OVector<f64, Dyn>, CriticalPointKind)> {
        use CriticalPointKind::*;

        let (xm, ym) = (1.747552345830289, -0.8737761729151445);
        let (xs, ys) = (1.0705422918236598, -0.5352711459118299);

        vec![
            (dvector![0.0, 0.0], Minimum),
            (dvector![xm, ym], Minimum),
            (dvector![-xm, -ym], Minimum),
            (dvector![xs, ys], Saddle),
            (dvector![-xs, -ys], Saddle),
        ]
    }

    fn is_optimum<Sx>(&self, x: &Vector<f64, Dyn, Sx>, eps: f64) -> bool
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        self.apply(x).abs() <= eps
    }
}

/// Solving or optimization error of the testing solver/optimizer driver (see
/// [`solve`] and [`optimize`]).
#[derive(Debug, Error)]
pub enum TestingError<E: StdError + 'static> {
    /// Error of the algorithm used.
    #[error("{0}")]
    Inner(#[from] E),
    /// Algorithm did not terminate.
    #[error("algorithm did not terminate")]
    Termination,
}

/// A simple solver driver that can be used in tests.
pub fn solve<F: TestSystem, S: Solver<F>>(
    f: &F,
    dom: &Domain<F::Field>,
    mut solver: S,
    mut x: OVector<F::Field, Dyn>,
    max_iters: usize,
    tolerance: F::Field,
) -> Result<OVector<F::Field, Dyn>, TestingError<S::Error>>
where
    S::Error: StdError,
{
    let mut rx = x.clone_owned();
    let mut iter = 0;

    loop {
        solver.solve_next(f, dom, &mut x, &mut rx)?;

        if rx.norm() <= tolerance {
            return Ok(x);
        }

        if iter == max_iters {
            return Err(TestingError::Termination);
        } else {
            iter += 1;
        }
    }
}

/// A simple optimizer driver that can be used in tests.
pub fn optimize<F: Function, O: Optimizer<F>>(
    f: &F,
    dom: &Domain<F::Field>,
    mut optimizer: O,
    mut x: OVector<F::Field, Dyn>,
    min: F::Field,
    max_iters: usize,
    tolerance: F::Field,
) -> Result<OVector<F::Field, Dyn>, TestingError<O::Error>>
where
    O::Error: StdError,
{
    let mut iter = 0;

    loop {
        let fx = optimizer.opt_next(f, dom, &mut x)?;

        if fx <= min + tolerance {
            return Ok(x);
        }

        if iter == max_iters {
            return Err(TestingError::Termination);
        } else {
            iter += 1;
        }
    }
}

/// Tests whether `x` is within `eps` of any of given points.
pub fn is_near_any<Sx>(x: &Vector<f64, Dyn, Sx>, points: &[OVector<f64, Dyn>], eps: f64) -> bool
where
    Sx: Storage<f64, Dyn>,
{
    points.iter().any(|p| (p - x).norm() <= eps)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    fn gradient_norm<F: Function<Field = f64>>(f: &F, x: &OVector<f64, Dyn>) -> f64 {
        let mut grad = x.clone_owned();
        f.gradient(x, &mut grad);
        grad.norm()
    }

    #[test]
    fn himmelblau_critical_points() {
        let f = Himmelblau::new();
        let dom = f.domain();

        for (x, _) in f.critical_points() {
            assert!(dom.contains(&x, 0.0));
            assert!(gradient_norm(&f, &x) < 1e-6);
        }

        assert_eq!(f.minima().len(), 4);
        assert!(f.minima().iter().all(|x| f.is_optimum(x, 1e-20)));
    }

    #[test]
    fn three_hump_camel_critical_points() {
        let f = ThreeHumpCamel::new();

        for (x, _) in f.critical_points() {
            assert!(gradient_norm(&f, &x) < 1e-12);
        }

        assert_eq!(f.minima().len(), 3);
    }

    #[test]
    fn rosenbrock_is_sum_of_squares() {
        let f = ExtendedRosenbrock::new(4);
        let x = dvector![-1.2, 1.0, 0.5, 0.5];

        let mut rx = x.clone_owned();
        f.eval(&x, &mut rx);

        assert_abs_diff_eq!(f.apply(&x), rx.norm_squared());
        assert!(f.is_root(&f.roots()[0], 0.0));
    }

    #[test]
    fn near_any() {
        let points = vec![dvector![0.0, 0.0], dvector![1.0, 1.0]];

        assert!(is_near_any(&dvector![0.9, 1.0], &points, 0.2));
        assert!(!is_near_any(&dvector![0.5, 0.5], &points, 0.2));
    }
}
