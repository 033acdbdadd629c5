//! Gradient systems of polynomial approximants.
//!
//! A critical point of a polynomial `P` is a common root of its partial
//! derivatives. [`GradientSystem`] holds these derivatives together with the
//! second derivatives, which form the Jacobian matrix of the system, so that
//! Newton-type solvers do not need finite differences.

use std::fmt;

use nalgebra::{
    storage::{Storage, StorageMut},
    DMatrix, Dyn, IsContiguous, OMatrix, Vector,
};

use crate::{
    core::{Domain, Problem, System},
    error::ApproximationError,
    monomial::{Coefficient, MonomialPolynomial},
};

/// Names of the variables of a polynomial system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variables {
    names: Vec<String>,
}

impl Variables {
    /// Creates variables with given names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates variables `x1, ..., xn`.
    pub fn indexed(n: usize) -> Self {
        Self::new((1..=n).map(|i| format!("x{}", i)))
    }

    /// Gets the number of variables.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if there are no variables.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Gets the names of all variables.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Gets the name of given variable.
    pub fn name(&self, i: usize) -> Option<&str> {
        self.names.get(i).map(String::as_str)
    }
}

impl fmt::Display for Variables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names.join(", "))
    }
}

/// System of equations `dP/dx_k = 0, k = 1, ..., n` for a polynomial `P`.
///
/// The polynomial is in the canonical coordinates of its approximant, so the
/// [domain](Problem::domain) of the system is the canonical box `[-1, 1]^n`.
#[derive(Debug, Clone)]
pub struct GradientSystem<C> {
    variables: Variables,
    equations: Vec<MonomialPolynomial<C>>,
    hessian: Vec<Vec<MonomialPolynomial<C>>>,
    domain: Domain<f64>,
}

impl<C: Coefficient> GradientSystem<C> {
    /// Differentiates the polynomial with respect to every variable.
    ///
    /// The number of variables must match the dimension of the polynomial.
    pub fn new(
        poly: &MonomialPolynomial<C>,
        variables: Variables,
    ) -> Result<Self, ApproximationError> {
        if poly.dim() != variables.len() {
            return Err(ApproximationError::DimensionMismatch {
                expected: poly.dim(),
                actual: variables.len(),
            });
        }

        let dim = poly.dim();
        let domain = Domain::cube(vec![0.0; dim], 1.0)?;

        let equations: Vec<_> = (0..dim).map(|k| poly.derivative(k)).collect();
        let hessian = equations
            .iter()
            .map(|eq| (0..dim).map(|j| eq.derivative(j)).collect())
            .collect();

        Ok(Self {
            variables,
            equations,
            hessian,
            domain,
        })
    }

    /// Gets the number of equations (and variables).
    pub fn dim(&self) -> usize {
        self.equations.len()
    }

    /// Gets the variables.
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Gets the equations, one partial derivative per variable.
    pub fn equations(&self) -> &[MonomialPolynomial<C>] {
        &self.equations
    }

    /// Gets the maximum total degree of the equations.
    pub fn degree(&self) -> u32 {
        self.equations
            .iter()
            .map(MonomialPolynomial::degree)
            .max()
            .unwrap_or(0)
    }

    /// Converts the coefficients to floating point.
    pub fn to_f64(&self) -> GradientSystem<f64> {
        GradientSystem {
            variables: self.variables.clone(),
            equations: self.equations.iter().map(|eq| eq.to_f64()).collect(),
            hessian: self
                .hessian
                .iter()
                .map(|row| row.iter().map(|h| h.to_f64()).collect())
                .collect(),
            domain: self.domain.clone(),
        }
    }

    /// Evaluates all equations in a point given in canonical coordinates.
    pub fn residuals(&self, u: &[f64]) -> Vec<f64> {
        self.equations.iter().map(|eq| eq.eval(u)).collect()
    }

    /// Evaluates the Hessian matrix of the polynomial, which is the Jacobian
    /// matrix of the system.
    pub fn hessian(&self, u: &[f64]) -> DMatrix<f64> {
        let n = self.dim();
        DMatrix::from_fn(n, n, |i, j| self.hessian[i][j].eval(u))
    }
}

impl<C: Coefficient> fmt::Display for GradientSystem<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, eq) in self.equations.iter().enumerate() {
            let name = self.variables.name(k).unwrap_or("?");
            writeln!(
                f,
                "dP/d{} = {}",
                name,
                eq.display_with(self.variables.names())
            )?;
        }
        Ok(())
    }
}

impl<C: Coefficient> Problem for GradientSystem<C> {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        self.domain.clone()
    }
}

impl<C: Coefficient> System for GradientSystem<C> {
    fn eval<Sx, Srx>(&self, x: &Vector<f64, Dyn, Sx>, rx: &mut Vector<f64, Dyn, Srx>)
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Srx: StorageMut<f64, Dyn>,
    {
        let u = x.as_slice();
        for (rxi, eq) in rx.iter_mut().zip(self.equations.iter()) {
            *rxi = eq.eval(u);
        }
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
        self.hessian(x.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::MultiIndex;

    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;
    use num_rational::BigRational;

    fn e(exponents: &[u32]) -> MultiIndex {
        MultiIndex::new(exponents.to_vec())
    }

    fn sphere() -> MonomialPolynomial<f64> {
        MonomialPolynomial::from_terms(2, vec![(e(&[2, 0]), 1.0), (e(&[0, 2]), 1.0)])
    }

    #[test]
    fn sphere_gradient() {
        let system = GradientSystem::new(&sphere(), Variables::indexed(2)).unwrap();

        assert_eq!(system.dim(), 2);
        assert_eq!(system.degree(), 1);
        assert_eq!(system.equations()[0].coefficient(&e(&[1, 0])), Some(&2.0));
        assert_eq!(system.equations()[1].coefficient(&e(&[0, 1])), Some(&2.0));
        assert_eq!(system.equations()[0].len(), 1);
    }

    #[test]
    fn eval_and_jacobian() {
        // P = x^3 y + y^2
        let poly = MonomialPolynomial::from_terms(2, vec![(e(&[3, 1]), 1.0), (e(&[0, 2]), 1.0)]);
        let system = GradientSystem::new(&poly, Variables::new(["x", "y"])).unwrap();

        let x = dvector![0.5, -2.0];
        let mut rx = x.clone_owned();
        system.eval(&x, &mut rx);

        // dP/dx = 3 x^2 y, dP/dy = x^3 + 2 y
        assert_abs_diff_eq!(rx[0], -1.5);
        assert_abs_diff_eq!(rx[1], -3.875);

        let jac = system.jacobian(&x, &rx);
        assert_abs_diff_eq!(jac[(0, 0)], -6.0);
        assert_abs_diff_eq!(jac[(0, 1)], 0.75);
        assert_abs_diff_eq!(jac[(1, 0)], 0.75);
        assert_abs_diff_eq!(jac[(1, 1)], 2.0);
    }

    #[test]
    fn analytic_jacobian_matches_finite_differences() {
        let poly = MonomialPolynomial::from_terms(
            3,
            vec![
                (e(&[2, 1, 0]), 0.5),
                (e(&[0, 1, 3]), -1.5),
                (e(&[1, 0, 1]), 2.0),
            ],
        );
        let system = GradientSystem::new(&poly, Variables::indexed(3)).unwrap();

        let mut x = dvector![0.3, -0.4, 0.8];
        let mut rx = x.clone_owned();
        system.eval(&x, &mut rx);

        let analytic = system.jacobian(&x, &rx);
        let scale = system.domain().scale_or_ones();
        let numeric = crate::derivatives::Jacobian::new(&system, &mut x, &scale, &rx, 1e-8);

        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert_abs_diff_eq!(a, n, epsilon = 1e-6);
        }
    }

    #[test]
    fn exact_coefficients() {
        let third = <BigRational as Coefficient>::from_ratio(1, 3);
        let poly = MonomialPolynomial::from_terms(1, vec![(e(&[3]), third)]);

        let system = GradientSystem::new(&poly, Variables::indexed(1)).unwrap();
        assert_eq!(
            system.equations()[0].coefficient(&e(&[2])),
            Some(&<BigRational as Coefficient>::from_int(1))
        );

        let system = system.to_f64();
        assert_abs_diff_eq!(system.residuals(&[0.5])[0], 0.25);
    }

    #[test]
    fn dimension_mismatch() {
        assert_eq!(
            GradientSystem::new(&sphere(), Variables::indexed(3)).unwrap_err(),
            ApproximationError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn canonical_domain() {
        let system = GradientSystem::new(&sphere(), Variables::indexed(2)).unwrap();
        let dom = system.domain();

        assert_eq!(dom.lower(0), -1.0);
        assert_eq!(dom.upper(1), 1.0);
    }

    #[test]
    fn display() {
        let system = GradientSystem::new(&sphere(), Variables::new(["a", "b"])).unwrap();
        assert_eq!(system.to_string(), "dP/da = 2*a\ndP/db = 2*b\n");

        // P = a^2 b
        let poly = MonomialPolynomial::from_terms(2, vec![(e(&[2, 1]), 1.0)]);
        let system = GradientSystem::new(&poly, Variables::new(["a", "b"])).unwrap();
        assert_eq!(system.to_string(), "dP/da = 2*a*b\ndP/db = 1*a^2\n");
    }
}
