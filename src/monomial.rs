//! Polynomials in the monomial basis.
//!
//! The orthogonal basis is convenient for fitting, but differentiation and
//! polynomial system solvers work with monomials. Polynomials here are
//! generic over the [`Coefficient`] type, which is either `f64` or the exact
//! [`BigRational`]. In the exact case, the conversion from the orthogonal
//! basis, sparsification and differentiation introduce no rounding error.

use std::{collections::BTreeMap, fmt};

use log::debug;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Num, Signed};

use crate::{fit::PolynomialApproximant, grid::TensorGrid, quadrature, support::MultiIndex};

/// Numeric type of polynomial coefficients.
pub trait Coefficient:
    Clone + fmt::Debug + fmt::Display + PartialEq + PartialOrd + Num + Signed + Send + Sync
{
    /// Converts a floating point number. Non-finite values are not
    /// representable by exact types and are converted to zero.
    fn from_float(value: f64) -> Self;

    /// Converts to the nearest floating point number.
    fn to_float(&self) -> f64;

    /// Converts an integer.
    fn from_int(value: i64) -> Self;

    /// Creates the fraction `numer / denom`.
    fn from_ratio(numer: i64, denom: i64) -> Self;
}

impl Coefficient for f64 {
    fn from_float(value: f64) -> Self {
        value
    }

    fn to_float(&self) -> f64 {
        *self
    }

    fn from_int(value: i64) -> Self {
        value as f64
    }

    fn from_ratio(numer: i64, denom: i64) -> Self {
        numer as f64 / denom as f64
    }
}

impl Coefficient for BigRational {
    fn from_float(value: f64) -> Self {
        BigRational::from_float(value).unwrap_or_else(num_traits::Zero::zero)
    }

    fn to_float(&self) -> f64 {
        num_traits::ToPrimitive::to_f64(self).unwrap_or(f64::NAN)
    }

    fn from_int(value: i64) -> Self {
        BigRational::from_integer(BigInt::from(value))
    }

    fn from_ratio(numer: i64, denom: i64) -> Self {
        BigRational::new(BigInt::from(numer), BigInt::from(denom))
    }
}

/// Multivariate polynomial in the monomial basis.
///
/// Terms are stored in a map from exponent tuples to nonzero coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct MonomialPolynomial<C> {
    dim: usize,
    terms: BTreeMap<MultiIndex, C>,
}

impl<C: Coefficient> MonomialPolynomial<C> {
    /// Creates the zero polynomial in given number of variables.
    pub fn zero(dim: usize) -> Self {
        Self {
            dim,
            terms: BTreeMap::new(),
        }
    }

    /// Creates the polynomial from terms. Coefficients of repeated exponents
    /// are summed and zero terms are dropped.
    pub fn from_terms<I>(dim: usize, terms: I) -> Self
    where
        I: IntoIterator<Item = (MultiIndex, C)>,
    {
        let mut poly = Self::zero(dim);
        for (e, c) in terms {
            poly.add_term(e, c);
        }
        poly.terms.retain(|_, c| !c.is_zero());
        poly
    }

    fn add_term(&mut self, e: MultiIndex, c: C) {
        debug_assert_eq!(e.dim(), self.dim);

        match self.terms.get_mut(&e) {
            Some(acc) => *acc = acc.clone() + c,
            None => {
                self.terms.insert(e, c);
            }
        }
    }

    /// Gets the number of variables.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Gets the number of nonzero terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Returns `true` if the polynomial is zero.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Gets the total degree. The zero polynomial has degree zero.
    pub fn degree(&self) -> u32 {
        self.terms.keys().map(MultiIndex::degree).max().unwrap_or(0)
    }

    /// Iterates over the terms in lexicographic order of exponents.
    pub fn terms(&self) -> impl Iterator<Item = (&MultiIndex, &C)> {
        self.terms.iter()
    }

    /// Gets the coefficient of given term.
    pub fn coefficient(&self, e: &MultiIndex) -> Option<&C> {
        self.terms.get(e)
    }

    /// Gets the largest coefficient magnitude.
    pub fn max_magnitude(&self) -> C {
        self.terms
            .values()
            .map(Signed::abs)
            .fold(C::zero(), |max, c| if c > max { c } else { max })
    }

    /// Evaluates the polynomial in floating point arithmetic.
    pub fn eval(&self, u: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(e, c)| {
                e.exponents()
                    .iter()
                    .zip(u.iter())
                    .fold(c.to_float(), |acc, (p, x)| acc * x.powi(*p as i32))
            })
            .sum()
    }

    /// Evaluates the polynomial in the coefficient arithmetic.
    pub fn eval_exact(&self, u: &[C]) -> C {
        self.terms
            .iter()
            .map(|(e, c)| {
                e.exponents()
                    .iter()
                    .zip(u.iter())
                    .fold(c.clone(), |acc, (p, x)| acc * num_traits::pow(x.clone(), *p as usize))
            })
            .fold(C::zero(), |acc, t| acc + t)
    }

    /// Computes the partial derivative with respect to given variable.
    pub fn derivative(&self, axis: usize) -> Self {
        let terms = self.terms.iter().filter_map(|(e, c)| {
            let p = e.get(axis);
            e.lowered(axis)
                .map(|lowered| (lowered, c.clone() * C::from_int(p as i64)))
        });

        Self::from_terms(self.dim, terms)
    }

    /// Converts the coefficients to floating point.
    pub fn to_f64(&self) -> MonomialPolynomial<f64> {
        MonomialPolynomial::from_terms(
            self.dim,
            self.terms.iter().map(|(e, c)| (e.clone(), c.to_float())),
        )
    }

    /// Estimates the L2 norm over the canonical box by the quadrature of the
    /// grid.
    pub fn l2_norm(&self, grid: &TensorGrid) -> f64 {
        quadrature::l2_norm_on(grid, |u| self.eval(u.as_slice()))
    }

    /// Drops terms with small coefficients.
    ///
    /// A term is dropped if the magnitude of its coefficient is below
    /// `threshold` ([`SparsifyMode::Absolute`]) or below `threshold` times
    /// the largest magnitude ([`SparsifyMode::Relative`]). The degradation is
    /// measured by the quadrature of the grid, not by the magnitudes of the
    /// dropped coefficients.
    pub fn sparsify(
        &self,
        threshold: f64,
        mode: SparsifyMode,
        grid: &TensorGrid,
    ) -> SparsifiedPolynomial<C> {
        let cutoff = match mode {
            SparsifyMode::Absolute => C::from_float(threshold),
            SparsifyMode::Relative => C::from_float(threshold) * self.max_magnitude(),
        };

        let (kept, removed): (Vec<_>, Vec<_>) = self
            .terms
            .iter()
            .map(|(e, c)| (e.clone(), c.clone()))
            .partition(|(_, c)| c.abs() >= cutoff);

        let dropped = removed.len();
        let removed = Self::from_terms(self.dim, removed);
        let removed_l2 = removed.l2_norm(grid);

        let norm = self.l2_norm(grid);
        let relative_degradation = if norm > 0.0 { removed_l2 / norm } else { 0.0 };

        debug!(
            "sparsify: kept {} of {} terms, L2 degradation {:e} (relative {:e})",
            kept.len(),
            self.len(),
            removed_l2,
            relative_degradation
        );

        SparsifiedPolynomial {
            polynomial: Self::from_terms(self.dim, kept),
            dropped,
            removed_l2,
            relative_degradation,
        }
    }
}

impl<C: Coefficient> MonomialPolynomial<C> {
    /// Displays the polynomial with given variable names. Variables without a
    /// name are written as `x1, x2, ...`.
    pub fn display_with<'a>(&'a self, names: &'a [String]) -> NamedPolynomial<'a, C> {
        NamedPolynomial { poly: self, names }
    }

    fn write_terms<F>(&self, f: &mut fmt::Formatter<'_>, name: F) -> fmt::Result
    where
        F: Fn(usize) -> String,
    {
        if self.terms.is_empty() {
            return write!(f, "0");
        }

        for (i, (e, c)) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }

            write!(f, "{}", c)?;
            for (k, p) in e.exponents().iter().enumerate() {
                match p {
                    0 => {}
                    1 => write!(f, "*{}", name(k))?,
                    _ => write!(f, "*{}^{}", name(k), p)?,
                }
            }
        }

        Ok(())
    }
}

impl<C: Coefficient> fmt::Display for MonomialPolynomial<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_terms(f, |k| format!("x{}", k + 1))
    }
}

/// Polynomial displayed with named variables, see
/// [`MonomialPolynomial::display_with`].
#[derive(Debug)]
pub struct NamedPolynomial<'a, C> {
    poly: &'a MonomialPolynomial<C>,
    names: &'a [String],
}

impl<C: Coefficient> fmt::Display for NamedPolynomial<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.poly.write_terms(f, |k| {
            self.names
                .get(k)
                .cloned()
                .unwrap_or_else(|| format!("x{}", k + 1))
        })
    }
}

/// Threshold interpretation in [`MonomialPolynomial::sparsify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SparsifyMode {
    /// The threshold is compared with the coefficient magnitudes directly.
    Absolute,
    /// The threshold is relative to the largest coefficient magnitude.
    #[default]
    Relative,
}

/// Result of [`MonomialPolynomial::sparsify`].
#[derive(Debug, Clone, PartialEq)]
pub struct SparsifiedPolynomial<C> {
    polynomial: MonomialPolynomial<C>,
    dropped: usize,
    removed_l2: f64,
    relative_degradation: f64,
}

impl<C: Coefficient> SparsifiedPolynomial<C> {
    /// Gets the polynomial with the retained terms.
    pub fn polynomial(&self) -> &MonomialPolynomial<C> {
        &self.polynomial
    }

    /// Unwraps the polynomial with the retained terms.
    pub fn into_polynomial(self) -> MonomialPolynomial<C> {
        self.polynomial
    }

    /// Gets the number of dropped terms.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Gets the L2 norm of the dropped part.
    pub fn removed_l2(&self) -> f64 {
        self.removed_l2
    }

    /// Gets the L2 norm of the dropped part relative to the L2 norm of the
    /// original polynomial.
    pub fn relative_degradation(&self) -> f64 {
        self.relative_degradation
    }
}

/// Re-expands the approximant from the orthogonal basis into monomials.
///
/// Every basis function is a product of one-dimensional basis polynomials,
/// whose monomial expansions are known exactly. The result is in the
/// canonical coordinates of the approximant's domain.
pub fn to_monomial<C: Coefficient>(approx: &PolynomialApproximant) -> MonomialPolynomial<C> {
    let dim = approx.dim();
    let table = approx.basis().monomial_table::<C>(approx.degree());

    let mut poly = MonomialPolynomial::zero(dim);

    for (e, c) in approx.support().iter().zip(approx.coefficients().iter()) {
        let c = C::from_float(*c);
        if c.is_zero() {
            continue;
        }

        // Expand the product of one-dimensional polynomials axis by axis.
        let mut partial: Vec<(Vec<u32>, C)> = vec![(Vec::with_capacity(dim), c)];

        for ek in e.exponents() {
            let row = &table[*ek as usize];

            partial = partial
                .into_iter()
                .flat_map(|(exponents, coef)| {
                    row.iter()
                        .enumerate()
                        .filter(|(_, a)| !a.is_zero())
                        .map(move |(p, a)| {
                            let mut exponents = exponents.clone();
                            exponents.push(p as u32);
                            (exponents, coef.clone() * a.clone())
                        })
                })
                .collect();
        }

        for (exponents, coef) in partial {
            poly.add_term(MultiIndex::new(exponents), coef);
        }
    }

    poly.terms.retain(|_, c| !c.is_zero());
    poly
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        basis::BasisKind,
        core::Domain,
        fit::{approximate, FitOptions, SampleCount},
        grid::NodeKind,
        testing::*,
    };

    use approx::assert_abs_diff_eq;

    fn r(n: i64, d: i64) -> BigRational {
        BigRational::from_ratio(n, d)
    }

    fn e(exponents: &[u32]) -> MultiIndex {
        MultiIndex::new(exponents.to_vec())
    }

    #[test]
    fn sphere_has_two_terms() {
        let f = Sphere::new(2);
        let dom = Domain::cube(vec![0.0, 0.0], 1.0).unwrap();
        let approx = approximate(&f, &dom, 2, &FitOptions::default()).unwrap();

        let poly = approx.to_monomial::<f64>();
        let sparse = poly.sparsify(1e-10, SparsifyMode::Relative, approx.samples().grid());

        assert_eq!(sparse.polynomial().len(), 2);
        assert_abs_diff_eq!(*sparse.polynomial().coefficient(&e(&[2, 0])).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(*sparse.polynomial().coefficient(&e(&[0, 2])).unwrap(), 1.0, epsilon = 1e-12);
        assert!(sparse.removed_l2() < 1e-10);
    }

    #[test]
    fn round_trip_in_sample_points() {
        let f = Himmelblau::new();
        let dom = Domain::cube(vec![0.0, 0.0], 5.0).unwrap();

        for basis in [BasisKind::Chebyshev, BasisKind::Legendre] {
            let mut options = FitOptions::default();
            options.set_basis(basis);

            let approx = approximate(&f, &dom, 5, &options).unwrap();
            let poly = approx.to_monomial::<f64>();
            let exact = approx.to_monomial::<BigRational>();

            for u in approx.samples().grid().canonical() {
                let expected = approx.eval_canonical(u);
                assert_abs_diff_eq!(poly.eval(u.as_slice()), expected, epsilon = 1e-8);
                assert_abs_diff_eq!(exact.eval(u.as_slice()), expected, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn rational_and_float_conversions_agree() {
        let f = ThreeHumpCamel::new();
        let dom = Domain::cube(vec![0.0, 0.0], 2.0).unwrap();
        let approx = approximate(&f, &dom, 6, &FitOptions::default()).unwrap();

        let float = approx.to_monomial::<f64>();
        let exact = approx.to_monomial::<BigRational>().to_f64();

        for (e, c) in exact.terms() {
            let c_float = float.coefficient(e).copied().unwrap_or(0.0);
            assert_abs_diff_eq!(c_float, *c, epsilon = 1e-9);
        }
    }

    #[test]
    fn derivative_of_monomials() {
        // 3 x^2 y - 1/2 y^3 + 7
        let p = MonomialPolynomial::from_terms(
            2,
            vec![
                (e(&[2, 1]), r(3, 1)),
                (e(&[0, 3]), r(-1, 2)),
                (e(&[0, 0]), r(7, 1)),
            ],
        );

        let dx = p.derivative(0);
        let dy = p.derivative(1);

        assert_eq!(dx, MonomialPolynomial::from_terms(2, vec![(e(&[1, 1]), r(6, 1))]));
        assert_eq!(
            dy,
            MonomialPolynomial::from_terms(
                2,
                vec![(e(&[2, 0]), r(3, 1)), (e(&[0, 2]), r(-3, 2))]
            )
        );
        assert_eq!(p.degree(), 3);
        assert_eq!(p.eval_exact(&[r(1, 1), r(2, 1)]), r(9, 1));
    }

    #[test]
    fn sparsify_is_idempotent() {
        let f = Himmelblau::new();
        let dom = Domain::cube(vec![0.0, 0.0], 5.0).unwrap();
        let mut options = FitOptions::default();
        options.set_samples(SampleCount::Fixed(10));
        let approx = approximate(&f, &dom, 6, &options).unwrap();
        let grid = approx.samples().grid();

        for (mode, threshold) in [(SparsifyMode::Relative, 1e-3), (SparsifyMode::Absolute, 0.5)] {
            let poly = approx.to_monomial::<BigRational>();
            let once = poly.sparsify(threshold, mode, grid);
            let twice = once.polynomial().sparsify(threshold, mode, grid);

            assert!(once.dropped() > 0);
            assert_eq!(twice.polynomial(), once.polynomial());
            assert_eq!(twice.dropped(), 0);
            assert_eq!(twice.removed_l2(), 0.0);
        }
    }

    #[test]
    fn sparsify_degradation_uses_quadrature() {
        let dom = Domain::cube(vec![0.0], 1.0).unwrap();
        let grid = TensorGrid::new(&dom, 8, NodeKind::Chebyshev).unwrap();

        // 1 + 0.01 x: the dropped part has L2 norm 0.01 * sqrt(2 / 3).
        let p = MonomialPolynomial::from_terms(1, vec![(e(&[0]), 1.0), (e(&[1]), 0.01)]);
        let sparse = p.sparsify(0.1, SparsifyMode::Absolute, &grid);

        assert_eq!(sparse.dropped(), 1);
        assert_abs_diff_eq!(sparse.removed_l2(), 0.01 * (2.0f64 / 3.0).sqrt(), epsilon = 1e-14);
    }

    #[test]
    fn exact_float_conversion() {
        assert_eq!(<BigRational as Coefficient>::from_float(0.375), r(3, 8));
        assert_eq!(<BigRational as Coefficient>::from_float(f64::NAN), r(0, 1));
        assert_eq!(r(-5, 4).to_float(), -1.25);
    }

    #[test]
    fn display() {
        let p = MonomialPolynomial::from_terms(2, vec![(e(&[0, 0]), 1.0), (e(&[2, 1]), -2.0)]);
        assert_eq!(p.to_string(), "1 + -2*x1^2*x2");
        assert_eq!(MonomialPolynomial::<f64>::zero(3).to_string(), "0");

        let names = vec!["a".to_string()];
        assert_eq!(p.display_with(&names).to_string(), "1 + -2*a^2*x2");
    }
}
