//! One-dimensional orthogonal polynomial families on `[-1, 1]`.
//!
//! Both families are evaluated by their three-term recurrences:
//!
//! ```text
//! Chebyshev:  T_0 = 1, T_1 = x, T_{k+1} = 2x T_k - T_{k-1}
//! Legendre:   P_0 = 1, P_1 = x, (k+1) P_{k+1} = (2k+1) x P_k - k P_{k-1}
//! ```
//!
//! The same recurrences applied to coefficient vectors give the expansion of
//! each basis polynomial in monomials, which is used for basis conversion.

use crate::monomial::Coefficient;

/// Orthogonal polynomial family of the approximation basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BasisKind {
    /// Chebyshev polynomials of the first kind.
    #[default]
    Chebyshev,
    /// Legendre polynomials.
    Legendre,
}

impl BasisKind {
    /// Evaluates the basis polynomials of degrees `0..=degree` in `x`.
    pub fn evaluate(&self, x: f64, degree: u32) -> Vec<f64> {
        let mut values = Vec::with_capacity(degree as usize + 1);
        self.evaluate_into(x, &mut values, degree);
        values
    }

    /// Evaluates the basis polynomials of degrees `0..=degree` in `x` into a
    /// reused buffer.
    pub fn evaluate_into(&self, x: f64, values: &mut Vec<f64>, degree: u32) {
        values.clear();
        values.push(1.0);

        if degree == 0 {
            return;
        }

        values.push(x);

        for k in 1..degree as usize {
            let next = match self {
                BasisKind::Chebyshev => 2.0 * x * values[k] - values[k - 1],
                BasisKind::Legendre => {
                    let kf = k as f64;
                    ((2.0 * kf + 1.0) * x * values[k] - kf * values[k - 1]) / (kf + 1.0)
                }
            };
            values.push(next);
        }
    }

    /// Computes the monomial expansions of the basis polynomials of degrees
    /// `0..=degree`.
    ///
    /// Row `k` of the result contains the coefficients of `x^0, ..., x^k` in
    /// the basis polynomial of degree `k`. The computation is exact when the
    /// coefficient type is exact.
    pub fn monomial_table<C: Coefficient>(&self, degree: u32) -> Vec<Vec<C>> {
        let mut table: Vec<Vec<C>> = Vec::with_capacity(degree as usize + 1);
        table.push(vec![C::one()]);

        if degree == 0 {
            return table;
        }

        table.push(vec![C::zero(), C::one()]);

        for k in 1..degree as usize {
            let (a, b) = match self {
                // T_{k+1} = 2 x T_k - T_{k-1}
                BasisKind::Chebyshev => (C::from_int(2), C::one()),
                // P_{k+1} = ((2k+1) x P_k - k P_{k-1}) / (k+1)
                BasisKind::Legendre => (
                    C::from_ratio(2 * k as i64 + 1, k as i64 + 1),
                    C::from_ratio(k as i64, k as i64 + 1),
                ),
            };

            let mut next = vec![C::zero(); k + 2];

            for (p, coef) in table[k].iter().enumerate() {
                next[p + 1] = next[p + 1].clone() + a.clone() * coef.clone();
            }

            for (p, coef) in table[k - 1].iter().enumerate() {
                next[p] = next[p].clone() - b.clone() * coef.clone();
            }

            table.push(next);
        }

        table
    }
}
