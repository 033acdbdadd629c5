//! Search domain definition (a box given by its center and half-widths).

use nalgebra::{
    convert,
    storage::{Storage, StorageMut},
    Dim, DimName, Dyn, OVector, Vector, U1,
};
use thiserror::Error;

use crate::core::RealField;

/// Error returned when the domain specification is not valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidDomainError {
    /// The domain has zero dimensions.
    #[error("empty domain")]
    Empty,
    /// Half-width of an axis is zero, negative or not finite.
    #[error("half-width of axis {axis} must be positive and finite")]
    InvalidHalfWidth {
        /// Index of the offending axis.
        axis: usize,
    },
    /// Center of an axis is not finite.
    #[error("center of axis {axis} is not finite")]
    InvalidCenter {
        /// Index of the offending axis.
        axis: usize,
    },
    /// Lengths of center and half-widths (or of the lower and upper bounds)
    /// differ.
    #[error("dimension mismatch ({expected} != {actual})")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },
}

/// Half-width of a domain, either the same for all axes or given per axis.
#[derive(Debug, Clone, PartialEq)]
pub enum HalfWidth<T> {
    /// The same half-width for all axes.
    Uniform(T),
    /// Half-width for every axis.
    PerAxis(Vec<T>),
}

/// Domain for a problem.
///
/// The domain is the box `[center - half_width, center + half_width]`. Every
/// bounded domain has a canonical form `[-1, 1]^n` to which points are mapped
/// by [`to_canonical`](Domain::to_canonical) and from which they are mapped
/// back by [`from_canonical`](Domain::from_canonical).
#[derive(Debug, Clone, PartialEq)]
pub struct Domain<T: RealField> {
    center: OVector<T, Dyn>,
    half_width: OVector<T, Dyn>,
    scale: Option<OVector<T, Dyn>>,
}

impl<T: RealField> Domain<T> {
    /// Creates a domain with given center and half-width(s).
    pub fn new(center: Vec<T>, half_width: HalfWidth<T>) -> Result<Self, InvalidDomainError> {
        let dim = center.len();

        if dim == 0 {
            return Err(InvalidDomainError::Empty);
        }

        let half_width = match half_width {
            HalfWidth::Uniform(r) => vec![r; dim],
            HalfWidth::PerAxis(r) => {
                if r.len() != dim {
                    return Err(InvalidDomainError::DimensionMismatch {
                        expected: dim,
                        actual: r.len(),
                    });
                }
                r
            }
        };

        if let Some(axis) = center.iter().position(|c| !c.is_finite()) {
            return Err(InvalidDomainError::InvalidCenter { axis });
        }

        if let Some(axis) = half_width
            .iter()
            .position(|r| !r.is_finite() || *r <= T::zero())
        {
            return Err(InvalidDomainError::InvalidHalfWidth { axis });
        }

        let scale = center
            .iter()
            .zip(half_width.iter())
            .map(|(c, r)| T::one() / estimate_magnitude_from_bounds(*c - *r, *c + *r));

        let n = Dyn(dim);
        let scale = OVector::from_iterator_generic(n, U1::name(), scale);

        Ok(Self {
            center: OVector::from_vec_generic(n, U1::name(), center),
            half_width: OVector::from_vec_generic(n, U1::name(), half_width),
            scale: Some(scale),
        })
    }

    /// Creates a hypercube domain with given center and common half-width.
    pub fn cube(center: Vec<T>, half_width: T) -> Result<Self, InvalidDomainError> {
        Self::new(center, HalfWidth::Uniform(half_width))
    }

    /// Creates a domain from lower and upper bounds.
    pub fn rect(lower: Vec<T>, upper: Vec<T>) -> Result<Self, InvalidDomainError> {
        if lower.len() != upper.len() {
            return Err(InvalidDomainError::DimensionMismatch {
                expected: lower.len(),
                actual: upper.len(),
            });
        }

        let two: T = convert(2.0);
        let (center, half_width): (Vec<_>, Vec<_>) = lower
            .iter()
            .zip(upper.iter())
            .map(|(l, u)| ((*l + *u) / two, (*u - *l) / two))
            .unzip();

        Self::new(center, HalfWidth::PerAxis(half_width))
    }

    /// Creates unconstrained domain with given dimensionality.
    ///
    /// Unconstrained domain has no canonical form and is used for local
    /// refinement which is not restricted to the search box.
    pub fn unconstrained(dim: usize) -> Self {
        assert!(dim > 0, "empty domain");

        let n = Dyn(dim);
        let inf: T = convert(f64::INFINITY);

        Self {
            center: OVector::zeros_generic(n, U1::name()),
            half_width: OVector::from_element_generic(n, U1::name(), inf),
            scale: None,
        }
    }

    /// Sets a custom scale for the domain.
    ///
    /// Scale of a variable is the inverse of its expected magnitude.
    pub fn with_scale(mut self, scale: OVector<T, Dyn>) -> Self {
        assert!(scale.nrows() == self.dim(), "scale dimension mismatch");
        self.scale = Some(scale);
        self
    }

    /// Gets the dimensionality of the domain.
    pub fn dim(&self) -> usize {
        self.center.nrows()
    }

    /// Gets the center of the domain.
    pub fn center(&self) -> &OVector<T, Dyn> {
        &self.center
    }

    /// Gets the half-widths of the domain.
    pub fn half_width(&self) -> &OVector<T, Dyn> {
        &self.half_width
    }

    /// Gets the lower bound in given axis.
    pub fn lower(&self, i: usize) -> T {
        self.center[i] - self.half_width[i]
    }

    /// Gets the upper bound in given axis.
    pub fn upper(&self, i: usize) -> T {
        self.center[i] + self.half_width[i]
    }

    /// Returns `true` if all axes are bounded.
    pub fn is_bounded(&self) -> bool {
        self.half_width.iter().all(|r| r.is_finite())
    }

    /// Gets the scale if available.
    ///
    /// Scale of a variable is the inverse of its expected magnitude. It is
    /// estimated from the bounds of a bounded domain and `None` is returned
    /// for an unconstrained domain.
    pub fn scale(&self) -> Option<&OVector<T, Dyn>> {
        self.scale.as_ref()
    }

    /// Gets the scale or a vector of ones if not available.
    pub fn scale_or_ones(&self) -> OVector<T, Dyn> {
        self.scale.clone().unwrap_or_else(|| {
            OVector::from_element_generic(Dyn(self.dim()), U1::name(), T::one())
        })
    }

    /// Gets the Jacobian determinant of the mapping from the canonical domain,
    /// i.e., the product of half-widths.
    pub fn jacobian_det(&self) -> T {
        self.half_width.iter().fold(T::one(), |acc, r| acc * *r)
    }

    /// Maps a point from the domain into canonical coordinates `[-1, 1]^n`.
    pub fn to_canonical<D, Sx>(&self, x: &Vector<T, D, Sx>) -> OVector<T, Dyn>
    where
        D: Dim,
        Sx: Storage<T, D>,
    {
        let n = Dyn(self.dim());
        OVector::from_iterator_generic(
            n,
            U1::name(),
            x.iter()
                .zip(self.center.iter().zip(self.half_width.iter()))
                .map(|(xi, (ci, ri))| (*xi - *ci) / *ri),
        )
    }

    /// Maps a point from canonical coordinates `[-1, 1]^n` into the domain.
    pub fn from_canonical<D, Su>(&self, u: &Vector<T, D, Su>) -> OVector<T, Dyn>
    where
        D: Dim,
        Su: Storage<T, D>,
    {
        let n = Dyn(self.dim());
        OVector::from_iterator_generic(
            n,
            U1::name(),
            u.iter()
                .zip(self.center.iter().zip(self.half_width.iter()))
                .map(|(ui, (ci, ri))| *ci + *ri * *ui),
        )
    }

    /// Determines whether the point lies in the domain.
    ///
    /// The tolerance is relative to the half-width of each axis, that is, a
    /// point is accepted if `c_i - r_i (1 + tol) <= x_i <= c_i + r_i (1 + tol)`.
    /// With zero tolerance the bounds are exactly [`lower`](Domain::lower) and
    /// [`upper`](Domain::upper).
    pub fn contains<D, Sx>(&self, x: &Vector<T, D, Sx>, tol: T) -> bool
    where
        D: Dim,
        Sx: Storage<T, D>,
    {
        x.iter()
            .zip(self.center.iter().zip(self.half_width.iter()))
            .all(|(xi, (ci, ri))| {
                let r = *ri * (T::one() + tol);
                *xi >= *ci - r && *xi <= *ci + r
            })
    }

    /// Projects given point into the domain.
    pub fn project<D, Sx>(&self, x: &mut Vector<T, D, Sx>) -> bool
    where
        D: Dim,
        Sx: StorageMut<T, D>,
    {
        let mut not_feasible = false;

        for (i, xi) in x.iter_mut().enumerate() {
            let li = self.lower(i);
            let ui = self.upper(i);

            if *xi < li {
                *xi = li;
                not_feasible = true;
            } else if *xi > ui {
                *xi = ui;
                not_feasible = true;
            }
        }

        not_feasible
    }
}

/// Collects the domain from `(lower, upper)` bounds of every axis.
///
/// # Panics
///
/// Panics if the bounds do not form a valid domain. Use [`Domain::rect`] to
/// handle invalid bounds.
impl<T: RealField> FromIterator<(T, T)> for Domain<T> {
    fn from_iter<I: IntoIterator<Item = (T, T)>>(iter: I) -> Self {
        let (lower, upper): (Vec<_>, Vec<_>) = iter.into_iter().unzip();

        match Self::rect(lower, upper) {
            Ok(dom) => dom,
            Err(error) => panic!("invalid bounds: {}", error),
        }
    }
}

/// Collects unconstrained domain from expected magnitudes of the variables.
impl<T: RealField> FromIterator<T> for Domain<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let scale: Vec<_> = iter
            .into_iter()
            .map(|magnitude| T::one() / magnitude)
            .collect();

        let dim = scale.len();
        let scale = OVector::from_vec_generic(Dyn(dim), U1::name(), scale);

        Self::unconstrained(dim).with_scale(scale)
    }
}

/// Estimates magnitude of the variable given lower and upper bounds.
fn estimate_magnitude_from_bounds<T: RealField>(lower: T, upper: T) -> T {
    let ten: T = convert(10.0);
    let half: T = convert(0.5);

    let avg = half * (lower.abs() + upper.abs());
    let magnitude = ten.powf(avg.abs().log10().trunc());

    // For [0, 0] range, the computed magnitude is undefined.
    if magnitude.is_finite() && magnitude > T::zero() {
        magnitude
    } else {
        T::one()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    #[test]
    fn invalid_half_width() {
        assert_eq!(
            Domain::cube(vec![0.0, 0.0], 0.0),
            Err(InvalidDomainError::InvalidHalfWidth { axis: 0 })
        );
        assert_eq!(
            Domain::new(vec![0.0, 0.0], HalfWidth::PerAxis(vec![1.0, -1.0])),
            Err(InvalidDomainError::InvalidHalfWidth { axis: 1 })
        );
        assert_eq!(
            Domain::cube(vec![0.0], f64::INFINITY),
            Err(InvalidDomainError::InvalidHalfWidth { axis: 0 })
        );
    }

    #[test]
    fn invalid_shape() {
        assert_eq!(
            Domain::<f64>::cube(vec![], 1.0),
            Err(InvalidDomainError::Empty)
        );
        assert_eq!(
            Domain::new(vec![0.0, 0.0], HalfWidth::PerAxis(vec![1.0])),
            Err(InvalidDomainError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert!(Domain::rect(vec![1.0, 0.0], vec![0.0, 1.0]).is_err());
    }

    #[test]
    fn canonical_mapping() {
        let dom = Domain::new(vec![1.0, -2.0], HalfWidth::PerAxis(vec![2.0, 0.5])).unwrap();

        let x = dvector![3.0, -2.25];
        let u = dom.to_canonical(&x);
        assert_abs_diff_eq!(u, dvector![1.0, -0.5]);
        assert_abs_diff_eq!(dom.from_canonical(&u), x);
        assert_eq!(dom.jacobian_det(), 1.0);
    }

    #[test]
    fn rect_bounds() {
        let dom = Domain::rect(vec![-1.0, 2.0], vec![3.0, 4.0]).unwrap();

        assert_eq!(dom.center().as_slice(), &[1.0, 3.0]);
        assert_eq!(dom.half_width().as_slice(), &[2.0, 1.0]);
        assert_eq!(dom.lower(0), -1.0);
        assert_eq!(dom.upper(1), 4.0);
    }

    #[test]
    fn containment() {
        let dom = Domain::cube(vec![0.0, 0.0], 1.0).unwrap();

        assert!(dom.contains(&dvector![1.0, -1.0], 0.0));
        assert!(!dom.contains(&dvector![1.01, 0.0], 0.0));
        assert!(dom.contains(&dvector![1.01, 0.0], 0.02));
    }

    #[test]
    fn projection() {
        let dom = Domain::cube(vec![0.0, 0.0], 1.0).unwrap();

        let mut x = dvector![2.0, 0.5];
        assert!(dom.project(&mut x));
        assert_eq!(x, dvector![1.0, 0.5]);
        assert!(!dom.project(&mut x));
    }

    #[test]
    fn magnitude() {
        assert_eq!(estimate_magnitude_from_bounds(-1e10f64, 1e10).log10(), 10.0);
        assert_eq!(estimate_magnitude_from_bounds(-1e4f64, -1e2).log10(), 3.0);
        assert_eq!(estimate_magnitude_from_bounds(0.0f64, 0.0), 1.0);
    }

    #[test]
    fn collect_bounds() {
        let dom: Domain<f64> = [(-5.0, 5.0), (0.0, 2.0)].into_iter().collect();

        assert_eq!(dom.center().as_slice(), &[0.0, 1.0]);
        assert_eq!(dom.half_width().as_slice(), &[5.0, 1.0]);
    }

    #[test]
    #[should_panic]
    fn collect_invalid_bounds() {
        let _: Domain<f64> = [(1.0, -1.0)].into_iter().collect();
    }

    #[test]
    fn collect_magnitudes() {
        let dom: Domain<f64> = [10.0, 0.5].into_iter().collect();

        assert!(!dom.is_bounded());
        assert_eq!(dom.scale().unwrap().as_slice(), &[0.1, 2.0]);
    }

    #[test]
    fn unconstrained_has_no_scale() {
        let dom = Domain::<f64>::unconstrained(3);

        assert!(!dom.is_bounded());
        assert!(dom.scale().is_none());
        assert_eq!(dom.scale_or_ones().as_slice(), &[1.0, 1.0, 1.0]);
    }
}
