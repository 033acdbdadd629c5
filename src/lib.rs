#![allow(clippy::many_single_char_names)]
#![allow(clippy::type_complexity)]
#![warn(missing_docs)]

//! # Polycrit
//!
//! Finding all critical points of a multivariate function in a box through
//! orthogonal polynomial approximation.
//!
//! Local optimization methods find a single minimum, the one whose basin
//! contains the initial guess. This library looks for *all* local minima (and
//! other critical points) of a continuous function in a bounded box. The
//! function is replaced by a polynomial approximant, the critical points of
//! the approximant are found as the roots of its gradient and every such
//! point is then refined and classified using the function itself.
//!
//! ## Pipeline
//!
//! 1. The function is sampled on a tensor [grid](grid) of Chebyshev or
//!    uniform nodes.
//! 2. The [least-squares fit](fit) on the tensor-product orthogonal
//!    [basis](basis) (Chebyshev or Legendre) of total degree `d` gives the
//!    approximant. Its error is measured by [quadrature] consistent with the
//!    nodes, so that the error never increases with the degree.
//! 3. The approximant is converted to [monomials](monomial) (in floating
//!    point or exact rational arithmetic), optionally sparsified, and
//!    differentiated into the [gradient system](system).
//! 4. The real roots of the gradient system in the box are found by a
//!    [polynomial solver](solve).
//! 5. Each root is [refined](refine) by a local optimization of the function
//!    and [classified](classify) by the eigenvalues of the Hessian matrix.
//!
//! ## Problem
//!
//! The function is any type that implements the [`Function`] and [`Problem`]
//! traits.
//!
//! ```rust
//! // Polycrit is based on `nalgebra` crate.
//! use polycrit::nalgebra as na;
//! use polycrit::{Domain, Function, Problem};
//! use na::{Dyn, IsContiguous};
//!
//! // A problem is represented by a type.
//! struct Camel;
//!
//! impl Problem for Camel {
//!     // The numeric type.
//!     type Field = f64;
//!
//!     // The box in which the critical points are searched for.
//!     fn domain(&self) -> Domain<Self::Field> {
//!         Domain::cube(vec![0.0, 0.0], 2.0).unwrap()
//!     }
//! }
//!
//! impl Function for Camel {
//!     // Evaluate the function in given point.
//!     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
//!     where
//!         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//!     {
//!         let (x, y) = (x[0], x[1]);
//!         2.0 * x.powi(2) - 1.05 * x.powi(4) + x.powi(6) / 6.0 + x * y + y * y
//!     }
//! }
//! ```
//!
//! There is no need for defining the gradient or the Hessian matrix. The
//! library uses [finite differences](derivatives) unless they are provided by
//! overriding [`Function::gradient`] and [`Function::hessian`].
//!
//! ## Searching
//!
//! The [`SweepDriver`] runs the pipeline for a range of degrees.
//!
//! ```rust
//! use polycrit::{CriticalPointKind, SweepDriver};
//! # use polycrit::nalgebra as na;
//! # use polycrit::{Domain, Function, Problem};
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct Camel;
//! #
//! # impl Problem for Camel {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::cube(vec![0.0, 0.0], 2.0).unwrap()
//! #     }
//! # }
//! #
//! # impl Function for Camel {
//! #     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #     {
//! #         let (x, y) = (x[0], x[1]);
//! #         2.0 * x.powi(2) - 1.05 * x.powi(4) + x.powi(6) / 6.0 + x * y + y * y
//! #     }
//! # }
//!
//! let f = Camel;
//! let report = SweepDriver::builder(&f)
//!     .with_degrees(6..=8)
//!     .build()
//!     .expect("valid sweep")
//!     .run();
//!
//! for outcome in report.outcomes() {
//!     println!(
//!         "degree = {}\tstatus = {}\tL2 error = {:?}",
//!         outcome.degree, outcome.status, outcome.l2_error
//!     );
//! }
//!
//! for point in report.points() {
//!     if point.kind() == CriticalPointKind::Minimum {
//!         println!("minimum at {:?}", point.point().as_slice());
//!     }
//! }
//! ```
//!
//! The individual stages are available too, see [`approximate`],
//! [`MonomialPolynomial`], [`system::GradientSystem`],
//! [`solve::find_candidates`], [`refine::refine_all`] and
//! [`classify::classify_all`].
//!
//! ## License
//!
//! Licensed under MIT.

pub mod algo;
pub mod basis;
pub mod classify;
mod core;
pub mod derivatives;
pub mod design;
pub mod driver;
pub mod error;
pub mod fit;
pub mod grid;
pub mod monomial;
pub mod quadrature;
pub mod refine;
pub mod solve;
pub mod support;
pub mod system;

pub use crate::core::*;
pub use basis::BasisKind;
pub use classify::{CriticalPointKind, CriticalPointRecord};
pub use driver::{DegreeOutcome, DegreeStatus, SweepDriver, SweepReport};
pub use error::{ApproximationError, SweepError};
pub use fit::{
    approximate, approximate_until, FitOptions, FitWeighting, PolynomialApproximant,
    PrecisionMode, SampleCount,
};
pub use grid::NodeKind;
pub use monomial::{Coefficient, MonomialPolynomial, SparsifyMode};

#[cfg(feature = "testing")]
pub mod testing;

#[cfg(not(feature = "testing"))]
pub(crate) mod testing;

pub use nalgebra;
