//! The collection of implemented algorithms.
//!
//! * [Trust region](trust_region) solves systems of equations. It finds the
//!   roots of gradient systems in [`MultistartSolver`](crate::solve::MultistartSolver).
//! * [BFGS](bfgs) minimizes functions. It refines critical point candidates
//!   against the objective.

pub mod bfgs;
pub mod trust_region;

pub use bfgs::Bfgs;
pub use trust_region::TrustRegion;
