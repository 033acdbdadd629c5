//! Core abstractions and types.
//!
//! *Users* are mainly interested in implementing the [`Function`] trait for
//! their objective and specifying the [domain](Domain) in which critical points
//! are searched for.
//!
//! Algorithm *developers* are interested in [`Optimizer`] and [`Solver`]
//! traits and the tools in the [derivatives](crate::derivatives) module.

mod base;
mod domain;
mod function;
mod optimizer;
mod solver;
mod system;

pub use base::*;
pub use domain::*;
pub use function::*;
pub use optimizer::*;
pub use solver::*;
pub use system::*;
