use super::domain::Domain;

/// Extension of [`nalgebra::RealField`] with constants used across the
/// numerical algorithms.
pub trait RealField: nalgebra::RealField + Copy {
    /// Square root of machine epsilon. A standard epsilon for approximating
    /// first-order derivative-based concepts.
    const EPSILON_SQRT: Self;

    /// Cubic root of machine epsilon. A standard epsilon for approximating
    /// second-order derivative-based concepts.
    const EPSILON_CBRT: Self;
}

impl RealField for f64 {
    const EPSILON_SQRT: Self = 0.000000014901161193847656;
    const EPSILON_CBRT: Self = 0.0000060554544523933395;
}

impl RealField for f32 {
    const EPSILON_SQRT: Self = 0.00034526698;
    const EPSILON_CBRT: Self = 0.0049215667;
}

/// The base trait for [`Function`](super::function::Function) and
/// [`System`](super::system::System).
pub trait Problem {
    /// Type of the field, usually f64 or f32.
    type Field: RealField;

    /// Gets the domain of the problem.
    ///
    /// For objective functions, this is the box in which all critical points
    /// are searched for, unless the caller overrides it.
    fn domain(&self) -> Domain<Self::Field>;
}
