//! Tensor-product sampling grids on a box.
//!
//! The grid is built from one-dimensional nodes on `[-1, 1]` of the chosen
//! [`NodeKind`], taken to the n-th tensor power and mapped into the domain.
//! Every point carries a quadrature weight so that a weighted sum over the
//! grid approximates the integral over the domain.
//!
//! Points are ordered as the Cartesian product of the axis nodes with the last
//! axis varying fastest.

use std::f64::consts::PI;

use log::debug;
use nalgebra::DVector;
use rayon::prelude::*;

use crate::{
    core::{Domain, Function, InvalidDomainError},
    error::ApproximationError,
};

/// Family of one-dimensional nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    /// Chebyshev-Gauss-Lobatto nodes `cos(k pi / GN)`, `k = 0, ..., GN`, with
    /// Clenshaw-Curtis weights.
    #[default]
    Chebyshev,
    /// Equispaced nodes `-1 + 2k / GN` with composite trapezoidal weights.
    Uniform,
}

impl NodeKind {
    /// Nodes on `[-1, 1]` for given number of intervals `gn`.
    ///
    /// The result has `gn + 1` nodes. For `gn = 0` the single node is the
    /// midpoint.
    pub fn nodes(&self, gn: usize) -> Vec<f64> {
        if gn == 0 {
            return vec![0.0];
        }

        let n = gn as f64;

        match self {
            NodeKind::Chebyshev => (0..=gn)
                .map(|k| {
                    // Exact zero for the middle node.
                    if 2 * k == gn {
                        0.0
                    } else {
                        (k as f64 * PI / n).cos()
                    }
                })
                .collect(),
            NodeKind::Uniform => (0..=gn).map(|k| -1.0 + 2.0 * k as f64 / n).collect(),
        }
    }

    /// Quadrature weights on `[-1, 1]` matching [`nodes`](NodeKind::nodes).
    ///
    /// The weights always sum to 2, the length of the interval.
    pub fn weights(&self, gn: usize) -> Vec<f64> {
        if gn == 0 {
            return vec![2.0];
        }

        match self {
            NodeKind::Chebyshev => clenshaw_curtis_weights(gn),
            NodeKind::Uniform => {
                let h = 2.0 / gn as f64;
                (0..=gn)
                    .map(|k| if k == 0 || k == gn { h / 2.0 } else { h })
                    .collect()
            }
        }
    }
}

fn clenshaw_curtis_weights(gn: usize) -> Vec<f64> {
    let n = gn as f64;

    (0..=gn)
        .map(|k| {
            let c = if k == 0 || k == gn { 1.0 } else { 2.0 };

            let sum = (1..=gn / 2)
                .map(|j| {
                    let b = if 2 * j == gn { 1.0 } else { 2.0 };
                    let j = j as f64;
                    b / (4.0 * j * j - 1.0) * (2.0 * j * k as f64 * PI / n).cos()
                })
                .sum::<f64>();

            c / n * (1.0 - sum)
        })
        .collect()
}

/// Geometry of a tensor-product grid over a domain.
#[derive(Debug, Clone)]
pub struct TensorGrid {
    kind: NodeKind,
    gn: usize,
    domain: Domain<f64>,
    canonical: Vec<DVector<f64>>,
    points: Vec<DVector<f64>>,
    weights: DVector<f64>,
}

impl TensorGrid {
    /// Builds the grid with `gn + 1` nodes per axis over given domain.
    ///
    /// The domain must be bounded and the number of points must fit into
    /// `usize`.
    pub fn new(
        domain: &Domain<f64>,
        gn: usize,
        kind: NodeKind,
    ) -> Result<Self, ApproximationError> {
        if let Some(axis) = domain.half_width().iter().position(|r| !r.is_finite()) {
            return Err(InvalidDomainError::InvalidHalfWidth { axis }.into());
        }

        let dim = domain.dim();
        let per_axis = gn.saturating_add(1);

        let count = u32::try_from(dim)
            .ok()
            .and_then(|exp| per_axis.checked_pow(exp))
            .ok_or(ApproximationError::GridTooLarge {
                nodes_per_axis: per_axis,
                dim,
            })?;

        let nodes = kind.nodes(gn);
        let axis_weights = kind.weights(gn);
        let volume = domain.jacobian_det();

        let mut canonical = Vec::with_capacity(count);
        let mut points = Vec::with_capacity(count);
        let mut weights = Vec::with_capacity(count);

        let mut digits = vec![0usize; dim];

        for _ in 0..count {
            let u = DVector::from_iterator(dim, digits.iter().map(|&k| nodes[k]));
            let w = digits.iter().map(|&k| axis_weights[k]).product::<f64>();

            points.push(domain.from_canonical(&u));
            canonical.push(u);
            weights.push(w * volume);

            // Increment the multi-index, the last axis fastest.
            for digit in digits.iter_mut().rev() {
                *digit += 1;
                if *digit < per_axis {
                    break;
                }
                *digit = 0;
            }
        }

        debug!(
            "tensor grid: dim = {}, nodes per axis = {}, points = {}",
            dim, per_axis, count
        );

        Ok(Self {
            kind,
            gn,
            domain: domain.clone(),
            canonical,
            points,
            weights: DVector::from_vec(weights),
        })
    }

    /// Gets the node kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Gets the number of intervals per axis (`GN`).
    pub fn gn(&self) -> usize {
        self.gn
    }

    /// Gets the dimension.
    pub fn dim(&self) -> usize {
        self.domain.dim()
    }

    /// Gets the number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the grid has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Gets the domain of the grid.
    pub fn domain(&self) -> &Domain<f64> {
        &self.domain
    }

    /// Gets the points in canonical coordinates.
    pub fn canonical(&self) -> &[DVector<f64>] {
        &self.canonical
    }

    /// Gets the points in domain coordinates.
    pub fn points(&self) -> &[DVector<f64>] {
        &self.points
    }

    /// Gets the quadrature weights including the volume of the domain.
    pub fn weights(&self) -> &DVector<f64> {
        &self.weights
    }
}

/// Tensor-product grid together with the objective values in its points.
#[derive(Debug, Clone)]
pub struct SampleGrid {
    grid: TensorGrid,
    values: DVector<f64>,
}

impl SampleGrid {
    /// Samples the function on a tensor grid over the domain.
    ///
    /// Every point is evaluated exactly once. If `parallel` is set, the
    /// evaluations are distributed over the rayon thread pool.
    pub fn sample<F>(
        f: &F,
        domain: &Domain<f64>,
        gn: usize,
        kind: NodeKind,
        parallel: bool,
    ) -> Result<Self, ApproximationError>
    where
        F: Function<Field = f64> + Sync,
    {
        let grid = TensorGrid::new(domain, gn, kind)?;
        Self::from_grid(f, grid, parallel)
    }

    /// Evaluates the function in the points of an existing grid.
    pub fn from_grid<F>(f: &F, grid: TensorGrid, parallel: bool) -> Result<Self, ApproximationError>
    where
        F: Function<Field = f64> + Sync,
    {
        let values = if parallel {
            grid.points.par_iter().map(|x| f.apply(x)).collect::<Vec<_>>()
        } else {
            grid.points.iter().map(|x| f.apply(x)).collect::<Vec<_>>()
        };

        Self::from_values(grid, values)
    }

    /// Attaches precomputed function values to a grid.
    pub fn from_values(grid: TensorGrid, values: Vec<f64>) -> Result<Self, ApproximationError> {
        if values.len() != grid.len() {
            return Err(ApproximationError::DimensionMismatch {
                expected: grid.len(),
                actual: values.len(),
            });
        }

        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(ApproximationError::NonFiniteSample { index });
        }

        Ok(Self {
            grid,
            values: DVector::from_vec(values),
        })
    }

    /// Gets the grid geometry.
    pub fn grid(&self) -> &TensorGrid {
        &self.grid
    }

    /// Gets the function values, parallel to the points.
    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    /// Gets the number of samples.
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    /// Returns `true` if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    /// Gets the quadrature weights.
    pub fn weights(&self) -> &DVector<f64> {
        self.grid.weights()
    }

    /// Gets the domain.
    pub fn domain(&self) -> &Domain<f64> {
        self.grid.domain()
    }

    /// Gets the sample point with the lowest function value.
    pub fn best(&self) -> Option<(&DVector<f64>, f64)> {
        self.values
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, v)| (&self.grid.points[i], *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{HalfWidth, Problem},
        testing::Sphere,
    };

    use approx::assert_abs_diff_eq;
    use nalgebra::{storage::Storage, Dyn, IsContiguous, Vector};

    struct Linear;

    impl Problem for Linear {
        type Field = f64;

        fn domain(&self) -> Domain<f64> {
            Domain::cube(vec![0.0, 0.0], 1.0).unwrap()
        }
    }

    impl Function for Linear {
        fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
        where
            Sx: Storage<f64, Dyn> + IsContiguous,
        {
            x[0] + 10.0 * x[1]
        }
    }

    struct Pole;

    impl Problem for Pole {
        type Field = f64;

        fn domain(&self) -> Domain<f64> {
            Domain::cube(vec![0.0], 1.0).unwrap()
        }
    }

    impl Function for Pole {
        fn apply<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> f64
        where
            Sx: Storage<f64, Dyn> + IsContiguous,
        {
            1.0 / x[0]
        }
    }

    #[test]
    fn chebyshev_nodes() {
        let nodes = NodeKind::Chebyshev.nodes(4);
        let expected = [1.0, 0.5f64.sqrt(), 0.0, -(0.5f64.sqrt()), -1.0];

        for (node, expected) in nodes.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(node, expected, epsilon = 1e-15);
        }
    }

    #[test]
    fn midpoint_for_zero_intervals() {
        assert_eq!(NodeKind::Chebyshev.nodes(0), vec![0.0]);
        assert_eq!(NodeKind::Uniform.nodes(0), vec![0.0]);
        assert_eq!(NodeKind::Uniform.weights(0), vec![2.0]);
    }

    #[test]
    fn weights_sum_to_interval_length() {
        for gn in 1..12 {
            for kind in [NodeKind::Chebyshev, NodeKind::Uniform] {
                let sum: f64 = kind.weights(gn).iter().sum();
                assert_abs_diff_eq!(sum, 2.0, epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn clenshaw_curtis_simpson() {
        let weights = NodeKind::Chebyshev.weights(2);
        assert_abs_diff_eq!(weights[0], 1.0 / 3.0, epsilon = 1e-15);
        assert_abs_diff_eq!(weights[1], 4.0 / 3.0, epsilon = 1e-15);
        assert_abs_diff_eq!(weights[2], 1.0 / 3.0, epsilon = 1e-15);
    }

    #[test]
    fn clenshaw_curtis_exactness() {
        // Integral of x^k over [-1, 1] is 2 / (k + 1) for even k.
        let gn = 8;
        let nodes = NodeKind::Chebyshev.nodes(gn);
        let weights = NodeKind::Chebyshev.weights(gn);

        for k in 0..=gn as i32 {
            let quad: f64 = nodes
                .iter()
                .zip(weights.iter())
                .map(|(x, w)| w * x.powi(k))
                .sum();
            let exact = if k % 2 == 0 { 2.0 / (k + 1) as f64 } else { 0.0 };
            assert_abs_diff_eq!(quad, exact, epsilon = 1e-13);
        }
    }

    #[test]
    fn tensor_grid_size_and_order() {
        let dom = Domain::new(vec![1.0, 0.0], HalfWidth::PerAxis(vec![2.0, 1.0])).unwrap();
        let grid = TensorGrid::new(&dom, 2, NodeKind::Uniform).unwrap();

        assert_eq!(grid.len(), 9);
        assert_eq!(grid.canonical()[0].as_slice(), &[-1.0, -1.0]);
        assert_eq!(grid.canonical()[1].as_slice(), &[-1.0, 0.0]);
        assert_eq!(grid.canonical()[3].as_slice(), &[0.0, -1.0]);
        assert_eq!(grid.points()[8].as_slice(), &[3.0, 1.0]);

        // Area of the domain is 4 * 2.
        assert_abs_diff_eq!(grid.weights().sum(), 8.0, epsilon = 1e-12);
    }

    #[test]
    fn unbounded_domain_rejected() {
        let dom = Domain::unconstrained(2);
        assert_eq!(
            TensorGrid::new(&dom, 3, NodeKind::Chebyshev).unwrap_err(),
            ApproximationError::InvalidDomain(InvalidDomainError::InvalidHalfWidth { axis: 0 })
        );
    }

    #[test]
    fn overflowing_grid_rejected() {
        let dom = Domain::cube(vec![0.0; 12], 1.0).unwrap();

        // 1001^12 points do not fit into usize.
        assert_eq!(
            TensorGrid::new(&dom, 1000, NodeKind::Chebyshev).unwrap_err(),
            ApproximationError::GridTooLarge {
                nodes_per_axis: 1001,
                dim: 12
            }
        );
        assert!(matches!(
            SampleGrid::sample(&Sphere::new(12), &dom, 1000, NodeKind::Uniform, false),
            Err(ApproximationError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn sampling_sequential_and_parallel_agree() {
        let f = Linear;
        let dom = f.domain();

        let seq = SampleGrid::sample(&f, &dom, 5, NodeKind::Chebyshev, false).unwrap();
        let par = SampleGrid::sample(&f, &dom, 5, NodeKind::Chebyshev, true).unwrap();

        assert_eq!(seq.len(), 36);
        assert_eq!(seq.values(), par.values());

        let (best, value) = seq.best().unwrap();
        assert_eq!(best.as_slice(), &[-1.0, -1.0]);
        assert_abs_diff_eq!(value, -11.0);
    }

    #[test]
    fn non_finite_sample() {
        let f = Pole;
        let dom = f.domain();

        assert_eq!(
            SampleGrid::sample(&f, &dom, 2, NodeKind::Uniform, false).unwrap_err(),
            ApproximationError::NonFiniteSample { index: 1 }
        );
    }
}
