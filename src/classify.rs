//! Classification of critical points by the eigenvalues of the Hessian
//! matrix.
//!
//! With `lambda` the eigenvalues and the threshold
//!
//! ```text
//! eps = max(rel_tol * max |lambda|, abs_tol)
//! ```
//!
//! a point is a minimum if all eigenvalues are greater than `eps`, a maximum
//! if all are less than `-eps`, a saddle if there are eigenvalues of both
//! signs and none of them is within `eps` from zero. Any eigenvalue within
//! `eps` from zero makes the point degenerate, because the second order test
//! is not conclusive.

use std::fmt;

use getset::{CopyGetters, Setters};
use log::debug;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rayon::prelude::*;

use crate::{core::Function, refine::RefinedCriticalPoint};

/// Kind of a critical point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CriticalPointKind {
    /// Local minimum.
    Minimum,
    /// Local maximum.
    Maximum,
    /// Saddle point.
    Saddle,
    /// The second order test is not conclusive.
    Degenerate,
}

impl fmt::Display for CriticalPointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CriticalPointKind::Minimum => "minimum",
            CriticalPointKind::Maximum => "maximum",
            CriticalPointKind::Saddle => "saddle",
            CriticalPointKind::Degenerate => "degenerate",
        };

        f.write_str(label)
    }
}

/// Options for the classification.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct ClassifyOptions {
    /// Zero threshold for eigenvalues relative to the largest eigenvalue
    /// magnitude. Default: `1e-4`.
    rel_tol: f64,
    /// Absolute lower bound of the zero threshold. Default: `1e-10`.
    abs_tol: f64,
    /// Whether points are classified in parallel. Default: `true`.
    parallel: bool,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            rel_tol: 1e-4,
            abs_tol: 1e-10,
            parallel: true,
        }
    }
}

/// Spectral analysis of a Hessian matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct HessianAnalysis {
    /// Eigenvalues in ascending order.
    pub eigenvalues: DVector<f64>,
    /// Kind of the critical point.
    pub kind: CriticalPointKind,
    /// Ratio of the largest eigenvalue magnitude to the smallest one above
    /// the zero threshold. Infinity if no eigenvalue is above the threshold.
    pub condition_number: f64,
    /// Product of the eigenvalues.
    pub determinant: f64,
    /// Sum of the eigenvalues.
    pub trace: f64,
}

impl HessianAnalysis {
    /// Analyzes the matrix. Only the symmetric part of the matrix is taken
    /// into account.
    pub fn new(hessian: &DMatrix<f64>, options: &ClassifyOptions) -> Self {
        let n = hessian.nrows();

        if hessian.iter().any(|h| !h.is_finite()) {
            debug!("Hessian matrix is not finite");

            return Self {
                eigenvalues: DVector::from_element(n, f64::NAN),
                kind: CriticalPointKind::Degenerate,
                condition_number: f64::INFINITY,
                determinant: f64::NAN,
                trace: f64::NAN,
            };
        }

        let symmetric = (hessian + hessian.transpose()) * 0.5;
        let mut eigenvalues: Vec<f64> = SymmetricEigen::new(symmetric)
            .eigenvalues
            .iter()
            .copied()
            .collect();
        eigenvalues.sort_by(f64::total_cmp);

        Self::from_eigenvalues(&eigenvalues, options)
    }

    /// Classifies given eigenvalues, which are sorted first.
    pub fn from_eigenvalues(eigenvalues: &[f64], options: &ClassifyOptions) -> Self {
        let mut sorted = eigenvalues.to_vec();
        sorted.sort_by(f64::total_cmp);

        let max_abs = sorted.iter().map(|l| l.abs()).fold(0.0, f64::max);
        let eps = (options.rel_tol() * max_abs).max(options.abs_tol());

        let positive = sorted.iter().filter(|l| **l > eps).count();
        let negative = sorted.iter().filter(|l| **l < -eps).count();
        let n = sorted.len();

        let kind = if positive + negative < n || n == 0 {
            CriticalPointKind::Degenerate
        } else if positive == n {
            CriticalPointKind::Minimum
        } else if negative == n {
            CriticalPointKind::Maximum
        } else {
            CriticalPointKind::Saddle
        };

        let min_abs = sorted
            .iter()
            .map(|l| l.abs())
            .filter(|l| *l > eps)
            .fold(f64::INFINITY, f64::min);

        let condition_number = if min_abs.is_finite() {
            max_abs / min_abs
        } else {
            f64::INFINITY
        };

        Self {
            determinant: sorted.iter().product(),
            trace: sorted.iter().sum(),
            eigenvalues: DVector::from_vec(sorted),
            kind,
            condition_number,
        }
    }
}

/// Refined critical point with its classification.
#[derive(Debug, Clone)]
pub struct ClassifiedCriticalPoint {
    /// The refined point.
    pub refined: RefinedCriticalPoint,
    /// Analysis of the Hessian matrix in the refined point.
    pub analysis: HessianAnalysis,
}

impl ClassifiedCriticalPoint {
    /// Gets the kind of the point.
    pub fn kind(&self) -> CriticalPointKind {
        self.analysis.kind
    }

    /// Gets the position of the point.
    pub fn point(&self) -> &DVector<f64> {
        &self.refined.point
    }

    /// Flattens the point into an export record.
    pub fn record(&self) -> CriticalPointRecord {
        CriticalPointRecord {
            coordinates: self.refined.point.iter().copied().collect(),
            value: self.refined.value,
            gradient_norm: self.refined.gradient_norm,
            eigenvalues: self.analysis.eigenvalues.iter().copied().collect(),
            kind: self.analysis.kind,
            condition_number: self.analysis.condition_number,
            converged: self.refined.converged,
            degree: self.refined.candidate.degree,
        }
    }
}

/// Computes the Hessian matrix of the objective in the refined point and
/// classifies the point.
pub fn classify<F>(
    f: &F,
    refined: RefinedCriticalPoint,
    options: &ClassifyOptions,
) -> ClassifiedCriticalPoint
where
    F: Function<Field = f64>,
{
    let hessian = f.hessian(&refined.point);
    let analysis = HessianAnalysis::new(&hessian, options);

    debug!(
        "{:?} classified as {} (eigenvalues {:?})",
        refined.point.as_slice(),
        analysis.kind,
        analysis.eigenvalues.as_slice()
    );

    ClassifiedCriticalPoint { refined, analysis }
}

/// Classifies all points, in parallel if enabled in the options.
pub fn classify_all<F>(
    f: &F,
    refined: Vec<RefinedCriticalPoint>,
    options: &ClassifyOptions,
) -> Vec<ClassifiedCriticalPoint>
where
    F: Function<Field = f64> + Sync,
{
    if options.parallel() {
        refined
            .into_par_iter()
            .map(|r| classify(f, r, options))
            .collect()
    } else {
        refined
            .into_iter()
            .map(|r| classify(f, r, options))
            .collect()
    }
}

/// Flat record of a classified critical point.
#[derive(Debug, Clone, PartialEq)]
pub struct CriticalPointRecord {
    /// Coordinates of the point.
    pub coordinates: Vec<f64>,
    /// Objective value.
    pub value: f64,
    /// Gradient norm.
    pub gradient_norm: f64,
    /// Hessian eigenvalues in ascending order.
    pub eigenvalues: Vec<f64>,
    /// Kind of the point.
    pub kind: CriticalPointKind,
    /// Condition number of the Hessian matrix.
    pub condition_number: f64,
    /// Whether the refinement converged.
    pub converged: bool,
    /// Degree of the approximant that produced the point.
    pub degree: u32,
}

/// Single cell of a [`CriticalPointRecord`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordCell {
    /// Real number.
    Number(f64),
    /// Kind of the point.
    Kind(CriticalPointKind),
    /// Boolean flag.
    Flag(bool),
    /// Polynomial degree.
    Degree(u32),
}

impl fmt::Display for RecordCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordCell::Number(x) => write!(f, "{}", x),
            RecordCell::Kind(kind) => write!(f, "{}", kind),
            RecordCell::Flag(flag) => write!(f, "{}", flag),
            RecordCell::Degree(d) => write!(f, "{}", d),
        }
    }
}

impl CriticalPointRecord {
    /// Gets the names of the columns for points of given dimension.
    pub fn column_names(n: usize) -> Vec<String> {
        let mut names: Vec<String> = (1..=n).map(|i| format!("x{}", i)).collect();
        names.push("value".to_string());
        names.push("gradient_norm".to_string());
        names.extend((1..=n).map(|i| format!("eigenvalue{}", i)));
        names.extend(
            ["kind", "condition_number", "converged", "degree"]
                .iter()
                .map(|s| s.to_string()),
        );
        names
    }

    /// Flattens the record into cells in the order of
    /// [`column_names`](CriticalPointRecord::column_names).
    pub fn cells(&self) -> Vec<RecordCell> {
        let mut cells: Vec<RecordCell> = self
            .coordinates
            .iter()
            .map(|x| RecordCell::Number(*x))
            .collect();
        cells.push(RecordCell::Number(self.value));
        cells.push(RecordCell::Number(self.gradient_norm));
        cells.extend(self.eigenvalues.iter().map(|l| RecordCell::Number(*l)));
        cells.push(RecordCell::Kind(self.kind));
        cells.push(RecordCell::Number(self.condition_number));
        cells.push(RecordCell::Flag(self.converged));
        cells.push(RecordCell::Degree(self.degree));
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::Problem,
        refine::{refine_all, RefineOptions},
        solve::CriticalPointCandidate,
        testing::*,
    };

    use approx::assert_abs_diff_eq;
    use nalgebra::{dmatrix, dvector};

    fn analyze(eigenvalues: &[f64]) -> HessianAnalysis {
        HessianAnalysis::from_eigenvalues(eigenvalues, &ClassifyOptions::default())
    }

    fn refined(point: DVector<f64>) -> RefinedCriticalPoint {
        RefinedCriticalPoint {
            candidate: CriticalPointCandidate {
                canonical: point.clone(),
                point: point.clone(),
                degree: 2,
            },
            point,
            value: 0.0,
            gradient_norm: 0.0,
            distance: 0.0,
            converged: true,
            iterations: 0,
            in_domain: true,
        }
    }

    #[test]
    fn kinds() {
        assert_eq!(analyze(&[1.0, 3.0]).kind, CriticalPointKind::Minimum);
        assert_eq!(analyze(&[-1.0, -3.0]).kind, CriticalPointKind::Maximum);
        assert_eq!(analyze(&[-1.0, 3.0]).kind, CriticalPointKind::Saddle);
        assert_eq!(analyze(&[1e-6, 3.0]).kind, CriticalPointKind::Degenerate);
        assert_eq!(analyze(&[0.0, 0.0]).kind, CriticalPointKind::Degenerate);
    }

    #[test]
    fn condition_number() {
        let analysis = analyze(&[4.0, -0.5, 2.0]);

        assert_eq!(analysis.eigenvalues.as_slice(), &[-0.5, 2.0, 4.0]);
        assert_abs_diff_eq!(analysis.condition_number, 8.0);
        assert_abs_diff_eq!(analysis.determinant, -4.0);
        assert_abs_diff_eq!(analysis.trace, 5.5);

        // Eigenvalues below the threshold are excluded.
        assert_abs_diff_eq!(analyze(&[1e-9, 2.0]).condition_number, 1.0);
        assert_eq!(analyze(&[0.0]).condition_number, f64::INFINITY);
    }

    #[test]
    fn matrix_is_symmetrized() {
        let hessian = dmatrix![2.0, 1.0; -1.0, 2.0];
        let analysis = HessianAnalysis::new(&hessian, &ClassifyOptions::default());

        assert_abs_diff_eq!(analysis.eigenvalues, dvector![2.0, 2.0], epsilon = 1e-12);
        assert_eq!(analysis.kind, CriticalPointKind::Minimum);
    }

    #[test]
    fn non_finite_matrix_is_degenerate() {
        let hessian = dmatrix![f64::NAN, 0.0; 0.0, 1.0];
        let analysis = HessianAnalysis::new(&hessian, &ClassifyOptions::default());

        assert_eq!(analysis.kind, CriticalPointKind::Degenerate);
        assert_eq!(analysis.condition_number, f64::INFINITY);
    }

    #[test]
    fn sphere_minimum() {
        let f = Sphere::new(2);
        let point = classify(&f, refined(dvector![0.0, 0.0]), &ClassifyOptions::default());

        assert_eq!(point.kind(), CriticalPointKind::Minimum);
        assert_abs_diff_eq!(point.analysis.eigenvalues, dvector![2.0, 2.0], epsilon = 1e-4);
        assert_abs_diff_eq!(point.analysis.condition_number, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn saddle() {
        let f = Saddle::new();
        let point = classify(&f, refined(dvector![0.0, 0.0]), &ClassifyOptions::default());

        assert_eq!(point.kind(), CriticalPointKind::Saddle);
        assert_abs_diff_eq!(point.analysis.eigenvalues, dvector![-2.0, 2.0], epsilon = 1e-4);
    }

    #[test]
    fn himmelblau() {
        let f = Himmelblau::new();

        for (x, kind) in f.critical_points() {
            let point = classify(&f, refined(x), &ClassifyOptions::default());
            assert_eq!(point.kind(), kind);
        }
    }

    #[test]
    fn refined_himmelblau_minima() {
        let f = Himmelblau::new();
        let dom = f.domain();

        let candidates: Vec<_> = f
            .minima()
            .into_iter()
            .map(|x| CriticalPointCandidate {
                canonical: dom.to_canonical(&x),
                point: x.add_scalar(-0.1),
                degree: 4,
            })
            .collect();

        let refined = refine_all(&f, &dom, &candidates, &RefineOptions::default());
        let classified = classify_all(&f, refined, &ClassifyOptions::default());

        assert!(classified
            .iter()
            .all(|p| p.kind() == CriticalPointKind::Minimum));
    }

    #[test]
    fn record() {
        let f = Sphere::new(2);
        let point = classify(&f, refined(dvector![0.0, 0.0]), &ClassifyOptions::default());
        let record = point.record();

        let names = CriticalPointRecord::column_names(2);
        let cells = record.cells();

        assert_eq!(names.len(), cells.len());
        assert_eq!(
            names,
            vec![
                "x1",
                "x2",
                "value",
                "gradient_norm",
                "eigenvalue1",
                "eigenvalue2",
                "kind",
                "condition_number",
                "converged",
                "degree"
            ]
        );
        assert_eq!(cells[6], RecordCell::Kind(CriticalPointKind::Minimum));
        assert_eq!(cells[6].to_string(), "minimum");
        assert_eq!(cells[8].to_string(), "true");
        assert_eq!(cells[9], RecordCell::Degree(2));
    }
}
