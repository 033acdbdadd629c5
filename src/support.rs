//! Total-degree support sets of multivariate polynomials.

use std::fmt;

/// Exponent tuple of a multivariate term, one exponent per variable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MultiIndex(Vec<u32>);

impl MultiIndex {
    /// Creates the multi-index from the exponents.
    pub fn new(exponents: Vec<u32>) -> Self {
        Self(exponents)
    }

    /// Creates the zero multi-index (constant term) of given dimension.
    pub fn zero(dim: usize) -> Self {
        Self(vec![0; dim])
    }

    /// Creates the multi-index with one in given axis and zeros elsewhere.
    pub fn unit(dim: usize, axis: usize) -> Self {
        let mut e = vec![0; dim];
        e[axis] = 1;
        Self(e)
    }

    /// Gets the number of variables.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Gets the total degree, the sum of exponents.
    pub fn degree(&self) -> u32 {
        self.0.iter().sum()
    }

    /// Gets the exponents.
    pub fn exponents(&self) -> &[u32] {
        &self.0
    }

    /// Gets the exponent of given variable.
    pub fn get(&self, axis: usize) -> u32 {
        self.0[axis]
    }

    /// Returns the multi-index with the exponent of given variable decreased
    /// by one, or `None` if the exponent is zero.
    pub fn lowered(&self, axis: usize) -> Option<Self> {
        let e = self.0[axis].checked_sub(1)?;
        let mut lowered = self.clone();
        lowered.0[axis] = e;
        Some(lowered)
    }

    /// Component-wise sum of two multi-indices.
    pub fn add(&self, other: &Self) -> Self {
        Self(self.0.iter().zip(other.0.iter()).map(|(a, b)| a + b).collect())
    }
}

impl From<Vec<u32>> for MultiIndex {
    fn from(exponents: Vec<u32>) -> Self {
        Self(exponents)
    }
}

impl fmt::Display for MultiIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", e)?;
        }
        write!(f, ")")
    }
}

/// Set of all multi-indices of dimension `n` with total degree at most `d`.
///
/// The indices are in lexicographic order with the first variable being the
/// most significant. The size of the set is the binomial coefficient
/// `C(n + d, n)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportSet {
    dim: usize,
    degree: u32,
    indices: Vec<MultiIndex>,
}

impl SupportSet {
    /// Generates the total-degree support set.
    pub fn total_degree(dim: usize, degree: u32) -> Self {
        let mut indices = Vec::with_capacity(Self::size(dim, degree));
        let mut current = Vec::with_capacity(dim);
        generate(dim, degree, &mut current, &mut indices);

        Self {
            dim,
            degree,
            indices,
        }
    }

    /// Computes the number of terms `C(n + d, n)` without generating them.
    pub fn size(dim: usize, degree: u32) -> usize {
        let d = degree as usize;
        // C(n + d, k) built incrementally stays an integer in every step.
        (1..=dim).fold(1usize, |acc, k| acc.saturating_mul(d + k) / k)
    }

    /// Gets the number of variables.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Gets the maximal total degree.
    pub fn degree(&self) -> u32 {
        self.degree
    }

    /// Gets the number of terms.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns `true` if the set has no terms.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Gets the multi-indices in order.
    pub fn indices(&self) -> &[MultiIndex] {
        &self.indices
    }

    /// Iterates over the multi-indices in order.
    pub fn iter(&self) -> std::slice::Iter<'_, MultiIndex> {
        self.indices.iter()
    }

    /// Finds the position of given multi-index.
    pub fn position(&self, index: &MultiIndex) -> Option<usize> {
        self.indices.binary_search(index).ok()
    }

    /// Returns `true` if the multi-index belongs to the set.
    pub fn contains(&self, index: &MultiIndex) -> bool {
        index.dim() == self.dim && index.degree() <= self.degree
    }

    /// Returns `true` if every multi-index of this set belongs to the other.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.dim == other.dim && self.degree <= other.degree
    }
}

impl<'a> IntoIterator for &'a SupportSet {
    type Item = &'a MultiIndex;
    type IntoIter = std::slice::Iter<'a, MultiIndex>;

    fn into_iter(self) -> Self::IntoIter {
        self.indices.iter()
    }
}

fn generate(dim: usize, remaining: u32, current: &mut Vec<u32>, out: &mut Vec<MultiIndex>) {
    if current.len() == dim {
        out.push(MultiIndex(current.clone()));
        return;
    }

    for e in 0..=remaining {
        current.push(e);
        generate(dim, remaining - e, current, out);
        current.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binomial(n: usize, k: usize) -> usize {
        (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
    }

    #[test]
    fn size_is_binomial() {
        for dim in 1..=5 {
            for degree in 0..=8 {
                let support = SupportSet::total_degree(dim, degree);
                let expected = binomial(dim + degree as usize, dim);

                assert_eq!(support.len(), expected, "n = {}, d = {}", dim, degree);
                assert_eq!(SupportSet::size(dim, degree), expected);
                assert!(support.iter().all(|e| e.degree() <= degree));
            }
        }
    }

    #[test]
    fn degree_zero() {
        let support = SupportSet::total_degree(3, 0);
        assert_eq!(support.indices(), &[MultiIndex::zero(3)]);
    }

    #[test]
    fn lexicographic_order() {
        let support = SupportSet::total_degree(2, 2);
        let expected: Vec<MultiIndex> = vec![
            vec![0, 0].into(),
            vec![0, 1].into(),
            vec![0, 2].into(),
            vec![1, 0].into(),
            vec![1, 1].into(),
            vec![2, 0].into(),
        ];

        assert_eq!(support.indices(), expected.as_slice());
        assert_eq!(support.position(&vec![1, 1].into()), Some(4));
        assert_eq!(support.position(&vec![3, 0].into()), None);
    }

    #[test]
    fn nested_sets() {
        let small = SupportSet::total_degree(3, 2);
        let large = SupportSet::total_degree(3, 4);

        assert!(small.is_subset(&large));
        assert!(!large.is_subset(&small));
        assert!(small.iter().all(|e| large.position(e).is_some()));
    }

    #[test]
    fn multi_index_ops() {
        let e = MultiIndex::new(vec![2, 0, 1]);

        assert_eq!(e.degree(), 3);
        assert_eq!(e.lowered(0), Some(MultiIndex::new(vec![1, 0, 1])));
        assert_eq!(e.lowered(1), None);
        assert_eq!(e.add(&MultiIndex::unit(3, 1)), MultiIndex::new(vec![2, 1, 1]));
        assert_eq!(e.to_string(), "(2, 0, 1)");
    }
}
