use std::ops::Index;

/// A symmetric `n × n` matrix without its diagonal, stored as the condensed
/// lower triangle: `(i, j)` with `i > j` lives at `i * (i - 1) / 2 + j`.
pub struct TriMatrix<T> {
    m: Vec<T>,
    n: usize,
}

impl<T> TriMatrix<T> {
    /// `values` must hold the lower triangle row after row, i.e. `(1, 0)`,
    /// `(2, 0)`, `(2, 1)`, `(3, 0)`...
    pub fn from_condensed(n: usize, values: Vec<T>) -> TriMatrix<T> {
        debug_assert_eq!(values.len(), n * n.saturating_sub(1) / 2);
        TriMatrix { m: values, n }
    }

    fn offset(&self, i: usize, j: usize) -> usize {
        debug_assert!(i != j);
        debug_assert!(i < self.n && j < self.n);
        let (i, j) = if i > j { (i, j) } else { (j, i) };
        i * (i - 1) / 2 + j
    }
}

impl<T> Index<(usize, usize)> for TriMatrix<T> {
    type Output = T;

    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        &self.m[self.offset(i, j)]
    }
}
