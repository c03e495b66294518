//! Row-compressed sparse storage shared by every level of the hierarchy
//!
//! Row `i` owns the slots `row_ptrs[i]..row_ptrs[i + 1]` of `col_indices`
//! and `values`. Columns inside a row are kept sorted.

use crate::traits::LinearOperator;
use ndarray::{Array1, Array2};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Row count above which mat-vec products go parallel
#[cfg(feature = "rayon")]
const PARALLEL_MATVEC_ROWS: usize = 256;

/// Compressed Sparse Row (CSR) matrix of `f64` values
///
/// Every operator of the multigrid hierarchy (fine matrix, prolongators,
/// restrictions, Galerkin products) is stored in this format.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    pub num_rows: usize,
    pub num_cols: usize,
    /// Stored entries, row after row
    pub values: Vec<f64>,
    pub col_indices: Vec<usize>,
    /// Length `num_rows + 1`; the last pointer equals the stored entry count
    pub row_ptrs: Vec<usize>,
}

impl CsrMatrix {
    /// All-zero `num_rows x num_cols` matrix
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            num_rows,
            num_cols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_ptrs: vec![0; num_rows + 1],
        }
    }

    /// Compress a dense matrix, dropping entries with `|a_ij| <= threshold`
    pub fn from_dense(dense: &Array2<f64>, threshold: f64) -> Self {
        Self::compress(dense.nrows(), dense.ncols(), |i, j| {
            let a = dense[[i, j]];
            (a.abs() > threshold).then_some(a)
        })
    }

    /// Create a `num_rows x num_cols` matrix from a column-major buffer
    ///
    /// Entry `(i, j)` is read from `data[i + j * num_rows]`. Exact zeros are
    /// not stored.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != num_rows * num_cols`.
    pub fn from_column_major(num_rows: usize, num_cols: usize, data: &[f64]) -> Self {
        assert_eq!(
            data.len(),
            num_rows * num_cols,
            "column-major buffer must hold num_rows * num_cols values"
        );
        Self::compress(num_rows, num_cols, |i, j| {
            let a = data[i + j * num_rows];
            (a != 0.0).then_some(a)
        })
    }

    /// Row-by-row scan of a dense source; `entry` returns the kept values
    fn compress(
        num_rows: usize,
        num_cols: usize,
        entry: impl Fn(usize, usize) -> Option<f64>,
    ) -> Self {
        let mut out = Self::new(num_rows, num_cols);
        for i in 0..num_rows {
            for j in 0..num_cols {
                if let Some(a) = entry(i, j) {
                    out.values.push(a);
                    out.col_indices.push(j);
                }
            }
            out.row_ptrs[i + 1] = out.values.len();
        }
        out
    }

    /// Assemble from `(row, col, value)` triplets in any order
    ///
    /// Repeated positions are accumulated.
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        mut triplets: Vec<(usize, usize, f64)>,
    ) -> Self {
        if triplets.is_empty() {
            return Self::new(num_rows, num_cols);
        }

        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut values = Vec::with_capacity(triplets.len());
        let mut col_indices = Vec::with_capacity(triplets.len());
        let mut row_ptrs = vec![0usize; num_rows + 1];

        let mut prev = None;
        for (row, col, val) in triplets {
            if prev == Some((row, col)) {
                if let Some(last) = values.last_mut() {
                    *last += val;
                }
                continue;
            }
            values.push(val);
            col_indices.push(col);
            row_ptrs[row + 1] = values.len();
            prev = Some((row, col));
        }

        // Rows without entries inherit the previous row's end pointer
        for i in 1..=num_rows {
            if row_ptrs[i] < row_ptrs[i - 1] {
                row_ptrs[i] = row_ptrs[i - 1];
            }
        }

        Self {
            num_rows,
            num_cols,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// `n x n` identity
    pub fn identity(n: usize) -> Self {
        Self {
            num_rows: n,
            num_cols: n,
            values: vec![1.0; n],
            col_indices: (0..n).collect(),
            row_ptrs: (0..=n).collect(),
        }
    }

    /// Stored entry count
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Stored `(column, value)` pairs of one row
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (lo, hi) = (self.row_ptrs[row], self.row_ptrs[row + 1]);
        self.col_indices[lo..hi]
            .iter()
            .copied()
            .zip(self.values[lo..hi].iter().copied())
    }

    /// `A x`, row-parallel with the `rayon` feature on large operators
    pub fn matvec(&self, x: &Array1<f64>) -> Array1<f64> {
        assert_eq!(x.len(), self.num_cols, "vector length must match the column count");

        #[cfg(feature = "rayon")]
        {
            if self.num_rows >= PARALLEL_MATVEC_ROWS {
                return self.matvec_parallel(x);
            }
        }

        self.matvec_sequential(x)
    }

    fn row_dot(&self, row: usize, x: &Array1<f64>) -> f64 {
        self.row_entries(row).map(|(j, v)| v * x[j]).sum()
    }

    fn matvec_sequential(&self, x: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter((0..self.num_rows).map(|i| self.row_dot(i, x)))
    }

    #[cfg(feature = "rayon")]
    fn matvec_parallel(&self, x: &Array1<f64>) -> Array1<f64> {
        let results: Vec<f64> = (0..self.num_rows)
            .into_par_iter()
            .map(|i| self.row_dot(i, x))
            .collect();

        Array1::from_vec(results)
    }

    /// `Aᵀ x` without forming the transpose
    pub fn matvec_transpose(&self, x: &Array1<f64>) -> Array1<f64> {
        assert_eq!(x.len(), self.num_rows, "vector length must match the row count");

        let mut y = Array1::zeros(self.num_cols);
        for i in 0..self.num_rows {
            for (j, v) in self.row_entries(i) {
                y[j] += v * x[i];
            }
        }
        y
    }

    /// Entry `(i, j)`, zero when not stored
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.row_entries(i)
            .find(|&(col, _)| col == j)
            .map_or(0.0, |(_, v)| v)
    }

    /// Main diagonal, zero where no entry is stored
    pub fn diagonal(&self) -> Array1<f64> {
        let n = self.num_rows.min(self.num_cols);
        Array1::from_iter((0..n).map(|i| self.get(i, i)))
    }

    /// `Aᵀ` by counting sort on the column indices
    pub fn transpose(&self) -> CsrMatrix {
        let mut counts = vec![0usize; self.num_cols + 1];
        for &j in &self.col_indices {
            counts[j + 1] += 1;
        }
        for j in 0..self.num_cols {
            counts[j + 1] += counts[j];
        }

        let row_ptrs = counts.clone();
        let mut next = counts;
        let mut col_indices = vec![0usize; self.nnz()];
        let mut values = vec![0.0; self.nnz()];

        for i in 0..self.num_rows {
            for (j, v) in self.row_entries(i) {
                let slot = next[j];
                col_indices[slot] = i;
                values[slot] = v;
                next[j] += 1;
            }
        }

        CsrMatrix {
            num_rows: self.num_cols,
            num_cols: self.num_rows,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// Sparse product `A B` with a dense accumulator per row
    pub fn matmul(&self, other: &CsrMatrix) -> CsrMatrix {
        assert_eq!(
            self.num_cols, other.num_rows,
            "Inner dimensions must agree for a matrix product"
        );

        let mut values = Vec::new();
        let mut col_indices = Vec::new();
        let mut row_ptrs = Vec::with_capacity(self.num_rows + 1);
        row_ptrs.push(0);

        let mut accumulator = vec![0.0; other.num_cols];
        let mut marker = vec![usize::MAX; other.num_cols];
        let mut touched = Vec::new();

        for i in 0..self.num_rows {
            touched.clear();
            for (k, a_ik) in self.row_entries(i) {
                for (j, b_kj) in other.row_entries(k) {
                    if marker[j] != i {
                        marker[j] = i;
                        accumulator[j] = 0.0;
                        touched.push(j);
                    }
                    accumulator[j] += a_ik * b_kj;
                }
            }
            touched.sort_unstable();
            for &j in &touched {
                values.push(accumulator[j]);
                col_indices.push(j);
            }
            row_ptrs.push(values.len());
        }

        CsrMatrix {
            num_rows: self.num_rows,
            num_cols: other.num_cols,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// Dense copy, meant for coarse operators
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.num_rows, self.num_cols));
        for i in 0..self.num_rows {
            for (j, v) in self.row_entries(i) {
                dense[[i, j]] = v;
            }
        }
        dense
    }
}

impl LinearOperator for CsrMatrix {
    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn num_cols(&self) -> usize {
        self.num_cols
    }

    fn apply(&self, x: &Array1<f64>) -> Array1<f64> {
        self.matvec(x)
    }
}
