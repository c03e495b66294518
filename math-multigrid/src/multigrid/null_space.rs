//! Candidate null spaces for aggregation
//!
//! A null space is a set of column vectors the tentative prolongator must
//! reproduce exactly on every aggregate. The default is the block-constant
//! space: one column per PDE equation, `1.0` on the rows of that equation.

use crate::error::{MultigridError, Result};
use ndarray::{Array2, ArrayView1};

/// Column vectors spanning the near-null space of an operator
#[derive(Debug, Clone, PartialEq)]
pub struct NullSpace {
    /// `rows x dim` matrix, one candidate vector per column
    vectors: Array2<f64>,
}

impl NullSpace {
    /// Block-constant null space: column `i` is `1.0` where `row % num_pde_eqns == i`
    pub fn block_constant(rows: usize, num_pde_eqns: usize) -> Self {
        let num_pde_eqns = num_pde_eqns.max(1);
        let vectors = Array2::from_shape_fn((rows, num_pde_eqns), |(row, col)| {
            if row % num_pde_eqns == col { 1.0 } else { 0.0 }
        });
        Self { vectors }
    }

    /// Wrap an explicit `rows x dim` matrix of candidate vectors
    pub fn from_columns(vectors: Array2<f64>) -> Result<Self> {
        if vectors.ncols() == 0 {
            return Err(MultigridError::EmptyNullSpace);
        }
        Ok(Self { vectors })
    }

    /// Read `dim` vectors of length `rows` stored one after the other
    ///
    /// Entry `j` of vector `i` is `data[j + i * rows]`.
    pub fn from_column_major(rows: usize, dim: usize, data: &[f64]) -> Result<Self> {
        if data.len() != rows * dim {
            return Err(MultigridError::NullSpaceBuffer {
                expected: rows * dim,
                got: data.len(),
            });
        }
        let vectors = Array2::from_shape_fn((rows, dim), |(row, col)| data[row + col * rows]);
        Self::from_columns(vectors)
    }

    /// Number of candidate vectors
    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    /// Length of each candidate vector
    pub fn num_rows(&self) -> usize {
        self.vectors.nrows()
    }

    /// All candidate vectors as columns
    pub fn vectors(&self) -> &Array2<f64> {
        &self.vectors
    }

    /// Candidate vector `j`
    pub fn column(&self, j: usize) -> ArrayView1<'_, f64> {
        self.vectors.column(j)
    }
}
