//! Null-space export for the enclosing preconditioner

use super::null_space::{NullSpaceBasis, allocate};
use crate::error::Result;
use math_audio_multigrid::{MultigridError, NullSpace};

/// Combined null space: block-constant vectors, then the real eigenvectors
///
/// Holds `num_pde_eqns + num_real + num_imag` columns. The imaginary slots
/// exist but stay zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedNullSpace {
    rows: usize,
    dim: usize,
    num_pde_eqns: usize,
    data: Vec<f64>,
}

impl ExportedNullSpace {
    /// Combine the block-constant null space with `basis`
    pub fn build(basis: &NullSpaceBasis, num_pde_eqns: usize) -> Result<Self> {
        let rows = basis.rows();
        let num_pde_eqns = num_pde_eqns.max(1);
        let dim = num_pde_eqns + basis.num_columns();

        let mut data = allocate(rows, dim)?;
        data.resize(rows * dim, 0.0);

        for i in 0..num_pde_eqns {
            for j in (i..rows).step_by(num_pde_eqns) {
                data[j + i * rows] = 1.0;
            }
        }
        let offset = num_pde_eqns * rows;
        let real = basis.real_columns();
        data[offset..offset + real.len()].copy_from_slice(real);

        Ok(Self {
            rows,
            dim,
            num_pde_eqns,
            data,
        })
    }

    /// Number of columns
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Local rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Leading block-constant columns
    pub fn num_pde_eqns(&self) -> usize {
        self.num_pde_eqns
    }

    /// Column-major storage, entry `(j, i)` at `j + i * rows`
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Column `i`
    pub fn column(&self, i: usize) -> &[f64] {
        &self.data[i * self.rows..(i + 1) * self.rows]
    }

    /// Hand the buffer over as a hierarchy null space
    pub fn into_null_space(self) -> std::result::Result<NullSpace, MultigridError> {
        NullSpace::from_column_major(self.rows, self.dim, &self.data)
    }
}
