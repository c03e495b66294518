//! Eigenbasis assembly
//!
//! Converged eigenvectors are packed into one contiguous column-major buffer,
//! real parts first, then the imaginary parts of the complex pairs. The
//! strategies consume the buffer as columns of `B` / `Q` or as a candidate null
//! space.

use crate::comm::Communicator;
use crate::eigen::{EigenDecomposition, EigenError};
use crate::error::{FilterError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2, ShapeBuilder};

/// Column-major `rows × (num_real + num_imag)` basis of local rows
#[derive(Debug, Clone, PartialEq)]
pub struct NullSpaceBasis {
    rows: usize,
    num_real: usize,
    num_imag: usize,
    data: Vec<f64>,
}

impl NullSpaceBasis {
    /// Assemble the basis from the converged eigenpairs
    ///
    /// Collective: column validation takes global reductions. Columns with a
    /// non-finite entry or zero global norm are dropped. A decomposition with
    /// `2 * num_eigenvalues + 1` or more columns is rejected on every
    /// participant before any column is examined.
    pub fn from_decomposition(
        decomposition: &EigenDecomposition,
        num_eigenvalues: usize,
        rows: usize,
        comm: &dyn Communicator,
    ) -> Result<Self> {
        let columns = decomposition.num_real() + decomposition.num_imag();
        let within_bound = check_column_bound(columns, num_eigenvalues);
        if !comm.all_true(within_bound.is_ok()) {
            return Err(within_bound.err().unwrap_or(FilterError::PeerFailure));
        }

        let real: Vec<&Array1<f64>> = decomposition.pairs.iter().map(|p| &p.real).collect();
        let imag: Vec<&Array1<f64>> = decomposition
            .pairs
            .iter()
            .filter(|p| p.is_complex())
            .map(|p| &p.imag)
            .collect();

        let real = usable_columns(real, rows, "real", comm);
        let imag = usable_columns(imag, rows, "imaginary", comm);
        Self::from_columns(&real, &imag, num_eigenvalues, rows)
    }

    /// Pack validated columns
    pub(crate) fn from_columns(
        real: &[&Array1<f64>],
        imag: &[&Array1<f64>],
        num_eigenvalues: usize,
        rows: usize,
    ) -> Result<Self> {
        let total = real.len() + imag.len();
        if total == 0 {
            return Err(FilterError::NoConvergedModes);
        }
        check_column_bound(total, num_eigenvalues)?;

        let mut data = allocate(rows, total)?;
        for column in real.iter().chain(imag) {
            data.extend(column.iter().copied());
        }

        Ok(Self {
            rows,
            num_real: real.len(),
            num_imag: imag.len(),
            data,
        })
    }

    /// Local rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Real eigenvector columns
    pub fn num_real(&self) -> usize {
        self.num_real
    }

    /// Imaginary eigenvector columns
    pub fn num_imag(&self) -> usize {
        self.num_imag
    }

    /// Total columns
    pub fn num_columns(&self) -> usize {
        self.num_real + self.num_imag
    }

    /// Column-major storage, entry `(i, j)` at `i + j * rows`
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Column `j`
    pub fn column(&self, j: usize) -> ArrayView1<'_, f64> {
        ArrayView1::from(&self.data[j * self.rows..(j + 1) * self.rows])
    }

    /// The real eigenvector columns
    pub fn real_columns(&self) -> &[f64] {
        &self.data[..self.num_real * self.rows]
    }

    /// Matrix view of the basis
    pub fn view(&self) -> ArrayView2<'_, f64> {
        ArrayView2::from_shape((self.rows, self.num_columns()).f(), &self.data)
            .expect("buffer holds rows * columns entries")
    }
}

/// `NumReal + NumImag < 2 * NumEigenvalues + 1`
fn check_column_bound(columns: usize, num_eigenvalues: usize) -> Result<()> {
    if columns > 2 * num_eigenvalues {
        return Err(EigenError::TooManyModes {
            columns,
            num_eigenvalues,
        }
        .into());
    }
    Ok(())
}

/// Empty buffer with room for `rows × columns` doubles
pub(crate) fn allocate(rows: usize, columns: usize) -> Result<Vec<f64>> {
    let len = rows.checked_mul(columns);
    let bytes = len.and_then(|n| n.checked_mul(std::mem::size_of::<f64>()));
    let (Some(len), Some(bytes)) = (len, bytes) else {
        return Err(FilterError::AllocationFailure { bytes: usize::MAX });
    };

    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| FilterError::AllocationFailure { bytes })?;
    Ok(data)
}

fn usable_columns<'v>(
    columns: Vec<&'v Array1<f64>>,
    rows: usize,
    kind: &str,
    comm: &dyn Communicator,
) -> Vec<&'v Array1<f64>> {
    let mut kept = Vec::with_capacity(columns.len());
    for (j, column) in columns.into_iter().enumerate() {
        let local_ok = column.len() == rows && column.iter().all(|v| v.is_finite());
        if !comm.all_true(local_ok) {
            if comm.rank() == 0 {
                log::warn!("dropping {kind} eigenvector {j}: non-finite entries or wrong length");
            }
            continue;
        }
        if comm.norm(column) == 0.0 {
            if comm.rank() == 0 {
                log::warn!("dropping {kind} eigenvector {j}: zero norm");
            }
            continue;
        }
        kept.push(column);
    }
    kept
}
