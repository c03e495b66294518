//! Level smoothers

use crate::sparse::CsrMatrix;
use ndarray::Array1;

/// Diagonal entries smaller than this are skipped by the smoothers
const DIAGONAL_TOLERANCE: f64 = 1e-15;

/// Relaxation method applied before and after the coarse correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmootherType {
    /// Damped Jacobi: `x += ω D⁻¹ (b - A x)`
    Jacobi,

    /// Forward then backward Gauss-Seidel sweep
    #[default]
    SymmetricGaussSeidel,
}

/// Smoother settings for every non-coarsest level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmootherConfig {
    /// Relaxation method
    pub kind: SmootherType,
    /// Sweeps before and after the coarse correction
    pub sweeps: usize,
    /// Jacobi damping factor (ignored by Gauss-Seidel)
    pub damping: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            kind: SmootherType::default(),
            sweeps: 1,
            damping: 0.67,
        }
    }
}

impl SmootherConfig {
    /// Run `sweeps` relaxation sweeps on `A x = b`
    pub fn smooth(&self, matrix: &CsrMatrix, x: &mut Array1<f64>, b: &Array1<f64>) {
        match self.kind {
            SmootherType::Jacobi => smooth_jacobi(matrix, x, b, self.damping, self.sweeps),
            SmootherType::SymmetricGaussSeidel => {
                smooth_sym_gauss_seidel(matrix, x, b, self.sweeps)
            }
        }
    }
}

fn smooth_jacobi(
    matrix: &CsrMatrix,
    x: &mut Array1<f64>,
    b: &Array1<f64>,
    omega: f64,
    num_sweeps: usize,
) {
    let diag = matrix.diagonal();
    for _ in 0..num_sweeps {
        let r = b - &matrix.matvec(x);
        for i in 0..x.len() {
            if diag[i].abs() > DIAGONAL_TOLERANCE {
                x[i] += omega * r[i] / diag[i];
            }
        }
    }
}

fn smooth_sym_gauss_seidel(
    matrix: &CsrMatrix,
    x: &mut Array1<f64>,
    b: &Array1<f64>,
    num_sweeps: usize,
) {
    let n = x.len();
    for _ in 0..num_sweeps {
        for i in 0..n {
            relax_row(matrix, x, b, i);
        }
        for i in (0..n).rev() {
            relax_row(matrix, x, b, i);
        }
    }
}

#[inline]
fn relax_row(matrix: &CsrMatrix, x: &mut Array1<f64>, b: &Array1<f64>, i: usize) {
    let mut sum = b[i];
    let mut diag = 0.0;
    for (j, val) in matrix.row_entries(i) {
        if j == i {
            diag = val;
        } else {
            sum -= val * x[j];
        }
    }
    if diag.abs() > DIAGONAL_TOLERANCE {
        x[i] = sum / diag;
    }
}
