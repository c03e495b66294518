//! Eigensolver service
//!
//! The filtering setup asks an [`EigenSolverService`] for the dominant
//! eigenpairs of a distributed operator. [`KrylovSchur`] is the built-in
//! block Krylov-Schur solver; it runs on every participant in lockstep and
//! only communicates through global reductions.

pub mod dense;
mod krylov;

pub use krylov::KrylovSchur;

use crate::comm::Communicator;
use ndarray::Array1;
use num_complex::Complex64;
use thiserror::Error;

/// Errors raised by the eigensolvers
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EigenError {
    /// The dense QR iteration did not converge
    #[error("dense QR iteration did not converge on a {size}x{size} matrix in {iterations} iterations")]
    DenseNoConvergence {
        /// Matrix size
        size: usize,
        /// Iteration budget
        iterations: usize,
    },

    /// The solver returned more basis columns than the requested eigenvalues allow
    #[error(
        "eigensolver returned {columns} basis columns for {num_eigenvalues} requested \
         eigenvalue(s); at most {max} are allowed",
        max = 2 * .num_eigenvalues
    )]
    TooManyModes {
        /// Real plus imaginary columns returned
        columns: usize,
        /// `filtering: eigenvalues to compute`
        num_eigenvalues: usize,
    },

    /// LAPACK rejected the Rayleigh-Ritz matrix
    #[cfg(feature = "ndarray-linalg")]
    #[error("LAPACK eigensolver failed: {0}")]
    Lapack(String),

    /// An operator or matrix has inconsistent dimensions
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected size
        expected: usize,
        /// Actual size
        got: usize,
    },
}

/// Operator whose spectrum is analysed, acting on the local part of a
/// distributed vector
pub trait SpectralOperator: Sync {
    /// Local vector length
    fn local_len(&self) -> usize;

    /// Apply the operator to the local part of `x`
    fn apply(&self, x: &Array1<f64>) -> Array1<f64>;
}

/// Solver parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EigenParameters {
    /// Requested number of eigenvalues; a complex conjugate pair counts twice
    pub num_eigenvalues: usize,
    /// Maximum dimension of the search subspace
    pub length: usize,
    /// Number of vectors added per expansion step
    pub block_size: usize,
    /// Relative residual tolerance `‖Ax - θx‖ ≤ tol |θ| ‖x‖`
    pub tolerance: f64,
    /// Maximum number of restarts
    pub max_restarts: usize,
    /// Seed of the random starting block, offset by the participant rank
    pub seed: u64,
}

impl Default for EigenParameters {
    fn default() -> Self {
        Self {
            num_eigenvalues: 5,
            length: 6,
            block_size: 1,
            tolerance: 1e-5,
            max_restarts: 50,
            seed: 0,
        }
    }
}

/// Converged eigenpair with its eigenvector split in real and imaginary parts
///
/// For a complex conjugate pair only the member with positive imaginary part
/// is stored.
#[derive(Debug, Clone)]
pub struct EigenPair {
    /// Eigenvalue
    pub eigenvalue: Complex64,
    /// Real part of the eigenvector (local rows)
    pub real: Array1<f64>,
    /// Imaginary part of the eigenvector, zero for real eigenvalues
    pub imag: Array1<f64>,
}

impl EigenPair {
    /// Whether the eigenvalue has a nonzero imaginary part
    pub fn is_complex(&self) -> bool {
        self.eigenvalue.im != 0.0
    }
}

/// Result of an eigensolver run
#[derive(Debug, Clone, Default)]
pub struct EigenDecomposition {
    /// Wanted Ritz values in decreasing modulus, conjugates included,
    /// converged or not
    pub eigenvalues: Vec<Complex64>,
    /// Converged eigenpairs
    pub pairs: Vec<EigenPair>,
    /// Restarts performed
    pub restarts: usize,
}

impl EigenDecomposition {
    /// Number of real eigenvector columns (one per converged pair)
    pub fn num_real(&self) -> usize {
        self.pairs.len()
    }

    /// Number of imaginary eigenvector columns (one per complex pair)
    pub fn num_imag(&self) -> usize {
        self.pairs.iter().filter(|p| p.is_complex()).count()
    }
}

/// Computes dominant eigenpairs of a distributed operator
pub trait EigenSolverService: Send + Sync {
    /// Run the solver; every participant must call this collectively
    fn compute(
        &self,
        operator: &dyn SpectralOperator,
        comm: &dyn Communicator,
        params: &EigenParameters,
    ) -> Result<EigenDecomposition, EigenError>;
}
