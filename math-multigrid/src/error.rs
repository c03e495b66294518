//! Error types for multigrid setup

use crate::direct::LuError;
use thiserror::Error;

/// Errors raised while building a multigrid hierarchy
#[derive(Debug, Error)]
pub enum MultigridError {
    /// The operator is not square
    #[error("operator must be square, got {rows}x{cols}")]
    NonSquareOperator {
        /// Number of rows
        rows: usize,
        /// Number of columns
        cols: usize,
    },

    /// The row count is not a multiple of the number of PDE equations
    #[error("{rows} rows cannot be split into nodes of {num_pde_eqns} equations")]
    BlockSizeMismatch {
        /// Number of rows of the operator
        rows: usize,
        /// Equations per node
        num_pde_eqns: usize,
    },

    /// The candidate null space does not match the operator
    #[error("null space has {got} rows, operator has {expected}")]
    NullSpaceDimension {
        /// Rows of the operator
        expected: usize,
        /// Rows of the null space
        got: usize,
    },

    /// A flat null-space buffer has the wrong length
    #[error("null-space buffer holds {got} values, expected {expected}")]
    NullSpaceBuffer {
        /// rows * dimension
        expected: usize,
        /// Actual buffer length
        got: usize,
    },

    /// The null space has no columns
    #[error("null space is empty")]
    EmptyNullSpace,

    /// The coarsest operator could not be factorized
    #[error("coarse solver failed on level {level}: {source}")]
    CoarseSolver {
        /// Index of the coarsest level
        level: usize,
        /// Underlying factorization error
        #[source]
        source: LuError,
    },
}

/// A specialized `Result` type for multigrid setup.
pub type Result<T> = std::result::Result<T, MultigridError>;
