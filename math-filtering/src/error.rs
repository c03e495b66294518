//! Error types for preconditioner filtering
//!
//! Every condition that aborts a filtering setup is a variant of
//! [`FilterError`]. The caller decides whether to abort the distributed run
//! or retry with other options.

use crate::eigen::EigenError;
use crate::params::ParameterError;
use math_audio_multigrid::MultigridError;
use thiserror::Error;

/// Errors that can occur while setting up a filtered preconditioner
#[derive(Debug, Error)]
pub enum FilterError {
    /// `filtering: type` names no known strategy
    #[error(
        "value of option `filtering: type' not correct ({name}); \
         it should be: <projection> / <ml-cycle> / <enhanced> / <let ML be my master>"
    )]
    InvalidStrategy {
        /// Rejected name
        name: String,
    },

    /// `filtering: eigensolver` names no known solver
    #[error(
        "value of option `filtering: eigensolver' not correct ({name}); \
         it should be: <ARPACK> / <Anasazi>"
    )]
    InvalidEigensolver {
        /// Rejected name
        name: String,
    },

    /// A single-participant path was requested on a larger group
    #[error("{what} can be used only with 1 process, got {participants}{hint}")]
    SingleProcessRequired {
        /// Offending solver or strategy
        what: &'static str,
        /// Group size
        participants: usize,
        /// Advice for multi-process runs
        hint: &'static str,
    },

    /// The eigensolver returned no usable mode
    #[error(
        "eigensolver has computed no nonzero eigenvalues; this sometimes happens \
         because the fine grid matrix is too small, try to change the eigen-analysis \
         parameters or drop the filtering correction"
    )]
    NoConvergedModes,

    /// The Gram matrix of the basis cannot be inverted
    #[error("Gram matrix of the filtering basis is singular: {0}")]
    SingularGramMatrix(#[source] math_audio_multigrid::LuError),

    /// The Galerkin operator `QᵀAQ` of the cycle augmentation is singular
    #[error("coarse operator of the augmented cycle is singular: {0}")]
    SingularCoarseOperator(#[source] math_audio_multigrid::LuError),

    /// The requested eigensolver backend was compiled out
    #[error("eigensolver backend `{backend}` is not available; enable the `{feature}` feature")]
    SolverUnavailable {
        /// Solver name as given in the options
        backend: &'static str,
        /// Cargo feature providing it
        feature: &'static str,
    },

    /// A basis buffer cannot be allocated
    #[error("not enough space to allocate {bytes} bytes for filtering")]
    AllocationFailure {
        /// Requested size
        bytes: usize,
    },

    /// Another participant failed its own validation
    #[error("filtering aborted: another participant reported an error")]
    PeerFailure,

    /// An option holds the wrong type
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    /// The eigensolver failed
    #[error(transparent)]
    Eigen(#[from] EigenError),

    /// Building a multigrid hierarchy failed
    #[error(transparent)]
    Multigrid(#[from] MultigridError),
}

/// A specialized `Result` type for filtering operations.
pub type Result<T> = std::result::Result<T, FilterError>;

impl FilterError {
    /// Returns `true` for errors caused by the option values.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            FilterError::InvalidStrategy { .. }
                | FilterError::InvalidEigensolver { .. }
                | FilterError::SingleProcessRequired { .. }
                | FilterError::Parameter(_)
        )
    }

    /// Returns `true` for numerically degenerate input.
    pub fn is_numerical_error(&self) -> bool {
        matches!(
            self,
            FilterError::NoConvergedModes
                | FilterError::SingularGramMatrix(_)
                | FilterError::SingularCoarseOperator(_)
                | FilterError::Eigen(_)
        )
    }
}
