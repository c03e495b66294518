//! Spectral filtering for aggregation multigrid
//!
//! A multigrid cycle `M` leaves a few error modes almost undamped; they are
//! the dominant eigenvectors of the iteration operator `I - M⁻¹A`. This crate
//! computes them with a block Krylov-Schur eigensolver and feeds them back into
//! the preconditioner, either as an oblique projection, as an extra coarse
//! space in the cycle, as the candidate null space of an auxiliary two-level
//! hierarchy, or as additional null-space vectors for rebuilding the primary
//! hierarchy.
//!
//! # Example
//!
//! ```ignore
//! use math_audio_filtering::{MultiLevelPreconditioner, ParameterList, SerialComm};
//!
//! let params = ParameterList::new()
//!     .with("filtering: enable", true)
//!     .with("filtering: type", "projection")
//!     .with("filtering: eigenvalues to compute", 4);
//! let mut precond = MultiLevelPreconditioner::new(&matrix, params, &SerialComm)?;
//! precond.set_filtering()?;
//! let solution = gmres_preconditioned(&matrix, &precond, &rhs, &GmresConfig::default());
//! ```
//!
//! Participants of a distributed run each own a block of rows and talk
//! through a [`Communicator`]; every setup routine is collective.

pub mod comm;
pub mod eigen;
pub mod error;
pub mod filtering;
pub mod params;
pub mod preconditioner;

pub use comm::{Communicator, SerialComm, ThreadComm};
pub use eigen::{
    EigenDecomposition, EigenError, EigenPair, EigenParameters, EigenSolverService, KrylovSchur,
    SpectralOperator,
};
pub use error::{FilterError, Result};
pub use filtering::{
    CorrectionArtifact, EigenSolverKind, FilterConfiguration, FilterOutcome, FilterStrategy,
    IterationOperator,
};
pub use params::{ParameterError, ParameterList, ParameterValue, PrefixedParameters};
pub use preconditioner::MultiLevelPreconditioner;
