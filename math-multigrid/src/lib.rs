//! Sparse kernels and aggregation multigrid
//!
//! This crate provides the linear-algebra substrate of the filtering
//! preconditioners: CSR matrices, a dense LU for small and coarse systems,
//! restarted GMRES, and a smoothed-aggregation multigrid hierarchy.
//!
//! # Example
//!
//! ```ignore
//! use math_audio_multigrid::{
//!     CsrMatrix, GmresConfig, MultigridConfig, MultigridHierarchy, gmres_preconditioned,
//! };
//!
//! let matrix = CsrMatrix::from_triplets(n, n, triplets);
//! let hierarchy = MultigridHierarchy::build(&matrix, &MultigridConfig::default())?;
//! let solution = gmres_preconditioned(&matrix, &hierarchy, &rhs, &GmresConfig::default());
//! ```

pub mod blas_helpers;
pub mod direct;
pub mod error;
pub mod iterative;
pub mod multigrid;
pub mod sparse;
pub mod traits;

pub use error::{MultigridError, Result};
pub use sparse::CsrMatrix;
pub use traits::{IdentityPreconditioner, LinearOperator, Preconditioner};

pub use direct::{LuError, LuFactorization, lu_factorize, lu_solve};
pub use iterative::{GmresConfig, GmresSolution, gmres, gmres_preconditioned};

pub use multigrid::{
    AggregationScheme, CycleForm, MultigridConfig, MultigridDiagnostics, MultigridHierarchy,
    NullSpace, SmootherConfig, SmootherType,
};
