//! Iterative solvers for linear systems
//!
//! - [`gmres`]: GMRES(m) with restart, for general non-symmetric systems
//! - [`gmres_preconditioned`]: left-preconditioned GMRES(m)

mod gmres;

pub use gmres::{GmresConfig, GmresSolution, gmres, gmres_preconditioned};
