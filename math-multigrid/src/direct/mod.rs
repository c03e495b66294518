//! Direct solvers for linear systems
//!
//! - [`lu_solve`]: LU decomposition with partial pivoting
//! - [`LuFactorization::inverse`]: explicit inverse of small dense matrices

mod lu;

pub use lu::{LuError, LuFactorization, lu_factorize, lu_solve};
