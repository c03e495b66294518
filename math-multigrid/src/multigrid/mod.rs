//! Smoothed-aggregation multigrid
//!
//! - [`aggregation`]: node graph and aggregation schemes
//! - [`prolongation`]: tentative and smoothed prolongators
//! - [`smoother`]: Jacobi and symmetric Gauss-Seidel relaxation
//! - [`MultigridHierarchy`]: level hierarchy and V-cycle

pub mod aggregation;
mod hierarchy;
mod null_space;
pub mod prolongation;
mod smoother;

pub use aggregation::{AggregationScheme, Aggregates};
pub use hierarchy::{CycleForm, MultigridConfig, MultigridDiagnostics, MultigridHierarchy};
pub use null_space::NullSpace;
pub use smoother::{SmootherConfig, SmootherType};
