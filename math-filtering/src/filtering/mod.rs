//! Spectral filtering of a multigrid preconditioner
//!
//! The dominant eigenmodes of the iteration operator `I - M⁻¹A` are the error
//! components the cycle `M` fails to damp. Once computed, they are used in one
//! of four ways:
//!
//! | `filtering: type`       | Strategy                                  |
//! |-------------------------|-------------------------------------------|
//! | `projection`            | [`ProjectionCorrection`]                  |
//! | `ml-cycle`              | [`CycleAugmentation`]                     |
//! | `enhanced`              | [`HierarchyFattening`]                    |
//! | `let ML be my master`   | [`ExportedNullSpace`]                     |

pub mod config;
mod cycle_augmentation;
mod export;
mod fattening;
mod null_space;
mod projection;
pub mod strategy;

pub use config::FilterConfiguration;
pub use cycle_augmentation::CycleAugmentation;
pub use export::ExportedNullSpace;
pub use fattening::HierarchyFattening;
pub use null_space::NullSpaceBasis;
pub use projection::ProjectionCorrection;
pub use strategy::{EigenSolverKind, FilterPlan, FilterStrategy};

use crate::comm::Communicator;
use crate::eigen::SpectralOperator;
use math_audio_multigrid::{CsrMatrix, MultigridHierarchy, Preconditioner};
use ndarray::Array1;

/// The iteration operator `x ↦ x - M⁻¹(Ax)` of one V-cycle
pub struct IterationOperator<'h, 'a> {
    matrix: &'h CsrMatrix,
    cycle: &'h MultigridHierarchy<'a>,
}

impl<'h, 'a> IterationOperator<'h, 'a> {
    /// Wrap `matrix` and its cycle
    pub fn new(matrix: &'h CsrMatrix, cycle: &'h MultigridHierarchy<'a>) -> Self {
        Self { matrix, cycle }
    }
}

impl SpectralOperator for IterationOperator<'_, '_> {
    fn local_len(&self) -> usize {
        self.matrix.num_rows
    }

    fn apply(&self, x: &Array1<f64>) -> Array1<f64> {
        x - &self.cycle.apply(&self.matrix.matvec(x))
    }
}

/// Correction installed by a successful setup
pub enum CorrectionArtifact<'a> {
    /// `B G⁻¹ Bᵀ`
    Projection(ProjectionCorrection),
    /// `Q (QᵀAQ)⁻¹ Qᵀ`
    CycleAugmentation(CycleAugmentation),
    /// Auxiliary V-cycle
    HierarchyFattening(HierarchyFattening<'a>),
    /// Buffer waiting to be turned into a null space
    NullSpaceExport(ExportedNullSpace),
}

impl CorrectionArtifact<'_> {
    /// Strategy that produced the artifact
    pub fn strategy(&self) -> FilterStrategy {
        match self {
            Self::Projection(_) => FilterStrategy::Projection,
            Self::CycleAugmentation(_) => FilterStrategy::CycleAugmentation,
            Self::HierarchyFattening(_) => FilterStrategy::HierarchyFattening,
            Self::NullSpaceExport(_) => FilterStrategy::NullSpaceExport,
        }
    }

    /// Correction for the residual `s`; `None` when the artifact does not act
    /// on residuals
    pub fn correct(&self, s: &Array1<f64>, comm: &dyn Communicator) -> Option<Array1<f64>> {
        match self {
            Self::Projection(p) => Some(p.correct(s, comm)),
            Self::CycleAugmentation(c) => Some(c.correct(s)),
            Self::HierarchyFattening(f) => Some(f.correct(s)),
            Self::NullSpaceExport(_) => None,
        }
    }
}

/// Result of a filtering setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// `filtering: enable` is off, nothing was done
    Disabled,
    /// A correction is installed
    Installed(FilterStrategy),
    /// A combined null space of `dimension` columns is ready for export
    Exported {
        /// Columns of the exported null space
        dimension: usize,
    },
}

impl FilterOutcome {
    /// Integer status: `-1` when disabled, the exported dimension, otherwise `0`
    pub fn code(&self) -> i64 {
        match self {
            Self::Disabled => -1,
            Self::Installed(_) => 0,
            Self::Exported { dimension } => i64::try_from(*dimension).unwrap_or(i64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use math_audio_multigrid::MultigridConfig;

    #[test]
    fn test_outcome_codes() {
        assert_eq!(FilterOutcome::Disabled.code(), -1);
        assert_eq!(FilterOutcome::Installed(FilterStrategy::Projection).code(), 0);
        assert_eq!(FilterOutcome::Exported { dimension: 7 }.code(), 7);
    }

    #[test]
    fn test_iteration_operator_vanishes_for_direct_solve() {
        let a = CsrMatrix::from_triplets(
            3,
            3,
            vec![
                (0, 0, 2.0),
                (0, 1, -1.0),
                (1, 0, -1.0),
                (1, 1, 2.0),
                (1, 2, -1.0),
                (2, 1, -1.0),
                (2, 2, 2.0),
            ],
        );
        // Fewer rows than the coarse size: the cycle is an exact solve
        let hierarchy = MultigridHierarchy::build(&a, &MultigridConfig::default()).unwrap();
        let operator = IterationOperator::new(&a, &hierarchy);
        assert_eq!(operator.local_len(), 3);

        let x = Array1::from(vec![1.0, -2.0, 0.5]);
        assert!(operator.apply(&x).iter().all(|v| v.abs() < 1e-12));
    }
}
