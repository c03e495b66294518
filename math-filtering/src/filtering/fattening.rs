//! Auxiliary two-level hierarchy on the eigenbasis
//!
//! The fine level borrows the primary operator. Aggregates come from a graph
//! partition with a fixed count per participant, and the tentative prolongator
//! is built from the eigenbasis as candidate null space. No smoothing is
//! applied anywhere, so one cycle is a pure coarse-grid correction.

use super::null_space::NullSpaceBasis;
use crate::error::Result;
use math_audio_multigrid::{
    AggregationScheme, CsrMatrix, MultigridConfig, MultigridHierarchy, NullSpace, Preconditioner,
};
use ndarray::Array1;

/// Installed auxiliary hierarchy
pub struct HierarchyFattening<'a> {
    hierarchy: MultigridHierarchy<'a>,
}

impl<'a> HierarchyFattening<'a> {
    /// Build the two-level hierarchy on `matrix`
    pub fn build(
        matrix: &'a CsrMatrix,
        basis: &NullSpaceBasis,
        num_pde_eqns: usize,
        local_aggregates: usize,
    ) -> Result<Self> {
        let null_space =
            NullSpace::from_column_major(basis.rows(), basis.num_columns(), basis.as_slice())?;
        let config = MultigridConfig {
            max_levels: 2,
            max_coarse_size: 1,
            scheme: AggregationScheme::Partition {
                local_aggregates: local_aggregates.max(1),
            },
            threshold: 0.0,
            damping_factor: 0.0,
            num_pde_eqns,
            null_space: Some(null_space),
            smoother: None,
        };

        let hierarchy = MultigridHierarchy::build(matrix, &config)?;
        if hierarchy.num_levels() < 2 {
            log::warn!(
                "auxiliary hierarchy could not coarsen {} rows, the correction is a direct solve",
                hierarchy.num_rows()
            );
        } else {
            let diagnostics = hierarchy.diagnostics();
            log::debug!(
                "auxiliary hierarchy: levels {:?}, setup {:.2} ms",
                diagnostics.level_dofs,
                diagnostics.setup_time_ms
            );
        }

        Ok(Self { hierarchy })
    }

    /// The auxiliary hierarchy
    pub fn hierarchy(&self) -> &MultigridHierarchy<'a> {
        &self.hierarchy
    }

    /// One auxiliary V-cycle on the residual `s`
    pub fn correct(&self, s: &Array1<f64>) -> Array1<f64> {
        self.hierarchy.apply(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn laplacian_1d(n: usize) -> CsrMatrix {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
            }
        }
        CsrMatrix::from_triplets(n, n, triplets)
    }

    #[test]
    fn test_borrows_primary_operator() {
        let a = laplacian_1d(8);
        let ones = Array1::<f64>::ones(8);
        let ramp = Array1::from_iter((0..8).map(|i| i as f64));
        let basis = NullSpaceBasis::from_columns(&[&ones, &ramp], &[], 2, 8).unwrap();

        let fattening = HierarchyFattening::build(&a, &basis, 1, 2).unwrap();
        let hierarchy = fattening.hierarchy();
        assert!(hierarchy.shares_finest_with(&a));
        assert_eq!(hierarchy.num_levels(), 2);
        // Two aggregates with two candidate vectors each
        assert_eq!(hierarchy.level_matrix(1).map(|m| m.num_rows), Some(4));
    }

    #[test]
    fn test_correction_is_exact_on_the_basis() {
        // Single aggregate spanning a linear basis: the correction reproduces
        // any solution that is itself linear
        let a = laplacian_1d(6);
        let ones = Array1::<f64>::ones(6);
        let ramp = Array1::from_iter((0..6).map(|i| i as f64));
        let basis = NullSpaceBasis::from_columns(&[&ones, &ramp], &[], 2, 6).unwrap();
        let fattening = HierarchyFattening::build(&a, &basis, 1, 1).unwrap();

        let x = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let s = a.matvec(&x);
        let corrected = fattening.correct(&s);
        for (c, expected) in corrected.iter().zip(x.iter()) {
            assert_relative_eq!(*c, *expected, epsilon = 1e-10);
        }
    }
}
