//! Additive Galerkin correction on the eigenbasis

use super::null_space::NullSpaceBasis;
use crate::error::{FilterError, Result};
use math_audio_multigrid::{CsrMatrix, LuFactorization, lu_factorize};
use ndarray::Array1;

/// Coarse space spanned by the basis, solved directly
///
/// `Q` is the basis as a sparse `rows × k` operator; the correction of a
/// residual `s` is `Q (QᵀAQ)⁻¹ Qᵀ s`.
#[derive(Debug, Clone)]
pub struct CycleAugmentation {
    q: CsrMatrix,
    coarse: LuFactorization,
}

impl CycleAugmentation {
    /// Build `Q` and factorize `QᵀAQ`
    pub fn build(matrix: &CsrMatrix, basis: &NullSpaceBasis) -> Result<Self> {
        let q = CsrMatrix::from_column_major(basis.rows(), basis.num_columns(), basis.as_slice());
        let galerkin = q.transpose().matmul(&matrix.matmul(&q)).to_dense();
        let coarse = lu_factorize(&galerkin).map_err(FilterError::SingularCoarseOperator)?;

        log::debug!(
            "augmented cycle: Q is {}x{} with {} non-zeros",
            q.num_rows,
            q.num_cols,
            q.nnz()
        );

        Ok(Self { q, coarse })
    }

    /// The operator `Q`
    pub fn operator(&self) -> &CsrMatrix {
        &self.q
    }

    /// Dimension of the added coarse space
    pub fn coarse_size(&self) -> usize {
        self.coarse.n
    }

    /// `Q (QᵀAQ)⁻¹ Qᵀ s`
    pub fn correct(&self, s: &Array1<f64>) -> Array1<f64> {
        let restricted = self.q.matvec_transpose(s);
        match self.coarse.solve(&restricted) {
            Ok(y) => self.q.matvec(&y),
            Err(err) => {
                log::warn!("augmented coarse solve failed, correction dropped: {err}");
                Array1::zeros(s.len())
            }
        }
    }
}
