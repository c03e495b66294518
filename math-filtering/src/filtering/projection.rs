//! Oblique projection onto the eigenbasis
//!
//! With the basis columns `b_i` as restriction rows, the correction of a
//! residual `s` is `B G⁻¹ Bᵀ s` where `G = BᵀB` is the Gram matrix. Both `G`
//! and `Bᵀ s` are global reductions; `G⁻¹` is formed once at setup.

use super::null_space::NullSpaceBasis;
use crate::comm::Communicator;
use crate::error::{FilterError, Result};
use math_audio_multigrid::lu_factorize;
use ndarray::{Array1, Array2};

/// Installed projection correction
#[derive(Debug, Clone)]
pub struct ProjectionCorrection {
    basis: Array2<f64>,
    gram: Array2<f64>,
    gram_inverse: Array2<f64>,
}

impl ProjectionCorrection {
    /// Form and invert the Gram matrix of `basis` (collective)
    pub fn build(basis: &NullSpaceBasis, comm: &dyn Communicator) -> Result<Self> {
        let k = basis.num_columns();
        let columns = basis.view();

        // Upper triangle, mirrored, then one reduction for the whole matrix
        let mut packed = vec![0.0; k * k];
        for i in 0..k {
            for j in i..k {
                let value = columns.column(i).dot(&columns.column(j));
                packed[i * k + j] = value;
                packed[j * k + i] = value;
            }
        }
        comm.sum_all(&mut packed);

        let gram = Array2::from_shape_vec((k, k), packed)
            .expect("packed Gram matrix has k * k entries");
        let gram_inverse = lu_factorize(&gram)
            .and_then(|lu| lu.inverse())
            .map_err(FilterError::SingularGramMatrix)?;

        log::debug!("projection basis with {k} columns installed");

        Ok(Self {
            basis: columns.to_owned(),
            gram,
            gram_inverse,
        })
    }

    /// Number of basis columns
    pub fn dim(&self) -> usize {
        self.gram.nrows()
    }

    /// The Gram matrix `BᵀB`
    pub fn gram(&self) -> &Array2<f64> {
        &self.gram
    }

    /// Its inverse
    pub fn gram_inverse(&self) -> &Array2<f64> {
        &self.gram_inverse
    }

    /// `B G⁻¹ Bᵀ s` (collective)
    pub fn correct(&self, s: &Array1<f64>, comm: &dyn Communicator) -> Array1<f64> {
        let mut restricted = self.basis.t().dot(s).to_vec();
        comm.sum_all(&mut restricted);
        let coefficients = self.gram_inverse.dot(&Array1::from(restricted));
        self.basis.dot(&coefficients)
    }
}
