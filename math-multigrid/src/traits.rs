//! Operator seams used by the Krylov solver and the multigrid cycle

use ndarray::Array1;

/// Anything that maps a vector of length `num_cols` to one of length `num_rows`
pub trait LinearOperator: Send + Sync {
    fn num_rows(&self) -> usize;

    fn num_cols(&self) -> usize;

    /// `y = A x`
    fn apply(&self, x: &Array1<f64>) -> Array1<f64>;
}

/// Approximate inverse `M ≈ A⁻¹` applied to residuals
///
/// The multigrid hierarchy, with or without a spectral correction, is the
/// main implementor.
pub trait Preconditioner: Send + Sync {
    fn apply(&self, r: &Array1<f64>) -> Array1<f64>;
}

/// `M = I`
#[derive(Clone, Debug, Default)]
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &Array1<f64>) -> Array1<f64> {
        r.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_identity_preconditioner() {
        let precond = IdentityPreconditioner;
        let r = array![1.0, -2.0, 3.5];
        assert_eq!(precond.apply(&r), r);
    }
}
