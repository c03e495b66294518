//! Dense `PA = LU` with partial pivoting
//!
//! Serves the coarsest multigrid level and the small Gram and Galerkin
//! matrices built by the spectral corrections.

use ndarray::{Array1, Array2};
use thiserror::Error;

#[cfg(feature = "ndarray-linalg")]
use ndarray_linalg::Solve;

/// Pivots smaller than this fraction of the largest matrix entry are singular
const RELATIVE_PIVOT_TOLERANCE: f64 = 1e-13;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LuError {
    #[error("numerically singular matrix: pivot {pivot:.3e} in column {column}")]
    SingularMatrix { column: usize, pivot: f64 },
    #[error("dimension mismatch: expected {expected}, found {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[cfg(feature = "ndarray-linalg")]
    #[error("LAPACK solve failed: {0}")]
    Lapack(String),
}

/// Packed factors of a square matrix
#[derive(Debug, Clone)]
pub struct LuFactorization {
    /// Strict lower part holds the unit-diagonal `L`, the rest holds `U`
    pub lu: Array2<f64>,
    /// Row permutation: row `i` of the factors is row `pivots[i]` of the input
    pub pivots: Vec<usize>,
    pub n: usize,
}

impl LuFactorization {
    /// Solve `A x = b` with the stored factors
    pub fn solve(&self, b: &Array1<f64>) -> Result<Array1<f64>, LuError> {
        if b.len() != self.n {
            return Err(LuError::DimensionMismatch {
                expected: self.n,
                got: b.len(),
            });
        }

        let lu = &self.lu;
        let mut x = Array1::from_iter(self.pivots.iter().map(|&p| b[p]));
        for i in 1..self.n {
            let lower: f64 = (0..i).map(|j| lu[[i, j]] * x[j]).sum();
            x[i] -= lower;
        }
        for i in (0..self.n).rev() {
            let upper: f64 = (i + 1..self.n).map(|j| lu[[i, j]] * x[j]).sum();
            x[i] = (x[i] - upper) / lu[[i, i]];
        }
        Ok(x)
    }

    /// Explicit inverse, one solve per unit vector
    pub fn inverse(&self) -> Result<Array2<f64>, LuError> {
        let mut inv = Array2::zeros((self.n, self.n));
        let mut unit = Array1::zeros(self.n);
        for j in 0..self.n {
            unit[j] = 1.0;
            let column = self.solve(&unit)?;
            inv.column_mut(j).assign(&column);
            unit[j] = 0.0;
        }
        Ok(inv)
    }
}

/// Factor `a`, failing on pivots below a relative threshold
pub fn lu_factorize(a: &Array2<f64>) -> Result<LuFactorization, LuError> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(LuError::DimensionMismatch {
            expected: n,
            got: a.ncols(),
        });
    }

    let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let tolerance = RELATIVE_PIVOT_TOLERANCE * scale.max(f64::MIN_POSITIVE);

    let mut lu = a.clone();
    let mut pivots: Vec<usize> = (0..n).collect();

    for k in 0..n {
        let (p, magnitude) = (k..n)
            .map(|i| (i, lu[[i, k]].abs()))
            .fold((k, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best });
        if magnitude <= tolerance {
            return Err(LuError::SingularMatrix {
                column: k,
                pivot: magnitude,
            });
        }
        if p != k {
            for j in 0..n {
                lu.swap([k, j], [p, j]);
            }
            pivots.swap(k, p);
        }

        let diag = lu[[k, k]];
        for i in k + 1..n {
            let l_ik = lu[[i, k]] / diag;
            lu[[i, k]] = l_ik;
            for j in k + 1..n {
                let u_kj = lu[[k, j]];
                lu[[i, j]] -= l_ik * u_kj;
            }
        }
    }

    Ok(LuFactorization { lu, pivots, n })
}

/// Factor and solve in one call
pub fn lu_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, LuError> {
    #[cfg(feature = "ndarray-linalg")]
    {
        if a.nrows() != a.ncols() || b.len() != a.nrows() {
            return Err(LuError::DimensionMismatch {
                expected: a.nrows(),
                got: if a.nrows() != a.ncols() { a.ncols() } else { b.len() },
            });
        }
        a.solve(b).map_err(|err| LuError::Lapack(err.to_string()))
    }

    #[cfg(not(feature = "ndarray-linalg"))]
    {
        lu_factorize(a)?.solve(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_lu_solve_real() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let b = array![1.0, 2.0];

        let x = lu_solve(&a, &b).expect("LU solve should succeed");

        let ax = a.dot(&x);
        for i in 0..2 {
            assert_relative_eq!(ax[i], b[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_lu_needs_pivoting() {
        let a = array![[0.0, 2.0, 1.0], [1.0, 1.0, 0.0], [3.0, 0.0, 1.0]];
        let b = array![3.0, 2.0, 4.0];

        let x = lu_solve(&a, &b).expect("LU solve should succeed");

        let ax = a.dot(&x);
        for i in 0..3 {
            assert_relative_eq!(ax[i], b[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_lu_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let b = array![1.0, 2.0];

        let result = lu_solve(&a, &b);
        assert!(result.is_err());
        assert!(matches!(
            lu_factorize(&a),
            Err(LuError::SingularMatrix { column: 1, .. })
        ));
    }

    #[test]
    fn test_lu_dimension_mismatch() {
        let a = array![[1.0, 2.0, 3.0], [2.0, 4.0, 5.0]];
        assert!(matches!(
            lu_factorize(&a),
            Err(LuError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn test_inverse_reconstructs_identity() {
        let a = array![[4.0, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 2.0]];

        let inv = lu_factorize(&a)
            .and_then(|f| f.inverse())
            .expect("Inverse should exist");

        let product = a.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(product[[i, j]], expected, epsilon = 1e-12);
            }
        }
    }
}
