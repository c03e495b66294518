//! Dense nonsymmetric eigensolver for the projected Rayleigh-Ritz matrices
//!
//! With the `ndarray-linalg` feature the work goes to LAPACK `geev`.
//! Otherwise: Householder reduction to Hessenberg form, complex shifted QR to
//! Schur form `H = Z T Zᴴ`, then eigenvectors of `T` by back-substitution.
//! Matrices are small (the Krylov subspace length), so plain loops are used
//! throughout.

use super::EigenError;
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use num_traits::{One, Zero};

#[cfg(feature = "ndarray-linalg")]
use ndarray_linalg::Eig;

/// Components above this magnitude trigger a rescale during back-substitution
const RESCALE_THRESHOLD: f64 = 1e150;

/// Eigenvalues and unit-norm eigenvectors (columns) of a real square matrix
pub fn eig(a: &Array2<f64>) -> Result<(Vec<Complex64>, Array2<Complex64>), EigenError> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(EigenError::DimensionMismatch {
            expected: n,
            got: a.ncols(),
        });
    }
    if n == 0 {
        return Ok((Vec::new(), Array2::zeros((0, 0))));
    }

    #[cfg(feature = "ndarray-linalg")]
    {
        let (values, vectors) = a
            .eig()
            .map_err(|err| EigenError::Lapack(err.to_string()))?;
        Ok((values.to_vec(), vectors))
    }

    #[cfg(not(feature = "ndarray-linalg"))]
    {
        schur_eig(a)
    }
}

/// In-crate path: Hessenberg reduction, shifted QR, triangular eigenvectors
#[cfg_attr(feature = "ndarray-linalg", allow(dead_code))]
fn schur_eig(a: &Array2<f64>) -> Result<(Vec<Complex64>, Array2<Complex64>), EigenError> {
    let n = a.nrows();
    let mut t = a.mapv(|v| Complex64::new(v, 0.0));
    let mut z = Array2::<Complex64>::eye(n);

    hessenberg(&mut t, &mut z);
    schur(&mut t, &mut z)?;

    let values = (0..n).map(|i| t[[i, i]]).collect();
    let vectors = schur_vectors(&t, &z);
    Ok((values, vectors))
}

fn hessenberg(h: &mut Array2<Complex64>, z: &mut Array2<Complex64>) {
    let n = h.nrows();
    for k in 0..n.saturating_sub(2) {
        let mut v: Vec<Complex64> = ((k + 1)..n).map(|i| h[[i, k]]).collect();
        let norm = v.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt();
        if norm == 0.0 {
            continue;
        }

        let phase = if v[0].norm() > 0.0 {
            v[0] / v[0].norm()
        } else {
            Complex64::one()
        };
        v[0] += phase * norm;
        let v_norm = v.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt();
        if v_norm == 0.0 {
            continue;
        }
        for x in &mut v {
            *x /= v_norm;
        }

        // H <- (I - 2vvᴴ) H on rows k+1.., columns left of k are already zero
        for j in k..n {
            let s: Complex64 = v
                .iter()
                .enumerate()
                .map(|(i, vi)| vi.conj() * h[[k + 1 + i, j]])
                .sum();
            for (i, vi) in v.iter().enumerate() {
                h[[k + 1 + i, j]] -= *vi * s * 2.0;
            }
        }
        reflect_columns(h, &v, k + 1);
        reflect_columns(z, &v, k + 1);

        for i in (k + 2)..n {
            h[[i, k]] = Complex64::zero();
        }
    }
}

/// `M <- M (I - 2vvᴴ)` on columns `offset..`
fn reflect_columns(m: &mut Array2<Complex64>, v: &[Complex64], offset: usize) {
    for i in 0..m.nrows() {
        let s: Complex64 = v
            .iter()
            .enumerate()
            .map(|(j, vj)| m[[i, offset + j]] * vj)
            .sum();
        for (j, vj) in v.iter().enumerate() {
            m[[i, offset + j]] -= s * vj.conj() * 2.0;
        }
    }
}

/// Rotation `G = [[c, s], [-s̄, c]]` with `G [a, b]ᵀ = [r, 0]ᵀ`
fn givens(a: Complex64, b: Complex64) -> (f64, Complex64) {
    let a_norm = a.norm();
    let b_norm = b.norm();
    if b_norm == 0.0 {
        return (1.0, Complex64::zero());
    }
    if a_norm == 0.0 {
        return (0.0, b.conj() / b_norm);
    }
    let rho = a_norm.hypot(b_norm);
    (a_norm / rho, (a / a_norm) * b.conj() / rho)
}

/// Eigenvalue of `[[a, b], [c, d]]` closest to `d`
fn wilkinson_shift(a: Complex64, b: Complex64, c: Complex64, d: Complex64) -> Complex64 {
    let mean = (a + d) * 0.5;
    let disc = (((a - d) * 0.5).powi(2) + b * c).sqrt();
    let mu1 = mean + disc;
    let mu2 = mean - disc;
    if (mu1 - d).norm() <= (mu2 - d).norm() {
        mu1
    } else {
        mu2
    }
}

fn schur(h: &mut Array2<Complex64>, z: &mut Array2<Complex64>) -> Result<(), EigenError> {
    let n = h.nrows();
    let h_norm = h
        .iter()
        .map(|x| x.norm())
        .fold(0.0, f64::max)
        .max(f64::MIN_POSITIVE);
    let max_iterations = 30 * n.max(10);
    let mut iterations = 0;
    let mut since_deflation = 0;
    let mut hi = n - 1;

    while hi > 0 {
        let mut lo = hi;
        while lo > 0 {
            let mut scale = h[[lo - 1, lo - 1]].norm() + h[[lo, lo]].norm();
            if scale == 0.0 {
                scale = h_norm;
            }
            if h[[lo, lo - 1]].norm() <= f64::EPSILON * scale {
                h[[lo, lo - 1]] = Complex64::zero();
                break;
            }
            lo -= 1;
        }

        if lo == hi {
            hi -= 1;
            since_deflation = 0;
            continue;
        }

        iterations += 1;
        since_deflation += 1;
        if iterations > max_iterations {
            return Err(EigenError::DenseNoConvergence {
                size: n,
                iterations: max_iterations,
            });
        }

        let shift = if since_deflation % 10 == 0 {
            // Exceptional shift breaks cycles of the Wilkinson shift
            h[[hi, hi]] + Complex64::new(0.75 * h[[hi, hi - 1]].norm(), 0.0)
        } else {
            wilkinson_shift(
                h[[hi - 1, hi - 1]],
                h[[hi - 1, hi]],
                h[[hi, hi - 1]],
                h[[hi, hi]],
            )
        };
        qr_step(h, z, lo, hi, shift);
    }

    Ok(())
}

/// One explicitly shifted QR step on the active block `lo..=hi`
fn qr_step(
    h: &mut Array2<Complex64>,
    z: &mut Array2<Complex64>,
    lo: usize,
    hi: usize,
    shift: Complex64,
) {
    let n = h.nrows();
    for i in lo..=hi {
        h[[i, i]] -= shift;
    }

    let mut rotations = Vec::with_capacity(hi - lo);
    for k in lo..hi {
        let (c, s) = givens(h[[k, k]], h[[k + 1, k]]);
        for j in k..n {
            let x = h[[k, j]];
            let y = h[[k + 1, j]];
            h[[k, j]] = x * c + s * y;
            h[[k + 1, j]] = -s.conj() * x + y * c;
        }
        h[[k + 1, k]] = Complex64::zero();
        rotations.push((c, s));
    }

    for (offset, (c, s)) in rotations.into_iter().enumerate() {
        let k = lo + offset;
        for i in 0..=(k + 1) {
            let x = h[[i, k]];
            let y = h[[i, k + 1]];
            h[[i, k]] = x * c + y * s.conj();
            h[[i, k + 1]] = -x * s + y * c;
        }
        for i in 0..n {
            let x = z[[i, k]];
            let y = z[[i, k + 1]];
            z[[i, k]] = x * c + y * s.conj();
            z[[i, k + 1]] = -x * s + y * c;
        }
    }

    for i in lo..=hi {
        h[[i, i]] += shift;
    }
}

/// Eigenvectors `Z x_k` where `T x_k = t_kk x_k`
fn schur_vectors(t: &Array2<Complex64>, z: &Array2<Complex64>) -> Array2<Complex64> {
    let n = t.nrows();
    let t_norm = t.iter().map(|x| x.norm()).fold(0.0, f64::max);
    let small = (f64::EPSILON * t_norm).max(f64::MIN_POSITIVE);
    let mut vectors = Array2::zeros((n, n));

    for k in 0..n {
        let lambda = t[[k, k]];
        let mut x = vec![Complex64::zero(); k + 1];
        x[k] = Complex64::one();

        for i in (0..k).rev() {
            let s: Complex64 = ((i + 1)..=k).map(|j| t[[i, j]] * x[j]).sum();
            let mut d = t[[i, i]] - lambda;
            if d.norm() < small {
                d = Complex64::new(small, 0.0);
            }
            x[i] = -s / d;
            if x[i].norm() > RESCALE_THRESHOLD {
                for value in &mut x[i..] {
                    *value /= RESCALE_THRESHOLD;
                }
            }
        }

        let mut y: Array1<Complex64> =
            Array1::from_shape_fn(n, |r| (0..=k).map(|j| z[[r, j]] * x[j]).sum());
        let norm = y.iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt();
        if norm > 0.0 {
            y.mapv_inplace(|v| v / norm);
        }
        vectors.column_mut(k).assign(&y);
    }

    vectors
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn assert_eigenpairs(a: &Array2<f64>) {
        let (values, vectors) = eig(a).unwrap();
        let ac = a.mapv(|v| Complex64::new(v, 0.0));
        for (k, lambda) in values.iter().enumerate() {
            let y = vectors.column(k);
            let ay = ac.dot(&y);
            let residual: f64 = ay
                .iter()
                .zip(y.iter())
                .map(|(l, r)| (l - lambda * r).norm_sqr())
                .sum::<f64>()
                .sqrt();
            assert!(residual < 1e-10, "eigenpair {k} residual {residual:e}");
        }
    }

    #[test]
    fn test_rotation_has_imaginary_pair() {
        let a = array![[0.0, -1.0], [1.0, 0.0]];
        let (values, _) = eig(&a).unwrap();

        let mut imag: Vec<f64> = values.iter().map(|v| v.im).collect();
        imag.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert_relative_eq!(imag[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(imag[1], 1.0, epsilon = 1e-12);
        assert!(values.iter().all(|v| v.re.abs() < 1e-12));
        assert_eigenpairs(&a);
    }

    #[test]
    fn test_triangular_eigenvalues_are_diagonal() {
        let a = array![[3.0, 1.0, 2.0], [0.0, -1.0, 4.0], [0.0, 0.0, 0.5]];
        let (values, _) = eig(&a).unwrap();

        let mut re: Vec<f64> = values.iter().map(|v| v.re).collect();
        re.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert_relative_eq!(re[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(re[1], 0.5, epsilon = 1e-12);
        assert_relative_eq!(re[2], 3.0, epsilon = 1e-12);
        assert_eigenpairs(&a);
    }

    #[test]
    fn test_general_nonsymmetric_matrix() {
        let a = array![
            [4.0, -2.0, 1.0, 0.5, 0.0],
            [1.0, 3.0, -1.0, 0.0, 2.0],
            [0.0, 2.0, -1.0, 3.0, 1.0],
            [1.5, 0.0, 1.0, 2.0, -2.0],
            [0.0, -1.0, 0.5, 1.0, 1.0]
        ];
        let (values, _) = eig(&a).unwrap();

        let trace: Complex64 = values.iter().sum();
        assert_relative_eq!(trace.re, 9.0, epsilon = 1e-10);
        assert!(trace.im.abs() < 1e-10);
        assert_eigenpairs(&a);
    }

    #[test]
    fn test_symmetric_matrix_has_real_spectrum() {
        let a = array![[2.0, -1.0, 0.0], [-1.0, 2.0, -1.0], [0.0, -1.0, 2.0]];
        let (values, _) = eig(&a).unwrap();
        assert!(values.iter().all(|v| v.im.abs() < 1e-12));
        assert_eigenpairs(&a);
    }

    #[test]
    fn test_schur_path_matches_trace_and_determinant() {
        let a = array![[1.0, 2.0, 0.0], [-1.0, 0.5, 3.0], [0.0, 1.0, -2.0]];
        let (values, _) = schur_eig(&a).unwrap();
        let trace: Complex64 = values.iter().sum();
        let det: Complex64 = values.iter().product();
        assert_relative_eq!(trace.re, -0.5, epsilon = 1e-10);
        assert_relative_eq!(det.re, -8.0, epsilon = 1e-10);
        assert!(det.im.abs() < 1e-10);
    }

    #[test]
    fn test_empty_and_non_square() {
        let (values, vectors) = eig(&Array2::zeros((0, 0))).unwrap();
        assert!(values.is_empty());
        assert_eq!(vectors.dim(), (0, 0));

        assert!(matches!(
            eig(&Array2::zeros((2, 3))),
            Err(EigenError::DimensionMismatch { .. })
        ));
    }
}
