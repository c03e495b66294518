//! Dense vector kernels shared by the solvers

use ndarray::Array1;

/// Euclidean inner product
#[inline]
pub fn inner_product(x: &Array1<f64>, y: &Array1<f64>) -> f64 {
    assert_eq!(x.len(), y.len(), "inner product of vectors with different lengths");
    x.dot(y)
}

/// Euclidean norm
#[inline]
pub fn vector_norm(x: &Array1<f64>) -> f64 {
    x.dot(x).sqrt()
}

/// `y += alpha x`
#[inline]
pub fn axpy(alpha: f64, x: &Array1<f64>, y: &mut Array1<f64>) {
    y.scaled_add(alpha, x);
}
