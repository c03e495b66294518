//! Restarted GMRES with left preconditioning
//!
//! This is the outer Krylov method used to measure how much a filtered
//! multigrid cycle improves on the plain one. Residuals are reported in the
//! preconditioned norm `|M(b - Ax)| / |Mb|`.

use crate::blas_helpers::{axpy, inner_product, vector_norm};
use crate::traits::{IdentityPreconditioner, LinearOperator, Preconditioner};
use ndarray::{Array1, Array2};

/// Arnoldi vectors shorter than this end the cycle early
const BREAKDOWN_TOLERANCE: f64 = 1e-14;

/// Pivots below this are treated as zero
const TINY: f64 = 1e-30;

#[derive(Debug, Clone)]
pub struct GmresConfig {
    /// Upper bound on restart cycles
    pub max_iterations: usize,
    /// Krylov dimension per cycle
    pub restart: usize,
    /// Target for the relative preconditioned residual
    pub tolerance: f64,
    /// Log every N inner steps, 0 disables
    pub print_interval: usize,
}

impl Default for GmresConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            restart: 30,
            tolerance: 1e-8,
            print_interval: 0,
        }
    }
}

#[derive(Debug)]
pub struct GmresSolution {
    pub x: Array1<f64>,
    /// Inner steps taken, one operator and one preconditioner application each
    pub iterations: usize,
    pub restarts: usize,
    /// Last relative preconditioned residual
    pub residual: f64,
    pub converged: bool,
}

/// Unpreconditioned GMRES(m)
pub fn gmres<A>(operator: &A, b: &Array1<f64>, config: &GmresConfig) -> GmresSolution
where
    A: LinearOperator + ?Sized,
{
    gmres_preconditioned(operator, &IdentityPreconditioner, b, config)
}

/// GMRES(m) on `M A x = M b`
pub fn gmres_preconditioned<A, P>(
    operator: &A,
    precond: &P,
    b: &Array1<f64>,
    config: &GmresConfig,
) -> GmresSolution
where
    A: LinearOperator + ?Sized,
    P: Preconditioner + ?Sized,
{
    let m = config.restart.max(1);
    let mut x = Array1::zeros(b.len());
    let mut iterations = 0;

    let reference = vector_norm(&precond.apply(b));
    if reference < 1e-15 {
        return GmresSolution {
            x,
            iterations,
            restarts: 0,
            residual: 0.0,
            converged: true,
        };
    }

    let preconditioned_residual =
        |x: &Array1<f64>| precond.apply(&(b - &operator.apply(x)));

    for restarts in 0..config.max_iterations {
        let r = preconditioned_residual(&x);
        let beta = vector_norm(&r);
        if beta / reference < config.tolerance {
            return GmresSolution {
                x,
                iterations,
                restarts,
                residual: beta / reference,
                converged: true,
            };
        }

        let mut cycle = ArnoldiCycle::start(r / beta, beta, m);
        let mut stop = None;
        for j in 0..m {
            iterations += 1;
            let w = precond.apply(&operator.apply(&cycle.basis[j]));
            let breakdown = cycle.extend(w);
            let rel = cycle.residual_estimate() / reference;

            if config.print_interval > 0 && iterations % config.print_interval == 0 {
                log::info!("GMRES step {iterations} (cycle {restarts}): residual {rel:.6e}");
            }
            if rel < config.tolerance || breakdown {
                stop = Some(rel);
                break;
            }
        }

        cycle.update(&mut x);
        if let Some(rel) = stop {
            return GmresSolution {
                x,
                iterations,
                restarts,
                residual: rel,
                converged: true,
            };
        }
    }

    let residual = vector_norm(&preconditioned_residual(&x)) / reference;
    GmresSolution {
        x,
        iterations,
        restarts: config.max_iterations,
        residual,
        converged: false,
    }
}

/// One restart cycle: orthonormal basis plus the Hessenberg least-squares
/// problem reduced to triangular form by Givens rotations
struct ArnoldiCycle {
    basis: Vec<Array1<f64>>,
    hessenberg: Array2<f64>,
    rotations: Vec<(f64, f64)>,
    rhs: Array1<f64>,
}

impl ArnoldiCycle {
    fn start(v0: Array1<f64>, beta: f64, m: usize) -> Self {
        let mut rhs = Array1::zeros(m + 1);
        rhs[0] = beta;
        let mut basis = Vec::with_capacity(m + 1);
        basis.push(v0);
        Self {
            basis,
            hessenberg: Array2::zeros((m + 1, m)),
            rotations: Vec::with_capacity(m),
            rhs,
        }
    }

    fn steps(&self) -> usize {
        self.rotations.len()
    }

    /// Orthogonalise `w` against the basis and append it; true on breakdown
    fn extend(&mut self, mut w: Array1<f64>) -> bool {
        let j = self.steps();
        let h = &mut self.hessenberg;

        for (i, v) in self.basis.iter().enumerate() {
            let hij = inner_product(v, &w);
            axpy(-hij, v, &mut w);
            h[[i, j]] = hij;
        }
        let norm = vector_norm(&w);
        h[[j + 1, j]] = norm;
        let breakdown = norm < BREAKDOWN_TOLERANCE;
        if !breakdown {
            self.basis.push(w / norm);
        }

        for (i, &(c, s)) in self.rotations.iter().enumerate() {
            let (top, bottom) = (h[[i, j]], h[[i + 1, j]]);
            h[[i, j]] = c * top + s * bottom;
            h[[i + 1, j]] = c * bottom - s * top;
        }

        let (c, s) = rotation(h[[j, j]], h[[j + 1, j]]);
        h[[j, j]] = c * h[[j, j]] + s * h[[j + 1, j]];
        h[[j + 1, j]] = 0.0;
        let (top, bottom) = (self.rhs[j], self.rhs[j + 1]);
        self.rhs[j] = c * top + s * bottom;
        self.rhs[j + 1] = c * bottom - s * top;
        self.rotations.push((c, s));

        breakdown
    }

    fn residual_estimate(&self) -> f64 {
        self.rhs[self.steps()].abs()
    }

    /// Back-substitute the triangular system and add the correction to `x`
    fn update(&self, x: &mut Array1<f64>) {
        let k = self.steps();
        let h = &self.hessenberg;
        let mut y = vec![0.0; k];
        for i in (0..k).rev() {
            let tail: f64 = (i + 1..k).map(|l| h[[i, l]] * y[l]).sum();
            if h[[i, i]].abs() > TINY {
                y[i] = (self.rhs[i] - tail) / h[[i, i]];
            }
        }
        for (v, yi) in self.basis.iter().zip(y) {
            axpy(yi, v, x);
        }
    }
}

/// Givens pair `(c, s)` zeroing `b` in `(a, b)`
fn rotation(a: f64, b: f64) -> (f64, f64) {
    if b.abs() < TINY {
        (1.0, 0.0)
    } else if a.abs() < TINY {
        (0.0, 1.0)
    } else {
        let r = a.hypot(b);
        (a / r, b / r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::CsrMatrix;
    use ndarray::array;

    #[test]
    fn test_gmres_simple() {
        let dense = array![[4.0, 1.0], [1.0, 3.0]];
        let a = CsrMatrix::from_dense(&dense, 1e-15);
        let b = array![1.0, 2.0];

        let config = GmresConfig {
            max_iterations: 100,
            restart: 10,
            tolerance: 1e-10,
            print_interval: 0,
        };

        let solution = gmres(&a, &b, &config);

        assert!(solution.converged, "GMRES should converge");
        let error = vector_norm(&(&a.matvec(&solution.x) - &b));
        assert!(error < 1e-8, "Solution should satisfy Ax = b");
    }

    #[test]
    fn test_gmres_identity() {
        let n = 5;
        let id = CsrMatrix::identity(n);
        let b = Array1::from_iter((1..=n).map(|i| i as f64));

        let config = GmresConfig {
            max_iterations: 10,
            restart: 10,
            tolerance: 1e-12,
            print_interval: 0,
        };

        let solution = gmres(&id, &b, &config);

        assert!(solution.converged);
        assert!(solution.iterations <= 2);
        assert!(vector_norm(&(&solution.x - &b)) < 1e-10);
    }

    #[test]
    fn test_gmres_nonsymmetric_with_restarts() {
        let n = 40;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 3.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.5));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -0.5));
            }
        }
        let a = CsrMatrix::from_triplets(n, n, triplets);
        let b = Array1::from_elem(n, 1.0);

        let config = GmresConfig {
            max_iterations: 50,
            restart: 5,
            tolerance: 1e-10,
            print_interval: 0,
        };

        let solution = gmres(&a, &b, &config);

        assert!(solution.converged);
        assert!(solution.restarts > 0);
        assert!(vector_norm(&(&a.matvec(&solution.x) - &b)) < 1e-7);
    }
}
