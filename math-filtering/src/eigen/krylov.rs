//! Block Krylov-Schur eigensolver for the largest-magnitude eigenvalues
//!
//! The search space `V` grows block by block from the images `AV`, each new
//! vector orthogonalized twice against `V` with global inner products. The
//! Rayleigh-Ritz matrix `VᵀAV` is solved densely; the wanted Ritz vectors
//! (real and imaginary parts) are kept as the restart space, which is the
//! thick restart of Krylov-Schur.

use super::dense;
use super::{
    EigenDecomposition, EigenError, EigenPair, EigenParameters, EigenSolverService,
    SpectralOperator,
};
use crate::comm::Communicator;
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Candidates keeping less than this fraction of their norm are dependent
const DEPENDENCE_TOLERANCE: f64 = 1e-10;

/// Ritz values below this modulus are treated as zero modes
const NEGLIGIBLE_EIGENVALUE: f64 = 1e-10;

/// Relative size of an imaginary part still treated as roundoff
const REAL_TOLERANCE: f64 = 1e-10;

/// Block Krylov-Schur solver
#[derive(Debug, Clone, Copy, Default)]
pub struct KrylovSchur;

/// Orthonormal search space and its image under the operator
struct SearchSpace {
    v: Vec<Array1<f64>>,
    w: Vec<Array1<f64>>,
}

impl SearchSpace {
    fn len(&self) -> usize {
        self.v.len()
    }

    /// Orthogonalize `x` against the space and append it if independent
    fn try_push(
        &mut self,
        mut x: Array1<f64>,
        operator: &dyn SpectralOperator,
        comm: &dyn Communicator,
    ) -> bool {
        let original = comm.norm(&x);
        if original == 0.0 || !original.is_finite() {
            return false;
        }

        // Two passes of modified Gram-Schmidt
        for _ in 0..2 {
            for v in &self.v {
                let c = comm.dot(v, &x);
                x.scaled_add(-c, v);
            }
        }

        let norm = comm.norm(&x);
        if norm <= DEPENDENCE_TOLERANCE * original {
            return false;
        }
        x /= norm;
        self.w.push(operator.apply(&x));
        self.v.push(x);
        true
    }

    /// Rayleigh-Ritz matrix `H[i][j] = ⟨v_i, A v_j⟩`
    fn projected_matrix(&self, comm: &dyn Communicator) -> Array2<f64> {
        let k = self.len();
        let mut entries: Vec<f64> = Vec::with_capacity(k * k);
        for v in &self.v {
            for w in &self.w {
                entries.push(v.dot(w));
            }
        }
        comm.sum_all(&mut entries);
        Array2::from_shape_vec((k, k), entries).unwrap_or_else(|_| Array2::zeros((k, k)))
    }

    /// `V Y` and `W Y` for a real coefficient matrix `Y` with orthonormal columns
    fn combine(&self, y: &Array2<f64>) -> SearchSpace {
        let columns = |vectors: &[Array1<f64>]| -> Vec<Array1<f64>> {
            (0..y.ncols())
                .map(|j| linear_combination(vectors, y.column(j).iter().copied()))
                .collect()
        };
        SearchSpace {
            v: columns(self.v.as_slice()),
            w: columns(self.w.as_slice()),
        }
    }
}

fn linear_combination(
    vectors: &[Array1<f64>],
    coefficients: impl Iterator<Item = f64>,
) -> Array1<f64> {
    let len = vectors.first().map_or(0, Array1::len);
    let mut result = Array1::zeros(len);
    for (v, c) in vectors.iter().zip(coefficients) {
        if c != 0.0 {
            result.scaled_add(c, v);
        }
    }
    result
}

fn random_vector(rng: &mut StdRng, len: usize) -> Array1<f64> {
    Array1::from_shape_fn(len, |_| rng.random_range(-1.0..1.0))
}

/// Treat eigenvalues with roundoff-sized imaginary parts as real
fn clean_eigenvalue(value: Complex64) -> Complex64 {
    if value.im.abs() <= REAL_TOLERANCE * value.norm().max(f64::MIN_POSITIVE) {
        Complex64::new(value.re, 0.0)
    } else {
        value
    }
}

/// Indices of the wanted Ritz values, largest modulus first
///
/// Real values count once, a conjugate pair counts twice and is represented
/// by its member with positive imaginary part.
fn select_wanted(values: &[Complex64], num_eigenvalues: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].norm().total_cmp(&values[a].norm()));

    let mut wanted = Vec::new();
    let mut count = 0;
    for idx in order {
        if count >= num_eigenvalues {
            break;
        }
        let value = values[idx];
        if value.im == 0.0 {
            wanted.push(idx);
            count += 1;
        } else if value.im > 0.0 {
            wanted.push(idx);
            count += 2;
        }
    }
    wanted
}

/// Rotate a Ritz vector of a real eigenvalue so that it is real
fn normalize_phase(y: &mut Array1<Complex64>) {
    let pivot = y
        .iter()
        .copied()
        .max_by(|a, b| a.norm().total_cmp(&b.norm()))
        .unwrap_or(Complex64::new(1.0, 0.0));
    if pivot.norm() > 0.0 {
        let phase = pivot.conj() / pivot.norm();
        y.mapv_inplace(|v| v * phase);
    }
}

/// Orthonormalize columns in coefficient space, dropping dependent ones
fn orthonormal_columns(columns: Vec<Array1<f64>>, rows: usize, limit: usize) -> Array2<f64> {
    let mut basis: Vec<Array1<f64>> = Vec::with_capacity(limit);
    for mut c in columns {
        if basis.len() >= limit {
            break;
        }
        let original = c.dot(&c).sqrt();
        for _ in 0..2 {
            for q in &basis {
                let proj = q.dot(&c);
                c.scaled_add(-proj, q);
            }
        }
        let norm = c.dot(&c).sqrt();
        if original > 0.0 && norm > DEPENDENCE_TOLERANCE * original {
            basis.push(c / norm);
        }
    }
    Array2::from_shape_fn((rows, basis.len()), |(i, j)| basis[j][i])
}

struct RitzPair {
    value: Complex64,
    coefficients: Array1<Complex64>,
}

impl KrylovSchur {
    /// Residual check of a Ritz pair; returns the pair when converged
    fn check_pair(
        space: &SearchSpace,
        ritz: &RitzPair,
        tolerance: f64,
        comm: &dyn Communicator,
    ) -> Option<EigenPair> {
        let theta = ritz.value;
        let re = ritz.coefficients.mapv(|c| c.re);
        let im = ritz.coefficients.mapv(|c| c.im);

        let x_re = linear_combination(&space.v, re.iter().copied());
        let x_im = linear_combination(&space.v, im.iter().copied());
        let ax_re = linear_combination(&space.w, re.iter().copied());
        let ax_im = linear_combination(&space.w, im.iter().copied());

        // r = Ax - θx, split in real and imaginary parts
        let r_re = &ax_re - &(&x_re * theta.re) + &(&x_im * theta.im);
        let r_im = &ax_im - &(&x_im * theta.re) - &(&x_re * theta.im);

        let mut sums = [
            r_re.dot(&r_re) + r_im.dot(&r_im),
            x_re.dot(&x_re) + x_im.dot(&x_im),
        ];
        comm.sum_all(&mut sums);
        let residual = sums[0].sqrt();
        let x_norm = sums[1].sqrt();

        if theta.norm() <= NEGLIGIBLE_EIGENVALUE
            || x_norm == 0.0
            || residual > tolerance * theta.norm() * x_norm
        {
            return None;
        }

        let (real, imag) = if theta.im == 0.0 {
            let real_norm = comm.norm(&x_re);
            if real_norm == 0.0 {
                return None;
            }
            (x_re / real_norm, Array1::zeros(x_im.len()))
        } else {
            (x_re / x_norm, x_im / x_norm)
        };

        Some(EigenPair {
            eigenvalue: theta,
            real,
            imag,
        })
    }
}

impl EigenSolverService for KrylovSchur {
    fn compute(
        &self,
        operator: &dyn SpectralOperator,
        comm: &dyn Communicator,
        params: &EigenParameters,
    ) -> Result<EigenDecomposition, EigenError> {
        let local_len = operator.local_len();
        let mut global = [local_len as f64];
        comm.sum_all(&mut global);
        let global_len = global[0] as usize;

        let nev = params.num_eigenvalues;
        if global_len == 0 || nev == 0 {
            return Ok(EigenDecomposition::default());
        }

        let block = params.block_size.max(1);
        let max_basis = params.length.max(nev + 1).max(block + 1).min(global_len);
        let restart_size = max_basis.saturating_sub(block).max(1);
        let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(comm.rank() as u64));

        let mut space = SearchSpace {
            v: Vec::with_capacity(max_basis),
            w: Vec::with_capacity(max_basis),
        };
        for _ in 0..block.min(max_basis) {
            let start = random_vector(&mut rng, local_len);
            space.try_push(start, operator, comm);
        }

        let mut next_expand = 0;
        let mut restarts = 0;

        loop {
            // Expand the search space from the images of its newest block
            let mut stalled = 0;
            while space.len() < max_basis {
                if next_expand >= space.len() {
                    // Invariant subspace: continue with a fresh random direction
                    let fresh = random_vector(&mut rng, local_len);
                    if space.try_push(fresh, operator, comm) {
                        stalled = 0;
                    } else {
                        stalled += 1;
                        if stalled > 3 {
                            break;
                        }
                    }
                    continue;
                }
                let end = (next_expand + block).min(space.len());
                for idx in next_expand..end {
                    if space.len() >= max_basis {
                        break;
                    }
                    let candidate = space.w[idx].clone();
                    space.try_push(candidate, operator, comm);
                }
                next_expand = end;
            }

            let k = space.len();
            if k == 0 {
                return Ok(EigenDecomposition::default());
            }

            let h = space.projected_matrix(comm);
            let (raw_values, vectors) = dense::eig(&h)?;
            let values: Vec<Complex64> = raw_values.into_iter().map(clean_eigenvalue).collect();
            let wanted = select_wanted(&values, nev);

            let ritz: Vec<RitzPair> = wanted
                .iter()
                .map(|&idx| {
                    let mut coefficients = vectors.column(idx).to_owned();
                    if values[idx].im == 0.0 {
                        normalize_phase(&mut coefficients);
                    }
                    RitzPair {
                        value: values[idx],
                        coefficients,
                    }
                })
                .collect();

            let converged: Vec<Option<EigenPair>> = ritz
                .iter()
                .map(|pair| Self::check_pair(&space, pair, params.tolerance, comm))
                .collect();
            let all_converged = converged.iter().all(Option::is_some);

            log::debug!(
                "Krylov-Schur restart {}: subspace {}, {} of {} wanted Ritz pairs converged",
                restarts,
                k,
                converged.iter().filter(|c| c.is_some()).count(),
                ritz.len()
            );

            if all_converged || restarts >= params.max_restarts || k >= global_len {
                let mut eigenvalues = Vec::with_capacity(nev + 1);
                for pair in &ritz {
                    eigenvalues.push(pair.value);
                    if pair.value.im != 0.0 {
                        eigenvalues.push(pair.value.conj());
                    }
                }
                return Ok(EigenDecomposition {
                    eigenvalues,
                    pairs: converged.into_iter().flatten().collect(),
                    restarts,
                });
            }

            // Thick restart on the wanted Ritz vectors
            let mut columns = Vec::with_capacity(2 * ritz.len());
            for pair in &ritz {
                columns.push(pair.coefficients.mapv(|c| c.re));
                if pair.value.im != 0.0 {
                    columns.push(pair.coefficients.mapv(|c| c.im));
                }
            }
            let y = orthonormal_columns(columns, k, restart_size);
            space = space.combine(&y);
            next_expand = 0;
            restarts += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SerialComm, ThreadComm};
    use approx::assert_relative_eq;

    /// Diagonal operator, optionally with a 2x2 rotation block in front
    struct TestOperator {
        diagonal: Vec<f64>,
        rotation: Option<(f64, f64)>,
    }

    impl SpectralOperator for TestOperator {
        fn local_len(&self) -> usize {
            self.diagonal.len()
        }

        fn apply(&self, x: &Array1<f64>) -> Array1<f64> {
            let mut y = Array1::from_shape_fn(x.len(), |i| self.diagonal[i] * x[i]);
            if let Some((a, b)) = self.rotation {
                y[0] = a * x[0] - b * x[1];
                y[1] = b * x[0] + a * x[1];
            }
            y
        }
    }

    fn decaying_diagonal(n: usize) -> Vec<f64> {
        (0..n).map(|i| 0.9 * 0.7_f64.powi(i as i32)).collect()
    }

    #[test]
    fn test_dominant_real_eigenvalues() {
        let op = TestOperator {
            diagonal: decaying_diagonal(40),
            rotation: None,
        };
        let params = EigenParameters {
            num_eigenvalues: 3,
            length: 10,
            tolerance: 1e-8,
            max_restarts: 100,
            ..EigenParameters::default()
        };

        let result = KrylovSchur.compute(&op, &SerialComm, &params).unwrap();

        assert_eq!(result.num_real(), 3);
        assert_eq!(result.num_imag(), 0);
        for (pair, expected) in result.pairs.iter().zip([0.9, 0.63, 0.441]) {
            assert_relative_eq!(pair.eigenvalue.re, expected, epsilon = 1e-7);
            assert_relative_eq!(pair.real.dot(&pair.real), 1.0, epsilon = 1e-10);
            let residual = &op.apply(&pair.real) - &(&pair.real * pair.eigenvalue.re);
            assert!(residual.dot(&residual).sqrt() < 1e-6);
        }
    }

    #[test]
    fn test_complex_pair_counts_twice() {
        let mut diagonal = decaying_diagonal(30);
        diagonal[0] = 0.0;
        diagonal[1] = 0.0;
        let op = TestOperator {
            diagonal,
            rotation: Some((0.5, 0.8)),
        };
        let params = EigenParameters {
            num_eigenvalues: 2,
            length: 8,
            tolerance: 1e-8,
            max_restarts: 100,
            ..EigenParameters::default()
        };

        let result = KrylovSchur.compute(&op, &SerialComm, &params).unwrap();

        assert_eq!(result.num_real(), 1);
        assert_eq!(result.num_imag(), 1);
        assert_eq!(result.eigenvalues.len(), 2);
        let pair = &result.pairs[0];
        assert_relative_eq!(pair.eigenvalue.re, 0.5, epsilon = 1e-7);
        assert_relative_eq!(pair.eigenvalue.im, 0.8, epsilon = 1e-7);
        assert_relative_eq!(
            pair.real.dot(&pair.real) + pair.imag.dot(&pair.imag),
            1.0,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_zero_operator_has_no_modes() {
        let op = TestOperator {
            diagonal: vec![0.0; 12],
            rotation: None,
        };
        let result = KrylovSchur
            .compute(&op, &SerialComm, &EigenParameters::default())
            .unwrap();
        assert!(result.pairs.is_empty());
    }

    #[test]
    fn test_block_solver_on_thread_group() {
        let group = ThreadComm::group(2);
        let params = EigenParameters {
            num_eigenvalues: 2,
            length: 12,
            block_size: 2,
            tolerance: 1e-8,
            max_restarts: 100,
            ..EigenParameters::default()
        };

        let eigenvalues: Vec<Vec<f64>> = std::thread::scope(|scope| {
            let handles: Vec<_> = group
                .iter()
                .map(|comm| {
                    let params = params.clone();
                    scope.spawn(move || {
                        // Participant 0 holds the two dominant modes
                        let diagonal = if comm.rank() == 0 {
                            vec![0.95, 0.8, 0.2, 0.1, 0.05]
                        } else {
                            vec![0.3, 0.25, 0.15, 0.1, 0.01]
                        };
                        let op = TestOperator {
                            diagonal,
                            rotation: None,
                        };
                        let result = KrylovSchur.compute(&op, comm, &params).unwrap();
                        result.pairs.iter().map(|p| p.eigenvalue.re).collect()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(eigenvalues[0], eigenvalues[1]);
        assert_eq!(eigenvalues[0].len(), 2);
        assert_relative_eq!(eigenvalues[0][0], 0.95, epsilon = 1e-7);
        assert_relative_eq!(eigenvalues[0][1], 0.8, epsilon = 1e-7);
    }
}
