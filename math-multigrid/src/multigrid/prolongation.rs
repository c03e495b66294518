//! Tentative and smoothed prolongators
//!
//! The tentative prolongator restricted to one aggregate is the orthonormal
//! factor `Q` of the aggregate's null-space rows, `B_agg = Q R`. The `R`
//! factors, stacked over aggregates, form the null space of the next level.
//! Null-space columns that are linearly dependent on an aggregate are dropped
//! there, so an aggregate contributes at most `min(rows, dim)` coarse unknowns.

use super::aggregation::Aggregates;
use super::null_space::NullSpace;
use crate::error::Result;
use crate::sparse::CsrMatrix;
use ndarray::{Array1, Array2};

/// Columns whose remainder after orthogonalization is below this fraction of
/// their original norm count as dependent
const DEPENDENCE_TOLERANCE: f64 = 1e-10;

/// Result of the tentative prolongator construction
#[derive(Debug, Clone)]
pub struct TentativeProlongator {
    /// `fine_rows x coarse_rows` prolongator
    pub prolongator: CsrMatrix,
    /// Null space of the coarse level (rows of the stacked `R` factors)
    pub coarse_null_space: NullSpace,
    /// Equations per coarse node: the null-space dimension when every
    /// aggregate kept all columns, 1 otherwise
    pub coarse_pde_eqns: usize,
}

/// Build the tentative prolongator for `aggregates`
pub fn tentative_prolongator(
    aggregates: &Aggregates,
    num_pde_eqns: usize,
    null_space: &NullSpace,
) -> Result<TentativeProlongator> {
    let dim = null_space.dim();
    let fine_rows = null_space.num_rows();
    let vectors = null_space.vectors();

    let mut triplets = Vec::new();
    let mut coarse_rows: Vec<Array1<f64>> = Vec::new();
    let mut uniform = true;

    for nodes in aggregates.members() {
        let rows: Vec<usize> = nodes
            .iter()
            .flat_map(|&node| (0..num_pde_eqns).map(move |e| node * num_pde_eqns + e))
            .collect();

        let local = Array2::from_shape_fn((rows.len(), dim), |(i, j)| vectors[[rows[i], j]]);
        let (q, r) = thin_qr(&local);
        if q.ncols() != dim {
            uniform = false;
        }

        let offset = coarse_rows.len();
        for k in 0..q.ncols() {
            for (i, &row) in rows.iter().enumerate() {
                let value = q[[i, k]];
                if value != 0.0 {
                    triplets.push((row, offset + k, value));
                }
            }
            coarse_rows.push(r.row(k).to_owned());
        }
    }

    let num_coarse = coarse_rows.len();
    let prolongator = CsrMatrix::from_triplets(fine_rows, num_coarse, triplets);
    let coarse_vectors = Array2::from_shape_fn((num_coarse, dim), |(i, j)| coarse_rows[i][j]);

    Ok(TentativeProlongator {
        prolongator,
        coarse_null_space: NullSpace::from_columns(coarse_vectors)?,
        coarse_pde_eqns: if uniform { dim } else { 1 },
    })
}

/// Modified Gram-Schmidt thin QR with column dropping
///
/// Returns `Q` (`rows x rank`) and `R` (`rank x cols`) with `A = Q R`.
fn thin_qr(a: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
    let (rows, cols) = a.dim();
    let mut basis: Vec<Array1<f64>> = Vec::with_capacity(cols.min(rows));
    let mut r_rows: Vec<Array1<f64>> = Vec::with_capacity(cols.min(rows));

    for j in 0..cols {
        let original = a.column(j).to_owned();
        let original_norm = original.dot(&original).sqrt();
        let mut v = original;
        let mut coefficients = vec![0.0; basis.len()];

        // Two passes keep the basis orthogonal to working precision
        for _ in 0..2 {
            for (k, q) in basis.iter().enumerate() {
                let c = q.dot(&v);
                coefficients[k] += c;
                v.scaled_add(-c, q);
            }
        }

        for (k, c) in coefficients.into_iter().enumerate() {
            r_rows[k][j] = c;
        }

        let norm = v.dot(&v).sqrt();
        if original_norm > 0.0 && norm > DEPENDENCE_TOLERANCE * original_norm && basis.len() < rows
        {
            let mut r_row = Array1::zeros(cols);
            r_row[j] = norm;
            r_rows.push(r_row);
            basis.push(v / norm);
        }
    }

    let rank = basis.len();
    let q = Array2::from_shape_fn((rows, rank), |(i, k)| basis[k][i]);
    let r = Array2::from_shape_fn((rank, cols), |(k, j)| r_rows[k][j]);
    (q, r)
}

/// Smooth a prolongator with one damped Jacobi step:
/// `P = (I - ω/λ D⁻¹A) P_tent`
///
/// `λ` is the Gershgorin bound of `D⁻¹A`, so the effective damping is
/// `damping_factor / λ`.
pub fn smooth_prolongator(
    matrix: &CsrMatrix,
    tentative: &CsrMatrix,
    damping_factor: f64,
) -> CsrMatrix {
    let diag = matrix.diagonal();
    let lambda = (0..matrix.num_rows)
        .map(|i| {
            let d = diag[i].abs();
            if d > 0.0 {
                matrix.row_entries(i).map(|(_, v)| v.abs()).sum::<f64>() / d
            } else {
                0.0
            }
        })
        .fold(0.0, f64::max);

    if lambda == 0.0 {
        return tentative.clone();
    }
    let omega = damping_factor / lambda;

    let ap = matrix.matmul(tentative);
    let mut triplets = Vec::with_capacity(tentative.nnz() + ap.nnz());
    for i in 0..tentative.num_rows {
        for (j, v) in tentative.row_entries(i) {
            triplets.push((i, j, v));
        }
        if diag[i] != 0.0 {
            let scale = omega / diag[i];
            for (j, v) in ap.row_entries(i) {
                triplets.push((i, j, -scale * v));
            }
        }
    }

    CsrMatrix::from_triplets(tentative.num_rows, tentative.num_cols, triplets)
}

#[cfg(test)]
mod tests {
    use super::super::aggregation::{AggregationScheme, aggregate};
    use super::*;
    use approx::assert_relative_eq;

    fn path_graph(n: usize) -> Vec<Vec<usize>> {
        (0..n)
            .map(|i| {
                let mut nb = Vec::new();
                if i > 0 {
                    nb.push(i - 1);
                }
                if i + 1 < n {
                    nb.push(i + 1);
                }
                nb
            })
            .collect()
    }

    #[test]
    fn test_tentative_reproduces_null_space() {
        let n = 12;
        let aggregates = aggregate(
            &path_graph(n),
            AggregationScheme::Partition {
                local_aggregates: 3,
            },
        );
        let ramp = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { 1.0 } else { i as f64 });
        let null_space = NullSpace::from_columns(ramp.clone()).unwrap();

        let tentative = tentative_prolongator(&aggregates, 1, &null_space).unwrap();

        assert_eq!(tentative.prolongator.num_cols, 6);
        assert_eq!(tentative.coarse_pde_eqns, 2);

        // P * B_coarse == B_fine
        let p = tentative.prolongator.to_dense();
        let reproduced = p.dot(tentative.coarse_null_space.vectors());
        for (a, b) in reproduced.iter().zip(ramp.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }

        // Columns of P are orthonormal
        let ptp = p.t().dot(&p);
        for i in 0..6 {
            for j in 0..6 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(ptp[[i, j]], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_dependent_columns_are_dropped() {
        let n = 4;
        let aggregates = aggregate(
            &path_graph(n),
            AggregationScheme::Partition {
                local_aggregates: 1,
            },
        );
        let vectors = Array2::from_shape_fn((n, 2), |(i, _)| 1.0 + i as f64);
        let null_space = NullSpace::from_columns(vectors).unwrap();

        let tentative = tentative_prolongator(&aggregates, 1, &null_space).unwrap();

        assert_eq!(tentative.prolongator.num_cols, 1);
        assert_eq!(tentative.coarse_pde_eqns, 1);
    }

    #[test]
    fn test_smoothing_keeps_shape() {
        let n = 6;
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
        let a = CsrMatrix::from_triplets(n, n, triplets);
        let aggregates = aggregate(
            &path_graph(n),
            AggregationScheme::Partition {
                local_aggregates: 2,
            },
        );
        let tentative =
            tentative_prolongator(&aggregates, 1, &NullSpace::block_constant(n, 1)).unwrap();

        let smoothed = smooth_prolongator(&a, &tentative.prolongator, 4.0 / 3.0);

        assert_eq!(smoothed.num_rows, n);
        assert_eq!(smoothed.num_cols, 2);
        assert!(smoothed.nnz() > tentative.prolongator.nnz());
    }
}
