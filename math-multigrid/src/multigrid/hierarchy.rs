//! Smoothed-aggregation multigrid hierarchy and V-cycle
//!
//! The finest level borrows the caller's operator, so several hierarchies can
//! be built on top of one matrix without copying it. Coarser levels own their
//! Galerkin operators `Pᵀ A P`. The coarsest level is solved with a dense LU.

use super::aggregation::{AggregationScheme, aggregate, node_graph};
use super::null_space::NullSpace;
use super::prolongation::{smooth_prolongator, tentative_prolongator};
use super::smoother::SmootherConfig;
use crate::direct::{LuFactorization, lu_factorize};
use crate::error::{MultigridError, Result};
use crate::sparse::CsrMatrix;
use crate::traits::Preconditioner;
use ndarray::Array1;
use std::borrow::Cow;

/// Shape of the cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleForm {
    /// Pre- and post-smoothing; the cycle is a symmetric operator for SPD `A`
    #[default]
    Symmetric,

    /// Pre-smoothing only
    NonSymmetric,
}

/// Hierarchy construction settings
#[derive(Debug, Clone)]
pub struct MultigridConfig {
    /// Maximum number of levels, the finest included
    pub max_levels: usize,
    /// Stop coarsening once a level has at most this many rows
    pub max_coarse_size: usize,
    /// Aggregation algorithm used on every level
    pub scheme: AggregationScheme,
    /// Strength-of-connection drop tolerance
    pub threshold: f64,
    /// Prolongator smoothing factor; zero keeps the tentative prolongator
    pub damping_factor: f64,
    /// Equations per node on the finest level
    pub num_pde_eqns: usize,
    /// Candidate null space; block-constant vectors when `None`
    pub null_space: Option<NullSpace>,
    /// Level smoother; `None` runs a pure coarse-grid correction
    pub smoother: Option<SmootherConfig>,
}

impl Default for MultigridConfig {
    fn default() -> Self {
        Self {
            max_levels: 10,
            max_coarse_size: 32,
            scheme: AggregationScheme::Uncoupled,
            threshold: 0.0,
            damping_factor: 4.0 / 3.0,
            num_pde_eqns: 1,
            null_space: None,
            smoother: Some(SmootherConfig::default()),
        }
    }
}

struct Level<'a> {
    matrix: Cow<'a, CsrMatrix>,
    prolongation: Option<CsrMatrix>,
    restriction: Option<CsrMatrix>,
}

/// Result of one coarsening step
struct Coarsening {
    prolongation: CsrMatrix,
    coarse_matrix: CsrMatrix,
    null_space: NullSpace,
    num_pde_eqns: usize,
}

/// Diagnostic information about a hierarchy
#[derive(Debug, Clone)]
pub struct MultigridDiagnostics {
    /// Number of levels
    pub num_levels: usize,
    /// Rows per level
    pub level_dofs: Vec<usize>,
    /// Stored non-zeros per level
    pub level_nnz: Vec<usize>,
    /// Sum of level non-zeros over finest non-zeros
    pub operator_complexity: f64,
    /// Setup time in milliseconds
    pub setup_time_ms: f64,
}

/// Aggregation multigrid hierarchy
pub struct MultigridHierarchy<'a> {
    levels: Vec<Level<'a>>,
    coarse_solver: LuFactorization,
    smoother: Option<SmootherConfig>,
    setup_time_ms: f64,
}

impl<'a> MultigridHierarchy<'a> {
    /// Build a hierarchy whose finest level borrows `matrix`
    pub fn build(matrix: &'a CsrMatrix, config: &MultigridConfig) -> Result<Self> {
        let start = std::time::Instant::now();

        if matrix.num_rows != matrix.num_cols {
            return Err(MultigridError::NonSquareOperator {
                rows: matrix.num_rows,
                cols: matrix.num_cols,
            });
        }
        let num_pde_eqns = config.num_pde_eqns.max(1);
        if matrix.num_rows % num_pde_eqns != 0 {
            return Err(MultigridError::BlockSizeMismatch {
                rows: matrix.num_rows,
                num_pde_eqns,
            });
        }

        let mut null_space = match &config.null_space {
            Some(ns) if ns.num_rows() != matrix.num_rows => {
                return Err(MultigridError::NullSpaceDimension {
                    expected: matrix.num_rows,
                    got: ns.num_rows(),
                });
            }
            Some(ns) => ns.clone(),
            None => NullSpace::block_constant(matrix.num_rows, num_pde_eqns),
        };
        let mut pde_eqns = num_pde_eqns;

        let mut levels = vec![Level {
            matrix: Cow::Borrowed(matrix),
            prolongation: None,
            restriction: None,
        }];

        while levels.len() < config.max_levels.max(1) {
            let current = &levels[levels.len() - 1].matrix;
            if current.num_rows <= config.max_coarse_size {
                break;
            }

            let Some(step) = coarsen(current, pde_eqns, &null_space, config)? else {
                break;
            };

            log::debug!(
                "multigrid level {}: {} -> {} rows",
                levels.len() - 1,
                current.num_rows,
                step.coarse_matrix.num_rows
            );

            if let Some(last) = levels.last_mut() {
                last.restriction = Some(step.prolongation.transpose());
                last.prolongation = Some(step.prolongation);
            }
            levels.push(Level {
                matrix: Cow::Owned(step.coarse_matrix),
                prolongation: None,
                restriction: None,
            });
            null_space = step.null_space;
            pde_eqns = step.num_pde_eqns;
        }

        let coarsest = levels.len() - 1;
        let coarse_solver = lu_factorize(&levels[coarsest].matrix.to_dense()).map_err(|source| {
            MultigridError::CoarseSolver {
                level: coarsest,
                source,
            }
        })?;

        Ok(Self {
            levels,
            coarse_solver,
            smoother: config.smoother,
            setup_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Number of levels
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Rows of the finest level
    pub fn num_rows(&self) -> usize {
        self.levels[0].matrix.num_rows
    }

    /// Operator of the finest level
    pub fn finest_matrix(&self) -> &CsrMatrix {
        &self.levels[0].matrix
    }

    /// Whether the finest level is `matrix` itself rather than a copy
    pub fn shares_finest_with(&self, matrix: &CsrMatrix) -> bool {
        matches!(&self.levels[0].matrix, Cow::Borrowed(m) if std::ptr::eq(*m, matrix))
    }

    /// Operator of `level`
    pub fn level_matrix(&self, level: usize) -> Option<&CsrMatrix> {
        self.levels.get(level).map(|l| &*l.matrix)
    }

    /// Prolongator from `level + 1` to `level`
    pub fn prolongation(&self, level: usize) -> Option<&CsrMatrix> {
        self.levels.get(level).and_then(|l| l.prolongation.as_ref())
    }

    /// Get diagnostic information
    pub fn diagnostics(&self) -> MultigridDiagnostics {
        let level_nnz: Vec<usize> = self.levels.iter().map(|l| l.matrix.nnz()).collect();
        let fine_nnz = level_nnz[0].max(1) as f64;
        MultigridDiagnostics {
            num_levels: self.levels.len(),
            level_dofs: self.levels.iter().map(|l| l.matrix.num_rows).collect(),
            operator_complexity: level_nnz.iter().sum::<usize>() as f64 / fine_nnz,
            level_nnz,
            setup_time_ms: self.setup_time_ms,
        }
    }

    /// Apply one V-cycle with zero initial guess
    ///
    /// A residual of the wrong length is returned unchanged, with a warning.
    pub fn apply_with_form(&self, r: &Array1<f64>, form: CycleForm) -> Array1<f64> {
        let n = self.num_rows();
        if r.len() != n {
            log::warn!(
                "V-cycle skipped: residual has {} entries, the hierarchy has {} rows",
                r.len(),
                n
            );
            return r.clone();
        }
        let mut z = Array1::zeros(n);
        self.v_cycle(0, &mut z, r, form);
        z
    }

    fn v_cycle(&self, level: usize, x: &mut Array1<f64>, b: &Array1<f64>, form: CycleForm) {
        let lvl = &self.levels[level];

        let (Some(prolongation), Some(restriction)) = (&lvl.prolongation, &lvl.restriction)
        else {
            match self.coarse_solver.solve(b) {
                Ok(solution) => *x = solution,
                Err(err) => log::warn!("coarse solve on level {level} skipped: {err}"),
            }
            return;
        };

        if let Some(smoother) = &self.smoother {
            smoother.smooth(&lvl.matrix, x, b);
        }

        let r = b - &lvl.matrix.matvec(x);
        let r_coarse = restriction.matvec(&r);
        let mut e_coarse = Array1::zeros(r_coarse.len());
        self.v_cycle(level + 1, &mut e_coarse, &r_coarse, form);
        *x += &prolongation.matvec(&e_coarse);

        if form == CycleForm::Symmetric {
            if let Some(smoother) = &self.smoother {
                smoother.smooth(&lvl.matrix, x, b);
            }
        }
    }
}

impl Preconditioner for MultigridHierarchy<'_> {
    fn apply(&self, r: &Array1<f64>) -> Array1<f64> {
        self.apply_with_form(r, CycleForm::Symmetric)
    }
}

fn coarsen(
    matrix: &CsrMatrix,
    num_pde_eqns: usize,
    null_space: &NullSpace,
    config: &MultigridConfig,
) -> Result<Option<Coarsening>> {
    let graph = node_graph(matrix, num_pde_eqns, config.threshold)?;
    let aggregates = aggregate(&graph, config.scheme);
    let tentative = tentative_prolongator(&aggregates, num_pde_eqns, null_space)?;

    let num_coarse = tentative.prolongator.num_cols;
    if num_coarse == 0 || num_coarse >= matrix.num_rows {
        return Ok(None);
    }

    let prolongation = if config.damping_factor > 0.0 {
        smooth_prolongator(matrix, &tentative.prolongator, config.damping_factor)
    } else {
        tentative.prolongator
    };
    let coarse_matrix = prolongation
        .transpose()
        .matmul(&matrix.matmul(&prolongation));

    Ok(Some(Coarsening {
        prolongation,
        coarse_matrix,
        null_space: tentative.coarse_null_space,
        num_pde_eqns: tentative.coarse_pde_eqns,
    }))
}
