//! Multilevel preconditioner with optional spectral filtering
//!
//! [`MultiLevelPreconditioner`] owns the primary aggregation hierarchy built
//! from the option list. [`MultiLevelPreconditioner::set_filtering`] computes
//! the slowly converging modes of its cycle and installs the configured
//! correction. The filtered preconditioner applies
//!
//! ```text
//! z  = M⁻¹ r
//! z += C (r - A z)        correction of the installed strategy
//! z += M⁻¹ (r - A z)      symmetric form only
//! ```

use crate::comm::Communicator;
use crate::eigen::{EigenDecomposition, EigenSolverService, KrylovSchur};
use crate::error::{FilterError, Result};
use crate::filtering::config::{filtering_enabled, multigrid_config};
use crate::filtering::strategy::{self, FilterPlan};
use crate::filtering::{
    CorrectionArtifact, CycleAugmentation, ExportedNullSpace, FilterConfiguration, FilterOutcome,
    FilterStrategy, HierarchyFattening, IterationOperator, NullSpaceBasis, ProjectionCorrection,
};
use crate::params::{ParameterList, PrefixedParameters};
use math_audio_multigrid::{CsrMatrix, CycleForm, MultigridHierarchy, Preconditioner};
use ndarray::Array1;
use std::time::Instant;

/// Aggregation multigrid preconditioner of one participant's operator block
pub struct MultiLevelPreconditioner<'a> {
    matrix: &'a CsrMatrix,
    comm: &'a dyn Communicator,
    params: ParameterList,
    prefix: String,
    hierarchy: MultigridHierarchy<'a>,
    filter: Option<CorrectionArtifact<'a>>,
    filtered_form: CycleForm,
    eigensolver: Option<&'a dyn EigenSolverService>,
}

impl<'a> MultiLevelPreconditioner<'a> {
    /// Build the primary hierarchy of `matrix` from unprefixed options
    pub fn new(
        matrix: &'a CsrMatrix,
        params: ParameterList,
        comm: &'a dyn Communicator,
    ) -> Result<Self> {
        Self::with_prefix(matrix, params, "", comm)
    }

    /// Build the primary hierarchy, reading every option as `<prefix><name>`
    pub fn with_prefix(
        matrix: &'a CsrMatrix,
        params: ParameterList,
        prefix: impl Into<String>,
        comm: &'a dyn Communicator,
    ) -> Result<Self> {
        let prefix = prefix.into();
        let config = multigrid_config(&PrefixedParameters::new(&params, &prefix))?;
        let hierarchy = MultigridHierarchy::build(matrix, &config)?;

        if comm.rank() == 0 {
            let diagnostics = hierarchy.diagnostics();
            log::info!(
                "multigrid hierarchy: {} levels, rows {:?}, operator complexity {:.3}",
                diagnostics.num_levels,
                diagnostics.level_dofs,
                diagnostics.operator_complexity
            );
        }

        Ok(Self {
            matrix,
            comm,
            params,
            prefix,
            hierarchy,
            filter: None,
            filtered_form: CycleForm::NonSymmetric,
            eigensolver: None,
        })
    }

    /// Replace the built-in Krylov-Schur solver
    pub fn with_eigensolver(mut self, solver: &'a dyn EigenSolverService) -> Self {
        self.eigensolver = Some(solver);
        self
    }

    /// The operator
    pub fn matrix(&self) -> &'a CsrMatrix {
        self.matrix
    }

    /// The primary hierarchy
    pub fn hierarchy(&self) -> &MultigridHierarchy<'a> {
        &self.hierarchy
    }

    /// The option list
    pub fn parameters(&self) -> &ParameterList {
        &self.params
    }

    /// Mutable access to the options; they are read again by the next setup
    pub fn parameters_mut(&mut self) -> &mut ParameterList {
        &mut self.params
    }

    /// The installed correction, if any
    pub fn filter(&self) -> Option<&CorrectionArtifact<'a>> {
        self.filter.as_ref()
    }

    /// Null space waiting for export, if the last setup produced one
    pub fn exported_null_space(&self) -> Option<&ExportedNullSpace> {
        match &self.filter {
            Some(CorrectionArtifact::NullSpaceExport(export)) => Some(export),
            _ => None,
        }
    }

    /// Drop the installed correction
    pub fn reset_filtering(&mut self) {
        self.filter = None;
    }

    /// Compute the slow modes of the cycle and install the configured correction
    ///
    /// Collective: every participant must call it. Returns
    /// [`FilterOutcome::Disabled`] without any work when `filtering: enable` is
    /// off. A previously installed correction is replaced.
    pub fn set_filtering(&mut self) -> Result<FilterOutcome> {
        let view = PrefixedParameters::new(&self.params, &self.prefix);
        if !filtering_enabled(&view)? {
            return Ok(FilterOutcome::Disabled);
        }

        let local = FilterConfiguration::from_parameters(&view)
            .map_err(FilterError::from)
            .and_then(|config| {
                let plan = strategy::select(&config, self.comm.size())?;
                Ok((config, plan))
            });
        let (config, plan) = self.agree(local).map_err(|err| self.report(err))?;

        self.reset_filtering();
        self.filtered_form = if config.symmetric_cycle {
            CycleForm::Symmetric
        } else {
            CycleForm::NonSymmetric
        };

        let start = Instant::now();
        let artifact = self
            .build_correction(&config, plan)
            .map_err(|err| self.report(err))?;

        let outcome = match &artifact {
            CorrectionArtifact::NullSpaceExport(export) => FilterOutcome::Exported {
                dimension: export.dim(),
            },
            other => FilterOutcome::Installed(other.strategy()),
        };
        self.filter = Some(artifact);

        if self.comm.rank() == 0 {
            log::info!(
                "filtering setup ({}, {}) done in {:.3} s",
                plan.solver,
                plan.strategy,
                start.elapsed().as_secs_f64()
            );
        }
        Ok(outcome)
    }

    /// Rebuild the primary hierarchy with the exported null space
    ///
    /// Consumes the export buffer. Returns `false` when no export is pending.
    pub fn recompute_with_exported_null_space(&mut self) -> Result<bool> {
        let export = match self.filter.take() {
            Some(CorrectionArtifact::NullSpaceExport(export)) => export,
            other => {
                self.filter = other;
                return Ok(false);
            }
        };

        let mut config = multigrid_config(&PrefixedParameters::new(&self.params, &self.prefix))?;
        let dim = export.dim();
        config.null_space = Some(export.into_null_space()?);
        self.hierarchy = MultigridHierarchy::build(self.matrix, &config)?;

        if self.comm.rank() == 0 {
            log::info!(
                "hierarchy recomputed with a {}-dimensional null space, {} levels",
                dim,
                self.hierarchy.num_levels()
            );
        }
        Ok(true)
    }

    fn build_correction(
        &self,
        config: &FilterConfiguration,
        plan: FilterPlan,
    ) -> Result<CorrectionArtifact<'a>> {
        let verbose = config.verbose() && self.comm.rank() == 0;
        if verbose {
            log::info!(
                "filtering: {} eigenvalue(s) with {}, length {}, block size {}, tolerance {:e}, \
                 {} restart(s), type `{}', symmetric cycle {}",
                config.num_eigenvalues,
                plan.solver,
                config.length,
                config.block_size,
                config.tolerance,
                config.restarts,
                plan.strategy,
                config.symmetric_cycle
            );
        }

        let builtin = KrylovSchur;
        let solver: &dyn EigenSolverService = match self.eigensolver {
            Some(solver) => solver,
            None => &builtin,
        };
        let operator = IterationOperator::new(self.matrix, &self.hierarchy);
        let decomposition = self.agree(
            solver
                .compute(&operator, self.comm, &config.eigen_parameters(plan.solver))
                .map_err(FilterError::from),
        )?;
        if verbose {
            report_eigenvalues(&decomposition);
        }

        let basis = self.agree(NullSpaceBasis::from_decomposition(
            &decomposition,
            config.num_eigenvalues,
            self.matrix.num_rows,
            self.comm,
        ))?;
        if verbose {
            log::info!(
                "Using {} real and {} imaginary eigenvector(s)",
                basis.num_real(),
                basis.num_imag()
            );
        }

        let artifact = match plan.strategy {
            FilterStrategy::Projection => {
                ProjectionCorrection::build(&basis, self.comm).map(CorrectionArtifact::Projection)
            }
            FilterStrategy::CycleAugmentation => CycleAugmentation::build(self.matrix, &basis)
                .map(CorrectionArtifact::CycleAugmentation),
            FilterStrategy::HierarchyFattening => HierarchyFattening::build(
                self.matrix,
                &basis,
                config.num_pde_eqns,
                config.local_aggregates,
            )
            .map(CorrectionArtifact::HierarchyFattening),
            FilterStrategy::NullSpaceExport => {
                ExportedNullSpace::build(&basis, config.num_pde_eqns)
                    .map(CorrectionArtifact::NullSpaceExport)
            }
        };
        self.agree(artifact)
    }

    /// Collective verdict on a local result
    ///
    /// A participant whose own step succeeded while a peer failed gets
    /// [`FilterError::PeerFailure`], so no participant enters the next
    /// reduction alone.
    fn agree<T>(&self, local: Result<T>) -> Result<T> {
        let agreed = self.comm.all_true(local.is_ok());
        match local {
            Ok(_) if !agreed => Err(FilterError::PeerFailure),
            other => other,
        }
    }

    fn report(&self, err: FilterError) -> FilterError {
        if self.comm.rank() == 0 {
            log::error!("{err}");
        }
        err
    }
}

fn report_eigenvalues(decomposition: &EigenDecomposition) {
    log::info!("eigenvalues of I - M^-1 A ({} restart(s)):", decomposition.restarts);
    log::info!("{:>15} {:>15} {:>15}", "Re(lambda)", "Im(lambda)", "|lambda|");
    for value in &decomposition.eigenvalues {
        log::info!("{:15.5e} {:15.5e} {:15.5e}", value.re, value.im, value.norm());
    }
}

impl Preconditioner for MultiLevelPreconditioner<'_> {
    fn apply(&self, r: &Array1<f64>) -> Array1<f64> {
        let mut z = self.hierarchy.apply(r);
        let Some(artifact) = &self.filter else {
            return z;
        };

        let s = r - &self.matrix.matvec(&z);
        let Some(correction) = artifact.correct(&s, self.comm) else {
            return z;
        };
        z += &correction;

        if self.filtered_form == CycleForm::Symmetric {
            let s = r - &self.matrix.matvec(&z);
            z += &self.hierarchy.apply(&s);
        }
        z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;

    fn laplacian_1d(n: usize) -> CsrMatrix {
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
        CsrMatrix::from_triplets(n, n, triplets)
    }

    #[test]
    fn test_disabled_is_a_no_op() {
        let a = laplacian_1d(50);
        let mut precond =
            MultiLevelPreconditioner::new(&a, ParameterList::new(), &SerialComm).unwrap();
        assert_eq!(precond.set_filtering().unwrap(), FilterOutcome::Disabled);
        assert!(precond.filter().is_none());

        let r = Array1::ones(50);
        assert_eq!(precond.apply(&r), precond.hierarchy().apply(&r));
    }

    #[test]
    fn test_invalid_strategy_is_rejected() {
        let a = laplacian_1d(50);
        let params = ParameterList::new()
            .with("filtering: enable", true)
            .with("filtering: type", "fancy");
        let mut precond = MultiLevelPreconditioner::new(&a, params, &SerialComm).unwrap();
        assert!(matches!(
            precond.set_filtering(),
            Err(FilterError::InvalidStrategy { .. })
        ));
        assert!(precond.filter().is_none());
    }

    #[test]
    fn test_primary_hierarchy_reads_prefixed_options() {
        let a = laplacian_1d(64);
        let params = ParameterList::new()
            .with("ml: max levels", 1usize)
            .with("max levels", 5usize);
        let precond = MultiLevelPreconditioner::with_prefix(&a, params, "ml: ", &SerialComm)
            .unwrap();
        assert_eq!(precond.hierarchy().num_levels(), 1);
        assert!(precond.hierarchy().shares_finest_with(&a));
    }

    #[test]
    fn test_recompute_without_export_is_a_no_op() {
        let a = laplacian_1d(40);
        let mut precond =
            MultiLevelPreconditioner::new(&a, ParameterList::new(), &SerialComm).unwrap();
        assert!(!precond.recompute_with_exported_null_space().unwrap());
    }
}
