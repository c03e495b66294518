//! Typed views of the option list

use super::strategy::EigenSolverKind;
use crate::eigen::EigenParameters;
use crate::params::{ParameterError, PrefixedParameters};
use math_audio_multigrid::{AggregationScheme, MultigridConfig, SmootherConfig, SmootherType};

/// Filtering options, read once per setup
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfiguration {
    /// `filtering: use symmetric cycle`
    pub symmetric_cycle: bool,
    /// `eigen-analysis: restart`
    pub restarts: usize,
    /// `filtering: eigenvalues to compute`
    pub num_eigenvalues: usize,
    /// `eigen-analysis: length`, at least `num_eigenvalues + 1`
    pub length: usize,
    /// `eigen-analysis: block-size`
    pub block_size: usize,
    /// `eigen-analysis: tolerance`
    pub tolerance: f64,
    /// `filtering: eigensolver`
    pub eigensolver: String,
    /// `filtering: type`
    pub strategy: String,
    /// `filtering: local aggregates`
    pub local_aggregates: usize,
    /// `eigen-analysis: random seed`
    pub random_seed: u64,
    /// `PDE equations`
    pub num_pde_eqns: usize,
    /// `output`
    pub output_level: i64,
}

impl Default for FilterConfiguration {
    fn default() -> Self {
        Self {
            symmetric_cycle: false,
            restarts: 50,
            num_eigenvalues: 5,
            length: 6,
            block_size: 1,
            tolerance: 1e-5,
            eigensolver: "Anasazi".to_string(),
            strategy: "enhanced".to_string(),
            local_aggregates: 1,
            random_seed: 0,
            num_pde_eqns: 1,
            output_level: 0,
        }
    }
}

impl FilterConfiguration {
    /// Read every filtering option, falling back to the defaults
    pub fn from_parameters(params: &PrefixedParameters<'_>) -> Result<Self, ParameterError> {
        let defaults = Self::default();

        let num_eigenvalues: usize =
            params.get_or("filtering: eigenvalues to compute", defaults.num_eigenvalues)?;
        let mut length: usize = params.get_or("eigen-analysis: length", num_eigenvalues)?;
        if length <= num_eigenvalues {
            length = num_eigenvalues + 1;
        }
        let random_seed: usize = params.get_or("eigen-analysis: random seed", 0)?;

        Ok(Self {
            symmetric_cycle: params
                .get_or("filtering: use symmetric cycle", defaults.symmetric_cycle)?,
            restarts: params.get_or("eigen-analysis: restart", defaults.restarts)?,
            num_eigenvalues,
            length,
            block_size: params
                .get_or("eigen-analysis: block-size", defaults.block_size)?
                .max(1),
            tolerance: params.get_or("eigen-analysis: tolerance", defaults.tolerance)?,
            eigensolver: params.get_or("filtering: eigensolver", defaults.eigensolver)?,
            strategy: params.get_or("filtering: type", defaults.strategy)?,
            local_aggregates: params
                .get_or("filtering: local aggregates", defaults.local_aggregates)?,
            random_seed: random_seed as u64,
            num_pde_eqns: params
                .get_or("PDE equations", defaults.num_pde_eqns)?
                .max(1),
            output_level: params.get_or("output", defaults.output_level)?,
        })
    }

    /// Whether the eigenvalue report is printed
    pub fn verbose(&self) -> bool {
        self.output_level >= 5
    }

    /// Eigensolver parameters for `solver`; ARPACK works one vector at a time
    pub fn eigen_parameters(&self, solver: EigenSolverKind) -> EigenParameters {
        let block_size = match solver {
            EigenSolverKind::Arpack => 1,
            EigenSolverKind::Anasazi => self.block_size,
        };
        EigenParameters {
            num_eigenvalues: self.num_eigenvalues,
            length: self.length,
            block_size,
            tolerance: self.tolerance,
            max_restarts: self.restarts,
            seed: self.random_seed,
        }
    }
}

/// `filtering: enable`
pub fn filtering_enabled(params: &PrefixedParameters<'_>) -> Result<bool, ParameterError> {
    params.get_or("filtering: enable", false)
}

/// Settings of the primary hierarchy
pub fn multigrid_config(params: &PrefixedParameters<'_>) -> Result<MultigridConfig, ParameterError> {
    let defaults = MultigridConfig::default();
    let smoother_defaults = SmootherConfig::default();

    let scheme = match params.get_or("aggregation: type", "Uncoupled".to_string())?.as_str() {
        "Uncoupled" => AggregationScheme::Uncoupled,
        "METIS" => AggregationScheme::Partition {
            local_aggregates: params.get_or::<usize>("aggregation: local aggregates", 1)?.max(1),
        },
        other => {
            return Err(ParameterError::InvalidValue {
                key: params.key("aggregation: type"),
                value: other.to_string(),
                allowed: "<Uncoupled> / <METIS>",
            });
        }
    };

    let kind = match params
        .get_or("smoother: type", "symmetric Gauss-Seidel".to_string())?
        .as_str()
    {
        "Jacobi" => SmootherType::Jacobi,
        "symmetric Gauss-Seidel" => SmootherType::SymmetricGaussSeidel,
        other => {
            return Err(ParameterError::InvalidValue {
                key: params.key("smoother: type"),
                value: other.to_string(),
                allowed: "<Jacobi> / <symmetric Gauss-Seidel>",
            });
        }
    };

    Ok(MultigridConfig {
        max_levels: params.get_or("max levels", defaults.max_levels)?.max(1),
        max_coarse_size: params.get_or("coarse: max size", defaults.max_coarse_size)?,
        scheme,
        threshold: params.get_or("aggregation: threshold", defaults.threshold)?,
        damping_factor: params.get_or("aggregation: damping factor", defaults.damping_factor)?,
        num_pde_eqns: params.get_or("PDE equations", defaults.num_pde_eqns)?.max(1),
        null_space: None,
        smoother: Some(SmootherConfig {
            kind,
            sweeps: params.get_or("smoother: sweeps", smoother_defaults.sweeps)?,
            damping: params.get_or("smoother: damping factor", smoother_defaults.damping)?,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterList;

    #[test]
    fn test_defaults() {
        let list = ParameterList::new();
        let params = PrefixedParameters::new(&list, "");
        let config = FilterConfiguration::from_parameters(&params).unwrap();
        assert_eq!(config, FilterConfiguration::default());
        assert!(!filtering_enabled(&params).unwrap());
    }

    #[test]
    fn test_length_is_coerced_above_eigenvalue_count() {
        for requested in [3usize, 5] {
            let list = ParameterList::new()
                .with("filtering: eigenvalues to compute", 5usize)
                .with("eigen-analysis: length", requested);
            let config =
                FilterConfiguration::from_parameters(&PrefixedParameters::new(&list, "")).unwrap();
            assert_eq!(config.length, 6);
        }

        let list = ParameterList::new()
            .with("filtering: eigenvalues to compute", 5usize)
            .with("eigen-analysis: length", 12usize);
        let config =
            FilterConfiguration::from_parameters(&PrefixedParameters::new(&list, "")).unwrap();
        assert_eq!(config.length, 12);
    }

    #[test]
    fn test_prefixed_options() {
        let list = ParameterList::new()
            .with("pre: filtering: type", "projection")
            .with("filtering: type", "ml-cycle")
            .with("pre: eigen-analysis: block-size", 3usize);
        let config =
            FilterConfiguration::from_parameters(&PrefixedParameters::new(&list, "pre: "))
                .unwrap();
        assert_eq!(config.strategy, "projection");
        assert_eq!(config.block_size, 3);
        assert_eq!(config.eigen_parameters(EigenSolverKind::Arpack).block_size, 1);
        assert_eq!(config.eigen_parameters(EigenSolverKind::Anasazi).block_size, 3);
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let list = ParameterList::new().with("filtering: eigenvalues to compute", "five");
        let err = FilterConfiguration::from_parameters(&PrefixedParameters::new(&list, ""))
            .unwrap_err();
        assert!(matches!(err, ParameterError::TypeMismatch { .. }));
    }

    #[test]
    fn test_multigrid_options() {
        let list = ParameterList::new()
            .with("aggregation: type", "METIS")
            .with("aggregation: local aggregates", 4usize)
            .with("smoother: type", "Jacobi")
            .with("coarse: max size", 8usize);
        let config = multigrid_config(&PrefixedParameters::new(&list, "")).unwrap();
        assert_eq!(config.scheme, AggregationScheme::Partition { local_aggregates: 4 });
        assert_eq!(config.max_coarse_size, 8);
        assert_eq!(config.smoother.map(|s| s.kind), Some(SmootherType::Jacobi));

        let list = ParameterList::new().with("smoother: type", "Chebyshev");
        assert!(matches!(
            multigrid_config(&PrefixedParameters::new(&list, "")),
            Err(ParameterError::InvalidValue { .. })
        ));
    }
}
