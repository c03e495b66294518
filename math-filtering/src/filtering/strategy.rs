//! Strategy and eigensolver selection

use super::config::FilterConfiguration;
use crate::error::{FilterError, Result};
use std::fmt;
use std::str::FromStr;

/// How the computed eigenbasis corrects the preconditioner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterStrategy {
    /// Oblique projection `B G⁻¹ Bᵀ` onto the basis ("projection")
    Projection,
    /// Galerkin correction `Q (QᵀAQ)⁻¹ Qᵀ` added to the cycle ("ml-cycle")
    CycleAugmentation,
    /// Auxiliary two-level hierarchy on the basis ("enhanced")
    HierarchyFattening,
    /// Hand the basis over as null space ("let ML be my master")
    NullSpaceExport,
}

impl FilterStrategy {
    /// Option value selecting this strategy
    pub fn name(&self) -> &'static str {
        match self {
            Self::Projection => "projection",
            Self::CycleAugmentation => "ml-cycle",
            Self::HierarchyFattening => "enhanced",
            Self::NullSpaceExport => "let ML be my master",
        }
    }

    /// Whether the strategy can run on one participant only
    pub fn requires_single_process(&self) -> bool {
        matches!(self, Self::CycleAugmentation)
    }
}

impl FromStr for FilterStrategy {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "projection" => Ok(Self::Projection),
            "ml-cycle" => Ok(Self::CycleAugmentation),
            "enhanced" => Ok(Self::HierarchyFattening),
            "let ML be my master" => Ok(Self::NullSpaceExport),
            other => Err(FilterError::InvalidStrategy {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for FilterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Eigensolver backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EigenSolverKind {
    /// Single-vector implicitly restarted solver, one participant only
    Arpack,
    /// Block Krylov-Schur solver
    Anasazi,
}

impl EigenSolverKind {
    /// Option value selecting this backend
    pub fn name(&self) -> &'static str {
        match self {
            Self::Arpack => "ARPACK",
            Self::Anasazi => "Anasazi",
        }
    }

    /// Cargo feature that compiles the backend in
    pub fn feature(&self) -> &'static str {
        match self {
            Self::Arpack => "arpack",
            Self::Anasazi => "anasazi",
        }
    }

    /// Whether the backend was compiled in
    pub fn is_available(&self) -> bool {
        match self {
            Self::Arpack => cfg!(feature = "arpack"),
            Self::Anasazi => cfg!(feature = "anasazi"),
        }
    }
}

impl FromStr for EigenSolverKind {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ARPACK" => Ok(Self::Arpack),
            "Anasazi" => Ok(Self::Anasazi),
            other => Err(FilterError::InvalidEigensolver {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for EigenSolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validated pair of backend and strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterPlan {
    /// Eigensolver backend
    pub solver: EigenSolverKind,
    /// Correction strategy
    pub strategy: FilterStrategy,
}

/// Resolve the configured backend and strategy for a group of `participants`
///
/// Purely local: every participant evaluates the same checks on the same
/// options, so all of them reach the same verdict.
pub fn select(config: &FilterConfiguration, participants: usize) -> Result<FilterPlan> {
    let solver: EigenSolverKind = config.eigensolver.parse()?;
    if !solver.is_available() {
        return Err(FilterError::SolverUnavailable {
            backend: solver.name(),
            feature: solver.feature(),
        });
    }

    match solver {
        EigenSolverKind::Arpack => {
            if participants != 1 {
                return Err(FilterError::SingleProcessRequired {
                    what: "ARPACK",
                    participants,
                    hint: "",
                });
            }
            let strategy = FilterStrategy::CycleAugmentation;
            if config.strategy != strategy.name() {
                log::warn!(
                    "ARPACK always augments the cycle, ignoring `filtering: type' = `{}'",
                    config.strategy
                );
            }
            Ok(FilterPlan { solver, strategy })
        }
        EigenSolverKind::Anasazi => {
            let strategy: FilterStrategy = config.strategy.parse()?;
            if strategy.requires_single_process() && participants != 1 {
                return Err(FilterError::SingleProcessRequired {
                    what: "option `filtering: type' == `ml-cycle'",
                    participants,
                    hint: "; use `projection' or `enhanced' instead",
                });
            }
            Ok(FilterPlan { solver, strategy })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(eigensolver: &str, strategy: &str) -> FilterConfiguration {
        FilterConfiguration {
            eigensolver: eigensolver.to_string(),
            strategy: strategy.to_string(),
            ..FilterConfiguration::default()
        }
    }

    #[test]
    fn test_strategy_names_round_trip() {
        for strategy in [
            FilterStrategy::Projection,
            FilterStrategy::CycleAugmentation,
            FilterStrategy::HierarchyFattening,
            FilterStrategy::NullSpaceExport,
        ] {
            assert_eq!(strategy.name().parse::<FilterStrategy>().unwrap(), strategy);
        }
        assert!(matches!(
            "Projection".parse::<FilterStrategy>(),
            Err(FilterError::InvalidStrategy { .. })
        ));
    }

    #[test]
    fn test_select_anasazi() {
        let plan = select(&config("Anasazi", "projection"), 4).unwrap();
        assert_eq!(plan.strategy, FilterStrategy::Projection);
        assert_eq!(plan.solver, EigenSolverKind::Anasazi);

        let plan = select(&config("Anasazi", "ml-cycle"), 1).unwrap();
        assert_eq!(plan.strategy, FilterStrategy::CycleAugmentation);
    }

    #[test]
    fn test_select_rejects_multi_process_cycle() {
        let err = select(&config("Anasazi", "ml-cycle"), 2).unwrap_err();
        assert!(matches!(
            err,
            FilterError::SingleProcessRequired { participants: 2, .. }
        ));
        assert!(err.to_string().contains("projection"));
    }

    #[cfg(feature = "arpack")]
    #[test]
    fn test_select_rejects_multi_process_arpack() {
        let err = select(&config("ARPACK", "enhanced"), 3).unwrap_err();
        assert!(matches!(
            err,
            FilterError::SingleProcessRequired { what: "ARPACK", .. }
        ));
    }

    #[cfg(feature = "arpack")]
    #[test]
    fn test_arpack_always_augments_cycle() {
        let plan = select(&config("ARPACK", "projection"), 1).unwrap();
        assert_eq!(plan.strategy, FilterStrategy::CycleAugmentation);
        assert_eq!(plan.solver, EigenSolverKind::Arpack);

        // The strategy name is not validated on this path
        assert!(select(&config("ARPACK", "bogus"), 1).is_ok());
    }

    #[test]
    fn test_availability_follows_features() {
        assert_eq!(EigenSolverKind::Arpack.is_available(), cfg!(feature = "arpack"));
        assert_eq!(EigenSolverKind::Anasazi.is_available(), cfg!(feature = "anasazi"));
    }

    #[cfg(not(feature = "arpack"))]
    #[test]
    fn test_compiled_out_arpack_is_unavailable() {
        let err = select(&config("ARPACK", "ml-cycle"), 1).unwrap_err();
        assert!(matches!(
            err,
            FilterError::SolverUnavailable {
                backend: "ARPACK",
                feature: "arpack"
            }
        ));
        assert!(err.to_string().contains("enable the `arpack` feature"));
    }

    #[cfg(not(feature = "anasazi"))]
    #[test]
    fn test_compiled_out_anasazi_is_unavailable() {
        assert!(matches!(
            select(&config("Anasazi", "projection"), 1),
            Err(FilterError::SolverUnavailable {
                backend: "Anasazi",
                ..
            })
        ));
    }

    #[test]
    fn test_select_rejects_unknown_names() {
        assert!(matches!(
            select(&config("LAPACK", "projection"), 1),
            Err(FilterError::InvalidEigensolver { .. })
        ));
        assert!(matches!(
            select(&config("Anasazi", "bogus"), 1),
            Err(FilterError::InvalidStrategy { .. })
        ));
    }
}
