//! Filtering setups on an in-process group of participants
//!
//! Every participant owns one diagonal block of the global operator and runs
//! the collective setup on its own thread.

use math_audio_filtering::{
    Communicator, CorrectionArtifact, EigenDecomposition, EigenError, EigenPair, EigenParameters,
    EigenSolverService, FilterError, FilterOutcome, FilterStrategy, MultiLevelPreconditioner,
    ParameterList, SpectralOperator, ThreadComm,
};
use math_audio_multigrid::CsrMatrix;
use ndarray::{Array1, Array2};
use num_complex::Complex64;

fn laplacian_1d(n: usize) -> CsrMatrix {
    let mut triplets = Vec::with_capacity(3 * n);
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

/// Run `setup` on every participant of a group of `size` and collect the
/// results in rank order
fn on_group<T, F>(size: usize, setup: F) -> Vec<T>
where
    T: Send,
    F: Fn(&ThreadComm) -> T + Sync,
{
    let group = ThreadComm::group(size);
    std::thread::scope(|scope| {
        let handles: Vec<_> = group
            .iter()
            .map(|comm| {
                let setup = &setup;
                scope.spawn(move || setup(comm))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

fn enabled(strategy: &str) -> ParameterList {
    ParameterList::new()
        .with("filtering: enable", true)
        .with("filtering: type", strategy)
}

#[test]
fn test_cycle_augmentation_requires_one_participant() {
    let results = on_group(2, |comm| {
        let a = laplacian_1d(40);
        let mut precond = MultiLevelPreconditioner::new(&a, enabled("ml-cycle"), comm).unwrap();
        precond.set_filtering().map(|outcome| outcome.code())
    });

    for result in results {
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            FilterError::SingleProcessRequired { participants: 2, .. }
        ));
        assert!(err.to_string().contains("ml-cycle"));
    }
}

#[cfg(feature = "arpack")]
#[test]
fn test_arpack_requires_one_participant() {
    let results = on_group(3, |comm| {
        let a = laplacian_1d(40);
        let params = enabled("enhanced").with("filtering: eigensolver", "ARPACK");
        let mut precond = MultiLevelPreconditioner::new(&a, params, comm).unwrap();
        precond.set_filtering().map(|outcome| outcome.code())
    });

    for result in results {
        assert!(matches!(
            result,
            Err(FilterError::SingleProcessRequired {
                what: "ARPACK",
                participants: 3,
                ..
            })
        ));
    }
}

#[test]
fn test_peer_failure_is_reported_on_every_participant() {
    let results = on_group(2, |comm| {
        let a = laplacian_1d(40);
        let strategy = if comm.rank() == 1 { "bogus" } else { "projection" };
        let mut precond = MultiLevelPreconditioner::new(&a, enabled(strategy), comm).unwrap();
        precond.set_filtering().map(|outcome| outcome.code())
    });

    assert!(matches!(results[0], Err(FilterError::PeerFailure)));
    assert!(matches!(results[1], Err(FilterError::InvalidStrategy { .. })));
}

#[test]
fn test_projection_gram_matrix_is_global() {
    let results: Vec<Result<(FilterOutcome, Array2<f64>), FilterError>> = on_group(2, |comm| {
        // Distinct block sizes keep the global spectrum simple
        let a = laplacian_1d(if comm.rank() == 0 { 80 } else { 64 });
        let params = enabled("projection")
            .with("filtering: eigenvalues to compute", 2usize)
            .with("eigen-analysis: length", 16usize)
            .with("eigen-analysis: block-size", 2usize)
            .with("eigen-analysis: restart", 100usize)
            .with("eigen-analysis: tolerance", 1e-4)
            .with("max levels", 2usize)
            .with("aggregation: damping factor", 0.0)
            .with("smoother: type", "Jacobi");
        let mut precond = MultiLevelPreconditioner::new(&a, params, comm).unwrap();
        let outcome = precond.set_filtering()?;
        let gram = match precond.filter() {
            Some(CorrectionArtifact::Projection(projection)) => projection.gram().clone(),
            _ => Array2::zeros((0, 0)),
        };
        Ok((outcome, gram))
    });

    let (outcome0, gram0) = results[0].as_ref().unwrap();
    let (outcome1, gram1) = results[1].as_ref().unwrap();
    assert_eq!(*outcome0, FilterOutcome::Installed(FilterStrategy::Projection));
    assert_eq!(outcome0, outcome1);

    assert!(gram0.nrows() >= 1);
    assert_eq!(gram0, gram1);
    assert_eq!(gram0, &gram0.t().to_owned());
}

/// Hands out `modes` smooth local vectors, except on `failing_rank` where it
/// misbehaves in the configured way; never communicates
struct LopsidedSolver {
    failing_rank: usize,
    modes: usize,
    failing_modes: Option<usize>,
}

impl EigenSolverService for LopsidedSolver {
    fn compute(
        &self,
        operator: &dyn SpectralOperator,
        comm: &dyn Communicator,
        _params: &EigenParameters,
    ) -> Result<EigenDecomposition, EigenError> {
        let n = operator.local_len();
        let modes = if comm.rank() == self.failing_rank {
            match self.failing_modes {
                Some(modes) => modes,
                None => return Err(EigenError::DimensionMismatch { expected: n, got: 0 }),
            }
        } else {
            self.modes
        };
        let pairs = (0..modes)
            .map(|k| EigenPair {
                eigenvalue: Complex64::new(0.9 - 0.1 * k as f64, 0.0),
                real: Array1::from_iter((0..n).map(|i| ((i * (k + 1)) as f64 * 0.1).cos())),
                imag: Array1::zeros(n),
            })
            .collect();
        Ok(EigenDecomposition {
            eigenvalues: vec![],
            pairs,
            restarts: 0,
        })
    }
}

#[test]
fn test_local_eigensolver_failure_is_agreed_on() {
    let solver = LopsidedSolver {
        failing_rank: 1,
        modes: 1,
        failing_modes: None,
    };
    let results = on_group(2, |comm| {
        let a = laplacian_1d(40);
        let mut precond = MultiLevelPreconditioner::new(&a, enabled("projection"), comm)
            .unwrap()
            .with_eigensolver(&solver);
        let outcome = precond.set_filtering().map(|outcome| outcome.code());
        (outcome, precond.filter().is_none())
    });

    assert!(matches!(results[0].0, Err(FilterError::PeerFailure)));
    assert!(matches!(
        results[1].0,
        Err(FilterError::Eigen(EigenError::DimensionMismatch { .. }))
    ));
    assert!(results.iter().all(|(_, empty)| *empty));
}

#[test]
fn test_oversized_basis_on_one_participant_is_agreed_on() {
    let solver = LopsidedSolver {
        failing_rank: 0,
        modes: 2,
        failing_modes: Some(5),
    };
    let results = on_group(2, |comm| {
        let a = laplacian_1d(40);
        let params = enabled("projection").with("filtering: eigenvalues to compute", 2usize);
        let mut precond = MultiLevelPreconditioner::new(&a, params, comm)
            .unwrap()
            .with_eigensolver(&solver);
        precond.set_filtering().map(|outcome| outcome.code())
    });

    assert!(matches!(
        results[0],
        Err(FilterError::Eigen(EigenError::TooManyModes { columns: 5, .. }))
    ));
    assert!(matches!(results[1], Err(FilterError::PeerFailure)));
}
