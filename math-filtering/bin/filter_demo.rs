use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use math_audio_filtering::{FilterOutcome, MultiLevelPreconditioner, ParameterList, SerialComm};
use math_audio_multigrid::{
    CsrMatrix, GmresConfig, GmresSolution, Preconditioner, gmres_preconditioned,
};
use ndarray::Array1;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "filter-demo",
    about = "Compare GMRES with a plain and a spectrally filtered multigrid preconditioner"
)]
struct Cli {
    /// Interior grid points per direction of the convection-diffusion problem
    #[arg(long, default_value_t = 32)]
    grid: usize,

    /// Convection velocity along x (0 gives the Poisson problem)
    #[arg(long, default_value_t = 20.0)]
    convection: f64,

    /// Filtering strategy
    #[arg(long, value_enum, default_value_t = StrategyChoice::Enhanced)]
    strategy: StrategyChoice,

    /// Eigensolver backend
    #[arg(long, value_enum, default_value_t = SolverChoice::Anasazi)]
    eigensolver: SolverChoice,

    /// Number of eigenvalues to compute
    #[arg(long, default_value_t = 5)]
    eigenvalues: usize,

    /// Apply the second cycle after the correction
    #[arg(long)]
    symmetric: bool,

    /// Extra options as a JSON object; overrides the flags above
    #[arg(long)]
    params: Option<PathBuf>,

    /// GMRES relative tolerance
    #[arg(long, default_value_t = 1e-8)]
    tol: f64,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StrategyChoice {
    Projection,
    MlCycle,
    Enhanced,
    Export,
}

impl StrategyChoice {
    fn option_value(self) -> &'static str {
        match self {
            StrategyChoice::Projection => "projection",
            StrategyChoice::MlCycle => "ml-cycle",
            StrategyChoice::Enhanced => "enhanced",
            StrategyChoice::Export => "let ML be my master",
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SolverChoice {
    Arpack,
    Anasazi,
}

impl SolverChoice {
    fn option_value(self) -> &'static str {
        match self {
            SolverChoice::Arpack => "ARPACK",
            SolverChoice::Anasazi => "Anasazi",
        }
    }
}

/// Upwinded `-Δu + c ∂u/∂x` on the unit square, Dirichlet boundary
fn convection_diffusion(n: usize, velocity: f64) -> CsrMatrix {
    let h = 1.0 / (n + 1) as f64;
    let upwind = velocity * h;
    let idx = |i: usize, j: usize| i * n + j;
    let mut triplets = Vec::with_capacity(5 * n * n);

    for i in 0..n {
        for j in 0..n {
            let row = idx(i, j);
            triplets.push((row, row, 4.0 + upwind.abs()));
            if i > 0 {
                triplets.push((row, idx(i - 1, j), -1.0));
            }
            if i + 1 < n {
                triplets.push((row, idx(i + 1, j), -1.0));
            }
            if j > 0 {
                let extra = if velocity > 0.0 { upwind } else { 0.0 };
                triplets.push((row, idx(i, j - 1), -1.0 - extra));
            }
            if j + 1 < n {
                let extra = if velocity < 0.0 { -upwind } else { 0.0 };
                triplets.push((row, idx(i, j + 1), -1.0 - extra));
            }
        }
    }
    CsrMatrix::from_triplets(n * n, n * n, triplets)
}

fn solve<P: Preconditioner>(
    matrix: &CsrMatrix,
    precond: &P,
    rhs: &Array1<f64>,
    tol: f64,
) -> (GmresSolution, f64) {
    let config = GmresConfig {
        max_iterations: 50,
        restart: 30,
        tolerance: tol,
        print_interval: 0,
    };
    let start = Instant::now();
    let solution = gmres_preconditioned(matrix, precond, rhs, &config);
    (solution, start.elapsed().as_secs_f64())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let matrix = convection_diffusion(cli.grid.max(2), cli.convection);
    let rhs = Array1::ones(matrix.num_rows);
    println!(
        "convection-diffusion: {} unknowns, {} non-zeros, velocity {}",
        matrix.num_rows,
        matrix.nnz(),
        cli.convection
    );

    let mut params = ParameterList::new()
        .with("filtering: enable", true)
        .with("filtering: type", cli.strategy.option_value())
        .with("filtering: eigensolver", cli.eigensolver.option_value())
        .with("filtering: eigenvalues to compute", cli.eigenvalues)
        .with("filtering: use symmetric cycle", cli.symmetric)
        .with("output", 5i64);
    if let Some(path) = &cli.params {
        let overrides = ParameterList::from_json_file(path)
            .with_context(|| format!("reading options from {}", path.display()))?;
        for (key, value) in overrides.iter() {
            params.set(key.clone(), value.clone());
        }
    }

    let comm = SerialComm;
    let mut precond = MultiLevelPreconditioner::new(&matrix, params, &comm)
        .context("building the multigrid hierarchy")?;
    let (plain, plain_time) = solve(&matrix, &precond, &rhs, cli.tol);

    let outcome = precond.set_filtering().context("filtering setup")?;
    if let FilterOutcome::Exported { dimension } = outcome {
        println!("exported a {dimension}-dimensional null space, rebuilding the hierarchy");
        precond.recompute_with_exported_null_space()?;
    }
    let (filtered, filtered_time) = solve(&matrix, &precond, &rhs, cli.tol);

    println!();
    println!(
        "{:<12} {:>10} {:>12} {:>10} {:>10}",
        "cycle", "iterations", "residual", "converged", "time [s]"
    );
    for (name, solution, time) in [
        ("plain", &plain, plain_time),
        ("filtered", &filtered, filtered_time),
    ] {
        println!(
            "{:<12} {:>10} {:>12.3e} {:>10} {:>10.3}",
            name, solution.iterations, solution.residual, solution.converged, time
        );
    }
    println!("setup status code: {}", outcome.code());

    Ok(())
}
