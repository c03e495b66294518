//! Aggregation of fine nodes into coarse aggregates
//!
//! Two schemes are available:
//!
//! - **Uncoupled**: the classic three-phase greedy aggregation of smoothed
//!   aggregation AMG (root nodes with their neighbourhoods, then attach
//!   leftovers, then group whatever remains).
//! - **Partition**: graph-growing partition of the node graph into a fixed
//!   number of connected, balanced parts ("METIS" in option strings). Used when
//!   the caller wants an exact aggregate count per participant.
//!
//! Nodes are blocks of `num_pde_eqns` consecutive rows; the node graph is the
//! amalgamated, symmetrized graph of the operator after dropping weak entries.

use crate::error::{MultigridError, Result};
use crate::sparse::CsrMatrix;
use std::collections::VecDeque;

/// Aggregation algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationScheme {
    /// Greedy three-phase aggregation
    #[default]
    Uncoupled,

    /// Graph partition into `local_aggregates` parts
    Partition {
        /// Requested number of aggregates on this participant
        local_aggregates: usize,
    },
}

/// Assignment of every node to one aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregates {
    node_to_aggregate: Vec<usize>,
    num_aggregates: usize,
}

impl Aggregates {
    fn from_assignment(assignment: Vec<Option<usize>>, num_aggregates: usize) -> Self {
        let node_to_aggregate = assignment
            .into_iter()
            .map(|a| a.expect("every node is aggregated before construction"))
            .collect();
        Self {
            node_to_aggregate,
            num_aggregates,
        }
    }

    /// Number of aggregates
    pub fn num_aggregates(&self) -> usize {
        self.num_aggregates
    }

    /// Number of aggregated nodes
    pub fn num_nodes(&self) -> usize {
        self.node_to_aggregate.len()
    }

    /// Aggregate owning `node`
    pub fn aggregate_of(&self, node: usize) -> usize {
        self.node_to_aggregate[node]
    }

    /// Nodes of every aggregate, in increasing node order
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.num_aggregates];
        for (node, &agg) in self.node_to_aggregate.iter().enumerate() {
            members[agg].push(node);
        }
        members
    }
}

/// Build the amalgamated node graph of `matrix`
///
/// Entry `a_ij` connects node `i / num_pde_eqns` to node `j / num_pde_eqns`
/// when `|a_ij| > threshold * sqrt(|a_ii * a_jj|)`. A zero threshold keeps
/// every stored non-zero.
pub fn node_graph(
    matrix: &CsrMatrix,
    num_pde_eqns: usize,
    threshold: f64,
) -> Result<Vec<Vec<usize>>> {
    let num_pde_eqns = num_pde_eqns.max(1);
    if matrix.num_rows % num_pde_eqns != 0 {
        return Err(MultigridError::BlockSizeMismatch {
            rows: matrix.num_rows,
            num_pde_eqns,
        });
    }

    let num_nodes = matrix.num_rows / num_pde_eqns;
    let diag = matrix.diagonal();
    let mut graph = vec![Vec::new(); num_nodes];

    for i in 0..matrix.num_rows {
        let node_i = i / num_pde_eqns;
        for (j, value) in matrix.row_entries(i) {
            let node_j = j / num_pde_eqns;
            if node_i == node_j || value == 0.0 {
                continue;
            }
            let strong = threshold <= 0.0
                || value.abs() > threshold * (diag[i] * diag[j]).abs().sqrt();
            if strong {
                graph[node_i].push(node_j);
                graph[node_j].push(node_i);
            }
        }
    }

    for neighbors in &mut graph {
        neighbors.sort_unstable();
        neighbors.dedup();
    }

    Ok(graph)
}

/// Aggregate the nodes of `graph` with the requested scheme
pub fn aggregate(graph: &[Vec<usize>], scheme: AggregationScheme) -> Aggregates {
    match scheme {
        AggregationScheme::Uncoupled => aggregate_uncoupled(graph),
        AggregationScheme::Partition { local_aggregates } => {
            partition_graph(graph, local_aggregates)
        }
    }
}

fn aggregate_uncoupled(graph: &[Vec<usize>]) -> Aggregates {
    let n = graph.len();
    let mut assignment: Vec<Option<usize>> = vec![None; n];
    let mut num_aggregates = 0;

    // Phase 1: root nodes whose whole neighbourhood is free
    for node in 0..n {
        if assignment[node].is_some() {
            continue;
        }
        if graph[node].iter().all(|&nb| assignment[nb].is_none()) {
            assignment[node] = Some(num_aggregates);
            for &nb in &graph[node] {
                assignment[nb] = Some(num_aggregates);
            }
            num_aggregates += 1;
        }
    }

    // Phase 2: attach leftovers to the neighbouring aggregate they touch most
    let phase_one = assignment.clone();
    for node in 0..n {
        if assignment[node].is_some() {
            continue;
        }
        let mut counts: Vec<(usize, usize)> = Vec::new();
        for agg in graph[node].iter().filter_map(|&nb| phase_one[nb]) {
            match counts.iter_mut().find(|(a, _)| *a == agg) {
                Some((_, c)) => *c += 1,
                None => counts.push((agg, 1)),
            }
        }
        if let Some(&(agg, _)) = counts
            .iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        {
            assignment[node] = Some(agg);
        }
    }

    // Phase 3: whatever is left forms aggregates with its free neighbours
    for node in 0..n {
        if assignment[node].is_some() {
            continue;
        }
        assignment[node] = Some(num_aggregates);
        for &nb in &graph[node] {
            if assignment[nb].is_none() {
                assignment[nb] = Some(num_aggregates);
            }
        }
        num_aggregates += 1;
    }

    Aggregates::from_assignment(assignment, num_aggregates)
}

/// Graph-growing partition into `parts` balanced parts
///
/// Part `p` receives `n / parts` nodes, plus one for the first `n % parts`
/// parts. Each part grows breadth-first from the lowest free node adjacent to
/// the previous parts, falling back to the lowest free node when the
/// component is exhausted.
fn partition_graph(graph: &[Vec<usize>], parts: usize) -> Aggregates {
    let n = graph.len();
    let parts = parts.clamp(1, n.max(1));
    let mut assignment: Vec<Option<usize>> = vec![None; n];
    let mut boundary: VecDeque<usize> = VecDeque::new();
    let mut next_free = 0;

    for part in 0..parts.min(n) {
        let target = n / parts + usize::from(part < n % parts);
        let mut size = 0;
        let mut queue: VecDeque<usize> = VecDeque::new();

        while size < target {
            let seed = match queue.pop_front() {
                Some(node) if assignment[node].is_none() => node,
                Some(_) => continue,
                None => {
                    let from_boundary = std::iter::from_fn(|| boundary.pop_front())
                        .find(|&node| assignment[node].is_none());
                    match from_boundary {
                        Some(node) => node,
                        None => {
                            while assignment[next_free].is_some() {
                                next_free += 1;
                            }
                            next_free
                        }
                    }
                }
            };

            assignment[seed] = Some(part);
            size += 1;
            for &nb in &graph[seed] {
                if assignment[nb].is_none() {
                    queue.push_back(nb);
                }
            }
        }

        boundary.extend(queue.into_iter().filter(|&node| assignment[node].is_none()));
    }

    Aggregates::from_assignment(assignment, parts.min(n))
}
