//! Participants and collective operations
//!
//! Every participant owns the local rows of the operator. Global vectors are
//! the concatenation of the local parts, so a global inner product is a local
//! dot product followed by [`Communicator::sum_all`].

use ndarray::Array1;
use std::sync::{Arc, Barrier, Mutex, PoisonError};

/// Collective operations over a fixed group of participants
///
/// All participants must call the collective methods in the same order.
pub trait Communicator: Send + Sync {
    /// Index of this participant, `0..size`
    fn rank(&self) -> usize;

    /// Number of participants
    fn size(&self) -> usize;

    /// Element-wise sum of `values` over all participants, in place
    fn sum_all(&self, values: &mut [f64]);

    /// Wait until every participant reaches this point
    fn barrier(&self);

    /// Collective AND of `flag`
    fn all_true(&self, flag: bool) -> bool {
        let mut failures = [if flag { 0.0 } else { 1.0 }];
        self.sum_all(&mut failures);
        failures[0] == 0.0
    }

    /// Global inner product of two distributed vectors
    fn dot(&self, x: &Array1<f64>, y: &Array1<f64>) -> f64 {
        let mut value = [x.dot(y)];
        self.sum_all(&mut value);
        value[0]
    }

    /// Global Euclidean norm of a distributed vector
    fn norm(&self, x: &Array1<f64>) -> f64 {
        self.dot(x, x).sqrt()
    }
}

/// Single participant
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn sum_all(&self, _values: &mut [f64]) {}

    fn barrier(&self) {}
}

struct Shared {
    slots: Mutex<Vec<Vec<f64>>>,
    barrier: Barrier,
}

/// One participant of an in-process group running on OS threads
///
/// Reductions are summed in rank order, so every participant sees
/// bit-identical results.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Create a group of `size` participants; hand one to each thread
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            slots: Mutex::new(vec![Vec::new(); size]),
            barrier: Barrier::new(size),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn sum_all(&self, values: &mut [f64]) {
        {
            let mut slots = self
                .shared
                .slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slots[self.rank].clear();
            slots[self.rank].extend_from_slice(values);
        }
        self.shared.barrier.wait();

        {
            let slots = self
                .shared
                .slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            values.fill(0.0);
            for contribution in slots.iter() {
                for (v, c) in values.iter_mut().zip(contribution) {
                    *v += c;
                }
            }
        }
        // Nobody may overwrite its slot before every participant has read
        self.shared.barrier.wait();
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }
}
