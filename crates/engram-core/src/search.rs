//! Exact top-k selection
//!
//! Every stored row is compared against the query; a bounded max-heap keeps
//! the `k` best candidates seen so far, so a scan costs
//! `O(count·dim + count·log k)` rather than a full sort.
//!
//! Candidates are totally ordered by `(squared distance, id)` using
//! [`f32::total_cmp`]. Because that order has no ties, the `k` smallest
//! elements of any set are unique, which is what makes the parallel merge
//! independent of worker scheduling.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::simd::DistanceFn;

/// Rows below this count are not worth handing to another worker.
const MIN_ROWS_PER_TASK: usize = 1024;

/// One search result: a stored vector's id and its Euclidean distance to the
/// query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub id: u64,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    id: usize,
    /// Squared L2 distance.
    distance: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded max-heap holding the `k` smallest candidates offered so far.
/// The worst survivor sits on top.
struct TopK {
    k: usize,
    heap: BinaryHeap<Candidate>,
}

impl TopK {
    fn new(k: usize, expected_rows: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.min(expected_rows).saturating_add(1)),
        }
    }

    #[inline]
    fn offer(&mut self, candidate: Candidate) {
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(mut worst) = self.heap.peek_mut() {
            if candidate < *worst {
                // Sifts down when the guard drops.
                *worst = candidate;
            }
        }
    }

    fn merge(mut self, other: TopK) -> TopK {
        if self.heap.len() < other.heap.len() {
            return other.merge(self);
        }
        for candidate in other.heap {
            self.offer(candidate);
        }
        self
    }

    /// Drain into hits, closest first.
    fn into_hits(self) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| SearchHit {
                id: c.id as u64,
                distance: c.distance.sqrt(),
            })
            .collect();
        // sqrt can collapse neighbouring squared values onto one float; keep
        // the id tie-break on the reported value too.
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        hits
    }
}

/// Scan `rows` (row-major, `dim` floats each) whose first row has id
/// `first_id`.
fn scan_range(
    rows: &[f32],
    dim: usize,
    first_id: usize,
    query: &[f32],
    k: usize,
    kernel: DistanceFn,
) -> TopK {
    let mut top = TopK::new(k, rows.len() / dim);
    for (offset, row) in rows.chunks_exact(dim).enumerate() {
        let distance = kernel(query, row);
        top.offer(Candidate {
            id: first_id + offset,
            // Arithmetic NaNs may carry the sign bit, which total_cmp would
            // order before every number.
            distance: if distance.is_nan() { f32::NAN } else { distance },
        });
    }
    top
}

/// Sequential exact search over a row-major buffer.
///
/// `data.len()` must be a multiple of `dim`, `query.len() == dim` and `k > 0`;
/// the engine validates all three before calling in.
pub fn search_sequential(
    data: &[f32],
    dim: usize,
    query: &[f32],
    k: usize,
    kernel: DistanceFn,
) -> Vec<SearchHit> {
    debug_assert_eq!(query.len(), dim);
    debug_assert!(k > 0);
    scan_range(data, dim, 0, query, k, kernel).into_hits()
}

/// Exact search with the row range split across rayon workers.
///
/// Each worker keeps its own top-k; partial lists are merged under the same
/// total order, so the output matches [`search_sequential`] with the same
/// kernel exactly.
pub fn search_parallel(
    pool: Option<&ThreadPool>,
    data: &[f32],
    dim: usize,
    query: &[f32],
    k: usize,
    kernel: DistanceFn,
) -> Vec<SearchHit> {
    debug_assert_eq!(query.len(), dim);
    debug_assert!(k > 0);

    let rows = data.len() / dim;
    let workers = pool
        .map(|p| p.current_num_threads())
        .unwrap_or_else(rayon::current_num_threads)
        .max(1);
    let rows_per_task = rows.div_ceil(workers).max(MIN_ROWS_PER_TASK);

    let run = || {
        data.par_chunks(rows_per_task * dim)
            .enumerate()
            .map(|(task, chunk)| scan_range(chunk, dim, task * rows_per_task, query, k, kernel))
            .reduce(|| TopK::new(k, 0), TopK::merge)
    };

    let top = match pool {
        Some(pool) => pool.install(run),
        None => run(),
    };
    top.into_hits()
}
