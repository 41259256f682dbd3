//! Worker fan-out for batch search.
//!
//! Queries are statically partitioned into contiguous ranges across at most
//! [`MAX_SEARCH_WORKERS`] scoped threads (further capped by hardware
//! concurrency and the query count); each worker runs read-only index
//! searches over its range. The cap bounds memory pressure from beam-search
//! scratch buffers. Results come back in input order.

use std::num::NonZeroUsize;
use std::thread;

use arrowdb_core::{ArrowResult, SearchHit};
use arrowdb_index::AnnIndex;

/// Hard cap on batch-search worker threads.
pub const MAX_SEARCH_WORKERS: usize = 8;

/// Runs one search per query, fanning out across worker threads.
///
/// Callers must have validated query dimensions already; an index error from
/// any worker fails the whole call.
pub(crate) fn parallel_search(
    index: &AnnIndex,
    queries: &[Vec<f32>],
    k: u32,
    ef: u32,
) -> ArrowResult<Vec<Vec<SearchHit>>> {
    if queries.is_empty() {
        return Ok(Vec::new());
    }

    let hardware = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let workers = MAX_SEARCH_WORKERS.min(hardware).min(queries.len());

    if workers <= 1 {
        return queries
            .iter()
            .map(|query| index.search(query, k, ef))
            .collect();
    }

    let chunk_size = queries.len().div_ceil(workers);
    let mut outcomes: Vec<ArrowResult<Vec<SearchHit>>> =
        (0..queries.len()).map(|_| Ok(Vec::new())).collect();

    thread::scope(|scope| {
        for (query_chunk, outcome_chunk) in
            queries.chunks(chunk_size).zip(outcomes.chunks_mut(chunk_size))
        {
            scope.spawn(move || {
                for (query, outcome) in query_chunk.iter().zip(outcome_chunk.iter_mut()) {
                    *outcome = index.search(query, k, ef);
                }
            });
        }
    });

    outcomes.into_iter().collect()
}
