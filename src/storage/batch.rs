//! Chunked scatter/gather over the table's batch primitives.
//!
//! [`chunk_round_robin`] is the single partitioning scheme used for every
//! batched call (member fetches and relation writes), so chunk counts depend
//! only on input length and the batch bound.

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use tracing::{debug, warn};

use super::keys;
use super::record;
use super::table::Table;
use super::{Result, StorageError};
use crate::model::Meditation;

/// Partition `items` into `ceil(len / max)` chunks, assigning item `i` to
/// chunk `i % count`.
///
/// No chunk exceeds `max` and chunk sizes differ by at most one. The
/// assignment depends only on position, so any permutation of the same input
/// yields the same chunk count and sizes. A `max` of zero is treated as one.
pub fn chunk_round_robin<T: Clone>(items: &[T], max: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let max = max.max(1);
    let count = items.len().div_ceil(max);
    let mut chunks: Vec<Vec<T>> = (0..count)
        .map(|_| Vec::with_capacity(max.min(items.len())))
        .collect();
    for (i, item) in items.iter().enumerate() {
        chunks[i % count].push(item.clone());
    }
    chunks
}

/// Distinct ids in first-seen order.
pub fn distinct_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Join the results of a fan-out, failing if any branch failed.
///
/// Every branch has already completed when this runs; successes are not
/// rolled back. Only the first error is kept.
pub fn gather<T>(operation: &'static str, results: Vec<Result<T>>) -> Result<Vec<T>> {
    let total = results.len();
    let mut ok = Vec::with_capacity(total);
    let mut failed = 0;
    let mut first: Option<StorageError> = None;

    for result in results {
        match result {
            Ok(value) => ok.push(value),
            Err(e) => {
                failed += 1;
                if first.is_none() {
                    first = Some(e);
                }
            }
        }
    }

    match first {
        None => Ok(ok),
        Some(first) => {
            warn!(
                operation,
                failed,
                total,
                error = %first,
                "Batch operation partially failed"
            );
            Err(StorageError::PartialBatchFailure {
                operation,
                failed,
                total,
                first: first.to_string(),
            })
        }
    }
}

/// Fetch meditations by id with one concurrent batched read per chunk.
///
/// Duplicate ids are read once. The result is in no particular order and
/// omits ids with no record; use [`order_by_manifest`] to re-thread and
/// verify it. A failed chunk fails the whole call.
pub async fn fetch_meditations<T>(
    table: &T,
    ids: &[String],
    chunk_size: usize,
) -> Result<Vec<Meditation>>
where
    T: Table + ?Sized,
{
    let distinct = distinct_ids(ids);
    let chunks = chunk_round_robin(&distinct, chunk_size);
    debug!(
        requested = ids.len(),
        distinct = distinct.len(),
        chunks = chunks.len(),
        "Fetching meditations"
    );

    let reads = chunks.iter().map(|chunk| async move {
        let chunk_keys: Vec<_> = chunk.iter().map(|id| keys::meditation_key(id)).collect();
        let items = table.batch_get(&chunk_keys).await?;
        items
            .into_iter()
            .map(record::meditation_from_item)
            .collect::<Result<Vec<_>>>()
    });

    let per_chunk = gather("batch_get", join_all(reads).await)?;
    Ok(per_chunk.into_iter().flatten().collect())
}

/// Arrange fetched meditations in manifest order.
///
/// Ids repeated in the manifest repeat in the output. Fails with
/// `Integrity` if any manifest id was not fetched.
pub fn order_by_manifest(manifest: &[String], fetched: Vec<Meditation>) -> Result<Vec<Meditation>> {
    let by_id: HashMap<String, Meditation> =
        fetched.into_iter().map(|m| (m.id.clone(), m)).collect();

    let expected = distinct_ids(manifest).len();
    let actual = distinct_ids(manifest)
        .iter()
        .filter(|id| by_id.contains_key(id.as_str()))
        .count();
    if actual != expected {
        return Err(StorageError::Integrity { expected, actual });
    }

    Ok(manifest
        .iter()
        .filter_map(|id| by_id.get(id).cloned())
        .collect())
}
