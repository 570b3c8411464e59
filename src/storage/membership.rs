//! Sequence membership synchronizer.
//!
//! Relation items (`med#{mid}` / `seq#{sid}`) mirror each sequence's member
//! list so "which sequences contain X" is a single key query. They are owned
//! here: created, replaced and removed only as a side effect of sequence
//! writes.
//!
//! Reconciliation is delete-all then recreate-all, driven by the declared
//! target list. It is not atomic: a failure between phases leaves the sequence
//! with a partial relation set. Re-running with the same target converges,
//! so a failed sync is repaired by rewriting the sequence with
//! `update_sequence`.
//!
//! The reverse index lags writes, so the relations to delete are the union of
//! what it returns and the keys derived from the previously stored manifest.

use futures::future::join_all;
use tracing::{debug, info};

use super::batch::{chunk_round_robin, distinct_ids, gather};
use super::keys::{self, relation_meditation_id};
use super::record;
use super::schema::{Index, MEDITATION_PREFIX, SEQUENCE_PREFIX};
use super::table::{PrimaryKey, Query, Table, WriteRequest};
use super::Result;

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub removed: usize,
    pub written: usize,
}

/// Keeps relation items in step with a sequence's member list.
pub struct MembershipSync<'a, T: Table + ?Sized> {
    table: &'a T,
    write_batch_size: usize,
    page_size: usize,
}

impl<'a, T: Table + ?Sized> MembershipSync<'a, T> {
    /// `page_size` bounds the single reverse-index read; callers keep member
    /// counts within it.
    pub fn new(table: &'a T, write_batch_size: usize, page_size: usize) -> Self {
        Self {
            table,
            write_batch_size,
            page_size,
        }
    }

    /// Relation keys currently stored for a sequence.
    pub async fn current(&self, sequence_id: &str) -> Result<Vec<PrimaryKey>> {
        let query = Query::new(Index::ReverseMembership, keys::sequence_pk(sequence_id))
            .begins_with(MEDITATION_PREFIX)
            .limit(self.page_size);
        let items = self.table.query(&query).await?;
        Ok(items
            .iter()
            .filter_map(PrimaryKey::from_item)
            .filter(|key| relation_meditation_id(key).is_some())
            .collect())
    }

    /// Relation keys to remove: the indexed ones plus those implied by
    /// `previous`, each once.
    async fn stale(&self, sequence_id: &str, previous: &[String]) -> Result<Vec<PrimaryKey>> {
        let mut keys = self.current(sequence_id).await?;
        for meditation_id in distinct_ids(previous) {
            let key = keys::relation_key(&meditation_id, sequence_id);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// Make the stored relations of `sequence_id` equal to `target`.
    ///
    /// `previous` is the member list last committed for the sequence, read
    /// with a consistent get. Duplicate ids in `target` produce one relation.
    pub async fn reconcile(
        &self,
        sequence_id: &str,
        previous: &[String],
        target: &[String],
        stamp: &str,
    ) -> Result<SyncReport> {
        let existing = self.stale(sequence_id, previous).await?;

        let deletes = existing.iter().map(|key| self.table.delete_item(key));
        gather("delete_relations", join_all(deletes).await)?;

        let members = distinct_ids(target);
        let batches = chunk_round_robin(&members, self.write_batch_size);
        let writes = batches.iter().map(|batch| async move {
            let requests = batch
                .iter()
                .map(|meditation_id| {
                    record::relation_to_item(meditation_id, sequence_id, stamp)
                        .map(WriteRequest::Put)
                })
                .collect::<Result<Vec<_>>>()?;
            self.table.batch_write(requests).await
        });
        gather("write_relations", join_all(writes).await)?;

        let report = SyncReport {
            removed: existing.len(),
            written: members.len(),
        };
        debug!(
            sequence = %sequence_id,
            removed = report.removed,
            written = report.written,
            batches = batches.len(),
            "Reconciled sequence membership"
        );
        Ok(report)
    }

    /// Remove every relation of a sequence.
    pub async fn clear(
        &self,
        sequence_id: &str,
        previous: &[String],
        stamp: &str,
    ) -> Result<SyncReport> {
        let report = self.reconcile(sequence_id, previous, &[], stamp).await?;
        info!(sequence = %sequence_id, removed = report.removed, "Cleared sequence membership");
        Ok(report)
    }
}

/// Ids of up to `limit` sequences that reference a meditation.
pub async fn sequences_containing<T: Table + ?Sized>(
    table: &T,
    meditation_id: &str,
    limit: usize,
) -> Result<Vec<String>> {
    let query = Query::new(Index::Primary, keys::meditation_pk(meditation_id))
        .begins_with(SEQUENCE_PREFIX)
        .limit(limit);
    let items = table.query(&query).await?;
    Ok(items
        .iter()
        .filter_map(PrimaryKey::from_item)
        .filter_map(|key| key.sk.strip_prefix(SEQUENCE_PREFIX).map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mock::MockTable;
    use crate::storage::schema::MAX_BATCH_WRITE;
    use crate::storage::StorageError;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn numbered(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("m{}", i)).collect()
    }

    #[tokio::test]
    async fn test_reconcile_creates_relations() {
        let table = MockTable::new();
        let sync = MembershipSync::new(&table, MAX_BATCH_WRITE, 200);

        let report = sync.reconcile("s1", &[], &ids(&["a", "b"]), "t1").await.unwrap();
        assert_eq!(report, SyncReport { removed: 0, written: 2 });

        let current = sync.current("s1").await.unwrap();
        assert_eq!(current.len(), 2);
        assert!(current.contains(&keys::relation_key("a", "s1")));
        assert!(current.contains(&keys::relation_key("b", "s1")));
    }

    #[tokio::test]
    async fn test_reconcile_replaces_previous_members() {
        let table = MockTable::new();
        let sync = MembershipSync::new(&table, MAX_BATCH_WRITE, 200);

        sync.reconcile("s1", &[], &ids(&["a", "b", "c"]), "t1").await.unwrap();
        let report = sync.reconcile("s1", &[], &ids(&["c"]), "t2").await.unwrap();
        assert_eq!(report, SyncReport { removed: 3, written: 1 });

        assert_eq!(sync.current("s1").await.unwrap(), vec![keys::relation_key("c", "s1")]);
        assert_eq!(table.stored_count().await, 1);
    }

    #[tokio::test]
    async fn test_reconcile_removes_previous_manifest_keys() {
        let table = MockTable::new();
        let sync = MembershipSync::new(&table, MAX_BATCH_WRITE, 200);
        sync.reconcile("s1", &[], &ids(&["a", "b"]), "t1").await.unwrap();

        let report = sync
            .reconcile("s1", &ids(&["a", "b", "z"]), &ids(&["c"]), "t2")
            .await
            .unwrap();
        // a and b come from the index as well; each key is deleted once.
        assert_eq!(report, SyncReport { removed: 3, written: 1 });
        assert_eq!(sync.current("s1").await.unwrap(), vec![keys::relation_key("c", "s1")]);
    }

    #[tokio::test]
    async fn test_reconcile_twice_is_idempotent() {
        let table = MockTable::new();
        let sync = MembershipSync::new(&table, MAX_BATCH_WRITE, 200);
        let target = numbered(40);

        sync.reconcile("s1", &[], &target, "t1").await.unwrap();
        let once = table.stored_keys().await;
        sync.reconcile("s1", &[], &target, "t1").await.unwrap();
        let twice = table.stored_keys().await;

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 40);
    }

    #[tokio::test]
    async fn test_reconcile_batches_writes() {
        let table = MockTable::new();
        let sync = MembershipSync::new(&table, MAX_BATCH_WRITE, 200);

        sync.reconcile("s1", &[], &numbered(60), "t1").await.unwrap();
        assert_eq!(table.batch_write_calls().await, 3);
        assert_eq!(table.stored_count().await, 60);
    }

    #[tokio::test]
    async fn test_reconcile_dedupes_members() {
        let table = MockTable::new();
        let sync = MembershipSync::new(&table, MAX_BATCH_WRITE, 200);

        let report = sync.reconcile("s1", &[], &ids(&["a", "b", "a"]), "t1")
            .await
            .unwrap();
        assert_eq!(report.written, 2);
        assert_eq!(table.stored_count().await, 2);
    }

    #[tokio::test]
    async fn test_reconcile_leaves_other_sequences_alone() {
        let table = MockTable::new();
        let sync = MembershipSync::new(&table, MAX_BATCH_WRITE, 200);

        sync.reconcile("s1", &[], &ids(&["a"]), "t1").await.unwrap();
        sync.reconcile("s2", &[], &ids(&["a", "b"]), "t1").await.unwrap();
        sync.clear("s1", &[], "t2").await.unwrap();

        assert!(sync.current("s1").await.unwrap().is_empty());
        assert_eq!(sync.current("s2").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_failure_fails_sync() {
        let table = MockTable::new();
        let sync = MembershipSync::new(&table, MAX_BATCH_WRITE, 200);
        sync.reconcile("s1", &[], &ids(&["a", "b"]), "t1").await.unwrap();

        table.set_fail_on_delete(true).await;
        let result = sync.reconcile("s1", &[], &ids(&["c"]), "t2").await;
        assert!(matches!(
            result,
            Err(StorageError::PartialBatchFailure {
                operation: "delete_relations",
                failed: 2,
                total: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_resync_after_write_failure_converges() {
        let table = MockTable::new();
        let sync = MembershipSync::new(&table, MAX_BATCH_WRITE, 200);
        sync.reconcile("s1", &[], &ids(&["a", "b"]), "t1").await.unwrap();

        table.set_fail_on_batch_write(true).await;
        let failed = sync.reconcile("s1", &[], &ids(&["c", "d"]), "t2").await;
        assert!(matches!(
            failed,
            Err(StorageError::PartialBatchFailure {
                operation: "write_relations",
                ..
            })
        ));
        // Deletes already applied; nothing was rolled back.
        assert!(sync.current("s1").await.unwrap().is_empty());

        table.set_fail_on_batch_write(false).await;
        sync.reconcile("s1", &[], &ids(&["c", "d"]), "t3").await.unwrap();
        assert_eq!(sync.current("s1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sequences_containing() {
        let table = MockTable::new();
        let sync = MembershipSync::new(&table, MAX_BATCH_WRITE, 200);
        sync.reconcile("s1", &[], &ids(&["a"]), "t1").await.unwrap();
        sync.reconcile("s2", &[], &ids(&["a", "b"]), "t1").await.unwrap();

        let mut containing = sequences_containing(&table, "a", 10).await.unwrap();
        containing.sort();
        assert_eq!(containing, vec!["s1", "s2"]);
        assert_eq!(sequences_containing(&table, "a", 1).await.unwrap().len(), 1);
        assert!(sequences_containing(&table, "z", 10).await.unwrap().is_empty());
    }
}
