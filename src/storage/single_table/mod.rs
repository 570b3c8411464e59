//! Single-table store.
//!
//! Implements [`MeditationStore`] over any [`Table`]. Meditations, sequences
//! and membership relations share one table; see [`super::schema`] for the
//! layout and [`super::keys`] for the key scheme.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::batch::{self, distinct_ids};
use super::keys::{self, validate_id};
use super::meditation_store::MeditationStore;
use super::membership::{self, MembershipSync};
use super::record::{self, format_stamp, Clock, StoredSequence, SystemClock};
use super::schema::{
    Index, MAX_BATCH_GET, MAX_BATCH_WRITE, MEDITATION_PREFIX, SEQUENCE_PREFIX, VISIBILITY_PUBLIC,
    VISIBILITY_PUBLIC_SEQUENCE,
};
use super::table::{Condition, Item, Query, Table};
use super::{Result, StorageError};
use crate::config::StorageConfig;
use crate::model::{Meditation, Sequence};

/// Batch bounds and member limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Keys per batched read, at most `MAX_BATCH_GET`.
    pub read_batch_size: usize,
    /// Requests per batched write, at most `MAX_BATCH_WRITE`.
    pub write_batch_size: usize,
    /// Distinct members a sequence may hold.
    pub max_sequence_members: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            read_batch_size: MAX_BATCH_GET,
            write_batch_size: MAX_BATCH_WRITE,
            max_sequence_members: 200,
        }
    }
}

impl StoreLimits {
    /// Limits from configuration, batch sizes clamped to the service maxima.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            read_batch_size: config.read_batch_size.clamp(1, MAX_BATCH_GET),
            write_batch_size: config.write_batch_size.clamp(1, MAX_BATCH_WRITE),
            max_sequence_members: config.max_sequence_members.max(1),
        }
    }
}

/// [`MeditationStore`] over a single table.
pub struct SingleTableStore<T: Table> {
    table: T,
    clock: Arc<dyn Clock>,
    limits: StoreLimits,
}

impl<T: Table> SingleTableStore<T> {
    /// Store with the wall clock and default limits.
    pub fn new(table: T) -> Self {
        Self::with_clock(table, Arc::new(SystemClock), StoreLimits::default())
    }

    pub fn with_clock(table: T, clock: Arc<dyn Clock>, limits: StoreLimits) -> Self {
        Self {
            table,
            clock,
            limits,
        }
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    fn stamp(&self) -> String {
        format_stamp(self.clock.now())
    }

    fn membership(&self) -> MembershipSync<'_, T> {
        MembershipSync::new(
            &self.table,
            self.limits.write_batch_size,
            self.limits.max_sequence_members,
        )
    }

    fn validate_sequence(&self, sequence: &Sequence) -> Result<Vec<String>> {
        validate_id("sequence", &sequence.id)?;
        let manifest = sequence.meditation_ids();
        for id in &manifest {
            validate_id("meditation", id)?;
        }
        let distinct = distinct_ids(&manifest).len();
        if distinct > self.limits.max_sequence_members {
            return Err(StorageError::InvalidInput(format!(
                "sequence {} has {} members, limit is {}",
                sequence.id, distinct, self.limits.max_sequence_members
            )));
        }
        Ok(manifest)
    }

    async fn query_meditations(&self, query: Query) -> Result<Vec<Meditation>> {
        self.table
            .query(&query)
            .await?
            .into_iter()
            .map(record::meditation_from_item)
            .collect()
    }

    async fn query_sequences(&self, query: Query) -> Result<Vec<Sequence>> {
        self.table
            .query(&query)
            .await?
            .into_iter()
            .map(|item| record::sequence_from_item(item).map(|stored| stored.sequence))
            .collect()
    }

    /// Consistent read of the committed sequence record.
    async fn stored_sequence(&self, id: &str) -> Result<StoredSequence> {
        let item = self
            .table
            .get_item(&keys::sequence_key(id))
            .await?
            .ok_or_else(|| StorageError::not_found("sequence", id))?;
        record::sequence_from_item(item)
    }

    /// Conditional replace of an item known to exist.
    async fn replace(&self, kind: &'static str, id: &str, item: Item, stamp: String) -> Result<()> {
        match self
            .table
            .put_item(item, Some(Condition::ExistsNotNewerThan(stamp)))
            .await
        {
            Err(StorageError::ConditionFailed) => Err(StorageError::Conflict(format!(
                "{} {} was changed by a newer write",
                kind, id
            ))),
            other => other,
        }
    }
}

#[async_trait]
impl<T: Table> MeditationStore for SingleTableStore<T> {
    #[tracing::instrument(name = "store.save_meditation", skip_all, fields(id = %meditation.id))]
    async fn save_meditation(&self, meditation: &Meditation) -> Result<()> {
        validate_id("meditation", &meditation.id)?;
        let item = record::meditation_to_item(meditation, &self.stamp())?;
        self.table.put_item(item, None).await
    }

    async fn get_meditation(&self, id: &str) -> Result<Meditation> {
        validate_id("meditation", id)?;
        match self.table.get_item(&keys::meditation_key(id)).await? {
            Some(item) => record::meditation_from_item(item),
            None => Err(StorageError::not_found("meditation", id)),
        }
    }

    async fn get_meditations_by_ids(&self, ids: &[String]) -> Result<Vec<Meditation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        for id in ids {
            validate_id("meditation", id)?;
        }
        let fetched =
            batch::fetch_meditations(&self.table, ids, self.limits.read_batch_size).await?;
        batch::order_by_manifest(ids, fetched)
    }

    async fn list_meditations(&self, user_id: &str) -> Result<Vec<Meditation>> {
        let query = Query::new(Index::Owner, user_id)
            .begins_with(MEDITATION_PREFIX)
            .descending();
        self.query_meditations(query).await
    }

    async fn list_public_meditations(&self) -> Result<Vec<Meditation>> {
        let query = Query::new(Index::Visibility, VISIBILITY_PUBLIC).begins_with(MEDITATION_PREFIX);
        self.query_meditations(query).await
    }

    #[tracing::instrument(name = "store.update_meditation", skip_all, fields(id = %meditation.id))]
    async fn update_meditation(&self, meditation: &Meditation) -> Result<()> {
        validate_id("meditation", &meditation.id)?;
        if self
            .table
            .get_item(&keys::meditation_key(&meditation.id))
            .await?
            .is_none()
        {
            return Err(StorageError::not_found("meditation", &meditation.id));
        }

        let stamp = self.stamp();
        let item = record::meditation_to_item(meditation, &stamp)?;
        self.replace("meditation", &meditation.id, item, stamp).await
    }

    #[tracing::instrument(name = "store.delete_meditation", skip_all, fields(%id))]
    async fn delete_meditation(&self, id: &str) -> Result<()> {
        validate_id("meditation", id)?;
        let key = keys::meditation_key(id);
        if self.table.get_item(&key).await?.is_none() {
            return Err(StorageError::not_found("meditation", id));
        }

        let referencing = membership::sequences_containing(&self.table, id, 1).await?;
        if let Some(sequence_id) = referencing.first() {
            return Err(StorageError::Conflict(format!(
                "meditation {} is part of sequence {}",
                id, sequence_id
            )));
        }

        self.table.delete_item(&key).await?;
        debug!(id = %id, "Deleted meditation");
        Ok(())
    }

    #[tracing::instrument(name = "store.save_sequence", skip_all, fields(id = %sequence.id))]
    async fn save_sequence(&self, sequence: &Sequence) -> Result<()> {
        let manifest = self.validate_sequence(sequence)?;
        let stamp = self.stamp();
        let item = record::sequence_to_item(sequence, &stamp)?;

        match self.table.put_item(item, Some(Condition::NotExists)).await {
            Err(StorageError::ConditionFailed) => {
                return Err(StorageError::Conflict(format!(
                    "sequence {} already exists",
                    sequence.id
                )))
            }
            other => other?,
        }

        self.membership()
            .reconcile(&sequence.id, &[], &manifest, &stamp)
            .await?;
        Ok(())
    }

    #[tracing::instrument(name = "store.update_sequence", skip_all, fields(id = %sequence.id))]
    async fn update_sequence(&self, sequence: &Sequence) -> Result<()> {
        let manifest = self.validate_sequence(sequence)?;
        let previous = self.stored_sequence(&sequence.id).await?;

        let stamp = self.stamp();
        let item = record::sequence_to_item(sequence, &stamp)?;
        self.replace("sequence", &sequence.id, item, stamp.clone())
            .await?;

        self.membership()
            .reconcile(&sequence.id, &previous.manifest, &manifest, &stamp)
            .await?;
        Ok(())
    }

    #[tracing::instrument(name = "store.delete_sequence", skip_all, fields(%id))]
    async fn delete_sequence_by_id(&self, id: &str) -> Result<()> {
        validate_id("sequence", id)?;
        let previous = match self.stored_sequence(id).await {
            Ok(stored) => stored.manifest,
            Err(StorageError::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        self.membership().clear(id, &previous, &self.stamp()).await?;
        self.table.delete_item(&keys::sequence_key(id)).await
    }

    async fn get_sequence_by_id(&self, id: &str) -> Result<Sequence> {
        validate_id("sequence", id)?;
        let stored = self.stored_sequence(id).await?;
        let fetched =
            batch::fetch_meditations(&self.table, &stored.manifest, self.limits.read_batch_size)
                .await?;
        let mut sequence = stored.sequence;
        sequence.meditations = batch::order_by_manifest(&stored.manifest, fetched)?;
        Ok(sequence)
    }

    async fn list_sequences_by_user_id(&self, user_id: &str) -> Result<Vec<Sequence>> {
        let query = Query::new(Index::Owner, user_id)
            .begins_with(SEQUENCE_PREFIX)
            .descending();
        self.query_sequences(query).await
    }

    async fn list_public_sequences(&self) -> Result<Vec<Sequence>> {
        let query =
            Query::new(Index::Visibility, VISIBILITY_PUBLIC_SEQUENCE).begins_with(SEQUENCE_PREFIX);
        self.query_sequences(query).await
    }
}
