//! MeditationStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::{Meditation, Sequence};

/// Interface for meditation and sequence persistence.
///
/// This is the whole contract request handlers see: entities in, entities
/// out. Physical keys, indexes and relation items stay behind it.
///
/// Implementations:
/// - `SingleTableStore<DynamoTable>`: DynamoDB single-table layout
/// - `SingleTableStore<MockTable>`: In-memory table for testing
///
/// # Errors
///
/// - `NotFound`: no record for the requested id
/// - `Conflict`: delete blocked by a sequence, stale update, or create of an
///   existing sequence
/// - `PartialBatchFailure`: some part of a fan-out failed; applied parts
///   are not rolled back
/// - `Integrity`: a sequence references meditations that could not be read
#[async_trait]
pub trait MeditationStore: Send + Sync {
    /// Unconditional upsert.
    async fn save_meditation(&self, meditation: &Meditation) -> Result<()>;

    /// Point lookup by id.
    async fn get_meditation(&self, id: &str) -> Result<Meditation>;

    /// Meditations for ids, in the order requested.
    ///
    /// Fails with `Integrity` if any id has no record.
    async fn get_meditations_by_ids(&self, ids: &[String]) -> Result<Vec<Meditation>>;

    /// A user's meditations, ordered by id descending.
    ///
    /// This is recency order only when ids sort by creation time.
    async fn list_meditations(&self, user_id: &str) -> Result<Vec<Meditation>>;

    /// Every public meditation.
    async fn list_public_meditations(&self) -> Result<Vec<Meditation>>;

    /// Replace an existing meditation unless a newer write has landed.
    async fn update_meditation(&self, meditation: &Meditation) -> Result<()>;

    /// Delete a meditation no sequence references.
    async fn delete_meditation(&self, id: &str) -> Result<()>;

    /// Create a sequence and its membership relations.
    ///
    /// The record is written before the relations. If relation sync fails,
    /// a retried save returns `Conflict`; repair by passing the same sequence
    /// to `update_sequence`.
    async fn save_sequence(&self, sequence: &Sequence) -> Result<()>;

    /// Replace an existing sequence and resynchronize its relations.
    async fn update_sequence(&self, sequence: &Sequence) -> Result<()>;

    /// Remove a sequence and all its relations.
    async fn delete_sequence_by_id(&self, id: &str) -> Result<()>;

    /// A sequence with its members rehydrated in stored order.
    async fn get_sequence_by_id(&self, id: &str) -> Result<Sequence>;

    /// A user's sequences, ordered by id descending, members not rehydrated.
    ///
    /// This is recency order only when ids sort by creation time.
    async fn list_sequences_by_user_id(&self, user_id: &str) -> Result<Vec<Sequence>>;

    /// Every public sequence, members not rehydrated.
    async fn list_public_sequences(&self) -> Result<Vec<Sequence>>;
}
