//! Record mapper.
//!
//! Converts domain entities to and from stored items. Every write carries a
//! `last_modified` stamp read from the injected [`Clock`]; conditional updates
//! compare against it. Sequences persist only their ordered member ids (the
//! membership manifest); full meditations are rehydrated on read.

use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::keys::{self, KeySet};
use super::table::Item;
use super::Result;
use crate::model::{Meditation, Sequence};

/// Record discriminator values.
pub const KIND_MEDITATION: &str = "meditation";
pub const KIND_SEQUENCE: &str = "sequence";
pub const KIND_RELATION: &str = "relation";

/// Source of write stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used to drive stamp ordering in tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Render a stamp. Fixed precision keeps string order equal to time order.
pub fn format_stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MeditationRecord {
    pk: String,
    sk: String,
    ppk: String,
    pppk: String,
    kind: String,
    last_modified: String,
    meditation: Meditation,
}

/// Sequence fields without members.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SequenceHeader {
    id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    image_url: String,
    name: String,
    description: String,
    public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SequenceRecord {
    pk: String,
    sk: String,
    ppk: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pppk: Option<String>,
    kind: String,
    last_modified: String,
    sequence: SequenceHeader,
    meditation_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RelationRecord {
    pk: String,
    sk: String,
    kind: String,
    last_modified: String,
}

/// A sequence as read back from the table, before member rehydration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSequence {
    /// The sequence with an empty member list.
    pub sequence: Sequence,
    /// Ordered member ids.
    pub manifest: Vec<String>,
    pub last_modified: String,
}

fn split(keys: KeySet) -> (String, String, Option<String>, Option<String>) {
    (keys.key.pk, keys.key.sk, keys.owner, keys.visibility)
}

/// Build the stored item for a meditation.
pub fn meditation_to_item(meditation: &Meditation, stamp: &str) -> Result<Item> {
    let (pk, sk, owner, visibility) = split(keys::meditation_keys(
        &meditation.id,
        &meditation.user_id,
        meditation.public,
    ));
    let record = MeditationRecord {
        pk,
        sk,
        ppk: owner.unwrap_or_default(),
        pppk: visibility.unwrap_or_default(),
        kind: KIND_MEDITATION.to_string(),
        last_modified: stamp.to_string(),
        meditation: meditation.clone(),
    };
    Ok(serde_dynamo::to_item(record)?)
}

/// Decode a stored meditation item.
pub fn meditation_from_item(item: Item) -> Result<Meditation> {
    let record: MeditationRecord = serde_dynamo::from_item(item)?;
    Ok(record.meditation)
}

/// Build the stored item for a sequence, projecting members to their ids.
pub fn sequence_to_item(sequence: &Sequence, stamp: &str) -> Result<Item> {
    let (pk, sk, owner, visibility) = split(keys::sequence_keys(
        &sequence.id,
        &sequence.user_id,
        sequence.public,
    ));
    let record = SequenceRecord {
        pk,
        sk,
        ppk: owner.unwrap_or_default(),
        pppk: visibility,
        kind: KIND_SEQUENCE.to_string(),
        last_modified: stamp.to_string(),
        sequence: SequenceHeader {
            id: sequence.id.clone(),
            user_id: sequence.user_id.clone(),
            created_at: sequence.created_at,
            updated_at: sequence.updated_at,
            image_url: sequence.image_url.clone(),
            name: sequence.name.clone(),
            description: sequence.description.clone(),
            public: sequence.public,
        },
        meditation_ids: sequence.meditation_ids(),
    };
    Ok(serde_dynamo::to_item(record)?)
}

/// Decode a stored sequence item.
pub fn sequence_from_item(item: Item) -> Result<StoredSequence> {
    let record: SequenceRecord = serde_dynamo::from_item(item)?;
    let header = record.sequence;
    Ok(StoredSequence {
        sequence: Sequence {
            id: header.id,
            user_id: header.user_id,
            created_at: header.created_at,
            updated_at: header.updated_at,
            image_url: header.image_url,
            name: header.name,
            description: header.description,
            public: header.public,
            meditations: Vec::new(),
        },
        manifest: record.meditation_ids,
        last_modified: record.last_modified,
    })
}

/// Build the stored item for a membership relation.
pub fn relation_to_item(meditation_id: &str, sequence_id: &str, stamp: &str) -> Result<Item> {
    let (pk, sk, _, _) = split(keys::relation_keys(meditation_id, sequence_id));
    let record = RelationRecord {
        pk,
        sk,
        kind: KIND_RELATION.to_string(),
        last_modified: stamp.to_string(),
    };
    Ok(serde_dynamo::to_item(record)?)
}
