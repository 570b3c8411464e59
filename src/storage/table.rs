//! Table trait definition.
//!
//! The primitive capabilities the storage core consumes from a wide-column
//! key-value service. Nothing above this trait knows which service backs it.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;

use super::schema::{Index, ATTR_PK, ATTR_SK};
use super::Result;

/// A stored item: attribute name to value.
pub type Item = HashMap<String, AttributeValue>;

/// Compound primary key locating one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimaryKey {
    pub pk: String,
    pub sk: String,
}

impl PrimaryKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// Key attributes as an item fragment.
    pub fn to_item(&self) -> Item {
        HashMap::from([
            (ATTR_PK.to_string(), AttributeValue::S(self.pk.clone())),
            (ATTR_SK.to_string(), AttributeValue::S(self.sk.clone())),
        ])
    }

    /// Extract the key attributes from a stored item.
    pub fn from_item(item: &Item) -> Option<Self> {
        let pk = item.get(ATTR_PK)?.as_s().ok()?;
        let sk = item.get(ATTR_SK)?.as_s().ok()?;
        Some(Self::new(pk.clone(), sk.clone()))
    }
}

/// Precondition attached to a put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// No item with this key exists.
    NotExists,
    /// An item with this key exists and its stamp is not newer than the given
    /// one.
    ExistsNotNewerThan(String),
}

/// Constraint on the sort attribute of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortCondition {
    BeginsWith(String),
}

/// Key-condition query against one index.
#[derive(Debug, Clone)]
pub struct Query {
    pub index: Index,
    pub partition: String,
    pub sort: Option<SortCondition>,
    /// Ascending sort order when true.
    pub forward: bool,
    /// Upper bound on returned items.
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(index: Index, partition: impl Into<String>) -> Self {
        Self {
            index,
            partition: partition.into(),
            sort: None,
            forward: true,
            limit: None,
        }
    }

    pub fn begins_with(mut self, prefix: impl Into<String>) -> Self {
        self.sort = Some(SortCondition::BeginsWith(prefix.into()));
        self
    }

    pub fn descending(mut self) -> Self {
        self.forward = false;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One entry of a batched write.
#[derive(Debug, Clone)]
pub enum WriteRequest {
    Put(Item),
    Delete(PrimaryKey),
}

/// Interface to the backing table.
///
/// Implementations:
/// - `DynamoTable`: Amazon DynamoDB (or DynamoDB Local)
/// - `MockTable`: In-memory table for testing
///
/// Batched calls receive at most the service maximum of keys or requests;
/// callers chunk with [`crate::storage::batch::chunk_round_robin`].
#[async_trait]
pub trait Table: Send + Sync {
    /// Point lookup. `None` when absent.
    async fn get_item(&self, key: &PrimaryKey) -> Result<Option<Item>>;

    /// Write an item, replacing any item with the same key.
    ///
    /// Fails with `StorageError::ConditionFailed` when `condition` does not
    /// hold; nothing is written in that case.
    async fn put_item(&self, item: Item, condition: Option<Condition>) -> Result<()>;

    /// Unconditional delete. Deleting an absent key succeeds.
    async fn delete_item(&self, key: &PrimaryKey) -> Result<()>;

    /// Query one index by partition value and optional sort condition.
    async fn query(&self, query: &Query) -> Result<Vec<Item>>;

    /// Fetch many items by key. Absent keys are omitted; order is unspecified.
    async fn batch_get(&self, keys: &[PrimaryKey]) -> Result<Vec<Item>>;

    /// Apply many puts and deletes. Not atomic across requests.
    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()>;
}
