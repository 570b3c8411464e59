//! Mock Table implementation for testing.
//!
//! Evaluates key conditions, index projections and conditional writes the way
//! DynamoDB does for the subset of features the store uses, and rejects
//! oversized or duplicate-key batches as the service would.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::schema::{ATTR_LAST_MODIFIED, MAX_BATCH_GET, MAX_BATCH_WRITE};
use crate::storage::table::{
    Condition, Item, PrimaryKey, Query, SortCondition, Table, WriteRequest,
};
use crate::storage::{Result, StorageError};

/// In-memory table.
#[derive(Default)]
pub struct MockTable {
    items: RwLock<BTreeMap<PrimaryKey, Item>>,
    fail_on_get: RwLock<bool>,
    fail_on_put: RwLock<bool>,
    fail_on_delete: RwLock<bool>,
    fail_on_query: RwLock<bool>,
    fail_on_batch_get: RwLock<bool>,
    fail_on_batch_write: RwLock<bool>,
    batch_get_calls: RwLock<usize>,
    batch_write_calls: RwLock<usize>,
}

fn string_attr<'a>(item: &'a Item, attr: &str) -> Option<&'a str> {
    item.get(attr)
        .and_then(|v| v.as_s().ok())
        .map(String::as_str)
}

fn injected(operation: &str) -> StorageError {
    StorageError::Backend(format!("injected {} failure", operation))
}

impl MockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_get(&self, fail: bool) {
        *self.fail_on_get.write().await = fail;
    }

    pub async fn set_fail_on_put(&self, fail: bool) {
        *self.fail_on_put.write().await = fail;
    }

    pub async fn set_fail_on_delete(&self, fail: bool) {
        *self.fail_on_delete.write().await = fail;
    }

    pub async fn set_fail_on_query(&self, fail: bool) {
        *self.fail_on_query.write().await = fail;
    }

    pub async fn set_fail_on_batch_get(&self, fail: bool) {
        *self.fail_on_batch_get.write().await = fail;
    }

    pub async fn set_fail_on_batch_write(&self, fail: bool) {
        *self.fail_on_batch_write.write().await = fail;
    }

    /// Number of `batch_get` calls received.
    pub async fn batch_get_calls(&self) -> usize {
        *self.batch_get_calls.read().await
    }

    /// Number of `batch_write` calls received.
    pub async fn batch_write_calls(&self) -> usize {
        *self.batch_write_calls.read().await
    }

    pub async fn stored_count(&self) -> usize {
        self.items.read().await.len()
    }

    /// Keys of every stored item, in key order.
    pub async fn stored_keys(&self) -> Vec<PrimaryKey> {
        self.items.read().await.keys().cloned().collect()
    }

    pub async fn get_stored(&self, key: &PrimaryKey) -> Option<Item> {
        self.items.read().await.get(key).cloned()
    }

    fn key_of(item: &Item) -> Result<PrimaryKey> {
        PrimaryKey::from_item(item)
            .ok_or_else(|| StorageError::Backend("item is missing its key attributes".to_string()))
    }

    fn holds(condition: &Condition, existing: Option<&Item>) -> bool {
        match condition {
            Condition::NotExists => existing.is_none(),
            Condition::ExistsNotNewerThan(stamp) => existing
                .and_then(|item| string_attr(item, ATTR_LAST_MODIFIED))
                .is_some_and(|stored| stored <= stamp.as_str()),
        }
    }

    fn matches(query: &Query, item: &Item) -> bool {
        if string_attr(item, query.index.partition_attr()) != Some(query.partition.as_str()) {
            return false;
        }
        let Some(sort) = string_attr(item, query.index.sort_attr()) else {
            return false;
        };
        match &query.sort {
            None => true,
            Some(SortCondition::BeginsWith(prefix)) => sort.starts_with(prefix.as_str()),
        }
    }
}

#[async_trait]
impl Table for MockTable {
    async fn get_item(&self, key: &PrimaryKey) -> Result<Option<Item>> {
        if *self.fail_on_get.read().await {
            return Err(injected("get_item"));
        }
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn put_item(&self, item: Item, condition: Option<Condition>) -> Result<()> {
        if *self.fail_on_put.read().await {
            return Err(injected("put_item"));
        }
        let key = Self::key_of(&item)?;
        let mut items = self.items.write().await;
        if let Some(condition) = &condition {
            if !Self::holds(condition, items.get(&key)) {
                return Err(StorageError::ConditionFailed);
            }
        }
        items.insert(key, item);
        Ok(())
    }

    async fn delete_item(&self, key: &PrimaryKey) -> Result<()> {
        if *self.fail_on_delete.read().await {
            return Err(injected("delete_item"));
        }
        self.items.write().await.remove(key);
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Item>> {
        if *self.fail_on_query.read().await {
            return Err(injected("query"));
        }
        let sort_attr = query.index.sort_attr();
        let items = self.items.read().await;
        let mut found: Vec<Item> = items
            .values()
            .filter(|item| Self::matches(query, item))
            .cloned()
            .collect();

        found.sort_by(|a, b| string_attr(a, sort_attr).cmp(&string_attr(b, sort_attr)));
        if !query.forward {
            found.reverse();
        }
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn batch_get(&self, keys: &[PrimaryKey]) -> Result<Vec<Item>> {
        *self.batch_get_calls.write().await += 1;
        if *self.fail_on_batch_get.read().await {
            return Err(injected("batch_get"));
        }
        if keys.len() > MAX_BATCH_GET {
            return Err(StorageError::Backend(format!(
                "batch_get of {} keys exceeds {}",
                keys.len(),
                MAX_BATCH_GET
            )));
        }
        let distinct: HashSet<&PrimaryKey> = keys.iter().collect();
        if distinct.len() != keys.len() {
            return Err(StorageError::Backend(
                "batch_get keys contain duplicates".to_string(),
            ));
        }

        // Key order, not request order: callers may not rely on either.
        let items = self.items.read().await;
        Ok(items
            .iter()
            .filter(|(key, _)| distinct.contains(key))
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()> {
        *self.batch_write_calls.write().await += 1;
        if *self.fail_on_batch_write.read().await {
            return Err(injected("batch_write"));
        }
        if requests.len() > MAX_BATCH_WRITE {
            return Err(StorageError::Backend(format!(
                "batch_write of {} requests exceeds {}",
                requests.len(),
                MAX_BATCH_WRITE
            )));
        }

        let mut keyed = Vec::with_capacity(requests.len());
        let mut seen = HashSet::with_capacity(requests.len());
        for request in requests {
            let key = match &request {
                WriteRequest::Put(item) => Self::key_of(item)?,
                WriteRequest::Delete(key) => key.clone(),
            };
            if !seen.insert(key.clone()) {
                return Err(StorageError::Backend(
                    "batch_write requests contain duplicate keys".to_string(),
                ));
            }
            keyed.push((key, request));
        }

        let mut items = self.items.write().await;
        for (key, request) in keyed {
            match request {
                WriteRequest::Put(item) => {
                    items.insert(key, item);
                }
                WriteRequest::Delete(_) => {
                    items.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Build a bare item holding only a key and a stamp.
#[cfg(test)]
pub(crate) fn stamped_item(key: &PrimaryKey, stamp: &str) -> Item {
    let mut item = key.to_item();
    item.insert(
        ATTR_LAST_MODIFIED.to_string(),
        aws_sdk_dynamodb::types::AttributeValue::S(stamp.to_string()),
    );
    item
}
