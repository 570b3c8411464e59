//! DynamoDB Table implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::types::{
    AttributeValue, DeleteRequest, KeysAndAttributes, PutRequest,
    WriteRequest as DynamoWriteRequest,
};
use backon::BackoffBuilder;
use tracing::{debug, warn};

use super::{backend_error, build_error, expression, DynamoTable};
use crate::storage::table::{Condition, Item, PrimaryKey, Query, Table, WriteRequest};
use crate::storage::{Result, StorageError};
use crate::utils::retry::batch_backoff;

type Key = HashMap<String, AttributeValue>;

impl DynamoTable {
    fn to_dynamo_request(request: WriteRequest) -> Result<DynamoWriteRequest> {
        let builder = DynamoWriteRequest::builder();
        let builder = match request {
            WriteRequest::Put(item) => builder.put_request(
                PutRequest::builder()
                    .set_item(Some(item))
                    .build()
                    .map_err(build_error)?,
            ),
            WriteRequest::Delete(key) => builder.delete_request(
                DeleteRequest::builder()
                    .set_key(Some(key.to_item()))
                    .build()
                    .map_err(build_error)?,
            ),
        };
        Ok(builder.build())
    }

    /// One BatchGetItem call. Returns found items and keys left unprocessed.
    async fn batch_get_once(&self, keys: Vec<Key>) -> Result<(Vec<Item>, Vec<Key>)> {
        let request = KeysAndAttributes::builder()
            .set_keys(Some(keys))
            .consistent_read(true)
            .build()
            .map_err(build_error)?;

        let output = self
            .client
            .batch_get_item()
            .request_items(&self.table_name, request)
            .send()
            .await
            .map_err(|e| backend_error("batch_get_item", e))?;

        let found = output
            .responses
            .and_then(|mut responses| responses.remove(&self.table_name))
            .unwrap_or_default();
        let unprocessed = output
            .unprocessed_keys
            .and_then(|mut unprocessed| unprocessed.remove(&self.table_name))
            .map(|pending| pending.keys)
            .unwrap_or_default();
        Ok((found, unprocessed))
    }

    /// One BatchWriteItem call. Returns requests left unprocessed.
    async fn batch_write_once(
        &self,
        requests: Vec<DynamoWriteRequest>,
    ) -> Result<Vec<DynamoWriteRequest>> {
        let output = self
            .client
            .batch_write_item()
            .request_items(&self.table_name, requests)
            .send()
            .await
            .map_err(|e| backend_error("batch_write_item", e))?;

        Ok(output
            .unprocessed_items
            .and_then(|mut unprocessed| unprocessed.remove(&self.table_name))
            .unwrap_or_default())
    }
}

fn is_conditional_check_failed(
    err: &aws_sdk_dynamodb::error::SdkError<PutItemError>,
) -> bool {
    use aws_sdk_dynamodb::error::SdkError;

    match err {
        SdkError::ServiceError(service_err) => {
            matches!(
                service_err.err(),
                PutItemError::ConditionalCheckFailedException(_)
            )
        }
        _ => false,
    }
}

#[async_trait]
impl Table for DynamoTable {
    async fn get_item(&self, key: &PrimaryKey) -> Result<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key.to_item()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| backend_error("get_item", e))?;

        Ok(output.item)
    }

    async fn put_item(&self, item: Item, condition: Option<Condition>) -> Result<()> {
        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item));

        if let Some(condition) = &condition {
            let expr = expression::condition(condition);
            request = request
                .condition_expression(&expr.text)
                .set_expression_attribute_names(Some(expr.names.clone()))
                .set_expression_attribute_values(expr.values());
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(e) if is_conditional_check_failed(&e) => Err(StorageError::ConditionFailed),
            Err(e) => Err(backend_error("put_item", e)),
        }
    }

    async fn delete_item(&self, key: &PrimaryKey) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(key.to_item()))
            .send()
            .await
            .map_err(|e| backend_error("delete_item", e))?;
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Item>> {
        let expr = expression::key_condition(query);
        let mut items = Vec::new();
        let mut last_evaluated_key = None;

        loop {
            let mut request = self
                .client
                .query()
                .table_name(&self.table_name)
                .set_index_name(query.index.name().map(str::to_string))
                .key_condition_expression(&expr.text)
                .set_expression_attribute_names(Some(expr.names.clone()))
                .set_expression_attribute_values(expr.values())
                .consistent_read(query.index.supports_consistent_read())
                .scan_index_forward(query.forward);

            if let Some(limit) = query.limit {
                let remaining = limit.saturating_sub(items.len());
                request = request.limit(i32::try_from(remaining).unwrap_or(i32::MAX));
            }
            if let Some(key) = last_evaluated_key.take() {
                request = request.set_exclusive_start_key(Some(key));
            }

            let output = request
                .send()
                .await
                .map_err(|e| backend_error("query", e))?;

            items.extend(output.items.unwrap_or_default());

            if query.limit.is_some_and(|limit| items.len() >= limit) {
                break;
            }
            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => last_evaluated_key = Some(key),
                _ => break,
            }
        }

        if let Some(limit) = query.limit {
            items.truncate(limit);
        }
        debug!(
            index = query.index.name().unwrap_or("table"),
            partition = %query.partition,
            count = items.len(),
            "Queried DynamoDB"
        );
        Ok(items)
    }

    async fn batch_get(&self, keys: &[PrimaryKey]) -> Result<Vec<Item>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pending: Vec<Key> = keys.iter().map(PrimaryKey::to_item).collect();
        let mut found = Vec::with_capacity(keys.len());
        let mut delays = batch_backoff().build();

        loop {
            let (items, unprocessed) = self.batch_get_once(pending).await?;
            found.extend(items);
            if unprocessed.is_empty() {
                return Ok(found);
            }

            let Some(delay) = delays.next() else {
                return Err(StorageError::Backend(format!(
                    "DynamoDB batch_get_item left {} keys unprocessed after retries",
                    unprocessed.len()
                )));
            };
            warn!(
                unprocessed = unprocessed.len(),
                delay_ms = delay.as_millis() as u64,
                "Retrying unprocessed batch_get_item keys"
            );
            tokio::time::sleep(delay).await;
            pending = unprocessed;
        }
    }

    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }

        let mut pending = requests
            .into_iter()
            .map(Self::to_dynamo_request)
            .collect::<Result<Vec<_>>>()?;
        let mut delays = batch_backoff().build();

        loop {
            let unprocessed = self.batch_write_once(pending).await?;
            if unprocessed.is_empty() {
                return Ok(());
            }

            let Some(delay) = delays.next() else {
                return Err(StorageError::Backend(format!(
                    "DynamoDB batch_write_item left {} requests unprocessed after retries",
                    unprocessed.len()
                )));
            };
            warn!(
                unprocessed = unprocessed.len(),
                delay_ms = delay.as_millis() as u64,
                "Retrying unprocessed batch_write_item requests"
            );
            tokio::time::sleep(delay).await;
            pending = unprocessed;
        }
    }
}
