//! Table provisioning.

use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType,
    Projection, ProjectionType, ScalarAttributeType, TableStatus,
};
use backon::BackoffBuilder;
use tracing::{debug, info};

use super::{backend_error, build_error, DynamoTable};
use crate::storage::schema::{Index, ATTR_OWNER, ATTR_PK, ATTR_SK, ATTR_VISIBILITY};
use crate::storage::{Result, StorageError};
use crate::utils::retry::provisioning_backoff;

fn string_attribute(name: &str) -> Result<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(build_error)
}

fn key_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(build_error)
}

fn secondary_index(index: Index) -> Result<Option<GlobalSecondaryIndex>> {
    let Some(name) = index.name() else {
        return Ok(None);
    };
    GlobalSecondaryIndex::builder()
        .index_name(name)
        .key_schema(key_element(index.partition_attr(), KeyType::Hash)?)
        .key_schema(key_element(index.sort_attr(), KeyType::Range)?)
        .projection(
            Projection::builder()
                .projection_type(ProjectionType::All)
                .build(),
        )
        .build()
        .map(Some)
        .map_err(build_error)
}

impl DynamoTable {
    /// Create the table and its secondary indexes, then wait until active.
    ///
    /// Returns `false` if the table already existed; it is left untouched.
    pub async fn create_table(&self) -> Result<bool> {
        let mut request = self
            .client
            .create_table()
            .table_name(&self.table_name)
            .billing_mode(BillingMode::PayPerRequest)
            .key_schema(key_element(ATTR_PK, KeyType::Hash)?)
            .key_schema(key_element(ATTR_SK, KeyType::Range)?);

        for attr in [ATTR_PK, ATTR_SK, ATTR_OWNER, ATTR_VISIBILITY] {
            request = request.attribute_definitions(string_attribute(attr)?);
        }
        for index in Index::ALL {
            if let Some(gsi) = secondary_index(index)? {
                request = request.global_secondary_indexes(gsi);
            }
        }

        match request.send().await {
            Ok(_) => {
                info!(table = %self.table_name, "Created DynamoDB table");
            }
            Err(e)
                if matches!(
                    e.as_service_error(),
                    Some(CreateTableError::ResourceInUseException(_))
                ) =>
            {
                info!(table = %self.table_name, "DynamoDB table already exists");
                return Ok(false);
            }
            Err(e) => return Err(backend_error("create_table", e)),
        }

        self.wait_until_active().await?;
        Ok(true)
    }

    /// Drop the table. Used to clean up after integration tests.
    pub async fn delete_table(&self) -> Result<()> {
        self.client
            .delete_table()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(|e| backend_error("delete_table", e))?;
        info!(table = %self.table_name, "Deleted DynamoDB table");
        Ok(())
    }

    async fn wait_until_active(&self) -> Result<()> {
        let mut delays = provisioning_backoff().build();
        loop {
            let output = self
                .client
                .describe_table()
                .table_name(&self.table_name)
                .send()
                .await
                .map_err(|e| backend_error("describe_table", e))?;

            let status = output.table.and_then(|t| t.table_status);
            if status == Some(TableStatus::Active) {
                return Ok(());
            }

            let Some(delay) = delays.next() else {
                return Err(StorageError::Backend(format!(
                    "table {} not active after waiting, status {:?}",
                    self.table_name, status
                )));
            };
            debug!(table = %self.table_name, ?status, "Waiting for table");
            tokio::time::sleep(delay).await;
        }
    }
}
