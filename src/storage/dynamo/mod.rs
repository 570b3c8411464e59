//! DynamoDB table implementation.
//!
//! Schema:
//! - PK: `pk` (String, HASH), `sk` (String, RANGE)
//! - GSIs: see [`crate::storage::schema::Index`]

mod expression;
mod provision;
mod table;

use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::Client;
use tracing::info;

use crate::config::StorageConfig;
use crate::storage::{Result, StorageError};

/// DynamoDB implementation of Table.
#[derive(Clone)]
pub struct DynamoTable {
    client: Client,
    table_name: String,
}

impl DynamoTable {
    /// Connect using the default AWS credential and region chain.
    ///
    /// `endpoint_url` points the client at DynamoDB Local.
    pub async fn new(table_name: impl Into<String>, endpoint_url: Option<&str>) -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(Self::connect(&config, table_name.into(), endpoint_url))
    }

    /// Connect with settings from configuration.
    ///
    /// `region` applies only when the default chain (`AWS_REGION`, profile)
    /// does not name one.
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let region = aws_config::meta::region::RegionProviderChain::default_provider()
            .or_else(Region::new(config.region.clone()));
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        Ok(Self::connect(
            &sdk_config,
            config.table_name.clone(),
            config.endpoint_url.as_deref(),
        ))
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    fn connect(
        config: &aws_config::SdkConfig,
        table_name: String,
        endpoint_url: Option<&str>,
    ) -> Self {
        let client = if let Some(endpoint) = endpoint_url {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(config)
        };

        info!(table = %table_name, endpoint = endpoint_url.unwrap_or("aws"), "Connected to DynamoDB");
        Self { client, table_name }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Map an SDK failure to `Backend`, keeping the service error code.
fn backend_error<E, R>(operation: &str, err: SdkError<E, R>) -> StorageError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    StorageError::Backend(format!(
        "DynamoDB {} failed: {}",
        operation,
        DisplayErrorContext(&err)
    ))
}

fn build_error(err: aws_sdk_dynamodb::error::BuildError) -> StorageError {
    StorageError::Backend(format!("DynamoDB request build failed: {}", err))
}
