//! Storage configuration types.

use serde::Deserialize;

use crate::storage::schema::{MAX_BATCH_GET, MAX_BATCH_WRITE};

/// DynamoDB storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Name of the single table.
    pub table_name: String,
    /// Fallback region when the AWS default chain names none.
    pub region: String,
    /// Endpoint override, e.g. `http://localhost:8000` for DynamoDB Local.
    pub endpoint_url: Option<String>,
    /// Keys per BatchGetItem call. Clamped to 100.
    pub read_batch_size: usize,
    /// Requests per BatchWriteItem call. Clamped to 25.
    pub write_batch_size: usize,
    /// Distinct meditations a sequence may reference.
    pub max_sequence_members: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            table_name: "tempora".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            read_batch_size: MAX_BATCH_GET,
            write_batch_size: MAX_BATCH_WRITE,
            max_sequence_members: 200,
        }
    }
}
