//! Storage implementations.
//!
//! Meditations, sequences and their membership relations live in one
//! DynamoDB table. The layers, bottom up:
//!
//! - [`table::Table`]: the primitive key/value, query and batch capabilities
//! - [`keys`], [`record`]: key codec and item mapping
//! - [`batch`], [`membership`]: chunked fan-out and relation maintenance
//! - [`SingleTableStore`]: the [`MeditationStore`] contract over any `Table`

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;

pub mod batch;
pub mod dynamo;
pub mod keys;
mod meditation_store;
pub mod membership;
pub mod mock;
pub mod record;
pub mod schema;
mod single_table;
pub mod table;

pub use dynamo::DynamoTable;
pub use meditation_store::MeditationStore;
pub use mock::MockTable;
pub use record::{Clock, ManualClock, SystemClock};
pub use single_table::{SingleTableStore, StoreLimits};
pub use table::Table;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{operation}: {failed} of {total} batches failed, first error: {first}")]
    PartialBatchFailure {
        operation: &'static str,
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("Integrity error: expected {expected} records, found {actual}")]
    Integrity { expected: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conditional write rejected")]
    ConditionFailed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_dynamo::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Initialize storage based on configuration.
///
/// Connects to DynamoDB (or the configured local endpoint) and wraps the
/// table in a [`SingleTableStore`] with limits from `config`. The table must
/// already exist; see [`DynamoTable::create_table`].
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn MeditationStore>> {
    info!(
        table = %config.table_name,
        region = %config.region,
        endpoint = config.endpoint_url.as_deref().unwrap_or("default"),
        "Storage: dynamodb"
    );

    let table = DynamoTable::from_config(config).await?;
    let store = SingleTableStore::with_clock(
        table,
        Arc::new(SystemClock),
        StoreLimits::from_config(config),
    );
    Ok(Arc::new(store))
}
