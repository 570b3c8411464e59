//! tempora-table: Table provisioning
//!
//! Creates the single DynamoDB table with its three secondary indexes and
//! waits for it to become active. Safe to re-run; an existing table is left
//! untouched.
//!
//! ## Configuration
//! - TEMPORA_CONFIG: Path to a YAML config file (optional)
//! - TEMPORA__STORAGE__TABLE_NAME: Table name (default: tempora)
//! - TEMPORA__STORAGE__ENDPOINT_URL: DynamoDB Local endpoint (optional)
//! - TEMPORA_LOG: Log filter (default: info)
//!
//! Usage: `tempora-table [config.yaml]`

use tracing::info;

use tempora::config::Config;
use tempora::storage::DynamoTable;
use tempora::utils::bootstrap::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref())?;

    let table = DynamoTable::from_config(&config.storage).await?;
    if table.create_table().await? {
        info!(table = %table.table_name(), "tempora-table: table ready");
    } else {
        info!(table = %table.table_name(), "tempora-table: nothing to do");
    }

    Ok(())
}
