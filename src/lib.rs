//! Tempora - meditation storage core
//!
//! Persistence for meditations and sequences (ordered playlists of
//! meditations) in a single DynamoDB table, with ownership and visibility
//! indexes, membership relations and optimistic concurrency.

pub mod config;
pub mod model;
pub mod storage;
pub mod utils;
