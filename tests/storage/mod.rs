//! Shared storage integration tests.
//!
//! Tests the MeditationStore interface against every Table implementation.
//! Each runner builds a store and invokes `run_store_tests!`.

pub mod store_tests;
