//! Retry utilities: backoff builders.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Backoff for resubmitting unprocessed batch items (throttling).
///
/// - Min delay: 50ms
/// - Max delay: 2s
/// - Max attempts: 8
/// - Jitter enabled
pub fn batch_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(8)
        .with_jitter()
}

/// Backoff for polling a table until it becomes active.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
pub fn provisioning_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
}
