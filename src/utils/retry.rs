//! Retry utilities: backoff builders for cache transaction commits.
//!
//! Uses `backon`. Lock contention on commit is retried at a constant
//! interval rather than exponentially, matching the transaction's
//! `retry_interval` setting.

use backon::ConstantBuilder;

use crate::cache::TransactionOptions;

/// Backoff for acquiring key locks when committing a cache transaction.
///
/// - Delay: `retry_interval`, no jitter
/// - Max retries: `retry_attempts` (after the first attempt)
///
/// The transaction timeout bounds the whole sequence separately.
pub fn contention_backoff(options: &TransactionOptions) -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(options.retry_interval)
        .with_max_times(options.retry_attempts)
}
