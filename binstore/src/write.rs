//! The read-modify-write loop behind every mutation.
//!
//! The store only offers whole-document GET and PUT, so each attempt fetches
//! the latest document, applies the mutation to its normalized entry list and
//! writes the full list back. Failed attempts back off and start over from a
//! fresh fetch. There is no version check between fetch and replace: two
//! writers racing inside one attempt window can still lose an update.

use crate::client::{DocumentStore, StoreError};
use crate::entry::Entry;
use crate::errors::WriteError;
use crate::metrics_defs::{WRITE_ATTEMPTS, WRITE_DURATION, WRITE_EXHAUSTED};
use crate::normalize::normalize;
use serde_json::Value;
use shared::{counter, histogram};
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Result of applying a mutation to the fetched entries.
pub enum Outcome<T> {
    /// Write `entries` back and return `T` once the write lands.
    Replace(Vec<Entry>, T),
    /// Nothing changed; return `T` without writing.
    Unchanged(T),
}

/// Applies `mutation` to `document` with up to `policy.max_attempts` attempts.
///
/// `mutation` runs once per attempt against freshly fetched entries, so it
/// must not assume it sees the state of a previous attempt.
pub async fn write_with_retry<T, F>(
    store: &dyn DocumentStore,
    document: &str,
    policy: &RetryPolicy,
    mut mutation: F,
) -> Result<T, WriteError>
where
    F: FnMut(Vec<Entry>) -> Outcome<T> + Send,
    T: Send,
{
    let max_attempts = policy.max_attempts.max(1);
    let started = Instant::now();
    let mut attempt = 1;

    loop {
        counter!(WRITE_ATTEMPTS, "document" => document.to_string()).increment(1);

        match attempt_once(store, document, &mut mutation).await {
            Ok(outcome) => {
                histogram!(WRITE_DURATION).record(started.elapsed().as_secs_f64());
                return Ok(outcome);
            }
            Err(last) if attempt >= max_attempts => {
                tracing::error!(document, attempts = attempt, error = %last, "Giving up on write");
                counter!(WRITE_EXHAUSTED, "document" => document.to_string()).increment(1);
                histogram!(WRITE_DURATION).record(started.elapsed().as_secs_f64());
                return Err(WriteError::ExhaustedRetries {
                    document: document.to_string(),
                    attempts: attempt,
                    last,
                });
            }
            Err(e) => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    document,
                    attempt,
                    max_attempts,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Write attempt failed"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

async fn attempt_once<T, F>(
    store: &dyn DocumentStore,
    document: &str,
    mutation: &mut F,
) -> Result<T, StoreError>
where
    F: FnMut(Vec<Entry>) -> Outcome<T> + Send,
    T: Send,
{
    let current = store.fetch_latest(document).await?;
    let entries = normalize(&current);

    match mutation(entries) {
        Outcome::Unchanged(outcome) => Ok(outcome),
        Outcome::Replace(entries, outcome) => {
            let value = Value::Array(entries.into_iter().map(Value::from).collect());
            store.replace(document, &value).await?;
            Ok(outcome)
        }
    }
}
