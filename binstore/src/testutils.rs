//! Failure injection around [`MemoryStore`] for exercising the retry and
//! shard logic without a network.

use crate::client::{DocumentStore, StoreError};
use crate::memory::MemoryStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// The error returned by injected failures unless another one is given.
pub fn unavailable() -> StoreError {
    StoreError::Status {
        status: 503,
        body: "service unavailable".into(),
    }
}

struct Failures {
    // u32::MAX means fail forever
    remaining: AtomicU32,
    error: StoreError,
}

impl Failures {
    fn none() -> Self {
        Failures {
            remaining: AtomicU32::new(0),
            error: unavailable(),
        }
    }

    fn next(&self) -> Option<StoreError> {
        let fail = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        fail.then(|| self.error.clone())
    }
}

pub struct FlakyStore {
    inner: MemoryStore,
    fetch_failures: Failures,
    replace_failures: Failures,
    broken_documents: HashSet<String>,
    interleaved: Mutex<Option<(String, Value)>>,
    fetch_calls: AtomicU32,
    replace_calls: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        FlakyStore {
            inner,
            fetch_failures: Failures::none(),
            replace_failures: Failures::none(),
            broken_documents: HashSet::new(),
            interleaved: Mutex::new(None),
            fetch_calls: AtomicU32::new(0),
            replace_calls: AtomicU32::new(0),
        }
    }

    /// Fails the next `count` fetches (any document) with `error`.
    pub fn fail_fetches(mut self, count: u32, error: StoreError) -> Self {
        self.fetch_failures = Failures {
            remaining: AtomicU32::new(count),
            error,
        };
        self
    }

    /// Fails the next `count` replaces (any document) with `error`.
    pub fn fail_replaces(mut self, count: u32, error: StoreError) -> Self {
        self.replace_failures = Failures {
            remaining: AtomicU32::new(count),
            error,
        };
        self
    }

    /// Every fetch of `document` fails.
    pub fn break_document(mut self, document: &str) -> Self {
        self.broken_documents.insert(document.to_string());
        self
    }

    /// Simulates a concurrent writer: after the first failed replace, the
    /// store holds `value` at `document`.
    pub fn interleave_write(self, document: &str, value: Value) -> Self {
        *self.interleaved.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((document.to_string(), value));
        self
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn replace_calls(&self) -> u32 {
        self.replace_calls.load(Ordering::SeqCst)
    }

    pub async fn document(&self, document: &str) -> Option<Value> {
        self.inner.get(document).await
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn fetch_latest(&self, document: &str) -> Result<Value, StoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken_documents.contains(document) {
            return Err(unavailable());
        }
        if let Some(error) = self.fetch_failures.next() {
            return Err(error);
        }
        self.inner.fetch_latest(document).await
    }

    async fn replace(&self, document: &str, value: &Value) -> Result<(), StoreError> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.replace_failures.next() {
            let concurrent = self
                .interleaved
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some((other, other_value)) = concurrent {
                self.inner.replace(&other, &other_value).await?;
            }
            return Err(error);
        }
        self.inner.replace(document, value).await
    }
}
