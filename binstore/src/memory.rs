use crate::client::{DocumentStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process document store with the same whole-document semantics as the
/// hosted one. Used for local runs without credentials and by tests.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        MemoryStore {
            documents: RwLock::new(documents.into_iter().collect()),
        }
    }

    /// Raw stored value, without the missing-document fallback.
    pub async fn get(&self, document: &str) -> Option<Value> {
        self.documents.read().await.get(document).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch_latest(&self, document: &str) -> Result<Value, StoreError> {
        Ok(self
            .get(document)
            .await
            .unwrap_or_else(|| Value::Array(Vec::new())))
    }

    async fn replace(&self, document: &str, value: &Value) -> Result<(), StoreError> {
        self.documents
            .write()
            .await
            .insert(document.to_string(), value.clone());
        Ok(())
    }
}
