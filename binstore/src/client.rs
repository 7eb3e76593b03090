use crate::metrics_defs::{STORE_FETCH_FAILURES, STORE_MALFORMED_BODIES, STORE_REPLACE_FAILURES};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use shared::counter;
use std::time::Duration;
use url::Url;

const MASTER_KEY_HEADER: &str = "X-Master-Key";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Transport(String),
    #[error("store did not answer within {0:?}")]
    Timeout(Duration),
    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Whole-document access to the backing store.
///
/// Both calls hit the store exactly once and keep no state between calls.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Current value of `document`. A document that does not exist yet is an
    /// empty list, not an error.
    async fn fetch_latest(&self, document: &str) -> Result<Value, StoreError>;

    /// Overwrites `document` with `value`.
    async fn replace(&self, document: &str, value: &Value) -> Result<(), StoreError>;
}

/// Client for the hosted JSON bin API.
///
/// `GET {base}/{document}/latest` reads, `PUT {base}/{document}` writes, and
/// both authenticate with the master key header.
pub struct JsonBinStore {
    client: reqwest::Client,
    base_url: Url,
    master_key: String,
    timeout: Duration,
}

impl JsonBinStore {
    pub fn new(base_url: Url, master_key: String, timeout: Duration) -> Result<Self, StoreError> {
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Transport(format!(
                "store url cannot take a document path: {base_url}"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(JsonBinStore {
            client,
            base_url,
            master_key,
            timeout,
        })
    }

    fn document_url(&self, document: &str, latest: bool) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(document);
            if latest {
                segments.push("latest");
            }
        }
        url
    }

    fn request_error(&self, error: reqwest::Error) -> StoreError {
        if error.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::Transport(error.to_string())
        }
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<String, StoreError> {
        response.text().await.map_err(|e| self.request_error(e))
    }

    async fn fetch(&self, document: &str) -> Result<Value, StoreError> {
        let response = self
            .client
            .get(self.document_url(document, true))
            .header(MASTER_KEY_HEADER, &self.master_key)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(document, "Document not found, treating as empty");
            return Ok(Value::Array(Vec::new()));
        }

        let body = self.read_body(response).await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(document, error = %e, "Malformed document body, treating as empty");
                counter!(STORE_MALFORMED_BODIES).increment(1);
                Ok(Value::Array(Vec::new()))
            }
        }
    }

    async fn put(&self, document: &str, value: &Value) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.document_url(document, false))
            .header(MASTER_KEY_HEADER, &self.master_key)
            .json(value)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        Err(StoreError::Status {
            status: status.as_u16(),
            body: self.read_body(response).await?,
        })
    }
}

#[async_trait]
impl DocumentStore for JsonBinStore {
    async fn fetch_latest(&self, document: &str) -> Result<Value, StoreError> {
        let result = self.fetch(document).await;
        if result.is_err() {
            counter!(STORE_FETCH_FAILURES).increment(1);
        }
        result
    }

    async fn replace(&self, document: &str, value: &Value) -> Result<(), StoreError> {
        let result = self.put(document, value).await;
        if result.is_err() {
            counter!(STORE_REPLACE_FAILURES).increment(1);
        }
        result
    }
}
