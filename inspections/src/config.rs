use crate::auth::Role;
use binstore::config::{RetryConfig, StoreConfig};
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Records document id cannot be empty")]
    EmptyRecordsDocument,

    #[error("Empty template document id")]
    EmptyTemplateDocument,

    #[error("Duplicate template document: {0}")]
    DuplicateTemplateDocument(String),

    #[error("retry.max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("Account with empty user name")]
    EmptyAccountUser,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for the API
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    pub admin_listener: Listener,
    pub store: StoreConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.documents.validate()?;

        if self.retry.max_attempts == 0 {
            return Err(ValidationError::ZeroAttempts);
        }

        if self.auth.accounts.iter().any(|a| a.user.trim().is_empty()) {
            return Err(ValidationError::EmptyAccountUser);
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Store document ids. Records live in one document; templates may be spread
/// over several, and share the records document when none are listed.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DocumentsConfig {
    pub records: String,
    #[serde(default)]
    pub templates: Vec<String>,
}

impl DocumentsConfig {
    pub fn template_documents(&self) -> Vec<String> {
        if self.templates.is_empty() {
            vec![self.records.clone()]
        } else {
            self.templates.clone()
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.records.trim().is_empty() {
            return Err(ValidationError::EmptyRecordsDocument);
        }

        let mut seen = HashSet::new();
        for document in &self.templates {
            if document.trim().is_empty() {
                return Err(ValidationError::EmptyTemplateDocument);
            }
            if !seen.insert(document) {
                return Err(ValidationError::DuplicateTemplateDocument(document.clone()));
            }
        }
        Ok(())
    }
}

/// Credentials accepted by the API. Everything is optional; with nothing
/// configured every request is rejected.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct AuthConfig {
    #[serde(default)]
    pub accounts: Vec<Account>,
    /// Shared code that grants input access on its own.
    pub passcode: Option<String>,
    #[serde(default)]
    pub input_users: Vec<String>,
    #[serde(default)]
    pub viewer_users: Vec<String>,
    pub input_password: Option<String>,
    pub viewer_password: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Account {
    pub user: String,
    pub password: String,
    pub role: Role,
}
