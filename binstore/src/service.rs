use crate::client::{DocumentStore, StoreError};
use crate::entry::{Entry, EntryKind, RECORD_ID_PREFIX, TEMPLATE_ID_PREFIX, new_id, now_iso};
use crate::errors::WriteError;
use crate::merge::{IdlessPolicy, dedup_by_id, merge_append, merge_delete};
use crate::normalize::normalize;
use crate::shard::{LeastOccupancy, ShardSelector};
use crate::template::{Template, TemplateKeys};
use crate::write::{Outcome, RetryPolicy, write_with_retry};
use serde::Serialize;
use std::sync::Arc;

const CREATED_AT_FIELD: &str = "createdAt";
const SAMPLE_IDS: usize = 3;

/// Where a saved template ended up.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SavedTemplate {
    pub id: String,
    pub document: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStats {
    pub count: usize,
    pub approx_bytes: usize,
    pub sample_ids: Vec<String>,
}

/// Record and template operations on top of the retrying write loop.
///
/// Record operations address one document. Template operations take the list
/// of candidate documents and leave placement to the configured
/// [`ShardSelector`].
#[derive(Clone)]
pub struct DocumentService {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
    selector: Arc<dyn ShardSelector>,
}

impl DocumentService {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        DocumentService {
            store,
            retry,
            selector: Arc::new(LeastOccupancy),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn ShardSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Stamps `entry` with an id and timestamp when missing and merges it into
    /// `document`. Returns the id in use.
    pub async fn append_record(
        &self,
        document: &str,
        mut entry: Entry,
    ) -> Result<String, WriteError> {
        let id = entry.ensure_id(RECORD_ID_PREFIX);
        entry.ensure_timestamp();

        write_with_retry(self.store.as_ref(), document, &self.retry, |entries| {
            let entries = dedup_by_id(entries, IdlessPolicy::Keep);
            Outcome::Replace(merge_append(entries, entry.clone()), id.clone())
        })
        .await
    }

    /// Removes every entry with `id`. Deleting an absent id is not an error
    /// and leaves the document untouched.
    pub async fn delete_record(&self, document: &str, id: &str) -> Result<usize, WriteError> {
        if id.trim().is_empty() {
            return Err(WriteError::Validation("missing id".into()));
        }

        write_with_retry(self.store.as_ref(), document, &self.retry, |entries| {
            match merge_delete(entries, id) {
                (_, 0) => Outcome::Unchanged(0),
                (kept, removed) => Outcome::Replace(kept, removed),
            }
        })
        .await
    }

    /// Records only; templates sharing the document are skipped.
    pub async fn list_records(&self, document: &str) -> Result<Vec<Entry>, StoreError> {
        let value = self.store.fetch_latest(document).await?;
        Ok(normalize(&value)
            .into_iter()
            .filter(|entry| entry.kind() == EntryKind::Record)
            .collect())
    }

    /// Rewrites `document` as a flat list with one entry per id, dropping
    /// entries that have no id. Returns the final entry count.
    pub async fn repair(&self, document: &str) -> Result<usize, WriteError> {
        let count = write_with_retry(self.store.as_ref(), document, &self.retry, |entries| {
            let entries = dedup_by_id(entries, IdlessPolicy::Drop);
            let count = entries.len();
            Outcome::Replace(entries, count)
        })
        .await?;

        tracing::info!(document, count, "Repaired document");
        Ok(count)
    }

    pub async fn save_template(
        &self,
        candidates: &[String],
        mut template: Template,
        owner: Option<&str>,
    ) -> Result<SavedTemplate, WriteError> {
        if template.keys.is_empty() {
            return Err(WriteError::Validation(
                "a template needs at least one key field".into(),
            ));
        }
        if candidates.is_empty() {
            return Err(WriteError::Validation(
                "no template documents configured".into(),
            ));
        }

        let given_id = template
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let existing = match &given_id {
            Some(id) => self.locate(candidates, id).await,
            None => None,
        };
        let document = match existing {
            Some(document) => document,
            None => self
                .selector
                .select(self.store.clone(), candidates)
                .await
                .ok_or_else(|| WriteError::Validation("no template documents configured".into()))?,
        };

        let id = given_id.unwrap_or_else(|| new_id(TEMPLATE_ID_PREFIX));
        let now = now_iso();
        template.id = Some(id.clone());
        if template.owner.is_none() {
            template.owner = owner.map(str::to_string);
        }
        if template.created_at.is_none() {
            template.created_at = Some(now.clone());
        }
        template.updated_at = Some(now);
        let entry = template.to_entry();

        tracing::debug!(id = %id, document = %document, "Saving template");

        write_with_retry(self.store.as_ref(), &document, &self.retry, |entries| {
            let entries = dedup_by_id(entries, IdlessPolicy::Keep);
            let mut entry = entry.clone();
            // a re-save keeps the original creation time
            if let Some(created) = entries
                .iter()
                .find(|existing| existing.id() == Some(id.as_str()))
                .and_then(|existing| existing.get(CREATED_AT_FIELD))
            {
                entry.insert(CREATED_AT_FIELD, created.clone());
            }
            Outcome::Replace(merge_append(entries, entry), ())
        })
        .await?;

        Ok(SavedTemplate { id, document })
    }

    /// Removes the template from every candidate document. A candidate that
    /// cannot be written is skipped; the last error is returned only when no
    /// candidate could be written at all.
    pub async fn delete_template(
        &self,
        candidates: &[String],
        id: &str,
    ) -> Result<usize, WriteError> {
        if id.trim().is_empty() {
            return Err(WriteError::Validation("missing id".into()));
        }

        let mut removed = 0;
        let mut written = false;
        let mut last_error = None;
        for document in candidates {
            match self.delete_record(document, id).await {
                Ok(n) => {
                    removed += n;
                    written = true;
                }
                Err(e) => {
                    tracing::warn!(
                        document = %document,
                        error = %e,
                        "Skipping template document that could not be written"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !written => Err(e),
            _ => Ok(removed),
        }
    }

    /// Templates across all candidates matching `filter`. A candidate that
    /// cannot be read is skipped so the others still answer.
    pub async fn list_templates(
        &self,
        candidates: &[String],
        filter: &TemplateKeys,
    ) -> Vec<Entry> {
        let mut found = Vec::new();
        for document in candidates {
            let value = match self.store.fetch_latest(document).await {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        document = %document,
                        error = %e,
                        "Skipping unreadable template document"
                    );
                    continue;
                }
            };
            found.extend(normalize(&value).into_iter().filter(|entry| {
                entry.kind() == EntryKind::Template
                    && Template::from_entry(entry).is_some_and(|t| t.keys.matches(filter))
            }));
        }
        found
    }

    pub async fn document_stats(&self, document: &str) -> Result<DocumentStats, StoreError> {
        let value = self.store.fetch_latest(document).await?;
        let approx_bytes = serde_json::to_string(&value).map_or(0, |s| s.len());
        let entries = normalize(&value);
        let sample_ids = entries
            .iter()
            .rev()
            .take(SAMPLE_IDS)
            .rev()
            .filter_map(|entry| entry.id().map(str::to_string))
            .collect();

        Ok(DocumentStats {
            count: entries.len(),
            approx_bytes,
            sample_ids,
        })
    }

    /// First candidate holding an entry with `id`. Unreadable candidates are
    /// passed over.
    async fn locate(&self, candidates: &[String], id: &str) -> Option<String> {
        for document in candidates {
            match self.store.fetch_latest(document).await {
                Ok(value) if normalize(&value).iter().any(|e| e.id() == Some(id)) => {
                    return Some(document.clone());
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(document = %document, error = %e, "Lookup skipped document")
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::template::TemplateRow;
    use crate::testutils::{FlakyStore, unavailable};
    use serde_json::{Value, json};
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        }
    }

    fn service(store: Arc<dyn DocumentStore>) -> DocumentService {
        DocumentService::new(store, policy())
    }

    fn entry(value: Value) -> Entry {
        Entry::from_value(value).unwrap()
    }

    fn template(supplier: &str) -> Template {
        Template {
            keys: TemplateKeys {
                supplier: Some(supplier.into()),
                ..Default::default()
            },
            rows: vec![TemplateRow {
                code: "A1".into(),
                item: "Length".into(),
                nominal: Some(10.0),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_record_lifecycle() {
        let svc = service(Arc::new(MemoryStore::new()));

        let id = svc
            .append_record("records", entry(json!({"supplier": "Acme"})))
            .await
            .unwrap();
        assert!(id.starts_with("QCI-"));

        let records = svc.list_records("records").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), Some(id.as_str()));
        assert_eq!(records[0].get_str("supplier"), Some("Acme"));
        assert!(records[0].get_str("timestamp").is_some());

        assert_eq!(svc.delete_record("records", &id).await.unwrap(), 1);
        assert!(svc.list_records("records").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_same_id_is_idempotent() {
        let svc = service(Arc::new(MemoryStore::new()));

        svc.append_record("d", entry(json!({"id": "r1", "timestamp": "t", "lotNo": "1"})))
            .await
            .unwrap();
        svc.append_record("d", entry(json!({"id": "r1", "timestamp": "t", "lotNo": "2"})))
            .await
            .unwrap();

        let records = svc.list_records("d").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_str("lotNo"), Some("2"));
    }

    #[tokio::test]
    async fn test_delete_absent_id_writes_nothing() {
        let inner = MemoryStore::with_documents([(
            "d".to_string(),
            json!({"record": [{"id": "r1", "timestamp": "t"}]}),
        )]);
        let store = Arc::new(FlakyStore::new(inner));
        let svc = service(store.clone());

        assert_eq!(svc.delete_record("d", "nope").await.unwrap(), 0);
        assert_eq!(store.replace_calls(), 0);
        assert_eq!(
            store.document("d").await,
            Some(json!({"record": [{"id": "r1", "timestamp": "t"}]}))
        );
    }

    #[tokio::test]
    async fn test_delete_removes_every_duplicate() {
        let store = Arc::new(MemoryStore::with_documents([(
            "d".to_string(),
            json!([
                {"id": "r1", "timestamp": "t"},
                {"id": "r2", "timestamp": "t"},
                {"id": "r1", "timestamp": "t2"},
            ]),
        )]));
        let svc = service(store.clone());

        assert_eq!(svc.delete_record("d", "r1").await.unwrap(), 2);
        assert_eq!(
            store.get("d").await,
            Some(json!([{"id": "r2", "timestamp": "t"}]))
        );
    }

    #[tokio::test]
    async fn test_delete_requires_id() {
        let svc = service(Arc::new(MemoryStore::new()));
        let err = svc.delete_record("d", "  ").await.unwrap_err();
        assert!(matches!(err, WriteError::Validation(_)));
    }

    #[tokio::test]
    async fn test_repair() {
        let store = Arc::new(MemoryStore::with_documents([(
            "d".to_string(),
            json!({"records": [
                {"id": "a", "timestamp": "1"},
                [{"id": "b", "timestamp": "2"}, {"id": "a", "timestamp": "3"}],
                {"timestamp": "4", "id": ""},
                "junk",
            ]}),
        )]));
        let svc = service(store.clone());

        assert_eq!(svc.repair("d").await.unwrap(), 2);
        assert_eq!(
            store.get("d").await,
            Some(json!([
                {"id": "a", "timestamp": "1"},
                {"id": "b", "timestamp": "2"},
            ]))
        );
    }

    #[tokio::test]
    async fn test_list_records_skips_templates() {
        let store = Arc::new(MemoryStore::with_documents([(
            "d".to_string(),
            json!([
                {"id": "r1", "timestamp": "t"},
                {"id": "TPL-1", "type": "template", "supplier": "Acme"},
            ]),
        )]));
        let records = service(store).list_records("d").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), Some("r1"));
    }

    #[tokio::test]
    async fn test_list_records_surfaces_store_error() {
        let store = FlakyStore::new(MemoryStore::new()).break_document("d");
        let err = service(Arc::new(store)).list_records("d").await.unwrap_err();
        assert_eq!(err, unavailable());
    }

    #[tokio::test]
    async fn test_save_template_goes_to_least_occupied() {
        let store = Arc::new(MemoryStore::with_documents([
            ("t0".to_string(), json!([{"id": "x", "timestamp": "t"}])),
            ("t1".to_string(), json!([])),
        ]));
        let svc = service(store.clone());
        let candidates = vec!["t0".to_string(), "t1".to_string()];

        let saved = svc
            .save_template(&candidates, template("Acme"), Some("alice"))
            .await
            .unwrap();

        assert_eq!(saved.document, "t1");
        assert!(saved.id.starts_with("TPL-"));
        let stored = store.get("t1").await.unwrap();
        assert_eq!(stored[0]["type"], json!("template"));
        assert_eq!(stored[0]["owner"], json!("alice"));
        assert_eq!(stored[0]["createdAt"], stored[0]["updatedAt"]);
    }

    #[tokio::test]
    async fn test_resave_template_stays_in_its_shard() {
        let store = Arc::new(MemoryStore::with_documents([
            (
                "t0".to_string(),
                json!([
                    {
                        "id": "TPL-1",
                        "type": "template",
                        "supplier": "Acme",
                        "createdAt": "2024-01-01T00:00:00.000Z",
                    },
                    {"id": "x", "timestamp": "t"},
                ]),
            ),
            ("t1".to_string(), json!([])),
        ]));
        let svc = service(store.clone());
        let candidates = vec!["t0".to_string(), "t1".to_string()];

        let mut updated = template("Acme Corp");
        updated.id = Some("TPL-1".into());
        let saved = svc.save_template(&candidates, updated, None).await.unwrap();

        assert_eq!(
            saved,
            SavedTemplate {
                id: "TPL-1".into(),
                document: "t0".into()
            }
        );
        let stored = store.get("t0").await.unwrap();
        assert_eq!(stored.as_array().unwrap().len(), 2);
        assert_eq!(stored[0]["supplier"], json!("Acme Corp"));
        assert_eq!(stored[0]["createdAt"], json!("2024-01-01T00:00:00.000Z"));
        assert_eq!(store.get("t1").await, Some(json!([])));
    }

    #[tokio::test]
    async fn test_save_template_validation() {
        let store = Arc::new(FlakyStore::new(MemoryStore::new()));
        let svc = service(store.clone());
        let candidates = vec!["t0".to_string()];

        let err = svc
            .save_template(&candidates, Template::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::Validation(_)));

        let err = svc
            .save_template(&[], template("Acme"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::Validation(_)));

        // rejected before touching the store, so nothing is retried
        assert_eq!(store.fetch_calls(), 0);
        assert_eq!(store.replace_calls(), 0);
    }

    #[tokio::test]
    async fn test_templates_across_shards() {
        let store = Arc::new(MemoryStore::with_documents([
            (
                "t0".to_string(),
                json!([
                    {"id": "TPL-1", "type": "template", "supplier": "Acme", "partNo": "P-1"},
                    {"id": "r1", "timestamp": "t", "supplier": "Acme"},
                ]),
            ),
            (
                "t1".to_string(),
                json!([
                    {"id": "TPL-2", "type": "template", "supplier": "Other"},
                    {"id": "TPL-1", "type": "template", "supplier": "Acme"},
                ]),
            ),
        ]));
        let svc = service(store.clone());
        let candidates = vec!["t0".to_string(), "t1".to_string()];

        let acme = TemplateKeys {
            supplier: Some(" acme".into()),
            ..Default::default()
        };
        let found = svc.list_templates(&candidates, &acme).await;
        let ids: Vec<_> = found.iter().filter_map(Entry::id).collect();
        assert_eq!(ids, ["TPL-1", "TPL-1"]);

        let all = svc.list_templates(&candidates, &TemplateKeys::default()).await;
        assert_eq!(all.len(), 3);

        assert_eq!(svc.delete_template(&candidates, "TPL-1").await.unwrap(), 2);
        let all = svc.list_templates(&candidates, &TemplateKeys::default()).await;
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_template_shard_is_skipped() {
        let inner = MemoryStore::with_documents([(
            "t1".to_string(),
            json!([{"id": "TPL-2", "type": "template", "supplier": "Other"}]),
        )]);
        let store = FlakyStore::new(inner).break_document("t0");
        let svc = service(Arc::new(store));
        let candidates = vec!["t0".to_string(), "t1".to_string()];

        let found = svc.list_templates(&candidates, &TemplateKeys::default()).await;
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_template_past_unreadable_shard() {
        let inner = MemoryStore::with_documents([(
            "t1".to_string(),
            json!([{"id": "TPL-2", "type": "template", "supplier": "Other"}]),
        )]);
        let store = Arc::new(FlakyStore::new(inner).break_document("t0"));
        let svc = service(store.clone());
        let candidates = vec!["t0".to_string(), "t1".to_string()];

        assert_eq!(svc.delete_template(&candidates, "TPL-2").await.unwrap(), 1);
        assert_eq!(store.document("t1").await, Some(json!([])));
        assert!(
            svc.list_templates(&candidates, &TemplateKeys::default())
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_delete_template_fails_when_no_shard_is_writable() {
        let store = FlakyStore::new(MemoryStore::new())
            .break_document("t0")
            .break_document("t1");
        let svc = service(Arc::new(store));
        let candidates = vec!["t0".to_string(), "t1".to_string()];

        let err = svc.delete_template(&candidates, "TPL-2").await.unwrap_err();
        assert!(matches!(
            err,
            WriteError::ExhaustedRetries { ref document, attempts: 3, .. } if document == "t1"
        ));
    }

    #[tokio::test]
    async fn test_document_stats() {
        let doc = json!([
            {"id": "a", "timestamp": "t"},
            {"id": "b", "timestamp": "t"},
            {"id": "c", "timestamp": "t"},
            {"id": "d", "timestamp": "t"},
        ]);
        let expected_bytes = serde_json::to_string(&doc).unwrap().len();
        let store = Arc::new(MemoryStore::with_documents([("d".to_string(), doc)]));

        let stats = service(store).document_stats("d").await.unwrap();
        assert_eq!(
            stats,
            DocumentStats {
                count: 4,
                approx_bytes: expected_bytes,
                sample_ids: vec!["b".into(), "c".into(), "d".into()],
            }
        );
        assert_eq!(
            serde_json::to_value(&stats).unwrap()["approxBytes"],
            json!(expected_bytes)
        );
    }
}
