//! Placement of new entries across several documents.
//!
//! The store caps the size of a single document, so templates can be spread
//! over a configured list of documents. Placement is a heuristic load balance
//! only: it reads occupancy once and does not reserve anything.

use crate::client::DocumentStore;
use crate::metrics_defs::SHARD_ENTRIES;
use crate::normalize::normalize;
use async_trait::async_trait;
use indexmap::IndexMap;
use shared::gauge;
use std::sync::Arc;
use tokio::task::JoinSet;

#[async_trait]
pub trait ShardSelector: Send + Sync {
    /// Picks the document that should receive the next entry. Returns `None`
    /// only when `candidates` is empty.
    async fn select(
        &self,
        store: Arc<dyn DocumentStore>,
        candidates: &[String],
    ) -> Option<String>;
}

/// Chooses the candidate currently holding the fewest entries.
///
/// Candidates that fail to report are skipped and ties go to the earlier
/// candidate. When nobody reports, the first candidate is used anyway.
pub struct LeastOccupancy;

#[async_trait]
impl ShardSelector for LeastOccupancy {
    async fn select(
        &self,
        store: Arc<dyn DocumentStore>,
        candidates: &[String],
    ) -> Option<String> {
        let first = candidates.first()?.clone();
        let counts = occupancy(store, candidates).await;

        let chosen = counts
            .iter()
            .filter_map(|(document, count)| count.map(|n| (document, n)))
            // min_by_key keeps the first of equal minima
            .min_by_key(|(_, n)| *n)
            .map(|(document, _)| document.clone());

        match chosen {
            Some(document) => Some(document),
            None => {
                tracing::warn!(
                    fallback = %first,
                    "No shard reported its occupancy, falling back to the first"
                );
                Some(first)
            }
        }
    }
}

/// Entry count per candidate, in candidate order. `None` marks a candidate
/// whose fetch failed.
pub async fn occupancy(
    store: Arc<dyn DocumentStore>,
    candidates: &[String],
) -> IndexMap<String, Option<usize>> {
    let mut counts: IndexMap<String, Option<usize>> =
        candidates.iter().map(|c| (c.clone(), None)).collect();

    let mut join_set = JoinSet::new();
    for document in counts.keys().cloned() {
        let store = store.clone();
        join_set.spawn(async move {
            let result = store.fetch_latest(&document).await;
            (document, result)
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((document, Ok(value))) => {
                let count = normalize(&value).len();
                gauge!(SHARD_ENTRIES, "document" => document.clone()).set(count as f64);
                counts.insert(document, Some(count));
            }
            Ok((document, Err(e))) => {
                tracing::warn!(document = %document, error = %e, "Shard occupancy unavailable");
            }
            Err(e) => tracing::error!("Occupancy task panicked: {}", e),
        }
    }

    counts
}
