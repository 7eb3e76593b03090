//! Read-modify-write access to a whole-document JSON store.
//!
//! The store only supports fetching and replacing a full document. Every
//! mutation here goes through [`write::write_with_retry`], which re-fetches,
//! re-applies and re-writes on each attempt.

pub mod client;
pub mod config;
pub mod entry;
pub mod errors;
pub mod memory;
pub mod merge;
pub mod metrics_defs;
pub mod normalize;
pub mod service;
pub mod shard;
pub mod template;
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;
pub mod write;

pub use client::{DocumentStore, JsonBinStore, StoreError};
pub use entry::{Entry, EntryKind};
pub use errors::{ErrorKind, WriteError};
pub use memory::MemoryStore;
pub use service::{DocumentService, DocumentStats, SavedTemplate};
pub use shard::{LeastOccupancy, ShardSelector};
pub use write::{Outcome, RetryPolicy, write_with_retry};
