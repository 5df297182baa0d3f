//! Cross-thread application memory.
//!
//! The store is long-lived, namespaced key/value memory independent of any
//! single run — application memory, not execution history. It is consumed
//! by node functions as an ordinary external dependency; the executor
//! itself never touches it.
//!
//! Writes can select which fields of a value get indexed for search, or
//! opt out of indexing entirely. [`Store::search`] returns ranked hits
//! with a relevance score; the bundled [`InMemoryStore`] ranks by lexical
//! term overlap, a stand-in with the same contract an embedding-backed
//! implementation would satisfy.
//!
//! # Examples
//!
//! ```rust
//! use plait::store::{InMemoryStore, IndexPolicy, Namespace, SearchQuery, Store};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), plait::store::StoreError> {
//! let store = InMemoryStore::new();
//! let ns = Namespace::new(["users", "alice"]);
//!
//! store
//!     .put(&ns, "profile", json!({"bio": "rust and geese"}), IndexPolicy::Default)
//!     .await?;
//!
//! let hits = store.search(&ns, &SearchQuery::text("geese").with_limit(5)).await?;
//! assert_eq!(hits[0].item.key, "profile");
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Hierarchical namespace path, e.g. `["users", "alice", "memories"]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace(Vec<String>);

impl Namespace {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether `self` is `prefix` or nested below it.
    #[must_use]
    pub fn starts_with(&self, prefix: &Namespace) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// How a written value participates in search indexing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum IndexPolicy {
    /// Index every string content in the value.
    #[default]
    Default,
    /// Index only the named top-level fields of the value.
    Fields(Vec<String>),
    /// Exclude this entry from search entirely.
    Skip,
}

/// A stored item with its write timestamps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreItem {
    pub namespace: Namespace,
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A ranked search result.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub item: StoreItem,
    /// Relevance score; higher is more relevant. Exact semantics are
    /// backend-defined, ordering is the contract.
    pub score: f64,
}

/// Query for [`Store::search`].
#[derive(Clone, Debug, Default)]
pub struct SearchQuery {
    /// Free-text query; `None` lists entries filtered only by `filter`.
    pub query: Option<String>,
    /// Maximum hits to return.
    pub limit: usize,
    /// Exact-match constraints on top-level value fields.
    pub filter: Option<FxHashMap<String, Value>>,
}

impl SearchQuery {
    /// Free-text query with the default limit of 10.
    #[must_use]
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            limit: 10,
            filter: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: FxHashMap<String, Value>) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Errors surfaced by store backends.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("store backend error: {message}")]
    #[diagnostic(code(plait::store::backend))]
    Backend { message: String },

    #[error("store serialization error: {0}")]
    #[diagnostic(code(plait::store::serde))]
    Serde(#[from] serde_json::Error),
}

/// Namespaced key/value memory with ranked search.
///
/// Backends must guarantee per-key atomicity of writes; concurrent
/// writers to different keys never observe torn values.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or overwrite a value. `index` controls search indexing for
    /// this entry.
    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        value: Value,
        index: IndexPolicy,
    ) -> Result<(), StoreError>;

    /// Fetch a single item.
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<StoreItem>, StoreError>;

    /// Remove an item; returns whether it existed.
    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool, StoreError>;

    /// Ranked search within a namespace (and its descendants).
    async fn search(
        &self,
        namespace: &Namespace,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, StoreError>;

    /// All namespaces currently holding at least one item.
    async fn list_namespaces(&self) -> Result<Vec<Namespace>, StoreError>;
}
