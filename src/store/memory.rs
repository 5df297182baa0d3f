use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;

use super::{
    IndexPolicy, Namespace, SearchHit, SearchQuery, Store, StoreError, StoreItem,
};

/// One stored entry plus its precomputed search terms.
#[derive(Clone, Debug)]
struct Entry {
    item: StoreItem,
    /// Lowercased terms extracted at write time; `None` when indexing was
    /// skipped for this entry.
    terms: Option<Vec<String>>,
}

/// In-memory [`Store`] backend.
///
/// Ranking is lexical term overlap between the query and the indexed
/// string content — deliberately simple, standing in for an
/// embedding-backed implementation behind the same contract. Writes are
/// atomic per key under the store-wide lock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<FxHashMap<(Namespace, String), Entry>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items across all namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn extract_terms(value: &Value, policy: &IndexPolicy) -> Option<Vec<String>> {
        let mut terms = Vec::new();
        match policy {
            IndexPolicy::Skip => return None,
            IndexPolicy::Default => collect_strings(value, &mut terms),
            IndexPolicy::Fields(fields) => {
                if let Value::Object(map) = value {
                    for field in fields {
                        if let Some(v) = map.get(field) {
                            collect_strings(v, &mut terms);
                        }
                    }
                }
            }
        }
        Some(terms)
    }

    fn score(terms: &[String], query_terms: &[String]) -> f64 {
        if query_terms.is_empty() || terms.is_empty() {
            return 0.0;
        }
        let matched = query_terms
            .iter()
            .filter(|q| terms.iter().any(|t| t == *q))
            .count();
        matched as f64 / query_terms.len() as f64
    }
}

fn collect_strings(value: &Value, terms: &mut Vec<String>) {
    match value {
        Value::String(s) => terms.extend(tokenize(s)),
        Value::Array(items) => {
            for item in items {
                collect_strings(item, terms);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_strings(item, terms);
            }
        }
        _ => {}
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn matches_filter(value: &Value, filter: Option<&FxHashMap<String, Value>>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    let Value::Object(map) = value else {
        return filter.is_empty();
    };
    filter
        .iter()
        .all(|(field, expected)| map.get(field) == Some(expected))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        value: Value,
        index: IndexPolicy,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let terms = Self::extract_terms(&value, &index);
        let mut entries = self.entries.write();
        let slot = entries.entry((namespace.clone(), key.to_string()));
        match slot {
            std::collections::hash_map::Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.item.value = value;
                entry.item.updated_at = now;
                entry.terms = terms;
            }
            std::collections::hash_map::Entry::Vacant(vacant) => {
                vacant.insert(Entry {
                    item: StoreItem {
                        namespace: namespace.clone(),
                        key: key.to_string(),
                        value,
                        created_at: now,
                        updated_at: now,
                    },
                    terms,
                });
            }
        }
        Ok(())
    }

    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<StoreItem>, StoreError> {
        let entries = self.entries.read();
        Ok(entries
            .get(&(namespace.clone(), key.to_string()))
            .map(|e| e.item.clone()))
    }

    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write();
        Ok(entries.remove(&(namespace.clone(), key.to_string())).is_some())
    }

    async fn search(
        &self,
        namespace: &Namespace,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let query_terms = query
            .query
            .as_deref()
            .map(tokenize)
            .unwrap_or_default();
        let entries = self.entries.read();
        let mut hits: Vec<SearchHit> = entries
            .values()
            .filter(|e| e.item.namespace.starts_with(namespace))
            .filter(|e| matches_filter(&e.item.value, query.filter.as_ref()))
            .filter_map(|e| {
                let terms = e.terms.as_ref()?;
                let score = if query_terms.is_empty() {
                    // Pure filter listing; every indexed entry qualifies.
                    0.0
                } else {
                    let s = Self::score(terms, &query_terms);
                    if s == 0.0 {
                        return None;
                    }
                    s
                };
                Some(SearchHit {
                    item: e.item.clone(),
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.item.key.cmp(&b.item.key))
        });
        hits.truncate(query.limit.max(1));
        Ok(hits)
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, StoreError> {
        let entries = self.entries.read();
        let mut namespaces: Vec<Namespace> = entries
            .keys()
            .map(|(ns, _)| ns.clone())
            .collect::<rustc_hash::FxHashSet<_>>()
            .into_iter()
            .collect();
        namespaces.sort_by(|a, b| a.segments().cmp(b.segments()));
        Ok(namespaces)
    }
}
