use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;

use crate::core::{AgentError, AgentResult, Collection, KvStore};

/// In-process record store for dry runs and tests.
///
/// Every fetch is recorded, hits and misses alike, in call order.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<(Collection, String), Vec<u8>>,
    fetches: Mutex<Vec<(Collection, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Serialize>(&self, collection: Collection, id: &str, record: &T) {
        let bytes = serde_json::to_vec(record).unwrap_or_default();
        self.insert_raw(collection, id, bytes);
    }

    pub fn insert_raw(&self, collection: Collection, id: &str, bytes: impl Into<Vec<u8>>) {
        self.records
            .insert((collection, id.to_string()), bytes.into());
    }

    pub fn remove(&self, collection: Collection, id: &str) -> Option<Vec<u8>> {
        self.records
            .remove(&(collection, id.to_string()))
            .map(|(_, bytes)| bytes)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn fetch_log(&self) -> Vec<(Collection, String)> {
        self.fetches
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn fetched(&self, collection: Collection, id: &str) -> bool {
        self.fetch_log()
            .iter()
            .any(|(c, i)| *c == collection && i == id)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn fetch(&self, collection: Collection, id: &str) -> AgentResult<Vec<u8>> {
        if let Ok(mut log) = self.fetches.lock() {
            log.push((collection, id.to_string()));
        }
        self.records
            .get(&(collection, id.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AgentError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Request;

    #[tokio::test]
    async fn test_fetch_hit_and_miss() {
        let store = MemoryStore::new();
        store.insert(
            Collection::Requests,
            "req-1",
            &Request {
                id: "req-1".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(store.len(), 1);

        let bytes = store.fetch(Collection::Requests, "req-1").await.unwrap();
        assert!(!bytes.is_empty());

        match store.fetch(Collection::Nodes, "req-1").await {
            Err(AgentError::NotFound { collection, id }) => {
                assert_eq!(collection, "nodes");
                assert_eq!(id, "req-1");
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(store.fetch_log().len(), 2);
        assert!(store.fetched(Collection::Nodes, "req-1"));
        assert!(!store.fetched(Collection::Assemblies, "req-1"));
    }
}
