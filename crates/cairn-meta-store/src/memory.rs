//! In-memory engine for tests and single-process development.

use async_trait::async_trait;
use futures::stream;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use crate::engine::{Entry, EngineError, EngineResult, EntryStream, KvEngine, RangeOptions};

type Namespace = BTreeMap<String, String>;

/// Volatile [`KvEngine`] over ordered maps
#[derive(Default)]
pub struct MemoryEngine {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl MemoryEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys in a namespace
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces.read().get(namespace).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl KvEngine for MemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open_sub(&self, namespace: &str) -> EngineResult<()> {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default();
        Ok(())
    }

    async fn drop_sub(&self, namespace: &str) -> EngineResult<()> {
        self.namespaces.write().remove(namespace);
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> EngineResult<String> {
        self.namespaces
            .read()
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned()
            .ok_or(EngineError::NotFound)
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> EngineResult<()> {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> EngineResult<()> {
        if let Some(ns) = self.namespaces.write().get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    async fn range_scan(&self, namespace: &str, range: RangeOptions) -> EngineResult<EntryStream> {
        let entries: Vec<EngineResult<Entry>> = if range.is_empty() {
            Vec::new()
        } else {
            let guard = self.namespaces.read();
            guard.get(namespace).map_or_else(Vec::new, |ns| {
                ns.range::<str, _>((range.lower_bound(), range.upper_bound()))
                    .map(|(k, v)| Ok(Entry::new(k.as_str(), v.as_str())))
                    .collect()
            })
        };
        Ok(Box::pin(stream::iter(entries)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_scan_skips_marker() {
        let engine = MemoryEngine::new();
        for key in ["a", "b", "c"] {
            engine.put("ns", key, key).await.unwrap();
        }
        let range = RangeOptions {
            gt: Some("a".into()),
            ..Default::default()
        };
        let keys: Vec<String> = engine
            .range_scan("ns", range)
            .await
            .unwrap()
            .map(|e| e.unwrap().key)
            .collect()
            .await;
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_inverted_range_is_empty() {
        let engine = MemoryEngine::new();
        engine.put("ns", "m", "v").await.unwrap();
        let range = RangeOptions {
            gt: Some("z".into()),
            start: None,
            lt: Some("a".into()),
        };
        let count = engine.range_scan("ns", range).await.unwrap().count().await;
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_drop_sub() {
        let engine = MemoryEngine::new();
        engine.put("ns", "k", "v").await.unwrap();
        assert_eq!(engine.len("ns"), 1);
        engine.drop_sub("ns").await.unwrap();
        assert_eq!(engine.len("ns"), 0);
        assert!(engine.get("ns", "k").await.unwrap_err().is_not_found());
    }
}
