//! Persistent engine backed by redb.
//!
//! Each sub-namespace is one redb table. redb is synchronous, so every call
//! runs on the blocking pool. Commits use redb's default immediate
//! durability.

use async_trait::async_trait;
use redb::{Database, TableDefinition, TableError};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::engine::{Entry, EngineError, EngineResult, EntryStream, KvEngine, RangeOptions};

/// Entries buffered between the scan thread and the consumer
const SCAN_BUFFER: usize = 64;

fn table(namespace: &str) -> TableDefinition<'_, &'static str, &'static str> {
    TableDefinition::new(namespace)
}

/// redb-backed [`KvEngine`]
pub struct RedbEngine {
    db: Arc<Database>,
}

impl RedbEngine {
    /// Open (or create) the database at the given path
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, f: F) -> EngineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> EngineResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))?
    }
}

#[async_trait]
impl KvEngine for RedbEngine {
    fn name(&self) -> &str {
        "redb"
    }

    async fn open_sub(&self, namespace: &str) -> EngineResult<()> {
        let namespace = namespace.to_string();
        self.blocking(move |db| {
            let write_txn = db.begin_write()?;
            {
                let _t = write_txn.open_table(table(&namespace))?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn drop_sub(&self, namespace: &str) -> EngineResult<()> {
        let namespace = namespace.to_string();
        self.blocking(move |db| {
            let write_txn = db.begin_write()?;
            write_txn.delete_table(table(&namespace))?;
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, namespace: &str, key: &str) -> EngineResult<String> {
        let namespace = namespace.to_string();
        let key = key.to_string();
        self.blocking(move |db| {
            let read_txn = db.begin_read()?;
            let t = match read_txn.open_table(table(&namespace)) {
                Ok(t) => t,
                Err(TableError::TableDoesNotExist(_)) => return Err(EngineError::NotFound),
                Err(e) => return Err(e.into()),
            };
            let value = t.get(key.as_str())?.ok_or(EngineError::NotFound)?;
            Ok(value.value().to_string())
        })
        .await
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> EngineResult<()> {
        let namespace = namespace.to_string();
        let key = key.to_string();
        let value = value.to_string();
        self.blocking(move |db| {
            let write_txn = db.begin_write()?;
            {
                let mut t = write_txn.open_table(table(&namespace))?;
                t.insert(key.as_str(), value.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, namespace: &str, key: &str) -> EngineResult<()> {
        let namespace = namespace.to_string();
        let key = key.to_string();
        self.blocking(move |db| {
            let write_txn = db.begin_write()?;
            {
                let mut t = write_txn.open_table(table(&namespace))?;
                t.remove(key.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn range_scan(&self, namespace: &str, range: RangeOptions) -> EngineResult<EntryStream> {
        let (tx, rx) = mpsc::channel(SCAN_BUFFER);
        let db = Arc::clone(&self.db);
        let namespace = namespace.to_string();

        tokio::task::spawn_blocking(move || {
            let scan = || -> EngineResult<()> {
                if range.is_empty() {
                    return Ok(());
                }
                let read_txn = db.begin_read()?;
                let t = match read_txn.open_table(table(&namespace)) {
                    Ok(t) => t,
                    Err(TableError::TableDoesNotExist(_)) => return Ok(()),
                    Err(e) => return Err(e.into()),
                };
                for item in t.range::<&str>((range.lower_bound(), range.upper_bound()))? {
                    let (key, value) = item?;
                    let entry = Entry::new(key.value(), value.value());
                    if tx.blocking_send(Ok(entry)).is_err() {
                        // Consumer went away
                        return Ok(());
                    }
                }
                Ok(())
            };
            if let Err(e) = scan() {
                let _ = tx.blocking_send(Err(e));
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn engine(dir: &tempfile::TempDir) -> RedbEngine {
        RedbEngine::open(dir.path().join("meta").join("cairn.redb")).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        engine.open_sub("photos").await.unwrap();

        engine.put("photos", "a.jpg", r#"{"size":1}"#).await.unwrap();
        assert_eq!(engine.get("photos", "a.jpg").await.unwrap(), r#"{"size":1}"#);

        engine.delete("photos", "a.jpg").await.unwrap();
        assert!(engine.get("photos", "a.jpg").await.unwrap_err().is_not_found());
        engine.delete("photos", "a.jpg").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_namespace_reads_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        assert!(engine.get("nowhere", "k").await.unwrap_err().is_not_found());

        let entries: Vec<_> = engine
            .range_scan("nowhere", RangeOptions::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert!(entries.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_namespaces_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        engine.put("a", "k", "1").await.unwrap();
        engine.put("b", "k", "2").await.unwrap();
        assert_eq!(engine.get("a", "k").await.unwrap(), "1");
        assert_eq!(engine.get("b", "k").await.unwrap(), "2");

        engine.drop_sub("a").await.unwrap();
        assert!(engine.get("a", "k").await.unwrap_err().is_not_found());
        assert_eq!(engine.get("b", "k").await.unwrap(), "2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_range_scan_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        for key in ["dem", "demo", "demo1", "demox", "demp", "zeta"] {
            engine.put("ns", key, "v").await.unwrap();
        }

        let range = RangeOptions {
            gt: None,
            start: Some("demo".into()),
            lt: Some("demp".into()),
        };
        let keys: Vec<String> = engine
            .range_scan("ns", range)
            .await
            .unwrap()
            .map(|e| e.unwrap().key)
            .collect()
            .await;
        assert_eq!(keys, vec!["demo", "demo1", "demox"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropping_stream_stops_scan() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        for i in 0..500 {
            engine.put("ns", &format!("key{i:04}"), "v").await.unwrap();
        }

        let mut stream = engine.range_scan("ns", RangeOptions::default()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.key, "key0000");
        drop(stream);

        // The database stays usable for writers after an abandoned scan
        engine.put("ns", "after", "v").await.unwrap();
        assert_eq!(engine.get("ns", "after").await.unwrap(), "v");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = engine(&dir);
            engine.put("ns", "k", "v").await.unwrap();
        }
        let engine = engine(&dir);
        assert_eq!(engine.get("ns", "k").await.unwrap(), "v");
    }
}
