//! Ordered key-value engine contract.
//!
//! An engine holds any number of named sub-namespaces, each an independent
//! sorted map of string keys to string values. Range scans stream entries in
//! key order and stop producing as soon as the consumer drops the stream.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::ops::Bound;
use std::sync::Arc;

/// Error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("key not found")]
    NotFound,
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine task failed: {0}")]
    Task(String),
}

impl From<redb::TransactionError> for EngineError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl EngineError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// One stored key/value pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered stream of scan results
pub type EntryStream = BoxStream<'static, EngineResult<Entry>>;

/// Bounds of a range scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeOptions {
    /// Exclusive lower bound
    pub gt: Option<String>,
    /// Inclusive lower bound
    pub start: Option<String>,
    /// Exclusive upper bound
    pub lt: Option<String>,
}

impl RangeOptions {
    /// The tighter of `gt` and `start`
    #[must_use]
    pub fn lower_bound(&self) -> Bound<&str> {
        match (self.gt.as_deref(), self.start.as_deref()) {
            (Some(gt), Some(start)) if gt >= start => Bound::Excluded(gt),
            (_, Some(start)) => Bound::Included(start),
            (Some(gt), None) => Bound::Excluded(gt),
            (None, None) => Bound::Unbounded,
        }
    }

    #[must_use]
    pub fn upper_bound(&self) -> Bound<&str> {
        self.lt.as_deref().map_or(Bound::Unbounded, Bound::Excluded)
    }

    /// Whether no key can satisfy the bounds
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let Some(lt) = self.lt.as_deref() else {
            return false;
        };
        match self.lower_bound() {
            Bound::Included(low) | Bound::Excluded(low) => low >= lt,
            Bound::Unbounded => false,
        }
    }

    /// Whether `key` lies inside the bounds
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let above = match self.lower_bound() {
            Bound::Included(low) => key >= low,
            Bound::Excluded(low) => key > low,
            Bound::Unbounded => true,
        };
        above && self.lt.as_deref().is_none_or(|lt| key < lt)
    }
}

/// Embedded ordered key-value engine with sub-namespaces
#[async_trait]
pub trait KvEngine: Send + Sync {
    /// Engine name for logging
    fn name(&self) -> &str;

    /// Create a sub-namespace if it does not exist
    async fn open_sub(&self, namespace: &str) -> EngineResult<()>;

    /// Destroy a sub-namespace and everything in it
    async fn drop_sub(&self, namespace: &str) -> EngineResult<()>;

    /// Read one key; [`EngineError::NotFound`] when absent
    async fn get(&self, namespace: &str, key: &str) -> EngineResult<String>;

    /// Write one key durably
    async fn put(&self, namespace: &str, key: &str, value: &str) -> EngineResult<()>;

    /// Remove one key; removing an absent key succeeds
    async fn delete(&self, namespace: &str, key: &str) -> EngineResult<()>;

    /// Stream entries inside `range` in key order
    async fn range_scan(&self, namespace: &str, range: RangeOptions) -> EngineResult<EntryStream>;
}

/// Handle on one sub-namespace
#[derive(Clone)]
pub struct Sublevel {
    engine: Arc<dyn KvEngine>,
    name: String,
}

impl Sublevel {
    /// Open (creating if needed) a sub-namespace
    pub async fn open(engine: Arc<dyn KvEngine>, name: impl Into<String>) -> EngineResult<Self> {
        let name = name.into();
        engine.open_sub(&name).await?;
        Ok(Self { engine, name })
    }

    /// Handle on a namespace assumed to exist already
    pub fn attach(engine: Arc<dyn KvEngine>, name: impl Into<String>) -> Self {
        Self {
            engine,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &str) -> EngineResult<String> {
        self.engine.get(&self.name, key).await
    }

    pub async fn put(&self, key: &str, value: &str) -> EngineResult<()> {
        self.engine.put(&self.name, key, value).await
    }

    pub async fn delete(&self, key: &str) -> EngineResult<()> {
        self.engine.delete(&self.name, key).await
    }

    pub async fn read_stream(&self, range: RangeOptions) -> EngineResult<EntryStream> {
        self.engine.range_scan(&self.name, range).await
    }
}
