//! Data backend clients
//!
//! [`DataClient`] is a closed set of backends. Each reports a type tag that
//! decides how stored data is addressed: REST object services take the bare
//! key, the others take the whole retrieval record.

mod file;
mod memory;
mod sproxyd;

pub use file::FileClient;
pub use memory::MemoryClient;
pub use sproxyd::SproxydClient;

use bytes::Bytes;
use cairn_common::DataRetrievalInfo;
use cairn_common::config::LocationConfig;
use futures::stream::BoxStream;
use serde::Serialize;
use std::io;

use crate::error::BackendError;

/// Object data in flight
pub type DataStream = BoxStream<'static, Result<Bytes, io::Error>>;

/// Inclusive byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Offset and length of the range inside an object of `total` bytes
    #[must_use]
    pub fn clamp(&self, total: u64) -> (u64, u64) {
        if self.start >= total {
            return (total, 0);
        }
        let end = self.end.min(total - 1);
        (self.start, end - self.start + 1)
    }
}

/// Identifies what is being written, for backends that derive keys
#[derive(Debug, Clone, Default)]
pub struct KeyContext {
    pub bucket_name: String,
    pub object_key: String,
    pub owner: String,
    pub part_number: Option<u32>,
    pub upload_id: Option<String>,
}

/// Addressing argument of get and delete
#[derive(Debug, Clone, Copy)]
pub enum DataAddress<'a> {
    Key(&'a str),
    Info(&'a DataRetrievalInfo),
}

impl DataAddress<'_> {
    pub fn key(&self) -> &str {
        match self {
            Self::Key(key) => key,
            Self::Info(info) => &info.key,
        }
    }
}

/// Result of one backend probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BackendHealth {
    Status { code: u16, message: String },
    Failed { error: String },
}

/// A configured backend
pub enum DataClient {
    Memory(MemoryClient),
    File(FileClient),
    Sproxyd(SproxydClient),
}

impl DataClient {
    /// Build a client for one configured location
    pub fn from_config(config: &LocationConfig) -> Result<Self, BackendError> {
        Ok(match config {
            LocationConfig::Mem => Self::Memory(MemoryClient::new()),
            LocationConfig::File { path } => Self::File(FileClient::new(path)),
            LocationConfig::Sproxyd {
                endpoint,
                base_path,
            } => Self::Sproxyd(SproxydClient::new(endpoint, base_path)?),
        })
    }

    /// Type tag
    pub const fn client_type(&self) -> &'static str {
        match self {
            Self::Memory(_) => "mem",
            Self::File(_) => "file",
            Self::Sproxyd(_) => "sproxyd",
        }
    }

    /// Shape the addressing argument for this client type
    pub fn address<'a>(&self, info: &'a DataRetrievalInfo) -> DataAddress<'a> {
        match self {
            Self::Sproxyd(_) => DataAddress::Key(&info.key),
            Self::Memory(_) | Self::File(_) => DataAddress::Info(info),
        }
    }

    /// Store a stream, returning the new data key
    pub async fn put(
        &self,
        stream: DataStream,
        size: u64,
        key_context: &KeyContext,
        request_id: &str,
    ) -> Result<String, BackendError> {
        match self {
            Self::Memory(c) => c.put(stream, key_context).await,
            Self::File(c) => c.put(stream, key_context).await,
            Self::Sproxyd(c) => c.put(stream, size, key_context, request_id).await,
        }
    }

    pub async fn get(
        &self,
        address: DataAddress<'_>,
        range: Option<ByteRange>,
        request_id: &str,
    ) -> Result<DataStream, BackendError> {
        match self {
            Self::Memory(c) => c.get(address, range),
            Self::File(c) => c.get(address, range).await,
            Self::Sproxyd(c) => c.get(address, range, request_id).await,
        }
    }

    pub async fn delete(
        &self,
        address: DataAddress<'_>,
        request_id: &str,
    ) -> Result<(), BackendError> {
        match self {
            Self::Memory(c) => {
                c.delete(address);
                Ok(())
            }
            Self::File(c) => c.delete(address).await,
            Self::Sproxyd(c) => c.delete(address, request_id).await,
        }
    }

    /// Probe backend health; `None` for backends without a probe
    pub async fn healthcheck(&self, request_id: &str) -> Option<BackendHealth> {
        let probe = match self {
            Self::Memory(_) => return None,
            Self::File(c) => c.healthcheck().await,
            Self::Sproxyd(c) => c.healthcheck(request_id).await,
        };
        Some(match probe {
            Ok((code, message)) => BackendHealth::Status { code, message },
            Err(e) => BackendHealth::Failed {
                error: e.to_string(),
            },
        })
    }
}

/// Random hex key for new data
pub(crate) fn new_data_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
