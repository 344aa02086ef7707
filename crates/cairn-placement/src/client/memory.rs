//! Process-memory backend

use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{ByteRange, DataAddress, DataStream, KeyContext, new_data_key};
use crate::error::BackendError;

/// Keeps object data in a map; lost on restart
#[derive(Default)]
pub struct MemoryClient {
    data: RwLock<HashMap<String, Bytes>>,
}

impl MemoryClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(
        &self,
        mut stream: DataStream,
        _key_context: &KeyContext,
    ) -> Result<String, BackendError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let key = new_data_key();
        self.data.write().insert(key.clone(), buf.freeze());
        Ok(key)
    }

    pub fn get(
        &self,
        address: DataAddress<'_>,
        range: Option<ByteRange>,
    ) -> Result<DataStream, BackendError> {
        let key = address.key();
        let data = self
            .data
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(key.to_string()))?;
        let data = match range {
            Some(range) => {
                let (offset, len) = range.clamp(data.len() as u64);
                #[allow(clippy::cast_possible_truncation)]
                let (start, end) = (offset as usize, (offset + len) as usize);
                data.slice(start..end)
            }
            None => data,
        };
        Ok(Box::pin(stream::once(async move { Ok(data) })))
    }

    pub fn delete(&self, address: DataAddress<'_>) {
        self.data.write().remove(address.key());
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}
