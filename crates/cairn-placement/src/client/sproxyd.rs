//! REST object service backend
//!
//! Objects are addressed as `<endpoint><base_path>/<key>`. The client picks
//! the key on write.

use futures::{StreamExt, TryStreamExt};
use reqwest::StatusCode;
use std::io;
use std::time::Duration;
use tracing::debug;

use super::{ByteRange, DataAddress, DataStream, KeyContext, new_data_key};
use crate::error::BackendError;

const REQUEST_ID_HEADER: &str = "x-cairn-request-id";

/// HTTP client for a REST object service
pub struct SproxydClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl SproxydClient {
    pub fn new(endpoint: &str, base_path: &str) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        let base_url = format!(
            "{}/{}",
            endpoint.trim_end_matches('/'),
            base_path.trim_matches('/')
        );
        Ok(Self {
            base_url,
            http_client,
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{key}", self.base_url)
    }

    pub async fn put(
        &self,
        stream: DataStream,
        size: u64,
        key_context: &KeyContext,
        request_id: &str,
    ) -> Result<String, BackendError> {
        let key = new_data_key();
        debug!(
            key = %key,
            bucket = %key_context.bucket_name,
            object = %key_context.object_key,
            "Storing object data"
        );
        let response = self
            .http_client
            .put(self.url(&key))
            .header(reqwest::header::CONTENT_LENGTH, size)
            .header(REQUEST_ID_HEADER, request_id)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BackendError::Status(response.status().as_u16()));
        }
        Ok(key)
    }

    pub async fn get(
        &self,
        address: DataAddress<'_>,
        range: Option<ByteRange>,
        request_id: &str,
    ) -> Result<DataStream, BackendError> {
        let key = address.key();
        let mut request = self
            .http_client
            .get(self.url(key))
            .header(REQUEST_ID_HEADER, request_id);
        if let Some(range) = range {
            request = request.header(
                reqwest::header::RANGE,
                format!("bytes={}-{}", range.start, range.end),
            );
        }
        let response = request.send().await?;
        match response.status() {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => {}
            StatusCode::NOT_FOUND => return Err(BackendError::NotFound(key.to_string())),
            status => return Err(BackendError::Status(status.as_u16())),
        }
        Ok(response.bytes_stream().map_err(io::Error::other).boxed())
    }

    pub async fn delete(
        &self,
        address: DataAddress<'_>,
        request_id: &str,
    ) -> Result<(), BackendError> {
        let response = self
            .http_client
            .delete(self.url(address.key()))
            .header(REQUEST_ID_HEADER, request_id)
            .send()
            .await?;
        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            s => Err(BackendError::Status(s.as_u16())),
        }
    }

    /// GET the service's configuration document
    pub async fn healthcheck(&self, request_id: &str) -> Result<(u16, String), BackendError> {
        let response = self
            .http_client
            .get(self.url(".conf"))
            .header(REQUEST_ID_HEADER, request_id)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        let status = response.status();
        Ok((
            status.as_u16(),
            status.canonical_reason().unwrap_or_default().to_string(),
        ))
    }
}
