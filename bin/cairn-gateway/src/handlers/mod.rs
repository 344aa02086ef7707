//! Operation handlers
//!
//! [`GatewayHandlers`] owns the metadata backend, the location resolver and
//! the data gateway, and fans each dispatched operation out to the module
//! that implements it.

mod access;
mod bucket;
mod multi_delete;
mod multipart;
mod object;
mod service;

use async_trait::async_trait;
use cairn_auth::{AuthInfo, StreamingV4Params};
use cairn_common::{Error, Result};
use cairn_meta_store::MetadataBackend;
use cairn_meta_store::listing::DEFAULT_MAX_KEYS;
use cairn_placement::{DataGateway, LocationResolver};
use cairn_s3::{ApiHandlers, ApiMethod, BodyStream, S3Request, S3Response};
use futures::StreamExt;
use http::HeaderMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub use access::{Access, check_bucket_access, check_grant_headers};

/// Handlers backed by the metadata store and data backends
pub struct GatewayHandlers {
    meta: Arc<MetadataBackend>,
    data: Arc<DataGateway>,
    resolver: Arc<LocationResolver>,
}

impl GatewayHandlers {
    pub const fn new(
        meta: Arc<MetadataBackend>,
        data: Arc<DataGateway>,
        resolver: Arc<LocationResolver>,
    ) -> Self {
        Self {
            meta,
            data,
            resolver,
        }
    }
}

#[async_trait]
impl ApiHandlers for GatewayHandlers {
    async fn bypass(&self, method: ApiMethod, _request: S3Request) -> Result<S3Response> {
        Err(Error::not_implemented(method.as_str()))
    }

    async fn standard(
        &self,
        method: ApiMethod,
        auth_info: &AuthInfo,
        request: S3Request,
    ) -> Result<S3Response> {
        debug!(method = %method, requester = %auth_info.canonical_id, "Handling request");
        match method {
            ApiMethod::ServiceGet => self.service_get(auth_info).await,
            ApiMethod::BucketHead => self.bucket_head(auth_info, &request).await,
            ApiMethod::BucketGet => self.bucket_get(auth_info, &request).await,
            ApiMethod::BucketDelete => self.bucket_delete(auth_info, &request).await,
            ApiMethod::BucketGetVersioning => {
                self.bucket_get_versioning(auth_info, &request).await
            }
            ApiMethod::BucketPutVersioning => {
                self.bucket_put_versioning(auth_info, &request).await
            }
            ApiMethod::ObjectGet => self.object_get(auth_info, &request, false).await,
            ApiMethod::ObjectHead => self.object_get(auth_info, &request, true).await,
            ApiMethod::ObjectDelete => self.object_delete(auth_info, &request).await,
            ApiMethod::InitiateMultipartUpload => {
                self.initiate_multipart_upload(auth_info, &request).await
            }
            ApiMethod::CompleteMultipartUpload => {
                self.complete_multipart_upload(auth_info, &request).await
            }
            ApiMethod::MultipartDelete => self.multipart_delete(auth_info, &request).await,
            ApiMethod::ListParts => self.list_parts(auth_info, &request).await,
            ApiMethod::ListMultipartUploads => {
                self.list_multipart_uploads(auth_info, &request).await
            }
            ApiMethod::MultiObjectDelete => self.multi_object_delete(auth_info, &request).await,
            other => Err(Error::not_implemented(other.as_str())),
        }
    }

    async fn bucket_put(
        &self,
        auth_info: &AuthInfo,
        request: S3Request,
        location_constraint: Option<String>,
    ) -> Result<S3Response> {
        self.create_bucket(auth_info, &request, location_constraint)
            .await
    }

    async fn copy(
        &self,
        method: ApiMethod,
        auth_info: &AuthInfo,
        request: S3Request,
        source_bucket: String,
        source_object: String,
    ) -> Result<S3Response> {
        match method {
            ApiMethod::ObjectCopy => {
                self.object_copy(auth_info, &request, &source_bucket, &source_object)
                    .await
            }
            ApiMethod::ObjectPutCopyPart => {
                self.object_put_copy_part(auth_info, &request, &source_bucket, &source_object)
                    .await
            }
            other => Err(Error::not_implemented(other.as_str())),
        }
    }

    async fn streaming(
        &self,
        method: ApiMethod,
        auth_info: &AuthInfo,
        request: S3Request,
        body: BodyStream,
        streaming_v4_params: Option<StreamingV4Params>,
    ) -> Result<S3Response> {
        let body = match streaming_v4_params {
            Some(_) => crate::chunked::decode_aws_chunked(body),
            None => body,
        };
        match method {
            ApiMethod::ObjectPut => self.object_put(auth_info, &request, body).await,
            ApiMethod::ObjectPutPart => self.object_put_part(auth_info, &request, body).await,
            other => Err(Error::not_implemented(other.as_str())),
        }
    }
}

/// Bucket named by the request
pub(crate) fn bucket_name(request: &S3Request) -> Result<&str> {
    request.bucket.as_deref().ok_or(Error::InvalidUri)
}

/// Object key named by the request
pub(crate) fn object_key(request: &S3Request) -> Result<&str> {
    request.key.as_deref().ok_or(Error::InvalidUri)
}

/// `x-amz-meta-*` headers, keyed by lowercased header name
pub(crate) fn extract_user_metadata(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-amz-meta-"))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Payload length declared by the client
pub(crate) fn declared_length(request: &S3Request) -> Result<u64> {
    request
        .header("x-amz-decoded-content-length")
        .or_else(|| request.header("content-length"))
        .ok_or_else(|| Error::invalid_request("missing Content-Length"))?
        .parse()
        .map_err(|_| Error::invalid_argument("invalid Content-Length"))
}

/// Page size from a `max-keys` style query parameter, capped at 1000
pub(crate) fn page_size(request: &S3Request, name: &str) -> Result<usize> {
    match request.query_param(name) {
        None => Ok(DEFAULT_MAX_KEYS),
        Some(raw) => raw
            .parse::<usize>()
            .map(|n| n.min(DEFAULT_MAX_KEYS))
            .map_err(|_| Error::invalid_argument(format!("invalid {name}"))),
    }
}

pub(crate) fn quoted(etag: &str) -> String {
    format!("\"{etag}\"")
}

pub(crate) fn unquoted(etag: &str) -> &str {
    etag.trim().trim_matches('"')
}

/// MD5 and length of the bytes passed through [`Digest::wrap`]
#[derive(Clone)]
pub(crate) struct Digest {
    state: Arc<Mutex<(md5::Context, u64)>>,
}

impl Digest {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new((md5::Context::new(), 0))),
        }
    }

    /// Wrap a stream so every chunk feeds the digest
    pub fn wrap(&self, body: BodyStream) -> BodyStream {
        let state = Arc::clone(&self.state);
        body.inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                let mut state = state.lock();
                state.0.consume(bytes);
                state.1 += bytes.len() as u64;
            }
        })
        .boxed()
    }

    /// Hex MD5 and byte count seen so far
    pub fn finish(&self) -> (String, u64) {
        let state = self.state.lock();
        (format!("{:x}", state.0.clone().compute()), state.1)
    }
}
