//! Object operations and the data helpers shared with multipart uploads

use cairn_auth::AuthInfo;
use cairn_common::{DataRetrievalInfo, Error, ObjectRecord, Result, now_rfc3339};
use cairn_meta_store::BucketAndObject;
use cairn_placement::{BackendInfo, ByteRange, KeyContext};
use cairn_s3::{BodyStream, ResponseBody, S3Request, S3Response};
use chrono::DateTime;
use futures::{StreamExt, TryStreamExt, stream};
use http::StatusCode;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    Access, Digest, GatewayHandlers, bucket_name, check_bucket_access, declared_length,
    extract_user_metadata, object_key, quoted,
};
use crate::xml::CopyObjectResult;

/// Data written by one put
pub(super) struct StoredData {
    pub info: DataRetrievalInfo,
    /// Hex MD5 of the payload
    pub etag: String,
    pub size: u64,
}

/// Parse a `Range` header against an object of `total` bytes.
///
/// Unparsable ranges are ignored; well-formed but unsatisfiable ones fail.
pub(crate) fn parse_range_header(header: &str, total: u64) -> Result<Option<ByteRange>> {
    let Some(ranges) = header.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };
    let Some((start, end)) = ranges.split_once('-') else {
        return Ok(None);
    };
    let (start, end) = (start.trim(), end.trim());
    let range = match (start.is_empty(), end.is_empty()) {
        (true, true) => return Ok(None),
        (true, false) => {
            let Ok(suffix) = end.parse::<u64>() else {
                return Ok(None);
            };
            if suffix == 0 || total == 0 {
                return Err(Error::InvalidRange);
            }
            ByteRange::new(total.saturating_sub(suffix), total - 1)
        }
        (false, _) => {
            let Ok(start) = start.parse::<u64>() else {
                return Ok(None);
            };
            let end = if end.is_empty() {
                u64::MAX
            } else {
                match end.parse::<u64>() {
                    Ok(end) if end >= start => end,
                    _ => return Ok(None),
                }
            };
            if start >= total {
                return Err(Error::InvalidRange);
            }
            ByteRange::new(start, end.min(total - 1))
        }
    };
    Ok(Some(range))
}

/// RFC 3339 record timestamp to an HTTP date
fn http_date(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp).map_or_else(
        |_| timestamp.to_string(),
        |ts| ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
    )
}

impl GatewayHandlers {
    /// Write a body to the placement in `backend_info`
    pub(super) async fn store_data(
        &self,
        body: BodyStream,
        size: u64,
        key_context: &KeyContext,
        backend_info: &BackendInfo,
        request_id: &str,
    ) -> Result<StoredData> {
        let digest = Digest::new();
        let mut info = self
            .data
            .put(digest.wrap(body), size, key_context, backend_info, request_id)
            .await?;
        let (etag, length) = digest.finish();
        if length != size {
            warn!(
                expected = size,
                received = length,
                request_id = %request_id,
                "Body length does not match the declared length"
            );
            self.delete_data(std::slice::from_ref(&info), request_id).await;
            return Err(Error::invalid_request(
                "request body length does not match Content-Length",
            ));
        }
        info.size = Some(length);
        Ok(StoredData {
            info,
            etag,
            size: length,
        })
    }

    /// Stream the bytes of an object, or a range of them, across its pieces
    pub(super) fn read_data(
        &self,
        locations: &[DataRetrievalInfo],
        total: u64,
        range: Option<ByteRange>,
        request_id: &str,
    ) -> BodyStream {
        if total == 0 {
            return stream::empty().boxed();
        }
        let (want_start, want_end) = range.map_or((0, total - 1), |r| (r.start, r.end));

        let mut pieces = Vec::new();
        let mut offset = 0;
        for info in locations {
            let start = info.start.unwrap_or(offset);
            let size = info.size.unwrap_or_else(|| total.saturating_sub(start));
            offset = start + size;
            if size == 0 {
                continue;
            }
            let end = start + size - 1;
            if end < want_start || start > want_end {
                continue;
            }
            let local_start = want_start.saturating_sub(start);
            let local_end = want_end.min(end) - start;
            let local = (local_start != 0 || local_end != size - 1)
                .then(|| ByteRange::new(local_start, local_end));
            pieces.push((info.clone(), local));
        }

        let data = Arc::clone(&self.data);
        let request_id = request_id.to_string();
        stream::iter(pieces)
            .then(move |(info, range)| {
                let data = Arc::clone(&data);
                let request_id = request_id.clone();
                async move {
                    data.get(&info, range, &request_id)
                        .await
                        .map_err(io::Error::other)
                }
            })
            .try_flatten()
            .boxed()
    }

    /// Delete data pieces; failures are logged and leave orphans behind
    pub(super) async fn delete_data(&self, locations: &[DataRetrievalInfo], request_id: &str) {
        for info in locations {
            if let Err(e) = self.data.delete(info, request_id).await {
                warn!(
                    key = %info.key,
                    location = %info.data_store_name,
                    error = %e,
                    "Failed to delete object data"
                );
            }
        }
    }

    /// Write an object record, then drop the data of the record it replaced
    pub(super) async fn replace_object(
        &self,
        bucket: &str,
        key: &str,
        record: &ObjectRecord,
        request_id: &str,
    ) -> Result<()> {
        let previous = self
            .meta
            .get_bucket_and_object::<ObjectRecord>(bucket, key)
            .await?
            .object;
        if let Err(e) = self.meta.put_object(bucket, key, record).await {
            self.delete_data(&record.location, request_id).await;
            return Err(e);
        }
        if let Some(previous) = previous {
            self.delete_data(&previous.location, request_id).await;
        }
        Ok(())
    }

    /// Remove an object record and its data; a missing object is not an error
    pub(super) async fn remove_object(&self, bucket: &str, key: &str, request_id: &str) -> Result<()> {
        let BucketAndObject { object, .. } = self
            .meta
            .get_bucket_and_object::<ObjectRecord>(bucket, key)
            .await?;
        let Some(record) = object else {
            return Ok(());
        };
        self.meta.delete_object(bucket, key).await?;
        self.delete_data(&record.location, request_id).await;
        Ok(())
    }

    pub(super) async fn object_put(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
        body: BodyStream,
    ) -> Result<S3Response> {
        let bucket_name = bucket_name(request)?;
        let key = object_key(request)?;
        let bucket = self.meta.get_bucket_attributes(bucket_name).await?;
        check_bucket_access(&bucket, auth_info, Access::Write)?;

        let backend_info = self
            .resolver
            .resolve(&request.headers, None, &bucket, request.host())?;
        let size = declared_length(request)?;
        let key_context = KeyContext {
            bucket_name: bucket_name.to_string(),
            object_key: key.to_string(),
            owner: bucket.owner.clone(),
            ..KeyContext::default()
        };
        let stored = self
            .store_data(body, size, &key_context, &backend_info, &request.request_id)
            .await?;

        let record = ObjectRecord {
            owner: auth_info.canonical_id.clone(),
            owner_display_name: auth_info.display_name.clone(),
            content_length: stored.size,
            content_type: request.header("content-type").map(str::to_string),
            etag: stored.etag,
            last_modified: now_rfc3339(),
            user_metadata: extract_user_metadata(&request.headers),
            location_constraint: Some(backend_info.controlling_location_constraint().to_string()),
            location: vec![stored.info],
        };
        self.replace_object(bucket_name, key, &record, &request.request_id)
            .await?;
        debug!(bucket = %bucket_name, key = %key, size = record.content_length, "Object stored");
        Ok(S3Response::ok().with_header("etag", quoted(&record.etag)))
    }

    /// GET or HEAD an object
    pub(super) async fn object_get(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
        head_only: bool,
    ) -> Result<S3Response> {
        let bucket_name = bucket_name(request)?;
        let key = object_key(request)?;
        let BucketAndObject { bucket, object } = self
            .meta
            .get_bucket_and_object::<ObjectRecord>(bucket_name, key)
            .await?;
        check_bucket_access(&bucket, auth_info, Access::Read)?;
        let record = object.ok_or_else(|| Error::ObjectNotFound {
            bucket: bucket_name.to_string(),
            key: key.to_string(),
        })?;

        let total = record.content_length;
        let range = match request.header("range") {
            Some(header) => parse_range_header(header, total)?,
            None => None,
        };

        let mut response = S3Response::ok()
            .with_header("etag", quoted(&record.etag))
            .with_header("last-modified", http_date(&record.last_modified))
            .with_header("accept-ranges", "bytes")
            .with_header(
                "content-type",
                record
                    .content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream"),
            );
        for (name, value) in &record.user_metadata {
            response = response.with_header(name, value);
        }
        let length = match range {
            Some(r) => {
                response = response.with_status(StatusCode::PARTIAL_CONTENT).with_header(
                    "content-range",
                    format!("bytes {}-{}/{total}", r.start, r.end),
                );
                r.len()
            }
            None => total,
        };
        response = response.with_header("content-length", length.to_string());

        if head_only {
            return Ok(response);
        }
        let body = self.read_data(&record.location, total, range, &request.request_id);
        Ok(response.with_body(ResponseBody::Stream(body)))
    }

    pub(super) async fn object_delete(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
    ) -> Result<S3Response> {
        let bucket_name = bucket_name(request)?;
        let key = object_key(request)?;
        let bucket = self.meta.get_bucket_attributes(bucket_name).await?;
        check_bucket_access(&bucket, auth_info, Access::Write)?;
        self.remove_object(bucket_name, key, &request.request_id)
            .await?;
        Ok(S3Response::no_content())
    }

    /// Load a copy source the caller may read
    pub(super) async fn copy_source_record(
        &self,
        auth_info: &AuthInfo,
        source_bucket: &str,
        source_object: &str,
    ) -> Result<ObjectRecord> {
        let BucketAndObject { bucket, object } = self
            .meta
            .get_bucket_and_object::<ObjectRecord>(source_bucket, source_object)
            .await?;
        check_bucket_access(&bucket, auth_info, Access::Read)?;
        object.ok_or_else(|| Error::ObjectNotFound {
            bucket: source_bucket.to_string(),
            key: source_object.to_string(),
        })
    }

    pub(super) async fn object_copy(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
        source_bucket: &str,
        source_object: &str,
    ) -> Result<S3Response> {
        let bucket_name = bucket_name(request)?;
        let key = object_key(request)?;
        let replace = request
            .header("x-amz-metadata-directive")
            .is_some_and(|d| d.eq_ignore_ascii_case("REPLACE"));
        if !replace && bucket_name == source_bucket && key == source_object {
            return Err(Error::invalid_request(
                "This copy request is illegal because it is trying to copy an object to itself without changing the object's metadata",
            ));
        }

        let source = self
            .copy_source_record(auth_info, source_bucket, source_object)
            .await?;
        let bucket = self.meta.get_bucket_attributes(bucket_name).await?;
        check_bucket_access(&bucket, auth_info, Access::Write)?;

        let (user_metadata, content_type): (BTreeMap<String, String>, Option<String>) = if replace
        {
            (
                extract_user_metadata(&request.headers),
                request.header("content-type").map(str::to_string),
            )
        } else {
            (source.user_metadata.clone(), source.content_type.clone())
        };
        let backend_info = self.resolver.resolve(
            &request.headers,
            Some(&user_metadata),
            &bucket,
            request.host(),
        )?;

        let body = self.read_data(
            &source.location,
            source.content_length,
            None,
            &request.request_id,
        );
        let key_context = KeyContext {
            bucket_name: bucket_name.to_string(),
            object_key: key.to_string(),
            owner: bucket.owner.clone(),
            ..KeyContext::default()
        };
        let stored = self
            .store_data(
                body,
                source.content_length,
                &key_context,
                &backend_info,
                &request.request_id,
            )
            .await?;

        let record = ObjectRecord {
            owner: auth_info.canonical_id.clone(),
            owner_display_name: auth_info.display_name.clone(),
            content_length: stored.size,
            content_type,
            etag: stored.etag,
            last_modified: now_rfc3339(),
            user_metadata,
            location_constraint: Some(backend_info.controlling_location_constraint().to_string()),
            location: vec![stored.info],
        };
        self.replace_object(bucket_name, key, &record, &request.request_id)
            .await?;
        S3Response::xml(&CopyObjectResult {
            last_modified: record.last_modified.clone(),
            etag: quoted(&record.etag),
        })
    }
}
