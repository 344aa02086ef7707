//! Multipart uploads
//!
//! Upload state lives in a shadow bucket named `mpuShadowBucket<bucket>`:
//!
//! - `overview<sp><key><sp><uploadId>` holds the upload overview
//! - `<uploadId><sp><partNumber>` holds one part record, the part number
//!   zero-padded so parts list in order

use cairn_auth::AuthInfo;
use cairn_common::{
    BucketInfo, DataRetrievalInfo, Error, MPU_SHADOW_BUCKET_PREFIX, ObjectRecord, Result,
    now_rfc3339,
};
use cairn_meta_store::listing::OVERVIEW_PREFIX;
use cairn_meta_store::{ListParams, MpuListParams, UploadListing};
use cairn_placement::{BackendInfo, KeyContext};
use cairn_s3::{BodyStream, S3Request, S3Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::object::parse_range_header;
use super::{
    Access, GatewayHandlers, bucket_name, check_bucket_access, declared_length,
    extract_user_metadata, object_key, page_size, quoted, unquoted,
};
use crate::xml::{
    CommonPrefix, CompleteMultipartUpload, CompleteMultipartUploadResult, CopyPartResult,
    InitiateMultipartUploadResult, ListMultipartUploadsResult, ListPartsResult, Owner, PartItem,
    UploadItem,
};

const MAX_PART_NUMBER: u32 = 10_000;

/// Stored state of an in-progress upload
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UploadOverview {
    key: String,
    upload_id: String,
    initiator: String,
    initiator_display_name: String,
    initiated: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    user_metadata: BTreeMap<String, String>,
    location_constraint: String,
}

/// Stored record of one uploaded part
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PartRecord {
    part_number: u32,
    etag: String,
    size: u64,
    last_modified: String,
    location: DataRetrievalInfo,
}

fn shadow_bucket(bucket: &str) -> String {
    format!("{MPU_SHADOW_BUCKET_PREFIX}{bucket}")
}

fn part_number(request: &S3Request) -> Result<u32> {
    request
        .query_param("partNumber")
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|n| (1..=MAX_PART_NUMBER).contains(n))
        .ok_or_else(|| {
            Error::invalid_argument(format!(
                "Part number must be an integer between 1 and {MAX_PART_NUMBER}, inclusive"
            ))
        })
}

fn upload_id(request: &S3Request) -> Result<&str> {
    request
        .query_param("uploadId")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::invalid_argument("missing uploadId"))
}

/// Multipart ETag: MD5 over the binary part MD5s, suffixed with the count
fn multipart_etag(part_etags: &[&str]) -> Result<String> {
    let mut digest = md5::Context::new();
    for etag in part_etags {
        let raw = hex::decode(etag).map_err(|_| Error::internal("stored part etag is not hex"))?;
        digest.consume(raw);
    }
    Ok(format!("{:x}-{}", digest.compute(), part_etags.len()))
}

impl GatewayHandlers {
    fn overview_key(&self, key: &str, upload_id: &str) -> String {
        let sp = self.meta.splitter();
        format!("{OVERVIEW_PREFIX}{sp}{key}{sp}{upload_id}")
    }

    fn part_key(&self, upload_id: &str, part_number: u32) -> String {
        format!("{upload_id}{}{part_number:05}", self.meta.splitter())
    }

    async fn load_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<UploadOverview> {
        self.meta
            .get_object(&shadow_bucket(bucket), &self.overview_key(key, upload_id))
            .await
            .map_err(|e| match e {
                Error::BucketNotFound(_) | Error::ObjectNotFound { .. } => Error::NoSuchUpload {
                    upload_id: upload_id.to_string(),
                },
                other => other,
            })
    }

    /// Part records of an upload, ordered by part number
    async fn stored_parts(
        &self,
        bucket: &str,
        upload_id: &str,
        marker: Option<u32>,
        max_parts: usize,
    ) -> Result<(Vec<PartRecord>, bool)> {
        let shadow = shadow_bucket(bucket);
        let listing = self
            .meta
            .list_object(
                &shadow,
                ListParams {
                    prefix: Some(format!("{upload_id}{}", self.meta.splitter())),
                    marker: marker.map(|n| self.part_key(upload_id, n)),
                    delimiter: None,
                    max_keys: Some(max_parts),
                },
            )
            .await?;
        let parts = listing
            .contents
            .iter()
            .map(|entry| {
                serde_json::from_str::<PartRecord>(&entry.value).map_err(|e| {
                    warn!(key = %entry.key, error = %e, "Unreadable part record");
                    Error::internal("unreadable part record")
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((parts, listing.is_truncated))
    }

    /// Drop an upload's part keys and overview
    async fn remove_upload_records(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> Result<()> {
        let shadow = shadow_bucket(bucket);
        for part in parts {
            self.meta
                .delete_object(&shadow, &self.part_key(upload_id, part.part_number))
                .await?;
        }
        self.meta
            .delete_object(&shadow, &self.overview_key(key, upload_id))
            .await
    }

    /// Delete a bucket's shadow bucket with the data of every stored part
    pub(super) async fn purge_shadow_bucket(&self, bucket: &str, request_id: &str) -> Result<()> {
        let shadow = shadow_bucket(bucket);
        let listing = match self
            .meta
            .list_object(
                &shadow,
                ListParams {
                    max_keys: Some(usize::MAX),
                    ..ListParams::default()
                },
            )
            .await
        {
            Ok(listing) => listing,
            Err(Error::BucketNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let overview_prefix = format!("{OVERVIEW_PREFIX}{}", self.meta.splitter());
        let locations: Vec<DataRetrievalInfo> = listing
            .contents
            .iter()
            .filter(|entry| !entry.key.starts_with(&overview_prefix))
            .filter_map(|entry| serde_json::from_str::<PartRecord>(&entry.value).ok())
            .map(|part| part.location)
            .collect();
        self.delete_data(&locations, request_id).await;
        self.meta.delete_bucket(&shadow).await?;
        debug!(bucket = %bucket, parts = locations.len(), "Shadow bucket purged");
        Ok(())
    }

    pub(super) async fn initiate_multipart_upload(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
    ) -> Result<S3Response> {
        let name = bucket_name(request)?;
        let key = object_key(request)?;
        let bucket = self.meta.get_bucket_attributes(name).await?;
        check_bucket_access(&bucket, auth_info, Access::Write)?;

        let backend_info = self
            .resolver
            .resolve(&request.headers, None, &bucket, request.host())?;

        let shadow = shadow_bucket(name);
        let shadow_info = BucketInfo::new(
            &shadow,
            &bucket.owner,
            &bucket.owner_display_name,
            now_rfc3339(),
        );
        match self.meta.create_bucket(&shadow, &shadow_info).await {
            Ok(()) | Err(Error::BucketAlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }

        let upload_id = Uuid::new_v4().simple().to_string();
        let overview = UploadOverview {
            key: key.to_string(),
            upload_id: upload_id.clone(),
            initiator: auth_info.canonical_id.clone(),
            initiator_display_name: auth_info.display_name.clone(),
            initiated: now_rfc3339(),
            content_type: request.header("content-type").map(str::to_string),
            user_metadata: extract_user_metadata(&request.headers),
            location_constraint: backend_info.controlling_location_constraint().to_string(),
        };
        self.meta
            .put_object(&shadow, &self.overview_key(key, &upload_id), &overview)
            .await?;

        debug!(bucket = %name, key = %key, upload_id = %upload_id, "Multipart upload initiated");
        S3Response::xml(&InitiateMultipartUploadResult {
            bucket: name.to_string(),
            key: key.to_string(),
            upload_id,
        })
    }

    /// Store one part's data and record, replacing any earlier upload of
    /// the same part number
    async fn write_part(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
        body: BodyStream,
        size: u64,
    ) -> Result<PartRecord> {
        let name = bucket_name(request)?;
        let key = object_key(request)?;
        let part_number = part_number(request)?;
        let upload_id = upload_id(request)?;
        let bucket = self.meta.get_bucket_attributes(name).await?;
        check_bucket_access(&bucket, auth_info, Access::Write)?;
        let overview = self.load_upload(name, key, upload_id).await?;

        let key_context = KeyContext {
            bucket_name: name.to_string(),
            object_key: key.to_string(),
            owner: bucket.owner.clone(),
            part_number: Some(part_number),
            upload_id: Some(upload_id.to_string()),
        };
        let backend_info = BackendInfo::fixed(overview.location_constraint);
        let stored = self
            .store_data(body, size, &key_context, &backend_info, &request.request_id)
            .await?;

        let shadow = shadow_bucket(name);
        let part_key = self.part_key(upload_id, part_number);
        let previous = self
            .meta
            .get_bucket_and_object::<PartRecord>(&shadow, &part_key)
            .await?
            .object;
        let record = PartRecord {
            part_number,
            etag: stored.etag,
            size: stored.size,
            last_modified: now_rfc3339(),
            location: stored.info,
        };
        if let Err(e) = self.meta.put_object(&shadow, &part_key, &record).await {
            self.delete_data(std::slice::from_ref(&record.location), &request.request_id)
                .await;
            return Err(e);
        }
        if let Some(previous) = previous {
            self.delete_data(std::slice::from_ref(&previous.location), &request.request_id)
                .await;
        }
        Ok(record)
    }

    pub(super) async fn object_put_part(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
        body: BodyStream,
    ) -> Result<S3Response> {
        let size = declared_length(request)?;
        let part = self.write_part(auth_info, request, body, size).await?;
        Ok(S3Response::ok().with_header("etag", quoted(&part.etag)))
    }

    pub(super) async fn object_put_copy_part(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
        source_bucket: &str,
        source_object: &str,
    ) -> Result<S3Response> {
        let source = self
            .copy_source_record(auth_info, source_bucket, source_object)
            .await?;
        let range = match request.header("x-amz-copy-source-range") {
            Some(header) => Some(
                parse_range_header(header, source.content_length)?
                    .ok_or_else(|| Error::invalid_argument("invalid x-amz-copy-source-range"))?,
            ),
            None => None,
        };
        let size = range.map_or(source.content_length, |r| r.len());
        let body = self.read_data(
            &source.location,
            source.content_length,
            range,
            &request.request_id,
        );
        let part = self.write_part(auth_info, request, body, size).await?;
        S3Response::xml(&CopyPartResult {
            last_modified: part.last_modified,
            etag: quoted(&part.etag),
        })
    }

    pub(super) async fn complete_multipart_upload(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
    ) -> Result<S3Response> {
        let name = bucket_name(request)?;
        let key = object_key(request)?;
        let upload_id = upload_id(request)?;
        let bucket = self.meta.get_bucket_attributes(name).await?;
        check_bucket_access(&bucket, auth_info, Access::Write)?;
        let overview = self.load_upload(name, key, upload_id).await?;

        let requested: CompleteMultipartUpload =
            quick_xml::de::from_str(&request.post).map_err(|_| Error::MalformedXml)?;
        if requested.parts.is_empty() {
            return Err(Error::MalformedXml);
        }
        if requested
            .parts
            .windows(2)
            .any(|w| w[0].part_number >= w[1].part_number)
        {
            return Err(Error::InvalidPartOrder);
        }

        let (stored, _) = self
            .stored_parts(name, upload_id, None, MAX_PART_NUMBER as usize)
            .await?;
        let mut by_number: BTreeMap<u32, &PartRecord> =
            stored.iter().map(|p| (p.part_number, p)).collect();

        let mut location = Vec::with_capacity(requested.parts.len());
        let mut etags = Vec::with_capacity(requested.parts.len());
        let mut offset = 0;
        for wanted in &requested.parts {
            let part = by_number
                .remove(&wanted.part_number)
                .filter(|p| p.etag == unquoted(&wanted.etag))
                .ok_or(Error::InvalidPart {
                    part_number: wanted.part_number,
                })?;
            location.push(DataRetrievalInfo {
                size: Some(part.size),
                start: Some(offset),
                ..part.location.clone()
            });
            etags.push(part.etag.as_str());
            offset += part.size;
        }
        let unused: Vec<DataRetrievalInfo> =
            by_number.values().map(|p| p.location.clone()).collect();

        let record = ObjectRecord {
            owner: overview.initiator.clone(),
            owner_display_name: overview.initiator_display_name.clone(),
            content_length: offset,
            content_type: overview.content_type.clone(),
            etag: multipart_etag(&etags)?,
            last_modified: now_rfc3339(),
            user_metadata: overview.user_metadata.clone(),
            location_constraint: Some(overview.location_constraint.clone()),
            location,
        };
        self.replace_object(name, key, &record, &request.request_id)
            .await?;
        self.delete_data(&unused, &request.request_id).await;
        self.remove_upload_records(name, key, upload_id, &stored)
            .await?;

        info!(
            bucket = %name,
            key = %key,
            upload_id = %upload_id,
            parts = requested.parts.len(),
            size = offset,
            "Multipart upload completed"
        );
        S3Response::xml(&CompleteMultipartUploadResult {
            location: format!("/{name}/{key}"),
            bucket: name.to_string(),
            key: key.to_string(),
            etag: quoted(&record.etag),
        })
    }

    /// Abort an upload
    pub(super) async fn multipart_delete(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
    ) -> Result<S3Response> {
        let name = bucket_name(request)?;
        let key = object_key(request)?;
        let upload_id = upload_id(request)?;
        let bucket = self.meta.get_bucket_attributes(name).await?;
        check_bucket_access(&bucket, auth_info, Access::Write)?;
        self.load_upload(name, key, upload_id).await?;

        let (stored, _) = self
            .stored_parts(name, upload_id, None, MAX_PART_NUMBER as usize)
            .await?;
        let locations: Vec<DataRetrievalInfo> =
            stored.iter().map(|p| p.location.clone()).collect();
        self.delete_data(&locations, &request.request_id).await;
        self.remove_upload_records(name, key, upload_id, &stored)
            .await?;
        debug!(bucket = %name, key = %key, upload_id = %upload_id, "Multipart upload aborted");
        Ok(S3Response::no_content())
    }

    pub(super) async fn list_parts(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
    ) -> Result<S3Response> {
        let name = bucket_name(request)?;
        let key = object_key(request)?;
        let upload_id = upload_id(request)?;
        let bucket = self.meta.get_bucket_attributes(name).await?;
        check_bucket_access(&bucket, auth_info, Access::Read)?;
        let overview = self.load_upload(name, key, upload_id).await?;

        let max_parts = page_size(request, "max-parts")?;
        let marker = match request.query_param("part-number-marker") {
            Some(raw) => Some(
                raw.parse::<u32>()
                    .map_err(|_| Error::invalid_argument("invalid part-number-marker"))?,
            ),
            None => None,
        };
        let (parts, is_truncated) = self
            .stored_parts(name, upload_id, marker, max_parts)
            .await?;

        let initiator = || Owner {
            id: overview.initiator.clone(),
            display_name: overview.initiator_display_name.clone(),
        };
        S3Response::xml(&ListPartsResult {
            bucket: name.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            initiator: initiator(),
            owner: initiator(),
            storage_class: "STANDARD".to_string(),
            part_number_marker: marker.unwrap_or(0),
            next_part_number_marker: parts
                .last()
                .map(|p| p.part_number)
                .filter(|_| is_truncated),
            max_parts,
            is_truncated,
            parts: parts
                .into_iter()
                .map(|p| PartItem {
                    part_number: p.part_number,
                    last_modified: p.last_modified,
                    etag: quoted(&p.etag),
                    size: p.size,
                })
                .collect(),
        })
    }

    pub(super) async fn list_multipart_uploads(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
    ) -> Result<S3Response> {
        let name = bucket_name(request)?;
        let bucket = self.meta.get_bucket_attributes(name).await?;
        check_bucket_access(&bucket, auth_info, Access::Read)?;

        let prefix = request.query_param("prefix").unwrap_or_default().to_string();
        let key_marker = request.query_param("key-marker").unwrap_or_default().to_string();
        let upload_id_marker = request
            .query_param("upload-id-marker")
            .unwrap_or_default()
            .to_string();
        let delimiter = request
            .query_param("delimiter")
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let max_uploads = page_size(request, "max-uploads")?;
        let splitter = self.meta.splitter().to_string();

        let params = MpuListParams {
            query_prefix_length: prefix.len(),
            prefix: Some(prefix.clone()),
            key_marker: Some(key_marker.clone()),
            upload_id_marker: Some(upload_id_marker.clone()),
            delimiter: delimiter.clone(),
            max_keys: Some(max_uploads),
            splitter,
        };
        let listing = match self
            .meta
            .list_multipart_uploads(&shadow_bucket(name), params)
            .await
        {
            Ok(listing) => listing,
            Err(Error::BucketNotFound(_)) => UploadListing {
                max_keys: max_uploads,
                delimiter: delimiter.clone(),
                ..UploadListing::default()
            },
            Err(e) => return Err(e),
        };

        let mut uploads = Vec::with_capacity(listing.uploads.len());
        for entry in listing.uploads {
            let overview: UploadOverview = serde_json::from_str(&entry.value).map_err(|e| {
                warn!(upload_id = %entry.upload_id, error = %e, "Unreadable upload overview");
                Error::internal("unreadable upload overview")
            })?;
            let initiator = Owner {
                id: overview.initiator.clone(),
                display_name: overview.initiator_display_name.clone(),
            };
            uploads.push(UploadItem {
                key: entry.key,
                upload_id: entry.upload_id,
                owner: Owner {
                    id: overview.initiator,
                    display_name: overview.initiator_display_name,
                },
                initiator,
                storage_class: "STANDARD".to_string(),
                initiated: overview.initiated,
            });
        }

        S3Response::xml(&ListMultipartUploadsResult {
            bucket: name.to_string(),
            key_marker,
            upload_id_marker,
            next_key_marker: listing.next_key_marker,
            next_upload_id_marker: listing.next_upload_id_marker,
            prefix,
            delimiter,
            max_uploads,
            is_truncated: listing.is_truncated,
            uploads,
            common_prefixes: listing
                .common_prefixes
                .into_iter()
                .map(|prefix| CommonPrefix { prefix })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_etag() {
        // md5("") and md5("a")
        let etag = multipart_etag(&[
            "d41d8cd98f00b204e9800998ecf8427e",
            "0cc175b9c0f1b6a831c399e269772661",
        ])
        .unwrap();
        let mut raw = hex::decode("d41d8cd98f00b204e9800998ecf8427e").unwrap();
        raw.extend(hex::decode("0cc175b9c0f1b6a831c399e269772661").unwrap());
        assert_eq!(etag, format!("{:x}-2", md5::compute(raw)));
    }

    #[test]
    fn test_part_number_bounds() {
        use axum::body::Body;
        use http::{HeaderMap, Method, Uri};

        let request = |query: &str| {
            let uri: Uri = format!("/b/k?uploadId=u&{query}").parse().unwrap();
            S3Request::new(Method::PUT, &uri, HeaderMap::new(), Body::empty())
        };
        assert_eq!(part_number(&request("partNumber=1")), Ok(1));
        assert_eq!(part_number(&request("partNumber=10000")), Ok(10_000));
        assert!(part_number(&request("partNumber=0")).is_err());
        assert!(part_number(&request("partNumber=10001")).is_err());
        assert!(part_number(&request("partNumber=x")).is_err());
        assert_eq!(upload_id(&request("partNumber=1")), Ok("u"));
    }
}
