//! Bucket operations

use cairn_auth::AuthInfo;
use cairn_common::{
    BucketInfo, DEFAULT_CANNED_ACL, Error, MfaDelete, ObjectRecord, Result, USERS_BUCKET,
    now_rfc3339, validate_bucket_name,
};
use cairn_meta_store::ListParams;
use cairn_s3::{S3Request, S3Response, checks::check_bucket_versioning};
use tracing::{info, warn};

use super::{
    Access, GatewayHandlers, bucket_name, check_bucket_access, check_grant_headers, page_size,
    quoted,
};
use crate::xml::{
    CommonPrefix, ListBucketResult, ObjectContent, Owner, VersioningConfigurationResult,
};

const CANNED_ACLS: &[&str] = &[
    "private",
    "public-read",
    "public-read-write",
    "authenticated-read",
    "bucket-owner-read",
    "bucket-owner-full-control",
    "log-delivery-write",
];

impl GatewayHandlers {
    pub(super) async fn create_bucket(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
        location_constraint: Option<String>,
    ) -> Result<S3Response> {
        if auth_info.is_requester_public_user() {
            return Err(Error::AccessDenied);
        }
        let name = bucket_name(request)?;
        validate_bucket_name(name).map_err(Error::InvalidBucketName)?;
        check_grant_headers(&request.headers)?;

        let canned_acl = request.header("x-amz-acl").unwrap_or(DEFAULT_CANNED_ACL);
        if !CANNED_ACLS.contains(&canned_acl) {
            return Err(Error::invalid_argument(format!("invalid canned ACL {canned_acl}")));
        }

        let location_constraint = match location_constraint {
            Some(lc) if !self.resolver.is_legacy() && !self.resolver.is_location(&lc) => {
                return Err(Error::invalid_argument(format!(
                    "{lc} is not a valid location constraint"
                )));
            }
            Some(lc) => Some(lc),
            None => self
                .resolver
                .endpoint_location(request.host())
                .map(str::to_string),
        };

        let info = BucketInfo::new(
            name,
            &auth_info.canonical_id,
            &auth_info.display_name,
            now_rfc3339(),
        )
        .with_location_constraint(location_constraint)
        .with_canned_acl(canned_acl);
        self.meta.create_bucket(name, &info).await?;
        self.meta
            .put_object(
                USERS_BUCKET,
                &self.users_bucket_key(&auth_info.canonical_id, name),
                &info.creation_date,
            )
            .await?;

        info!(
            bucket = %name,
            owner = %auth_info.canonical_id,
            location = ?info.location_constraint,
            "Bucket created"
        );
        Ok(S3Response::ok().with_header("location", format!("/{name}")))
    }

    pub(super) async fn bucket_head(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
    ) -> Result<S3Response> {
        let bucket = self
            .meta
            .get_bucket_attributes(bucket_name(request)?)
            .await?;
        check_bucket_access(&bucket, auth_info, Access::Read)?;
        Ok(S3Response::ok())
    }

    /// List objects, v1 or v2 (`list-type=2`)
    pub(super) async fn bucket_get(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
    ) -> Result<S3Response> {
        let name = bucket_name(request)?;
        let bucket = self.meta.get_bucket_attributes(name).await?;
        check_bucket_access(&bucket, auth_info, Access::Read)?;

        let v2 = request.query_param("list-type") == Some("2");
        let prefix = request.query_param("prefix").unwrap_or_default().to_string();
        let delimiter = request
            .query_param("delimiter")
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let max_keys = page_size(request, "max-keys")?;
        let continuation_token = request.query_param("continuation-token").map(str::to_string);
        let start_after = request.query_param("start-after").map(str::to_string);
        let marker = if v2 {
            continuation_token.clone().or_else(|| start_after.clone())
        } else {
            request.query_param("marker").map(str::to_string)
        };

        let listing = self
            .meta
            .list_object(
                name,
                ListParams {
                    prefix: Some(prefix.clone()),
                    marker: marker.clone(),
                    delimiter: delimiter.clone(),
                    max_keys: Some(max_keys),
                },
            )
            .await?;
        let next = listing.continuation_marker().map(str::to_string);

        let mut contents = Vec::with_capacity(listing.contents.len());
        for entry in listing.contents {
            let record: ObjectRecord = serde_json::from_str(&entry.value).map_err(|e| {
                warn!(bucket = %name, key = %entry.key, error = %e, "Unreadable object record");
                Error::internal("unreadable object record")
            })?;
            contents.push(ObjectContent {
                key: entry.key,
                last_modified: record.last_modified,
                etag: quoted(&record.etag),
                size: record.content_length,
                owner: Owner {
                    id: record.owner,
                    display_name: record.owner_display_name,
                },
                storage_class: "STANDARD".to_string(),
            });
        }
        let common_prefixes: Vec<CommonPrefix> = listing
            .common_prefixes
            .into_iter()
            .map(|prefix| CommonPrefix { prefix })
            .collect();

        let mut result = ListBucketResult {
            name: name.to_string(),
            prefix,
            marker: None,
            next_marker: None,
            start_after: None,
            continuation_token: None,
            next_continuation_token: None,
            key_count: None,
            delimiter,
            max_keys,
            is_truncated: listing.is_truncated,
            contents,
            common_prefixes,
        };
        if v2 {
            result.key_count = Some(result.contents.len() + result.common_prefixes.len());
            result.continuation_token = continuation_token;
            result.start_after = start_after;
            result.next_continuation_token = next;
        } else {
            result.marker = Some(marker.unwrap_or_default());
            // NextMarker is only defined for delimited v1 listings
            result.next_marker = next.filter(|_| result.delimiter.is_some());
        }
        S3Response::xml(&result)
    }

    pub(super) async fn bucket_delete(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
    ) -> Result<S3Response> {
        let name = bucket_name(request)?;
        let bucket = self.meta.get_bucket_attributes(name).await?;
        check_bucket_access(&bucket, auth_info, Access::Owner)?;

        let listing = self
            .meta
            .list_object(
                name,
                ListParams {
                    max_keys: Some(1),
                    ..ListParams::default()
                },
            )
            .await?;
        if !listing.contents.is_empty() || !listing.common_prefixes.is_empty() {
            return Err(Error::BucketNotEmpty(name.to_string()));
        }

        self.purge_shadow_bucket(name, &request.request_id).await?;
        self.meta.delete_bucket(name).await?;
        if let Err(e) = self
            .meta
            .delete_object(USERS_BUCKET, &self.users_bucket_key(&bucket.owner, name))
            .await
        {
            warn!(bucket = %name, error = %e, "Failed to remove users bucket entry");
        }
        info!(bucket = %name, "Bucket deleted");
        Ok(S3Response::no_content())
    }

    pub(super) async fn bucket_get_versioning(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
    ) -> Result<S3Response> {
        let bucket = self
            .meta
            .get_bucket_attributes(bucket_name(request)?)
            .await?;
        check_bucket_access(&bucket, auth_info, Access::Owner)?;

        let config = bucket.versioning_configuration.as_ref();
        S3Response::xml(&VersioningConfigurationResult {
            status: config.map(|c| c.status.as_str().to_string()),
            mfa_delete: config.and_then(|c| c.mfa_delete).map(|m| {
                match m {
                    MfaDelete::Enabled => "Enabled",
                    MfaDelete::Disabled => "Disabled",
                }
                .to_string()
            }),
        })
    }

    pub(super) async fn bucket_put_versioning(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
    ) -> Result<S3Response> {
        let name = bucket_name(request)?;
        let mut bucket = self.meta.get_bucket_attributes(name).await?;
        check_bucket_access(&bucket, auth_info, Access::Owner)?;

        bucket.versioning_configuration = Some(check_bucket_versioning(&request.post)?);
        self.meta.put_bucket_attributes(name, &bucket).await?;
        Ok(S3Response::ok())
    }
}
