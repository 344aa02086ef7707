use cairn_auth::AuthInfo;
use cairn_common::{Error, Result, USERS_BUCKET};
use cairn_meta_store::ListParams;
use cairn_s3::S3Response;
use tracing::warn;

use super::GatewayHandlers;
use crate::xml::{Bucket, Buckets, ListAllMyBucketsResult, Owner};

/// Most buckets one account may list
const MAX_LISTED_BUCKETS: usize = 10_000;

impl GatewayHandlers {
    /// Key of an account's entry in the users bucket
    pub(super) fn users_bucket_key(&self, canonical_id: &str, bucket: &str) -> String {
        format!("{canonical_id}{}{bucket}", self.meta.splitter())
    }

    pub(super) async fn service_get(&self, auth_info: &AuthInfo) -> Result<S3Response> {
        if auth_info.is_requester_public_user() {
            return Err(Error::AccessDenied);
        }
        let prefix = self.users_bucket_key(&auth_info.canonical_id, "");
        let listing = self
            .meta
            .list_object(
                USERS_BUCKET,
                ListParams {
                    prefix: Some(prefix.clone()),
                    max_keys: Some(MAX_LISTED_BUCKETS),
                    ..ListParams::default()
                },
            )
            .await?;

        let buckets = listing
            .contents
            .into_iter()
            .filter_map(|entry| {
                let name = entry.key.strip_prefix(&prefix)?.to_string();
                match serde_json::from_str::<String>(&entry.value) {
                    Ok(creation_date) => Some(Bucket {
                        name,
                        creation_date,
                    }),
                    Err(e) => {
                        warn!(key = %entry.key, error = %e, "Skipping unreadable users bucket entry");
                        None
                    }
                }
            })
            .collect();

        S3Response::xml(&ListAllMyBucketsResult {
            owner: Owner {
                id: auth_info.canonical_id.clone(),
                display_name: auth_info.display_name.clone(),
            },
            buckets: Buckets { bucket: buckets },
        })
    }
}
