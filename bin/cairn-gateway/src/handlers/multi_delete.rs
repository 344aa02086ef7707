use cairn_auth::AuthInfo;
use cairn_common::{Error, Result};
use cairn_s3::{S3Request, S3Response};
use tracing::debug;

use super::{Access, GatewayHandlers, bucket_name, check_bucket_access};
use crate::xml::{DeleteError, DeleteRequest, DeleteResult, DeletedObject};

/// Most keys one request may name
const MAX_DELETE_KEYS: usize = 1000;

impl GatewayHandlers {
    pub(super) async fn multi_object_delete(
        &self,
        auth_info: &AuthInfo,
        request: &S3Request,
    ) -> Result<S3Response> {
        if auth_info.is_requester_public_user() {
            return Err(Error::AccessDenied);
        }
        let name = bucket_name(request)?;
        let bucket = self.meta.get_bucket_attributes(name).await?;
        check_bucket_access(&bucket, auth_info, Access::Write)?;

        let parsed: DeleteRequest =
            quick_xml::de::from_str(&request.post).map_err(|_| Error::MalformedXml)?;
        if parsed.objects.is_empty() || parsed.objects.len() > MAX_DELETE_KEYS {
            return Err(Error::MalformedXml);
        }

        let mut result = DeleteResult {
            deleted: Vec::new(),
            errors: Vec::new(),
        };
        for object in parsed.objects {
            match self
                .remove_object(name, &object.key, &request.request_id)
                .await
            {
                Ok(()) if parsed.quiet => {}
                Ok(()) => result.deleted.push(DeletedObject { key: object.key }),
                Err(e) => {
                    debug!(bucket = %name, key = %object.key, error = %e, "Delete failed");
                    result.errors.push(DeleteError {
                        key: object.key,
                        code: e.s3_error_code().to_string(),
                        message: e.public_message(),
                    });
                }
            }
        }
        S3Response::xml(&result)
    }
}
