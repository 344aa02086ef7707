//! Operation handler contract

use async_trait::async_trait;
use cairn_auth::{AuthInfo, StreamingV4Params};
use cairn_common::Result;

use crate::api::ApiMethod;
use crate::request::{BodyStream, S3Request};
use crate::response::S3Response;

/// Operation handlers, one entry point per argument shape
#[async_trait]
pub trait ApiHandlers: Send + Sync {
    /// Unauthenticated operations (website and CORS preflight)
    async fn bypass(&self, method: ApiMethod, request: S3Request) -> Result<S3Response>;

    /// Operations that take identity and request; `request.post` holds the
    /// buffered body
    async fn standard(
        &self,
        method: ApiMethod,
        auth_info: &AuthInfo,
        request: S3Request,
    ) -> Result<S3Response>;

    /// Bucket creation with the location constraint parsed from the body
    async fn bucket_put(
        &self,
        auth_info: &AuthInfo,
        request: S3Request,
        location_constraint: Option<String>,
    ) -> Result<S3Response>;

    async fn copy(
        &self,
        method: ApiMethod,
        auth_info: &AuthInfo,
        request: S3Request,
        source_bucket: String,
        source_object: String,
    ) -> Result<S3Response>;

    /// Object and part uploads, fed the live body
    async fn streaming(
        &self,
        method: ApiMethod,
        auth_info: &AuthInfo,
        request: S3Request,
        body: BodyStream,
        streaming_v4_params: Option<StreamingV4Params>,
    ) -> Result<S3Response>;
}
