//! Request dispatch
//!
//! Every routed request passes through [`Dispatcher::call_api_method`]:
//! authentication and authorization, the continue handshake, body
//! ingestion and pre-checks, then exactly one handler call.

use cairn_auth::{AuthRequest, Authenticator};
use cairn_common::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{ApiMethod, BodyCheck};
use crate::body::{buffer_body, max_body_length};
use crate::checks::{check_bucket_put, check_bucket_versioning};
use crate::contexts::prepare_request_contexts;
use crate::copy_source::parse_copy_source;
use crate::expect::{InterimResponder, should_continue};
use crate::handlers::ApiHandlers;
use crate::request::S3Request;
use crate::response::S3Response;

pub struct Dispatcher {
    authenticator: Arc<dyn Authenticator>,
    handlers: Arc<dyn ApiHandlers>,
    interim: Arc<dyn InterimResponder>,
}

impl Dispatcher {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        handlers: Arc<dyn ApiHandlers>,
        interim: Arc<dyn InterimResponder>,
    ) -> Self {
        Self {
            authenticator,
            handlers,
            interim,
        }
    }

    /// Continue check made before authentication, from protocol hints only
    pub fn pre_auth_continue(&self, request: &S3Request) {
        if should_continue(&request.headers, &request.query, None) {
            self.interim.write_continue(&request.request_id);
        }
    }

    pub async fn call_api_method(
        &self,
        method: ApiMethod,
        mut request: S3Request,
    ) -> Result<S3Response> {
        if method.is_bypass() {
            debug!(method = %method, "Bypassing authentication");
            return self.handlers.bypass(method, request).await;
        }

        let source = if method.is_copy() {
            Some(parse_copy_source(request.header("x-amz-copy-source"))?)
        } else {
            None
        };

        let contexts = prepare_request_contexts(
            method,
            &request,
            source.as_ref().map(|(b, _)| b.as_str()),
            source.as_ref().map(|(_, o)| o.as_str()),
        );

        let method_name = request.method.as_str().to_string();
        let auth_request = AuthRequest::new(&method_name, &request.path, &request.headers)
            .with_query(request.raw_query.as_deref())
            .with_source_ip(request.source_ip);
        let outcome = self
            .authenticator
            .do_auth(&auth_request, contexts.as_deref())
            .await
            .map_err(Error::from)?;

        if let Some(denied) = outcome.first_denial() {
            warn!(
                method = %method,
                action = %denied.action,
                resource = %denied.resource,
                requester = %outcome.auth_info.canonical_id,
                "Request denied"
            );
            return Err(Error::AccessDenied);
        }
        let auth_info = outcome.auth_info;

        if should_continue(&request.headers, &request.query, Some(&auth_info)) {
            self.interim.write_continue(&request.request_id);
        }

        if method.is_streaming() {
            let body = request.take_body_stream();
            return self
                .handlers
                .streaming(method, &auth_info, request, body, outcome.streaming_v4_params)
                .await;
        }

        let max = max_body_length(&request.method);
        request.post = buffer_body(request.take_body(), max).await?;
        debug!(method = %method, length = request.post.len(), "Body buffered");

        match BodyCheck::for_method(method) {
            BodyCheck::Versioning => {
                check_bucket_versioning(&request.post)?;
            }
            BodyCheck::CreateBucket => {
                let constraint = check_bucket_put(&request.post)?;
                return self.handlers.bucket_put(&auth_info, request, constraint).await;
            }
            BodyCheck::None => {}
        }

        if let Some((source_bucket, source_object)) = source {
            return self
                .handlers
                .copy(method, &auth_info, request, source_bucket, source_object)
                .await;
        }
        self.handlers.standard(method, &auth_info, request).await
    }
}
