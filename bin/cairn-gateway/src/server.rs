//! HTTP surface: request normalization, routing into the dispatcher and
//! error rendering

use axum::{
    Json, Router,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use cairn_common::Error;
use cairn_placement::{BackendHealth, DataGateway};
use cairn_s3::response::REQUEST_ID_HEADER;
use cairn_s3::{Dispatcher, ErrorResponse, InterimResponder, S3Request, select_route};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};
use uuid::Uuid;

/// Path of the backend healthcheck
pub const HEALTHCHECK_PATH: &str = "/_/healthcheck";

/// Shared state for all handlers
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub data: Arc<DataGateway>,
    /// Host suffixes answered as static websites
    pub website_endpoints: Vec<String>,
}

impl AppState {
    fn is_website_host(&self, host: &str) -> bool {
        self.website_endpoints.iter().any(|endpoint| {
            host == endpoint
                || host
                    .strip_suffix(endpoint.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }
}

/// hyper answers `Expect: 100-continue` itself on the first body read, so
/// this only records the decision
pub struct LoggingInterim;

impl InterimResponder for LoggingInterim {
    fn write_continue(&self, request_id: &str) {
        debug!(request_id = %request_id, "Continuing with request body");
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(HEALTHCHECK_PATH, get(healthcheck))
        .fallback(handle_s3)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Probe every data backend; 503 when any probe failed
async fn healthcheck(State(state): State<Arc<AppState>>) -> Response {
    let report = state.data.healthcheck(&new_request_id()).await;
    let status = if report
        .values()
        .any(|health| matches!(health, BackendHealth::Failed { .. }))
    {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(report)).into_response()
}

async fn handle_s3(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let request_id = new_request_id();
    let source_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let (parts, body) = request.into_parts();
    let s3_request = S3Request::new(parts.method, &parts.uri, parts.headers, body)
        .with_source_ip(source_ip)
        .with_request_id(&request_id);
    let resource = s3_request.resource();

    state.dispatcher.pre_auth_continue(&s3_request);
    let result = match select_route(&s3_request, state.is_website_host(s3_request.host())) {
        Ok(method) => {
            debug!(method = %method, resource = %resource, request_id = %request_id, "Routed");
            state.dispatcher.call_api_method(method, s3_request).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => response
            .with_header(REQUEST_ID_HEADER, &request_id)
            .into_response(),
        Err(e) => {
            if matches!(e, Error::Internal(_)) {
                error!(resource = %resource, request_id = %request_id, error = %e, "Request failed");
            } else {
                debug!(resource = %resource, request_id = %request_id, error = %e, "Request rejected");
            }
            ErrorResponse::new(e, Some(resource), request_id).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_auth::{AuthError, AuthOutcome, AuthRequest, Authenticator, RequestContext};
    use cairn_common::config::DataConfig;
    use cairn_s3::{ApiHandlers, ApiMethod, S3Response};

    struct NoAuth;

    #[async_trait::async_trait]
    impl Authenticator for NoAuth {
        fn name(&self) -> &str {
            "none"
        }

        async fn do_auth(
            &self,
            _request: &AuthRequest<'_>,
            _contexts: Option<&[RequestContext]>,
        ) -> Result<AuthOutcome, AuthError> {
            Ok(AuthOutcome::public())
        }
    }

    struct NoHandlers;

    #[async_trait::async_trait]
    impl ApiHandlers for NoHandlers {
        async fn bypass(&self, m: ApiMethod, _r: S3Request) -> cairn_common::Result<S3Response> {
            Err(Error::not_implemented(m.as_str()))
        }

        async fn standard(
            &self,
            m: ApiMethod,
            _a: &cairn_auth::AuthInfo,
            _r: S3Request,
        ) -> cairn_common::Result<S3Response> {
            Err(Error::not_implemented(m.as_str()))
        }

        async fn bucket_put(
            &self,
            _a: &cairn_auth::AuthInfo,
            _r: S3Request,
            _lc: Option<String>,
        ) -> cairn_common::Result<S3Response> {
            Err(Error::not_implemented("bucketPut"))
        }

        async fn copy(
            &self,
            m: ApiMethod,
            _a: &cairn_auth::AuthInfo,
            _r: S3Request,
            _b: String,
            _o: String,
        ) -> cairn_common::Result<S3Response> {
            Err(Error::not_implemented(m.as_str()))
        }

        async fn streaming(
            &self,
            m: ApiMethod,
            _a: &cairn_auth::AuthInfo,
            _r: S3Request,
            _body: cairn_s3::BodyStream,
            _p: Option<cairn_auth::StreamingV4Params>,
        ) -> cairn_common::Result<S3Response> {
            Err(Error::not_implemented(m.as_str()))
        }
    }

    fn state(website_endpoints: &[&str]) -> AppState {
        AppState {
            dispatcher: Dispatcher::new(
                Arc::new(NoAuth),
                Arc::new(NoHandlers),
                Arc::new(LoggingInterim),
            ),
            data: Arc::new(DataGateway::from_config(&DataConfig::default()).unwrap()),
            website_endpoints: website_endpoints.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn test_website_host_matching() {
        let state = state(&["s3-website.example.com"]);
        assert!(state.is_website_host("s3-website.example.com"));
        assert!(state.is_website_host("blog.s3-website.example.com"));
        assert!(!state.is_website_host("evil-s3-website.example.com"));
        assert!(!state.is_website_host("s3.example.com"));
    }
}
