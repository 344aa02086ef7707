//! Authorization context builder

use cairn_auth::RequestContext;
use http::HeaderMap;
use std::collections::BTreeMap;

use crate::api::ApiMethod;
use crate::request::S3Request;

/// Lowercased header map carried by contexts
pub fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

fn context(
    request: &S3Request,
    headers: &BTreeMap<String, String>,
    api_method: ApiMethod,
    bucket: Option<String>,
    key: Option<String>,
) -> RequestContext {
    RequestContext::new(
        headers.clone(),
        request.query.clone(),
        bucket,
        key,
        request.source_ip,
        request.encrypted,
        api_method.as_str(),
    )
}

/// Build the contexts the authorizer decides for `method`.
///
/// `None` means authorization happens inside the handler. Copy operations
/// get the source read first and the destination write second.
pub fn prepare_request_contexts(
    method: ApiMethod,
    request: &S3Request,
    source_bucket: Option<&str>,
    source_object: Option<&str>,
) -> Option<Vec<RequestContext>> {
    if method.defers_authorization() {
        return None;
    }
    let headers = header_map(&request.headers);
    if method.is_copy() {
        return Some(vec![
            context(
                request,
                &headers,
                ApiMethod::ObjectGet,
                source_bucket.map(str::to_string),
                source_object.map(str::to_string),
            ),
            context(
                request,
                &headers,
                ApiMethod::ObjectPut,
                request.bucket.clone(),
                request.key.clone(),
            ),
        ]);
    }
    Some(vec![context(
        request,
        &headers,
        method,
        request.bucket.clone(),
        request.key.clone(),
    )])
}
