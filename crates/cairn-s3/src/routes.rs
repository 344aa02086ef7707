//! Verb and query to operation mapping

use cairn_common::{Error, Result};
use http::Method;

use crate::api::ApiMethod;
use crate::request::S3Request;

/// Pick the operation for a request.
///
/// `is_website` is set when the host is a website endpoint; GET and HEAD
/// then go to the website pair.
pub fn select_route(request: &S3Request, is_website: bool) -> Result<ApiMethod> {
    let has_bucket = request.bucket.is_some();
    let has_key = request.key.is_some();
    let q = |name: &str| request.has_query(name);

    let method = &request.method;
    if method == Method::OPTIONS {
        return Ok(ApiMethod::CorsPreflight);
    }
    if is_website {
        if method == Method::GET {
            return Ok(ApiMethod::WebsiteGet);
        }
        if method == Method::HEAD {
            return Ok(ApiMethod::WebsiteHead);
        }
    }

    let route = match *method {
        Method::GET => {
            if !has_bucket {
                ApiMethod::ServiceGet
            } else if has_key {
                if q("acl") {
                    ApiMethod::ObjectGetAcl
                } else if q("uploadId") {
                    ApiMethod::ListParts
                } else {
                    ApiMethod::ObjectGet
                }
            } else if q("acl") {
                ApiMethod::BucketGetAcl
            } else if q("cors") {
                ApiMethod::BucketGetCors
            } else if q("website") {
                ApiMethod::BucketGetWebsite
            } else if q("versioning") {
                ApiMethod::BucketGetVersioning
            } else if q("uploads") {
                ApiMethod::ListMultipartUploads
            } else {
                ApiMethod::BucketGet
            }
        }
        Method::HEAD if has_key => ApiMethod::ObjectHead,
        Method::HEAD if has_bucket => ApiMethod::BucketHead,
        Method::PUT if has_key => {
            let copy = request.header("x-amz-copy-source").is_some();
            if q("partNumber") && q("uploadId") {
                if copy {
                    ApiMethod::ObjectPutCopyPart
                } else {
                    ApiMethod::ObjectPutPart
                }
            } else if q("acl") {
                ApiMethod::ObjectPutAcl
            } else if copy {
                ApiMethod::ObjectCopy
            } else {
                ApiMethod::ObjectPut
            }
        }
        Method::PUT if has_bucket => {
            if q("acl") {
                ApiMethod::BucketPutAcl
            } else if q("cors") {
                ApiMethod::BucketPutCors
            } else if q("website") {
                ApiMethod::BucketPutWebsite
            } else if q("versioning") {
                ApiMethod::BucketPutVersioning
            } else {
                ApiMethod::BucketPut
            }
        }
        Method::DELETE if has_key => {
            if q("uploadId") {
                ApiMethod::MultipartDelete
            } else {
                ApiMethod::ObjectDelete
            }
        }
        Method::DELETE if has_bucket => {
            if q("cors") {
                ApiMethod::BucketDeleteCors
            } else if q("website") {
                ApiMethod::BucketDeleteWebsite
            } else {
                ApiMethod::BucketDelete
            }
        }
        Method::POST => return route_post(request),
        _ => return Err(Error::MethodNotAllowed),
    };
    Ok(route)
}

fn route_post(request: &S3Request) -> Result<ApiMethod> {
    let q = |name: &str| request.has_query(name);
    if q("delete") && request.bucket.is_none() {
        return Err(Error::MethodNotAllowed);
    }
    if (q("uploads") || q("uploadId")) && request.key.is_none() {
        return Err(Error::InvalidUri);
    }
    if q("uploads") {
        Ok(ApiMethod::InitiateMultipartUpload)
    } else if q("uploadId") {
        Ok(ApiMethod::CompleteMultipartUpload)
    } else if q("delete") {
        Ok(ApiMethod::MultiObjectDelete)
    } else {
        Err(Error::not_implemented("POST operation"))
    }
}
