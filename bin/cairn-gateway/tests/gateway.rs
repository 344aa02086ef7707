//! End-to-end tests through the router, over the in-memory metadata engine
//! and an in-memory data location

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use cairn_auth::{
    AuthError, AuthInfo, AuthOutcome, AuthRequest, Authenticator, RequestContext,
    StreamingV4Params,
};
use cairn_common::Config;
use cairn_gateway::{HEALTHCHECK_PATH, build_app_state, build_router};
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

/// Identifies callers by an `x-test-user` header; everyone else is anonymous
struct HeaderAuth;

#[async_trait]
impl Authenticator for HeaderAuth {
    fn name(&self) -> &str {
        "header"
    }

    async fn do_auth(
        &self,
        request: &AuthRequest<'_>,
        _contexts: Option<&[RequestContext]>,
    ) -> Result<AuthOutcome, AuthError> {
        let Some(user) = request
            .headers
            .get("x-test-user")
            .and_then(|v| v.to_str().ok())
        else {
            return Ok(AuthOutcome::public());
        };
        let streaming_v4_params = request.is_streaming_payload().then(|| StreamingV4Params {
            access_key: user.to_string(),
            signature_from_request: "seed".to_string(),
            region: "us-east-1".to_string(),
            scope_date: "20250101".to_string(),
            timestamp: "20250101T000000Z".to_string(),
            credential_scope: "20250101/us-east-1/s3/aws4_request".to_string(),
        });
        Ok(AuthOutcome {
            auth_info: AuthInfo::new(user, user, format!("arn:aws:iam::{user}:root")),
            authorization_results: None,
            streaming_v4_params,
        })
    }
}

async fn app() -> Router {
    let mut config = Config::default();
    config.metadata.path = PathBuf::from(":memory:");
    let state = build_app_state(&config, Arc::new(HeaderAuth))
        .await
        .unwrap();
    build_router(state)
}

struct Reply {
    status: StatusCode,
    headers: http::HeaderMap,
    body: String,
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    headers: &[(&str, &str)],
    body: impl Into<Vec<u8>>,
) -> Reply {
    let body = body.into();
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "localhost:8000")
        .header("content-length", body.len().to_string());
    if let Some(user) = user {
        builder = builder.header("x-test-user", user);
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    Reply {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

async fn create_bucket(app: &Router, name: &str, user: &str) {
    let reply = send(app, Method::PUT, &format!("/{name}"), Some(user), &[], "").await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
}

fn xml_value<'a>(xml: &'a str, tag: &str) -> &'a str {
    let open = format!("<{tag}>");
    let start = xml.find(&open).unwrap() + open.len();
    let end = xml[start..].find(&format!("</{tag}>")).unwrap();
    &xml[start..start + end]
}

#[tokio::test]
async fn test_healthcheck() {
    let app = app().await;
    let reply = send(&app, Method::GET, HEALTHCHECK_PATH, None, &[], "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.starts_with('{'));
}

#[tokio::test]
async fn test_object_lifecycle() {
    let app = app().await;
    create_bucket(&app, "photos", "alice").await;

    let reply = send(
        &app,
        Method::PUT,
        "/photos/cats/tom.txt",
        Some("alice"),
        &[("content-type", "text/plain"), ("x-amz-meta-color", "grey")],
        "hello world",
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(
        reply.headers["etag"],
        "\"5eb63bbbe01eeed093cb22bb8f5acdc3\""
    );
    assert!(reply.headers.contains_key("x-amz-request-id"));

    let reply = send(&app, Method::GET, "/photos/cats/tom.txt", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "hello world");
    assert_eq!(reply.headers["content-type"], "text/plain");
    assert_eq!(reply.headers["x-amz-meta-color"], "grey");

    let reply = send(
        &app,
        Method::GET,
        "/photos/cats/tom.txt",
        Some("alice"),
        &[("range", "bytes=6-10")],
        "",
    )
    .await;
    assert_eq!(reply.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(reply.body, "world");
    assert_eq!(reply.headers["content-range"], "bytes 6-10/11");

    let reply = send(&app, Method::HEAD, "/photos/cats/tom.txt", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["content-length"], "11");

    let reply = send(&app, Method::DELETE, "/photos/cats/tom.txt", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = send(&app, Method::GET, "/photos/cats/tom.txt", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(reply.body.contains("<Code>NoSuchKey</Code>"));
    assert!(reply.body.contains("<Resource>/photos/cats/tom.txt</Resource>"));

    let reply = send(&app, Method::DELETE, "/photos", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    let reply = send(&app, Method::HEAD, "/photos", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_listings() {
    let app = app().await;
    create_bucket(&app, "docs", "alice").await;
    create_bucket(&app, "music", "alice").await;
    create_bucket(&app, "bobs", "bob").await;
    for key in ["a.txt", "dir/b.txt", "dir/c.txt", "z.txt"] {
        let reply = send(&app, Method::PUT, &format!("/docs/{key}"), Some("alice"), &[], "x").await;
        assert_eq!(reply.status, StatusCode::OK);
    }

    let reply = send(&app, Method::GET, "/", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("<Name>docs</Name>"));
    assert!(reply.body.contains("<Name>music</Name>"));
    assert!(!reply.body.contains("<Name>bobs</Name>"));

    let reply = send(&app, Method::GET, "/docs?delimiter=/", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("<Key>a.txt</Key>"));
    assert!(reply.body.contains("<CommonPrefixes><Prefix>dir/</Prefix></CommonPrefixes>"));
    assert!(!reply.body.contains("<Key>dir/b.txt</Key>"));

    let reply = send(
        &app,
        Method::GET,
        "/docs?delimiter=/&max-keys=2",
        Some("alice"),
        &[],
        "",
    )
    .await;
    assert_eq!(xml_value(&reply.body, "IsTruncated"), "true");
    assert_eq!(xml_value(&reply.body, "NextMarker"), "dir/");
    let reply = send(
        &app,
        Method::GET,
        "/docs?delimiter=/&max-keys=2&marker=dir/",
        Some("alice"),
        &[],
        "",
    )
    .await;
    assert_eq!(xml_value(&reply.body, "IsTruncated"), "false");
    assert!(!reply.body.contains("<CommonPrefixes>"));
    assert!(reply.body.contains("<Key>z.txt</Key>"));

    let reply = send(
        &app,
        Method::GET,
        "/docs?list-type=2&max-keys=2",
        Some("alice"),
        &[],
        "",
    )
    .await;
    assert_eq!(xml_value(&reply.body, "IsTruncated"), "true");
    assert_eq!(xml_value(&reply.body, "KeyCount"), "2");
    let token = xml_value(&reply.body, "NextContinuationToken").to_string();

    let reply = send(
        &app,
        Method::GET,
        &format!("/docs?list-type=2&continuation-token={token}"),
        Some("alice"),
        &[],
        "",
    )
    .await;
    assert_eq!(xml_value(&reply.body, "IsTruncated"), "false");
    assert!(reply.body.contains("<Key>dir/c.txt</Key>"));
    assert!(reply.body.contains("<Key>z.txt</Key>"));
    assert!(!reply.body.contains("<Key>a.txt</Key>"));

    let reply = send(&app, Method::GET, "/", None, &[], "").await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_bucket_rules() {
    let app = app().await;

    let reply = send(&app, Method::PUT, "/anon", None, &[], "").await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert!(reply.body.contains("<Code>AccessDenied</Code>"));

    let reply = send(&app, Method::PUT, "/Bad_Name", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body.contains("<Code>InvalidBucketName</Code>"));

    let body = "<CreateBucketConfiguration><LocationConstraint>nowhere</LocationConstraint></CreateBucketConfiguration>";
    let reply = send(&app, Method::PUT, "/elsewhere", Some("alice"), &[], body).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body.contains("<Code>InvalidArgument</Code>"));

    let body = "<CreateBucketConfiguration><LocationConstraint>mem</LocationConstraint></CreateBucketConfiguration>";
    let reply = send(&app, Method::PUT, "/placed", Some("alice"), &[], body).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["location"], "/placed");

    let reply = send(&app, Method::PUT, "/placed", Some("bob"), &[], "").await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert!(reply.body.contains("<Code>BucketAlreadyExists</Code>"));

    let reply = send(&app, Method::PUT, "/placed/k", Some("alice"), &[], "v").await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply = send(&app, Method::DELETE, "/placed", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert!(reply.body.contains("<Code>BucketNotEmpty</Code>"));

    let reply = send(&app, Method::PUT, "/placed/k2", Some("bob"), &[], "v").await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    let reply = send(&app, Method::GET, "/placed/k", None, &[], "").await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_public_read_write_bucket() {
    let app = app().await;
    let reply = send(
        &app,
        Method::PUT,
        "/shared",
        Some("alice"),
        &[("x-amz-acl", "public-read-write")],
        "",
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = send(&app, Method::PUT, "/shared/note", None, &[], "anon").await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    let reply = send(&app, Method::GET, "/shared/note", None, &[], "").await;
    assert_eq!(reply.body, "anon");

    let reply = send(&app, Method::DELETE, "/shared", None, &[], "").await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_versioning_configuration() {
    let app = app().await;
    create_bucket(&app, "versioned", "alice").await;

    let body = "<VersioningConfiguration><Status>Enabled</Status></VersioningConfiguration>";
    let reply = send(&app, Method::PUT, "/versioned?versioning", Some("alice"), &[], body).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let reply = send(&app, Method::GET, "/versioned?versioning", Some("alice"), &[], "").await;
    assert!(reply.body.contains("<Status>Enabled</Status>"));

    let body = "<VersioningConfiguration><Status>Enabled</Status><MfaDelete>Enabled</MfaDelete></VersioningConfiguration>";
    let reply = send(&app, Method::PUT, "/versioned?versioning", Some("alice"), &[], body).await;
    assert_eq!(reply.status, StatusCode::NOT_IMPLEMENTED);

    let reply = send(&app, Method::PUT, "/versioned?versioning", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body.contains("<Code>MalformedXML</Code>"));
}

#[tokio::test]
async fn test_multipart_upload() {
    let app = app().await;
    create_bucket(&app, "big", "alice").await;

    let reply = send(&app, Method::POST, "/big/file.bin?uploads", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    let upload_id = xml_value(&reply.body, "UploadId").to_string();

    let mut etags = Vec::new();
    for (number, data) in [(1, "first-"), (2, "second")] {
        let reply = send(
            &app,
            Method::PUT,
            &format!("/big/file.bin?partNumber={number}&uploadId={upload_id}"),
            Some("alice"),
            &[],
            data,
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        etags.push(reply.headers["etag"].to_str().unwrap().to_string());
    }

    let reply = send(
        &app,
        Method::GET,
        &format!("/big/file.bin?uploadId={upload_id}"),
        Some("alice"),
        &[],
        "",
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("<PartNumber>1</PartNumber>"));
    assert!(reply.body.contains("<PartNumber>2</PartNumber>"));

    let reply = send(&app, Method::GET, "/big?uploads", Some("alice"), &[], "").await;
    assert!(reply.body.contains(&format!("<UploadId>{upload_id}</UploadId>")));

    let unordered = format!(
        "<CompleteMultipartUpload><Part><PartNumber>2</PartNumber><ETag>{}</ETag></Part><Part><PartNumber>1</PartNumber><ETag>{}</ETag></Part></CompleteMultipartUpload>",
        etags[1], etags[0]
    );
    let reply = send(
        &app,
        Method::POST,
        &format!("/big/file.bin?uploadId={upload_id}"),
        Some("alice"),
        &[],
        unordered,
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body.contains("<Code>InvalidPartOrder</Code>"));

    let complete = format!(
        "<CompleteMultipartUpload><Part><PartNumber>1</PartNumber><ETag>{}</ETag></Part><Part><PartNumber>2</PartNumber><ETag>{}</ETag></Part></CompleteMultipartUpload>",
        etags[0], etags[1]
    );
    let reply = send(
        &app,
        Method::POST,
        &format!("/big/file.bin?uploadId={upload_id}"),
        Some("alice"),
        &[],
        complete,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert!(xml_value(&reply.body, "ETag").ends_with("-2&quot;") || reply.body.contains("-2\""));

    let reply = send(&app, Method::GET, "/big/file.bin", Some("alice"), &[], "").await;
    assert_eq!(reply.body, "first-second");
    let reply = send(
        &app,
        Method::GET,
        "/big/file.bin",
        Some("alice"),
        &[("range", "bytes=4-8")],
        "",
    )
    .await;
    assert_eq!(reply.body, "t-sec");

    let reply = send(&app, Method::GET, "/big?uploads", Some("alice"), &[], "").await;
    assert!(!reply.body.contains("<UploadId>"));

    let reply = send(
        &app,
        Method::PUT,
        &format!("/big/file.bin?partNumber=1&uploadId={upload_id}"),
        Some("alice"),
        &[],
        "late",
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(reply.body.contains("<Code>NoSuchUpload</Code>"));
}

#[tokio::test]
async fn test_multipart_abort() {
    let app = app().await;
    create_bucket(&app, "big", "alice").await;
    let reply = send(&app, Method::POST, "/big/gone?uploads", Some("alice"), &[], "").await;
    let upload_id = xml_value(&reply.body, "UploadId").to_string();
    let reply = send(
        &app,
        Method::PUT,
        &format!("/big/gone?partNumber=1&uploadId={upload_id}"),
        Some("alice"),
        &[],
        "data",
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = send(
        &app,
        Method::DELETE,
        &format!("/big/gone?uploadId={upload_id}"),
        Some("alice"),
        &[],
        "",
    )
    .await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = send(
        &app,
        Method::GET,
        &format!("/big/gone?uploadId={upload_id}"),
        Some("alice"),
        &[],
        "",
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = send(&app, Method::DELETE, "/big", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_copy_object_and_part() {
    let app = app().await;
    create_bucket(&app, "src", "alice").await;
    create_bucket(&app, "dst", "alice").await;
    send(
        &app,
        Method::PUT,
        "/src/orig",
        Some("alice"),
        &[("x-amz-meta-tag", "one")],
        "0123456789",
    )
    .await;

    let reply = send(
        &app,
        Method::PUT,
        "/dst/copy",
        Some("alice"),
        &[("x-amz-copy-source", "/src/orig")],
        "",
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert!(reply.body.contains("<CopyObjectResult>"));
    let reply = send(&app, Method::GET, "/dst/copy", Some("alice"), &[], "").await;
    assert_eq!(reply.body, "0123456789");
    assert_eq!(reply.headers["x-amz-meta-tag"], "one");

    let reply = send(
        &app,
        Method::PUT,
        "/src/orig",
        Some("alice"),
        &[("x-amz-copy-source", "src/orig")],
        "",
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(
        &app,
        Method::PUT,
        "/dst/copy",
        Some("alice"),
        &[("x-amz-copy-source", "nodelimiter")],
        "",
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body.contains("<Code>InvalidArgument</Code>"));

    let reply = send(&app, Method::POST, "/dst/assembled?uploads", Some("alice"), &[], "").await;
    let upload_id = xml_value(&reply.body, "UploadId").to_string();
    let reply = send(
        &app,
        Method::PUT,
        &format!("/dst/assembled?partNumber=1&uploadId={upload_id}"),
        Some("alice"),
        &[
            ("x-amz-copy-source", "/src/orig"),
            ("x-amz-copy-source-range", "bytes=2-5"),
        ],
        "",
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert!(reply.body.contains("<CopyPartResult>"));
    let etag = xml_value(&reply.body, "ETag").replace("&quot;", "\"");
    let complete = format!(
        "<CompleteMultipartUpload><Part><PartNumber>1</PartNumber><ETag>{etag}</ETag></Part></CompleteMultipartUpload>"
    );
    let reply = send(
        &app,
        Method::POST,
        &format!("/dst/assembled?uploadId={upload_id}"),
        Some("alice"),
        &[],
        complete,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    let reply = send(&app, Method::GET, "/dst/assembled", Some("alice"), &[], "").await;
    assert_eq!(reply.body, "2345");
}

#[tokio::test]
async fn test_multi_object_delete() {
    let app = app().await;
    create_bucket(&app, "bulk", "alice").await;
    for key in ["one", "two"] {
        send(&app, Method::PUT, &format!("/bulk/{key}"), Some("alice"), &[], "x").await;
    }

    let body = "<Delete><Object><Key>one</Key></Object><Object><Key>two</Key></Object><Object><Key>missing</Key></Object></Delete>";
    let reply = send(&app, Method::POST, "/bulk?delete", Some("alice"), &[], body).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert!(reply.body.contains("<Deleted><Key>one</Key></Deleted>"));
    assert!(reply.body.contains("<Deleted><Key>missing</Key></Deleted>"));

    let reply = send(&app, Method::GET, "/bulk", Some("alice"), &[], "").await;
    assert!(!reply.body.contains("<Contents>"));

    let reply = send(&app, Method::POST, "/bulk?delete", None, &[], body).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = send(&app, Method::POST, "/bulk?delete", Some("alice"), &[], "<Delete>").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body.contains("<Code>MalformedXML</Code>"));
}

#[tokio::test]
async fn test_streaming_v4_put() {
    let app = app().await;
    create_bucket(&app, "stream", "alice").await;

    let framed = "5;chunk-signature=aaaa\r\nhello\r\n6;chunk-signature=bbbb\r\n world\r\n0;chunk-signature=cccc\r\n\r\n";
    let reply = send(
        &app,
        Method::PUT,
        "/stream/obj",
        Some("alice"),
        &[
            ("x-amz-content-sha256", "STREAMING-AWS4-HMAC-SHA256-PAYLOAD"),
            ("x-amz-decoded-content-length", "11"),
            ("content-encoding", "aws-chunked"),
        ],
        framed,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let reply = send(&app, Method::GET, "/stream/obj", Some("alice"), &[], "").await;
    assert_eq!(reply.body, "hello world");

    let reply = send(
        &app,
        Method::PUT,
        "/stream/short",
        Some("alice"),
        &[("x-amz-decoded-content-length", "99")],
        "abc",
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let reply = send(&app, Method::GET, "/stream/short", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unrouted_methods() {
    let app = app().await;
    let reply = send(&app, Method::PATCH, "/bucket", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);

    create_bucket(&app, "acl", "alice").await;
    let reply = send(&app, Method::GET, "/acl?acl", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_metadata_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.metadata.path = dir.path().join("meta").join("cairn.redb");

    {
        let app = build_router(
            build_app_state(&config, Arc::new(HeaderAuth))
                .await
                .unwrap(),
        );
        create_bucket(&app, "durable", "alice").await;
    }

    let app = build_router(
        build_app_state(&config, Arc::new(HeaderAuth))
            .await
            .unwrap(),
    );
    let reply = send(&app, Method::GET, "/", Some("alice"), &[], "").await;
    assert!(reply.body.contains("<Name>durable</Name>"));
    let reply = send(&app, Method::PUT, "/durable", Some("alice"), &[], "").await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
}
