//! Normalized inbound request

use axum::body::Body;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use http::{HeaderMap, Method, Uri};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Live request body handed to streaming handlers
pub type BodyStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// One S3 request, addressed path-style
pub struct S3Request {
    pub method: Method,
    /// Raw (still percent-encoded) path, as signed by the client
    pub path: String,
    pub raw_query: Option<String>,
    pub query: BTreeMap<String, String>,
    pub headers: HeaderMap,
    pub bucket: Option<String>,
    pub key: Option<String>,
    pub source_ip: Option<IpAddr>,
    pub encrypted: bool,
    pub request_id: String,
    /// Buffered body, filled in by the dispatcher
    pub post: String,
    /// Locked so the request stays `Sync` while handlers borrow it
    body: Mutex<Option<Body>>,
}

impl S3Request {
    pub fn new(method: Method, uri: &Uri, headers: HeaderMap, body: Body) -> Self {
        let path = uri.path().to_string();
        let raw_query = uri.query().map(str::to_string);
        let query = raw_query.as_deref().map(parse_query).unwrap_or_default();
        let (bucket, key) = split_path(&path);
        Self {
            method,
            path,
            raw_query,
            query,
            headers,
            bucket,
            key,
            source_ip: None,
            encrypted: false,
            request_id: String::new(),
            post: String::new(),
            body: Mutex::new(Some(body)),
        }
    }

    #[must_use]
    pub const fn with_source_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.source_ip = ip;
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    #[must_use]
    pub const fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Header value as text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn has_query(&self, name: &str) -> bool {
        self.query.contains_key(name)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Host without port
    pub fn host(&self) -> &str {
        let host = self.header("host").unwrap_or_default();
        match host.strip_prefix('[') {
            Some(rest) => rest.split_once(']').map_or(host, |(addr, _)| addr),
            None => host.split(':').next().unwrap_or(host),
        }
    }

    /// Take the body; later calls get an empty body
    pub fn take_body(&mut self) -> Body {
        self.body.get_mut().take().unwrap_or_else(Body::empty)
    }

    /// Take the body as a byte stream
    pub fn take_body_stream(&mut self) -> BodyStream {
        self.take_body()
            .into_data_stream()
            .map_err(std::io::Error::other)
            .boxed()
    }

    /// Resource path for error bodies
    pub fn resource(&self) -> String {
        match (&self.bucket, &self.key) {
            (Some(bucket), Some(key)) => format!("/{bucket}/{key}"),
            (Some(bucket), None) => format!("/{bucket}"),
            _ => "/".to_string(),
        }
    }
}

fn decode(s: &str) -> String {
    let plus_as_space = s.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(plus_as_space.as_bytes())).into_owned()
}

/// Parse a query string; valueless parameters map to ""
pub fn parse_query(raw: &str) -> BTreeMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode(k), decode(v)),
            None => (decode(pair), String::new()),
        })
        .collect()
}

/// Split `/bucket/key...` into its decoded parts
pub fn split_path(path: &str) -> (Option<String>, Option<String>) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let (bucket, key) = match trimmed.split_once('/') {
        Some((bucket, key)) => (bucket, Some(key)),
        None => (trimmed, None),
    };
    let decode_path = |s: &str| {
        String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned()
    };
    let bucket = (!bucket.is_empty()).then(|| decode_path(bucket));
    let key = key.filter(|k| !k.is_empty()).map(decode_path);
    (bucket, key)
}
