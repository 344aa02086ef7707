//! S3 responses and XML error bodies

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use cairn_common::Error;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use quick_xml::se::to_string as to_xml;
use serde::Serialize;
use tracing::error;

use crate::request::BodyStream;

pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Request id header set on every response
pub const REQUEST_ID_HEADER: &str = "x-amz-request-id";

/// Serialize a document with the XML declaration prepended
pub fn xml_document<T: Serialize>(value: &T) -> Result<String, Error> {
    to_xml(value)
        .map(|xml| format!("{XML_DECLARATION}{xml}"))
        .map_err(|e| {
            error!(error = %e, "Failed to serialize XML response");
            Error::internal(format!("xml serialization failed: {e}"))
        })
}

pub enum ResponseBody {
    Empty,
    Xml(String),
    Bytes(Bytes),
    Stream(BodyStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Xml(xml) => f.debug_tuple("Xml").field(xml).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Handler output
#[derive(Debug)]
pub struct S3Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl S3Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    /// 200 with a serialized XML document
    pub fn xml<T: Serialize>(value: &T) -> Result<Self, Error> {
        let mut response = Self::ok();
        response.body = ResponseBody::Xml(xml_document(value)?);
        Ok(response)
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    /// Add a header; values that are not valid header text are dropped
    #[must_use]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_ref().as_bytes()),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        }
        self
    }
}

impl IntoResponse for S3Response {
    fn into_response(self) -> Response {
        let mut headers = self.headers;
        let body = match self.body {
            ResponseBody::Empty => Body::empty(),
            ResponseBody::Xml(xml) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
                Body::from(xml)
            }
            ResponseBody::Bytes(bytes) => {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
                Body::from(bytes)
            }
            ResponseBody::Stream(stream) => Body::from_stream(stream),
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}

#[derive(Debug, Serialize)]
#[serde(rename = "Error")]
struct ErrorBody {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: String,
    #[serde(rename = "Resource")]
    #[serde(skip_serializing_if = "Option::is_none")]
    resource: Option<String>,
    #[serde(rename = "RequestId")]
    request_id: String,
}

/// An error rendered as an S3 XML error document
pub struct ErrorResponse {
    pub error: Error,
    pub resource: Option<String>,
    pub request_id: String,
}

impl ErrorResponse {
    pub fn new(error: Error, resource: Option<String>, request_id: impl Into<String>) -> Self {
        Self {
            error,
            resource,
            request_id: request_id.into(),
        }
    }

    pub fn xml(&self) -> String {
        let body = ErrorBody {
            code: self.error.s3_error_code().to_string(),
            message: self.error.public_message(),
            resource: self.resource.clone(),
            request_id: self.request_id.clone(),
        };
        format!("{XML_DECLARATION}{}", to_xml(&body).unwrap_or_default())
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = Response::new(Body::from(self.xml()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        if let Ok(id) = HeaderValue::from_str(&self.request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, id);
        }
        response
    }
}
