//! Request body buffering

use axum::body::Body;
use cairn_common::{Error, Result};
use futures::StreamExt;
use http::Method;
use tracing::{debug, error};

/// Ceiling for POST bodies
pub const MAX_POST_LENGTH: u64 = 1024 * 1024;

/// Ceiling for every other buffered body
pub const MAX_BODY_LENGTH: u64 = 512 * 1024;

pub fn max_body_length(method: &Method) -> u64 {
    if method == Method::POST {
        MAX_POST_LENGTH
    } else {
        MAX_BODY_LENGTH
    }
}

/// Read a whole body into a string.
///
/// Chunks past `max` are dropped but still counted, so an oversized body is
/// drained and rejected once it ends.
pub async fn buffer_body(body: Body, max: u64) -> Result<String> {
    let mut stream = body.into_data_stream();
    let mut buffered = Vec::new();
    let mut length: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            error!(error = %e, "Failed to read request body");
            Error::internal(format!("body read failed: {e}"))
        })?;
        length += chunk.len() as u64;
        if length <= max {
            buffered.extend_from_slice(&chunk);
        }
    }
    if length > max {
        debug!(length, max, "Request body over the limit");
        return Err(Error::RequestBodyTooLarge { length, max });
    }
    Ok(String::from_utf8_lossy(&buffered).into_owned())
}
