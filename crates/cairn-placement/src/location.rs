//! Location-constraint resolution
//!
//! Decides which configured data location controls a write. An explicit
//! object-level constraint wins over the bucket's constraint, which wins
//! over the default location mapped to the request's endpoint host.

use cairn_common::config::DataConfig;
use cairn_common::{BucketInfo, Error, Result};
use http::HeaderMap;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Header (and user-metadata key) carrying an object-level constraint
pub const OBJECT_LOCATION_CONSTRAINT_HEADER: &str = "x-amz-meta-cairn-location-constraint";

/// Placement inputs of one request and the constraint they resolve to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    object_location_constraint: Option<String>,
    bucket_location_constraint: Option<String>,
    request_endpoint: String,
    controlling: String,
}

impl BackendInfo {
    /// Whether the inputs name a usable location.
    ///
    /// Only the highest-precedence input present is checked.
    pub fn is_valid_controlling_backend_param(
        object_location_constraint: Option<&str>,
        bucket_location_constraint: Option<&str>,
        request_endpoint: &str,
        locations: &BTreeSet<String>,
        rest_endpoints: &BTreeMap<String, String>,
    ) -> bool {
        if let Some(object_lc) = object_location_constraint {
            if locations.contains(object_lc) {
                return true;
            }
            debug!(location = %object_lc, "Object location constraint is not configured");
            return false;
        }
        if let Some(bucket_lc) = bucket_location_constraint {
            if locations.contains(bucket_lc) {
                return true;
            }
            debug!(location = %bucket_lc, "Bucket location constraint is not configured");
            return false;
        }
        match rest_endpoints.get(request_endpoint) {
            Some(location) if locations.contains(location) => true,
            Some(location) => {
                debug!(
                    endpoint = %request_endpoint,
                    location = %location,
                    "Endpoint maps to an unconfigured location"
                );
                false
            }
            None => {
                debug!(endpoint = %request_endpoint, "Request endpoint is not configured");
                false
            }
        }
    }

    fn new(
        object_location_constraint: Option<String>,
        bucket_location_constraint: Option<String>,
        request_endpoint: String,
        rest_endpoints: &BTreeMap<String, String>,
    ) -> Self {
        let controlling = object_location_constraint
            .clone()
            .or_else(|| bucket_location_constraint.clone())
            .or_else(|| rest_endpoints.get(&request_endpoint).cloned())
            .unwrap_or_default();
        Self {
            object_location_constraint,
            bucket_location_constraint,
            request_endpoint,
            controlling,
        }
    }

    /// Fixed placement onto one location
    pub fn fixed(location: impl Into<String>) -> Self {
        Self {
            object_location_constraint: None,
            bucket_location_constraint: None,
            request_endpoint: String::new(),
            controlling: location.into(),
        }
    }

    pub fn object_location_constraint(&self) -> Option<&str> {
        self.object_location_constraint.as_deref()
    }

    pub fn bucket_location_constraint(&self) -> Option<&str> {
        self.bucket_location_constraint.as_deref()
    }

    pub fn request_endpoint(&self) -> &str {
        &self.request_endpoint
    }

    /// The location that receives the data
    pub fn controlling_location_constraint(&self) -> &str {
        &self.controlling
    }
}

#[derive(Debug, Clone)]
enum Mode {
    /// Everything goes to one backend; no checks
    Legacy(String),
    PerLocation {
        locations: BTreeSet<String>,
        rest_endpoints: BTreeMap<String, String>,
    },
}

/// Resolves the controlling location for writes
#[derive(Debug, Clone)]
pub struct LocationResolver {
    mode: Mode,
}

impl LocationResolver {
    /// Build from the data configuration
    pub fn from_config(config: &DataConfig) -> Self {
        let mode = match &config.legacy_backend {
            Some(backend) => Mode::Legacy(backend.clone()),
            None => Mode::PerLocation {
                locations: config.locations.keys().cloned().collect(),
                rest_endpoints: config.rest_endpoints.clone(),
            },
        };
        Self { mode }
    }

    pub const fn is_legacy(&self) -> bool {
        matches!(self.mode, Mode::Legacy(_))
    }

    /// Whether `name` is a configured location
    pub fn is_location(&self, name: &str) -> bool {
        match &self.mode {
            Mode::Legacy(backend) => backend == name,
            Mode::PerLocation { locations, .. } => locations.contains(name),
        }
    }

    /// Default location mapped to an endpoint host
    pub fn endpoint_location(&self, endpoint: &str) -> Option<&str> {
        match &self.mode {
            Mode::Legacy(_) => None,
            Mode::PerLocation { rest_endpoints, .. } => {
                rest_endpoints.get(endpoint).map(String::as_str)
            }
        }
    }

    /// Resolve placement for a write into `bucket`.
    ///
    /// With `meta_headers` (copy with replaced metadata) the object
    /// constraint comes only from them, otherwise from the request headers.
    pub fn resolve(
        &self,
        headers: &HeaderMap,
        meta_headers: Option<&BTreeMap<String, String>>,
        bucket: &BucketInfo,
        request_endpoint: &str,
    ) -> Result<BackendInfo> {
        let (locations, rest_endpoints) = match &self.mode {
            Mode::Legacy(backend) => return Ok(BackendInfo::fixed(backend.clone())),
            Mode::PerLocation {
                locations,
                rest_endpoints,
            } => (locations, rest_endpoints),
        };

        let object_lc = match meta_headers {
            Some(meta) => meta.get(OBJECT_LOCATION_CONSTRAINT_HEADER).cloned(),
            None => headers
                .get(OBJECT_LOCATION_CONSTRAINT_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        };
        let bucket_lc = bucket.location_constraint.clone();

        if !BackendInfo::is_valid_controlling_backend_param(
            object_lc.as_deref(),
            bucket_lc.as_deref(),
            request_endpoint,
            locations,
            rest_endpoints,
        ) {
            return Err(Error::invalid_argument(
                "location constraint does not name a configured location",
            ));
        }

        Ok(BackendInfo::new(
            object_lc,
            bucket_lc,
            request_endpoint.to_string(),
            rest_endpoints,
        ))
    }
}

/// Strip the port from a `Host` header value
pub fn endpoint_from_host(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // [v6]:port
        return rest.split_once(']').map_or(host, |(addr, _)| addr);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}
