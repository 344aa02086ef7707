//! In-progress multipart upload listing.
//!
//! Upload overview records live in the shadow bucket under keys of the form
//! `overview<splitter><objectKey><splitter><uploadId>`.

use serde::Serialize;

use super::{DEFAULT_MAX_KEYS, FilterResult, ListingExtension};
use crate::engine::Entry;

/// Leading component of every upload overview key
pub const OVERVIEW_PREFIX: &str = "overview";

/// One in-progress upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadEntry {
    pub key: String,
    pub upload_id: String,
    pub value: String,
}

/// One page of an upload listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadListing {
    pub uploads: Vec<UploadEntry>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_upload_id_marker: Option<String>,
    pub max_keys: usize,
    pub delimiter: Option<String>,
}

/// Collects upload overviews, optionally rolled up by delimiter
#[derive(Debug)]
pub struct MultipartUploads {
    splitter: String,
    delimiter: Option<String>,
    query_prefix_length: usize,
    keys: usize,
    listing: UploadListing,
}

impl MultipartUploads {
    pub fn new(
        splitter: impl Into<String>,
        delimiter: Option<String>,
        query_prefix_length: usize,
        max_keys: Option<usize>,
    ) -> Self {
        let delimiter = delimiter.filter(|d| !d.is_empty());
        Self {
            splitter: splitter.into(),
            listing: UploadListing {
                max_keys: max_keys.unwrap_or(DEFAULT_MAX_KEYS),
                delimiter: delimiter.clone(),
                ..UploadListing::default()
            },
            delimiter,
            query_prefix_length,
            keys: 0,
        }
    }

    /// Split an overview key into object key and upload id
    fn parse_key<'a>(&self, key: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = key
            .strip_prefix(OVERVIEW_PREFIX)?
            .strip_prefix(self.splitter.as_str())?;
        rest.rsplit_once(self.splitter.as_str())
    }

    fn add_upload(&mut self, object_key: &str, upload_id: &str, value: &str) {
        self.listing.uploads.push(UploadEntry {
            key: object_key.to_string(),
            upload_id: upload_id.to_string(),
            value: value.to_string(),
        });
        self.listing.next_key_marker = Some(object_key.to_string());
        self.listing.next_upload_id_marker = Some(upload_id.to_string());
        self.keys += 1;
    }

    fn add_common_prefix(&mut self, common_prefix: &str) -> FilterResult {
        if self.listing.common_prefixes.iter().any(|p| p == common_prefix) {
            return FilterResult::Skip;
        }
        self.listing.common_prefixes.push(common_prefix.to_string());
        self.listing.next_key_marker = Some(common_prefix.to_string());
        self.listing.next_upload_id_marker = None;
        self.keys += 1;
        FilterResult::Accept
    }
}

impl ListingExtension for MultipartUploads {
    type Output = UploadListing;

    fn filter(&mut self, entry: &Entry) -> FilterResult {
        if self.keys >= self.listing.max_keys {
            self.listing.is_truncated = true;
            return FilterResult::End;
        }
        let Some((object_key, upload_id)) = self.parse_key(&entry.key) else {
            return FilterResult::Skip;
        };

        if let Some(delimiter) = self.delimiter.clone() {
            let base = self.query_prefix_length.min(object_key.len());
            if let Some(idx) = object_key.get(base..).and_then(|tail| tail.find(&delimiter)) {
                let end = base + idx + delimiter.len();
                return self.add_common_prefix(&object_key[..end]);
            }
        }
        self.add_upload(object_key, upload_id, &entry.value);
        FilterResult::Accept
    }

    fn result(self) -> UploadListing {
        self.listing
    }
}
