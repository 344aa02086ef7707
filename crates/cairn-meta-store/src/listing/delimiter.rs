//! Prefix/delimiter object listing.

use serde::Serialize;

use super::{DEFAULT_MAX_KEYS, FilterResult, ListingExtension};
use crate::engine::Entry;

/// One listed object: key plus its raw metadata record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub key: String,
    pub value: String,
}

/// One page of an object listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectListing {
    pub common_prefixes: Vec<String>,
    pub contents: Vec<ListEntry>,
    pub is_truncated: bool,
    /// Set only when truncated with a delimiter
    pub next_marker: Option<String>,
    pub delimiter: Option<String>,
}

impl ObjectListing {
    /// Marker for the following page, if any
    #[must_use]
    pub fn continuation_marker(&self) -> Option<&str> {
        if !self.is_truncated {
            return None;
        }
        self.next_marker
            .as_deref()
            .or_else(|| self.contents.last().map(|c| c.key.as_str()))
    }
}

/// Groups keys sharing a delimiter-terminated prefix
#[derive(Debug)]
pub struct Delimiter {
    prefix: Option<String>,
    delimiter: Option<String>,
    max_keys: usize,
    /// Marker the page started after
    marker: Option<String>,
    next_marker: Option<String>,
    keys: usize,
    listing: ObjectListing,
}

impl Delimiter {
    pub fn new(
        prefix: Option<String>,
        marker: Option<String>,
        delimiter: Option<String>,
        max_keys: Option<usize>,
    ) -> Self {
        let delimiter = delimiter.filter(|d| !d.is_empty());
        let marker = marker.filter(|m| !m.is_empty());
        Self {
            prefix: prefix.filter(|p| !p.is_empty()),
            listing: ObjectListing {
                delimiter: delimiter.clone(),
                ..ObjectListing::default()
            },
            delimiter,
            max_keys: max_keys.unwrap_or(DEFAULT_MAX_KEYS),
            next_marker: marker.clone(),
            marker,
            keys: 0,
        }
    }

    fn reached_max_keys(&mut self) -> bool {
        if self.keys >= self.max_keys {
            self.listing.is_truncated = true;
            return true;
        }
        false
    }

    fn add_contents(&mut self, entry: &Entry) -> FilterResult {
        if self.reached_max_keys() {
            return FilterResult::End;
        }
        self.listing.contents.push(ListEntry {
            key: entry.key.clone(),
            value: entry.value.clone(),
        });
        self.next_marker = Some(entry.key.clone());
        self.keys += 1;
        FilterResult::Accept
    }

    fn add_common_prefix(&mut self, common_prefix: &str) -> FilterResult {
        // a page ending on a common prefix hands it back as the marker
        if self.marker.as_deref() == Some(common_prefix)
            || self.listing.common_prefixes.iter().any(|p| p == common_prefix)
        {
            return FilterResult::Skip;
        }
        if self.reached_max_keys() {
            return FilterResult::End;
        }
        self.listing.common_prefixes.push(common_prefix.to_string());
        self.next_marker = Some(common_prefix.to_string());
        self.keys += 1;
        FilterResult::Accept
    }
}

impl ListingExtension for Delimiter {
    type Output = ObjectListing;

    fn filter(&mut self, entry: &Entry) -> FilterResult {
        let key = entry.key.as_str();
        if let Some(prefix) = &self.prefix
            && !key.starts_with(prefix.as_str())
        {
            return FilterResult::Skip;
        }
        if let Some(marker) = &self.next_marker
            && key <= marker.as_str()
        {
            return FilterResult::Skip;
        }

        let Some(delimiter) = self.delimiter.as_deref() else {
            return self.add_contents(entry);
        };
        let base = self.prefix.as_ref().map_or(0, String::len);
        match key[base..].find(delimiter) {
            Some(idx) => {
                let end = base + idx + delimiter.len();
                let common_prefix = key[..end].to_string();
                self.add_common_prefix(&common_prefix)
            }
            None => self.add_contents(entry),
        }
    }

    fn result(mut self) -> ObjectListing {
        if self.listing.is_truncated && self.delimiter.is_some() {
            self.listing.next_marker = self.next_marker;
        }
        self.listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ext: Delimiter, keys: &[&str]) -> ObjectListing {
        let mut ext = ext;
        for key in keys {
            if ext.filter(&Entry::new(*key, "{}")) == FilterResult::End {
                break;
            }
        }
        ext.result()
    }

    fn content_keys(listing: &ObjectListing) -> Vec<&str> {
        listing.contents.iter().map(|c| c.key.as_str()).collect()
    }

    #[test]
    fn test_plain_listing() {
        let listing = run(Delimiter::new(None, None, None, None), &["a", "b", "c"]);
        assert_eq!(content_keys(&listing), vec!["a", "b", "c"]);
        assert!(!listing.is_truncated);
        assert!(listing.next_marker.is_none());
    }

    #[test]
    fn test_common_prefixes_rolled_up() {
        let keys = ["photos/2024/a.jpg", "photos/2024/b.jpg", "photos/2025/c.jpg", "photos/x.jpg"];
        let listing = run(
            Delimiter::new(Some("photos/".into()), None, Some("/".into()), None),
            &keys,
        );
        assert_eq!(listing.common_prefixes, vec!["photos/2024/", "photos/2025/"]);
        assert_eq!(content_keys(&listing), vec!["photos/x.jpg"]);
        assert_eq!(listing.delimiter.as_deref(), Some("/"));
    }

    #[test]
    fn test_marker_skips() {
        let listing = run(
            Delimiter::new(None, Some("b".into()), None, None),
            &["a", "b", "c"],
        );
        assert_eq!(content_keys(&listing), vec!["c"]);
    }

    #[test]
    fn test_truncation_without_delimiter() {
        let listing = run(Delimiter::new(None, None, None, Some(2)), &["a", "b", "c"]);
        assert_eq!(content_keys(&listing), vec!["a", "b"]);
        assert!(listing.is_truncated);
        assert!(listing.next_marker.is_none());
        assert_eq!(listing.continuation_marker(), Some("b"));
    }

    #[test]
    fn test_truncation_with_delimiter_sets_next_marker() {
        let listing = run(
            Delimiter::new(None, None, Some("/".into()), Some(2)),
            &["a/1", "a/2", "b/1", "c"],
        );
        assert_eq!(listing.common_prefixes, vec!["a/", "b/"]);
        assert!(listing.is_truncated);
        assert_eq!(listing.next_marker.as_deref(), Some("b/"));
    }

    #[test]
    fn test_delimiter_pages_do_not_repeat_prefixes() {
        let keys = ["a/1", "a/2", "b/1", "b/2", "c"];
        let page = |marker: Option<String>| {
            let remaining: Vec<&str> = keys
                .iter()
                .copied()
                .filter(|k| marker.as_deref().is_none_or(|m| *k > m))
                .collect();
            run(
                Delimiter::new(None, marker, Some("/".into()), Some(1)),
                &remaining,
            )
        };

        let first = page(None);
        assert_eq!(first.common_prefixes, vec!["a/"]);
        assert_eq!(first.next_marker.as_deref(), Some("a/"));

        let second = page(first.next_marker.clone());
        assert_eq!(second.common_prefixes, vec!["b/"]);
        assert!(second.contents.is_empty());
        assert_eq!(second.next_marker.as_deref(), Some("b/"));

        let third = page(second.next_marker.clone());
        assert!(third.common_prefixes.is_empty());
        assert_eq!(content_keys(&third), vec!["c"]);
        assert!(!third.is_truncated);
    }

    #[test]
    fn test_exact_page_is_not_truncated() {
        let listing = run(Delimiter::new(None, None, None, Some(2)), &["a", "b"]);
        assert!(!listing.is_truncated);
    }

    #[test]
    fn test_zero_max_keys() {
        let listing = run(Delimiter::new(None, None, None, Some(0)), &["a"]);
        assert!(listing.contents.is_empty());
        assert!(listing.is_truncated);
    }
}
