//! Listing extensions
//!
//! A listing extension consumes ordered entries from a range scan and
//! accumulates one page of results. It tells the scan loop whether to keep
//! the entry, skip it, or stop reading altogether.

mod delimiter;
mod mpu;

pub use delimiter::{Delimiter, ListEntry, ObjectListing};
pub use mpu::{MultipartUploads, OVERVIEW_PREFIX, UploadEntry, UploadListing};

use crate::engine::Entry;

/// Default page size for listings
pub const DEFAULT_MAX_KEYS: usize = 1000;

/// Verdict of a listing extension on one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    Accept,
    Skip,
    /// Stop the scan; the page is complete
    End,
}

/// Stateful filter/accumulator over ordered scan entries
pub trait ListingExtension: Send {
    type Output;

    fn filter(&mut self, entry: &Entry) -> FilterResult;

    fn result(self) -> Self::Output;
}

/// Increment the code point of the last character.
///
/// Used to turn a prefix into the exclusive upper bound of its key range.
/// Returns `None` when there is no such bound.
#[must_use]
pub fn advance_last_char(s: &str) -> Option<String> {
    let mut chars = s.chars();
    let last = chars.next_back()?;
    let next = match last as u32 + 1 {
        0xD800..=0xDFFF => '\u{E000}',
        cp => char::from_u32(cp)?,
    };
    let mut out = String::with_capacity(s.len() + 1);
    out.push_str(chars.as_str());
    out.push(next);
    Some(out)
}
