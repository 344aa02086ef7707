//! Cairn Metadata Store
//!
//! Bucket and object metadata over an embedded ordered key-value engine.
//!
//! - [`KvEngine`]: the engine contract, with redb and in-memory engines
//! - [`MetadataBackend`]: bucket records, object records and listings
//! - [`listing`]: delimiter and multipart-upload listing extensions

pub mod backend;
pub mod engine;
pub mod listing;
pub mod memory;
pub mod redb_engine;

pub use backend::{
    BootstrapRole, BucketAndObject, ListParams, METASTORE, MetadataBackend, MpuListParams,
};
pub use engine::{EngineError, Entry, EntryStream, KvEngine, RangeOptions, Sublevel};
pub use listing::{ListEntry, ObjectListing, UploadEntry, UploadListing, advance_last_char};
pub use memory::MemoryEngine;
pub use redb_engine::RedbEngine;
