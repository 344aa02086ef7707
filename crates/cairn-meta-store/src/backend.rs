//! Bucket and object metadata over a [`KvEngine`].
//!
//! Bucket attribute records live in the reserved `__metastore` namespace,
//! keyed by bucket name. Every bucket also owns a namespace of its own
//! holding object records keyed by object name.

use cairn_common::{BucketInfo, Error, Result, USERS_BUCKET, now_rfc3339};
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::engine::{EngineError, KvEngine, RangeOptions, Sublevel};
use crate::listing::{
    Delimiter, FilterResult, ListingExtension, MultipartUploads, OVERVIEW_PREFIX, ObjectListing,
    UploadListing, advance_last_char,
};

/// Namespace holding bucket attribute records
pub const METASTORE: &str = "__metastore";

/// Owner of the synthetic users bucket
const USERS_BUCKET_OWNER: &str = "admin";

/// Whether this instance performs the bootstrap writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapRole {
    Owner,
    Member,
}

/// Parameters of an object listing
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub delimiter: Option<String>,
    pub max_keys: Option<usize>,
}

/// Parameters of an upload listing
#[derive(Debug, Clone, Default)]
pub struct MpuListParams {
    pub prefix: Option<String>,
    pub key_marker: Option<String>,
    pub upload_id_marker: Option<String>,
    pub delimiter: Option<String>,
    pub max_keys: Option<usize>,
    /// Length of the query prefix; delimiter search starts there
    pub query_prefix_length: usize,
    pub splitter: String,
}

/// A bucket record together with an optional object record
#[derive(Debug, Clone)]
pub struct BucketAndObject<T> {
    pub bucket: BucketInfo,
    pub object: Option<T>,
}

/// Metadata backend
pub struct MetadataBackend {
    engine: Arc<dyn KvEngine>,
    metastore: Sublevel,
    splitter: String,
}

impl MetadataBackend {
    /// Open the backend, bootstrapping the users bucket when `role` is `Owner`
    pub async fn open(
        engine: Arc<dyn KvEngine>,
        role: BootstrapRole,
        splitter: impl Into<String>,
    ) -> Result<Self> {
        let metastore = Sublevel::open(Arc::clone(&engine), METASTORE)
            .await
            .map_err(|e| engine_failure("open metastore", METASTORE, &e))?;
        let backend = Self {
            engine,
            metastore,
            splitter: splitter.into(),
        };

        if role == BootstrapRole::Owner {
            backend.bootstrap_users_bucket().await?;
        }
        info!(
            engine = backend.engine.name(),
            role = ?role,
            "Metadata backend ready"
        );
        Ok(backend)
    }

    async fn bootstrap_users_bucket(&self) -> Result<()> {
        self.engine
            .open_sub(USERS_BUCKET)
            .await
            .map_err(|e| engine_failure("open users bucket", USERS_BUCKET, &e))?;

        match self.metastore.get(USERS_BUCKET).await {
            Ok(_) => {
                debug!("Users bucket record already present");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                let record = BucketInfo::new(
                    USERS_BUCKET,
                    USERS_BUCKET_OWNER,
                    USERS_BUCKET_OWNER,
                    now_rfc3339(),
                );
                self.write_bucket_record(USERS_BUCKET, &record).await
            }
            Err(e) => Err(engine_failure("read users bucket", USERS_BUCKET, &e)),
        }
    }

    /// Key separator used by composite keys
    pub fn splitter(&self) -> &str {
        &self.splitter
    }

    /// Create a bucket: refuse if a record exists, then open the bucket's
    /// namespace and write its record.
    ///
    /// The two steps are not atomic. A crash between them leaves an empty
    /// namespace with no record, which a later create overwrites.
    pub async fn create_bucket(&self, name: &str, info: &BucketInfo) -> Result<()> {
        match self.metastore.get(name).await {
            Ok(_) => return Err(Error::BucketAlreadyExists(name.to_string())),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(engine_failure("create_bucket", name, &e)),
        }

        self.engine
            .open_sub(name)
            .await
            .map_err(|e| engine_failure("create_bucket", name, &e))?;
        self.write_bucket_record(name, info).await
    }

    pub async fn get_bucket_attributes(&self, name: &str) -> Result<BucketInfo> {
        let data = match self.metastore.get(name).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Err(Error::BucketNotFound(name.to_string())),
            Err(e) => return Err(engine_failure("get_bucket_attributes", name, &e)),
        };
        BucketInfo::deserialize(&data).map_err(|e| {
            error!(bucket = %name, error = %e, "Corrupt bucket record");
            Error::internal("corrupt bucket record")
        })
    }

    pub async fn put_bucket_attributes(&self, name: &str, info: &BucketInfo) -> Result<()> {
        self.write_bucket_record(name, info).await
    }

    /// Delete the bucket record, then drop the bucket's namespace
    pub async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.metastore
            .delete(name)
            .await
            .map_err(|e| engine_failure("delete_bucket", name, &e))?;
        self.engine
            .drop_sub(name)
            .await
            .map_err(|e| engine_failure("delete_bucket", name, &e))
    }

    pub async fn put_object<T: Serialize + Sync>(
        &self,
        bucket: &str,
        key: &str,
        value: &T,
    ) -> Result<()> {
        self.get_bucket_attributes(bucket).await?;
        let data = serde_json::to_string(value)
            .map_err(|e| Error::internal(format!("failed to encode object record: {e}")))?;
        self.bucket_level(bucket)
            .put(key, &data)
            .await
            .map_err(|e| engine_failure("put_object", bucket, &e))
    }

    pub async fn get_object<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> Result<T> {
        self.get_bucket_attributes(bucket).await?;
        self.read_object(bucket, key)
            .await?
            .ok_or_else(|| Error::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.get_bucket_attributes(bucket).await?;
        self.bucket_level(bucket)
            .delete(key)
            .await
            .map_err(|e| engine_failure("delete_object", bucket, &e))
    }

    /// Load a bucket and, when present, one of its objects
    pub async fn get_bucket_and_object<T: DeserializeOwned>(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<BucketAndObject<T>> {
        let info = self.get_bucket_attributes(bucket).await?;
        let object = self.read_object(bucket, key).await?;
        Ok(BucketAndObject {
            bucket: info,
            object,
        })
    }

    /// List objects with prefix/marker/delimiter semantics
    pub async fn list_object(&self, bucket: &str, params: ListParams) -> Result<ObjectListing> {
        self.get_bucket_attributes(bucket).await?;

        let mut range = RangeOptions {
            gt: params.marker.clone().filter(|m| !m.is_empty()),
            ..RangeOptions::default()
        };
        if let Some(prefix) = params.prefix.as_deref().filter(|p| !p.is_empty()) {
            range.start = Some(prefix.to_string());
            range.lt = advance_last_char(prefix);
        }

        let extension = Delimiter::new(
            params.prefix,
            params.marker,
            params.delimiter,
            params.max_keys,
        );
        self.scan(bucket, range, extension).await
    }

    /// List in-progress multipart uploads stored in a shadow bucket
    pub async fn list_multipart_uploads(
        &self,
        bucket: &str,
        params: MpuListParams,
    ) -> Result<UploadListing> {
        self.get_bucket_attributes(bucket).await?;

        let splitter = &params.splitter;
        let start = format!(
            "{OVERVIEW_PREFIX}{splitter}{}",
            params.prefix.as_deref().unwrap_or_default()
        );
        let gt = params
            .key_marker
            .as_deref()
            .filter(|m| !m.is_empty())
            .and_then(|key_marker| {
                advance_last_char(&format!(
                    "{OVERVIEW_PREFIX}{splitter}{key_marker}{splitter}{}",
                    params.upload_id_marker.as_deref().unwrap_or_default()
                ))
            });
        let range = RangeOptions {
            gt,
            lt: advance_last_char(&start),
            start: Some(start),
        };

        let extension = MultipartUploads::new(
            params.splitter.clone(),
            params.delimiter,
            params.query_prefix_length,
            params.max_keys,
        );
        self.scan(bucket, range, extension).await
    }

    /// Feed a range scan through a listing extension.
    ///
    /// Ends on the extension's signal or the first stream error; dropping
    /// the stream releases the engine cursor.
    async fn scan<E: ListingExtension>(
        &self,
        bucket: &str,
        range: RangeOptions,
        mut extension: E,
    ) -> Result<E::Output> {
        let mut stream = self
            .bucket_level(bucket)
            .read_stream(range)
            .await
            .map_err(|e| engine_failure("list", bucket, &e))?;

        while let Some(item) = stream.next().await {
            match item {
                Ok(entry) => {
                    if extension.filter(&entry) == FilterResult::End {
                        break;
                    }
                }
                Err(e) => return Err(engine_failure("list", bucket, &e)),
            }
        }
        Ok(extension.result())
    }

    async fn read_object<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> Result<Option<T>> {
        let data = match self.bucket_level(bucket).get(key).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(engine_failure("get_object", bucket, &e)),
        };
        serde_json::from_str(&data).map(Some).map_err(|e| {
            error!(bucket = %bucket, key = %key, error = %e, "Corrupt object record");
            Error::internal("corrupt object record")
        })
    }

    async fn write_bucket_record(&self, name: &str, info: &BucketInfo) -> Result<()> {
        let data = info
            .serialize()
            .map_err(|e| Error::internal(format!("failed to encode bucket record: {e}")))?;
        self.metastore
            .put(name, &data)
            .await
            .map_err(|e| engine_failure("put_bucket_attributes", name, &e))
    }

    fn bucket_level(&self, bucket: &str) -> Sublevel {
        Sublevel::attach(Arc::clone(&self.engine), bucket)
    }
}

fn engine_failure(op: &str, bucket: &str, e: &EngineError) -> Error {
    error!(op = op, bucket = %bucket, error = %e, "Metadata engine error");
    Error::internal(e.to_string())
}
