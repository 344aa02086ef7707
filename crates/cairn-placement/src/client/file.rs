//! Local directory backend
//!
//! Data lives at `<root>/<aa>/<bb>/<key>` where `aa` and `bb` are the first
//! two byte pairs of the hex key. Writes go to a temporary file that is
//! renamed into place once complete.

use bytes::Bytes;
use futures::{StreamExt, stream};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::{ByteRange, DataAddress, DataStream, KeyContext, new_data_key};
use crate::error::BackendError;

const READ_CHUNK: u64 = 64 * 1024;

/// Stores data as files under a root directory
pub struct FileClient {
    root: PathBuf,
}

impl FileClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self, key: &str) -> Result<PathBuf, BackendError> {
        if key.len() < 4 || !key.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(BackendError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(&key[0..2]).join(&key[2..4]).join(key))
    }

    pub async fn put(
        &self,
        mut stream: DataStream,
        _key_context: &KeyContext,
    ) -> Result<String, BackendError> {
        let key = new_data_key();
        let path = self.data_path(&key)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let tmp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path).await?;
        let written: Result<(), io::Error> = async {
            while let Some(chunk) = stream.next().await {
                file.write_all(&chunk?).await?;
            }
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        fs::rename(&tmp_path, &path).await?;
        Ok(key)
    }

    pub async fn get(
        &self,
        address: DataAddress<'_>,
        range: Option<ByteRange>,
    ) -> Result<DataStream, BackendError> {
        let key = address.key();
        let path = self.data_path(key)?;
        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackendError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let total = file.metadata().await?.len();
        let (offset, remaining) = range.map_or((0, total), |r| r.clamp(total));
        file.seek(SeekFrom::Start(offset)).await?;

        let chunks = stream::try_unfold((file, remaining), |(mut file, remaining)| async move {
            if remaining == 0 {
                return Ok(None);
            }
            #[allow(clippy::cast_possible_truncation)]
            let mut buf = vec![0u8; remaining.min(READ_CHUNK) as usize];
            let n = file.read(&mut buf).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "data file shorter than expected",
                ));
            }
            buf.truncate(n);
            Ok(Some((Bytes::from(buf), (file, remaining - n as u64))))
        });
        Ok(Box::pin(chunks))
    }

    pub async fn delete(&self, address: DataAddress<'_>) -> Result<(), BackendError> {
        let path = self.data_path(address.key())?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Stat the root directory
    pub async fn healthcheck(&self) -> Result<(u16, String), BackendError> {
        let meta = fs::metadata(&self.root).await?;
        if meta.is_dir() {
            Ok((200, "OK".to_string()))
        } else {
            Err(BackendError::Config(format!(
                "{} is not a directory",
                self.root.display()
            )))
        }
    }
}
